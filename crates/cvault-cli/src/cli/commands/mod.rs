//! CLI command handlers, one file per command.

mod archive;
mod completions;
mod status;

pub use archive::{run_archive, ArchiveArgs};
pub use completions::{run_completions, run_man};
pub use status::run_status;
