//! Filesystem-safe, length-bounded, collision-resistant names for archive nodes.
//!
//! Every name is a pure function of its inputs so that a resumed run lands on
//! the same directories as the run that created them.

mod path;
mod segment;

pub use path::image_file_name;
pub use segment::{sanitize_segment, short_hash, MAX_SEGMENT_CHARS};

/// `Week_{n}`.
pub fn week_dir_name(week: u32) -> String {
    format!("Week_{}", week)
}

/// `{TypeTag}_{n}`.
pub fn assessment_dir_name(tag: &str, ordinal: u32) -> String {
    let tag = sanitize_segment(tag, tag);
    format!("{}_{}", tag, ordinal)
}

/// `{Title}_{hash}` where the hash is taken over the question's remote id.
///
/// When sanitization already ended the name with that hash (long titles,
/// empty titles) it is not repeated.
pub fn question_dir_name(title: &str, remote_id: &str) -> String {
    let hash = short_hash(remote_id);
    let base = sanitize_segment(title, remote_id);
    if base == hash || base.ends_with(&format!("_{}", hash)) {
        base
    } else {
        format!("{}_{}", base, hash)
    }
}
