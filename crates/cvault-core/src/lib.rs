//! Resumable archive engine for hierarchical online courses.
//!
//! Walks Week → Assessment → Category → Question, stores an HTML snapshot, a
//! full-page screenshot and the embedded images of every eligible question,
//! and records progress in a ledger so interrupted runs resume where they
//! stopped.

pub mod config;
pub mod logging;

pub mod assets;
pub mod control;
pub mod eligibility;
pub mod engine;
pub mod enumerate;
pub mod error;
pub mod fetcher;
pub mod fingerprint;
pub mod http;
pub mod ledger;
pub mod model;
pub mod render;
pub mod retry;
pub mod sanitize;
pub mod session;
pub mod storage;

pub use engine::{ArchiveEngine, ArchiveProgress, FailedNode, RunSummary};
pub use error::ArchiveError;
