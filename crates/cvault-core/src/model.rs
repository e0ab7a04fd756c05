//! Course tree types shared by the enumerator, fetcher, ledger and engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

use crate::eligibility::AssessmentTag;
use crate::error::ArchiveError;

/// Result of parsing the course listing once at the start of a run.
#[derive(Debug)]
pub struct CourseListing {
    /// Course name as used in the archive root (`{course}_archive`).
    pub course: String,
    pub weeks: Vec<Week>,
    /// Listing rows that looked like assessments but could not be parsed.
    pub unreadable: Vec<ArchiveError>,
    /// Rendered listing page, kept as `_listing.html` in the archive root.
    pub listing_html: String,
}

impl CourseListing {
    pub fn assessments(&self) -> impl Iterator<Item = (&Week, &Assessment)> {
        self.weeks
            .iter()
            .flat_map(|w| w.assessments.iter().map(move |a| (w, a)))
    }
}

#[derive(Debug, Clone)]
pub struct Week {
    pub number: u32,
    pub title: String,
    pub assessments: Vec<Assessment>,
}

#[derive(Debug, Clone)]
pub struct Assessment {
    /// Remote identifier (numeric path component of the assessment URL).
    pub id: String,
    pub title: String,
    /// Raw badge text, e.g. `HW3`.
    pub badge: String,
    pub tag: AssessmentTag,
    /// Group/collaborative marker present in the listing.
    pub is_group: bool,
    /// Absolute URL of the assessment page.
    pub url: String,
    /// `{TypeTag}_{n}` directory name, unique within its week.
    pub dir_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Category bucket (`General` when the page has no explicit grouping).
    pub category: String,
}

/// Stable ledger key derived from remote identifiers, never from titles.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeKey(String);

impl NodeKey {
    pub fn new(week: u32, assessment_id: &str, question_id: &str) -> Self {
        NodeKey(format!("w{}/a{}/q{}", week, assessment_id, question_id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One unit of work for the fetcher: a question with its resolved location.
#[derive(Debug, Clone)]
pub struct QuestionJob {
    pub key: NodeKey,
    pub week: u32,
    pub assessment_title: String,
    pub question: Question,
    /// Directory relative to the archive root.
    pub rel_dir: PathBuf,
}

/// The three outputs every question produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Html,
    Screenshot,
    Images,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Html, ArtifactKind::Screenshot, ArtifactKind::Images];

    /// Path relative to the question directory.
    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Html => "index.html",
            ArtifactKind::Screenshot => "render.png",
            ArtifactKind::Images => "images",
        }
    }

    pub fn parse(s: &str) -> Option<ArtifactKind> {
        ArtifactKind::ALL.into_iter().find(|k| k.as_str() == s)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKind::Html => "html",
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::Images => "images",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `{course}_archive`.
pub fn archive_dir_name(course: &str) -> String {
    format!("{}_archive", course)
}

/// `{course}_progress.json`.
pub fn ledger_file_name(course: &str) -> String {
    format!("{}_progress.json", course)
}
