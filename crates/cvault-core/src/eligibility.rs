//! Which assessments get archived: the group filter plus the user's type selection.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::error::ArchiveError;
use crate::model::{Assessment, CourseListing};

/// Assessment type tag from an open set.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AssessmentTag {
    /// Tag listed in `known_tags`.
    Known(String),
    /// Anything else; needs explicit confirmation before it is archived.
    Unknown(String),
}

impl AssessmentTag {
    pub fn classify(label: &str, known: &[String]) -> Self {
        if known.iter().any(|k| k.eq_ignore_ascii_case(label)) {
            AssessmentTag::Known(label.to_ascii_uppercase())
        } else {
            AssessmentTag::Unknown(label.to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            AssessmentTag::Known(s) | AssessmentTag::Unknown(s) => s,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, AssessmentTag::Known(_))
    }
}

impl fmt::Display for AssessmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Group/collaborative assessments are never eligible, whatever their tag.
pub fn is_eligible(_tag: &AssessmentTag, group_marker: bool) -> bool {
    !group_marker
}

/// Per-tag summary shown to whoever picks the types to archive.
#[derive(Debug, Clone)]
pub struct TagInfo {
    pub tag: AssessmentTag,
    pub count: usize,
    pub group_count: usize,
    pub sample_title: String,
}

impl TagInfo {
    /// True when every assessment with this tag is a group assessment.
    pub fn all_group(&self) -> bool {
        self.group_count == self.count
    }
}

#[derive(Debug, Clone, Default)]
pub struct TagCatalog {
    entries: Vec<TagInfo>,
}

impl TagCatalog {
    pub fn new(mut entries: Vec<TagInfo>) -> Self {
        entries.sort_by(|a, b| a.tag.label().cmp(b.tag.label()));
        TagCatalog { entries }
    }

    pub fn from_listing(listing: &CourseListing) -> Self {
        let mut by_label: BTreeMap<String, TagInfo> = BTreeMap::new();
        for (_, a) in listing.assessments() {
            let info = by_label
                .entry(a.tag.label().to_string())
                .or_insert_with(|| TagInfo {
                    tag: a.tag.clone(),
                    count: 0,
                    group_count: 0,
                    sample_title: a.title.clone(),
                });
            info.count += 1;
            if a.is_group {
                info.group_count += 1;
            }
        }
        TagCatalog {
            entries: by_label.into_values().collect(),
        }
    }

    /// All tags, sorted by label.
    pub fn entries(&self) -> &[TagInfo] {
        &self.entries
    }

    /// Tags with at least one non-group assessment, sorted by label.
    pub fn selectable(&self) -> impl Iterator<Item = &TagInfo> {
        self.entries.iter().filter(|e| !e.all_group())
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Set of tag labels the user chose.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSelection {
    labels: BTreeSet<String>,
}

impl TagSelection {
    pub fn new<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagSelection {
            labels: labels.into_iter().map(Into::into).collect(),
        }
    }

    pub fn includes(&self, tag: &AssessmentTag) -> bool {
        self.labels
            .iter()
            .any(|l| l.eq_ignore_ascii_case(tag.label()))
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.labels.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// What happens to one assessment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Archive,
    /// Group assessment; never touches the ledger or the filesystem.
    Filtered,
    /// Eligible but its type was not selected.
    NotSelected,
}

pub fn decide(assessment: &Assessment, selection: &TagSelection) -> Decision {
    if !is_eligible(&assessment.tag, assessment.is_group) {
        Decision::Filtered
    } else if selection.includes(&assessment.tag) {
        Decision::Archive
    } else {
        Decision::NotSelected
    }
}

/// Collaborator that resolves the catalog into a selection (usually a prompt).
#[async_trait]
pub trait TagSelector: Send + Sync {
    async fn select(&self, catalog: &TagCatalog) -> Result<TagSelection, ArchiveError>;
}

/// Non-interactive selector.
#[derive(Debug, Clone)]
pub enum StaticTagSelector {
    /// Every known, selectable tag.
    AllKnown,
    /// Every selectable tag, unknown ones included.
    Everything,
    /// Exactly these labels.
    Named(Vec<String>),
}

#[async_trait]
impl TagSelector for StaticTagSelector {
    async fn select(&self, catalog: &TagCatalog) -> Result<TagSelection, ArchiveError> {
        let selection = match self {
            StaticTagSelector::AllKnown => TagSelection::new(
                catalog
                    .selectable()
                    .filter(|e| e.tag.is_known())
                    .map(|e| e.tag.label().to_string()),
            ),
            StaticTagSelector::Everything => {
                TagSelection::new(catalog.selectable().map(|e| e.tag.label().to_string()))
            }
            StaticTagSelector::Named(labels) => TagSelection::new(labels.iter().cloned()),
        };
        if selection.is_empty() {
            return Err(ArchiveError::Selection("no assessment types selected".into()));
        }
        Ok(selection)
    }
}
