//! Interactive assessment-type selection.

use async_trait::async_trait;
use cvault_core::eligibility::{TagCatalog, TagSelection, TagSelector};
use cvault_core::error::ArchiveError;
use tokio::io::{AsyncBufReadExt, BufReader};

/// Asks on stderr/stdin which assessment types to archive.
pub struct PromptSelector;

fn describe(catalog: &TagCatalog) -> String {
    let mut out = String::from("Assessment types in this course:\n");
    for (i, e) in catalog.selectable().enumerate() {
        out.push_str(&format!(
            "  {:>2}) {:<6} {:>3} assessment(s), e.g. \"{}\"{}\n",
            i + 1,
            e.tag.label(),
            e.count - e.group_count,
            e.sample_title,
            if e.tag.is_known() { "" } else { "  [unrecognised type]" }
        ));
    }
    let group_only: Vec<&str> = catalog
        .entries()
        .iter()
        .filter(|e| e.all_group())
        .map(|e| e.tag.label())
        .collect();
    if !group_only.is_empty() {
        out.push_str(&format!("  (group work, never archived: {})\n", group_only.join(", ")));
    }
    out.push_str("Types to archive [numbers or tags, comma separated; Enter = all recognised]: ");
    out
}

/// Parses an answer to the prompt: empty or `all` picks every recognised
/// type, `*` every type; otherwise 1-based numbers or tag labels.
pub fn parse_selection(input: &str, catalog: &TagCatalog) -> Result<TagSelection, String> {
    let options: Vec<_> = catalog.selectable().collect();
    let answer = input.trim();
    if answer.is_empty() || answer.eq_ignore_ascii_case("all") {
        return Ok(TagSelection::new(
            options.iter().filter(|e| e.tag.is_known()).map(|e| e.tag.label().to_string()),
        ));
    }
    if answer == "*" {
        return Ok(TagSelection::new(options.iter().map(|e| e.tag.label().to_string())));
    }

    let mut labels = Vec::new();
    for token in answer.split(|c: char| c == ',' || c.is_whitespace()).filter(|t| !t.is_empty()) {
        if let Ok(n) = token.parse::<usize>() {
            let entry = n
                .checked_sub(1)
                .and_then(|i| options.get(i))
                .ok_or_else(|| format!("no type numbered {}", n))?;
            labels.push(entry.tag.label().to_string());
            continue;
        }
        let entry = options
            .iter()
            .find(|e| e.tag.label().eq_ignore_ascii_case(token))
            .ok_or_else(|| format!("unknown type {:?}", token))?;
        labels.push(entry.tag.label().to_string());
    }
    Ok(TagSelection::new(labels))
}

#[async_trait]
impl TagSelector for PromptSelector {
    async fn select(&self, catalog: &TagCatalog) -> Result<TagSelection, ArchiveError> {
        if catalog.selectable().next().is_none() {
            return Err(ArchiveError::Selection("course lists no archivable assessments".into()));
        }
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            eprint!("{}", describe(catalog));
            let line = lines
                .next_line()
                .await
                .map_err(|e| ArchiveError::Selection(format!("reading answer: {}", e)))?
                .ok_or_else(|| ArchiveError::Selection("no answer on stdin".into()))?;
            match parse_selection(&line, catalog) {
                Ok(sel) if !sel.is_empty() => return Ok(sel),
                Ok(_) => eprintln!("nothing selected, try again"),
                Err(e) => eprintln!("{}, try again", e),
            }
        }
    }
}
