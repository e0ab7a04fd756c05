//! Markup parsing for the course listing and assessment pages.

use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashSet;
use url::Url;

use crate::config::ArchiveConfig;
use crate::eligibility::AssessmentTag;
use crate::error::ArchiveError;
use crate::model::{Assessment, Question, Week};
use crate::sanitize::{assessment_dir_name, sanitize_segment, short_hash};

/// Category used when an assessment page has no explicit grouping.
pub const DEFAULT_CATEGORY: &str = "General";
const FALLBACK_COURSE: &str = "Course_Archive";

fn selector(css: &str) -> Result<Selector, ArchiveError> {
    Selector::parse(css).map_err(|e| ArchiveError::structural(css, e.to_string()))
}

fn regex(re: &str) -> Result<Regex, ArchiveError> {
    Regex::new(re).map_err(|e| ArchiveError::structural(re, e.to_string()))
}

/// Visible text of an element, trimmed pieces joined by single spaces.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Compiled selectors and patterns for both page kinds.
pub struct ListingSelectors {
    row: Selector,
    week_heading: Selector,
    badge: Selector,
    link: Selector,
    group_icon: Selector,
    category: Selector,
    navbar_text: Selector,
    week_re: Regex,
    tag_re: Regex,
    number_re: Regex,
    assessment_id_re: Regex,
    question_id_re: Regex,
    course_code_re: Regex,
    course_instance_re: Regex,
}

impl ListingSelectors {
    pub fn new() -> Result<Self, ArchiveError> {
        Ok(Self {
            row: selector("tr")?,
            week_heading: selector(r#"th[data-testid="assessment-group-heading"]"#)?,
            badge: selector("span.badge")?,
            link: selector("a[href]")?,
            group_icon: selector(r#"i[class*="fa-users"]"#)?,
            category: selector("th[colspan]")?,
            navbar_text: selector("li.navbar-text")?,
            week_re: regex(r"(?i)Week\s+(\d+)")?,
            tag_re: regex(r"^([A-Z]+)")?,
            number_re: regex(r"\d+")?,
            assessment_id_re: regex(r"/assessment(?:_instance)?/(\d+)")?,
            question_id_re: regex(r"/instance_question/(\d+)")?,
            course_code_re: regex(r"[A-Z]+\s*\d+")?,
            course_instance_re: regex(r"/course_instance/(\d+)")?,
        })
    }
}

/// Course name: course code from the navbar, else `Course_<instance id>`,
/// else a fixed fallback. Always a valid path segment.
pub fn course_name(doc: &Html, page_url: &str, sel: &ListingSelectors) -> String {
    let from_navbar = doc.select(&sel.navbar_text).find_map(|li| {
        sel.course_code_re
            .find(&text_of(li))
            .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join("_"))
    });
    let name = from_navbar
        .or_else(|| {
            sel.course_instance_re
                .captures(page_url)
                .map(|c| format!("Course_{}", &c[1]))
        })
        .unwrap_or_else(|| FALLBACK_COURSE.to_string());
    sanitize_segment(&name, &name)
}

/// Parsed listing before type selection.
#[derive(Debug)]
pub struct ParsedListing {
    pub course: String,
    pub weeks: Vec<Week>,
    pub unreadable: Vec<ArchiveError>,
}

/// Walks the listing table rows in document order.
///
/// A heading that is not `Week <n>` with `n` in `1..=max_week` (e.g.
/// "Exams", "Week 20") closes the current week; rows until the next valid
/// heading are ignored.
pub fn parse_listing(
    html: &str,
    page_url: &Url,
    cfg: &ArchiveConfig,
    sel: &ListingSelectors,
) -> ParsedListing {
    let doc = Html::parse_document(html);
    let course = course_name(&doc, page_url.as_str(), sel);
    let mut weeks: Vec<Week> = Vec::new();
    let mut unreadable = Vec::new();
    let mut current: Option<usize> = None;
    let mut seen_ids: HashSet<String> = HashSet::new();

    for (row_idx, row) in doc.select(&sel.row).enumerate() {
        if let Some(th) = row.select(&sel.week_heading).next() {
            let title = text_of(th);
            current = sel
                .week_re
                .captures(&title)
                .and_then(|c| c[1].parse::<u32>().ok())
                .filter(|n| (1..=cfg.max_week).contains(n))
                .map(|n| match weeks.iter().position(|w| w.number == n) {
                    Some(i) => i,
                    None => {
                        weeks.push(Week {
                            number: n,
                            title: title.clone(),
                            assessments: Vec::new(),
                        });
                        weeks.len() - 1
                    }
                });
            continue;
        }
        let Some(week_idx) = current else {
            continue;
        };
        let Some(badge) = row.select(&sel.badge).next() else {
            continue;
        };
        let Some(link) = row.select(&sel.link).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        if !(href.contains("/assessment/") || href.contains("/assessment_instance/")) {
            continue;
        }

        let week = &mut weeks[week_idx];
        let node = format!("week {} row {}", week.number, row_idx);
        let badge_text = text_of(badge);
        let title = text_of(link);

        let Some(label) = sel.tag_re.captures(&badge_text).map(|c| c[1].to_string()) else {
            unreadable.push(ArchiveError::structural(
                node,
                format!("badge {:?} has no type tag", badge_text),
            ));
            continue;
        };
        let Some(id) = sel.assessment_id_re.captures(href).map(|c| c[1].to_string()) else {
            unreadable.push(ArchiveError::structural(
                node,
                format!("link {:?} has no assessment id", href),
            ));
            continue;
        };
        if title.is_empty() {
            unreadable.push(ArchiveError::structural(node, "assessment link has no title"));
            continue;
        }
        let Ok(url) = page_url.join(href) else {
            unreadable.push(ArchiveError::structural(node, format!("bad link {:?}", href)));
            continue;
        };
        if !seen_ids.insert(id.clone()) {
            continue;
        }

        let tag = AssessmentTag::classify(&label, &cfg.known_tags);
        let ordinal = sel
            .number_re
            .find(&badge_text)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .unwrap_or_else(|| {
                week.assessments
                    .iter()
                    .filter(|a| a.tag.label() == tag.label())
                    .count() as u32
                    + 1
            });
        let mut dir_name = assessment_dir_name(tag.label(), ordinal);
        if week.assessments.iter().any(|a| a.dir_name == dir_name) {
            dir_name = format!("{}_{}", dir_name, short_hash(&id));
        }
        week.assessments.push(Assessment {
            id,
            title,
            badge: badge_text,
            is_group: link.select(&sel.group_icon).next().is_some(),
            tag,
            url: url.to_string(),
            dir_name,
        });
    }

    weeks.sort_by_key(|w| w.number);
    ParsedListing {
        course,
        weeks,
        unreadable,
    }
}

/// Questions of one assessment page, in document order, with their category.
pub fn parse_assessment(
    html: &str,
    page_url: &Url,
    node: &str,
    sel: &ListingSelectors,
) -> (Vec<Question>, Vec<ArchiveError>) {
    let doc = Html::parse_document(html);
    let mut category = DEFAULT_CATEGORY.to_string();
    let mut questions = Vec::new();
    let mut errors = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for (row_idx, row) in doc.select(&sel.row).enumerate() {
        if let Some(th) = row.select(&sel.category).next() {
            let text = text_of(th);
            if !text.is_empty() && !text.contains("Question") && !text.contains("Value") {
                category = text;
            }
            continue;
        }
        let Some(link) = row.select(&sel.link).next() else {
            continue;
        };
        let href = link.value().attr("href").unwrap_or_default();
        if !href.contains("/instance_question/") {
            continue;
        }
        let where_ = format!("{} row {}", node, row_idx);
        let Some(id) = sel.question_id_re.captures(href).map(|c| c[1].to_string()) else {
            errors.push(ArchiveError::structural(where_, format!("link {:?} has no question id", href)));
            continue;
        };
        let title = text_of(link);
        if title.is_empty() {
            errors.push(ArchiveError::structural(where_, "question link has no title"));
            continue;
        }
        let Ok(url) = page_url.join(href) else {
            errors.push(ArchiveError::structural(where_, format!("bad link {:?}", href)));
            continue;
        };
        if !seen.insert(id.clone()) {
            continue;
        }
        questions.push(Question {
            id,
            title,
            url: url.to_string(),
            category: category.clone(),
        });
    }
    (questions, errors)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"<!DOCTYPE html><html><body>
<nav><ul><li class="navbar-text">CS 233, Fa25</li></ul></nav>
<table>
<tr><th data-testid="assessment-group-heading">Week 1: Intro</th></tr>
<tr><td><span class="badge">HW1</span></td><td><a href="/pl/course_instance/7/assessment/101">Homework 1</a></td></tr>
<tr><td><span class="badge">GA1</span></td><td><a href="/pl/course_instance/7/assessment/102"><i class="fa fa-users"></i> Group Activity 1</a></td></tr>
<tr><td><span class="badge">hw</span></td><td><a href="/pl/course_instance/7/assessment/103">Lowercase badge</a></td></tr>
<tr><th data-testid="assessment-group-heading">Week 20</th></tr>
<tr><td><span class="badge">HW20</span></td><td><a href="/pl/course_instance/7/assessment/120">Out of range</a></td></tr>
<tr><th data-testid="assessment-group-heading">Week 2</th></tr>
<tr><td><span class="badge">PQ</span></td><td><a href="/pl/course_instance/7/assessment_instance/201">Practice</a></td></tr>
<tr><td><span class="badge">PQ</span></td><td><a href="/pl/course_instance/7/assessment/202">Practice again</a></td></tr>
<tr><td><span class="badge">ZZ9</span></td><td><a href="/pl/course_instance/7/assessment/203">Mystery</a></td></tr>
<tr><td><span class="badge">HW2</span></td><td><a href="/pl/course_instance/7/assessment/abc">No id</a></td></tr>
<tr><td><span class="badge">HW3</span></td><td><a href="/pl/course_instance/7/gradebook">Not an assessment</a></td></tr>
</table></body></html>"#;

    fn page() -> Url {
        Url::parse("https://us.example.com/pl/course_instance/7/assessments").unwrap()
    }

    #[test]
    fn listing_weeks_tags_and_group_marker() {
        let sel = ListingSelectors::new().unwrap();
        let parsed = parse_listing(LISTING, &page(), &ArchiveConfig::default(), &sel);
        assert_eq!(parsed.course, "CS_233");
        let weeks: Vec<u32> = parsed.weeks.iter().map(|w| w.number).collect();
        assert_eq!(weeks, vec![1, 2]);

        let w1 = &parsed.weeks[0].assessments;
        assert_eq!(w1.len(), 2);
        assert_eq!(w1[0].tag, AssessmentTag::Known("HW".into()));
        assert_eq!(w1[0].dir_name, "HW_1");
        assert_eq!(w1[0].url, "https://us.example.com/pl/course_instance/7/assessment/101");
        assert!(!w1[0].is_group);
        assert!(w1[1].is_group);
        assert_eq!(w1[1].title, "Group Activity 1");

        let w2 = &parsed.weeks[1].assessments;
        assert_eq!(w2.iter().map(|a| a.dir_name.as_str()).collect::<Vec<_>>(), vec!["PQ_1", "PQ_2", "ZZ_9"]);
        assert_eq!(w2[0].id, "201");
        assert_eq!(w2[2].tag, AssessmentTag::Unknown("ZZ".into()));
    }

    #[test]
    fn malformed_rows_are_reported_not_fatal() {
        let sel = ListingSelectors::new().unwrap();
        let parsed = parse_listing(LISTING, &page(), &ArchiveConfig::default(), &sel);
        // Lowercase badge (no tag) and the non-numeric id.
        assert_eq!(parsed.unreadable.len(), 2);
        assert!(parsed
            .unreadable
            .iter()
            .all(|e| matches!(e, ArchiveError::StructuralParse { .. })));
    }

    #[test]
    fn duplicate_dir_names_get_id_hash() {
        let html = r#"<html><body><table>
<tr><th data-testid="assessment-group-heading">Week 3</th></tr>
<tr><td><span class="badge">HW1</span></td><td><a href="/assessment/1">A</a></td></tr>
<tr><td><span class="badge">HW1</span></td><td><a href="/assessment/2">B</a></td></tr>
</table></body></html>"#;
        let sel = ListingSelectors::new().unwrap();
        let parsed = parse_listing(html, &page(), &ArchiveConfig::default(), &sel);
        let a = &parsed.weeks[0].assessments;
        assert_eq!(a[0].dir_name, "HW_1");
        assert_eq!(a[1].dir_name, format!("HW_1_{}", short_hash("2")));
    }

    #[test]
    fn non_week_heading_closes_the_current_week() {
        let html = r#"<html><body><table>
<tr><th data-testid="assessment-group-heading">Week 4</th></tr>
<tr><td><span class="badge">HW4</span></td><td><a href="/assessment/41">Homework 4</a></td></tr>
<tr><th data-testid="assessment-group-heading">Exams</th></tr>
<tr><td><span class="badge">EXAM1</span></td><td><a href="/assessment/90">Midterm</a></td></tr>
<tr><th data-testid="assessment-group-heading">Week 5</th></tr>
<tr><td><span class="badge">HW5</span></td><td><a href="/assessment/51">Homework 5</a></td></tr>
</table></body></html>"#;
        let sel = ListingSelectors::new().unwrap();
        let parsed = parse_listing(html, &page(), &ArchiveConfig::default(), &sel);
        let ids: Vec<(u32, &str)> = parsed
            .weeks
            .iter()
            .flat_map(|w| w.assessments.iter().map(move |a| (w.number, a.id.as_str())))
            .collect();
        assert_eq!(ids, vec![(4, "41"), (5, "51")]);
        assert!(parsed.unreadable.is_empty());
    }

    #[test]
    fn course_name_fallbacks() {
        let sel = ListingSelectors::new().unwrap();
        let doc = Html::parse_document("<html><body></body></html>");
        assert_eq!(course_name(&doc, "https://x/pl/course_instance/42/assessments", &sel), "Course_42");
        assert_eq!(course_name(&doc, "https://x/elsewhere", &sel), "Course_Archive");
    }

    #[test]
    fn assessment_page_categories_and_questions() {
        let html = r#"<html><body><table>
<tr><th colspan="3">Question</th><th>Value</th></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/9001">Warm up</a></td></tr>
<tr><th colspan="3">Part A: Loops</th></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/9002">For loops</a></td></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/9002">For loops</a></td></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/x">Broken</a></td></tr>
<tr><td><a href="/pl/course_instance/7/assessment/101">Back</a></td></tr>
</table></body></html>"#;
        let sel = ListingSelectors::new().unwrap();
        let url = Url::parse("https://us.example.com/pl/course_instance/7/assessment_instance/5").unwrap();
        let (qs, errs) = parse_assessment(html, &url, "w1/a101", &sel);
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].category, DEFAULT_CATEGORY);
        assert_eq!(qs[0].id, "9001");
        assert_eq!(qs[1].category, "Part A: Loops");
        assert_eq!(qs[1].url, "https://us.example.com/pl/course_instance/7/instance_question/9002");
        assert_eq!(errs.len(), 1);
    }
}
