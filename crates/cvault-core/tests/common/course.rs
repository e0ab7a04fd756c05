//! Course fixtures served by the fake renderer and the static image server.
//! The main one, [`Course::build`], has three archivable questions:
//!
//! ```text
//! Week 1: HW1 "Homework 1" (101)  Part A: Loops (9001, 2 images), Arrays (9002)
//!         GA1 "Group Activity 1" (102, group)
//! Week 2: PRE1 "Prelab 1" (201)   General: Warmup (9101, 1 image)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cvault_core::config::{ArchiveConfig, RetryConfig};
use cvault_core::sanitize::question_dir_name;

use super::fake_renderer::{FakeRenderer, png_for};
use super::static_server::StaticServer;

pub const COURSE_DIR: &str = "CS_233_archive";
pub const LEDGER: &str = "CS_233_progress.json";
pub const SMALL_COURSE_DIR: &str = "CS_101_archive";
pub const SMALL_LEDGER: &str = "CS_101_progress.json";

pub fn test_config() -> ArchiveConfig {
    ArchiveConfig {
        workers: 2,
        retry: RetryConfig {
            max_attempts: 2,
            base_delay_secs: 0.01,
            max_delay_secs: 0,
        },
        render_timeout_secs: 5,
        request_timeout_secs: 5,
        ..ArchiveConfig::default()
    }
}

pub struct Course {
    pub server: StaticServer,
    pub renderer: Arc<FakeRenderer>,
    pub root_url: String,
}

pub fn image_path(qid: &str, name: &str) -> String {
    format!("/pl/course_instance/7/instance_question/{}/clientFilesQuestion/{}", qid, name)
}

fn question_page(title: &str, images: &[String]) -> String {
    let imgs: String = images
        .iter()
        .map(|p| format!(r#"<img src="{}" alt="figure">"#, p))
        .collect();
    format!(
        r#"<!DOCTYPE html><html><head><link href="/assets/app.css" rel="stylesheet"></head>
<body><h1>{}</h1><div class="card">{}</div><div class="solution">answer</div></body></html>"#,
        title, imgs
    )
}

impl Course {
    pub fn build() -> Self {
        let server = StaticServer::start();
        let renderer = Arc::new(FakeRenderer::new());
        let base = server.base().to_string();
        let ci = format!("{}/pl/course_instance/7", base);
        let root_url = format!("{}/assessments", ci);

        renderer.page(
            &root_url,
            r#"<!DOCTYPE html><html><body>
<nav><ul><li class="navbar-text">CS 233: Computer Architecture</li></ul></nav>
<table>
<tr><th data-testid="assessment-group-heading">Week 1: Basics</th></tr>
<tr><td><span class="badge">HW1</span></td><td><a href="/pl/course_instance/7/assessment/101">Homework 1</a></td></tr>
<tr><td><span class="badge">GA1</span></td><td><a href="/pl/course_instance/7/assessment/102"><i class="fa fa-users"></i> Group Activity 1</a></td></tr>
<tr><th data-testid="assessment-group-heading">Week 2: More</th></tr>
<tr><td><span class="badge">PRE1</span></td><td><a href="/pl/course_instance/7/assessment/201">Prelab 1</a></td></tr>
</table></body></html>"#,
        );
        renderer.page(
            &format!("{}/assessment/101", ci),
            r#"<!DOCTYPE html><html><body><table>
<tr><th colspan="2">Question</th><th>Value</th></tr>
<tr><th colspan="3">Part A</th></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/9001">Loops</a></td></tr>
<tr><td><a href="/pl/course_instance/7/instance_question/9002">Arrays</a></td></tr>
</table></body></html>"#,
        );
        renderer.page(
            &format!("{}/assessment/102", ci),
            r#"<!DOCTYPE html><html><body><table>
<tr><td><a href="/pl/course_instance/7/instance_question/9201">Team task</a></td></tr>
</table></body></html>"#,
        );
        renderer.page(
            &format!("{}/assessment/201", ci),
            r#"<!DOCTYPE html><html><body><table>
<tr><td><a href="/pl/course_instance/7/instance_question/9101">Warmup</a></td></tr>
</table></body></html>"#,
        );

        let q9001 = [image_path("9001", "fig1.png"), image_path("9001", "fig2.png")];
        let q9101 = [image_path("9101", "fig3.png")];
        renderer.page(&format!("{}/instance_question/9001", ci), question_page("Loops", &q9001));
        renderer.page(&format!("{}/instance_question/9002", ci), question_page("Arrays", &[]));
        renderer.page(&format!("{}/instance_question/9101", ci), question_page("Warmup", &q9101));
        for p in q9001.iter().chain(q9101.iter()) {
            server.serve(p, png_for(p));
        }

        Self {
            server,
            renderer,
            root_url,
        }
    }

    /// Two weeks; Week 1 holds one HW question titled `Stack` and one group
    /// activity, Week 2 holds only group work.
    ///
    /// ```text
    /// Week 1: HW1 "Homework 1" (301)        General: Stack (9301)
    ///         GA1 "Group Activity 1" (302)  General: Team task (9302)
    /// Week 2: GA2 "Group Activity 2" (402)  General: Team review (9402)
    /// ```
    pub fn two_weeks() -> Self {
        let server = StaticServer::start();
        let renderer = Arc::new(FakeRenderer::new());
        let ci = format!("{}/pl/course_instance/8", server.base());
        let root_url = format!("{}/assessments", ci);

        renderer.page(
            &root_url,
            r#"<!DOCTYPE html><html><body>
<nav><ul><li class="navbar-text">CS 101</li></ul></nav>
<table>
<tr><th data-testid="assessment-group-heading">Week 1</th></tr>
<tr><td><span class="badge">HW1</span></td><td><a href="/pl/course_instance/8/assessment/301">Homework 1</a></td></tr>
<tr><td><span class="badge">GA1</span></td><td><a href="/pl/course_instance/8/assessment/302"><i class="fa fa-users"></i> Group Activity 1</a></td></tr>
<tr><th data-testid="assessment-group-heading">Week 2</th></tr>
<tr><td><span class="badge">GA2</span></td><td><a href="/pl/course_instance/8/assessment/402"><i class="fa fa-users"></i> Group Activity 2</a></td></tr>
</table></body></html>"#,
        );
        let assessments = [("301", "9301", "Stack"), ("302", "9302", "Team task"), ("402", "9402", "Team review")];
        for (aid, qid, title) in assessments {
            renderer.page(
                &format!("{}/assessment/{}", ci, aid),
                format!(
                    r#"<!DOCTYPE html><html><body><table>
<tr><td><a href="/pl/course_instance/8/instance_question/{}">{}</a></td></tr>
</table></body></html>"#,
                    qid, title
                ),
            );
            renderer.page(&format!("{}/instance_question/{}", ci, qid), question_page(title, &[]));
        }

        Self {
            server,
            renderer,
            root_url,
        }
    }

    pub fn assessment_url(&self, id: &str) -> String {
        format!("{}/pl/course_instance/7/assessment/{}", self.server.base(), id)
    }

    pub fn question_url(&self, qid: &str) -> String {
        format!("{}/pl/course_instance/7/instance_question/{}", self.server.base(), qid)
    }

    pub fn archive_root(out: &Path) -> PathBuf {
        out.join(COURSE_DIR)
    }

    pub fn loops_dir(out: &Path) -> PathBuf {
        Self::archive_root(out).join("Week_1/HW_1/Part_A").join(question_dir_name("Loops", "9001"))
    }

    pub fn arrays_dir(out: &Path) -> PathBuf {
        Self::archive_root(out).join("Week_1/HW_1/Part_A").join(question_dir_name("Arrays", "9002"))
    }

    pub fn warmup_dir(out: &Path) -> PathBuf {
        Self::archive_root(out).join("Week_2/PRE_1/General").join(question_dir_name("Warmup", "9101"))
    }
}
