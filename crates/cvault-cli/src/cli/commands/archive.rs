//! `cvault archive` – archive a course, resuming any earlier run.

use anyhow::{Context, Result};
use cvault_core::config::ArchiveConfig;
use cvault_core::control::RunControl;
use cvault_core::eligibility::{StaticTagSelector, TagSelector};
use cvault_core::engine::{ArchiveEngine, ArchiveProgress, RunSummary};
use cvault_core::render::{DriverAuthProvider, DriverRenderer, Renderer};
use cvault_core::session::AuthProvider;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use crate::cli::auth::CookieFileAuth;
use crate::cli::prompt::PromptSelector;
use crate::cli::{EXIT_COMPLETE, EXIT_FATAL, EXIT_INCOMPLETE};

const PROGRESS_INTERVAL_MS: u128 = 500;

#[derive(Debug)]
pub struct ArchiveArgs {
    pub url: String,
    pub out: PathBuf,
    pub types: Option<Vec<String>>,
    pub all_types: bool,
    pub include_unknown: bool,
    pub cookies: Option<PathBuf>,
    pub login_url: Option<String>,
}

fn selector_for(args: &ArchiveArgs) -> Box<dyn TagSelector> {
    match (&args.types, args.all_types, args.include_unknown) {
        (Some(types), _, _) => Box::new(StaticTagSelector::Named(types.clone())),
        (None, true, true) => Box::new(StaticTagSelector::Everything),
        (None, true, false) => Box::new(StaticTagSelector::AllKnown),
        (None, false, _) => Box::new(PromptSelector),
    }
}

pub async fn run_archive(cfg: ArchiveConfig, args: ArchiveArgs) -> Result<i32> {
    let driver = cfg.driver.clone().context(
        "no rendering driver configured; set [driver] command = [...] in config.toml",
    )?;
    let renderer: Arc<dyn Renderer> = Arc::new(DriverRenderer::new(&driver)?);
    let auth: Arc<dyn AuthProvider> = match &args.cookies {
        Some(path) => Arc::new(CookieFileAuth::new(path.clone())),
        None => {
            let login_url = args.login_url.clone().unwrap_or_else(|| args.url.clone());
            Arc::new(DriverAuthProvider::new(&driver, login_url)?)
        }
    };

    let control = RunControl::new();
    let ctrlc_control = control.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ncancelling: finishing in-flight questions (Ctrl-C again to abort)");
            ctrlc_control.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(EXIT_FATAL);
            }
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ArchiveProgress>(16);
    let progress_handle = tokio::spawn(async move {
        let mut last_print: Option<Instant> = None;
        let mut printed = false;
        while let Some(p) = progress_rx.recv().await {
            let due = last_print
                .map(|t| t.elapsed().as_millis() >= PROGRESS_INTERVAL_MS)
                .unwrap_or(true);
            if due {
                eprint!(
                    "\r  {} / {} questions ({:.0}%)  archived {}  skipped {}  failed {}  active {}   ",
                    p.finished(),
                    p.discovered,
                    p.fraction() * 100.0,
                    p.archived,
                    p.skipped,
                    p.failed,
                    p.in_flight
                );
                let _ = std::io::stderr().flush();
                last_print = Some(Instant::now());
                printed = true;
            }
        }
        if printed {
            eprintln!();
        }
    });

    let engine = ArchiveEngine::new(cfg, renderer, auth)
        .with_control(control)
        .with_progress(progress_tx);
    let selector = selector_for(&args);
    let result = engine.run(&args.url, &args.out, selector.as_ref()).await;
    drop(engine);
    let _ = progress_handle.await;

    match result {
        Ok(summary) => {
            print!("{}", summary);
            Ok(exit_code(&summary))
        }
        Err(e) => {
            eprintln!("archive stopped: {}", e);
            eprintln!("progress so far is saved; run the same command again to resume");
            Ok(EXIT_FATAL)
        }
    }
}

/// 0 when every selected question is archived, 1 otherwise.
fn exit_code(summary: &RunSummary) -> i32 {
    if summary.is_complete() {
        EXIT_COMPLETE
    } else {
        EXIT_INCOMPLETE
    }
}
