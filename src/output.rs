use std::io::{self, Write};

use serde::Serialize;

use crate::pipeline::{RunReport, failed_stage};
use crate::progress::{ProgressEvent, ProgressSink};
use crate::store::CachedItem;

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Interactive,
    NonInteractive,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_run(report: &RunReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_cache(items: &[CachedItem]) -> io::Result<()> {
        Self::print_json(&items)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct LineProgress;

impl ProgressSink for LineProgress {
    fn event(&self, event: ProgressEvent) {
        let mut stderr = io::stderr().lock();
        let _ = writeln!(stderr, "[{:>3}%] {}", event.percent, event.message);
    }
}

pub fn print_run_summary(report: &RunReport) {
    let green = "\x1b[32m";
    let yellow = "\x1b[33m";
    let cyan = "\x1b[36m";
    let reset = "\x1b[0m";

    println!("{cyan}{} run {}{reset}", report.index, report.run_id);
    println!(
        "{green}scenes rendered: {} of {}{reset}",
        report.archive_members.len(),
        report.scenes_found
    );
    println!(
        "{green}downloads: {}   extractions: {}{reset}",
        report.downloads, report.extractions
    );
    if report.dates_clamped {
        println!(
            "{yellow}start date was after end date; searched {} .. {}{reset}",
            report.date_range.start.format("%Y-%m-%d"),
            report.date_range.end.format("%Y-%m-%d")
        );
    }
    for scene in &report.scenes {
        if let Some(stage) = failed_stage(scene) {
            println!("{yellow}  {} dropped at {stage}{reset}", scene.scene_id);
        }
    }
    if !report.skipped.is_empty() {
        println!(
            "{yellow}cancelled before dispatch: {}{reset}",
            report.skipped.join(", ")
        );
    }
    println!("archive: {}", report.archive_path);
    println!("preview: {}", report.preview);
    println!("log:     {}", report.log_path);
}

pub fn print_cache_listing(items: &[CachedItem]) {
    if items.is_empty() {
        println!("cache is empty");
        return;
    }
    for item in items {
        let kind = match item.kind {
            crate::store::CachedKind::Archive => "archive",
            crate::store::CachedKind::Extracted => "extracted",
        };
        println!("{kind:<9} {}", item.name);
    }
}
