//! Summary tables for the terminal

use tabled::{builder::Builder, settings::Style};

use crate::cli::helpers::truncate_str;
use crate::ingest::archive::ArchiveReport;
use crate::ingest::report::IngestionReport;
use crate::ingest::slugs::SlugReport;

/// Counters of a run followed by per-key error counts
pub fn ingestion_summary(report: &IngestionReport) -> String {
    let mut counters = Builder::default();
    counters.push_record(["Counter", "Value"]);
    for (name, value) in report.counters() {
        counters.push_record([name.to_string(), value.to_string()]);
    }
    let mut output = counters.build().with(Style::rounded()).to_string();

    let ordered = report.errors.ordered();
    if !ordered.is_empty() {
        let mut errors = Builder::default();
        errors.push_record(["Error", "Count"]);
        for (key, messages) in ordered {
            errors.push_record([key.as_str().to_string(), messages.len().to_string()]);
        }
        output.push('\n');
        output.push_str(&errors.build().with(Style::rounded()).to_string());
    }
    output
}

pub fn archive_summary(report: &ArchiveReport) -> String {
    let mut table = Builder::default();
    table.push_record(["Course", "Title", "Status"]);
    for course in &report.successes {
        table.push_record([
            course.uuid.clone(),
            truncate_str(&course.title, 40),
            "archived".to_string(),
        ]);
    }
    for course in &report.failures {
        table.push_record([
            course.uuid.clone(),
            truncate_str(&course.title, 40),
            truncate_str(&course.reason, 50),
        ]);
    }
    table.build().with(Style::rounded()).to_string()
}

pub fn slug_failures(report: &SlugReport) -> String {
    let mut table = Builder::default();
    table.push_record(["Course", "Old slug", "New slug", "Error"]);
    for failure in &report.failures {
        table.push_record([
            failure.course_uuid.clone(),
            failure.old_slug.clone().unwrap_or_default(),
            failure.new_slug.clone().unwrap_or_default(),
            truncate_str(&failure.error, 60),
        ]);
    }
    table.build().with(Style::rounded()).to_string()
}
