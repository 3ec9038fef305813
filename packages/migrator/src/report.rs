use colored::Colorize;
use indicatif::ProgressBar;
use std::time::Duration;

use crate::progress;

/// Per-job tally plus the console progress bar it drives.
///
/// Every processed row lands in exactly one of the four counters, so
/// `transferred + updated + skipped + failed` equals the number of rows
/// the loop has seen. Named counters and note lists carry job-specific
/// detail (promoted roles, duplicate emails, generated slugs) into the
/// printed summary.
pub struct TransferReport {
    total: i64,
    transferred: u64,
    updated: u64,
    skipped: u64,
    failed: u64,
    counters: Vec<(String, u64)>,
    notes: Vec<NoteSection>,
    bar: ProgressBar,
}

struct NoteSection {
    title: String,
    lines: Vec<String>,
}

impl TransferReport {
    pub fn new(total: i64, phase: &str) -> Self {
        Self::with_bar(total, progress::transfer_bar(total.max(0) as u64, phase))
    }

    /// Report without console output, for tests.
    pub fn hidden(total: i64) -> Self {
        Self::with_bar(total, ProgressBar::hidden())
    }

    fn with_bar(total: i64, bar: ProgressBar) -> Self {
        Self {
            total,
            transferred: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            counters: Vec::new(),
            notes: Vec::new(),
            bar,
        }
    }

    pub fn transferred(&mut self) {
        self.transferred += 1;
        self.bar.inc(1);
    }

    pub fn updated(&mut self) {
        self.updated += 1;
        self.bar.inc(1);
    }

    pub fn skipped(&mut self) {
        self.skipped += 1;
        self.bar.inc(1);
    }

    pub fn failed(&mut self) {
        self.failed += 1;
        self.bar.inc(1);
    }

    /// Bump a job-specific named counter shown in the summary.
    pub fn bump(&mut self, label: &str) {
        self.add(label, 1);
    }

    pub fn add(&mut self, label: &str, amount: u64) {
        match self.counters.iter_mut().find(|(l, _)| l == label) {
            Some((_, count)) => *count += amount,
            None => self.counters.push((label.to_string(), amount)),
        }
    }

    /// Append a line to a named note section printed after the summary.
    pub fn note(&mut self, section: &str, line: impl Into<String>) {
        let line = line.into();
        match self.notes.iter_mut().find(|s| s.title == section) {
            Some(existing) => existing.lines.push(line),
            None => self.notes.push(NoteSection {
                title: section.to_string(),
                lines: vec![line],
            }),
        }
    }

    pub fn total(&self) -> i64 {
        self.total
    }

    pub fn transferred_count(&self) -> u64 {
        self.transferred
    }

    pub fn updated_count(&self) -> u64 {
        self.updated
    }

    pub fn skipped_count(&self) -> u64 {
        self.skipped
    }

    pub fn failed_count(&self) -> u64 {
        self.failed
    }

    pub fn processed(&self) -> u64 {
        self.transferred + self.updated + self.skipped + self.failed
    }

    /// Counts must add up to the row total (negative totals mean the job
    /// could not estimate up front and are not checked).
    pub fn is_consistent(&self) -> bool {
        self.total < 0 || self.processed() == self.total as u64
    }

    pub fn finish(&self) {
        self.bar.finish();
    }

    pub fn print_summary(&self, duration: Duration) {
        println!("\n{}", "Transfer Summary:".bold());
        println!("----------------");
        println!("Total records: {}", self.total);
        println!("Successfully transferred: {}", self.transferred);
        if self.updated > 0 {
            println!("Updated in place: {}", self.updated);
        }
        println!("Skipped: {}", self.skipped);
        println!("Failed: {}", self.failed);
        for (label, count) in &self.counters {
            println!("{label}: {count}");
        }
        println!("Duration: {}s", duration.as_secs());
        let secs = duration.as_secs_f64();
        if secs > 0.0 {
            println!(
                "Average speed: {:.2} records/second",
                self.processed() as f64 / secs
            );
        }

        for section in &self.notes {
            println!("\n{}:", section.title);
            println!("{}", "-".repeat(section.title.len() + 1));
            for (i, line) in section.lines.iter().enumerate() {
                println!("{}. {}", i + 1, line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_add_up_to_processed() {
        let mut report = TransferReport::hidden(5);
        report.transferred();
        report.transferred();
        report.updated();
        report.skipped();
        report.failed();

        assert_eq!(report.processed(), 5);
        assert!(report.is_consistent());
    }

    #[test]
    fn inconsistent_when_rows_go_missing() {
        let mut report = TransferReport::hidden(3);
        report.transferred();

        assert!(!report.is_consistent());
    }

    #[test]
    fn unknown_totals_are_not_checked() {
        let mut report = TransferReport::hidden(-1);
        report.skipped();

        assert!(report.is_consistent());
    }

    #[test]
    fn notes_keep_section_insertion_order() {
        let mut report = TransferReport::hidden(0);
        report.note("Duplicate Emails", "a@example.com");
        report.note("Generated Slugs", "Acme -> acme");
        report.note("Duplicate Emails", "b@example.com");

        assert_eq!(report.notes.len(), 2);
        assert_eq!(report.notes[0].title, "Duplicate Emails");
        assert_eq!(report.notes[0].lines.len(), 2);
    }

    #[test]
    fn named_counters_accumulate() {
        let mut report = TransferReport::hidden(0);
        report.bump("Converted to agent");
        report.bump("Converted to agent");
        report.add("References updated", 7);

        assert_eq!(report.counters[0].1, 2);
        assert_eq!(report.counters[1].1, 7);
    }
}
