// Legacy platform data-transfer toolkit
//
// One-shot batch jobs that copy rows from the legacy booking platform schema
// into the identity/umrah/general service databases. Every job follows the
// same shape: count source rows, open one flat transaction per target
// database, loop with a progress bar, check for duplicates, insert or
// update, and print a tally of transferred/skipped/failed records.
//
// Jobs are registered in runner::all_jobs() and run via the `migrate` CLI.

pub mod config;
pub mod db;
pub mod enrichment;
pub mod envelopes;
pub mod jobs;
pub mod progress;
pub mod report;
pub mod runner;
pub mod seed;
pub mod text;

pub use config::*;
