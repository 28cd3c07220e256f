use std::io::{self, Write};

use serde::Serialize;

use crate::cache::CacheEntrySummary;
use crate::domain::Observation;
use crate::service::{GranuleSummary, QueryOutcome};

#[derive(Debug, Clone, Serialize)]
pub struct ClearResult {
    pub removed: usize,
    pub path: String,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_observations(observations: &[Observation]) -> io::Result<()> {
        Self::print_json(&observations)
    }

    pub fn print_outcome(outcome: &QueryOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_summary(summary: &GranuleSummary) -> io::Result<()> {
        Self::print_json(summary)
    }

    pub fn print_cache_entries(entries: &[CacheEntrySummary]) -> io::Result<()> {
        Self::print_json(&entries)
    }

    pub fn print_clear(result: &ClearResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize + ?Sized>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout().lock();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}
