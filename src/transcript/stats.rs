//! Transcript summary

use std::fmt;

use crate::models::Snowflake;

/// Calendar format of the start and end timestamps
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %Z";

/// Snapshot of a finished transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stats {
    pub total_messages: usize,
    pub total_users: usize,
    pub start_date: String,
    pub end_date: String,
}

impl Stats {
    pub(super) fn new(
        total_messages: usize,
        total_users: usize,
        first: Snowflake,
        last: Snowflake,
    ) -> Self {
        Self {
            total_messages,
            total_users,
            start_date: first.created_at().format(DATE_FORMAT).to_string(),
            end_date: last.created_at().format(DATE_FORMAT).to_string(),
        }
    }
}

impl fmt::Display for Stats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Stats:")?;
        writeln!(f, "\tTotal messages: {}", self.total_messages)?;
        writeln!(f, "\tTotal users: {}", self.total_users)?;
        writeln!(f, "\tStart date: {}", self.start_date)?;
        write!(f, "\tEnd date: {}", self.end_date)
    }
}
