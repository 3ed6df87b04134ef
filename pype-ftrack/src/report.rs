//! Outcome of one processed event.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Messages grouped by severity, each with the entity paths it applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub info: BTreeMap<String, Vec<String>>,
    pub warning: BTreeMap<String, Vec<String>>,
    pub error: BTreeMap<String, Vec<String>>,
    /// Names that could not be synchronised because another asset has them.
    pub duplicated: Vec<String>,
    /// Entity paths whose names fail the schema pattern.
    pub regex_failed: Vec<String>,
    /// Old tracker id -> id of the entity recreated in its place.
    pub recreated: BTreeMap<String, String>,
    /// Auto-sync was switched on; a full synchronisation should run.
    pub full_sync_requested: bool,
}

impl SyncReport {
    pub fn push(&mut self, severity: Severity, message: &str, item: impl Into<String>) {
        let bucket = match severity {
            Severity::Info => &mut self.info,
            Severity::Warning => &mut self.warning,
            Severity::Error => &mut self.error,
        };
        bucket.entry(message.to_owned()).or_default().push(item.into());
    }

    pub fn info(&mut self, message: &str, item: impl Into<String>) {
        self.push(Severity::Info, message, item);
    }

    pub fn warn(&mut self, message: &str, item: impl Into<String>) {
        self.push(Severity::Warning, message, item);
    }

    pub fn error(&mut self, message: &str, item: impl Into<String>) {
        self.push(Severity::Error, message, item);
    }

    /// Items filed under `message` at any severity.
    pub fn items(&self, message: &str) -> Vec<&str> {
        [&self.info, &self.warning, &self.error]
            .into_iter()
            .filter_map(|bucket| bucket.get(message))
            .flatten()
            .map(String::as_str)
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.error.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.info.is_empty()
            && self.warning.is_empty()
            && self.error.is_empty()
            && self.duplicated.is_empty()
            && self.regex_failed.is_empty()
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (label, bucket) in [
            ("ERROR", &self.error),
            ("WARNING", &self.warning),
            ("INFO", &self.info),
        ] {
            for (message, items) in bucket {
                writeln!(f, "{label}: {message}")?;
                for item in items {
                    writeln!(f, "  - {item}")?;
                }
            }
        }
        if !self.duplicated.is_empty() {
            writeln!(
                f,
                "WARNING: entities with duplicated names were not synchronized: {}",
                self.duplicated.join(", ")
            )?;
        }
        if !self.regex_failed.is_empty() {
            writeln!(
                f,
                "WARNING: entity names contain prohibited symbols: {}",
                self.regex_failed.join(", ")
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_are_grouped_by_message() {
        let mut report = SyncReport::default();
        report.info("Entity renamed back", "demo/sq01");
        report.info("Entity renamed back", "demo/sq02");
        report.warn("Couldn't move back", "demo/sq03");
        assert_eq!(report.items("Entity renamed back"), vec!["demo/sq01", "demo/sq02"]);
        assert!(!report.has_errors());
        let text = report.to_string();
        assert!(text.starts_with("WARNING: Couldn't move back"));
        assert!(text.contains("  - demo/sq02"));
    }
}
