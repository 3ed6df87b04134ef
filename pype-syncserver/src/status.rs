//! Derived synchronisation status of a file, or a representation, between a
//! local and a remote site.
//!
//! Status precedence (first match wins):
//! 1. `Paused` (either side paused)
//! 2. `Failed` (either side exhausted its tries, or failed without a later success)
//! 3. `Queued` (either side has progress exactly 0)
//! 4. `InProgress` (either side strictly between 0 and 1)
//! 5. `SyncedOk` (both sides at 1)
//! 6. `NotAvailable`

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use pype_core::SiteEntry;

use crate::error::SyncServerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    InProgress,
    Queued,
    Failed,
    Paused,
    SyncedOk,
    NotAvailable,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 6] = [
        SyncStatus::InProgress,
        SyncStatus::Queued,
        SyncStatus::Failed,
        SyncStatus::Paused,
        SyncStatus::SyncedOk,
        SyncStatus::NotAvailable,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SyncStatus::InProgress => "In Progress",
            SyncStatus::Queued => "Queued",
            SyncStatus::Failed => "Failed",
            SyncStatus::Paused => "Paused",
            SyncStatus::SyncedOk => "Synced OK",
            SyncStatus::NotAvailable => "Not available",
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for SyncStatus {
    type Err = SyncServerError;

    /// Accepts labels (`Synced OK`) and snake case (`synced_ok`), any case.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        SyncStatus::ALL
            .into_iter()
            .find(|status| status.label().to_ascii_lowercase() == wanted)
            .ok_or_else(|| SyncServerError::UnknownName {
                kind: "status",
                name: s.to_owned(),
            })
    }
}

/// What is known about one side of a transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SideState {
    /// 0.0 to 1.0.
    pub progress: f64,
    pub paused: bool,
    /// Failed without a later success.
    pub failed: bool,
    pub tries: u32,
}

impl SideState {
    /// State of a file at a site; a file without an entry for the site has
    /// not started.
    pub fn of(entry: Option<&SiteEntry>) -> Self {
        let Some(entry) = entry else {
            return Self::default();
        };
        let progress = match (entry.progress, entry.created_dt) {
            (Some(progress), _) => progress.clamp(0.0, 1.0),
            (None, Some(_)) => 1.0,
            (None, None) => 0.0,
        };
        Self {
            progress,
            paused: entry.paused,
            failed: entry.last_failed_dt.is_some() && entry.created_dt.is_none(),
            tries: entry.tries.unwrap_or(0),
        }
    }

    fn exhausted(&self, max_tries: u32) -> bool {
        self.failed || self.tries >= max_tries
    }

    fn in_progress(&self) -> bool {
        self.progress > 0.0 && self.progress < 1.0
    }
}

pub fn derive(local: &SideState, remote: &SideState, max_tries: u32) -> SyncStatus {
    if local.paused || remote.paused {
        SyncStatus::Paused
    } else if local.exhausted(max_tries) || remote.exhausted(max_tries) {
        SyncStatus::Failed
    } else if local.progress == 0.0 || remote.progress == 0.0 {
        SyncStatus::Queued
    } else if local.in_progress() || remote.in_progress() {
        SyncStatus::InProgress
    } else if local.progress == 1.0 && remote.progress == 1.0 {
        SyncStatus::SyncedOk
    } else {
        SyncStatus::NotAvailable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn names_parse_in_both_spellings() {
        assert_eq!("synced_ok".parse::<SyncStatus>().unwrap(), SyncStatus::SyncedOk);
        assert_eq!("In Progress".parse::<SyncStatus>().unwrap(), SyncStatus::InProgress);
        assert!("done".parse::<SyncStatus>().is_err());
    }

    #[test]
    fn created_file_counts_as_finished() {
        let mut entry = SiteEntry::named("studio");
        entry.created_dt = Some(Utc::now());
        assert_eq!(SideState::of(Some(&entry)).progress, 1.0);
        assert_eq!(SideState::of(None), SideState::default());
    }

    #[test]
    fn success_clears_failure() {
        let mut entry = SiteEntry::named("gdrive");
        entry.last_failed_dt = Some(Utc::now());
        assert!(SideState::of(Some(&entry)).failed);
        entry.created_dt = Some(Utc::now());
        assert!(!SideState::of(Some(&entry)).failed);
    }
}
