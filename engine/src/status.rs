//! The sync status shown in the app's banner.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Overall sync state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    /// No connectivity
    Offline,
    /// Connected with queued changes
    Pending,
    /// Connected with nothing queued
    Synced,
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Offline => f.write_str("offline"),
            SyncState::Pending => f.write_str("pending"),
            SyncState::Synced => f.write_str("synced"),
        }
    }
}

/// Color hint for the status banner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusColor {
    Red,
    Orange,
    Green,
}

impl StatusColor {
    /// Hex value used by the app theme.
    pub fn hex(&self) -> &'static str {
        match self {
            StatusColor::Red => "#f44336",
            StatusColor::Orange => "#ff9800",
            StatusColor::Green => "#4caf50",
        }
    }
}

/// Derived `{status, message, color, hasIssues}` tuple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusView {
    pub status: SyncState,
    pub message: String,
    pub color: StatusColor,
    pub has_issues: bool,
}

impl StatusView {
    /// Compute the status from connectivity and queue depth.
    pub fn derive(is_connected: bool, pending: usize) -> Self {
        if !is_connected {
            let message = if pending == 0 {
                "Offline".to_string()
            } else {
                format!("{} pending (offline)", changes(pending))
            };
            return Self {
                status: SyncState::Offline,
                message,
                color: StatusColor::Red,
                has_issues: pending > 0,
            };
        }

        if pending > 0 {
            Self {
                status: SyncState::Pending,
                message: format!("{} pending", changes(pending)),
                color: StatusColor::Orange,
                has_issues: false,
            }
        } else {
            Self {
                status: SyncState::Synced,
                message: "No changes to sync".to_string(),
                color: StatusColor::Green,
                has_issues: false,
            }
        }
    }
}

fn changes(n: usize) -> String {
    if n == 1 {
        "1 change".to_string()
    } else {
        format!("{n} changes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_with_pending_work() {
        let view = StatusView::derive(false, 3);
        assert_eq!(view.status, SyncState::Offline);
        assert_eq!(view.message, "3 changes pending (offline)");
        assert!(view.has_issues);
        assert_eq!(view.color, StatusColor::Red);
    }

    #[test]
    fn offline_without_pending_work() {
        let view = StatusView::derive(false, 0);
        assert_eq!(view.status, SyncState::Offline);
        assert!(!view.has_issues);
    }

    #[test]
    fn online_pending_is_singular_for_one() {
        let view = StatusView::derive(true, 1);
        assert_eq!(view.status, SyncState::Pending);
        assert_eq!(view.message, "1 change pending");
        assert!(!view.has_issues);
    }

    #[test]
    fn online_synced() {
        let view = StatusView::derive(true, 0);
        assert_eq!(view.status, SyncState::Synced);
        assert_eq!(view.message, "No changes to sync");
        assert!(!view.has_issues);
        assert_eq!(view.color.hex(), "#4caf50");
    }

    #[test]
    fn serialized_shape() {
        let json = serde_json::to_string(&StatusView::derive(true, 2)).unwrap();
        assert!(json.contains("\"status\":\"pending\""));
        assert!(json.contains("\"hasIssues\":false"));
    }
}
