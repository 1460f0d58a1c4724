//! Presentation state
//!
//! Transient UI state owned by the view, independent of data refreshes:
//! a new snapshot never resets selection, expanded panels or the theme.
//! Everything is keyed by device `Name`, so state follows a device across
//! snapshots and simply goes dormant while the device is absent.

use chrono::{DateTime, Utc};
use std::collections::HashSet;

use crate::error::{FailureKind, PollerError};
use crate::models::DeviceView;
use crate::poller::{CycleReport, FleetSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationLevel {
    Success,
    Failure,
}

/// Transient message shown after a manual refresh
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl Notification {
    pub fn from_refresh(result: &Result<CycleReport, PollerError>) -> Self {
        let (level, message) = match result {
            Ok(report) => (
                NotificationLevel::Success,
                format!("Refreshed {} devices", report.devices),
            ),
            Err(PollerError::Stopped) => (NotificationLevel::Failure, "Viewer is shutting down".to_string()),
            Err(PollerError::Fetch(e)) => {
                let what = match e.kind() {
                    FailureKind::Network => "backend unreachable",
                    FailureKind::Malformed => "backend sent unexpected data",
                };
                (NotificationLevel::Failure, format!("Refresh failed: {} ({})", what, e))
            }
        };
        Self { level, message, at: Utc::now() }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PresentationState {
    selected: Option<String>,
    expanded: HashSet<String>,
    dark_mode: bool,
    notification: Option<Notification>,
}

impl PresentationState {
    pub fn new(dark_mode: bool) -> Self {
        Self { dark_mode, ..Default::default() }
    }

    pub fn select(&mut self, name: impl Into<String>) {
        self.selected = Some(name.into());
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
    }

    pub fn selected(&self) -> Option<&str> {
        self.selected.as_deref()
    }

    /// Selected device in this snapshot, if it is still part of the fleet
    pub fn selected_device<'a>(&self, snapshot: &'a FleetSnapshot) -> Option<&'a DeviceView> {
        self.selected.as_deref().and_then(|name| snapshot.device(name))
    }

    /// Returns the new expanded state
    pub fn toggle_expanded(&mut self, name: &str) -> bool {
        if self.expanded.remove(name) {
            false
        } else {
            self.expanded.insert(name.to_string());
            true
        }
    }

    pub fn is_expanded(&self, name: &str) -> bool {
        self.expanded.contains(name)
    }

    pub fn toggle_dark_mode(&mut self) -> bool {
        self.dark_mode = !self.dark_mode;
        self.dark_mode
    }

    pub fn dark_mode(&self) -> bool {
        self.dark_mode
    }

    pub fn notify(&mut self, notification: Notification) {
        self.notification = Some(notification);
    }

    pub fn notification(&self) -> Option<&Notification> {
        self.notification.as_ref()
    }

    pub fn dismiss_notification(&mut self) {
        self.notification = None;
    }
}
