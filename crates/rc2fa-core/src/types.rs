//! Core types for rc2fa
//!
//! Tracking records, checker configuration, cycle outcome and the clock seam.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Roles excluded from the directory query unless configured otherwise
pub const DEFAULT_IGNORED_ROLES: &[&str] = &["bot", "app"];

/// Display name used for every webhook message
pub const DEFAULT_BOT_NAME: &str = "2FA Bot";

/// Attachment color used for every webhook message
pub const DEFAULT_ALERT_COLOR: &str = "#ff0000";

/// Per-user notification history
///
/// Owned by the tracking store. `first_failure_time` is fixed at creation;
/// `failure_count` only ever grows while the record lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTrackingRecord {
    /// Directory username (store key)
    pub username: String,
    /// When the user was first found without 2FA
    pub first_failure_time: DateTime<Utc>,
    /// Number of cycles the user has been found without 2FA
    pub failure_count: u32,
}

impl UserTrackingRecord {
    /// Create a fresh record with a zero count
    #[inline]
    #[must_use]
    pub fn new(username: impl Into<String>, first_failure_time: DateTime<Utc>) -> Self {
        Self {
            username: username.into(),
            first_failure_time,
            failure_count: 0,
        }
    }

    /// Count one more non-compliant cycle
    #[inline]
    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
    }
}

/// Checker configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// Usernames never notified and never reported as reformed
    pub ignored_users: BTreeSet<String>,
    /// Roles excluded from the directory query
    pub ignored_roles: BTreeSet<String>,
    /// Channels receiving the admin report
    pub admin_targets: BTreeSet<String>,
    /// Log payloads instead of sending them
    pub dry_run: bool,
    /// Sender display name on webhook messages
    pub bot_name: String,
    /// Attachment color on webhook messages
    pub alert_color: String,
}

impl CheckerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With ignored usernames
    #[must_use]
    pub fn with_ignored_users<I, S>(mut self, users: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_users = users.into_iter().map(Into::into).collect();
        self
    }

    /// With ignored roles (replaces the defaults)
    #[must_use]
    pub fn with_ignored_roles<I, S>(mut self, roles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignored_roles = roles.into_iter().map(Into::into).collect();
        self
    }

    /// With admin report targets
    #[must_use]
    pub fn with_admin_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.admin_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    /// With dry-run mode
    #[inline]
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// With sender display name
    #[inline]
    #[must_use]
    pub fn with_bot_name(mut self, name: impl Into<String>) -> Self {
        self.bot_name = name.into();
        self
    }

    /// With attachment color
    #[inline]
    #[must_use]
    pub fn with_alert_color(mut self, color: impl Into<String>) -> Self {
        self.alert_color = color.into();
        self
    }
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            ignored_users: BTreeSet::new(),
            ignored_roles: DEFAULT_IGNORED_ROLES.iter().map(|r| (*r).to_string()).collect(),
            admin_targets: BTreeSet::new(),
            dry_run: false,
            bot_name: DEFAULT_BOT_NAME.to_string(),
            alert_color: DEFAULT_ALERT_COLOR.to_string(),
        }
    }
}

/// Result of one check-and-notify cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleOutcome {
    /// Users without 2FA after filtering (`N`)
    pub noncompliant: BTreeSet<String>,
    /// Previously tracked users no longer non-compliant (`R`)
    pub reformed: BTreeSet<String>,
    /// Users whose direct notification failed
    pub failed_notifications: BTreeSet<String>,
    /// Admin targets whose report delivery failed
    pub failed_admin_targets: BTreeSet<String>,
    /// Whether every notification succeeded
    pub success: bool,
}

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current UTC time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    #[inline]
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_starts_at_zero() {
        let now = Utc::now();
        let mut record = UserTrackingRecord::new("alice", now);
        assert_eq!(record.failure_count, 0);

        record.record_failure();
        record.record_failure();
        assert_eq!(record.failure_count, 2);
        assert_eq!(record.first_failure_time, now);
    }

    #[test]
    fn config_defaults() {
        let config = CheckerConfig::new();
        assert!(config.ignored_roles.contains("bot"));
        assert!(config.ignored_roles.contains("app"));
        assert!(config.admin_targets.is_empty());
        assert!(!config.dry_run);
        assert_eq!(config.bot_name, "2FA Bot");
    }

    #[test]
    fn config_builder() {
        let config = CheckerConfig::new()
            .with_ignored_users(["admin"])
            .with_ignored_roles(["guest"])
            .with_admin_targets(["#security"])
            .with_dry_run(true)
            .with_bot_name("Security Bot")
            .with_alert_color("#ffa500");

        assert!(config.ignored_users.contains("admin"));
        assert_eq!(config.ignored_roles.len(), 1);
        assert!(config.admin_targets.contains("#security"));
        assert!(config.dry_run);
        assert_eq!(config.bot_name, "Security Bot");
        assert_eq!(config.alert_color, "#ffa500");
    }
}
