//! Message builders
//!
//! Renders the per-user reminder and the aggregated admin report into typed
//! [`WebhookMessage`]s.

use crate::error::MessageError;
use crate::transport::{Attachment, WebhookMessage};
use crate::types::{CheckerConfig, UserTrackingRecord};
use std::collections::BTreeSet;

/// Title of the per-user reminder
pub const USER_NOTICE_TITLE: &str = "Two factor authentication";

/// Title of the admin report
pub const ADMIN_REPORT_TITLE: &str = "RC 2FA Report";

const USER_TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";
const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Direct reminder for one non-compliant user
pub fn user_notification(
    record: &UserTrackingRecord,
    config: &CheckerConfig,
) -> Result<WebhookMessage, MessageError> {
    let count = record.failure_count;
    let text = format!(
        ":warning: Please remember to enable 2FA for your Rocket.Chat account (`{username}`)! \
         :warning:\n\n\
         You have been reminded {count} {times} since {first}.\n\n\
         (This is an automated message.)",
        username = record.username,
        times = if count == 1 { "time" } else { "times" },
        first = record.first_failure_time.format(USER_TIME_FORMAT),
    );
    let attachment = Attachment::new(USER_NOTICE_TITLE, text, &config.alert_color)?;
    WebhookMessage::direct(&record.username, &config.bot_name, attachment)
}

/// One row of the non-compliant table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    /// Username
    pub username: String,
    /// Cumulative reminder count
    pub failure_count: u32,
    /// First detection, rendered as a date
    pub first_failure_date: String,
}

/// Aggregated cycle report for administrators
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminReport {
    rows: Vec<ReportRow>,
    reformed: Vec<String>,
    failed: Vec<String>,
}

impl AdminReport {
    /// Build the report from post-mutation records of the non-compliant set
    #[must_use]
    pub fn new(
        noncompliant: impl IntoIterator<Item = UserTrackingRecord>,
        reformed: &BTreeSet<String>,
        failed: &BTreeSet<String>,
    ) -> Self {
        let mut rows: Vec<ReportRow> = noncompliant
            .into_iter()
            .map(|r| ReportRow {
                first_failure_date: r.first_failure_time.format(REPORT_DATE_FORMAT).to_string(),
                failure_count: r.failure_count,
                username: r.username,
            })
            .collect();
        rows.sort_by(|a, b| a.username.cmp(&b.username));

        Self {
            rows,
            reformed: reformed.iter().cloned().collect(),
            failed: failed.iter().cloned().collect(),
        }
    }

    /// Non-compliant rows, sorted by username
    #[inline]
    #[must_use]
    pub fn rows(&self) -> &[ReportRow] {
        &self.rows
    }

    /// Markdown body
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();

        if self.rows.is_empty() {
            out.push_str("No users are currently missing 2FA.\n\n");
        } else {
            out.push_str("The following users are missing 2FA and have been notified:\n\n");
        }
        out.push_str("| User | Notifications | First notified |\n");
        out.push_str("|------|---------------|----------------|\n");
        for row in &self.rows {
            out.push_str(&format!(
                "| {} | {} | {} |\n",
                row.username, row.failure_count, row.first_failure_date
            ));
        }

        if !self.reformed.is_empty() {
            out.push_str("\nThe following users have enabled 2FA or are no longer active:\n");
            push_list(&mut out, &self.reformed);
        }

        if !self.failed.is_empty() {
            out.push_str("\nNotifying the following users failed:\n");
            push_list(&mut out, &self.failed);
        }

        out.trim_end().to_string()
    }

    /// Webhook message for one admin target
    pub fn to_message(
        &self,
        target: &str,
        config: &CheckerConfig,
    ) -> Result<WebhookMessage, MessageError> {
        let attachment = Attachment::new(ADMIN_REPORT_TITLE, self.render(), &config.alert_color)?;
        WebhookMessage::to_channel(target, &config.bot_name, attachment)
    }
}

fn push_list(out: &mut String, items: &[String]) {
    for item in items {
        out.push_str(&format!("- {item}\n"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn record(name: &str, count: u32, day: u32) -> UserTrackingRecord {
        UserTrackingRecord {
            username: name.to_string(),
            first_failure_time: Utc.with_ymd_and_hms(2026, 5, day, 14, 30, 0).unwrap(),
            failure_count: count,
        }
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn user_notification_carries_history() {
        let msg = user_notification(&record("alice", 3, 2), &CheckerConfig::new()).unwrap();

        assert_eq!(msg.channel(), "@alice");
        assert_eq!(msg.attachments()[0].title(), USER_NOTICE_TITLE);
        assert!(msg.text().contains("(`alice`)"));
        assert!(msg.text().contains("reminded 3 times since 2026-05-02 14:30 UTC"));
    }

    #[test]
    fn user_notification_singular() {
        let msg = user_notification(&record("bob", 1, 2), &CheckerConfig::new()).unwrap();
        assert!(msg.text().contains("reminded 1 time since"));
    }

    #[test]
    fn report_sorts_rows_and_omits_empty_sections() {
        let report = AdminReport::new(
            vec![record("zoe", 1, 9), record("alice", 4, 1)],
            &BTreeSet::new(),
            &BTreeSet::new(),
        );

        assert_eq!(
            report.rows(),
            &[
                ReportRow {
                    username: "alice".to_string(),
                    failure_count: 4,
                    first_failure_date: "2026-05-01".to_string(),
                },
                ReportRow {
                    username: "zoe".to_string(),
                    failure_count: 1,
                    first_failure_date: "2026-05-09".to_string(),
                },
            ]
        );
        assert_eq!(
            report.render(),
            "The following users are missing 2FA and have been notified:\n\n\
             | User | Notifications | First notified |\n\
             |------|---------------|----------------|\n\
             | alice | 4 | 2026-05-01 |\n\
             | zoe | 1 | 2026-05-09 |"
        );
    }

    #[test]
    fn report_includes_reformed_and_failed() {
        let report = AdminReport::new(
            vec![record("carol", 2, 3)],
            &set(&["bob"]),
            &set(&["carol"]),
        );
        let text = report.render();

        assert!(text.contains("have enabled 2FA or are no longer active:\n- bob"));
        assert!(text.contains("Notifying the following users failed:\n- carol"));
    }

    #[test]
    fn empty_report_still_has_table() {
        let report = AdminReport::new(Vec::new(), &set(&["bob"]), &BTreeSet::new());
        let text = report.render();

        assert!(text.starts_with("No users are currently missing 2FA."));
        assert!(text.contains("| User | Notifications | First notified |"));
        assert!(text.contains("- bob"));
    }

    #[test]
    fn report_message_targets_channel() {
        let report = AdminReport::new(Vec::new(), &BTreeSet::new(), &BTreeSet::new());
        let msg = report.to_message("#security", &CheckerConfig::new()).unwrap();

        assert_eq!(msg.channel(), "#security");
        assert_eq!(msg.attachments()[0].title(), ADMIN_REPORT_TITLE);
        assert_eq!(msg.attachments()[0].color(), "#ff0000");
    }

    #[test]
    fn messages_use_configured_sender_and_color() {
        let config = CheckerConfig::new()
            .with_bot_name("Security Bot")
            .with_alert_color("#ffa500");

        let notice = user_notification(&record("alice", 1, 2), &config).unwrap();
        assert_eq!(notice.sender(), "Security Bot");
        assert_eq!(notice.attachments()[0].color(), "#ffa500");

        let report = AdminReport::new(Vec::new(), &BTreeSet::new(), &BTreeSet::new());
        let msg = report.to_message("#security", &config).unwrap();
        assert_eq!(msg.sender(), "Security Bot");
        assert_eq!(msg.attachments()[0].color(), "#ffa500");
    }
}
