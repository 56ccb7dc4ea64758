//! 2FA checker
//!
//! Runs one reconciliation cycle:
//! - Queries the directory for users without 2FA
//! - Diffs them against the tracking store
//! - Reminds every non-compliant user, isolating delivery failures
//! - Drops records of reformed users
//! - Sends the aggregated report to admin targets
//! - Commits the store

use crate::directory::DirectoryQuery;
use crate::error::{CheckerError, MessageError, TransportError};
use crate::report::{user_notification, AdminReport};
use crate::store::{TrackingRepository, TrackingSession};
use crate::transport::{NotificationTransport, WebhookMessage};
use crate::types::{CheckerConfig, Clock, CycleOutcome, SystemClock, UserTrackingRecord};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Reconciliation engine
///
/// Owns its collaborators for its whole lifetime; one instance runs cycles
/// strictly one after another.
pub struct TwoFactorChecker {
    config: CheckerConfig,
    directory: Arc<dyn DirectoryQuery>,
    transport: Arc<dyn NotificationTransport>,
    repository: Arc<dyn TrackingRepository>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for TwoFactorChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwoFactorChecker")
            .field("config", &self.config)
            .field("repository", &self.repository)
            .finish_non_exhaustive()
    }
}

/// Why a single delivery failed
#[derive(Debug, thiserror::Error)]
enum DeliveryError {
    #[error(transparent)]
    Message(#[from] MessageError),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl TwoFactorChecker {
    /// Create checker with the wall clock
    #[must_use]
    pub fn new(
        config: CheckerConfig,
        directory: Arc<dyn DirectoryQuery>,
        transport: Arc<dyn NotificationTransport>,
        repository: Arc<dyn TrackingRepository>,
    ) -> Self {
        Self {
            config,
            directory,
            transport,
            repository,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the time source
    #[inline]
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &CheckerConfig {
        &self.config
    }

    /// Run one cycle and report whether every notification succeeded
    ///
    /// # Errors
    /// Store and directory failures abort the cycle without committing.
    pub async fn check_and_notify(&self) -> Result<bool, CheckerError> {
        self.run_cycle().await.map(|outcome| outcome.success)
    }

    /// Run one cycle and return its full outcome
    ///
    /// # Errors
    /// Store and directory failures abort the cycle without committing.
    pub async fn run_cycle(&self) -> Result<CycleOutcome, CheckerError> {
        let mut session = TrackingSession::open(self.repository.as_ref())?;

        let noncompliant: BTreeSet<String> = self
            .directory
            .find_noncompliant(&self.config.ignored_roles)
            .await?
            .difference(&self.config.ignored_users)
            .cloned()
            .collect();

        let reformed: BTreeSet<String> = session
            .keys()
            .into_iter()
            .filter(|u| !noncompliant.contains(u) && !self.config.ignored_users.contains(u))
            .collect();

        tracing::info!(
            "Found {} users without 2FA ({} tracked, {} reformed)",
            noncompliant.len(),
            session.len(),
            reformed.len()
        );

        let now = self.clock.now();
        let mut failed_notifications = BTreeSet::new();
        for username in &noncompliant {
            let record = session.get_or_create(username, now);
            // Counts attempts, not confirmed deliveries.
            record.record_failure();

            if let Err(e) = self.notify_user(record).await {
                tracing::error!("Failed to notify user '{}': {}", username, e);
                failed_notifications.insert(username.clone());
            }
        }

        for username in &reformed {
            session.delete(username);
            tracing::debug!("User '{}' reformed, tracking record removed", username);
        }

        let records: Vec<UserTrackingRecord> = noncompliant
            .iter()
            .filter_map(|u| session.get(u).cloned())
            .collect();
        let report = AdminReport::new(records, &reformed, &failed_notifications);
        let failed_admin_targets = self.notify_admin_targets(&report).await;

        let success = failed_notifications.is_empty() && failed_admin_targets.is_empty();

        session.commit()?;

        tracing::info!(
            "Cycle finished: {} notified, {} failed, {} admin targets failed",
            noncompliant.len() - failed_notifications.len(),
            failed_notifications.len(),
            failed_admin_targets.len()
        );

        Ok(CycleOutcome {
            noncompliant,
            reformed,
            failed_notifications,
            failed_admin_targets,
            success,
        })
    }

    async fn notify_user(&self, record: &UserTrackingRecord) -> Result<(), DeliveryError> {
        let message = user_notification(record, &self.config)?;
        self.deliver(&message).await?;
        Ok(())
    }

    /// Send the report to every admin target; returns the targets that failed
    async fn notify_admin_targets(&self, report: &AdminReport) -> BTreeSet<String> {
        let mut failed = BTreeSet::new();

        if self.config.admin_targets.is_empty() {
            tracing::debug!("No admin targets configured, skipping report");
            return failed;
        }

        if self.config.dry_run {
            tracing::info!(
                "Dry run, not sending report to {} admin target(s):\n{}",
                self.config.admin_targets.len(),
                report.render()
            );
            return failed;
        }

        for target in &self.config.admin_targets {
            let message = match report.to_message(target, &self.config) {
                Ok(message) => message,
                Err(e) => {
                    tracing::error!("Invalid admin target '{}': {}", target, e);
                    failed.insert(target.clone());
                    continue;
                }
            };

            if let Err(e) = self.transport.send(&message).await {
                tracing::error!("Error notifying admin target '{}': {}", target, e);
                failed.insert(target.clone());
            }
        }

        failed
    }

    async fn deliver(&self, message: &WebhookMessage) -> Result<(), TransportError> {
        if self.config.dry_run {
            log_dry_run(message);
            return Ok(());
        }
        self.transport.send(message).await
    }
}

fn log_dry_run(message: &WebhookMessage) {
    tracing::info!(
        "Dry run, not sending to {}:\n{}",
        message.channel(),
        message.to_pretty_json()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DirectoryError;
    use crate::store::MemoryRepository;
    use async_trait::async_trait;
    use chrono::{DateTime, TimeZone, Utc};
    use parking_lot::Mutex;

    struct StaticDirectory(Vec<&'static str>);

    #[async_trait]
    impl DirectoryQuery for StaticDirectory {
        async fn find_noncompliant(
            &self,
            _excluded_roles: &BTreeSet<String>,
        ) -> Result<BTreeSet<String>, DirectoryError> {
            Ok(self.0.iter().map(|u| (*u).to_string()).collect())
        }
    }

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<String>>,
        fail_for: Vec<&'static str>,
    }

    #[async_trait]
    impl NotificationTransport for Recorder {
        async fn send(&self, message: &WebhookMessage) -> Result<(), TransportError> {
            self.sent.lock().push(message.channel().to_string());
            if self.fail_for.iter().any(|c| *c == message.channel()) {
                return Err(TransportError::Rejected { status: 500 });
            }
            Ok(())
        }
    }

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn checker(
        config: CheckerConfig,
        users: Vec<&'static str>,
        transport: Arc<Recorder>,
        repo: Arc<MemoryRepository>,
    ) -> TwoFactorChecker {
        TwoFactorChecker::new(config, Arc::new(StaticDirectory(users)), transport, repo)
            .with_clock(Arc::new(FixedClock(
                Utc.with_ymd_and_hms(2026, 1, 5, 8, 0, 0).unwrap(),
            )))
    }

    #[tokio::test]
    async fn notifies_every_noncompliant_user() {
        let transport = Arc::new(Recorder::default());
        let repo = Arc::new(MemoryRepository::new());
        let checker = checker(
            CheckerConfig::new(),
            vec!["bob", "alice"],
            transport.clone(),
            repo.clone(),
        );

        assert!(checker.check_and_notify().await.unwrap());
        assert_eq!(*transport.sent.lock(), vec!["@alice", "@bob"]);
        assert_eq!(repo.snapshot()["alice"].failure_count, 1);
    }

    #[tokio::test]
    async fn ignored_users_are_skipped() {
        let transport = Arc::new(Recorder::default());
        let repo = Arc::new(MemoryRepository::new());
        let config = CheckerConfig::new().with_ignored_users(["root"]);
        let checker = checker(config, vec!["root", "alice"], transport.clone(), repo.clone());

        let outcome = checker.run_cycle().await.unwrap();
        assert_eq!(outcome.noncompliant.len(), 1);
        assert!(!repo.snapshot().contains_key("root"));
    }

    #[tokio::test]
    async fn admin_failure_is_isolated() {
        let transport = Arc::new(Recorder {
            fail_for: vec!["#broken"],
            ..Recorder::default()
        });
        let repo = Arc::new(MemoryRepository::new());
        let config = CheckerConfig::new().with_admin_targets(["#broken", "#security"]);
        let checker = checker(config, vec!["alice"], transport.clone(), repo);

        let outcome = checker.run_cycle().await.unwrap();
        assert!(!outcome.success);
        assert!(outcome.failed_notifications.is_empty());
        assert_eq!(outcome.failed_admin_targets.len(), 1);
        assert!(transport.sent.lock().contains(&"#security".to_string()));
    }

    #[tokio::test]
    async fn dry_run_reports_once() {
        let transport = Arc::new(Recorder::default());
        let repo = Arc::new(MemoryRepository::new());
        let config = CheckerConfig::new()
            .with_dry_run(true)
            .with_admin_targets(["#a", "#b"]);
        let checker = checker(config, vec!["alice"], transport.clone(), repo.clone());

        assert!(checker.check_and_notify().await.unwrap());
        assert!(transport.sent.lock().is_empty());
        assert_eq!(repo.commit_count(), 1);
    }

    #[tokio::test]
    async fn dry_run_ignores_blank_admin_target() {
        let transport = Arc::new(Recorder::default());
        let repo = Arc::new(MemoryRepository::new());
        let config = CheckerConfig::new()
            .with_dry_run(true)
            .with_admin_targets([" ", "#security"]);
        let checker = checker(config, vec!["alice"], transport.clone(), repo);

        let outcome = checker.run_cycle().await.unwrap();
        assert!(outcome.success);
        assert!(outcome.failed_admin_targets.is_empty());
        assert!(transport.sent.lock().is_empty());
    }

    #[tokio::test]
    async fn blank_admin_target_fails_when_sending() {
        let transport = Arc::new(Recorder::default());
        let repo = Arc::new(MemoryRepository::new());
        let config = CheckerConfig::new().with_admin_targets([" ", "#security"]);
        let checker = checker(config, vec!["alice"], transport.clone(), repo);

        let outcome = checker.run_cycle().await.unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.failed_admin_targets.len(), 1);
        assert_eq!(*transport.sent.lock(), vec!["@alice", "#security"]);
    }
}
