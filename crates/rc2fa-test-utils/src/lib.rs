//! Testing utilities for rc2fa workspace
//!
//! Scriptable stand-ins for the directory, the webhook transport and the
//! clock.

#![allow(missing_docs)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;
use rc2fa_core::{
    CheckerConfig, Clock, DirectoryError, DirectoryQuery, MemoryRepository, NotificationTransport,
    TransportError, TwoFactorChecker, WebhookMessage,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Directory whose answer can be changed between cycles
#[derive(Debug, Default)]
pub struct ScriptedDirectory {
    users: Mutex<BTreeSet<String>>,
    fail: Mutex<bool>,
    last_excluded_roles: Mutex<Option<BTreeSet<String>>>,
}

impl ScriptedDirectory {
    pub fn new(users: &[&str]) -> Self {
        let dir = Self::default();
        dir.set_users(users);
        dir
    }

    pub fn set_users(&self, users: &[&str]) {
        *self.users.lock() = users.iter().map(|u| (*u).to_string()).collect();
    }

    pub fn set_failing(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn last_excluded_roles(&self) -> Option<BTreeSet<String>> {
        self.last_excluded_roles.lock().clone()
    }
}

#[async_trait]
impl DirectoryQuery for ScriptedDirectory {
    async fn find_noncompliant(
        &self,
        excluded_roles: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, DirectoryError> {
        *self.last_excluded_roles.lock() = Some(excluded_roles.clone());
        if *self.fail.lock() {
            return Err(DirectoryError::Connection("connection refused".to_string()));
        }
        Ok(self.users.lock().clone())
    }
}

/// Transport recording every message, failing for chosen channels
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<WebhookMessage>>,
    failing_channels: Mutex<BTreeSet<String>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail delivery to `channel` (e.g. `@bob` or `#admins`)
    pub fn fail_channel(&self, channel: &str) {
        self.failing_channels.lock().insert(channel.to_string());
    }

    pub fn sent(&self) -> Vec<WebhookMessage> {
        self.sent.lock().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.sent
            .lock()
            .iter()
            .map(|m| m.channel().to_string())
            .collect()
    }

    pub fn message_to(&self, channel: &str) -> Option<WebhookMessage> {
        self.sent
            .lock()
            .iter()
            .find(|m| m.channel() == channel)
            .cloned()
    }
}

#[async_trait]
impl NotificationTransport for RecordingTransport {
    async fn send(&self, message: &WebhookMessage) -> Result<(), TransportError> {
        self.sent.lock().push(message.clone());
        if self.failing_channels.lock().contains(message.channel()) {
            return Err(TransportError::Rejected { status: 503 });
        }
        Ok(())
    }
}

/// Clock advanced by hand
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn advance_days(&self, days: i64) {
        let mut now = self.now.lock();
        *now += Duration::days(days);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(start_time())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Fixed start time used across tests
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 12, 7, 0, 0).unwrap()
}

/// Collaborators of a checker under test
#[derive(Debug, Clone)]
pub struct Harness {
    pub directory: Arc<ScriptedDirectory>,
    pub transport: Arc<RecordingTransport>,
    pub repository: Arc<MemoryRepository>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(users: &[&str]) -> Self {
        Self::with_repository(users, MemoryRepository::new())
    }

    pub fn with_repository(users: &[&str], repository: MemoryRepository) -> Self {
        Self {
            directory: Arc::new(ScriptedDirectory::new(users)),
            transport: Arc::new(RecordingTransport::new()),
            repository: Arc::new(repository),
            clock: Arc::new(ManualClock::default()),
        }
    }

    pub fn checker(&self, config: CheckerConfig) -> TwoFactorChecker {
        TwoFactorChecker::new(
            config,
            self.directory.clone(),
            self.transport.clone(),
            self.repository.clone(),
        )
        .with_clock(self.clock.clone())
    }
}

pub fn usernames(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}
