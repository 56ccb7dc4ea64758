//! rc2fa Core - Rocket.Chat 2FA compliance checker
//!
//! Audits the user directory for accounts without two-factor authentication:
//! - Reminds each non-compliant user by direct message
//! - Tracks reminder history across runs
//! - Detects users who enabled 2FA since the last run
//! - Sends an aggregated report to administrators
//!
//! # Example
//!
//! ```rust,ignore
//! use rc2fa_core::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = MongoDirectory::connect(&MongoConfig::default()).await?;
//! let webhook = RocketChatWebhook::new(WebhookConfig::new("https://chat.example.org/hooks/x"))?;
//! let store = JsonFileRepository::new("storage.db");
//!
//! let checker = TwoFactorChecker::new(
//!     CheckerConfig::new().with_admin_targets(["#security"]),
//!     Arc::new(directory),
//!     Arc::new(webhook),
//!     Arc::new(store),
//! );
//!
//! let all_delivered = checker.check_and_notify().await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod checker;
pub mod directory;
pub mod error;
pub mod report;
pub mod store;
pub mod transport;
pub mod types;

// Re-exports for convenience
pub use checker::TwoFactorChecker;
pub use directory::{DirectoryQuery, MongoConfig, MongoDirectory};
pub use error::{CheckerError, DirectoryError, MessageError, StoreError, TransportError};
pub use report::{user_notification, AdminReport, ReportRow};
pub use store::{
    JsonFileRepository, MemoryRepository, TrackingRecords, TrackingRepository, TrackingSession,
};
pub use transport::{
    Attachment, NotificationTransport, RocketChatWebhook, WebhookConfig, WebhookMessage,
};
pub use types::{CheckerConfig, Clock, CycleOutcome, SystemClock, UserTrackingRecord};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running a check
    pub use crate::{
        CheckerConfig, CycleOutcome, DirectoryQuery, JsonFileRepository, MongoConfig,
        MongoDirectory, NotificationTransport, RocketChatWebhook, TrackingRepository,
        TwoFactorChecker, WebhookConfig,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
