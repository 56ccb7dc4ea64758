//! Directory query provider
//!
//! Finds active accounts without enabled TOTP. [`MongoDirectory`] reads the
//! Rocket.Chat `users` collection directly.

use crate::error::DirectoryError;
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use serde::Deserialize;
use std::collections::BTreeSet;

/// Default MongoDB connection string
pub const DEFAULT_MONGO_URI: &str = "mongodb://localhost:27017";

/// Default Rocket.Chat database name
pub const DEFAULT_MONGO_DATABASE: &str = "rocketchat";

/// Source of non-compliant usernames
#[async_trait]
pub trait DirectoryQuery: Send + Sync {
    /// Active usernames lacking enabled 2FA, skipping accounts holding any
    /// of `excluded_roles`
    async fn find_noncompliant(
        &self,
        excluded_roles: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, DirectoryError>;
}

/// MongoDB connection settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConfig {
    /// Connection string
    pub uri: String,
    /// Database holding the `users` collection
    pub database: String,
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            uri: DEFAULT_MONGO_URI.to_string(),
            database: DEFAULT_MONGO_DATABASE.to_string(),
        }
    }
}

/// Projection of a Rocket.Chat user document
#[derive(Debug, Deserialize)]
struct UserDocument {
    username: Option<String>,
}

/// Rocket.Chat user directory backed by MongoDB
#[derive(Debug, Clone)]
pub struct MongoDirectory {
    users: mongodb::Collection<UserDocument>,
}

impl MongoDirectory {
    /// Create client for the configured database
    ///
    /// The driver connects lazily; an unreachable server surfaces on the
    /// first query.
    pub async fn connect(config: &MongoConfig) -> Result<Self, DirectoryError> {
        let client = mongodb::Client::with_uri_str(&config.uri)
            .await
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;
        let users = client
            .database(&config.database)
            .collection::<UserDocument>("users");
        Ok(Self { users })
    }
}

#[async_trait]
impl DirectoryQuery for MongoDirectory {
    async fn find_noncompliant(
        &self,
        excluded_roles: &BTreeSet<String>,
    ) -> Result<BTreeSet<String>, DirectoryError> {
        let mut cursor = self
            .users
            .find(noncompliant_filter(excluded_roles))
            .projection(doc! { "username": 1, "_id": 0 })
            .await?;

        let mut usernames = BTreeSet::new();
        while let Some(user) = cursor.try_next().await? {
            match user.username {
                Some(name) if !name.is_empty() => {
                    usernames.insert(name);
                }
                _ => tracing::debug!("Skipping user document without username"),
            }
        }

        tracing::debug!("Directory returned {} users without 2FA", usernames.len());
        Ok(usernames)
    }
}

/// Query selecting active users whose TOTP is missing or disabled
#[must_use]
pub fn noncompliant_filter(excluded_roles: &BTreeSet<String>) -> Document {
    let roles: Vec<&str> = excluded_roles.iter().map(String::as_str).collect();
    doc! {
        "$or": [
            { "services.totp": { "$exists": false } },
            { "services.totp.enabled": false },
        ],
        "active": true,
        "roles": { "$nin": roles },
    }
}
