use crate::core::error::{ExchangeError, StoreError, ValidationError};
use crate::store::{KeyValueCollection, KeyValueStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

const USERS_COLLECTION: &str = "users";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub user_id: u64,
    pub username: String,
    pub registered_at: DateTime<Utc>,
}

/// Usernames and their ids. No credentials are kept.
#[derive(Clone)]
pub struct UserDirectory {
    users: Arc<dyn KeyValueCollection>,
}

impl UserDirectory {
    pub fn open(store: &KeyValueStore) -> Result<Self, StoreError> {
        Ok(Self {
            users: store.collection(USERS_COLLECTION)?,
        })
    }

    pub async fn find(&self, username: &str) -> Option<User> {
        let username = username.trim();
        let bytes = match self.users.get(username.as_bytes()).await {
            Ok(bytes) => bytes?,
            Err(e) => {
                warn!(username, error = %e, "Failed to read user");
                return None;
            }
        };
        serde_json::from_slice(&bytes)
            .inspect_err(|e| warn!(username, error = %e, "User record is corrupted"))
            .ok()
    }

    pub async fn all(&self) -> Vec<User> {
        let rows = match self.users.scan_prefix(b"").await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(error = %e, "Failed to list users");
                return Vec::new();
            }
        };
        let mut users: Vec<User> = rows
            .into_iter()
            .filter_map(|(_, value)| serde_json::from_slice(&value).ok())
            .collect();
        users.sort_by_key(|u| u.user_id);
        users
    }

    /// Adds `username` with the next free id. Callers must serialise registrations.
    pub async fn register(
        &self,
        username: &str,
        now: DateTime<Utc>,
    ) -> Result<User, ExchangeError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(ValidationError::EmptyUsername.into());
        }
        if self.users.get(username.as_bytes()).await?.is_some() {
            return Err(ValidationError::UsernameTaken(username.to_string()).into());
        }

        let user_id = self.all().await.iter().map(|u| u.user_id).max().unwrap_or(0) + 1;
        let user = User {
            user_id,
            username: username.to_string(),
            registered_at: now,
        };
        self.users
            .put(username.as_bytes(), serde_json::to_vec_pretty(&user).map_err(StoreError::from)?)
            .await?;
        info!(user_id, username, "User registered");
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_assigns_sequential_ids() {
        let users = UserDirectory::open(&KeyValueStore::in_memory()).unwrap();
        let now = Utc::now();

        let alice = users.register("alice", now).await.unwrap();
        let bob = users.register("  bob ", now).await.unwrap();
        assert_eq!((alice.user_id, bob.user_id), (1, 2));
        assert_eq!(bob.username, "bob");

        assert_eq!(users.find("alice").await, Some(alice));
        assert!(users.find("carol").await.is_none());
        assert_eq!(users.all().await.len(), 2);
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates_and_empty() {
        let users = UserDirectory::open(&KeyValueStore::in_memory()).unwrap();
        users.register("alice", Utc::now()).await.unwrap();

        assert!(matches!(
            users.register("alice", Utc::now()).await,
            Err(ExchangeError::Validation(ValidationError::UsernameTaken(_)))
        ));
        assert!(matches!(
            users.register("   ", Utc::now()).await,
            Err(ExchangeError::Validation(ValidationError::EmptyUsername))
        ));
    }
}
