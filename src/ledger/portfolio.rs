use crate::core::error::StoreError;
use crate::core::wallet::Portfolio;
use crate::store::{KeyValueCollection, KeyValueStore};
use std::sync::Arc;
use tracing::{debug, warn};

const PORTFOLIOS_COLLECTION: &str = "portfolios";

/// Durable per-user portfolios, one document per user.
#[derive(Clone)]
pub struct PortfolioLedger {
    portfolios: Arc<dyn KeyValueCollection>,
}

impl PortfolioLedger {
    pub fn open(store: &KeyValueStore) -> Result<Self, StoreError> {
        Ok(Self {
            portfolios: store.collection(PORTFOLIOS_COLLECTION)?,
        })
    }

    /// The user's portfolio. Missing or unreadable documents load as an empty portfolio.
    pub async fn load(&self, user_id: u64) -> Portfolio {
        let bytes = match self.portfolios.get(user_key(user_id).as_bytes()).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!(user_id, "No portfolio yet");
                return Portfolio::empty(user_id);
            }
            Err(e) => {
                warn!(user_id, error = %e, "Failed to read portfolio, treating as empty");
                return Portfolio::empty(user_id);
            }
        };

        match serde_json::from_slice::<Portfolio>(&bytes) {
            Ok(portfolio) if portfolio.user_id() == user_id => portfolio,
            Ok(portfolio) => {
                warn!(
                    user_id,
                    stored_user_id = portfolio.user_id(),
                    "Portfolio belongs to another user, treating as empty"
                );
                Portfolio::empty(user_id)
            }
            Err(e) => {
                warn!(user_id, error = %e, "Portfolio is corrupted, treating as empty");
                Portfolio::empty(user_id)
            }
        }
    }

    /// Replaces the user's whole record in one write.
    pub async fn save(&self, portfolio: &Portfolio) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(portfolio)?;
        self.portfolios
            .put(user_key(portfolio.user_id()).as_bytes(), bytes)
            .await?;
        debug!(user_id = portfolio.user_id(), "Portfolio saved");
        Ok(())
    }
}

fn user_key(user_id: u64) -> String {
    user_id.to_string()
}
