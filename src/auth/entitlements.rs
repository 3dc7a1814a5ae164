//! Per-request entitlement lookup against the external authorization
//! service.
//!
//! The service maps a user number to the experiment (RB) numbers that
//! user may read. Lookups happen once per protected request and are not
//! cached; ownership can be revoked upstream and must take effect
//! immediately. A failed lookup fails the request closed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::EntitlementError;

/// Timeout for one entitlement lookup.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of the experiment numbers a user may access.
///
/// The production implementation talks HTTP; tests substitute an
/// in-memory mock.
#[async_trait]
pub trait EntitlementProvider: Send + Sync {
    /// Experiment numbers `user_number` is entitled to read.
    async fn experiments_for(&self, user_number: u32) -> Result<Vec<u32>, EntitlementError>;
}

/// HTTP-backed provider: `GET {base_url}/experiment?user_number={n}`
/// authenticated with a service bearer credential.
#[derive(Clone)]
pub struct HttpEntitlementProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl HttpEntitlementProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, EntitlementError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| EntitlementError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl EntitlementProvider for HttpEntitlementProvider {
    async fn experiments_for(&self, user_number: u32) -> Result<Vec<u32>, EntitlementError> {
        let url = format!("{}/experiment?user_number={}", self.base_url, user_number);
        debug!(user_number, "fetching entitlements");

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|err| EntitlementError::Transport(err.to_string()))?;

        if !response.status().is_success() {
            return Err(EntitlementError::Status {
                status: response.status().as_u16(),
            });
        }

        response
            .json::<Vec<u32>>()
            .await
            .map_err(|err| EntitlementError::Transport(err.to_string()))
    }
}

// =============================================================================
// Tests
// =============================================================================
