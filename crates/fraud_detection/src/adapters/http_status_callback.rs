// Rust guideline compliant 2026-10-12

//! HTTP adapter for the `StatusCallback` port.
//!
//! Sends `PATCH {base}/transactions/{id}/status` with `{"status": "..."}` to
//! the transactions service. Any 2xx is success.

use std::time::Duration;

use domain::{CallbackError, StatusCallback, TransactionId, TransactionStatus};
use reqwest::{Client, StatusCode};
use serde::Serialize;

#[derive(Serialize)]
struct StatusBody {
    status: TransactionStatus,
}

/// `reqwest` client for the status-update callback.
#[derive(Debug, Clone)]
pub struct HttpStatusCallback {
    client: Client,
    base_url: String,
}

impl HttpStatusCallback {
    /// Create a callback against `base_url` with a total request `timeout`.
    ///
    /// # Errors
    ///
    /// Returns `reqwest::Error` if the HTTP client cannot be initialised.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_owned();
        Ok(Self { client, base_url })
    }

    fn status_url(&self, id: TransactionId) -> String {
        format!("{}/transactions/{id}/status", self.base_url)
    }
}

impl StatusCallback for HttpStatusCallback {
    async fn update_status(
        &self,
        id: TransactionId,
        status: TransactionStatus,
    ) -> Result<(), CallbackError> {
        let response = self
            .client
            .patch(self.status_url(id))
            .json(&StatusBody { status })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CallbackError::Timeout
                } else {
                    CallbackError::Transport { reason: e.to_string() }
                }
            })?;

        match response.status() {
            s if s.is_success() => {
                tracing::debug!(id, %status, "callback.status.accepted");
                Ok(())
            }
            StatusCode::NOT_FOUND => Err(CallbackError::NotFound { id }),
            other => Err(CallbackError::UnexpectedStatus { status: other.as_u16() }),
        }
    }
}
