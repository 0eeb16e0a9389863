//! Consumed backend contract.
//!
//! The onboarding core does not own the backend; it only calls a handful
//! of endpoints, all fire-and-forget from the tour's perspective. Failures
//! are logged by the callers, never propagated as tour-breaking errors.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::json;

use crate::error::ApiError;

/// Backend calls the onboarding core consumes.
#[async_trait]
pub trait OnboardingApi: Send + Sync {
    /// Persist arbitrary onboarding progress under the settings resource.
    async fn persist_progress(&self, key: &str, value: &serde_json::Value)
    -> Result<(), ApiError>;

    /// Mark a named step complete.
    async fn complete_step(&self, name: &str) -> Result<(), ApiError>;

    /// Mark the tour complete with a timestamp.
    async fn complete_tour(&self, at: DateTime<Utc>) -> Result<(), ApiError>;

    /// Submit founder contact details.
    async fn submit_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        finalize: bool,
    ) -> Result<(), ApiError>;

    /// Clear all server-side onboarding flags.
    async fn reset_flags(&self) -> Result<(), ApiError>;
}

/// No-op implementation for tests and the demo shell.
pub struct NullApi;

#[async_trait]
impl OnboardingApi for NullApi {
    async fn persist_progress(
        &self,
        _key: &str,
        _value: &serde_json::Value,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn complete_step(&self, _name: &str) -> Result<(), ApiError> {
        Ok(())
    }

    async fn complete_tour(&self, _at: DateTime<Utc>) -> Result<(), ApiError> {
        Ok(())
    }

    async fn submit_contact(
        &self,
        _email: Option<&str>,
        _phone: Option<&str>,
        _finalize: bool,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn reset_flags(&self) -> Result<(), ApiError> {
        Ok(())
    }
}

/// HTTP implementation over the business-console REST API.
pub struct HttpOnboardingApi {
    client: reqwest::Client,
    base_url: String,
    token: SecretString,
}

impl HttpOnboardingApi {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<(), ApiError> {
        let response = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| ApiError::Request(e.to_string()))?;
        if !response.status().is_success() {
            return Err(ApiError::Status {
                code: response.status().as_u16(),
            });
        }
        Ok(())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl OnboardingApi for HttpOnboardingApi {
    async fn persist_progress(
        &self,
        key: &str,
        value: &serde_json::Value,
    ) -> Result<(), ApiError> {
        let body = json!({ "key": key, "value": value });
        self.send(
            self.client
                .patch(self.url("/api/settings/onboarding"))
                .json(&body),
        )
        .await
    }

    async fn complete_step(&self, name: &str) -> Result<(), ApiError> {
        self.send(
            self.client
                .post(self.url(&format!("/api/onboarding/steps/{name}/complete"))),
        )
        .await
    }

    async fn complete_tour(&self, at: DateTime<Utc>) -> Result<(), ApiError> {
        let body = json!({ "completed_at": at.to_rfc3339() });
        self.send(
            self.client
                .post(self.url("/api/onboarding/complete"))
                .json(&body),
        )
        .await
    }

    async fn submit_contact(
        &self,
        email: Option<&str>,
        phone: Option<&str>,
        finalize: bool,
    ) -> Result<(), ApiError> {
        let body = json!({
            "email": email,
            "phone": phone,
            "finalize": finalize,
        });
        self.send(
            self.client
                .post(self.url("/api/onboarding/founder-contact"))
                .json(&body),
        )
        .await
    }

    async fn reset_flags(&self) -> Result<(), ApiError> {
        self.send(self.client.delete(self.url("/api/settings/onboarding")))
            .await
    }
}
