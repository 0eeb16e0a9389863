//! Persisted flag store — typed flags over durable and session scopes.
//!
//! Onboarding must never crash the host application over storage, so every
//! read degrades to `None`/default and every write to a no-op, with a
//! warning logged. The server mirror (via [`OnboardingApi`]) is the
//! durability fallback; client storage is the fast path.

pub mod libsql_backend;
pub mod scope;

pub use libsql_backend::LibSqlScope;
pub use scope::{FlagScope, MemoryScope};

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::api::OnboardingApi;
use crate::guide::registry::Page;

/// Persisted key names. All share a prefix so `force_reset` can clear them
/// wholesale.
pub mod keys {
    pub const PREFIX: &str = "onboarding.";
    pub const GUIDE_DONE: &str = "onboarding.guide_done";
    pub const WELCOME_SEEN: &str = "onboarding.welcome_seen";
    pub const BILLING_DISMISSED: &str = "onboarding.billing_dismissed";
    pub const ONBOARDING_DONE: &str = "onboarding.done";
    pub const QUICKSTART_COMPLETED: &str = "onboarding.quickstart_completed";
    pub const TENANT_ID: &str = "onboarding.tenant_id";
    pub const LAST_TOUR_PAGE: &str = "onboarding.last_tour_page";
    pub const LAST_TOUR_STEP: &str = "onboarding.last_tour_step";
    pub const CONTACT_DRAFT: &str = "onboarding.contact_draft";
}

/// Options for [`FlagStore::force_reset`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ForceResetOptions {
    /// Re-write the cached tenant identifier after clearing.
    pub keep_tenant: bool,
    /// Also clear the server-side flags.
    pub reset_server_flags: bool,
}

/// Typed getters/setters over the two storage scopes plus the server mirror.
pub struct FlagStore {
    durable: Arc<dyn FlagScope>,
    session: Arc<dyn FlagScope>,
    api: Option<Arc<dyn OnboardingApi>>,
}

impl FlagStore {
    pub fn new(durable: Arc<dyn FlagScope>, session: Arc<dyn FlagScope>) -> Self {
        Self {
            durable,
            session,
            api: None,
        }
    }

    /// Attach the server mirror. Mirrored writes are best-effort.
    pub fn with_api(mut self, api: Arc<dyn OnboardingApi>) -> Self {
        self.api = Some(api);
        self
    }

    // ── Fault-tolerant primitives ───────────────────────────────────

    async fn read(&self, scope: &dyn FlagScope, key: &str) -> Option<String> {
        match scope.get(key).await {
            Ok(value) => value,
            Err(e) => {
                warn!(key, "Flag read failed: {e}");
                None
            }
        }
    }

    async fn write(&self, scope: &dyn FlagScope, key: &str, value: &str) {
        if let Err(e) = scope.set(key, value).await {
            warn!(key, "Flag write failed: {e}");
        }
    }

    async fn erase(&self, scope: &dyn FlagScope, key: &str) {
        if let Err(e) = scope.remove(key).await {
            warn!(key, "Flag remove failed: {e}");
        }
    }

    async fn read_bool(&self, key: &str) -> bool {
        self.read(self.durable.as_ref(), key)
            .await
            .map(|v| v == "true")
            .unwrap_or(false)
    }

    async fn write_bool(&self, key: &str, value: bool) {
        self.write(self.durable.as_ref(), key, if value { "true" } else { "false" })
            .await;
    }

    /// Mirror a flag to the server settings resource, best-effort.
    async fn mirror(&self, key: &str, value: bool) {
        if let Some(api) = &self.api {
            if let Err(e) = api
                .persist_progress(key, &serde_json::Value::Bool(value))
                .await
            {
                warn!(key, "Server flag mirror failed: {e}");
            }
        }
    }

    // ── Completion flags ────────────────────────────────────────────

    pub async fn guide_done(&self) -> bool {
        self.read_bool(keys::GUIDE_DONE).await
    }

    pub async fn set_guide_done(&self, value: bool) {
        self.write_bool(keys::GUIDE_DONE, value).await;
        self.mirror(keys::GUIDE_DONE, value).await;
    }

    /// Welcome flag keeps a session mirror so repeated in-session checks
    /// survive a durable-storage outage.
    pub async fn welcome_seen(&self) -> bool {
        if self
            .read(self.session.as_ref(), keys::WELCOME_SEEN)
            .await
            .is_some()
        {
            return true;
        }
        self.read_bool(keys::WELCOME_SEEN).await
    }

    pub async fn set_welcome_seen(&self) {
        self.write_bool(keys::WELCOME_SEEN, true).await;
        self.write(self.session.as_ref(), keys::WELCOME_SEEN, "true")
            .await;
    }

    pub async fn billing_dismissed(&self) -> bool {
        self.read_bool(keys::BILLING_DISMISSED).await
    }

    pub async fn set_billing_dismissed(&self, value: bool) {
        self.write_bool(keys::BILLING_DISMISSED, value).await;
        self.mirror(keys::BILLING_DISMISSED, value).await;
    }

    pub async fn onboarding_done(&self) -> bool {
        self.read_bool(keys::ONBOARDING_DONE).await
    }

    pub async fn set_onboarding_done(&self, value: bool) {
        self.write_bool(keys::ONBOARDING_DONE, value).await;
        self.mirror(keys::ONBOARDING_DONE, value).await;
    }

    pub async fn quickstart_completed(&self) -> bool {
        self.read_bool(keys::QUICKSTART_COMPLETED).await
    }

    pub async fn set_quickstart_completed(&self, value: bool) {
        self.write_bool(keys::QUICKSTART_COMPLETED, value).await;
        self.mirror(keys::QUICKSTART_COMPLETED, value).await;
    }

    // ── Tenant ──────────────────────────────────────────────────────

    pub async fn tenant_id(&self) -> Option<String> {
        self.read(self.durable.as_ref(), keys::TENANT_ID).await
    }

    pub async fn set_tenant_id(&self, tenant: &str) {
        self.write(self.durable.as_ref(), keys::TENANT_ID, tenant)
            .await;
    }

    // ── Tour resume position ────────────────────────────────────────

    pub async fn set_tour_position(&self, page: Page, index: usize) {
        self.write(self.durable.as_ref(), keys::LAST_TOUR_PAGE, &page.to_string())
            .await;
        self.write(
            self.durable.as_ref(),
            keys::LAST_TOUR_STEP,
            &index.to_string(),
        )
        .await;
    }

    pub async fn tour_page(&self) -> Option<Page> {
        self.read(self.durable.as_ref(), keys::LAST_TOUR_PAGE)
            .await
            .and_then(|s| Page::parse(&s))
    }

    pub async fn tour_step_index(&self) -> usize {
        self.read(self.durable.as_ref(), keys::LAST_TOUR_STEP)
            .await
            .and_then(|s| s.parse().ok())
            .unwrap_or(0)
    }

    pub async fn clear_tour_position(&self) {
        self.erase(self.durable.as_ref(), keys::LAST_TOUR_PAGE).await;
        self.erase(self.durable.as_ref(), keys::LAST_TOUR_STEP).await;
    }

    // ── JSON values (contact draft) ─────────────────────────────────

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.read(self.durable.as_ref(), key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key, "Failed to parse stored JSON: {e}");
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.write(self.durable.as_ref(), key, &raw).await,
            Err(e) => warn!(key, "Failed to serialize flag value: {e}"),
        }
    }

    pub async fn remove_key(&self, key: &str) {
        self.erase(self.durable.as_ref(), key).await;
    }

    // ── Reset ───────────────────────────────────────────────────────

    /// Clear every onboarding key in both scopes.
    ///
    /// With `keep_tenant`, the tenant identifier is read before clearing
    /// and rewritten after. The server reset is awaited last; its failure
    /// is caught and logged, never rethrown.
    pub async fn force_reset(&self, opts: ForceResetOptions) {
        let tenant = if opts.keep_tenant {
            self.tenant_id().await
        } else {
            None
        };

        if let Err(e) = self.durable.clear_prefix(keys::PREFIX).await {
            warn!("Durable flag reset failed: {e}");
        }
        if let Err(e) = self.session.clear_prefix(keys::PREFIX).await {
            warn!("Session flag reset failed: {e}");
        }

        if let Some(tenant) = tenant {
            self.set_tenant_id(&tenant).await;
        }

        if opts.reset_server_flags {
            if let Some(api) = &self.api {
                if let Err(e) = api.reset_flags().await {
                    warn!("Server flag reset failed: {e}");
                }
            }
        }
    }
}
