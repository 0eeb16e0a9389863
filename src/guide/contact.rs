//! Inline founder-contact capture — the validated two-field form embedded
//! in the final tour slides.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::api::OnboardingApi;
use crate::error::FormError;
use crate::flags::{FlagStore, keys};

fn email_regex() -> &'static Regex {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$")
            .expect("email regex is valid")
    })
}

/// Autosaved form contents. Persisted on every keystroke so a reload does
/// not lose input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
}

/// The two-field contact form bound to the final tour slides.
pub struct ContactForm {
    draft: ContactDraft,
    flags: Arc<FlagStore>,
}

impl ContactForm {
    /// Rehydrate the form from the autosaved draft. Safe to call again for
    /// an idempotent rebind — prior state is simply replaced.
    pub async fn load(flags: Arc<FlagStore>) -> Self {
        let draft = flags
            .get_json::<ContactDraft>(keys::CONTACT_DRAFT)
            .await
            .unwrap_or_default();
        Self { draft, flags }
    }

    pub fn email(&self) -> &str {
        &self.draft.email
    }

    pub fn phone(&self) -> &str {
        &self.draft.phone
    }

    /// Update the email field and autosave the draft.
    pub async fn set_email(&mut self, email: impl Into<String>) {
        self.draft.email = email.into();
        self.autosave().await;
    }

    /// Update the phone field and autosave the draft.
    pub async fn set_phone(&mut self, phone: impl Into<String>) {
        self.draft.phone = phone.into();
        self.autosave().await;
    }

    async fn autosave(&self) {
        self.flags.set_json(keys::CONTACT_DRAFT, &self.draft).await;
    }

    /// Validate both fields. Empty fields are allowed; a non-empty email
    /// must match the address pattern, a non-empty phone must contain 7-15
    /// digits after stripping non-dial characters.
    pub fn validate(&self) -> Vec<FormError> {
        let mut errors = Vec::new();

        let email = self.draft.email.trim();
        if !email.is_empty() && !email_regex().is_match(email) {
            errors.push(FormError::InvalidEmail);
        }

        let phone = self.draft.phone.trim();
        if !phone.is_empty() {
            let digits = phone.chars().filter(char::is_ascii_digit).count();
            if !(7..=15).contains(&digits) {
                errors.push(FormError::InvalidPhone { digits });
            }
        }

        errors
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Submit the contact details, best-effort. Failure is surfaced to the
    /// caller for inline display but never blocks tour completion. The
    /// draft is cleared on success.
    pub async fn submit(&mut self, api: &dyn OnboardingApi, finalize: bool) -> bool {
        let email = self.draft.email.trim();
        let phone = self.draft.phone.trim();
        if email.is_empty() && phone.is_empty() {
            self.clear_draft().await;
            return true;
        }

        let result = api
            .submit_contact(
                (!email.is_empty()).then_some(email),
                (!phone.is_empty()).then_some(phone),
                finalize,
            )
            .await;

        match result {
            Ok(()) => {
                info!("Founder contact submitted");
                self.clear_draft().await;
                true
            }
            Err(e) => {
                warn!("Founder contact submission failed: {e}");
                false
            }
        }
    }

    /// Drop the autosaved draft (on successful submission or tour
    /// completion).
    pub async fn clear_draft(&mut self) {
        self.draft = ContactDraft::default();
        self.flags.remove_key(keys::CONTACT_DRAFT).await;
    }
}
