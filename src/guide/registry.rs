//! Step registry — the static, page-keyed table of tour steps.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::GuideEvent;

/// Application pages that can host a guided tour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Page {
    Dashboard,
    Clients,
    Messages,
    Inventory,
    Billing,
    Assistant,
}

impl Page {
    /// Parse the snake_case form produced by `Display` (used for the
    /// persisted last-tour-page flag).
    pub fn parse(s: &str) -> Option<Page> {
        match s {
            "dashboard" => Some(Page::Dashboard),
            "clients" => Some(Page::Clients),
            "messages" => Some(Page::Messages),
            "inventory" => Some(Page::Inventory),
            "billing" => Some(Page::Billing),
            "assistant" => Some(Page::Assistant),
            _ => None,
        }
    }
}

impl std::fmt::Display for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Dashboard => "dashboard",
            Self::Clients => "clients",
            Self::Messages => "messages",
            Self::Inventory => "inventory",
            Self::Billing => "billing",
            Self::Assistant => "assistant",
        };
        write!(f, "{s}")
    }
}

/// Which field a contact-capture slide binds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    Email,
    Phone,
}

/// What happens when the user advances past a step.
///
/// Steps are a discriminated union over behavior rather than a bag of
/// optional lifecycle callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Purely informational; advancing moves straight to the next step.
    Info,
    /// Advancing routes to another page and waits for its readiness.
    Navigate {
        page: Page,
        /// Overrides `GateConfig::default_timeout` when set.
        ready_timeout: Option<Duration>,
    },
    /// Advancing dispatches an event for the shell or another page.
    Action { event: GuideEvent },
    /// A founder-contact slide. When `finalize` is set, advancing is gated
    /// on validation and triggers the contact submission.
    ContactCapture { field: ContactField, finalize: bool },
}

/// One highlighted, described unit within a page's tour.
#[derive(Debug, Clone, PartialEq)]
pub struct GuideStep {
    /// Element selector to highlight. Steps without one are centered in
    /// the viewport.
    pub target: Option<String>,
    pub title: String,
    pub description: String,
    pub kind: StepKind,
    /// When set, the dimming overlay becomes click-through so the user can
    /// interact with the UI behind the tour.
    pub allow_clicks: bool,
}

impl GuideStep {
    /// An informational step anchored to an element.
    pub fn info(
        target: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            target: Some(target.into()),
            title: title.into(),
            description: description.into(),
            kind: StepKind::Info,
            allow_clicks: false,
        }
    }

    /// A viewport-centered informational step (no target).
    pub fn centered(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            target: None,
            title: title.into(),
            description: description.into(),
            kind: StepKind::Info,
            allow_clicks: false,
        }
    }

    pub fn with_kind(mut self, kind: StepKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_allow_clicks(mut self) -> Self {
        self.allow_clicks = true;
        self
    }

    /// Whether this step is centered (no target to anchor to).
    pub fn is_centered(&self) -> bool {
        self.target.is_none()
    }
}

/// Page-keyed table of ordered tour steps.
///
/// Built once at startup. The only permitted mutation afterwards is
/// append-only (the founder-contact tail uses this).
pub struct StepRegistry {
    pages: HashMap<Page, Vec<GuideStep>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
        }
    }

    /// The built-in tour content for every page, including the
    /// founder-contact tail appended to the dashboard tour.
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.pages.insert(
            Page::Dashboard,
            vec![
                GuideStep::centered(
                    "Welcome to your studio",
                    "This short tour shows you around. Use the arrow keys or the \
                     buttons to move between steps.",
                ),
                GuideStep::info(
                    "#revenue-card",
                    "Your week at a glance",
                    "Revenue, bookings, and no-shows for the current week.",
                ),
                GuideStep::info(
                    "#appointment-calendar",
                    "The calendar",
                    "Every appointment lives here. Drag to reschedule, click a \
                     slot to book.",
                ),
                GuideStep::info(
                    "#quick-actions",
                    "Quick actions",
                    "Book a client, sell a product, or send a reminder without \
                     leaving the dashboard.",
                ),
                GuideStep::info(
                    "#client-list-link",
                    "Meet your client book",
                    "Let's look at where your client records live.",
                )
                .with_kind(StepKind::Navigate {
                    page: Page::Clients,
                    ready_timeout: None,
                }),
            ],
        );

        registry.pages.insert(
            Page::Clients,
            vec![
                GuideStep::info(
                    "#client-table",
                    "Client records",
                    "Notes, visit history, and formulas for every client.",
                ),
                GuideStep::info(
                    "#client-import-button",
                    "Bring your clients with you",
                    "Import your existing client list from a spreadsheet or your \
                     phone contacts.",
                )
                .with_kind(StepKind::Action {
                    event: GuideEvent::ContactImportRequested,
                }),
            ],
        );

        registry.pages.insert(
            Page::Messages,
            vec![
                GuideStep::info(
                    "#message-composer",
                    "Client messaging",
                    "Confirmations, reminders, and campaigns, all from one inbox.",
                ),
                GuideStep::info(
                    "#message-templates",
                    "Templates",
                    "Save your most-used messages and send them in one tap.",
                )
                .with_allow_clicks(),
            ],
        );

        registry.pages.insert(
            Page::Inventory,
            vec![GuideStep::info(
                "#inventory-grid",
                "Retail and backbar",
                "Track stock levels and get low-stock alerts before you run out.",
            )],
        );

        registry.pages.insert(
            Page::Billing,
            vec![GuideStep::info(
                "#billing-summary",
                "Plans and payments",
                "Your subscription and payout settings live here.",
            )],
        );

        registry.pages.insert(
            Page::Assistant,
            vec![
                GuideStep::info(
                    "#assistant-prompt",
                    "Your AI assistant",
                    "Ask it to draft messages, summarize your week, or suggest \
                     openings to fill.",
                )
                .with_kind(StepKind::Action {
                    event: GuideEvent::PromptPrefill {
                        prompt: "What are my busiest hours this month?".to_string(),
                    },
                })
                .with_allow_clicks(),
            ],
        );

        // Founder-contact tail: the final dashboard slides capture an email
        // and phone so we can follow up. Appended programmatically to keep
        // the registry append-only.
        registry.append(
            Page::Dashboard,
            GuideStep::centered(
                "Stay in the loop",
                "Leave an email and we'll send tips for your first week. \
                 Optional, and you can skip it.",
            )
            .with_kind(StepKind::ContactCapture {
                field: ContactField::Email,
                finalize: false,
            })
            .with_allow_clicks(),
        );
        registry.append(
            Page::Dashboard,
            GuideStep::centered(
                "Or a phone number",
                "Prefer a text? Add a phone number instead — either field can \
                 stay empty.",
            )
            .with_kind(StepKind::ContactCapture {
                field: ContactField::Phone,
                finalize: true,
            })
            .with_allow_clicks(),
        );

        registry
    }

    /// The ordered steps for a page. Empty when the page has no tour.
    pub fn steps(&self, page: Page) -> &[GuideStep] {
        self.pages.get(&page).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Append a step to a page's list, preserving existing order.
    pub fn append(&mut self, page: Page, step: GuideStep) {
        self.pages.entry(page).or_default().push(step);
    }

    /// Pages that currently have at least one step.
    pub fn pages(&self) -> impl Iterator<Item = Page> + '_ {
        self.pages
            .iter()
            .filter(|(_, steps)| !steps.is_empty())
            .map(|(page, _)| *page)
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
