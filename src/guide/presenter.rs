//! Presentation seam — the opaque overlay/popover engine.
//!
//! The third-party library that draws the dimming overlay and popovers is
//! consumed behind this trait. The engine only cares about mounting a
//! resolved step list, moving the highlight, and keeping exactly one
//! overlay alive.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::PresenterError;
use crate::guide::registry::{GuideStep, Page};

/// Where a step's popover is anchored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    /// Highlight the element matching this selector.
    Target(String),
    /// Synthetic always-present anchor at the viewport's visual center.
    ViewportCenter,
}

/// A step after resolution for the presentation layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedStep {
    pub anchor: Anchor,
    pub title: String,
    pub description: String,
    /// Centered steps suppress the connecting-arrow decoration.
    pub show_arrow: bool,
    pub allow_clicks: bool,
}

/// Resolve registry steps for presentation: steps without a target get the
/// centered anchor and lose their arrow.
pub fn resolve(steps: &[GuideStep]) -> Vec<ResolvedStep> {
    steps
        .iter()
        .map(|step| ResolvedStep {
            anchor: match &step.target {
                Some(selector) => Anchor::Target(selector.clone()),
                None => Anchor::ViewportCenter,
            },
            title: step.title.clone(),
            description: step.description.clone(),
            show_arrow: step.target.is_some(),
            allow_clicks: step.allow_clicks,
        })
        .collect()
}

/// Overlay engine contract.
///
/// `mount` must return only once both the overlay and the popover content
/// are installed; callers never remount to work around a half-drawn
/// overlay.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Install the overlay for a page's step list.
    async fn mount(&self, page: Page, steps: Vec<ResolvedStep>) -> Result<(), PresenterError>;

    /// Move the highlight to the step at `index`.
    async fn highlight(&self, index: usize) -> Result<(), PresenterError>;

    /// Make the dimming overlay click-through (or solid again).
    async fn set_click_through(&self, enabled: bool);

    /// Number of overlay roots currently in the document.
    async fn overlay_count(&self) -> usize;

    /// Remove any duplicate overlay roots beyond the first. Returns how
    /// many were removed.
    async fn remove_extra_overlays(&self) -> usize;

    /// Tear down all overlay/stage nodes.
    async fn destroy(&self);
}

#[derive(Default)]
struct HeadlessState {
    page: Option<Page>,
    steps: Vec<ResolvedStep>,
    highlighted: Option<usize>,
    overlays: usize,
    click_through: bool,
    highlight_log: Vec<usize>,
}

/// In-process presenter that records every call. Used by the demo shell
/// and by tests that assert on engine behavior.
pub struct HeadlessPresenter {
    state: Mutex<HeadlessState>,
}

impl HeadlessPresenter {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(HeadlessState::default()),
        }
    }

    pub async fn mounted_page(&self) -> Option<Page> {
        self.state.lock().await.page
    }

    pub async fn highlighted(&self) -> Option<usize> {
        self.state.lock().await.highlighted
    }

    pub async fn click_through(&self) -> bool {
        self.state.lock().await.click_through
    }

    /// Every highlight index seen, in order.
    pub async fn highlight_log(&self) -> Vec<usize> {
        self.state.lock().await.highlight_log.clone()
    }

    pub async fn step(&self, index: usize) -> Option<ResolvedStep> {
        self.state.lock().await.steps.get(index).cloned()
    }
}

impl Default for HeadlessPresenter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Presenter for HeadlessPresenter {
    async fn mount(&self, page: Page, steps: Vec<ResolvedStep>) -> Result<(), PresenterError> {
        let mut state = self.state.lock().await;
        debug!(%page, total = steps.len(), "Headless presenter mounted");
        state.page = Some(page);
        state.steps = steps;
        state.highlighted = None;
        state.overlays += 1;
        Ok(())
    }

    async fn highlight(&self, index: usize) -> Result<(), PresenterError> {
        let mut state = self.state.lock().await;
        if state.page.is_none() {
            return Err(PresenterError::NotMounted);
        }
        if index >= state.steps.len() {
            return Err(PresenterError::Highlight {
                index,
                reason: "index out of range".to_string(),
            });
        }
        state.highlighted = Some(index);
        state.highlight_log.push(index);
        Ok(())
    }

    async fn set_click_through(&self, enabled: bool) {
        self.state.lock().await.click_through = enabled;
    }

    async fn overlay_count(&self) -> usize {
        self.state.lock().await.overlays
    }

    async fn remove_extra_overlays(&self) -> usize {
        let mut state = self.state.lock().await;
        if state.overlays > 1 {
            let removed = state.overlays - 1;
            state.overlays = 1;
            removed
        } else {
            0
        }
    }

    async fn destroy(&self) {
        let mut state = self.state.lock().await;
        state.page = None;
        state.steps.clear();
        state.highlighted = None;
        state.overlays = 0;
        state.click_through = false;
    }
}
