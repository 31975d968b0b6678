//! Paper review lifecycle.
//!
//! A stored paper moves `imported → processing → ready_to_code → coded`.
//! Every status change goes through [`transition`]; an event with no defined
//! transition leaves the status unchanged rather than failing.
//!
//! The store that owns the status field is an outside collaborator reached
//! through [`PaperStore`]. [`apply_event`] writes with compare-and-set so the
//! core never holds a lock across the read-modify-write.

mod review;

pub use review::{review_flag, MissingField, PdfStatus, ReviewFlag};

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::models::CanonicalPaper;

/// Identifier the store assigns to a paper
pub type PaperId = u64;

/// Review status of a stored paper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaperStatus {
    /// Newly imported, not yet attached to a project
    Imported,
    /// Attached to a project, undergoing cleanup and PDF retrieval
    Processing,
    /// Cleaned up and has a PDF
    ReadyToCode,
    CodingInProgress,
    Coded,
}

impl PaperStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaperStatus::Imported => "imported",
            PaperStatus::Processing => "processing",
            PaperStatus::ReadyToCode => "ready_to_code",
            PaperStatus::CodingInProgress => "coding_in_progress",
            PaperStatus::Coded => "coded",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaperStatus::Coded)
    }
}

impl std::fmt::Display for PaperStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaperStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "imported" => Ok(PaperStatus::Imported),
            "processing" => Ok(PaperStatus::Processing),
            "ready_to_code" => Ok(PaperStatus::ReadyToCode),
            "coding_in_progress" => Ok(PaperStatus::CodingInProgress),
            "coded" => Ok(PaperStatus::Coded),
            other => Err(format!("unknown paper status: {}", other)),
        }
    }
}

/// Something that happened to a paper
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    AttachedToProject,
    /// An open-access PDF was fetched from `url`
    PdfRetrieved { url: String },
    /// A reviewer confirmed the paper is ready without a retrieved PDF
    MarkedReady,
    CodingSaved,
}

/// The status after `event`, or `None` when the table defines no transition
///
/// `CodingSaved` moves every status, `Imported` included, straight to `Coded`.
/// It does not require `ReadyToCode` first.
pub fn next_status(status: PaperStatus, event: &LifecycleEvent) -> Option<PaperStatus> {
    use LifecycleEvent::*;
    use PaperStatus::*;

    match (status, event) {
        (Imported, AttachedToProject) => Some(Processing),
        (Processing, PdfRetrieved { url }) if !url.trim().is_empty() => Some(ReadyToCode),
        (Processing, MarkedReady) => Some(ReadyToCode),
        (_, CodingSaved) => Some(Coded),
        _ => None,
    }
}

/// Apply the transition table; undefined transitions are a no-op
pub fn transition(status: PaperStatus, event: &LifecycleEvent) -> PaperStatus {
    match next_status(status, event) {
        Some(next) => next,
        None => {
            debug!("No transition from {} on {:?}", status, event);
            status
        }
    }
}

/// A paper together with its review status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewPaper {
    pub id: PaperId,
    pub paper: CanonicalPaper,
    pub status: PaperStatus,
}

impl ReviewPaper {
    /// A freshly imported paper
    pub fn imported(id: PaperId, paper: CanonicalPaper) -> Self {
        Self {
            id,
            paper,
            status: PaperStatus::Imported,
        }
    }

    pub fn apply(&mut self, event: &LifecycleEvent) -> PaperStatus {
        self.status = transition(self.status, event);
        self.status
    }

    pub fn attach_to_project(&mut self) -> PaperStatus {
        self.apply(&LifecycleEvent::AttachedToProject)
    }

    /// Record a retrieved PDF; the URL is kept as the open-access URL if none is set
    pub fn pdf_retrieved(&mut self, url: &str) -> PaperStatus {
        if self.paper.open_access_url.is_none() && !url.trim().is_empty() {
            self.paper.open_access_url = Some(url.to_string());
        }
        self.apply(&LifecycleEvent::PdfRetrieved {
            url: url.to_string(),
        })
    }

    pub fn mark_ready(&mut self) -> PaperStatus {
        self.apply(&LifecycleEvent::MarkedReady)
    }

    pub fn coding_saved(&mut self) -> PaperStatus {
        self.apply(&LifecycleEvent::CodingSaved)
    }

    pub fn pdf_status(&self) -> PdfStatus {
        PdfStatus::of(&self.paper)
    }
}

/// Errors reported by a [`PaperStore`]
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Paper {0} not found")]
    NotFound(PaperId),

    #[error("Store error: {0}")]
    Backend(String),
}

/// The persistent owner of paper statuses
#[async_trait]
pub trait PaperStore: Send + Sync {
    async fn status(&self, id: PaperId) -> Result<PaperStatus, StoreError>;

    /// Write `new` only if the stored status is still `expected`; `false` on a lost race
    async fn compare_and_set_status(
        &self,
        id: PaperId,
        expected: PaperStatus,
        new: PaperStatus,
    ) -> Result<bool, StoreError>;
}

/// Apply an event to a stored paper
///
/// Reads the status, computes the transition and writes it with
/// compare-and-set. A lost race is retried once against the fresh status;
/// after that the store's current status is returned as is.
pub async fn apply_event<S>(
    store: &S,
    id: PaperId,
    event: &LifecycleEvent,
) -> Result<PaperStatus, StoreError>
where
    S: PaperStore + ?Sized,
{
    for _ in 0..2 {
        let current = store.status(id).await?;
        let next = transition(current, event);
        if next == current {
            return Ok(current);
        }
        if store.compare_and_set_status(id, current, next).await? {
            debug!("Paper {}: {} -> {}", id, current, next);
            return Ok(next);
        }
        debug!("Paper {}: status changed underneath {:?}", id, event);
    }

    store.status(id).await
}

/// A process-local [`PaperStore`]
#[derive(Debug, Default)]
pub struct InMemoryStore {
    statuses: Mutex<HashMap<PaperId, PaperStatus>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, id: PaperId, status: PaperStatus) {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, status);
    }
}

#[async_trait]
impl PaperStore for InMemoryStore {
    async fn status(&self, id: PaperId) -> Result<PaperStatus, StoreError> {
        self.statuses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .copied()
            .ok_or(StoreError::NotFound(id))
    }

    async fn compare_and_set_status(
        &self,
        id: PaperId,
        expected: PaperStatus,
        new: PaperStatus,
    ) -> Result<bool, StoreError> {
        let mut statuses = self.statuses.lock().unwrap_or_else(PoisonError::into_inner);
        let slot = statuses.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        if *slot != expected {
            return Ok(false);
        }
        *slot = new;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PaperBuilder, ProviderTag};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn review_paper() -> ReviewPaper {
        ReviewPaper::imported(1, PaperBuilder::new("A paper", ProviderTag::Crossref).build())
    }

    #[test]
    fn test_happy_path() {
        let mut paper = review_paper();
        assert_eq!(paper.attach_to_project(), PaperStatus::Processing);
        assert_eq!(
            paper.pdf_retrieved("https://example.org/a.pdf"),
            PaperStatus::ReadyToCode
        );
        assert_eq!(paper.pdf_status(), PdfStatus::Available);
        assert_eq!(paper.coding_saved(), PaperStatus::Coded);
    }

    #[test]
    fn test_coding_saved_from_imported_skips_to_coded() {
        let mut paper = review_paper();
        assert_eq!(paper.coding_saved(), PaperStatus::Coded);
    }

    #[test]
    fn test_mark_ready_only_from_processing() {
        let mut paper = review_paper();
        assert_eq!(paper.mark_ready(), PaperStatus::Imported);

        paper.attach_to_project();
        assert_eq!(paper.mark_ready(), PaperStatus::ReadyToCode);
        assert_eq!(paper.mark_ready(), PaperStatus::ReadyToCode);
    }

    #[test]
    fn test_undefined_transitions_are_no_ops() {
        assert_eq!(
            transition(PaperStatus::Coded, &LifecycleEvent::AttachedToProject),
            PaperStatus::Coded
        );
        assert_eq!(
            transition(
                PaperStatus::Imported,
                &LifecycleEvent::PdfRetrieved {
                    url: "https://x.org/a.pdf".into()
                }
            ),
            PaperStatus::Imported
        );
        assert_eq!(
            next_status(
                PaperStatus::Processing,
                &LifecycleEvent::PdfRetrieved { url: " ".into() }
            ),
            None
        );
        assert_eq!(
            transition(PaperStatus::Processing, &LifecycleEvent::AttachedToProject),
            PaperStatus::Processing
        );
    }

    #[test]
    fn test_status_strings() {
        assert_eq!(PaperStatus::ReadyToCode.to_string(), "ready_to_code");
        assert_eq!(
            "coding_in_progress".parse::<PaperStatus>(),
            Ok(PaperStatus::CodingInProgress)
        );
        assert_eq!(
            serde_json::to_value(PaperStatus::ReadyToCode).unwrap(),
            serde_json::json!("ready_to_code")
        );
        assert!(PaperStatus::Coded.is_terminal());
    }

    #[tokio::test]
    async fn test_apply_event_in_memory() {
        let store = InMemoryStore::new();
        store.insert(7, PaperStatus::Imported);

        let status = apply_event(&store, 7, &LifecycleEvent::AttachedToProject)
            .await
            .unwrap();
        assert_eq!(status, PaperStatus::Processing);
        assert_eq!(store.status(7).await, Ok(PaperStatus::Processing));

        let status = apply_event(&store, 7, &LifecycleEvent::AttachedToProject)
            .await
            .unwrap();
        assert_eq!(status, PaperStatus::Processing);

        assert_eq!(
            apply_event(&store, 99, &LifecycleEvent::CodingSaved).await,
            Err(StoreError::NotFound(99))
        );
    }

    /// Loses every compare-and-set, as if another writer always got there first
    struct ContendedStore {
        reads: AtomicUsize,
    }

    #[async_trait]
    impl PaperStore for ContendedStore {
        async fn status(&self, _id: PaperId) -> Result<PaperStatus, StoreError> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            Ok(PaperStatus::Processing)
        }

        async fn compare_and_set_status(
            &self,
            _id: PaperId,
            _expected: PaperStatus,
            _new: PaperStatus,
        ) -> Result<bool, StoreError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn test_apply_event_gives_up_after_one_retry() {
        let store = ContendedStore {
            reads: AtomicUsize::new(0),
        };

        let status = apply_event(&store, 1, &LifecycleEvent::MarkedReady)
            .await
            .unwrap();
        assert_eq!(status, PaperStatus::Processing);
        assert_eq!(store.reads.load(Ordering::SeqCst), 3);
    }
}
