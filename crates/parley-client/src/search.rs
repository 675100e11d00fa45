//! Debounced search-as-you-type.
//!
//! Each keystroke schedules a search a debounce window in the future and
//! bumps the generation counter. A scheduled task that wakes up to find
//! itself superseded never issues the request; a result that arrives for
//! a superseded generation is dropped at commit time. Only the most
//! recently scheduled search can ever surface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::debug;

use parley_shared::constants::SEARCH_DEBOUNCE_MS;
use parley_shared::Username;

use crate::api::{ApiResult, ChatApi};

/// Completion of one scheduled search, posted back to the engine loop.
#[derive(Debug)]
pub struct SearchOutcome {
    pub generation: u64,
    pub query: String,
    pub result: ApiResult<Vec<Username>>,
}

#[derive(Debug, Default)]
pub struct DebouncedSearch {
    latest: Arc<AtomicU64>,
}

impl DebouncedSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `query` after the debounce window, superseding any search
    /// scheduled earlier. Returns the new generation.
    pub fn schedule<A: ChatApi>(
        &self,
        api: A,
        query: String,
        outcome_tx: mpsc::Sender<SearchOutcome>,
    ) -> u64 {
        let generation = self.latest.fetch_add(1, Ordering::SeqCst) + 1;
        let latest = self.latest.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(SEARCH_DEBOUNCE_MS)).await;
            if latest.load(Ordering::SeqCst) != generation {
                debug!(generation, "Search superseded before dispatch");
                return;
            }
            let result = api.search_users(&query).await;
            let _ = outcome_tx
                .send(SearchOutcome {
                    generation,
                    query,
                    result,
                })
                .await;
        });

        generation
    }

    /// Whether `generation` is still the newest scheduled search.
    pub fn is_current(&self, generation: u64) -> bool {
        self.latest.load(Ordering::SeqCst) == generation
    }
}
