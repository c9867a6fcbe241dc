use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::unbounded;
use parking_lot::Mutex;
use tracing::debug;

use crate::catalog::{EnrichedMovie, MovieStub};
use crate::data::DetailService;

/// Merges search stubs with their detail records through a bounded worker
/// pool. A batch never fails as a whole; items whose detail fetch keeps
/// failing come back as the bare stub.
pub struct Enricher {
    detail: Arc<dyn DetailService>,
    cache: Mutex<HashMap<String, EnrichedMovie>>,
    workers: usize,
    retries: u32,
    retry_delay: Duration,
}

impl Enricher {
    pub fn new(
        detail: Arc<dyn DetailService>,
        workers: usize,
        retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            detail,
            cache: Mutex::new(HashMap::new()),
            workers: workers.max(1),
            retries,
            retry_delay,
        }
    }

    /// Enriches a batch, preserving input order and length. Workers claim
    /// indices from a shared cursor; a raised cancel flag stops claiming and
    /// the unclaimed tail falls back to stubs.
    pub fn enrich(&self, stubs: &[MovieStub], cancel: &AtomicBool) -> Vec<EnrichedMovie> {
        if stubs.is_empty() {
            return Vec::new();
        }

        let cursor = AtomicUsize::new(0);
        let workers = self.workers.min(stubs.len());
        let (tx, rx) = unbounded::<(usize, EnrichedMovie)>();

        thread::scope(|scope| {
            for _ in 0..workers {
                let tx = tx.clone();
                let cursor = &cursor;
                scope.spawn(move || loop {
                    if cancel.load(Ordering::Relaxed) {
                        break;
                    }
                    let idx = cursor.fetch_add(1, Ordering::Relaxed);
                    let Some(stub) = stubs.get(idx) else { break };
                    let enriched = self.enrich_one(stub, cancel);
                    if tx.send((idx, enriched)).is_err() {
                        break;
                    }
                });
            }
        });
        drop(tx);

        let mut slots: Vec<Option<EnrichedMovie>> = vec![None; stubs.len()];
        for (idx, enriched) in rx {
            slots[idx] = Some(enriched);
        }
        slots
            .into_iter()
            .zip(stubs.iter())
            .map(|(slot, stub)| {
                slot.unwrap_or_else(|| EnrichedMovie {
                    stub: stub.clone(),
                    detail: None,
                })
            })
            .collect()
    }

    fn enrich_one(&self, stub: &MovieStub, cancel: &AtomicBool) -> EnrichedMovie {
        if let Some(cached) = self.cache.lock().get(&stub.imdb_id).cloned() {
            return cached;
        }

        let attempts = 1 + self.retries;
        for attempt in 1..=attempts {
            match self.detail.movie_details(&stub.imdb_id) {
                Ok(detail) => {
                    let enriched = EnrichedMovie::merged(stub.clone(), detail);
                    // first writer wins when duplicates race
                    return self
                        .cache
                        .lock()
                        .entry(stub.imdb_id.clone())
                        .or_insert(enriched)
                        .clone();
                }
                Err(err) => {
                    debug!(imdb_id = %stub.imdb_id, attempt, "detail fetch failed: {err}");
                    if attempt < attempts && !cancel.load(Ordering::Relaxed) {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        EnrichedMovie {
            stub: stub.clone(),
            detail: None,
        }
    }
}
