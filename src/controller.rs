use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::debug;

use crate::catalog::{
    self, apply_sort_and_filter, EnrichedMovie, Filters, Genre, SortKey,
};
use crate::data::CatalogService;
use crate::enrich::Enricher;

/// Lifecycle of the visible result set. Any input change drops back to
/// `Debouncing`; loads only start once the debounce window closes.
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
    Idle,
    Debouncing,
    Loading,
    Ready,
    Error(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FeedKind {
    Browse,
    Search,
}

/// One paged result set. The browse feed and the search feed each keep
/// their own pagination so leaving a search does not reset the home view.
#[derive(Debug, Default)]
struct Feed {
    movies: Vec<EnrichedMovie>,
    next_page: u32,
    has_more: bool,
}

impl Feed {
    fn reset(&mut self) {
        self.movies.clear();
        self.next_page = 1;
        self.has_more = false;
    }
}

struct PendingLoad {
    id: u64,
    kind: FeedKind,
    append: bool,
    cancel: Arc<AtomicBool>,
}

struct LoadResult {
    id: u64,
    batch: Result<Vec<EnrichedMovie>, String>,
}

pub struct Options {
    pub page_size: usize,
    pub debounce: Duration,
    pub scroll_threshold: usize,
}

/// Search/browse controller: debounced input, background page loads,
/// out-of-order suppression by request id, infinite-scroll append.
pub struct Controller {
    catalog: Arc<dyn CatalogService>,
    enricher: Arc<Enricher>,
    opts: Options,

    phase: Phase,
    title: String,
    filters: Filters,
    sort: Option<SortKey>,

    browse: Feed,
    search: Feed,

    debounce_deadline: Option<Instant>,
    next_request_id: u64,
    pending: Option<PendingLoad>,
    tx: Sender<LoadResult>,
    rx: Receiver<LoadResult>,
}

impl Controller {
    pub fn new(catalog: Arc<dyn CatalogService>, enricher: Arc<Enricher>, opts: Options) -> Self {
        let (tx, rx) = unbounded();
        let browse = Feed {
            next_page: 1,
            ..Feed::default()
        };
        let search = Feed {
            next_page: 1,
            ..Feed::default()
        };
        Self {
            catalog,
            enricher,
            opts,
            phase: Phase::Idle,
            title: String::new(),
            filters: Filters::default(),
            sort: None,
            browse,
            search,
            debounce_deadline: None,
            next_request_id: 0,
            pending: None,
            tx,
            rx,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn sort(&self) -> Option<SortKey> {
        self.sort
    }

    fn searching(&self) -> bool {
        !self.title.trim().is_empty() || self.filters.year.is_some() || self.filters.genre.is_some()
    }

    fn active_kind(&self) -> FeedKind {
        if self.searching() {
            FeedKind::Search
        } else {
            FeedKind::Browse
        }
    }

    fn feed(&self, kind: FeedKind) -> &Feed {
        match kind {
            FeedKind::Browse => &self.browse,
            FeedKind::Search => &self.search,
        }
    }

    fn feed_mut(&mut self, kind: FeedKind) -> &mut Feed {
        match kind {
            FeedKind::Browse => &mut self.browse,
            FeedKind::Search => &mut self.search,
        }
    }

    /// Kicks off the initial browse load without waiting out a debounce.
    pub fn refresh(&mut self) {
        self.debounce_deadline = None;
        self.start_load(false);
    }

    pub fn set_title(&mut self, title: String, now: Instant) {
        if self.title == title {
            return;
        }
        self.title = title;
        self.restart_debounce(now);
    }

    pub fn set_year(&mut self, year: Option<i32>, now: Instant) {
        if self.filters.year == year {
            return;
        }
        self.filters.year = year;
        self.restart_debounce(now);
    }

    pub fn set_genre(&mut self, genre: Option<Genre>, now: Instant) {
        if self.filters.genre == genre {
            return;
        }
        self.filters.genre = genre;
        self.restart_debounce(now);
    }

    /// Rating bucket is applied client-side only; no reload.
    pub fn set_min_rating(&mut self, min_rating: Option<f64>) {
        self.filters.min_rating = min_rating;
    }

    pub fn set_sort(&mut self, sort: Option<SortKey>) {
        self.sort = sort;
    }

    fn restart_debounce(&mut self, now: Instant) {
        self.cancel_pending();
        self.feed_mut(FeedKind::Search).reset();
        self.phase = Phase::Debouncing;
        self.debounce_deadline = Some(now + self.opts.debounce);
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel.store(true, Ordering::Relaxed);
        }
    }

    /// Fires the debounced load once the window has closed. Call every tick.
    pub fn tick(&mut self, now: Instant) {
        if let Some(deadline) = self.debounce_deadline {
            if now >= deadline {
                self.debounce_deadline = None;
                self.start_load(false);
            }
        }
    }

    /// Loads the next page when the selection nears the end of the list.
    /// `selection` indexes the filtered display list, not the raw feed, so
    /// the trigger is measured against what the user actually scrolls.
    pub fn maybe_load_more(&mut self, selection: usize) {
        if self.phase != Phase::Ready || self.pending.is_some() {
            return;
        }
        if !self.feed(self.active_kind()).has_more {
            return;
        }
        let len = self.display().len();
        if len == 0 || selection + self.opts.scroll_threshold + 1 < len {
            return;
        }
        self.start_load(true);
    }

    fn start_load(&mut self, append: bool) {
        self.cancel_pending();

        let kind = self.active_kind();
        let page = if append { self.feed(kind).next_page } else { 1 };
        if !append {
            self.feed_mut(kind).reset();
        }

        self.next_request_id += 1;
        let id = self.next_request_id;
        let cancel = Arc::new(AtomicBool::new(false));
        self.pending = Some(PendingLoad {
            id,
            kind,
            append,
            cancel: cancel.clone(),
        });
        self.phase = Phase::Loading;

        let catalog = self.catalog.clone();
        let enricher = self.enricher.clone();
        let tx = self.tx.clone();
        let title = self.title.trim().to_string();
        let year = self.filters.year;
        let genre = self.filters.genre.map(|g| g.as_str().to_string());
        let is_search = kind == FeedKind::Search;

        debug!(id, page, append, "starting catalog load");
        thread::spawn(move || {
            let title = if is_search && !title.is_empty() {
                Some(title.as_str())
            } else {
                None
            };
            let year = if is_search { year } else { None };
            let genre = if is_search { genre.as_deref() } else { None };
            let batch = match catalog.search(title, year, genre, page) {
                Ok(stubs) => Ok(enricher.enrich(&stubs, &cancel)),
                Err(err) => Err(err.to_string()),
            };
            let _ = tx.send(LoadResult { id, batch });
        });
    }

    /// Drains finished loads. Results whose request id no longer matches
    /// the pending load are discarded.
    pub fn poll(&mut self) {
        while let Ok(result) = self.rx.try_recv() {
            let Some(pending) = self.pending.as_ref() else {
                debug!(id = result.id, "dropping stale load result");
                continue;
            };
            if pending.id != result.id {
                debug!(id = result.id, "dropping superseded load result");
                continue;
            }
            let kind = pending.kind;
            let append = pending.append;
            self.pending = None;

            match result.batch {
                Ok(batch) => {
                    let page_size = self.opts.page_size;
                    let feed = self.feed_mut(kind);
                    feed.has_more = batch.len() >= page_size;
                    feed.next_page = if append { feed.next_page + 1 } else { 2 };
                    if append {
                        feed.movies.extend(batch);
                    } else {
                        feed.movies = batch;
                    }
                    self.phase = Phase::Ready;
                }
                Err(message) => {
                    self.phase = Phase::Error(message);
                }
            }
        }
    }

    /// The list to render: client-side filter and sort over the active
    /// feed. The fetched set itself is never mutated.
    pub fn display(&self) -> Vec<EnrichedMovie> {
        let feed = self.feed(self.active_kind());
        apply_sort_and_filter(&feed.movies, &self.filters, self.sort)
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, Phase::Loading | Phase::Debouncing)
    }

    pub fn has_more(&self) -> bool {
        self.feed(self.active_kind()).has_more
    }

    pub fn result_count(&self) -> usize {
        self.feed(self.active_kind()).movies.len()
    }

    /// Home rows derived from the loaded browse pages.
    pub fn curated_rows(&self) -> CuratedRows {
        let movies = &self.browse.movies;
        CuratedRows {
            top_rated: catalog::top_rated(movies),
            horror: catalog::horror_picks(movies),
            childrens: catalog::childrens_picks(movies),
        }
    }
}

pub struct CuratedRows {
    pub top_rated: Vec<EnrichedMovie>,
    pub horror: Vec<EnrichedMovie>,
    pub childrens: Vec<EnrichedMovie>,
}
