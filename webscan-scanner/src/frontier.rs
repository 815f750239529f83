use crate::result::{CrawlState, SkipReason, UrlOutcome};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// How long an idle worker waits for new work before re-checking the queue.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// Normalized URL.
    pub url: String,
    pub depth: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    Duplicate,
    OverLimit,
}

#[derive(Debug, Default)]
struct FrontierState {
    queue: VecDeque<FrontierEntry>,
    queued: HashSet<String>,
    visited: HashSet<String>,
    in_flight: usize,
    closed: bool,
    interrupted: bool,
    skipped: Vec<UrlOutcome>,
}

/// Deduplicated crawl queue shared by all workers of one crawl.
///
/// The duplicate check and the insert into the visited set happen under one lock in
/// `next`, so a URL is handed to at most one worker. Workers hold a `Claim` while they
/// process an entry; the frontier only closes once the queue is empty and no claims are
/// outstanding, because a claim holder may still push new links.
pub struct Frontier {
    state: Mutex<FrontierState>,
    notify: Notify,
    max_pages: usize,
}

impl Frontier {
    pub fn new(max_pages: usize) -> Self {
        Self {
            state: Mutex::new(FrontierState::default()),
            notify: Notify::new(),
            max_pages,
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        // the state is consistent after every statement, so a poisoned lock is still usable
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, url: String, depth: usize) -> PushOutcome {
        let mut state = self.lock();
        if state.closed {
            return PushOutcome::OverLimit;
        }
        if state.visited.contains(&url) || state.queued.contains(&url) {
            return PushOutcome::Duplicate;
        }
        if state.visited.len() >= self.max_pages {
            return PushOutcome::OverLimit;
        }

        state.queued.insert(url.clone());
        state.queue.push_back(FrontierEntry { url, depth });
        drop(state);

        self.notify.notify_one();
        PushOutcome::Queued
    }

    /// Next entry to fetch, already marked visited. `None` once the crawl is over.
    pub async fn next(&self) -> Option<(FrontierEntry, Claim<'_>)> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if state.closed {
                    return None;
                }

                while let Some(entry) = state.queue.pop_front() {
                    state.queued.remove(&entry.url);

                    let reason = if state.visited.contains(&entry.url) {
                        SkipReason::Duplicate
                    } else if state.visited.len() >= self.max_pages {
                        SkipReason::OverLimit
                    } else {
                        state.visited.insert(entry.url.clone());
                        state.in_flight += 1;
                        return Some((entry, Claim { frontier: self }));
                    };

                    state.skipped.push(UrlOutcome {
                        url: entry.url,
                        depth: entry.depth,
                        state: CrawlState::Skipped(reason),
                    });
                }

                if state.in_flight == 0 {
                    state.closed = true;
                    drop(state);
                    self.notify.notify_waiters();
                    return None;
                }
            }

            let _ = tokio::time::timeout(IDLE_POLL, notified).await;
        }
    }

    /// Record a URL reached through a redirect so it is not fetched again. Returns
    /// false when it was already visited.
    pub fn mark_visited(&self, url: &str) -> bool {
        self.lock().visited.insert(url.to_string())
    }

    /// Stop handing out work. Entries still queued stay unvisited.
    pub fn close(&self) {
        let mut state = self.lock();
        if !state.closed {
            state.closed = true;
            state.interrupted = true;
        }
        drop(state);
        self.notify.notify_waiters();
    }

    /// True when `close` ended the crawl before the queue drained.
    pub fn was_interrupted(&self) -> bool {
        self.lock().interrupted
    }

    pub fn visited_count(&self) -> usize {
        self.lock().visited.len()
    }

    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn take_skipped(&self) -> Vec<UrlOutcome> {
        std::mem::take(&mut self.lock().skipped)
    }

    fn release(&self) {
        let mut state = self.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        drop(state);
        self.notify.notify_waiters();
    }
}

/// Marks one dequeued entry as in flight until dropped.
pub struct Claim<'a> {
    frontier: &'a Frontier,
}

impl Drop for Claim<'_> {
    fn drop(&mut self) {
        self.frontier.release();
    }
}
