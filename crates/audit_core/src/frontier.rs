use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use audit_logging::audit_trace;

use crate::model::{CrawlTask, Depth};
use crate::normalize::{normalize_url_for_dedupe, parse_http_url, InvalidUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferOutcome {
    Queued,
    Duplicate,
    TooDeep,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Take {
    Task(CrawlTask),
    /// Queue is empty but tasks are in flight and may still offer links.
    Pending,
    /// Queue is empty and nothing is in flight.
    Exhausted,
}

/// Pending and visited URLs of one crawl.
///
/// Every URL is keyed by [`normalize_url_for_dedupe`]; the check-and-insert
/// happens under one lock so concurrent discovery never queues a URL twice.
#[derive(Debug)]
pub struct Frontier {
    max_depth: Depth,
    inner: Mutex<FrontierInner>,
}

#[derive(Debug, Default)]
struct FrontierInner {
    seen: HashMap<String, Depth>,
    queue: VecDeque<CrawlTask>,
    in_flight: usize,
    dispatched: usize,
}

impl Frontier {
    pub fn new(max_depth: Depth) -> Self {
        Self {
            max_depth,
            inner: Mutex::new(FrontierInner::default()),
        }
    }

    pub fn max_depth(&self) -> Depth {
        self.max_depth
    }

    pub fn offer(
        &self,
        url: &str,
        depth: Depth,
        referrer: Option<&str>,
    ) -> Result<OfferOutcome, InvalidUrl> {
        let key = normalize_url_for_dedupe(url)?;
        let mut fetch_url = parse_http_url(url)?;
        fetch_url.set_fragment(None);

        let mut inner = self.lock();
        if inner.seen.contains_key(&key) {
            return Ok(OfferOutcome::Duplicate);
        }
        if depth > self.max_depth {
            return Ok(OfferOutcome::TooDeep);
        }
        inner.seen.insert(key, depth);
        inner.queue.push_back(CrawlTask {
            url: fetch_url.to_string(),
            depth,
            origin_referrer: referrer.map(str::to_string),
        });
        audit_trace!("Frontier queued depth={} url={}", depth, fetch_url);
        Ok(OfferOutcome::Queued)
    }

    /// Marks a URL as visited without queueing it. Returns false when the
    /// URL was already known.
    pub fn claim(&self, url: &str, depth: Depth) -> Result<bool, InvalidUrl> {
        let key = normalize_url_for_dedupe(url)?;
        let mut inner = self.lock();
        if inner.seen.contains_key(&key) {
            return Ok(false);
        }
        inner.seen.insert(key, depth);
        Ok(true)
    }

    pub fn take(&self) -> Take {
        let mut inner = self.lock();
        match inner.queue.pop_front() {
            Some(task) => {
                inner.in_flight += 1;
                inner.dispatched += 1;
                Take::Task(task)
            }
            None if inner.in_flight == 0 => Take::Exhausted,
            None => Take::Pending,
        }
    }

    /// Marks one taken task as finished.
    pub fn complete(&self) {
        let mut inner = self.lock();
        inner.in_flight = inner.in_flight.saturating_sub(1);
    }

    pub fn is_exhausted(&self) -> bool {
        let inner = self.lock();
        inner.queue.is_empty() && inner.in_flight == 0
    }

    pub fn depth_of(&self, url: &str) -> Option<Depth> {
        let key = normalize_url_for_dedupe(url).ok()?;
        self.lock().seen.get(&key).copied()
    }

    pub fn visited_count(&self) -> usize {
        self.lock().seen.len()
    }

    pub fn dispatched_count(&self) -> usize {
        self.lock().dispatched
    }

    fn lock(&self) -> MutexGuard<'_, FrontierInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
