//! The URL frontier: a prioritized, deduplicated queue of URLs to crawl.
//!
//! One exclusive critical section guards the heap and its bookkeeping
//! sets. `next` suspends on an empty heap until an admission or shutdown.
//! A canonical URL is admitted at most once, ever; transient failures
//! re-admit at a demoted priority until the retry budget runs out.

use crate::config::{CrawlerConfig, ScopeConfig};
use crate::url::ScopePolicy;
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, HashSet};
use tokio::sync::{watch, Mutex, Notify};
use url::Url;

/// Crawl priority; lower values pop first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Critical = 0,
    High = 1,
    Normal = 2,
    Low = 3,
    Deferred = 4,
}

impl Priority {
    /// One step lower-priority, saturating at `Deferred`.
    pub fn demoted(self) -> Self {
        match self {
            Priority::Critical => Priority::High,
            Priority::High => Priority::Normal,
            Priority::Normal => Priority::Low,
            Priority::Low | Priority::Deferred => Priority::Deferred,
        }
    }
}

/// A URL admitted to the frontier.
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub depth: u32,
    pub priority: Priority,
    pub parent: Option<Url>,
    /// Monotonic admission counter; orders entries within a priority.
    pub discovered_at: u64,
    pub retries: u32,
}

/// Outcome of an admission attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Accepted,
    /// The canonical URL was already admitted at some point.
    Duplicate,
    /// Scope policy or the depth bound rejected the URL.
    OutOfScope,
}

/// Frontier counters. All monotonically non-decreasing except
/// `in_flight`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrontierStats {
    pub added: u64,
    pub crawled: u64,
    pub failed: u64,
    pub duplicates: u64,
    pub in_flight: u64,
}

// Reversed ordering so the BinaryHeap pops the lowest
// (priority, discovered_at) first.
struct HeapEntry(FrontierEntry);

impl HeapEntry {
    fn key(&self) -> (u8, u64) {
        (self.0.priority as u8, self.0.discovered_at)
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        other.key().cmp(&self.key())
    }
}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for HeapEntry {}

#[derive(Default)]
struct Inner {
    heap: BinaryHeap<HeapEntry>,
    /// URLs with a live heap entry; a popped entry not in this set is a
    /// tombstone and is skipped (lazy deletion).
    queued: HashSet<String>,
    /// Every canonical URL ever admitted.
    seen: HashSet<String>,
    in_flight: HashMap<String, FrontierEntry>,
    next_seq: u64,
    added: u64,
    crawled: u64,
    failed: u64,
    duplicates: u64,
}

/// The frontier owns its pending heap and seen/in-flight sets
/// exclusively; the engine only calls through this interface.
pub struct Frontier {
    inner: Mutex<Inner>,
    notify: Notify,
    scope: ScopePolicy,
    max_depth: u32,
    max_retries: u32,
}

impl Frontier {
    pub fn new(crawler: &CrawlerConfig, scope_config: &ScopeConfig, seeds: &[Url]) -> Self {
        let scope = ScopePolicy::new(
            &scope_config.allowed_domains,
            seeds,
            scope_config.include_subdomains,
            scope_config.follow_external_links,
        );
        Self {
            inner: Mutex::new(Inner::default()),
            notify: Notify::new(),
            scope,
            max_depth: crawler.max_depth,
            max_retries: crawler.max_retries,
        }
    }

    /// The scope policy the frontier admits against. The engine shares it
    /// with the extractor so internal/external link classification agrees
    /// with admission.
    pub fn scope(&self) -> &ScopePolicy {
        &self.scope
    }

    /// Admits a canonical URL.
    ///
    /// Rejects it when it was ever admitted before (`Duplicate`), or when
    /// the depth bound or scope policy fails (`OutOfScope`).
    pub async fn add(
        &self,
        url: Url,
        depth: u32,
        priority: Priority,
        parent: Option<Url>,
    ) -> AddOutcome {
        if depth > self.max_depth || !self.scope.in_scope(&url) {
            return AddOutcome::OutOfScope;
        }

        let mut inner = self.inner.lock().await;
        let key = url.as_str().to_string();
        if inner.seen.contains(&key) {
            inner.duplicates += 1;
            return AddOutcome::Duplicate;
        }

        inner.seen.insert(key.clone());
        inner.queued.insert(key);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.heap.push(HeapEntry(FrontierEntry {
            url,
            depth,
            priority,
            parent,
            discovered_at: seq,
            retries: 0,
        }));
        inner.added += 1;
        drop(inner);

        self.notify.notify_one();
        AddOutcome::Accepted
    }

    /// Marks a canonical URL as seen without queueing it, so redirect
    /// targets are not crawled a second time under their final URL.
    pub async fn mark_seen(&self, url: &Url) {
        let mut inner = self.inner.lock().await;
        inner.seen.insert(url.as_str().to_string());
    }

    /// Pops the best entry, moving it to in-flight.
    ///
    /// Suspends while the heap is empty; returns `None` once shutdown is
    /// signalled.
    pub async fn next(&self, shutdown: &mut watch::Receiver<bool>) -> Option<FrontierEntry> {
        loop {
            if *shutdown.borrow() {
                return None;
            }

            {
                let mut inner = self.inner.lock().await;
                while let Some(HeapEntry(entry)) = inner.heap.pop() {
                    // Tombstoned entries are dropped on pop.
                    if !inner.queued.remove(entry.url.as_str()) {
                        continue;
                    }
                    inner
                        .in_flight
                        .insert(entry.url.as_str().to_string(), entry.clone());
                    if !inner.heap.is_empty() {
                        // Hand the wakeup on: Notify stores at most one
                        // permit, so a burst of adds wakes workers one at
                        // a time.
                        self.notify.notify_one();
                    }
                    return Some(entry);
                }
            }

            tokio::select! {
                _ = self.notify.notified() => {}
                _ = shutdown.changed() => {}
            }
        }
    }

    /// Records a successful crawl of an in-flight URL.
    pub async fn complete(&self, url: &Url) {
        let mut inner = self.inner.lock().await;
        if inner.in_flight.remove(url.as_str()).is_some() {
            inner.crawled += 1;
        }
    }

    /// Records a failed crawl of an in-flight URL.
    ///
    /// A transient failure with retry budget left re-admits the URL at a
    /// demoted priority; anything else is permanent.
    pub async fn fail(&self, url: &Url, transient: bool) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.in_flight.remove(url.as_str()) else {
            return;
        };

        if transient && entry.retries < self.max_retries {
            let seq = inner.next_seq;
            inner.next_seq += 1;
            inner.queued.insert(entry.url.as_str().to_string());
            inner.heap.push(HeapEntry(FrontierEntry {
                priority: entry.priority.demoted(),
                retries: entry.retries + 1,
                discovered_at: seq,
                ..entry
            }));
            drop(inner);
            self.notify.notify_one();
        } else {
            inner.failed += 1;
        }
    }

    /// Removes an in-flight URL without counting it as crawled or
    /// failed. Used for policy drops (robots-denied, shutdown while
    /// waiting for a permit); the URL stays in "seen".
    pub async fn skip(&self, url: &Url) {
        let mut inner = self.inner.lock().await;
        inner.in_flight.remove(url.as_str());
    }

    /// Quiescence: nothing queued and nothing in flight. The engine
    /// treats this as the termination condition.
    pub async fn is_quiescent(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.queued.is_empty() && inner.in_flight.is_empty()
    }

    pub async fn stats(&self) -> FrontierStats {
        let inner = self.inner.lock().await;
        FrontierStats {
            added: inner.added,
            crawled: inner.crawled,
            failed: inner.failed,
            duplicates: inner.duplicates,
            in_flight: inner.in_flight.len() as u64,
        }
    }
}
