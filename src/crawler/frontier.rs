//! Crawl frontier and dedup manager
//!
//! The frontier owns the run's "seen" fingerprint set and the FIFO queue of
//! accepted entries. Membership test, insertion, and enqueue happen inside
//! one critical section, so two workers discovering the same link can never
//! both be told they were first.

use crate::url::{fingerprint, is_crawlable, Fingerprint};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};
use url::Url;

/// A URL accepted for fetching
#[derive(Debug, Clone)]
pub struct FrontierEntry {
    pub url: Url,
    pub fingerprint: Fingerprint,
    pub depth: u32,
    pub discovered_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct FrontierState {
    /// Fingerprints ever accepted (or reached through a redirect)
    seen: HashSet<Fingerprint>,

    /// Fingerprints of final URLs that were processed
    crawled: HashSet<Fingerprint>,

    queue: VecDeque<FrontierEntry>,

    accepted: u64,
}

/// Bounded, deduplicating frontier for a single domain
#[derive(Debug)]
pub struct Frontier {
    domain: String,
    max_depth: u32,
    max_pages: u64,
    state: Mutex<FrontierState>,
}

impl Frontier {
    /// Creates an empty frontier
    ///
    /// # Arguments
    ///
    /// * `domain` - Exact host every accepted URL must have
    /// * `max_depth` - Deepest link depth accepted (the seed is depth 0)
    /// * `max_pages` - Total number of entries the frontier will ever accept
    pub fn new(domain: impl Into<String>, max_depth: u32, max_pages: u64) -> Self {
        Self {
            domain: domain.into(),
            max_depth,
            max_pages,
            state: Mutex::new(FrontierState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FrontierState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Offers a URL to the frontier
    ///
    /// Accepts iff the URL is on the scoped host, uses http(s), does not end
    /// in a skipped extension, is within the depth limit, has not been seen,
    /// and the page ceiling has room. Rejection is silent.
    ///
    /// # Returns
    ///
    /// `true` if the URL was queued by this call
    pub fn propose(&self, url: &Url, depth: u32) -> bool {
        if depth > self.max_depth || !is_crawlable(url, &self.domain) {
            return false;
        }

        let fp = fingerprint(url);
        let mut state = self.lock();

        if state.accepted >= self.max_pages || state.seen.contains(&fp) {
            return false;
        }

        state.seen.insert(fp.clone());
        state.accepted += 1;

        let mut url = url.clone();
        url.set_fragment(None);
        state.queue.push_back(FrontierEntry {
            url,
            fingerprint: fp,
            depth,
            discovered_at: Utc::now(),
        });

        true
    }

    /// Pops the oldest accepted entry
    pub fn next(&self) -> Option<FrontierEntry> {
        self.lock().queue.pop_front()
    }

    /// Records that the page behind `final_url` is being processed
    ///
    /// Redirects can funnel several accepted URLs into one final URL; only
    /// the first of them gets processed.
    ///
    /// # Returns
    ///
    /// `true` if this final URL had not been processed before
    pub fn mark_crawled(&self, final_url: &Url) -> bool {
        let fp = fingerprint(final_url);
        let mut state = self.lock();
        state.seen.insert(fp.clone());
        state.crawled.insert(fp)
    }

    /// Number of entries accepted so far
    pub fn accepted(&self) -> u64 {
        self.lock().accepted
    }

    /// Number of accepted entries not yet handed out
    pub fn pending(&self) -> usize {
        self.lock().queue.len()
    }

    /// Number of distinct final URLs processed
    pub fn crawled(&self) -> usize {
        self.lock().crawled.len()
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn create_test_frontier() -> Frontier {
        Frontier::new("example.com", 2, 100)
    }

    #[test]
    fn test_accepts_once() {
        let frontier = create_test_frontier();
        assert!(frontier.propose(&url("https://example.com/a"), 0));
        assert!(!frontier.propose(&url("https://example.com/a"), 0));
        assert!(!frontier.propose(&url("https://example.com/a#frag"), 1));
        assert!(!frontier.propose(&url("https://example.com/a/"), 1));
        assert_eq!(frontier.accepted(), 1);
    }

    #[test]
    fn test_rejects_other_hosts() {
        let frontier = create_test_frontier();
        assert!(!frontier.propose(&url("https://other.com/"), 0));
        assert!(!frontier.propose(&url("https://sub.example.com/"), 0));
        assert_eq!(frontier.accepted(), 0);
    }

    #[test]
    fn test_rejects_beyond_depth() {
        let frontier = create_test_frontier();
        assert!(frontier.propose(&url("https://example.com/d2"), 2));
        assert!(!frontier.propose(&url("https://example.com/d3"), 3));
    }

    #[test]
    fn test_rejects_binary_extensions_and_schemes() {
        let frontier = create_test_frontier();
        assert!(!frontier.propose(&url("https://example.com/file.zip"), 0));
        assert!(!frontier.propose(&url("ftp://example.com/"), 0));
    }

    #[test]
    fn test_page_ceiling() {
        let frontier = Frontier::new("example.com", 5, 5);
        let accepted = (0..20)
            .filter(|i| frontier.propose(&url(&format!("https://example.com/p{}", i)), 1))
            .count();
        assert_eq!(accepted, 5);
        assert_eq!(frontier.accepted(), 5);
    }

    #[test]
    fn test_fifo_order_and_fragment_stripped() {
        let frontier = create_test_frontier();
        frontier.propose(&url("https://example.com/first#x"), 0);
        frontier.propose(&url("https://example.com/second"), 1);

        let first = frontier.next().unwrap();
        assert_eq!(first.url.as_str(), "https://example.com/first");
        assert_eq!(first.depth, 0);
        assert_eq!(frontier.pending(), 1);
        assert_eq!(frontier.next().unwrap().url.as_str(), "https://example.com/second");
        assert!(frontier.next().is_none());
    }

    #[test]
    fn test_mark_crawled_dedups_redirect_targets() {
        let frontier = create_test_frontier();
        frontier.propose(&url("https://example.com/old"), 0);
        frontier.propose(&url("https://example.com/alias"), 0);

        assert!(frontier.mark_crawled(&url("https://example.com/new")));
        assert!(!frontier.mark_crawled(&url("https://example.com/new")));

        // The redirect target counts as seen
        assert!(!frontier.propose(&url("https://example.com/new"), 1));
        assert_eq!(frontier.crawled(), 1);
    }

    #[test]
    fn test_concurrent_discoverers_accept_once() {
        let frontier = Arc::new(Frontier::new("example.com", 3, 1000));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let frontier = Arc::clone(&frontier);
                std::thread::spawn(move || {
                    (0..50)
                        .filter(|i| {
                            frontier.propose(&url(&format!("https://example.com/shared/{}", i)), 1)
                        })
                        .count()
                })
            })
            .collect();

        let total: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, 50);
        assert_eq!(frontier.accepted(), 50);
        assert_eq!(frontier.pending(), 50);
    }
}
