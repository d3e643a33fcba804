use std::time::{Duration, Instant};

/// Tracks the politeness state of a domain during crawling
///
/// Holds the adaptive inter-request delay and the earliest instant the next
/// request may start. The delay moves toward observed latency: slow responses
/// push it up, fast ones pull it down, and error responses never lower it.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Current gap enforced between request starts
    delay: Duration,

    /// Upper bound for `delay`
    max_delay: Duration,

    /// Earliest start time handed to the next request
    next_allowed: Option<Instant>,

    /// Number of requests scheduled against this domain
    pub request_count: u64,
}

impl DomainState {
    /// Creates a new DomainState
    ///
    /// # Arguments
    ///
    /// * `initial_delay` - Starting gap between requests
    /// * `max_delay` - Ceiling the adaptive delay never exceeds
    pub fn new(initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            delay: initial_delay.min(max_delay),
            max_delay,
            next_allowed: None,
            request_count: 0,
        }
    }

    /// Returns the current inter-request delay
    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Reserves the next request slot for this domain
    ///
    /// Returns how long the caller must sleep before issuing its request.
    /// Slots are handed out back to back, `delay` apart, so concurrent callers
    /// are spread out instead of bursting.
    pub fn reserve_slot(&mut self, now: Instant) -> Duration {
        let start = match self.next_allowed {
            Some(at) if at > now => at,
            _ => now,
        };
        self.next_allowed = Some(start + self.delay);
        self.request_count += 1;
        start - now
    }

    /// Feeds an observed response latency into the adaptive delay
    ///
    /// # Arguments
    ///
    /// * `latency` - Time from request start to response headers
    /// * `ok` - Whether the response was a success; failures never shrink the delay
    pub fn observe(&mut self, latency: Duration, ok: bool) {
        let averaged = (self.delay + latency) / 2;
        let next = if ok { averaged } else { averaged.max(self.delay) };
        self.delay = next.min(self.max_delay);
    }
}
