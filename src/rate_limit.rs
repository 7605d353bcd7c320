use crate::error::RateLimitError;
use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug)]
struct WindowState {
    counts: HashMap<String, u32>,
    last_reset: Instant,
}

/// Fixed-window rate limiter shared by every in-flight request. The window
/// reset is global: when it elapses, all client counters clear at once.
/// Entries are never evicted individually; in-window growth is bounded only
/// by the number of distinct clients.
#[derive(Debug)]
pub struct RateLimiter {
    window: Duration,
    capacity: u32,
    state: Mutex<WindowState>,
}

impl RateLimiter {
    pub fn new(window: Duration, capacity: u32) -> Self {
        RateLimiter {
            window,
            capacity,
            state: Mutex::new(WindowState {
                counts: HashMap::new(),
                last_reset: Instant::now(),
            }),
        }
    }

    pub fn admit(&self, client: &str) -> Result<(), RateLimitError> {
        self.admit_at(client, Instant::now())
    }

    #[cfg(test)]
    fn set_count(&self, client: &str, count: u32) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.counts.insert(client.to_string(), count);
    }

    /// The reset check, increment and capacity compare all happen under one
    /// lock, so concurrent callers can neither lose an increment nor slip
    /// past the capacity between check and count.
    fn admit_at(&self, client: &str, now: Instant) -> Result<(), RateLimitError> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if now.duration_since(state.last_reset) > self.window {
            state.counts.clear();
            state.last_reset = now;
        }
        let count = state.counts.entry(client.to_string()).or_insert(0);
        // saturate so a client hammering past rejection can never wrap the
        // counter back under capacity mid-window
        *count = count.saturating_add(1);
        if *count > self.capacity {
            Err(RateLimitError {
                client: client.to_string(),
            })
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_capacity_within_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let now = Instant::now();
        assert!(limiter.admit_at("10.0.0.1", now).is_ok());
        assert!(limiter.admit_at("10.0.0.1", now).is_ok());
        assert!(limiter.admit_at("10.0.0.1", now).is_ok());
        assert!(limiter.admit_at("10.0.0.1", now).is_err());
    }

    #[test]
    fn admits_again_after_window_elapses() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        let now = Instant::now();
        for _ in 0..4 {
            let _ = limiter.admit_at("10.0.0.1", now);
        }
        let later = now + Duration::from_secs(61);
        assert!(limiter.admit_at("10.0.0.1", later).is_ok());
    }

    #[test]
    fn clients_count_independently() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();
        assert!(limiter.admit_at("10.0.0.1", now).is_ok());
        assert!(limiter.admit_at("10.0.0.2", now).is_ok());
        assert!(limiter.admit_at("10.0.0.1", now).is_err());
    }

    #[test]
    fn reset_clears_all_clients_at_once() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);
        let now = Instant::now();
        let _ = limiter.admit_at("10.0.0.1", now);
        let _ = limiter.admit_at("10.0.0.2", now);
        let later = now + Duration::from_secs(61);
        // the reset triggered by one client frees the other too
        assert!(limiter.admit_at("10.0.0.1", later).is_ok());
        assert!(limiter.admit_at("10.0.0.2", later).is_ok());
    }

    #[test]
    fn saturated_counter_keeps_rejecting() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);
        limiter.set_count("10.0.0.1", u32::MAX);
        let now = Instant::now();
        // the counter pins at the maximum instead of wrapping under capacity
        assert!(limiter.admit_at("10.0.0.1", now).is_err());
        assert!(limiter.admit_at("10.0.0.1", now).is_err());
    }

    #[test]
    fn concurrent_admissions_never_exceed_capacity() {
        use std::sync::Arc;

        let limiter = Arc::new(RateLimiter::new(Duration::from_secs(60), 50));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let limiter = limiter.clone();
                std::thread::spawn(move || {
                    (0..25).filter(|_| limiter.admit("10.0.0.1").is_ok()).count()
                })
            })
            .collect();
        let admitted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(admitted, 50);
    }
}
