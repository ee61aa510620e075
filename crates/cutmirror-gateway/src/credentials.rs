//! Credential pool with rotation on rate limiting.
//!
//! Slot selection, in-flight accounting and cooldown marking all happen
//! under one mutex, so two concurrent calls can never both pick a
//! credential that one of them has just seen rate limited.

use std::fmt;
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use governor::clock::{Clock, DefaultClock};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use tokio::time::Instant;
use tracing::{debug, info};

/// One API credential. The key never appears in `Debug` output.
pub struct Credential {
    index: usize,
    key: String,
}

impl Credential {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Loggable identifier: slot number and the key's last four characters.
    pub fn label(&self) -> String {
        let tail: String = self
            .key
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        format!("key#{} (…{})", self.index, tail)
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("label", &self.label()).finish()
    }
}

struct Slot {
    credential: Arc<Credential>,
    cooldown_until: Option<Instant>,
    in_flight: usize,
    limiter: DefaultDirectRateLimiter,
}

struct PoolState {
    slots: Vec<Slot>,
    cursor: usize,
}

/// Shared pool of credentials. Cloning shares the same state.
#[derive(Clone)]
pub struct CredentialPool {
    state: Arc<Mutex<PoolState>>,
}

impl CredentialPool {
    pub fn new(keys: &[String], requests_per_minute: u32) -> Self {
        let rpm = NonZeroU32::new(requests_per_minute).unwrap_or(NonZeroU32::MIN);
        let slots = keys
            .iter()
            .enumerate()
            .map(|(index, key)| Slot {
                credential: Arc::new(Credential {
                    index,
                    key: key.clone(),
                }),
                cooldown_until: None,
                in_flight: 0,
                limiter: RateLimiter::direct(Quota::per_minute(rpm)),
            })
            .collect();
        Self {
            state: Arc::new(Mutex::new(PoolState { slots, cursor: 0 })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Credentials not currently cooling down.
    pub fn available(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .slots
            .iter()
            .filter(|s| s.cooldown_until.map_or(true, |until| until <= now))
            .count()
    }

    /// Lease the least-loaded usable credential, rotating from the slot after
    /// the last one handed out. `Err(wait)` gives the shortest time until
    /// some credential becomes usable (`Duration::MAX` for an empty pool).
    pub fn try_acquire(&self) -> Result<CredentialLease, Duration> {
        let now = Instant::now();
        let clock = DefaultClock::default();
        let mut state = self.lock();
        let n = state.slots.len();
        if n == 0 {
            return Err(Duration::MAX);
        }

        let mut wait = Duration::MAX;
        let mut candidates = Vec::with_capacity(n);
        for offset in 0..n {
            let idx = (state.cursor + offset) % n;
            let slot = &mut state.slots[idx];
            match slot.cooldown_until {
                Some(until) if until > now => wait = wait.min(until - now),
                Some(_) => {
                    slot.cooldown_until = None;
                    candidates.push(idx);
                }
                None => candidates.push(idx),
            }
        }
        // Stable sort keeps rotation order among equally loaded slots.
        candidates.sort_by_key(|idx| state.slots[*idx].in_flight);

        for idx in candidates {
            let slot = &mut state.slots[idx];
            match slot.limiter.check() {
                Ok(()) => {
                    slot.in_flight += 1;
                    let credential = Arc::clone(&slot.credential);
                    state.cursor = (idx + 1) % n;
                    debug!(credential = %credential.label(), "Credential leased");
                    return Ok(CredentialLease {
                        pool: self.clone(),
                        credential,
                    });
                }
                Err(not_until) => wait = wait.min(not_until.wait_time_from(clock.now())),
            }
        }
        Err(wait)
    }

    fn release(&self, index: usize) {
        if let Some(slot) = self.lock().slots.get_mut(index) {
            slot.in_flight = slot.in_flight.saturating_sub(1);
        }
    }

    fn cool_down(&self, index: usize, cooldown: Duration) {
        if let Some(slot) = self.lock().slots.get_mut(index) {
            slot.cooldown_until = Some(Instant::now() + cooldown);
            info!(
                credential = %slot.credential.label(),
                cooldown_secs = cooldown.as_secs_f64(),
                "Credential rate limited, rotating"
            );
        }
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialPool")
            .field("size", &self.len())
            .field("available", &self.available())
            .finish()
    }
}

/// An in-flight use of a credential. Dropping it releases the slot.
pub struct CredentialLease {
    pool: CredentialPool,
    credential: Arc<Credential>,
}

impl CredentialLease {
    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// Take this credential out of rotation for `cooldown`.
    pub fn rate_limited(self, cooldown: Duration) {
        self.pool.cool_down(self.credential.index, cooldown);
    }
}

impl Drop for CredentialLease {
    fn drop(&mut self) {
        self.pool.release(self.credential.index);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(keys: &[&str]) -> CredentialPool {
        let keys: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
        CredentialPool::new(&keys, 600)
    }

    #[test]
    fn test_rotates_round_robin() {
        let pool = pool(&["a", "b", "c"]);
        let order: Vec<String> = (0..4)
            .map(|_| pool.try_acquire().unwrap().credential().key().to_string())
            .collect();
        assert_eq!(order, vec!["a", "b", "c", "a"]);
    }

    #[test]
    fn test_prefers_idle_credentials() {
        let pool = pool(&["a", "b"]);
        let first = pool.try_acquire().unwrap();
        let second = pool.try_acquire().unwrap();
        assert_ne!(first.credential().key(), second.credential().key());
    }

    #[tokio::test]
    async fn test_rate_limited_credential_is_skipped_until_cooldown() {
        tokio::time::pause();
        let pool = pool(&["a", "b"]);
        let lease = pool.try_acquire().unwrap();
        assert_eq!(lease.credential().key(), "a");
        lease.rate_limited(Duration::from_secs(30));

        for _ in 0..3 {
            assert_eq!(pool.try_acquire().unwrap().credential().key(), "b");
        }
        assert_eq!(pool.available(), 1);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(pool.available(), 2);
    }

    #[tokio::test]
    async fn test_exhausted_pool_reports_wait() {
        tokio::time::pause();
        let pool = pool(&["a"]);
        pool.try_acquire().unwrap().rate_limited(Duration::from_secs(10));
        let wait = pool.try_acquire().err().unwrap();
        assert!(wait <= Duration::from_secs(10) && wait > Duration::from_secs(9));
    }

    #[test]
    fn test_empty_pool() {
        let pool = CredentialPool::new(&[], 10);
        assert!(pool.is_empty());
        assert_eq!(pool.try_acquire().err(), Some(Duration::MAX));
    }

    #[test]
    fn test_debug_redacts_key() {
        let pool = pool(&["secret-key-1234"]);
        let lease = pool.try_acquire().unwrap();
        let debug = format!("{:?}", lease.credential());
        assert!(!debug.contains("secret"));
        assert!(debug.contains("1234"));
    }
}
