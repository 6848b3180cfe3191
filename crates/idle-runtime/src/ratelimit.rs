//! Per-key request limiter on top of `governor`, driven by the game clock.

use crate::clock::Clock;
use governor::clock::Clock as GovernorClock;
use governor::middleware::NoOpMiddleware;
use governor::nanos::Nanos;
use governor::state::keyed::HashMapStateStore;
use governor::Quota;
use std::hash::Hash;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

/// Feeds [`Clock::now_ms`] to governor so a `ManualClock` steers the limiter.
#[derive(Clone)]
pub struct GameClock(Arc<dyn Clock>);

impl GovernorClock for GameClock {
    type Instant = Nanos;

    fn now(&self) -> Nanos {
        let ms = u64::try_from(self.0.now_ms()).unwrap_or(0);
        Nanos::from(Duration::from_millis(ms))
    }
}

type Keyed<K> =
    governor::RateLimiter<K, HashMapStateStore<K>, GameClock, NoOpMiddleware<Nanos>>;

/// Burst of `max_hits` per key, refilled evenly over `window_ms` (GCRA).
pub struct RateLimiter<K: Hash + Eq + Clone> {
    clock: GameClock,
    inner: Keyed<K>,
}

impl<K: Hash + Eq + Clone> RateLimiter<K> {
    pub fn new(max_hits: u32, window_ms: i64, clock: Arc<dyn Clock>) -> Self {
        let clock = GameClock(clock);
        let inner = Keyed::new(quota(max_hits, window_ms), HashMapStateStore::default(), &clock);
        Self { clock, inner }
    }

    /// Record a hit for `key`. `Err` carries the milliseconds until a slot frees.
    pub fn check(&self, key: &K) -> Result<(), i64> {
        self.inner.check_key(key).map_err(|not_until| {
            let wait = not_until.wait_time_from(self.clock.now());
            i64::try_from(wait.as_nanos().div_ceil(1_000_000))
                .unwrap_or(i64::MAX)
                .max(1)
        })
    }

    /// Forget keys whose buckets have refilled.
    pub fn purge(&self) {
        self.inner.retain_recent();
    }

    pub fn tracked_keys(&self) -> usize {
        self.inner.len()
    }
}

fn quota(max_hits: u32, window_ms: i64) -> Quota {
    let burst = NonZeroU32::new(max_hits).unwrap_or(NonZeroU32::MIN);
    let window = Duration::from_millis(u64::try_from(window_ms).unwrap_or(0).max(1));
    Quota::with_period(window / burst.get())
        .unwrap_or_else(|| Quota::per_second(burst))
        .allow_burst(burst)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use proptest::prelude::*;

    fn limiter(clock: &ManualClock) -> RateLimiter<u32> {
        RateLimiter::new(3, 1_000, Arc::new(clock.clone()))
    }

    #[test]
    fn burst_then_one_slot_per_period() {
        let clock = ManualClock::new(1_000_000);
        let rl = limiter(&clock);
        for _ in 0..3 {
            assert!(rl.check(&7).is_ok());
        }
        // 1000ms / 3 hits: a slot frees every 333.3ms
        assert_eq!(rl.check(&7), Err(334));
        clock.advance(334);
        assert!(rl.check(&7).is_ok());
        assert!(rl.check(&7).is_err());
        clock.advance(1_000);
        for _ in 0..3 {
            assert!(rl.check(&7).is_ok());
        }
    }

    #[test]
    fn keys_are_independent() {
        let clock = ManualClock::new(0);
        let rl = limiter(&clock);
        for _ in 0..3 {
            rl.check(&1).unwrap();
        }
        assert!(rl.check(&1).is_err());
        assert!(rl.check(&2).is_ok());
    }

    #[test]
    fn rejected_hits_are_not_counted() {
        let clock = ManualClock::new(0);
        let rl = limiter(&clock);
        for _ in 0..10 {
            let _ = rl.check(&1);
        }
        clock.set(1_000);
        for _ in 0..3 {
            assert!(rl.check(&1).is_ok());
        }
    }

    #[test]
    fn purge_drops_idle_keys() {
        let clock = ManualClock::new(0);
        let rl = limiter(&clock);
        rl.check(&1).unwrap();
        clock.advance(2_000);
        rl.check(&2).unwrap();
        clock.advance(100);
        rl.purge();
        assert_eq!(rl.tracked_keys(), 1);
    }

    #[test]
    fn degenerate_settings_still_limit() {
        let clock = ManualClock::new(0);
        let rl: RateLimiter<u32> = RateLimiter::new(0, 0, Arc::new(clock.clone()));
        assert!(rl.check(&1).is_ok());
        assert!(rl.check(&1).is_err());
    }

    proptest! {
        #[test]
        fn admissions_stay_within_burst_plus_refill(gaps in proptest::collection::vec(0i64..400, 1..200)) {
            let clock = ManualClock::new(0);
            let rl = limiter(&clock);
            let mut admitted: Vec<i64> = Vec::new();
            for gap in gaps {
                clock.advance(gap);
                let now = clock.now_ms();
                if rl.check(&0).is_ok() {
                    admitted.push(now);
                }
                // a full burst plus what refilled since the first hit
                let first = admitted.first().copied().unwrap_or(now);
                let refilled = ((now - first) * 3 / 1_000) as usize;
                prop_assert!(admitted.len() <= 3 + refilled + 1);
                // burst plus one window of refill
                let in_window = admitted.iter().filter(|&&t| now - t < 1_000).count();
                prop_assert!(in_window <= 6);
            }
        }
    }
}
