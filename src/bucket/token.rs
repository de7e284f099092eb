//! Token bucket implementation.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::refill_rate::RefillRate;

/// Mutable part of a bucket, guarded by the bucket lock.
#[derive(Debug)]
struct BucketState {
    tokens: u64,
    last_refill: Instant,
}

/// A token bucket that starts full and refills lazily.
///
/// Every read and write takes the bucket's own lock, so buckets owned by
/// the same limiter never contend with each other.
#[derive(Debug)]
pub struct TokenBucket {
    /// Maximum number of tokens
    capacity: u64,
    /// Accrual rate used by `refill`
    refill_rate: RefillRate,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Create a full bucket.
    pub fn new(capacity: u64, refill_rate: RefillRate) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    /// Get the bucket capacity.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Get the current token count.
    pub fn tokens(&self) -> u64 {
        self.state.lock().tokens
    }

    /// Get the moment tokens were last added.
    pub fn last_refill(&self) -> Instant {
        self.state.lock().last_refill
    }

    /// Whether the bucket holds its full capacity.
    pub fn is_full(&self) -> bool {
        self.state.lock().tokens == self.capacity
    }

    /// Add the whole tokens earned since the last refill.
    pub fn refill(&self) {
        self.refill_at(Instant::now());
    }

    /// Remove `cost` tokens.
    ///
    /// Callers check sufficiency first; the count never drops below zero.
    pub fn withdraw(&self, cost: u64) {
        let mut state = self.state.lock();
        debug_assert!(cost <= state.tokens, "withdraw without enough tokens");
        state.tokens = state.tokens.saturating_sub(cost);
    }

    /// Refill, then withdraw `cost` if the bucket can afford it.
    ///
    /// Both steps run under one lock acquisition. Returns whether the
    /// tokens were taken.
    pub fn take(&self, cost: u64) -> bool {
        self.take_at(cost, Instant::now())
    }

    /// Refill and return how many requests of `cost` the bucket can afford.
    pub fn affordable(&self, cost: u64) -> u64 {
        let mut state = self.state.lock();
        self.refill_locked(&mut state, Instant::now());
        state.tokens / cost.max(1)
    }

    /// Fill the bucket to capacity.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.tokens = self.capacity;
        state.last_refill = Instant::now();
    }

    /// Time since tokens were last added, as seen at `now`.
    pub fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_refill())
    }

    pub(crate) fn refill_at(&self, now: Instant) {
        let mut state = self.state.lock();
        self.refill_locked(&mut state, now);
    }

    pub(crate) fn take_at(&self, cost: u64, now: Instant) -> bool {
        let mut state = self.state.lock();
        self.refill_locked(&mut state, now);

        if state.tokens > 0 && cost <= state.tokens {
            state.tokens -= cost;
            true
        } else {
            false
        }
    }

    fn refill_locked(&self, state: &mut BucketState, now: Instant) {
        let elapsed = now.saturating_duration_since(state.last_refill);
        let tokens_to_add = self.refill_rate.tokens_for(elapsed);

        // Sub-token intervals keep accumulating toward the next token
        if tokens_to_add == 0 {
            return;
        }

        state.tokens = state.tokens.saturating_add(tokens_to_add).min(self.capacity);
        state.last_refill = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn per_second(count: u64) -> RefillRate {
        RefillRate::new(count, Duration::from_secs(1))
    }

    #[test]
    fn test_bucket_starts_full() {
        let bucket = TokenBucket::new(3, per_second(3));
        assert_eq!(bucket.capacity(), 3);
        assert_eq!(bucket.tokens(), 3);
        assert!(bucket.is_full());
    }

    #[test]
    fn test_withdraw_and_reset() {
        let bucket = TokenBucket::new(3, per_second(3));

        bucket.withdraw(2);
        assert_eq!(bucket.tokens(), 1);
        assert!(!bucket.is_full());

        bucket.reset();
        assert_eq!(bucket.tokens(), 3);
        assert!(bucket.is_full());
    }

    #[test]
    fn test_refill_clamps_to_capacity() {
        let bucket = TokenBucket::new(3, per_second(3));
        bucket.withdraw(3);
        assert_eq!(bucket.tokens(), 0);

        let later = bucket.last_refill() + Duration::from_secs(5);
        bucket.refill_at(later);

        assert_eq!(bucket.tokens(), 3);
        assert_eq!(bucket.last_refill(), later);
    }

    #[test]
    fn test_refill_after_real_sleep() {
        let bucket = TokenBucket::new(3, per_second(3));
        bucket.withdraw(3);

        std::thread::sleep(Duration::from_secs(1));
        bucket.refill();

        assert_eq!(bucket.tokens(), 3);
    }

    #[test]
    fn test_no_premature_accrual() {
        let bucket = TokenBucket::new(3, per_second(3));
        bucket.withdraw(3);
        let before = bucket.last_refill();

        bucket.refill_at(before + Duration::from_millis(300));

        assert_eq!(bucket.tokens(), 0);
        assert_eq!(bucket.last_refill(), before);

        // The 300ms are not lost: 34ms more completes the first token
        bucket.refill_at(before + Duration::from_millis(334));
        assert_eq!(bucket.tokens(), 1);
    }

    #[test]
    fn test_take_respects_cost() {
        let bucket = TokenBucket::new(3, RefillRate::new(1, Duration::from_secs(3600)));

        assert!(!bucket.take(4));
        assert_eq!(bucket.tokens(), 3);

        assert!(bucket.take(2));
        assert!(!bucket.take(2));
        assert!(bucket.take(1));
        assert!(!bucket.take(1));
        assert_eq!(bucket.tokens(), 0);
    }

    #[test]
    fn test_affordable() {
        let bucket = TokenBucket::new(10, RefillRate::new(1, Duration::from_secs(3600)));
        assert_eq!(bucket.affordable(3), 3);

        bucket.withdraw(5);
        assert_eq!(bucket.affordable(1), 5);
        assert_eq!(bucket.affordable(2), 2);
    }

    #[test]
    fn test_tokens_stay_in_bounds() {
        let bucket = TokenBucket::new(5, per_second(2));
        let start = bucket.last_refill();

        for step in 1..50u64 {
            let now = start + Duration::from_millis(step * 170);
            bucket.take_at(step % 4, now);
            if step % 7 == 0 {
                bucket.reset();
            }
            assert!(bucket.tokens() <= bucket.capacity());
        }
    }

    #[test]
    fn test_concurrent_takes_never_overdraw() {
        let bucket = std::sync::Arc::new(TokenBucket::new(
            100,
            RefillRate::new(1, Duration::from_secs(3600)),
        ));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let bucket = bucket.clone();
                std::thread::spawn(move || (0..50).filter(|_| bucket.take(1)).count())
            })
            .collect();

        let taken: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(taken, 100);
        assert_eq!(bucket.tokens(), 0);
    }
}
