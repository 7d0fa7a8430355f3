//! Time and id generation, injected rather than called inline, so that lease
//! expiry, freshness decay, and timestamps are deterministic in tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Generator of unique identifiers.
pub trait IdGen: Send + Sync {
    /// Produce a new unique id.
    fn new_uuid(&self) -> Uuid;
}

/// [`Clock`] backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`IdGen`] backed by random v4 UUIDs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV4Gen;

impl IdGen for UuidV4Gen {
    fn new_uuid(&self) -> Uuid {
        Uuid::new_v4()
    }
}

/// [`Clock`] test double holding a mutable instant that only moves when
/// [`FixedClock::advance`] is called.
#[derive(Debug)]
pub struct FixedClock {
    instant: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    /// Start the clock at `instant`.
    #[must_use]
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: Mutex::new(instant),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.instant.lock().expect("FixedClock mutex poisoned");
        *guard += delta;
    }

    /// Set the clock to an explicit instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.lock().expect("FixedClock mutex poisoned") = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.lock().expect("FixedClock mutex poisoned")
    }
}

/// [`IdGen`] test double producing deterministic, sequential UUIDs
/// (`00000000-0000-0000-0000-00000000000N`) so fixtures are reproducible.
#[derive(Debug, Default)]
pub struct SequentialIdGen {
    next: AtomicU64,
}

impl SequentialIdGen {
    /// An id generator starting its sequence at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGen for SequentialIdGen {
    fn new_uuid(&self) -> Uuid {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        Uuid::from_u128(u128::from(n))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_only_moves_on_advance() {
        let t0 = DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);
        assert_eq!(clock.now(), t0);
        clock.advance(chrono::Duration::seconds(60));
        assert_eq!(clock.now(), t0 + chrono::Duration::seconds(60));
    }

    #[test]
    fn sequential_id_gen_never_repeats() {
        let gen = SequentialIdGen::new();
        let a = gen.new_uuid();
        let b = gen.new_uuid();
        assert_ne!(a, b);
    }
}
