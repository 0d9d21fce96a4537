/*!
    The master playback clock.
*/

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

/**
    The shared audio master clock.

    The audio sink is the single writer: after each device write it derives
    the byte-accurate playout position and publishes it here. The video
    pacer and the controller are readers. The published value is monotonic
    non-decreasing while playing and resets to 0 on stop.

    Readers take a single atomic load; there is no backlog of clock events.
*/
pub struct MasterClock {
    millis: AtomicI64,
    updated_at: Mutex<Option<Instant>>,
}

impl MasterClock {
    /**
        Create a clock at position zero.
    */
    pub fn new() -> Self {
        Self {
            millis: AtomicI64::new(0),
            updated_at: Mutex::new(None),
        }
    }

    /**
        Publish a new playout position in milliseconds.

        Values below the current position are ignored, keeping the clock
        monotonic across jittery device readings.
    */
    pub fn publish(&self, millis: i64) {
        self.millis.fetch_max(millis, Ordering::Release);
        *self.updated_at.lock().unwrap() = Some(Instant::now());
    }

    /**
        Current playout position in milliseconds.
    */
    pub fn millis(&self) -> i64 {
        self.millis.load(Ordering::Acquire)
    }

    /**
        Wall-clock time of the last publish, if any.
    */
    pub fn last_update(&self) -> Option<Instant> {
        *self.updated_at.lock().unwrap()
    }

    /**
        Reset the clock to zero. Called on stop; the monotonicity guarantee
        holds only within a single start..stop session.
    */
    pub fn reset(&self) {
        self.millis.store(0, Ordering::Release);
        *self.updated_at.lock().unwrap() = None;
    }
}

impl Default for MasterClock {
    fn default() -> Self {
        Self::new()
    }
}

// Verify MasterClock is Send + Sync
static_assertions::assert_impl_all!(MasterClock: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_position_is_zero() {
        let clock = MasterClock::new();
        assert_eq!(clock.millis(), 0);
        assert!(clock.last_update().is_none());
    }

    #[test]
    fn publish_advances() {
        let clock = MasterClock::new();
        clock.publish(120);
        assert_eq!(clock.millis(), 120);
        assert!(clock.last_update().is_some());
    }

    #[test]
    fn stale_publish_is_ignored() {
        let clock = MasterClock::new();
        clock.publish(500);
        clock.publish(300);
        assert_eq!(clock.millis(), 500);
    }

    #[test]
    fn reset_returns_to_zero() {
        let clock = MasterClock::new();
        clock.publish(1000);
        clock.reset();
        assert_eq!(clock.millis(), 0);
        assert!(clock.last_update().is_none());

        // A fresh session may publish lower values again
        clock.publish(10);
        assert_eq!(clock.millis(), 10);
    }
}
