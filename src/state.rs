//! Shared detection state between the detection loop and the controllers.
//!
//! The detection loop is the only writer. Each cycle it publishes either a
//! target or its absence; both controllers block on a condition variable
//! until a publish with a target present happens that they have not yet
//! acted on. Stale publishes are never queued: a waking controller sees only
//! the most recent one.

use std::sync::{Condvar, Mutex, MutexGuard};

use crate::detect::BoundingBox;

/// The published detection: box and confidence always travel together.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Target {
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// A copy of the shared state taken under the lock.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub target: Target,
    /// Publish generation the target belongs to.
    pub generation: u64,
}

/// Outcome of waiting for the next publish.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Wait {
    Published(Snapshot),
    Shutdown,
}

#[derive(Debug, Default)]
struct Slot {
    target: Option<Target>,
    generation: u64,
    shutdown: bool,
}

/// Single shared record guarded by one mutex, plus the "present" signal.
#[derive(Debug, Default)]
pub struct SharedDetection {
    slot: Mutex<Slot>,
    published: Condvar,
}

impl SharedDetection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Slot> {
        // A panicking holder can only have been mid field copy; the slot is
        // still a whole value.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Publish this cycle's outcome. `None` clears the present signal and
    /// resets the stored confidence to zero.
    pub fn publish(&self, target: Option<Target>) -> u64 {
        let generation = {
            let mut slot = self.lock();
            slot.target = target;
            slot.generation += 1;
            slot.generation
        };
        if target.is_some() {
            self.published.notify_all();
        }
        generation
    }

    /// Clear the present signal without bumping the generation.
    pub fn clear(&self) {
        self.lock().target = None;
    }

    /// Current target, if one is present.
    pub fn snapshot(&self) -> Option<Snapshot> {
        let slot = self.lock();
        slot.target.map(|target| Snapshot {
            target,
            generation: slot.generation,
        })
    }

    /// Stored confidence; zero while no target is present.
    pub fn confidence(&self) -> f32 {
        self.lock().target.map_or(0.0, |t| t.confidence)
    }

    pub fn is_present(&self) -> bool {
        self.lock().target.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.lock().generation
    }

    /// Block until a target is present in a generation newer than `seen`, or
    /// until shutdown. Holds no resources while parked.
    pub fn wait_next(&self, seen: u64) -> Wait {
        let mut slot = self.lock();
        loop {
            if slot.shutdown {
                return Wait::Shutdown;
            }
            if let Some(target) = slot.target {
                if slot.generation > seen {
                    return Wait::Published(Snapshot {
                        target,
                        generation: slot.generation,
                    });
                }
            }
            slot = self
                .published
                .wait(slot)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Wake every waiter and make all future waits return `Shutdown`.
    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.published.notify_all();
    }

    pub fn is_shutdown(&self) -> bool {
        self.lock().shutdown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn target(x: i32, confidence: f32) -> Target {
        Target {
            bbox: BoundingBox::new(x, x, x + 40, x + 40),
            confidence,
        }
    }

    #[test]
    fn starts_absent() {
        let state = SharedDetection::new();
        assert!(!state.is_present());
        assert_eq!(state.confidence(), 0.0);
        assert!(state.snapshot().is_none());
        assert_eq!(state.generation(), 0);
    }

    #[test]
    fn publish_absence_resets_confidence() {
        let state = SharedDetection::new();
        state.publish(Some(target(10, 0.9)));
        assert!(state.is_present());
        assert_eq!(state.confidence(), 0.9);

        state.publish(None);
        assert!(!state.is_present());
        assert_eq!(state.confidence(), 0.0);
        assert_eq!(state.generation(), 2);
    }

    #[test]
    fn wait_returns_each_generation_once() {
        let state = SharedDetection::new();
        let generation = state.publish(Some(target(1, 0.8)));
        let Wait::Published(snapshot) = state.wait_next(0) else {
            panic!("expected a publish");
        };
        assert_eq!(snapshot.generation, generation);
        assert_eq!(snapshot.target, target(1, 0.8));

        let waiter = {
            let state = Arc::new(state);
            let s = state.clone();
            let handle = thread::spawn(move || s.wait_next(generation));
            thread::sleep(Duration::from_millis(20));
            assert!(!handle.is_finished());
            state.publish(Some(target(2, 0.95)));
            handle
        };
        match waiter.join().expect("waiter thread") {
            Wait::Published(next) => {
                assert_eq!(next.generation, generation + 1);
                assert_eq!(next.target.bbox.x1, 2);
            }
            Wait::Shutdown => panic!("unexpected shutdown"),
        }
    }

    #[test]
    fn absent_publish_does_not_wake_waiters() {
        let state = Arc::new(SharedDetection::new());
        let s = state.clone();
        let handle = thread::spawn(move || s.wait_next(0));
        state.publish(None);
        thread::sleep(Duration::from_millis(20));
        assert!(!handle.is_finished());
        state.shutdown();
        assert_eq!(handle.join().expect("waiter thread"), Wait::Shutdown);
    }

    #[test]
    fn shutdown_wakes_all_waiters() {
        let state = Arc::new(SharedDetection::new());
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let s = state.clone();
                thread::spawn(move || s.wait_next(0))
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        state.shutdown();
        for handle in handles {
            assert_eq!(handle.join().expect("waiter thread"), Wait::Shutdown);
        }
        assert!(state.is_shutdown());
    }

    #[test]
    fn readers_never_observe_torn_pairs() {
        // Every published pair satisfies confidence == x1 / 1000.
        let state = Arc::new(SharedDetection::new());
        let readers: Vec<_> = (0..2)
            .map(|_| {
                let s = state.clone();
                thread::spawn(move || {
                    let mut seen = 0;
                    loop {
                        match s.wait_next(seen) {
                            Wait::Published(snapshot) => {
                                let t = snapshot.target;
                                assert_eq!(t.confidence, t.bbox.x1 as f32 / 1000.0);
                                assert_eq!(t.bbox.x2, t.bbox.x1 + 40);
                                seen = snapshot.generation;
                            }
                            Wait::Shutdown => return,
                        }
                    }
                })
            })
            .collect();

        for i in 0..2000 {
            let x = i % 1000;
            if i % 7 == 0 {
                state.publish(None);
            } else {
                state.publish(Some(target(x, x as f32 / 1000.0)));
            }
        }
        state.shutdown();
        for reader in readers {
            reader.join().expect("reader thread");
        }
    }
}
