use std::cell::Cell;
use std::rc::Rc;

use chrono::Utc;

/// Source of "now" timestamps used to pace emitters and drains.
/// The simulation takes the clock as a boxed trait object so tests can step
/// time by hand instead of waiting on the wall clock.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> f64;
}

/// The wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> f64 {
        Utc::now().timestamp_millis() as f64
    }
}

/// A clock that only moves when told to.
pub struct ManualClock {
    millis: Cell<f64>,
}

impl ManualClock {
    /// Creates the clock behind an `Rc` so a test can keep a handle to it
    /// after handing a clone to the simulation.
    pub fn starting_at(millis: f64) -> Rc<Self> {
        Rc::new(ManualClock {
            millis: Cell::new(millis),
        })
    }

    pub fn advance(&self, millis: f64) {
        self.millis.set(self.millis.get() + millis);
    }

    pub fn set(&self, millis: f64) {
        self.millis.set(millis);
    }
}

impl Clock for Rc<ManualClock> {
    fn now_ms(&self) -> f64 {
        self.millis.get()
    }
}
