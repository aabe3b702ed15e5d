use chrono::{DateTime, Local};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Time source for the acquisition controller.
pub trait Clock {
    /// Monotonic reading used for phase deadlines.
    fn monotonic(&self) -> Duration;
    /// Wall-clock reading used to label persisted batches.
    fn wall(&self) -> DateTime<Local>;
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }

    fn wall(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Clock that only moves when told to. Clones share the same reading.
#[derive(Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

struct ManualState {
    elapsed: Duration,
    wall: DateTime<Local>,
}

impl ManualClock {
    pub fn starting_at(wall: DateTime<Local>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                elapsed: Duration::ZERO,
                wall,
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.elapsed += by;
            if let Ok(delta) = chrono::Duration::from_std(by) {
                state.wall = state.wall + delta;
            }
        }
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::starting_at(Local::now())
    }
}

impl Clock for ManualClock {
    fn monotonic(&self) -> Duration {
        self.state
            .lock()
            .map(|state| state.elapsed)
            .unwrap_or_default()
    }

    fn wall(&self) -> DateTime<Local> {
        self.state
            .lock()
            .map(|state| state.wall)
            .unwrap_or_else(|_| Local::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn manual_clock_moves_both_readings_together() {
        let start = Local.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();
        let clock = ManualClock::starting_at(start);
        let shared = clock.clone();

        shared.advance(Duration::from_secs(90));
        assert_eq!(clock.monotonic(), Duration::from_secs(90));
        assert_eq!(clock.wall(), start + chrono::Duration::seconds(90));
    }
}
