use std::time::{Duration, Instant};

/// Cooperative periodic timer polled from the UI loop.
#[derive(Debug, Clone)]
pub struct Ticker {
    interval: Duration,
    next: Option<Instant>,
}

impl Ticker {
    /// A stopped ticker.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next: None,
        }
    }

    /// First fire happens one interval after `now`.
    pub fn start(&mut self, now: Instant) {
        self.next = Some(now + self.interval);
    }

    pub fn stop(&mut self) {
        self.next = None;
    }

    pub fn is_active(&self) -> bool {
        self.next.is_some()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Takes effect from the next fire.
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval.max(Duration::from_millis(1));
    }

    /// True when due. Missed periods collapse into a single fire.
    pub fn fire(&mut self, now: Instant) -> bool {
        match self.next {
            Some(due) if now >= due => {
                self.next = Some(now + self.interval);
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fires_once_per_interval_only_while_active() {
        let t0 = Instant::now();
        let mut ticker = Ticker::new(Duration::from_millis(100));
        assert!(!ticker.fire(t0 + Duration::from_secs(1)));

        ticker.start(t0);
        assert!(!ticker.fire(t0 + Duration::from_millis(50)));
        assert!(ticker.fire(t0 + Duration::from_millis(100)));
        assert!(!ticker.fire(t0 + Duration::from_millis(150)));
        // a long stall yields one fire, not a burst
        assert!(ticker.fire(t0 + Duration::from_millis(900)));
        assert!(!ticker.fire(t0 + Duration::from_millis(950)));

        ticker.stop();
        assert!(!ticker.fire(t0 + Duration::from_secs(5)));
    }
}
