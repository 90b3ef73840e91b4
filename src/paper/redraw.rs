use std::time::{Duration, Instant};

/// Re-armable one-shot timer that coalesces repaint requests.
///
/// Every `arm` pushes the deadline out again, so a burst of image loads
/// produces a single repaint once things go quiet.
#[derive(Debug, Clone)]
pub struct RedrawTimer {
    delay: Duration,
    deadline: Option<Instant>,
}

impl RedrawTimer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            deadline: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn arm(&mut self, now: Instant) {
        self.deadline = Some(now + self.delay);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns `true` exactly once, on the first call at or after the deadline.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}

impl Default for RedrawTimer {
    fn default() -> Self {
        Self::new(Duration::from_millis(300))
    }
}
