/// A liveness timer measured against the tunnel manager's logical clock, in milliseconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct RxTimer {
    duration_msec: u64,
    deadline: Option<u64>,
}

impl RxTimer {
    pub fn start(&mut self, duration_msec: u64, now: u64) {
        self.duration_msec = duration_msec;
        self.deadline = Some(now + duration_msec);
    }

    /// Push the deadline out by a full duration.  Does nothing if the timer is not running.
    pub fn restart(&mut self, now: u64) {
        if self.deadline.is_some() {
            self.deadline = Some(now + self.duration_msec);
        }
    }

    pub fn stop(&mut self) {
        self.deadline = None;
    }

    pub fn is_running(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn has_expired(&self, now: u64) -> bool {
        self.deadline.is_some_and(|deadline| now >= deadline)
    }
}
