/// Counts in-flight operations for loading/progress reporting.
///
/// `total` only grows until the counter drains back to idle, so progress is
/// monotonic within a burst of work.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct OperationCounter {
    pending: u64,
    completed: u64,
    total: u64,
}

impl OperationCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment(&mut self) {
        if self.pending == 0 {
            self.completed = 0;
            self.total = 0;
        }
        self.pending += 1;
        self.total += 1;
    }

    pub fn decrement(&mut self) {
        if self.pending == 0 {
            tracing::warn!("operation counter decremented while idle");
            return;
        }
        self.pending -= 1;
        self.completed += 1;
    }

    pub fn pending(&self) -> u64 {
        self.pending
    }

    pub fn loading(&self) -> bool {
        self.pending > 0
    }

    /// Fraction of the current burst that has completed; `1.0` when idle.
    pub fn progress(&self) -> f64 {
        if self.total == 0 || self.pending == 0 {
            return 1.0;
        }
        self.completed as f64 / self.total as f64
    }
}

#[cfg(test)]
mod tests {
    use super::OperationCounter;

    #[test]
    fn progress_tracks_the_current_burst() {
        let mut c = OperationCounter::new();
        assert!(!c.loading());
        assert_eq!(c.progress(), 1.0);

        c.increment();
        c.increment();
        c.increment();
        c.decrement();
        assert!(c.loading());
        assert!((c.progress() - 1.0 / 3.0).abs() < 1e-12);

        c.decrement();
        c.decrement();
        assert!(!c.loading());
        assert_eq!(c.progress(), 1.0);

        // A new burst starts from zero.
        c.increment();
        assert_eq!(c.progress(), 0.0);
    }

    #[test]
    fn decrement_when_idle_is_ignored() {
        let mut c = OperationCounter::new();
        c.decrement();
        assert_eq!(c.pending(), 0);
    }
}
