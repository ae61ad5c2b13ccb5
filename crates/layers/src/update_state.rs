use foundation::time::Time;
use serde::{Deserialize, Serialize};

/// Failures beyond this count are definitive.
pub const MAX_RETRY: u32 = 4;

/// Delay before the next attempt, indexed by error count.
const BACKOFF_S: [f64; 4] = [1.0, 3.0, 7.0, 60.0];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UpdateStatus {
    #[default]
    Idle,
    Pending,
    Error,
    DefinitiveError,
    Finished,
}

/// Retry gate for one (layer, node) pair.
///
/// Lives on the node, keyed by layer. `DefinitiveError` and `Finished` are
/// terminal until [`reset`](Self::reset).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LayerUpdateState {
    status: UpdateStatus,
    error_count: u32,
    last_error_time: Option<Time>,
    last_error: Option<String>,
}

impl LayerUpdateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> UpdateStatus {
        self.status
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn seconds_until_next_try(&self) -> f64 {
        let idx = (self.error_count as usize).min(BACKOFF_S.len()).saturating_sub(1);
        BACKOFF_S[idx]
    }

    pub fn can_try_update(&self, now: Time) -> bool {
        match self.status {
            UpdateStatus::Idle => true,
            UpdateStatus::Error => {
                let last = self.last_error_time.unwrap_or(Time::ZERO);
                now.since(last) >= self.seconds_until_next_try()
            }
            UpdateStatus::Pending | UpdateStatus::DefinitiveError | UpdateStatus::Finished => false,
        }
    }

    /// Starts an attempt if the gate allows it.
    pub fn new_try(&mut self, now: Time) -> bool {
        if !self.can_try_update(now) {
            return false;
        }
        self.status = UpdateStatus::Pending;
        true
    }

    pub fn success(&mut self) {
        self.status = UpdateStatus::Idle;
        self.error_count = 0;
        self.last_error = None;
    }

    /// Records a failed attempt. Exceeding [`MAX_RETRY`] makes it definitive.
    pub fn failure(&mut self, now: Time, definitive: bool, reason: impl Into<String>) {
        self.error_count += 1;
        self.last_error_time = Some(now);
        self.last_error = Some(reason.into());
        self.status = if definitive || self.error_count > MAX_RETRY {
            UpdateStatus::DefinitiveError
        } else {
            UpdateStatus::Error
        };
    }

    /// Cancels an in-flight attempt without counting it as a failure.
    pub fn abort(&mut self) {
        if self.status == UpdateStatus::Pending {
            self.status = if self.error_count > 0 {
                UpdateStatus::Error
            } else {
                UpdateStatus::Idle
            };
        }
    }

    pub fn no_more_update_possible(&mut self) {
        self.status = UpdateStatus::Finished;
        self.error_count = 0;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use foundation::time::Time;

    use super::{LayerUpdateState, MAX_RETRY, UpdateStatus};

    #[test]
    fn backoff_follows_table() {
        let mut s = LayerUpdateState::new();
        let mut delays = Vec::new();
        for _ in 0..5 {
            s.new_try(Time(1e9));
            s.failure(Time::ZERO, false, "boom");
            delays.push(s.seconds_until_next_try());
        }
        assert_eq!(delays, vec![1.0, 3.0, 7.0, 60.0, 60.0]);
    }

    #[test]
    fn retry_waits_for_backoff() {
        let mut s = LayerUpdateState::new();
        assert!(s.new_try(Time::ZERO));
        assert!(!s.can_try_update(Time(100.0)));

        s.failure(Time(10.0), false, "timeout");
        assert_eq!(s.status(), UpdateStatus::Error);
        assert!(!s.can_try_update(Time(10.5)));
        assert!(s.can_try_update(Time(11.0)));

        assert!(s.new_try(Time(11.0)));
        s.success();
        assert_eq!(s.status(), UpdateStatus::Idle);
        assert_eq!(s.error_count(), 0);
    }

    #[test]
    fn too_many_failures_are_definitive() {
        let mut s = LayerUpdateState::new();
        for i in 0..=MAX_RETRY {
            assert!(s.new_try(Time(f64::from(i) * 100.0)));
            s.failure(Time(f64::from(i) * 100.0), false, "404");
        }
        assert_eq!(s.error_count(), 5);
        assert_eq!(s.status(), UpdateStatus::DefinitiveError);
        assert!(!s.can_try_update(Time(f64::MAX)));

        s.reset();
        assert!(s.can_try_update(Time::ZERO));
    }

    #[test]
    fn explicit_definitive_failure() {
        let mut s = LayerUpdateState::new();
        s.new_try(Time::ZERO);
        s.failure(Time::ZERO, true, "unsupported format");
        assert_eq!(s.status(), UpdateStatus::DefinitiveError);
        assert_eq!(s.last_error(), Some("unsupported format"));
    }

    #[test]
    fn abort_returns_to_previous_resting_state() {
        let mut s = LayerUpdateState::new();
        s.new_try(Time::ZERO);
        s.abort();
        assert_eq!(s.status(), UpdateStatus::Idle);

        s.new_try(Time::ZERO);
        s.failure(Time::ZERO, false, "x");
        s.new_try(Time(5.0));
        s.abort();
        assert_eq!(s.status(), UpdateStatus::Error);
        assert_eq!(s.error_count(), 1);
    }

    #[test]
    fn finished_never_retries() {
        let mut s = LayerUpdateState::new();
        s.no_more_update_possible();
        assert!(!s.new_try(Time(1e6)));
        assert_eq!(s.status(), UpdateStatus::Finished);
    }
}
