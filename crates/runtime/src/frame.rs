use foundation::time::Time;

/// Frame metadata handed to every layer update.
///
/// This is the only timebase the layer pipeline reads: retry backoff and
/// fade-in are measured against `time`, never against the wall clock, so a
/// recorded frame sequence replays identically.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Frame {
    /// 0-based frame index.
    pub index: u64,
    /// Delta time since the previous frame (seconds).
    pub dt_s: f64,
    /// Host time at the start of the frame (seconds).
    pub time: Time,
}

impl Frame {
    /// Fixed-step frame: `time = index * dt_s`.
    pub fn new(index: u64, dt_s: f64) -> Self {
        Self {
            index,
            dt_s,
            time: Time(index as f64 * dt_s),
        }
    }

    /// Frame stamped with an externally measured time.
    pub fn at(index: u64, time: Time) -> Self {
        Self {
            index,
            dt_s: 0.0,
            time,
        }
    }

    pub fn next(self) -> Self {
        Self::new(self.index + 1, self.dt_s)
    }
}
