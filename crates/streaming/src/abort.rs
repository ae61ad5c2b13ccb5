use std::cell::Cell;
use std::rc::Rc;

use thiserror::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
#[error("operation aborted")]
pub struct Aborted;

/// Observer side of an [`AbortController`].
///
/// Cheap to clone; every clone observes the same flag.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Rc<Cell<bool>>,
}

impl AbortSignal {
    pub fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    pub fn check(&self) -> Result<(), Aborted> {
        if self.is_aborted() { Err(Aborted) } else { Ok(()) }
    }
}

/// Owner side of a cancellation flag. Aborting is one-way.
#[derive(Debug, Default)]
pub struct AbortController {
    signal: AbortSignal,
}

impl AbortController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn signal(&self) -> AbortSignal {
        self.signal.clone()
    }

    pub fn abort(&self) {
        self.signal.aborted.set(true);
    }

    pub fn is_aborted(&self) -> bool {
        self.signal.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::{AbortController, Aborted};

    #[test]
    fn abort_is_visible_to_every_signal() {
        let c = AbortController::new();
        let a = c.signal();
        let b = a.clone();
        assert_eq!(a.check(), Ok(()));
        c.abort();
        assert!(a.is_aborted() && b.is_aborted());
        assert_eq!(b.check(), Err(Aborted));
    }
}
