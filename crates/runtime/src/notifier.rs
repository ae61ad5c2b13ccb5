use std::cell::RefCell;
use std::rc::Rc;

use crate::event_bus::EventBus;

/// A request for the host renderer to draw another frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeRequest {
    /// Name of the object that changed (typically a layer).
    pub source: String,
    /// Redraw even if the host would otherwise consider the view stable.
    pub force: bool,
}

/// Shared handle for `notify_change`.
///
/// Cloning is cheap; every clone feeds the same queue. Fetch tasks hold a
/// clone so completed downloads can wake the host.
#[derive(Debug, Clone, Default)]
pub struct ChangeNotifier {
    bus: Rc<RefCell<EventBus<ChangeRequest>>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_change(&self, source: impl Into<String>, force: bool) {
        self.bus.borrow_mut().emit(ChangeRequest {
            source: source.into(),
            force,
        });
    }

    pub fn needs_redraw(&self) -> bool {
        !self.bus.borrow().is_empty()
    }

    pub fn drain(&self) -> Vec<ChangeRequest> {
        self.bus.borrow_mut().drain()
    }
}
