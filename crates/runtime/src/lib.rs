pub mod event_bus;
pub mod frame;
pub mod notifier;
pub mod operations;
pub mod work_queue;

pub use event_bus::*;
pub use frame::*;
pub use notifier::*;
pub use operations::*;
pub use work_queue::*;
