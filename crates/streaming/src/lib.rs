pub mod abort;
pub mod request_queue;

pub use abort::*;
pub use request_queue::*;
