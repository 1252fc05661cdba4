//! Queue module: capacity checks, batch selection and the engine that ties
//! them to a packet store.

mod batch;
mod capacity;
mod engine;

pub use batch::Batch;
pub use capacity::Capacity;
pub use engine::{QueueEngine, TransmissionOutcome};
