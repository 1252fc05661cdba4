//! Domain model (packets, records, lifecycle states, outcomes, errors).

pub mod errors;
pub mod ids;
pub mod outcome;
pub mod packet;
pub mod record;
pub mod state;

pub use errors::{QueueError, StoreError};
pub use ids::{BatchId, Id, IdMarker, Sequence, StoreId};
pub use outcome::{BatchOutcome, PurgeCount, StateTotals, StoreTotals, TransactionResult};
pub use packet::DataPacket;
pub use record::QueuedRecord;
pub use state::LifecycleState;
