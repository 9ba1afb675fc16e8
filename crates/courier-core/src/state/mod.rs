//! Order state: the transition table and persisted order records.
//!
//! The table decides which status changes are legal; the repository reads
//! orders together with version tokens and writes them back only through
//! conditional batches.

pub mod repository;
pub mod transitions;

pub use repository::OrderRepository;
pub use transitions::TransitionTable;
