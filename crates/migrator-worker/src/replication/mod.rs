//! Volume pairing and the storage replication engine.

pub mod engine;
pub mod pairing;
pub mod strategy;

pub use engine::{ReplicationEngine, ReplicationReport};
pub use pairing::{Pairing, VolumePair, pair_by_role};
