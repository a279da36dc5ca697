//! Route handlers.

pub mod health;
pub mod logs;
pub mod migrate;
pub mod status;
