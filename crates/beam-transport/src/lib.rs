//! Pooled bidirectional channel contract for beam.
//!
//! The multiplexer needs exactly two things from its backing store:
//! - publish bytes under a key
//! - receive (blocking pop) bytes published under a key
//!
//! This crate defines that contract ([`Connection`], [`PooledChannel`]),
//! a checkout/checkin [`ConnectionPool`], and [`MemoryStore`], an
//! in-process store used by tests and the CLI.

pub mod error;
pub mod memory;
pub mod pool;
pub mod traits;

pub use error::{Result, TransportError};
pub use memory::{MemoryConnection, MemoryStore};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use traits::{Connection, ConnectionManager, PooledChannel, SharedChannel};
