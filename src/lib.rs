//! Shardsync Movement Core Library
//!
//! This library provides the authoritative movement-synchronization core for
//! one game world shard: validation of client motion reports, ack-gated
//! server-forced kinematic changes, and tile-based area-of-interest
//! bookkeeping.
//!
//! ## Modules
//!
//! - `aoi` - Tile grid and visibility delta iteration
//! - `config` - Shard configuration management
//! - `error` - Error types and the rejection severity taxonomy
//! - `motion` - Kinematic state and motion report validation
//! - `pending` - Ledger of forced changes awaiting acknowledgment
//! - `session` - Per-connection movement sessions and the registry
//! - `shard` - The shard context orchestrating all of the above
//! - `transport` - Seams to the session/transport layer

pub mod aoi;
pub mod config;
pub mod error;
pub mod motion;
pub mod pending;
pub mod session;
pub mod shard;
pub mod transport;

// Re-export commonly used types
pub use config::{DriftPolicy, ShardConfig};
pub use error::{Result, ShardError};
pub use shard::ShardContext;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
