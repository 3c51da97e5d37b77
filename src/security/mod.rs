//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Caller address (transport peer):
//!     → access_control.rs (CIDR allow-list)
//!         → cache.rs (bounded LRU memoizing per-address answers)
//!
//! presets.rs supplies the named range and endpoint bundles
//! merged in by the pipeline builder.
//! ```
//!
//! # Design Decisions
//! - Fail closed: an address that does not parse is never allowed
//! - Ranges are immutable, so cached answers can never go stale

pub mod access_control;
pub mod cache;
pub mod presets;

pub use access_control::AccessList;
