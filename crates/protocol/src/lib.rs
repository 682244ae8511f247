//! Wire types shared between the tabwright orchestrator and its collaborators.
//!
//! This crate contains the serde-serializable shapes that cross a process or
//! context boundary: browsing-context descriptors reported by the host, the
//! host's tab-lifecycle notifications, session snapshots, and the request and
//! response messages of the cross-context command channel.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small accessors
//! * Stable: Changes only when a wire shape changes
//!
//! Orchestration logic is built on top of these types in `tabwright`.

pub mod channel;
pub mod context;
pub mod notification;
pub mod session;

pub use channel::*;
pub use context::*;
pub use notification::*;
pub use session::*;

/// Returns the current wall-clock time as milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
	std::time::SystemTime::now()
		.duration_since(std::time::UNIX_EPOCH)
		.map(|d| d.as_millis() as u64)
		.unwrap_or(0)
}
