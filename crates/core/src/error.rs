//! Error types for the orchestrator.

use tabwright_protocol::{ContextId, SessionId};
use thiserror::Error;

/// Errors surfaced by orchestrator operations and waiters.
#[derive(Debug, Error)]
pub enum Error {
	/// The host could not resolve a context.
	#[error("Context {0} not found")]
	NotFound(ContextId),

	/// The context already anchors or belongs to a live session.
	#[error("Context {context} is already tracked by session {session}")]
	ContextOwned { context: ContextId, session: SessionId },

	#[error("Timed out after {ms}ms waiting for {condition}")]
	Timeout { ms: u64, condition: String },

	/// The context disappeared while a waiter was observing it.
	#[error("Context {0} was closed")]
	ContextClosed(ContextId),

	#[error("Wait was cancelled")]
	Cancelled,

	/// The command channel server is gone.
	#[error("Command channel closed")]
	ChannelClosed,

	#[error("Host error: {0}")]
	Host(String),

	#[error("Invalid configuration: {0}")]
	Config(String),

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),
}

impl Error {
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout { .. })
	}
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn timeout_message_names_condition() {
		let err = Error::Timeout {
			ms: 1000,
			condition: "new context opened from 7".to_string(),
		};
		assert!(err.is_timeout());
		assert_eq!(err.to_string(), "Timed out after 1000ms waiting for new context opened from 7");
		assert!(!Error::Cancelled.is_timeout());
	}
}
