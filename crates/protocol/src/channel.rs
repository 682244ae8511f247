//! Cross-context command channel messages.
//!
//! Content scripts running inside a tracked context talk to the orchestrating
//! process with these request/response pairs:
//!
//! ```json
//! { "type": "SESSION_START", "purpose": "oauth" }
//! { "sessionId": "session-18c2f0a1b2c-1" }
//! ```

use serde::{Deserialize, Serialize};

use crate::context::{ContextId, WindowId};
use crate::session::{Purpose, Session, SessionId};

/// Identity of the context that sent a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageSender {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub context_id: Option<ContextId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub window_id: Option<WindowId>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
}

impl MessageSender {
	pub fn context(id: impl Into<ContextId>) -> Self {
		Self {
			context_id: Some(id.into()),
			..Default::default()
		}
	}
}

/// Request sent over the command channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum ChannelRequest {
	SessionStart {
		#[serde(default)]
		purpose: Purpose,
	},
	SessionComplete {
		session_id: SessionId,
	},
	SessionFail {
		session_id: SessionId,
		#[serde(default)]
		reason: String,
	},
	SessionCancel {
		session_id: SessionId,
	},
	/// Announces that the sender is about to open a new context.
	PendingOpen {
		#[serde(default)]
		reason: String,
	},
	GetSession {
		#[serde(default)]
		session_id: Option<SessionId>,
	},
	/// Delegates a whole OAuth popup wait to the orchestrator.
	HandleOauth {
		#[serde(default)]
		provider: Option<String>,
	},
}

impl ChannelRequest {
	/// Wire name of the request type.
	pub fn kind(&self) -> &'static str {
		match self {
			ChannelRequest::SessionStart { .. } => "SESSION_START",
			ChannelRequest::SessionComplete { .. } => "SESSION_COMPLETE",
			ChannelRequest::SessionFail { .. } => "SESSION_FAIL",
			ChannelRequest::SessionCancel { .. } => "SESSION_CANCEL",
			ChannelRequest::PendingOpen { .. } => "PENDING_OPEN",
			ChannelRequest::GetSession { .. } => "GET_SESSION",
			ChannelRequest::HandleOauth { .. } => "HANDLE_OAUTH",
		}
	}
}

/// Response returned over the command channel.
///
/// Variant order matters for deserialization: `Session` accepts any object
/// because its only field is optional, so it is tried last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelResponse {
	Started {
		#[serde(rename = "sessionId")]
		session_id: SessionId,
	},
	Outcome {
		success: bool,
		#[serde(default, skip_serializing_if = "Option::is_none")]
		error: Option<String>,
	},
	Error {
		error: String,
	},
	Session {
		session: Option<Box<Session>>,
	},
}

impl ChannelResponse {
	pub fn ok() -> Self {
		ChannelResponse::Outcome { success: true, error: None }
	}

	pub fn failure(error: impl Into<String>) -> Self {
		ChannelResponse::Outcome {
			success: false,
			error: Some(error.into()),
		}
	}

	pub fn error(error: impl Into<String>) -> Self {
		ChannelResponse::Error { error: error.into() }
	}

	pub fn session(session: Option<Session>) -> Self {
		ChannelResponse::Session {
			session: session.map(Box::new),
		}
	}

	/// `false` for explicit failures and errors, `true` otherwise.
	pub fn is_success(&self) -> bool {
		match self {
			ChannelResponse::Outcome { success, .. } => *success,
			ChannelResponse::Error { .. } => false,
			ChannelResponse::Started { .. } | ChannelResponse::Session { .. } => true,
		}
	}
}
