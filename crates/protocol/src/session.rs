//! Session records tracked by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextId};

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
	pub fn new(id: impl Into<String>) -> Self {
		Self(id.into())
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}
}

impl std::fmt::Display for SessionId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.write_str(&self.0)
	}
}

/// Declared or learned intent of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Purpose {
	Oauth,
	ExternalForm,
	DocumentUpload,
	Verification,
	#[default]
	Unknown,
}

impl std::fmt::Display for Purpose {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			Purpose::Oauth => write!(f, "oauth"),
			Purpose::ExternalForm => write!(f, "external-form"),
			Purpose::DocumentUpload => write!(f, "document-upload"),
			Purpose::Verification => write!(f, "verification"),
			Purpose::Unknown => write!(f, "unknown"),
		}
	}
}

impl std::str::FromStr for Purpose {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_lowercase().replace('_', "-").as_str() {
			"oauth" => Ok(Purpose::Oauth),
			"external-form" => Ok(Purpose::ExternalForm),
			"document-upload" => Ok(Purpose::DocumentUpload),
			"verification" => Ok(Purpose::Verification),
			"unknown" => Ok(Purpose::Unknown),
			_ => Err(format!("unknown purpose: {s}")),
		}
	}
}

/// Lifecycle state of a session.
///
/// `Active` and `Waiting` are live; the other three are terminal and never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
	Active,
	/// A caller is blocked on this session's outcome.
	Waiting,
	Completed,
	Failed,
	Cancelled,
}

impl SessionState {
	pub fn is_terminal(self) -> bool {
		matches!(self, SessionState::Completed | SessionState::Failed | SessionState::Cancelled)
	}
}

impl std::fmt::Display for SessionState {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SessionState::Active => write!(f, "active"),
			SessionState::Waiting => write!(f, "waiting"),
			SessionState::Completed => write!(f, "completed"),
			SessionState::Failed => write!(f, "failed"),
			SessionState::Cancelled => write!(f, "cancelled"),
		}
	}
}

/// One tracked workflow: an origin context plus the contexts it spawned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
	pub id: SessionId,
	pub origin: Context,
	#[serde(default)]
	pub children: Vec<Context>,
	pub purpose: Purpose,
	pub state: SessionState,
	/// Identity provider recognized in one of the children.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub provider: Option<String>,
	/// Application-tracking system recognized in one of the children.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub ats: Option<String>,
	pub started_at: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub completed_at: Option<u64>,
	pub timeout_ms: u64,
	pub auto_close: bool,
	/// Failure or cancellation reason.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub reason: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub focused_context_id: Option<ContextId>,
}

impl Session {
	pub fn is_terminal(&self) -> bool {
		self.state.is_terminal()
	}

	pub fn is_origin(&self, id: ContextId) -> bool {
		self.origin.id == id
	}

	pub fn has_child(&self, id: ContextId) -> bool {
		self.children.iter().any(|child| child.id == id)
	}

	pub fn child_ids(&self) -> Vec<ContextId> {
		self.children.iter().map(|child| child.id).collect()
	}

	/// Cached copy of a tracked context, origin or child.
	pub fn context(&self, id: ContextId) -> Option<&Context> {
		if self.origin.id == id {
			return Some(&self.origin);
		}
		self.children.iter().find(|child| child.id == id)
	}

	pub fn context_mut(&mut self, id: ContextId) -> Option<&mut Context> {
		if self.origin.id == id {
			return Some(&mut self.origin);
		}
		self.children.iter_mut().find(|child| child.id == id)
	}
}
