//! Browsing context descriptors as reported by the host.

use serde::{Deserialize, Serialize};

/// Host-assigned identifier of a browsing context (a tab).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextId(pub i32);

impl From<i32> for ContextId {
	fn from(id: i32) -> Self {
		Self(id)
	}
}

impl std::fmt::Display for ContextId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Host-assigned identifier of the window a context lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i32);

impl From<i32> for WindowId {
	fn from(id: i32) -> Self {
		Self(id)
	}
}

impl std::fmt::Display for WindowId {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// Document load state of a context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadStatus {
	#[default]
	Loading,
	Complete,
}

/// Cached copy of a host browsing context.
///
/// The host owns the real context; the orchestrator refreshes this copy on
/// every lifecycle notification it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Context {
	pub id: ContextId,
	pub window_id: WindowId,
	#[serde(default)]
	pub url: String,
	/// Destination of a context that has not committed its first navigation yet.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pending_url: Option<String>,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub active: bool,
	#[serde(default)]
	pub load_status: LoadStatus,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub opener_context_id: Option<ContextId>,
	/// Milliseconds since the Unix epoch when this copy was taken.
	#[serde(default)]
	pub observed_at: u64,
}

impl Context {
	/// Creates a loading, inactive context with no opener.
	pub fn new(id: impl Into<ContextId>, window_id: impl Into<WindowId>, url: impl Into<String>) -> Self {
		Self {
			id: id.into(),
			window_id: window_id.into(),
			url: url.into(),
			pending_url: None,
			title: String::new(),
			active: false,
			load_status: LoadStatus::Loading,
			opener_context_id: None,
			observed_at: crate::now_ms(),
		}
	}

	pub fn with_opener(mut self, opener: impl Into<ContextId>) -> Self {
		self.opener_context_id = Some(opener.into());
		self
	}

	pub fn with_title(mut self, title: impl Into<String>) -> Self {
		self.title = title.into();
		self
	}

	pub fn with_pending_url(mut self, url: impl Into<String>) -> Self {
		self.pending_url = Some(url.into());
		self
	}

	pub fn with_status(mut self, status: LoadStatus) -> Self {
		self.load_status = status;
		self
	}

	/// URL used for classification: the pending URL while one is set, otherwise the committed URL.
	pub fn effective_url(&self) -> &str {
		match self.pending_url.as_deref() {
			Some(pending) if !pending.is_empty() => pending,
			_ => &self.url,
		}
	}

	pub fn is_complete(&self) -> bool {
		self.load_status == LoadStatus::Complete
	}
}
