//! Tab-lifecycle notifications delivered by the host.

use serde::{Deserialize, Serialize};

use crate::context::{Context, ContextId, LoadStatus, WindowId};

/// Fields that changed in an `updated` notification.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeInfo {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub title: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<LoadStatus>,
}

impl ChangeInfo {
	pub fn url(url: impl Into<String>) -> Self {
		Self {
			url: Some(url.into()),
			..Default::default()
		}
	}

	pub fn is_empty(&self) -> bool {
		self.url.is_none() && self.title.is_none() && self.status.is_none()
	}
}

/// A single host notification about a browsing context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum HostNotification {
	/// A context was created; `context.opener_context_id` names its opener when known.
	Created { context: Context },
	/// URL, title or load status of a context changed.
	Updated { context_id: ContextId, changes: ChangeInfo, context: Context },
	/// A context was closed.
	Removed { context_id: ContextId },
	/// A context became the focused tab of its window.
	Activated { context_id: ContextId, window_id: WindowId },
}

impl HostNotification {
	/// Context the notification is about.
	pub fn context_id(&self) -> ContextId {
		match self {
			Self::Created { context } => context.id,
			Self::Updated { context_id, .. } | Self::Removed { context_id } | Self::Activated { context_id, .. } => *context_id,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn notification_tags_use_kind_field() {
		let json = serde_json::to_value(HostNotification::Removed { context_id: ContextId(4) }).unwrap();
		assert_eq!(json["kind"], "removed");
		assert_eq!(json["contextId"], 4);
	}

	#[test]
	fn updated_notification_parses() {
		let json = r#"{
			"kind": "updated",
			"contextId": 11,
			"changes": {"url": "https://example.com/cb?code=abc"},
			"context": {"id": 11, "windowId": 1, "url": "https://example.com/cb?code=abc"}
		}"#;
		let notification: HostNotification = serde_json::from_str(json).unwrap();
		assert_eq!(notification.context_id(), ContextId(11));
		match notification {
			HostNotification::Updated { changes, .. } => {
				assert_eq!(changes.url.as_deref(), Some("https://example.com/cb?code=abc"));
				assert!(changes.status.is_none());
			}
			other => panic!("unexpected notification: {other:?}"),
		}
	}
}
