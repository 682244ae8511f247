//! In-memory ownership maps: session id → session, context id → owning session.
//!
//! The registry is plain data with no async behavior. The orchestrator keeps it
//! behind one lock and is the only writer.

use std::collections::HashMap;

use tabwright_protocol::{Context, ContextId, Purpose, Session, SessionId, SessionState, WindowId, now_ms};

use crate::error::{Error, Result};

/// Intent recorded by a PENDING_OPEN request before the context exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingOpen {
	pub session_id: SessionId,
	pub reason: String,
	pub requested_at: u64,
}

#[derive(Debug, Default)]
pub struct ContextRegistry {
	sessions: HashMap<SessionId, Session>,
	owners: HashMap<ContextId, SessionId>,
	pending_opens: HashMap<ContextId, PendingOpen>,
	seq: u64,
}

impl ContextRegistry {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn next_session_id(&mut self) -> SessionId {
		self.seq += 1;
		SessionId::new(format!("session-{:x}-{}", now_ms(), self.seq))
	}

	/// Registers a new session and maps its origin to it.
	///
	/// Fails if the origin belongs to a live session. A terminal owner that has
	/// not been evicted yet loses the mapping.
	pub fn insert(&mut self, session: Session) -> Result<()> {
		let origin = session.origin.id;
		if let Some(owner) = self.live_session_for_context(origin) {
			return Err(Error::ContextOwned {
				context: origin,
				session: owner.id.clone(),
			});
		}
		self.owners.insert(origin, session.id.clone());
		self.sessions.insert(session.id.clone(), session);
		Ok(())
	}

	pub fn get(&self, id: &SessionId) -> Option<&Session> {
		self.sessions.get(id)
	}

	pub fn owner_of(&self, context: ContextId) -> Option<&SessionId> {
		self.owners.get(&context)
	}

	pub fn session_for_context(&self, context: ContextId) -> Option<&Session> {
		self.owners.get(&context).and_then(|id| self.sessions.get(id))
	}

	pub fn live_session_for_context(&self, context: ContextId) -> Option<&Session> {
		self.session_for_context(context).filter(|session| !session.is_terminal())
	}

	/// Live session whose origin is `context`.
	pub fn session_anchored_at(&self, context: ContextId) -> Option<&Session> {
		self.live_session_for_context(context).filter(|session| session.is_origin(context))
	}

	pub fn sessions(&self) -> impl Iterator<Item = &Session> {
		self.sessions.values()
	}

	pub fn len(&self) -> usize {
		self.sessions.len()
	}

	pub fn is_empty(&self) -> bool {
		self.sessions.is_empty()
	}

	/// Appends a child to a live session. Returns `false` for duplicates and contexts owned elsewhere.
	pub fn attach_child(&mut self, session_id: &SessionId, context: Context) -> bool {
		if self.owners.contains_key(&context.id) {
			return false;
		}
		let Some(session) = self.sessions.get_mut(session_id) else {
			return false;
		};
		if session.is_terminal() || session.has_child(context.id) {
			return false;
		}
		self.owners.insert(context.id, session_id.clone());
		session.children.push(context);
		true
	}

	/// Removes a child and its ownership mapping.
	pub fn detach_child(&mut self, session_id: &SessionId, context: ContextId) -> Option<Context> {
		let session = self.sessions.get_mut(session_id)?;
		let index = session.children.iter().position(|child| child.id == context)?;
		let removed = session.children.remove(index);
		if self.owners.get(&context) == Some(session_id) {
			self.owners.remove(&context);
		}
		Some(removed)
	}

	/// Replaces the cached copy of a tracked context. Returns the owning session id.
	pub fn refresh_context(&mut self, context: &Context) -> Option<SessionId> {
		let session_id = self.owners.get(&context.id)?.clone();
		let session = self.sessions.get_mut(&session_id)?;
		let slot = session.context_mut(context.id)?;
		*slot = context.clone();
		Some(session_id)
	}

	/// Records which tracked context has focus. Returns the owning session id.
	pub fn set_focus(&mut self, context: ContextId) -> Option<SessionId> {
		let session_id = self.owners.get(&context)?.clone();
		let session = self.sessions.get_mut(&session_id)?;
		session.focused_context_id = Some(context);
		session.origin.active = session.origin.id == context;
		for child in &mut session.children {
			child.active = child.id == context;
		}
		Some(session_id)
	}

	pub fn set_purpose(&mut self, id: &SessionId, purpose: Purpose) -> bool {
		match self.sessions.get_mut(id) {
			Some(session) if !session.is_terminal() && session.purpose != purpose => {
				session.purpose = purpose;
				true
			}
			_ => false,
		}
	}

	pub fn set_provider(&mut self, id: &SessionId, provider: &str) {
		if let Some(session) = self.sessions.get_mut(id) {
			session.provider = Some(provider.to_string());
		}
	}

	pub fn set_ats(&mut self, id: &SessionId, ats: &str) {
		if let Some(session) = self.sessions.get_mut(id) {
			session.ats = Some(ats.to_string());
		}
	}

	pub fn mark_waiting(&mut self, id: &SessionId) -> bool {
		match self.sessions.get_mut(id) {
			Some(session) if session.state == SessionState::Active => {
				session.state = SessionState::Waiting;
				true
			}
			_ => false,
		}
	}

	/// Moves a live session to a terminal state and returns its snapshot.
	///
	/// Returns `None` when the session is unknown or already terminal.
	pub fn finish(&mut self, id: &SessionId, state: SessionState, reason: Option<String>) -> Option<Session> {
		debug_assert!(state.is_terminal());
		let session = self.sessions.get_mut(id)?;
		if session.is_terminal() {
			return None;
		}
		session.state = state;
		session.completed_at = Some(now_ms());
		session.reason = reason;
		Some(session.clone())
	}

	/// Drops a session and every mapping still pointing at it.
	pub fn evict(&mut self, id: &SessionId) -> Option<Session> {
		let session = self.sessions.remove(id)?;
		self.owners.retain(|_, owner| owner != id);
		self.pending_opens.retain(|_, pending| &pending.session_id != id);
		Some(session)
	}

	pub fn record_pending_open(&mut self, origin: ContextId, session_id: SessionId, reason: String) {
		self.pending_opens.insert(
			origin,
			PendingOpen {
				session_id,
				reason,
				requested_at: now_ms(),
			},
		);
	}

	pub fn pending_open(&self, origin: ContextId) -> Option<&PendingOpen> {
		self.pending_opens.get(&origin)
	}

	/// Consumes the pending intent of `origin`, if any.
	pub fn take_pending_open(&mut self, origin: ContextId) -> Option<PendingOpen> {
		self.pending_opens.remove(&origin)
	}

	/// Consumes the newest intent recorded from a live origin in `window` within
	/// the last `max_age_ms`. Stale intents and those of ended sessions are dropped.
	pub fn claim_pending_open(&mut self, window: WindowId, max_age_ms: u64) -> Option<(ContextId, PendingOpen)> {
		let now = now_ms();
		let sessions = &self.sessions;
		self.pending_opens.retain(|_, pending| {
			now.saturating_sub(pending.requested_at) <= max_age_ms && sessions.get(&pending.session_id).is_some_and(|session| !session.is_terminal())
		});

		let origin = self
			.pending_opens
			.iter()
			.filter(|(_, pending)| sessions.get(&pending.session_id).is_some_and(|session| session.origin.window_id == window))
			.max_by_key(|(_, pending)| pending.requested_at)
			.map(|(origin, _)| *origin)?;
		let pending = self.pending_opens.remove(&origin)?;
		Some((origin, pending))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn session(registry: &mut ContextRegistry, origin: i32) -> SessionId {
		let id = registry.next_session_id();
		registry
			.insert(Session {
				id: id.clone(),
				origin: Context::new(origin, 1, "https://jobs.example.com/apply"),
				children: Vec::new(),
				purpose: Purpose::Unknown,
				state: SessionState::Active,
				provider: None,
				ats: None,
				started_at: now_ms(),
				completed_at: None,
				timeout_ms: 1000,
				auto_close: true,
				reason: None,
				focused_context_id: None,
			})
			.unwrap();
		id
	}

	#[test]
	fn session_ids_are_unique() {
		let mut registry = ContextRegistry::new();
		let a = registry.next_session_id();
		let b = registry.next_session_id();
		assert_ne!(a, b);
	}

	#[test]
	fn origin_cannot_anchor_two_live_sessions() {
		let mut registry = ContextRegistry::new();
		let first = session(&mut registry, 10);

		let second = registry.next_session_id();
		let mut duplicate = registry.get(&first).unwrap().clone();
		duplicate.id = second;
		let err = registry.insert(duplicate.clone()).unwrap_err();
		assert!(matches!(err, Error::ContextOwned { session, .. } if session == first));

		registry.finish(&first, SessionState::Failed, None).unwrap();
		registry.insert(duplicate.clone()).unwrap();
		assert_eq!(registry.owner_of(ContextId(10)), Some(&duplicate.id));
	}

	#[test]
	fn child_is_attached_once() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		let child = Context::new(11, 1, "https://accounts.google.com/o/oauth2/auth").with_opener(10);

		assert!(registry.attach_child(&id, child.clone()));
		assert!(!registry.attach_child(&id, child));
		assert_eq!(registry.get(&id).unwrap().children.len(), 1);
		assert_eq!(registry.owner_of(ContextId(11)), Some(&id));
	}

	#[test]
	fn context_owned_by_another_session_is_not_stolen() {
		let mut registry = ContextRegistry::new();
		let a = session(&mut registry, 10);
		let b = session(&mut registry, 20);
		assert!(registry.attach_child(&a, Context::new(30, 1, "x")));
		assert!(!registry.attach_child(&b, Context::new(30, 1, "x")));
		assert_eq!(registry.owner_of(ContextId(30)), Some(&a));
	}

	#[test]
	fn terminal_sessions_accept_no_children_and_finish_once() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);

		let done = registry.finish(&id, SessionState::Completed, None).unwrap();
		assert_eq!(done.state, SessionState::Completed);
		assert!(done.completed_at.is_some());
		assert!(registry.finish(&id, SessionState::Failed, Some("late".to_string())).is_none());
		assert_eq!(registry.get(&id).unwrap().state, SessionState::Completed);
		assert!(!registry.attach_child(&id, Context::new(11, 1, "x")));
		assert!(!registry.mark_waiting(&id));
		assert!(!registry.set_purpose(&id, Purpose::Oauth));
	}

	#[test]
	fn refresh_updates_origin_and_children() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		registry.attach_child(&id, Context::new(11, 1, "about:blank"));

		let navigated = Context::new(11, 1, "https://example.com/cb?code=1");
		assert_eq!(registry.refresh_context(&navigated), Some(id.clone()));
		assert_eq!(registry.get(&id).unwrap().children[0].url, "https://example.com/cb?code=1");

		let origin = Context::new(10, 1, "https://jobs.example.com/step-2");
		registry.refresh_context(&origin);
		assert_eq!(registry.get(&id).unwrap().origin.url, "https://jobs.example.com/step-2");

		assert!(registry.refresh_context(&Context::new(99, 1, "x")).is_none());
	}

	#[test]
	fn focus_is_exclusive_within_session() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		registry.attach_child(&id, Context::new(11, 1, "x"));

		registry.set_focus(ContextId(11));
		let snapshot = registry.get(&id).unwrap();
		assert_eq!(snapshot.focused_context_id, Some(ContextId(11)));
		assert!(snapshot.children[0].active);
		assert!(!snapshot.origin.active);
	}

	#[test]
	fn eviction_removes_only_own_mappings() {
		let mut registry = ContextRegistry::new();
		let old = session(&mut registry, 10);
		registry.attach_child(&old, Context::new(11, 1, "x"));
		registry.record_pending_open(ContextId(10), old.clone(), "oauth".to_string());
		registry.finish(&old, SessionState::Completed, None);

		let mut reopened = registry.get(&old).unwrap().clone();
		reopened.id = registry.next_session_id();
		reopened.state = SessionState::Active;
		reopened.children.clear();
		registry.insert(reopened.clone()).unwrap();

		registry.evict(&old).unwrap();
		assert_eq!(registry.owner_of(ContextId(10)), Some(&reopened.id));
		assert!(registry.owner_of(ContextId(11)).is_none());
		assert!(registry.pending_open(ContextId(10)).is_none());
		assert_eq!(registry.len(), 1);
	}

	#[test]
	fn pending_open_is_claimed_by_window() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		registry.record_pending_open(ContextId(10), id.clone(), "Sign in".to_string());

		assert!(registry.claim_pending_open(WindowId(2), 30_000).is_none());
		let (origin, pending) = registry.claim_pending_open(WindowId(1), 30_000).unwrap();
		assert_eq!(origin, ContextId(10));
		assert_eq!(pending.session_id, id);
		assert!(registry.claim_pending_open(WindowId(1), 30_000).is_none());
	}

	#[test]
	fn stale_or_finished_pending_opens_are_dropped() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		registry.record_pending_open(ContextId(10), id.clone(), "Sign in".to_string());
		registry.pending_opens.get_mut(&ContextId(10)).unwrap().requested_at -= 60_000;
		assert!(registry.claim_pending_open(WindowId(1), 30_000).is_none());
		assert!(registry.pending_open(ContextId(10)).is_none());

		registry.record_pending_open(ContextId(10), id.clone(), "Sign in".to_string());
		registry.finish(&id, SessionState::Cancelled, None);
		assert!(registry.claim_pending_open(WindowId(1), 30_000).is_none());
	}

	#[test]
	fn detach_removes_mapping() {
		let mut registry = ContextRegistry::new();
		let id = session(&mut registry, 10);
		registry.attach_child(&id, Context::new(11, 1, "x"));

		let removed = registry.detach_child(&id, ContextId(11)).unwrap();
		assert_eq!(removed.id, ContextId(11));
		assert!(registry.owner_of(ContextId(11)).is_none());
		assert!(registry.detach_child(&id, ContextId(11)).is_none());
	}
}
