//! Cancellable, deadline-bounded waits on host state.
//!
//! Every wait runs as its own task and is returned as a [`Waiter`] handle that
//! carries both the pending result and a way to cancel it. Notification
//! receivers are created when the wait is requested, before the task runs, and
//! are dropped as soon as the wait settles, so nothing keeps listening after
//! the caller has moved on.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use tabwright_protocol::{Context, ContextId, HostNotification};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::classifier::{Completion, Provider, classify_completion};
use crate::error::{Error, Result};
use crate::host::Host;

/// Handle to a running wait. Dropping it cancels the wait.
#[must_use = "dropping a Waiter cancels it"]
pub struct Waiter<T> {
	task: Option<JoinHandle<Result<T>>>,
}

impl<T: Send + 'static> Waiter<T> {
	pub(crate) fn spawn<F>(future: F) -> Self
	where
		F: Future<Output = Result<T>> + Send + 'static,
	{
		Self {
			task: Some(tokio::spawn(future)),
		}
	}

	/// Aborts the wait; awaiting the handle afterwards yields [`Error::Cancelled`].
	pub fn cancel(&self) {
		if let Some(task) = &self.task {
			task.abort();
		}
	}

	pub fn is_finished(&self) -> bool {
		self.task.as_ref().is_none_or(JoinHandle::is_finished)
	}

	pub async fn wait(mut self) -> Result<T> {
		let Some(task) = self.task.as_mut() else {
			return Err(Error::Cancelled);
		};
		let joined = task.await;
		self.task = None;
		match joined {
			Ok(result) => result,
			Err(err) if err.is_cancelled() => Err(Error::Cancelled),
			Err(err) => Err(Error::Host(format!("wait task failed: {err}"))),
		}
	}
}

impl<T> Drop for Waiter<T> {
	fn drop(&mut self) {
		if let Some(task) = self.task.take() {
			task.abort();
		}
	}
}

impl<T: Send + 'static> IntoFuture for Waiter<T> {
	type Output = Result<T>;
	type IntoFuture = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

	fn into_future(self) -> Self::IntoFuture {
		Box::pin(self.wait())
	}
}

impl<T> std::fmt::Debug for Waiter<T> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Waiter").field("pending", &self.task.is_some()).finish()
	}
}

/// How a provider flow ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ProviderOutcome {
	/// A success pattern matched.
	Authorized { url: String },
	/// A failure pattern matched.
	Denied { url: String },
	/// The context closed before any pattern matched. Counted as success.
	ClosedUnclassified,
}

impl ProviderOutcome {
	pub fn is_success(&self) -> bool {
		!matches!(self, ProviderOutcome::Denied { .. })
	}
}

/// Factory for waits against one host.
#[derive(Clone)]
pub struct Waiters {
	host: Arc<dyn Host>,
	poll_interval: Duration,
}

impl Waiters {
	pub fn new(host: Arc<dyn Host>, poll_interval: Duration) -> Self {
		Self { host, poll_interval }
	}

	/// Resolves with the first context created with `opener_context_id == origin`.
	pub fn wait_for_new_context(&self, origin: ContextId, timeout: Duration) -> Waiter<Context> {
		let mut rx = self.host.notifications();
		Waiter::spawn(async move {
			let deadline = tokio::time::sleep(timeout);
			tokio::pin!(deadline);
			loop {
				tokio::select! {
					_ = &mut deadline => {
						return Err(timeout_error(timeout, format!("a context opened from {origin}")));
					}
					received = rx.recv() => {
						match next_notification(received)? {
							Some(HostNotification::Created { context }) if context.opener_context_id == Some(origin) => {
								debug!(target = "tabwright.waiter", %origin, context = %context.id, "new context observed");
								return Ok(context);
							}
							_ => {}
						}
					}
				}
			}
		})
	}

	/// Polls the committed URL of `context` until it matches `pattern`.
	///
	/// Rejects with [`Error::ContextClosed`] if the context disappears and with
	/// [`Error::Timeout`] at the deadline.
	pub fn wait_for_navigation(&self, context: ContextId, pattern: Regex, timeout: Duration) -> Waiter<Context> {
		let host = Arc::clone(&self.host);
		let poll = self.poll_interval;
		Waiter::spawn(async move {
			let deadline = Instant::now() + timeout;
			loop {
				match host.get_context(context).await? {
					None => return Err(Error::ContextClosed(context)),
					Some(current) if pattern.is_match(&current.url) => return Ok(current),
					Some(_) => {}
				}

				let now = Instant::now();
				if now >= deadline {
					return Err(timeout_error(timeout, format!("context {context} to reach /{pattern}/")));
				}
				tokio::time::sleep(poll.min(deadline - now)).await;
			}
		})
	}

	/// Resolves when `context` is removed, immediately if it is already gone.
	pub fn wait_for_context_close(&self, context: ContextId, timeout: Duration) -> Waiter<()> {
		let host = Arc::clone(&self.host);
		let mut rx = self.host.notifications();
		Waiter::spawn(async move {
			if host.get_context(context).await?.is_none() {
				return Ok(());
			}

			let deadline = tokio::time::sleep(timeout);
			tokio::pin!(deadline);
			loop {
				tokio::select! {
					_ = &mut deadline => {
						return Err(timeout_error(timeout, format!("context {context} to close")));
					}
					received = rx.recv() => {
						if let Some(HostNotification::Removed { context_id }) = next_notification(received)? {
							if context_id == context {
								return Ok(());
							}
						}
					}
				}
			}
		})
	}

	/// Polls `context` against the provider's completion patterns while listening for its removal.
	///
	/// Without a provider the generic redirect heuristics apply. A removal
	/// before any pattern matched resolves as [`ProviderOutcome::ClosedUnclassified`].
	pub fn wait_for_provider_completion(&self, context: ContextId, provider: Option<&'static Provider>, timeout: Duration) -> Waiter<ProviderOutcome> {
		let host = Arc::clone(&self.host);
		let poll = self.poll_interval;
		let mut rx = self.host.notifications();
		Waiter::spawn(async move {
			let deadline = tokio::time::sleep(timeout);
			tokio::pin!(deadline);
			let mut ticker = tokio::time::interval(poll);
			ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

			loop {
				tokio::select! {
					_ = &mut deadline => {
						let name = provider.map_or("provider", |p| p.name);
						return Err(timeout_error(timeout, format!("{name} flow in context {context} to finish")));
					}
					_ = ticker.tick() => {
						let Some(current) = host.get_context(context).await? else {
							return Ok(closed_unclassified(context));
						};
						let url = current.effective_url();
						match classify_completion(url, provider) {
							Completion::Success => return Ok(ProviderOutcome::Authorized { url: url.to_string() }),
							Completion::Failure => return Ok(ProviderOutcome::Denied { url: url.to_string() }),
							Completion::Pending => {}
						}
					}
					received = rx.recv() => {
						if let Some(HostNotification::Removed { context_id }) = next_notification(received)? {
							if context_id == context {
								return Ok(closed_unclassified(context));
							}
						}
					}
				}
			}
		})
	}
}

impl std::fmt::Debug for Waiters {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Waiters").field("poll_interval", &self.poll_interval).finish()
	}
}

fn closed_unclassified(context: ContextId) -> ProviderOutcome {
	warn!(
		target = "tabwright.waiter",
		%context,
		"context closed before any completion pattern matched; treating as success"
	);
	ProviderOutcome::ClosedUnclassified
}

fn timeout_error(timeout: Duration, condition: String) -> Error {
	Error::Timeout {
		ms: timeout.as_millis() as u64,
		condition,
	}
}

/// Lagged receivers skip ahead; a closed stream ends the wait.
fn next_notification(received: std::result::Result<HostNotification, RecvError>) -> Result<Option<HostNotification>> {
	match received {
		Ok(notification) => Ok(Some(notification)),
		Err(RecvError::Lagged(skipped)) => {
			warn!(target = "tabwright.waiter", skipped, "waiter lagged behind host notifications");
			Ok(None)
		}
		Err(RecvError::Closed) => Err(Error::Host("host notification stream closed".to_string())),
	}
}
