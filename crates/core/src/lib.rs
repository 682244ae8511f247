//! Tabwright: tracks the browser tabs a job-application workflow spawns.
//!
//! A session is anchored to an origin context. Contexts opened from that
//! origin are attributed to the session as children, classified against known
//! identity providers and application-tracking systems, and watched until the
//! session completes, fails, times out or is cancelled.
//!
//! # Architecture
//!
//! - [`Orchestrator`]: session lifecycle, queries, and the listening task
//! - [`registry`]: ownership maps, the single source of truth for who owns a tab
//! - [`router`](Orchestrator::handle_notification): applies host notifications
//! - [`waiter`]: cancellable, deadline-bounded waits on host state
//! - [`watchdog`]: per-session timeout checks on a fixed tick
//! - [`channel`]: command handlers for content scripts and an in-process transport
//! - [`classifier`]: static provider and ATS pattern tables
//!
//! The browser itself sits behind the [`Host`] trait; [`MemoryHost`] is an
//! in-memory implementation for tests and scripted replays.

pub mod channel;
pub mod classifier;
pub mod config;
pub mod error;
pub mod events;
pub mod host;
pub mod orchestrator;
pub mod registry;
mod router;
pub mod waiter;
pub mod watchdog;

pub use channel::{ChannelClient, ChannelServer};
pub use classifier::{Classification, Completion, Provider, classify_ats, classify_completion, classify_context, classify_provider, provider_by_name};
pub use config::OrchestratorConfig;
pub use error::{Error, Result};
pub use events::{EventBus, FlowEvent, Subscription};
pub use host::{Host, MemoryHost};
pub use orchestrator::{ORIGIN_CLOSED, Orchestrator, SESSION_TIMED_OUT, StartOptions};
pub use tabwright_protocol::{
	ChangeInfo, ChannelRequest, ChannelResponse, Context, ContextId, HostNotification, LoadStatus, MessageSender, Purpose, Session, SessionId, SessionState,
	WindowId,
};
pub use waiter::{ProviderOutcome, Waiter, Waiters};
