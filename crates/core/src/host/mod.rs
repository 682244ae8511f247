//! Boundary to the browser host that owns the real tabs.

use async_trait::async_trait;
use tabwright_protocol::{Context, ContextId, HostNotification, WindowId};
use tokio::sync::broadcast;

use crate::error::Result;

pub mod memory;

pub use memory::MemoryHost;

/// Commands the orchestrator invokes on the host, plus its notification stream.
#[async_trait]
pub trait Host: Send + Sync {
	/// Current descriptor of a context, or `None` if the host no longer has it.
	async fn get_context(&self, id: ContextId) -> Result<Option<Context>>;

	async fn set_active(&self, id: ContextId) -> Result<()>;

	async fn focus_window(&self, id: WindowId) -> Result<()>;

	/// Closes a context. Fails if it is already gone.
	async fn close_context(&self, id: ContextId) -> Result<()>;

	/// A new receiver of tab-lifecycle notifications. Dropping it deregisters the listener.
	fn notifications(&self) -> broadcast::Receiver<HostNotification>;
}
