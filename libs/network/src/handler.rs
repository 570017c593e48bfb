//! Message dispatch seam between the transports and the payload pipeline

use async_trait::async_trait;
use futures::FutureExt;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Consumer of complete text messages
///
/// Implementations must tolerate concurrent calls: the listener dispatches
/// each accepted connection on its own task.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, payload: String, source: SocketAddr) -> anyhow::Result<()>;
}

/// Adapter for synchronous closures
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> MessageHandler for FnHandler<F>
where
    F: Fn(String, SocketAddr) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, payload: String, source: SocketAddr) -> anyhow::Result<()> {
        (self.0)(payload, source)
    }
}

/// Wrap a closure as a shared handler
pub fn handler_fn<F>(f: F) -> Arc<dyn MessageHandler>
where
    F: Fn(String, SocketAddr) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Invoke a handler, turning a panic into an error
pub async fn dispatch(
    handler: &dyn MessageHandler,
    payload: String,
    source: SocketAddr,
) -> anyhow::Result<()> {
    match AssertUnwindSafe(handler.handle(payload, source))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => Err(anyhow::anyhow!("message handler panicked")),
    }
}
