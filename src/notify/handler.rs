//! Update handlers and the boundary they are invoked through.

use crate::core::UpdateEvent;
use crate::error::{ConfigError, HandlerError, Result};
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// Receiver of update events for a subscription.
///
/// Closures returning a future of `Result<(), HandlerError>` implement this trait,
/// so most callers never implement it by hand.
///
/// # Examples
///
/// ```rust
/// use sentinel_config::core::UpdateEvent;
/// use sentinel_config::error::HandlerError;
/// use sentinel_config::notify::UpdateHandler;
///
/// fn assert_handler<H: UpdateHandler>(_: H) {}
///
/// assert_handler(|event: UpdateEvent| async move {
///     println!("{} keys changed", event.items.len());
///     Ok::<(), HandlerError>(())
/// });
/// ```
#[async_trait]
pub trait UpdateHandler: Send + Sync + 'static {
    /// Handle one update event.
    ///
    /// Errors and panics are recorded by the poll loop and never stop it.
    async fn handle(&self, event: UpdateEvent) -> std::result::Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> UpdateHandler for F
where
    F: Fn(UpdateEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, event: UpdateEvent) -> std::result::Result<(), HandlerError> {
        (self)(event).await
    }
}

/// Invoke `handler`, converting returned errors and panics into [`ConfigError`].
pub(crate) async fn dispatch(handler: &dyn UpdateHandler, event: UpdateEvent) -> Result<()> {
    match AssertUnwindSafe(handler.handle(event)).catch_unwind().await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(ConfigError::Handler(e.to_string())),
        Err(panic) => Err(ConfigError::HandlerPanic(panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
