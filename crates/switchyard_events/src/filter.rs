//! Action filters wrapped around every handler invocation.

use crate::context::RequestContext;
use crate::error::DispatchError;
use async_trait::async_trait;

/// Hooks that run before and after every dispatched handler.
///
/// Filters run in ascending [`order`](ActionFilter::order) before the
/// handler and in reverse order after it. Returning an error from
/// [`on_executing`](ActionFilter::on_executing) skips the handler, and that
/// error becomes the outcome of the invocation.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use switchyard_events::{ActionFilter, DispatchError, RequestContext};
///
/// struct RequireClient;
///
/// #[async_trait]
/// impl ActionFilter for RequireClient {
///     async fn on_executing(&self, context: &RequestContext) -> Result<(), DispatchError> {
///         match context.client_id() {
///             Some(_) => Ok(()),
///             None => Err(DispatchError::Rejected("anonymous request".into())),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ActionFilter: Send + Sync {
    fn order(&self) -> i32 {
        0
    }

    async fn on_executing(&self, _context: &RequestContext) -> Result<(), DispatchError> {
        Ok(())
    }

    async fn on_executed(&self, _context: &RequestContext, _outcome: &Result<(), DispatchError>) {}
}
