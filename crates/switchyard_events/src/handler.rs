//! Handler functions and their arguments.
//!
//! A handler is any async function whose first parameter is the channel
//! instance, followed by up to three extractor arguments:
//!
//! * [`Body<T>`] decodes the envelope body into `T` (the payload argument)
//! * [`RequestContext`] gives access to the raw request, cancellation and
//!   replies
//!
//! At most one payload argument may be declared per handler. The count is
//! checked when the handler is registered, not when it is first called.

use crate::context::RequestContext;
use crate::envelope::Envelope;
use crate::error::DispatchError;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed future returned by type-erased handler invocations.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), DispatchError>> + Send>>;

/// Everything an argument extractor can draw from.
pub struct Invocation {
    pub(crate) envelope: Arc<Envelope>,
    pub(crate) context: RequestContext,
}

impl Invocation {
    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    pub fn context(&self) -> &RequestContext {
        &self.context
    }
}

/// Types that can appear as handler arguments.
pub trait FromInvocation: Sized + Send + 'static {
    /// Whether this argument is decoded from the message payload.
    const PAYLOAD: bool;

    fn from_invocation(invocation: &Invocation) -> Result<Self, DispatchError>;
}

impl FromInvocation for RequestContext {
    const PAYLOAD: bool = false;

    fn from_invocation(invocation: &Invocation) -> Result<Self, DispatchError> {
        Ok(invocation.context.clone())
    }
}

/// Payload argument: the envelope body decoded into `T`.
///
/// A missing body decodes as JSON `null`, so `Body<Option<T>>` is the way
/// to accept messages that may arrive without one.
#[derive(Debug, Clone, PartialEq)]
pub struct Body<T>(pub T);

impl<T> FromInvocation for Body<T>
where
    T: DeserializeOwned + Send + 'static,
{
    const PAYLOAD: bool = true;

    fn from_invocation(invocation: &Invocation) -> Result<Self, DispatchError> {
        invocation
            .envelope
            .decode_or_null::<T>()
            .map(Body)
            .map_err(|source| DispatchError::Decode {
                event: invocation.envelope.event.clone(),
                source,
            })
    }
}

/// An async function callable with a channel instance and extracted arguments.
///
/// Implemented for `Fn(C, A1, .., An) -> impl Future<Output = anyhow::Result<()>>`
/// with `n` up to three, where every `Ai` is a [`FromInvocation`].
pub trait ActionHandler<C, Args>: Clone + Send + Sync + 'static {
    /// Number of payload arguments the handler declares.
    fn payload_arity() -> usize;

    fn call(&self, channel: C, invocation: Invocation) -> HandlerFuture;
}

macro_rules! impl_action_handler {
    ( $($arg:ident),* ) => {
        #[allow(non_snake_case, unused_variables)]
        impl<F, Fut, C, $($arg,)*> ActionHandler<C, ($($arg,)*)> for F
        where
            F: Fn(C, $($arg,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
            C: Send + 'static,
            $( $arg: FromInvocation, )*
        {
            fn payload_arity() -> usize {
                0 $( + usize::from(<$arg as FromInvocation>::PAYLOAD) )*
            }

            fn call(&self, channel: C, invocation: Invocation) -> HandlerFuture {
                let handler = self.clone();
                Box::pin(async move {
                    $( let $arg = <$arg as FromInvocation>::from_invocation(&invocation)?; )*
                    handler(channel, $($arg,)*).await.map_err(DispatchError::Handler)
                })
            }
        }
    };
}

impl_action_handler!();
impl_action_handler!(A1);
impl_action_handler!(A1, A2);
impl_action_handler!(A1, A2, A3);
