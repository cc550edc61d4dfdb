//! # Event Dispatcher
//!
//! Routes inbound envelopes to handlers by exact event name.
//!
//! Channels list their actions explicitly through [`Channel::routes`], and a
//! [`DispatcherBuilder`] collects them once at startup. Every contract
//! violation (too many payload arguments, empty event names, channels with
//! no actions, and duplicates under [`DuplicatePolicy::Reject`]) surfaces as
//! a [`RegistrationError`] from [`DispatcherBuilder::register`].
//!
//! Dispatch never blocks the caller: a matched envelope is handed to its
//! own tokio task and the receive loop moves on to the next frame.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use serde::Deserialize;
//! use switchyard_events::*;
//!
//! #[derive(Clone)]
//! struct Chat;
//!
//! #[derive(Deserialize)]
//! struct Join { room: String }
//!
//! impl Chat {
//!     async fn join(self, Body(join): Body<Join>, ctx: RequestContext) -> anyhow::Result<()> {
//!         ctx.reply("joined", &join.room).await?;
//!         Ok(())
//!     }
//! }
//!
//! impl Channel for Chat {
//!     fn routes(routes: &mut ChannelRoutes<Self>) {
//!         routes.on("join", Self::join);
//!     }
//! }
//!
//! # fn main() -> Result<(), RegistrationError> {
//! let mut services = ServiceRegistry::new();
//! services.singleton(Chat);
//!
//! let mut builder = Dispatcher::builder(Arc::new(services));
//! builder.register::<Chat>()?;
//! let dispatcher = builder.build();
//! assert!(dispatcher.handles("join"));
//! # Ok(())
//! # }
//! ```

use crate::context::{DispatchOrigin, RequestContext};
use crate::envelope::Envelope;
use crate::error::{DispatchError, RegistrationError};
use crate::filter::ActionFilter;
use crate::handler::{ActionHandler, HandlerFuture, Invocation};
use crate::resolver::InstanceResolver;
use std::any::type_name;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

type Invoker = Arc<dyn Fn(&dyn InstanceResolver, Invocation) -> HandlerFuture + Send + Sync>;

/// One registered `(event, channel, handler)` triple.
struct Route {
    event: String,
    channel: &'static str,
    invoke: Invoker,
}

/// A group of related actions resolved as one type.
///
/// The channel instance for every invocation comes from the dispatcher's
/// [`InstanceResolver`], so the channel type must be registered there too.
pub trait Channel: Send + Sized + 'static {
    /// Lists the actions this channel handles.
    fn routes(routes: &mut ChannelRoutes<Self>);
}

/// Collects the actions of one channel during registration.
pub struct ChannelRoutes<C> {
    entries: Vec<Route>,
    errors: Vec<RegistrationError>,
    _channel: PhantomData<fn() -> C>,
}

impl<C: Channel> ChannelRoutes<C> {
    fn new() -> Self {
        Self {
            entries: Vec::new(),
            errors: Vec::new(),
            _channel: PhantomData,
        }
    }

    /// Registers `handler` for `event`.
    ///
    /// Contract violations are recorded and reported by
    /// [`DispatcherBuilder::register`], so calls can be chained freely.
    pub fn on<H, Args>(&mut self, event: &str, handler: H) -> &mut Self
    where
        H: ActionHandler<C, Args>,
        Args: 'static,
    {
        let channel = type_name::<C>();

        if event.trim().is_empty() {
            self.errors.push(RegistrationError::EmptyEvent { channel });
            return self;
        }

        let found = H::payload_arity();
        if found > 1 {
            self.errors.push(RegistrationError::HandlerArity {
                channel,
                event: event.to_string(),
                found,
            });
            return self;
        }

        let invoke: Invoker = Arc::new(move |resolver: &dyn InstanceResolver, invocation| {
            match resolver.resolve::<C>() {
                Some(instance) => <H as ActionHandler<C, Args>>::call(&handler, instance, invocation),
                None => Box::pin(std::future::ready(Err(DispatchError::Unresolved(
                    type_name::<C>(),
                )))),
            }
        });

        self.entries.push(Route {
            event: event.to_string(),
            channel,
            invoke,
        });
        self
    }
}

/// How a dispatcher treats two registrations for the same event name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicatePolicy {
    /// The later registration replaces the earlier one, with a warning
    #[default]
    LastWins,
    /// Registration fails with [`RegistrationError::DuplicateEvent`]
    Reject,
}

/// Receipt for a registered channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelToken {
    channel: &'static str,
    events: Vec<String>,
}

impl ChannelToken {
    pub fn channel(&self) -> &'static str {
        self.channel
    }

    /// Events this channel registered, in declaration order.
    pub fn events(&self) -> &[String] {
        &self.events
    }
}

/// Builds a [`Dispatcher`] from channel registrations.
pub struct DispatcherBuilder {
    resolver: Arc<dyn InstanceResolver>,
    routes: HashMap<String, Arc<Route>>,
    filters: Vec<Arc<dyn ActionFilter>>,
    policy: DuplicatePolicy,
}

impl DispatcherBuilder {
    pub fn new(resolver: Arc<dyn InstanceResolver>) -> Self {
        Self {
            resolver,
            routes: HashMap::new(),
            filters: Vec::new(),
            policy: DuplicatePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn add_filter<F: ActionFilter + 'static>(&mut self, filter: F) -> &mut Self {
        self.filters.push(Arc::new(filter));
        self
    }

    /// Registers every action declared by `C`.
    ///
    /// # Errors
    ///
    /// The first contract violation found in the channel's declarations,
    /// [`RegistrationError::NoActions`] for an empty channel, or
    /// [`RegistrationError::DuplicateEvent`] under
    /// [`DuplicatePolicy::Reject`]. A failed registration leaves the
    /// builder unchanged.
    pub fn register<C: Channel>(&mut self) -> Result<ChannelToken, RegistrationError> {
        let channel = type_name::<C>();
        let mut routes = ChannelRoutes::<C>::new();
        C::routes(&mut routes);

        if let Some(error) = routes.errors.into_iter().next() {
            return Err(error);
        }
        if routes.entries.is_empty() {
            return Err(RegistrationError::NoActions { channel });
        }

        if self.policy == DuplicatePolicy::Reject {
            let mut seen = HashSet::new();
            for route in &routes.entries {
                let existing = self
                    .routes
                    .get(&route.event)
                    .map(|r| r.channel)
                    .or_else(|| (!seen.insert(route.event.as_str())).then_some(channel));
                if let Some(existing) = existing {
                    return Err(RegistrationError::DuplicateEvent {
                        event: route.event.clone(),
                        existing,
                        channel,
                    });
                }
            }
        }

        let mut events = Vec::with_capacity(routes.entries.len());
        for route in routes.entries {
            events.push(route.event.clone());
            if let Some(previous) = self.routes.insert(route.event.clone(), Arc::new(route)) {
                warn!(
                    event = %previous.event,
                    shadowed = previous.channel,
                    by = channel,
                    "⚠️ Duplicate event registration, last registration wins"
                );
            }
        }

        info!(channel, actions = events.len(), "📋 Registered channel");
        Ok(ChannelToken { channel, events })
    }

    pub fn build(mut self) -> Dispatcher {
        self.filters.sort_by_key(|filter| filter.order());
        Dispatcher {
            routes: self.routes,
            filters: self.filters.into(),
            resolver: self.resolver,
        }
    }
}

/// Result of handing an envelope to the dispatcher.
#[derive(Debug)]
pub enum DispatchOutcome {
    /// A handler matched and now runs on its own task
    Spawned(JoinHandle<Result<(), DispatchError>>),
    /// No handler is registered for the event
    Unmatched,
    /// The text was not a dispatchable envelope
    Malformed,
}

impl DispatchOutcome {
    pub fn is_spawned(&self) -> bool {
        matches!(self, Self::Spawned(_))
    }

    /// Waits for a spawned handler to finish.
    ///
    /// Returns `None` when nothing was spawned.
    pub async fn wait(self) -> Option<Result<(), DispatchError>> {
        match self {
            Self::Spawned(handle) => Some(match handle.await {
                Ok(result) => result,
                Err(join_error) => Err(DispatchError::Handler(anyhow::anyhow!(
                    "handler task aborted: {join_error}"
                ))),
            }),
            Self::Unmatched | Self::Malformed => None,
        }
    }
}

/// Immutable routing table shared by every connection of a server or worker.
pub struct Dispatcher {
    routes: HashMap<String, Arc<Route>>,
    filters: Arc<[Arc<dyn ActionFilter>]>,
    resolver: Arc<dyn InstanceResolver>,
}

impl Dispatcher {
    pub fn builder(resolver: Arc<dyn InstanceResolver>) -> DispatcherBuilder {
        DispatcherBuilder::new(resolver)
    }

    pub fn handles(&self, event: &str) -> bool {
        self.routes.contains_key(event)
    }

    /// Registered event names, sorted.
    pub fn events(&self) -> Vec<&str> {
        let mut events: Vec<_> = self.routes.keys().map(String::as_str).collect();
        events.sort_unstable();
        events
    }

    /// Parses `text` as an envelope and dispatches it.
    pub fn dispatch_text(&self, text: &str, origin: DispatchOrigin) -> DispatchOutcome {
        let envelope = match Envelope::from_json(text) {
            Ok(envelope) => envelope,
            Err(error) => {
                warn!(%error, "Dropping message that is not a valid envelope");
                return DispatchOutcome::Malformed;
            }
        };
        if !envelope.is_dispatchable() {
            debug!("Dropping envelope without an event name");
            return DispatchOutcome::Malformed;
        }
        self.spawn_route(Arc::from(text), envelope, origin)
    }

    /// Dispatches an already parsed envelope.
    pub fn dispatch(&self, envelope: Envelope, origin: DispatchOrigin) -> DispatchOutcome {
        if !envelope.is_dispatchable() {
            debug!("Dropping envelope without an event name");
            return DispatchOutcome::Malformed;
        }
        let raw: Arc<str> = match envelope.to_json() {
            Ok(text) => Arc::from(text),
            Err(_) => Arc::from(""),
        };
        self.spawn_route(raw, envelope, origin)
    }

    fn spawn_route(&self, raw: Arc<str>, envelope: Envelope, origin: DispatchOrigin) -> DispatchOutcome {
        let Some(route) = self.routes.get(&envelope.event).cloned() else {
            debug!(event = %envelope.event, "No handler registered, dropping message");
            return DispatchOutcome::Unmatched;
        };

        let envelope = Arc::new(envelope);
        let context = RequestContext::new(raw, envelope.clone(), origin, self.resolver.clone());
        let resolver = self.resolver.clone();
        let filters = self.filters.clone();

        debug!(event = %route.event, channel = route.channel, "📨 Dispatching");
        DispatchOutcome::Spawned(tokio::spawn(async move {
            let result = invoke_route(&route, resolver.as_ref(), &filters, envelope, context).await;
            if let Err(error) = &result {
                warn!(event = %route.event, channel = route.channel, %error, "❌ Handler failed");
            }
            result
        }))
    }
}

async fn invoke_route(
    route: &Route,
    resolver: &dyn InstanceResolver,
    filters: &[Arc<dyn ActionFilter>],
    envelope: Arc<Envelope>,
    context: RequestContext,
) -> Result<(), DispatchError> {
    let outcome = async {
        for filter in filters {
            filter.on_executing(&context).await?;
        }
        let invocation = Invocation {
            envelope,
            context: context.clone(),
        };
        (route.invoke)(resolver, invocation).await
    }
    .await;

    for filter in filters.iter().rev() {
        filter.on_executed(&context, &outcome).await;
    }
    outcome
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("events", &self.events())
            .field("filters", &self.filters.len())
            .finish()
    }
}
