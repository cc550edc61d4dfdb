//! Built-in channels served by the binary.
//!
//! The server side answers `ping` with `pong`, echoes `echo` back and tells
//! a client its identity on `whoami`. The client side logs what the server
//! answers.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use switchyard_events::{
    ActionFilter, Body, Channel, ChannelRoutes, DispatchError, Dispatcher, RegistrationError, RequestContext,
    ServiceRegistry,
};
use tracing::{debug, info};

/// Server-side diagnostics channel.
#[derive(Debug, Clone, Default)]
pub struct SystemChannel;

impl SystemChannel {
    async fn ping(self, Body(body): Body<Option<Value>>, ctx: RequestContext) -> anyhow::Result<()> {
        ctx.reply("pong", &body).await?;
        Ok(())
    }

    async fn echo(self, ctx: RequestContext) -> anyhow::Result<()> {
        ctx.send(ctx.envelope()).await?;
        Ok(())
    }

    async fn whoami(self, ctx: RequestContext) -> anyhow::Result<()> {
        ctx.reply("whoami", &ctx.client_id()).await?;
        Ok(())
    }
}

impl Channel for SystemChannel {
    fn routes(routes: &mut ChannelRoutes<Self>) {
        routes
            .on("ping", Self::ping)
            .on("echo", Self::echo)
            .on("whoami", Self::whoami);
    }
}

/// Client-side channel logging the server's answers.
#[derive(Debug, Clone, Default)]
pub struct MonitorChannel;

impl MonitorChannel {
    async fn pong(self, Body(body): Body<Option<Value>>) -> anyhow::Result<()> {
        info!(body = ?body, "📨 pong");
        Ok(())
    }

    async fn echo(self, ctx: RequestContext) -> anyhow::Result<()> {
        info!(raw = ctx.raw_request(), "📨 echo");
        Ok(())
    }

    async fn whoami(self, Body(id): Body<Option<Value>>) -> anyhow::Result<()> {
        info!(client = ?id, "📨 whoami");
        Ok(())
    }
}

impl Channel for MonitorChannel {
    fn routes(routes: &mut ChannelRoutes<Self>) {
        routes
            .on("pong", Self::pong)
            .on("echo", Self::echo)
            .on("whoami", Self::whoami);
    }
}

/// Traces every invocation of the built-in channels at debug level.
pub struct AuditFilter;

#[async_trait]
impl ActionFilter for AuditFilter {
    async fn on_executing(&self, context: &RequestContext) -> Result<(), DispatchError> {
        debug!(event = context.event(), client = ?context.client_id(), "Handler starting");
        Ok(())
    }

    async fn on_executed(&self, context: &RequestContext, outcome: &Result<(), DispatchError>) {
        debug!(event = context.event(), ok = outcome.is_ok(), "Handler finished");
    }
}

/// Dispatcher for server mode.
pub fn server_dispatcher() -> Result<Arc<Dispatcher>, RegistrationError> {
    let mut services = ServiceRegistry::new();
    services.singleton(SystemChannel);

    let mut builder = Dispatcher::builder(Arc::new(services));
    builder.add_filter(AuditFilter);
    builder.register::<SystemChannel>()?;
    Ok(Arc::new(builder.build()))
}

/// Dispatcher for client mode.
pub fn client_dispatcher() -> Result<Arc<Dispatcher>, RegistrationError> {
    let mut services = ServiceRegistry::new();
    services.singleton(MonitorChannel);

    let mut builder = Dispatcher::builder(Arc::new(services));
    builder.add_filter(AuditFilter);
    builder.register::<MonitorChannel>()?;
    Ok(Arc::new(builder.build()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use switchyard_events::{ClientId, DispatchOrigin, Envelope, Replier};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    struct Capture(mpsc::UnboundedSender<Envelope>);

    #[async_trait]
    impl Replier for Capture {
        async fn reply(&self, envelope: &Envelope) -> Result<(), DispatchError> {
            self.0
                .send(envelope.clone())
                .map_err(|e| DispatchError::Reply(e.to_string()))
        }

        fn is_open(&self) -> bool {
            !self.0.is_closed()
        }
    }

    fn origin() -> (DispatchOrigin, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let origin = DispatchOrigin::new(Arc::new(Capture(tx)), CancellationToken::new());
        (origin, rx)
    }

    #[tokio::test]
    async fn ping_answers_with_pong_and_same_body() {
        let dispatcher = server_dispatcher().unwrap();
        let (origin, mut replies) = origin();

        let outcome = dispatcher.dispatch_text(r#"{"event":"ping","body":{"n":1}}"#, origin);
        assert!(matches!(outcome.wait().await, Some(Ok(()))));

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.event, "pong");
        assert_eq!(reply.body(), Some(&json!({"n": 1})));
    }

    #[tokio::test]
    async fn echo_returns_the_envelope_unchanged() {
        let dispatcher = server_dispatcher().unwrap();
        let (origin, mut replies) = origin();

        let sent = r#"{"event":"echo","body":[1,2],"headers":{"trace":"t-1"}}"#;
        dispatcher.dispatch_text(sent, origin).wait().await;

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply, Envelope::from_json(sent).unwrap());
    }

    #[tokio::test]
    async fn whoami_reports_the_client_identity() {
        let dispatcher = server_dispatcher().unwrap();
        let (origin, mut replies) = origin();
        let client = ClientId::new();

        dispatcher
            .dispatch_text(r#"{"event":"whoami"}"#, origin.with_client(client))
            .wait()
            .await;

        let reply = replies.recv().await.unwrap();
        assert_eq!(reply.decode::<ClientId>().unwrap(), Some(client));
    }

    #[test]
    fn client_dispatcher_handles_server_answers() {
        let dispatcher = client_dispatcher().unwrap();
        assert_eq!(dispatcher.events(), vec!["echo", "pong", "whoami"]);
    }
}
