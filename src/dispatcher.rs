//! # Dispatcher
//!
//! Single funnel for inbound events: classify, rate limit commands, look up
//! the handler, run it, and contain whatever goes wrong. Handlers run in
//! their own task so a panic is caught here like any other failure.
//!
//! - **Version**: 1.0.0
//! - **Since**: 0.3.0

use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Instant;

use crate::infractions::InfractionStore;
use crate::platform::{GuildGateway, InboundEvent, Reply};
use crate::rate_limiter::RateLimiter;
use crate::registry::{HandlerKind, HandlerRegistry};

pub const COMMAND_FAILED_NOTICE: &str = "❌ There was an error while executing this command!";
pub const RATE_LIMITED_NOTICE: &str = "⏳ You're using commands too quickly! Please slow down.";

/// Everything a handler may use while it runs
#[derive(Clone)]
pub struct HandlerContext {
    pub store: InfractionStore,
    pub gateway: Arc<dyn GuildGateway>,
    pub registry: Arc<HandlerRegistry>,
}

/// Terminal state of one dispatched event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Completed,
    Failed,
    Unrouted,
    RateLimited,
}

pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    store: InfractionStore,
    rate_limiter: RateLimiter,
}

impl Dispatcher {
    pub fn new(registry: Arc<HandlerRegistry>, store: InfractionStore, rate_limiter: RateLimiter) -> Self {
        Dispatcher {
            registry,
            store,
            rate_limiter,
        }
    }

    /// Route one event to its handler. Never fails: every error ends up
    /// logged and reflected in the returned outcome.
    pub async fn dispatch(&self, event: InboundEvent, gateway: Arc<dyn GuildGateway>) -> DispatchOutcome {
        let kind = event.kind;
        debug!(
            "📥 Received {} '{}' from {} in channel {}",
            kind,
            event.key,
            event.actor_id.as_deref().unwrap_or("-"),
            event.channel_id.as_deref().unwrap_or("-")
        );

        if kind == HandlerKind::Command {
            if let Some(actor_id) = event.actor_id.as_deref() {
                if !self.rate_limiter.check(actor_id) {
                    warn!("Rate limit exceeded for user: {}", actor_id);
                    let notice = match self.rate_limiter.retry_after(actor_id) {
                        Some(wait) => format!("{} Try again in {}s.", RATE_LIMITED_NOTICE, wait.as_secs().max(1)),
                        None => RATE_LIMITED_NOTICE.to_string(),
                    };
                    send_notice(&event, notice).await;
                    return DispatchOutcome::RateLimited;
                }
            }
        }

        let handler = match self.registry.lookup(&event.key, kind) {
            Some(entry) if entry.claim() => entry.handler(),
            Some(_) => {
                debug!("Once-only {} '{}' already fired, ignoring", kind, event.key);
                return DispatchOutcome::Unrouted;
            }
            None => {
                self.unrouted(&event).await;
                return DispatchOutcome::Unrouted;
            }
        };

        let ctx = HandlerContext {
            store: self.store.clone(),
            gateway,
            registry: Arc::clone(&self.registry),
        };
        let task_event = event.clone();
        let started = Instant::now();

        let result = tokio::spawn(async move { handler.invoke(&ctx, &task_event).await }).await;
        let elapsed = started.elapsed();

        let detail = match result {
            Ok(Ok(())) => {
                info!("✅ {} '{}' completed in {:?}", kind, event.key, elapsed);
                return DispatchOutcome::Completed;
            }
            Ok(Err(e)) => format!("{:#}", e),
            Err(join_error) if join_error.is_panic() => "handler panicked".to_string(),
            Err(join_error) => format!("handler task failed: {}", join_error),
        };

        error!(
            "❌ Error handling {} '{}' after {:?}: {}",
            kind, event.key, elapsed, detail
        );

        // component state may already be finalized, so only commands get a notice
        if kind == HandlerKind::Command {
            send_notice(&event, COMMAND_FAILED_NOTICE.to_string()).await;
        }

        DispatchOutcome::Failed
    }

    async fn unrouted(&self, event: &InboundEvent) {
        warn!("⚠️ No {} handler matching '{}'", event.kind, event.key);

        if event.kind == HandlerKind::Command {
            let notice = format!("❌ No command matching `/{}` was found.", event.key);
            send_notice(event, notice).await;
        }
    }
}

/// Best-effort ephemeral notice; a failure here is logged and dropped
async fn send_notice(event: &InboundEvent, content: String) {
    if let Err(e) = event.reply(Reply::ephemeral(content)).await {
        error!("Failed to send notice for '{}': {:#}", event.key, e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InboundEvent;
    use crate::registry::Handler;
    use crate::testing::{FakeGateway, NamedHandler, RecordingResponder};
    use anyhow::{anyhow, Result};
    use serenity::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingHandler {
        key: &'static str,
        kind: HandlerKind,
        once: bool,
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Handler for CountingHandler {
        fn key(&self) -> &str {
            self.key
        }

        fn kind(&self) -> HandlerKind {
            self.kind
        }

        fn once_only(&self) -> bool {
            self.once
        }

        async fn invoke(&self, _ctx: &HandlerContext, event: &InboundEvent) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if event.kind != HandlerKind::Event {
                event.reply(Reply::public("done")).await?;
            }
            Ok(())
        }
    }

    struct FailingHandler {
        key: &'static str,
        kind: HandlerKind,
    }

    #[async_trait]
    impl Handler for FailingHandler {
        fn key(&self) -> &str {
            self.key
        }

        fn kind(&self) -> HandlerKind {
            self.kind
        }

        async fn invoke(&self, _ctx: &HandlerContext, _event: &InboundEvent) -> Result<()> {
            Err(anyhow!("database unavailable"))
        }
    }

    struct PanickingHandler;

    #[async_trait]
    impl Handler for PanickingHandler {
        fn key(&self) -> &str {
            "explode"
        }

        fn kind(&self) -> HandlerKind {
            HandlerKind::Command
        }

        async fn invoke(&self, _ctx: &HandlerContext, _event: &InboundEvent) -> Result<()> {
            panic!("boom");
        }
    }

    async fn dispatcher_with(handlers: Vec<Arc<dyn Handler>>, max_requests: usize) -> Dispatcher {
        let mut registry = HandlerRegistry::new();
        for handler in handlers {
            registry.register(handler).unwrap();
        }
        let store = InfractionStore::open_in_memory().await.unwrap();
        Dispatcher::new(
            Arc::new(registry),
            store,
            RateLimiter::new(max_requests, Duration::from_secs(60)),
        )
    }

    fn command(key: &str, responder: &Arc<RecordingResponder>) -> InboundEvent {
        InboundEvent::new(HandlerKind::Command, key)
            .with_actor("u1")
            .with_guild("g1")
            .with_responder(responder.clone())
    }

    fn gateway() -> Arc<dyn GuildGateway> {
        Arc::new(FakeGateway::default())
    }

    #[tokio::test]
    async fn test_routes_to_registered_handler() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            vec![Arc::new(CountingHandler {
                key: "ping",
                kind: HandlerKind::Command,
                once: false,
                calls: calls.clone(),
            })],
            10,
        )
        .await;
        let responder = Arc::new(RecordingResponder::default());

        let outcome = dispatcher.dispatch(command("ping", &responder), gateway()).await;

        assert_eq!(outcome, DispatchOutcome::Completed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(responder.contents(), vec!["done".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_command_gets_not_found_reply() {
        let dispatcher = dispatcher_with(vec![], 10).await;
        let responder = Arc::new(RecordingResponder::default());

        let outcome = dispatcher.dispatch(command("unknown", &responder), gateway()).await;

        assert_eq!(outcome, DispatchOutcome::Unrouted);
        let replies = responder.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].ephemeral);
        assert!(replies[0].content.contains("No command matching `/unknown`"));
    }

    #[tokio::test]
    async fn test_unknown_component_is_only_logged() {
        let dispatcher = dispatcher_with(vec![], 10).await;
        let responder = Arc::new(RecordingResponder::default());
        let event = InboundEvent::new(HandlerKind::Button, "stale_button:1")
            .with_actor("u1")
            .with_responder(responder.clone());

        assert_eq!(dispatcher.dispatch(event, gateway()).await, DispatchOutcome::Unrouted);
        assert!(responder.replies().is_empty());
    }

    #[tokio::test]
    async fn test_failing_command_sends_notice_and_next_event_still_runs() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            vec![
                Arc::new(FailingHandler {
                    key: "warn",
                    kind: HandlerKind::Command,
                }),
                Arc::new(CountingHandler {
                    key: "ping",
                    kind: HandlerKind::Command,
                    once: false,
                    calls: calls.clone(),
                }),
            ],
            10,
        )
        .await;

        let failing = Arc::new(RecordingResponder::default());
        assert_eq!(
            dispatcher.dispatch(command("warn", &failing), gateway()).await,
            DispatchOutcome::Failed
        );
        assert_eq!(failing.contents(), vec![COMMAND_FAILED_NOTICE.to_string()]);

        let next = Arc::new(RecordingResponder::default());
        assert_eq!(
            dispatcher.dispatch(command("ping", &next), gateway()).await,
            DispatchOutcome::Completed
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_contained() {
        let dispatcher = dispatcher_with(vec![Arc::new(PanickingHandler)], 10).await;
        let responder = Arc::new(RecordingResponder::default());

        let outcome = dispatcher.dispatch(command("explode", &responder), gateway()).await;

        assert_eq!(outcome, DispatchOutcome::Failed);
        assert_eq!(responder.contents(), vec![COMMAND_FAILED_NOTICE.to_string()]);
    }

    #[tokio::test]
    async fn test_failed_notice_failure_does_not_escape() {
        let dispatcher = dispatcher_with(
            vec![Arc::new(FailingHandler {
                key: "warn",
                kind: HandlerKind::Command,
            })],
            10,
        )
        .await;
        let responder = Arc::new(RecordingResponder::failing());

        let outcome = dispatcher.dispatch(command("warn", &responder), gateway()).await;
        assert_eq!(outcome, DispatchOutcome::Failed);
    }

    #[tokio::test]
    async fn test_failing_component_is_not_notified() {
        let dispatcher = dispatcher_with(
            vec![Arc::new(FailingHandler {
                key: "confirm",
                kind: HandlerKind::Button,
            })],
            10,
        )
        .await;
        let responder = Arc::new(RecordingResponder::default());
        let event = InboundEvent::new(HandlerKind::Button, "confirm")
            .with_actor("u1")
            .with_responder(responder.clone());

        assert_eq!(dispatcher.dispatch(event, gateway()).await, DispatchOutcome::Failed);
        assert!(responder.replies().is_empty());
    }

    #[tokio::test]
    async fn test_once_only_event_fires_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            vec![Arc::new(CountingHandler {
                key: "ready",
                kind: HandlerKind::Event,
                once: true,
                calls: calls.clone(),
            })],
            10,
        )
        .await;

        let first = dispatcher
            .dispatch(InboundEvent::new(HandlerKind::Event, "ready"), gateway())
            .await;
        let second = dispatcher
            .dispatch(InboundEvent::new(HandlerKind::Event, "ready"), gateway())
            .await;

        assert_eq!(first, DispatchOutcome::Completed);
        assert_eq!(second, DispatchOutcome::Unrouted);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_commands_are_rate_limited_per_user() {
        let calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            vec![Arc::new(CountingHandler {
                key: "ping",
                kind: HandlerKind::Command,
                once: false,
                calls: calls.clone(),
            })],
            2,
        )
        .await;
        let responder = Arc::new(RecordingResponder::default());

        for _ in 0..2 {
            assert_eq!(
                dispatcher.dispatch(command("ping", &responder), gateway()).await,
                DispatchOutcome::Completed
            );
        }
        assert_eq!(
            dispatcher.dispatch(command("ping", &responder), gateway()).await,
            DispatchOutcome::RateLimited
        );
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        let last = responder.replies().pop().unwrap();
        assert!(last.ephemeral);
        assert!(last.content.starts_with(RATE_LIMITED_NOTICE));
    }

    #[tokio::test]
    async fn test_last_registration_is_the_one_dispatched() {
        let first_calls = Arc::new(AtomicUsize::new(0));
        let second_calls = Arc::new(AtomicUsize::new(0));
        let dispatcher = dispatcher_with(
            vec![
                Arc::new(CountingHandler {
                    key: "warn",
                    kind: HandlerKind::Command,
                    once: false,
                    calls: first_calls.clone(),
                }),
                Arc::new(CountingHandler {
                    key: "warn",
                    kind: HandlerKind::Command,
                    once: false,
                    calls: second_calls.clone(),
                }),
                Arc::new(NamedHandler::new("noop", HandlerKind::Command)),
            ],
            10,
        )
        .await;
        let responder = Arc::new(RecordingResponder::default());

        dispatcher.dispatch(command("warn", &responder), gateway()).await;

        assert_eq!(first_calls.load(Ordering::SeqCst), 0);
        assert_eq!(second_calls.load(Ordering::SeqCst), 1);
    }
}
