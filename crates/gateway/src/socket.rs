use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use rostergate_core::errors::InterfaceError;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::blocks::{self, MessageTemplate};
use crate::events::{EventContext, EventDispatcher, GatewayEnvelope, HandlerResult};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport failed to connect: {0}")]
    Connect(String),
    #[error("transport read failed: {0}")]
    Receive(String),
    #[error("transport ack failed: {0}")]
    Acknowledge(String),
    #[error("transport response failed: {0}")]
    Respond(String),
    #[error("transport disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Stream of inbound envelopes plus the channel used to answer them.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError>;
    async fn respond(
        &self,
        envelope: &GatewayEnvelope,
        message: &MessageTemplate,
    ) -> Result<(), TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: Arc<EventDispatcher>,
    reconnect_policy: ReconnectPolicy,
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher: Arc::new(dispatcher), reconnect_policy }
    }

    pub async fn start(&self) -> Result<()> {
        for attempt in 0..=self.reconnect_policy.max_retries {
            match self.connect_and_pump(attempt).await {
                Ok(()) => return Ok(()),
                Err(transport_error) => {
                    warn!(
                        attempt,
                        max_retries = self.reconnect_policy.max_retries,
                        error = %transport_error,
                        "gateway transport failed"
                    );

                    if attempt >= self.reconnect_policy.max_retries {
                        warn!(
                            max_retries = self.reconnect_policy.max_retries,
                            "gateway retries exhausted; continuing process without crash"
                        );
                        return Ok(());
                    }

                    let delay = self.reconnect_policy.backoff(attempt);
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        Ok(())
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "opening gateway transport connection");
        self.transport.connect().await?;
        info!(attempt, "gateway transport connected");

        let mut in_flight = JoinSet::new();
        loop {
            while in_flight.try_join_next().is_some() {}

            let envelope = match self.transport.next_envelope().await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => break,
                Err(error) => {
                    drain(&mut in_flight).await;
                    return Err(error);
                }
            };
            let user_id = envelope.event.user_id().unwrap_or("unknown").to_owned();

            info!(
                event_name = "ingress.gateway.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                user_id = %user_id,
                "received gateway envelope"
            );

            if let Err(error) = self.transport.acknowledge(&envelope.envelope_id).await {
                warn!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    error = %error,
                    "failed to acknowledge gateway envelope"
                );
            } else {
                debug!(
                    event_name = "ingress.gateway.ack_sent",
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    "acknowledged gateway envelope"
                );
            }

            let transport = self.transport.clone();
            let dispatcher = self.dispatcher.clone();
            in_flight.spawn(async move {
                handle_envelope(transport.as_ref(), &dispatcher, envelope, &user_id).await;
            });
        }

        info!(attempt, "gateway transport stream closed");
        drain(&mut in_flight).await;
        self.transport.disconnect().await?;
        Ok(())
    }
}

async fn drain(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Err(join_error) = joined {
            error!(error = %join_error, "gateway dispatch task aborted");
        }
    }
}

async fn handle_envelope(
    transport: &dyn GatewayTransport,
    dispatcher: &EventDispatcher,
    envelope: GatewayEnvelope,
    user_id: &str,
) {
    let context = EventContext { correlation_id: envelope.envelope_id.clone() };
    let reply = match dispatcher.dispatch(&envelope, &context).await {
        Ok(HandlerResult::Responded(message)) => message,
        Ok(HandlerResult::Processed | HandlerResult::Ignored) => return,
        Err(error) => {
            error!(
                event_name = "ingress.gateway.dispatch_failed",
                envelope_id = %envelope.envelope_id,
                correlation_id = %context.correlation_id,
                user_id = %user_id,
                error = %error,
                "event dispatch failed; continuing gateway loop"
            );
            if envelope.event.interaction().is_none() {
                return;
            }
            blocks::interface_error_message(&InterfaceError::internal(
                error.to_string(),
                context.correlation_id.as_str(),
            ))
        }
    };

    if let Err(error) = transport.respond(&envelope, &reply).await {
        warn!(
            event_name = "ingress.gateway.respond_failed",
            envelope_id = %envelope.envelope_id,
            correlation_id = %context.correlation_id,
            user_id = %user_id,
            error = %error,
            "failed to answer gateway envelope"
        );
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use super::{GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError};
    use crate::blocks::{notice_message, MessageTemplate};
    use crate::events::{
        ChannelMessageEvent, EventContext, EventDispatcher, EventHandler, EventHandlerError,
        GatewayEnvelope, GatewayEvent, GatewayEventType, HandlerResult,
    };
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<GatewayEnvelope>, TransportError>>,
        connect_attempts: usize,
        acknowledgements: Vec<String>,
        responses: Vec<(String, String)>,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<GatewayEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    ..ScriptedState::default()
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn acknowledgements(&self) -> Vec<String> {
            self.state.lock().await.acknowledgements.clone()
        }

        async fn responses(&self) -> Vec<(String, String)> {
            self.state.lock().await.responses.clone()
        }
    }

    #[async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.acknowledgements.push(envelope_id.to_owned());
            Ok(())
        }

        async fn respond(
            &self,
            envelope: &GatewayEnvelope,
            message: &MessageTemplate,
        ) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.responses.push((envelope.envelope_id.clone(), message.plain_text()));
            Ok(())
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    struct Echo;

    #[async_trait]
    impl EventHandler for Echo {
        fn event_type(&self) -> GatewayEventType {
            GatewayEventType::Unsupported
        }

        async fn handle(
            &self,
            _envelope: &GatewayEnvelope,
            ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Ok(HandlerResult::Responded(notice_message(&format!("echo {}", ctx.correlation_id))))
        }
    }

    struct Broken;

    #[async_trait]
    impl EventHandler for Broken {
        fn event_type(&self) -> GatewayEventType {
            GatewayEventType::SlashCommand
        }

        async fn handle(
            &self,
            _envelope: &GatewayEnvelope,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, EventHandlerError> {
            Err(EventHandlerError::MalformedPayload("missing option".to_owned()))
        }
    }

    fn unsupported(id: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: id.to_owned(),
            event: GatewayEvent::Unsupported { event_type: "test".to_owned() },
        }
    }

    #[tokio::test]
    async fn reconnects_after_initial_connect_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Connect("network down".to_owned())), Ok(())],
            vec![Ok(Some(unsupported("env-1"))), Ok(None)],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.unwrap();

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.acknowledgements().await, vec!["env-1"]);
        assert_eq!(transport.state.lock().await.disconnect_calls, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Connect("fail-1".to_owned())),
                Err(TransportError::Connect("fail-2".to_owned())),
                Err(TransportError::Connect("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner = GatewayRunner::new(
            transport.clone(),
            EventDispatcher::default(),
            ReconnectPolicy { max_retries: 2, base_delay_ms: 0, max_delay_ms: 0 },
        );

        runner.start().await.unwrap();
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn handler_replies_are_sent_back_and_failures_become_generic_errors() {
        let slash = GatewayEnvelope {
            envelope_id: "env-3".to_owned(),
            event: serde_json::from_str(
                r#"{"type":"slash_command","command":"verify","channel_id":"C1",
                    "user_id":"U1","interaction":{"id":"I1","token":"T1"}}"#,
            )
            .unwrap(),
        };
        let chatter = GatewayEnvelope {
            envelope_id: "env-4".to_owned(),
            event: GatewayEvent::ChannelMessage(ChannelMessageEvent {
                channel_id: "C1".to_owned(),
                channel_name: "verify-here".to_owned(),
                message_id: "M1".to_owned(),
                author_id: "U1".to_owned(),
                author_is_admin: false,
                author_is_bot: false,
                text: "hi".to_owned(),
            }),
        };
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![Ok(Some(unsupported("env-2"))), Ok(Some(slash)), Ok(Some(chatter)), Ok(None)],
        ));
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register(Echo);
        dispatcher.register(Broken);

        let runner =
            GatewayRunner::new(transport.clone(), dispatcher, ReconnectPolicy::default());
        runner.start().await.unwrap();

        let mut responses = transport.responses().await;
        responses.sort();
        assert_eq!(
            responses,
            vec![
                ("env-2".to_owned(), "echo env-2".to_owned()),
                (
                    "env-3".to_owned(),
                    ":warning: An unexpected error has occurred. Please try again!\n\
                     Correlation ID: env-3"
                        .to_owned()
                ),
            ]
        );
        assert_eq!(transport.acknowledgements().await, vec!["env-2", "env-3", "env-4"]);
    }
}
