//! HTTP event ingress feeding the gateway runner through a bounded channel.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::HeaderMap, http::StatusCode, routing::post, Json, Router};
use rostergate_gateway::blocks::MessageTemplate;
use rostergate_gateway::events::GatewayEnvelope;
use rostergate_gateway::socket::{GatewayTransport, TransportError};
use rostergate_gateway::surface::ChatSurface;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

pub const INGRESS_PATH: &str = "/gateway/events";
const INGRESS_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct IngressState {
    sender: mpsc::Sender<GatewayEnvelope>,
    app_token: SecretString,
}

pub fn channel(app_token: SecretString) -> (IngressState, mpsc::Receiver<GatewayEnvelope>) {
    let (sender, receiver) = mpsc::channel(INGRESS_CAPACITY);
    (IngressState { sender, app_token }, receiver)
}

pub fn router(state: IngressState) -> Router {
    Router::new().route(INGRESS_PATH, post(receive)).with_state(state)
}

pub async fn receive(
    State(state): State<IngressState>,
    headers: HeaderMap,
    Json(envelope): Json<GatewayEnvelope>,
) -> StatusCode {
    let presented = headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));
    if !presented.is_some_and(|token| token_matches(token, &state.app_token)) {
        warn!(
            event_name = "ingress.gateway.unauthorized",
            envelope_id = %envelope.envelope_id,
            "rejected envelope with missing or wrong app token"
        );
        return StatusCode::UNAUTHORIZED;
    }

    match state.sender.try_send(envelope) {
        Ok(()) => StatusCode::ACCEPTED,
        Err(mpsc::error::TrySendError::Full(envelope)) => {
            warn!(
                event_name = "ingress.gateway.backpressure",
                envelope_id = %envelope.envelope_id,
                "ingress queue full"
            );
            StatusCode::TOO_MANY_REQUESTS
        }
        Err(mpsc::error::TrySendError::Closed(_)) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Length leaks; contents are compared in constant time.
fn token_matches(presented: &str, expected: &SecretString) -> bool {
    presented.as_bytes().ct_eq(expected.expose_secret().as_bytes()).into()
}

/// Transport over the ingress queue; replies go out through the chat surface.
pub struct ChannelTransport {
    receiver: Mutex<mpsc::Receiver<GatewayEnvelope>>,
    surface: Arc<dyn ChatSurface>,
}

impl ChannelTransport {
    pub fn new(receiver: mpsc::Receiver<GatewayEnvelope>, surface: Arc<dyn ChatSurface>) -> Self {
        Self { receiver: Mutex::new(receiver), surface }
    }
}

#[async_trait]
impl GatewayTransport for ChannelTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn acknowledge(&self, envelope_id: &str) -> Result<(), TransportError> {
        // The HTTP 202 already acknowledged receipt.
        debug!(event_name = "ingress.gateway.ack_sent", envelope_id, "envelope accepted");
        Ok(())
    }

    async fn respond(
        &self,
        envelope: &GatewayEnvelope,
        message: &MessageTemplate,
    ) -> Result<(), TransportError> {
        let Some(interaction) = envelope.event.interaction() else {
            return Ok(());
        };
        self.surface
            .reply_ephemeral(interaction, message)
            .await
            .map_err(|error| TransportError::Respond(error.to_string()))
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.receiver.lock().await.close();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{extract::State, http::HeaderMap, http::StatusCode, Json};
    use rostergate_gateway::blocks::notice_message;
    use rostergate_gateway::events::{GatewayEnvelope, GatewayEvent};
    use rostergate_gateway::socket::GatewayTransport;
    use rostergate_gateway::surface::{RecordingChatSurface, SurfaceCall};
    use secrecy::SecretString;

    use super::{channel, receive, token_matches, ChannelTransport};

    fn slash_envelope(id: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: id.to_string(),
            event: serde_json::from_str::<GatewayEvent>(
                r#"{"type":"slash_command","command":"verify","text":"help",
                    "channel_id":"C1","user_id":"U1",
                    "interaction":{"id":"I1","token":"T1"}}"#,
            )
            .unwrap(),
        }
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
        headers
    }

    #[tokio::test]
    async fn accepted_envelopes_reach_the_transport() {
        let (state, receiver) = channel("app-secret".to_string().into());
        let surface = RecordingChatSurface::default();
        let transport = ChannelTransport::new(receiver, Arc::new(surface.clone()));

        let status =
            receive(State(state.clone()), bearer("app-secret"), Json(slash_envelope("env-1"))).await;
        assert_eq!(status, StatusCode::ACCEPTED);

        let envelope = transport.next_envelope().await.unwrap().unwrap();
        assert_eq!(envelope.envelope_id, "env-1");

        transport.respond(&envelope, &notice_message("Email sent!")).await.unwrap();
        assert_eq!(
            surface.calls(),
            vec![SurfaceCall::Reply {
                interaction_id: "I1".to_string(),
                text: "Email sent!".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn wrong_or_missing_token_is_unauthorized() {
        let (state, mut receiver) = channel("app-secret".to_string().into());

        let wrong = receive(State(state.clone()), bearer("guess"), Json(slash_envelope("e1"))).await;
        let missing = receive(State(state), HeaderMap::new(), Json(slash_envelope("e2"))).await;

        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(missing, StatusCode::UNAUTHORIZED);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn token_comparison_requires_an_exact_match() {
        let expected: SecretString = "app-secret".to_string().into();

        assert!(token_matches("app-secret", &expected));
        assert!(!token_matches("app-secreT", &expected));
        assert!(!token_matches("app-secret-longer", &expected));
        assert!(!token_matches("", &expected));
    }

    #[tokio::test]
    async fn stream_ends_when_every_sender_is_gone() {
        let (state, receiver) = channel("app-secret".to_string().into());
        let transport =
            ChannelTransport::new(receiver, Arc::new(RecordingChatSurface::default()));
        drop(state);

        assert_eq!(transport.next_envelope().await, Ok(None));
    }
}
