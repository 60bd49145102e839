//! Push channel transport
//!
//! `GET /ws?token=..&userId=..`. The registry decides the handshake; this
//! module owns the socket, forwards the connection's outbound channel and
//! logs client messages.

use crate::state::AppState;
use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use fatura_core::application::{ConnectionHandle, HandshakeRejection};
use fatura_core::domain::ClientMessage;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info, warn};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeQuery {
    pub token: Option<String>,
    pub user_id: Option<String>,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<HandshakeQuery>,
) -> Response {
    let outcome = state
        .registry()
        .authenticate(query.token.as_deref(), query.user_id.as_deref());

    ws.on_upgrade(move |socket| async move {
        match outcome {
            Ok(owner_id) => handle_socket(socket, state, owner_id).await,
            Err(rejection) => close_rejected(socket, rejection).await,
        }
    })
}

async fn close_rejected(mut socket: WebSocket, rejection: HandshakeRejection) {
    let frame = CloseFrame {
        code: rejection.code,
        reason: rejection.reason.into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Could not send close frame");
    }
}

async fn handle_socket(socket: WebSocket, state: AppState, owner_id: String) {
    let (connection, mut outbound) = ConnectionHandle::channel(owner_id.clone());
    let connection_id = connection.id();
    let (mut sink, mut stream) = socket.split();

    state.dispatcher().attach(connection);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match serde_json::to_string(&message) {
                Ok(text) => text,
                Err(e) => {
                    warn!(kind = message.kind(), error = %e, "Could not encode push message");
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => handle_client_message(&owner_id, &text),
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(owner_id = %owner_id, error = %e, "Socket error");
                break;
            }
        }
    }

    state.registry().unregister(&owner_id, connection_id);
    writer.abort();
    info!(owner_id = %owner_id, connection_id = %connection_id, "Connection closed");
}

/// Subscriptions are informational; delivery is per owner
fn handle_client_message(owner_id: &str, text: &str) {
    match serde_json::from_str::<ClientMessage>(text) {
        Ok(ClientMessage::ListenInvoice { invoice_id }) => {
            info!(owner_id = %owner_id, invoice_id = %invoice_id, "Client listening to invoice");
        }
        Ok(ClientMessage::ListenPackage { package_id }) => {
            info!(owner_id = %owner_id, package_id = %package_id, "Client listening to package");
        }
        Ok(ClientMessage::ListenAllInvoices) => {
            info!(owner_id = %owner_id, "Client listening to all invoices");
        }
        Err(e) => {
            warn!(owner_id = %owner_id, error = %e, "Ignoring malformed client message");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handshake_query_names() {
        let query: HandshakeQuery =
            serde_json::from_value(serde_json::json!({"token": "t", "userId": "u"})).unwrap();
        assert_eq!(query.token.as_deref(), Some("t"));
        assert_eq!(query.user_id.as_deref(), Some("u"));
    }

    #[test]
    fn test_client_messages_never_panic() {
        handle_client_message("u", r#"{"type":"listen_invoice","invoiceId":"inv-1"}"#);
        handle_client_message("u", r#"{"type":"listen_all_invoices"}"#);
        handle_client_message("u", r#"{"type":"dance"}"#);
        handle_client_message("u", "not json");
    }
}
