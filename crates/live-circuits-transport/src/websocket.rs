//! Axum websocket transport for circuit connections.
//!
//! One socket maps to one `CircuitConnection`. A spawned send task
//! drains the outbound channel so circuit code never blocks on a slow
//! client, and outbound calls are expanded into their binary buffer
//! frames here, right before the call text goes out.

use std::sync::Arc;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
    routing::get,
};
use futures::{SinkExt, StreamExt};
use live_circuits_interop::ByteBufferRegistry;
use tokio::sync::mpsc;

use crate::{
    circuit::CircuitFactory,
    connection::{CircuitConnection, Flow},
    endpoint::CircuitEndpoint,
    protocol::{self, OutboundCall},
    proxy::Outbound,
};

/// Websocket upgrade handler for the circuit protocol.
pub async fn ws_handler<F: CircuitFactory>(
    ws: WebSocketUpgrade,
    State(endpoint): State<Arc<CircuitEndpoint<F>>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, endpoint))
}

async fn handle_socket<F: CircuitFactory>(socket: WebSocket, endpoint: Arc<CircuitEndpoint<F>>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

    let send_task = tokio::spawn(async move {
        // Outbound buffer scope, reused across calls.
        let mut tx_buffers = ByteBufferRegistry::new();
        'outer: while let Some(outbound) = rx.recv().await {
            let messages = match outbound {
                Outbound::Message(message) => match serde_json::to_string(&message) {
                    Ok(json) => vec![Message::Text(json.into())],
                    Err(err) => {
                        tracing::error!("Failed to serialize outbound message: {err}");
                        continue;
                    }
                },
                Outbound::Call(call) => match expand_call(&mut tx_buffers, &call) {
                    Ok(messages) => messages,
                    Err(err) => {
                        tracing::error!("Failed to serialize outbound call: {err}");
                        continue;
                    }
                },
            };
            for message in messages {
                if sender.send(message).await.is_err() {
                    break 'outer;
                }
            }
        }
    });

    let mut connection = CircuitConnection::new(endpoint, tx);

    while let Some(message) = receiver.next().await {
        let flow = match message {
            Ok(Message::Text(text)) => connection.handle_text(&text).await,
            Ok(Message::Binary(frame)) => connection.handle_binary(frame),
            Ok(Message::Close(_)) => break,
            Ok(_) => Flow::Continue,
            Err(err) => {
                tracing::error!("WebSocket error: {err}");
                break;
            }
        };
        if flow == Flow::Close {
            break;
        }
    }

    connection.handle_disconnect();
    send_task.abort();
}

/// Expand one outbound call into its wire messages: the binary frame
/// for each buffer argument first, then the call text that references
/// them.
///
/// `tx_buffers` is the connection's outbound scope. It is cleared here,
/// so buffer ids restart at zero for every call.
fn expand_call(
    tx_buffers: &mut ByteBufferRegistry,
    call: &OutboundCall,
) -> Result<Vec<Message>, serde_json::Error> {
    tx_buffers.clear();
    let message = protocol::encode_call(tx_buffers, call);
    let mut messages = Vec::with_capacity(tx_buffers.len() + 1);
    for (id, buffer) in tx_buffers.iter() {
        messages.push(Message::Binary(protocol::encode_frame(id, buffer)));
    }
    messages.push(Message::Text(serde_json::to_string(&message)?.into()));
    Ok(messages)
}

/// Router exposing the circuit websocket at `/circuit`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(circuit_router(endpoint));
/// ```
#[must_use]
pub fn circuit_router<F: CircuitFactory>(endpoint: Arc<CircuitEndpoint<F>>) -> Router {
    Router::new()
        .route("/circuit", get(ws_handler::<F>))
        .with_state(endpoint)
}

#[cfg(test)]
mod tests {
    use live_circuits_interop::ByteBuffer;
    use serde_json::Value;

    use super::*;
    use crate::protocol::CallArg;

    #[test]
    fn test_expand_call_frames_precede_text() {
        let mut tx_buffers = ByteBufferRegistry::new();
        let call = OutboundCall::new(
            "update",
            vec![
                CallArg::Buffer(ByteBuffer::from(vec![1])),
                CallArg::Json(Value::from(2)),
                CallArg::Buffer(ByteBuffer::from(vec![3, 3])),
            ],
        );

        let messages = expand_call(&mut tx_buffers, &call).unwrap();
        assert_eq!(messages.len(), 3);

        let Message::Binary(first) = &messages[0] else {
            panic!("expected a binary frame first");
        };
        assert_eq!(first.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 0, 1]);
        let Message::Binary(second) = &messages[1] else {
            panic!("expected a second binary frame");
        };
        assert_eq!(second.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 1, 3, 3]);

        let Message::Text(text) = &messages[2] else {
            panic!("expected the call text last");
        };
        assert!(text.contains(r#""method":"update""#));
        assert!(text.contains(r#"{"__byte[]":0}"#));
        assert!(text.contains(r#"{"__byte[]":1}"#));
    }

    #[test]
    fn test_expand_call_restarts_ids_per_call() {
        let mut tx_buffers = ByteBufferRegistry::new();
        let call = OutboundCall::new("draw", vec![CallArg::Buffer(ByteBuffer::from(vec![9]))]);

        expand_call(&mut tx_buffers, &call).unwrap();
        let messages = expand_call(&mut tx_buffers, &call).unwrap();

        // The second call's lone buffer gets id zero again.
        let Message::Binary(frame) = &messages[0] else {
            panic!("expected a binary frame");
        };
        assert_eq!(frame.as_ref(), &[0, 0, 0, 0, 0, 0, 0, 0, 9]);
        assert_eq!(tx_buffers.len(), 1);
    }
}
