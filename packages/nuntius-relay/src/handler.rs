//! WebSocket connection handler.
//!
//! Each connected identity owns two cooperating tasks: this reader, which
//! pulls frames off the stream and makes routing decisions, and a writer
//! task that drains the identity's channel back onto the stream.
//!
//! Routing rules:
//! - `query_exchange` is answered by the relay itself: it fetches the
//!   target's signed pre-key, burns one of their one-time keys, and pushes
//!   `start_exchange` onto the *originator's* channel. The target is never
//!   involved. If the target is not connected or either lookup fails, the
//!   frame is dropped.
//! - Every other payload has its `from` overwritten with the authenticated
//!   connection identity and is pushed to the recipient's channel; frames
//!   for unconnected recipients are silently dropped.

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use nuntius_core::protocol::{Message, Payload};
use nuntius_core::IdentityPub;

use crate::state::RelayState;

/// Handle one client stream for the lifetime of the connection.
pub async fn handle_stream(socket: WebSocket, identity: IdentityPub, state: RelayState) {
    let (mut ws_sender, mut ws_receiver) = socket.split();

    // ── Writer task: drain the channel onto the stream ────────────────────
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    state.register(identity, tx);

    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match serde_json::to_string(&message) {
                Ok(json) => {
                    if ws_sender.send(WsMessage::Text(json)).await.is_err() {
                        break;
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "failed to serialize outbound frame");
                }
            }
        }
    });

    // ── Reader loop: route inbound frames ─────────────────────────────────
    while let Some(frame) = ws_receiver.next().await {
        let text = match frame {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(error) => {
                tracing::warn!(identity = %identity, %error, "stream read failed");
                break;
            }
        };

        let message: Message = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(identity = %identity, %error, "discarding malformed frame");
                continue;
            }
        };

        route(&state, identity, message);
    }

    // ── Cleanup: every exit path deregisters ──────────────────────────────
    state.unregister(&identity);
    writer.abort();
}

/// Apply the routing rules to one inbound frame.
fn route(state: &RelayState, from: IdentityPub, mut message: Message) {
    match message.payload {
        Payload::QueryExchange => {
            let target = message.to;
            if !state.is_connected(&target) {
                tracing::debug!(target = %target, "query for unconnected target dropped");
                return;
            }
            let (prekey, sig) = match state.store.get_prekey(&target) {
                Ok(Some(row)) => row,
                Ok(None) => {
                    tracing::warn!(target = %target, "query for unregistered target dropped");
                    return;
                }
                Err(error) => {
                    tracing::warn!(target = %target, %error, "prekey lookup failed");
                    return;
                }
            };
            let onetime = match state.store.take_onetime(&target) {
                Ok(Some(onetime)) => onetime,
                Ok(None) => {
                    tracing::warn!(target = %target, "one-time pool exhausted; query dropped");
                    return;
                }
                Err(error) => {
                    tracing::warn!(target = %target, %error, "one-time dispense failed");
                    return;
                }
            };

            // Answer on the originator's own channel; the target stays idle.
            state.send_to(
                &from,
                Message {
                    from: None,
                    to: from,
                    payload: Payload::StartExchange {
                        prekey,
                        sig,
                        onetime: Some(onetime),
                    },
                },
            );
        }
        _ => {
            // Clients cannot spoof senders: From is whoever holds the stream.
            message.from = Some(from);
            let to = message.to;
            if !state.send_to(&to, message) {
                tracing::debug!(recipient = %to, "frame for unconnected recipient dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RelayStore;
    use nuntius_core::crypto::bundle::generate_bundle;
    use nuntius_core::crypto::keys::{generate_exchange, generate_identity};

    fn state() -> RelayState {
        RelayState::new(RelayStore::open(None).unwrap())
    }

    /// Register an identity and return the receiving end of its channel.
    fn connect(state: &RelayState, identity: IdentityPub) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        state.register(identity, tx);
        rx
    }

    #[test]
    fn test_query_exchange_answered_on_originators_channel() {
        let state = state();
        let (alice, _) = generate_identity();
        let (bob, bob_priv) = generate_identity();

        let mut alice_rx = connect(&state, alice);
        let _bob_rx = connect(&state, bob);

        let (prekey, _) = generate_exchange();
        let sig = bob_priv.sign(prekey.as_bytes());
        state.store.save_prekey(&bob, &prekey, &sig).unwrap();
        let (bundle, _) = generate_bundle();
        state.store.add_onetimes(&bob, &bundle).unwrap();

        route(
            &state,
            alice,
            Message {
                from: None,
                to: bob,
                payload: Payload::QueryExchange,
            },
        );

        let answer = alice_rx.try_recv().unwrap();
        assert!(answer.from.is_none());
        assert_eq!(answer.to, alice);
        match answer.payload {
            Payload::StartExchange {
                prekey: p,
                onetime,
                ..
            } => {
                assert_eq!(p.as_bytes(), prekey.as_bytes());
                assert!(onetime.is_some());
            }
            _ => panic!("wrong variant"),
        }

        // The burn happened.
        assert_eq!(state.store.count_onetimes(&bob).unwrap(), 63);
    }

    #[test]
    fn test_query_for_disconnected_target_dropped() {
        let state = state();
        let (alice, _) = generate_identity();
        let (bob, bob_priv) = generate_identity();
        let mut alice_rx = connect(&state, alice);

        let (prekey, _) = generate_exchange();
        let sig = bob_priv.sign(prekey.as_bytes());
        state.store.save_prekey(&bob, &prekey, &sig).unwrap();

        route(
            &state,
            alice,
            Message {
                from: None,
                to: bob,
                payload: Payload::QueryExchange,
            },
        );
        assert!(alice_rx.try_recv().is_err());
    }

    #[test]
    fn test_from_is_overwritten() {
        let state = state();
        let (alice, _) = generate_identity();
        let (bob, _) = generate_identity();
        let (mallory, _) = generate_identity();

        let mut bob_rx = connect(&state, bob);

        route(
            &state,
            alice,
            Message {
                from: Some(mallory),
                to: bob,
                payload: Payload::Message { data: vec![1, 2] },
            },
        );

        let delivered = bob_rx.try_recv().unwrap();
        assert_eq!(delivered.from, Some(alice));
    }

    #[test]
    fn test_message_for_unconnected_recipient_dropped() {
        let state = state();
        let (alice, _) = generate_identity();
        let (bob, _) = generate_identity();

        // No channel for bob; routing is a silent no-op.
        route(
            &state,
            alice,
            Message {
                from: None,
                to: bob,
                payload: Payload::Message { data: vec![0] },
            },
        );
        assert!(!state.is_connected(&bob));
    }
}
