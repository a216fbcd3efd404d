//! # Chat Session
//!
//! Drives one end-to-end encrypted session over the relay's duplex stream:
//! the handshake choreography, then the ratchet pump that turns plaintext
//! lines into `message` frames and back.
//!
//! ## Choreography
//!
//! ```text
//!  A (initiator)            relay              B (responder)
//!  ──────────────────────────────────────────────────────────
//!  query_exchange  ──────────►
//!                  ◄──────────  start_exchange {prekey, sig, onetime}
//!  verify sig, forward exchange, build ratchet
//!  end_exchange {prekey, onetime, ephemeral}  ──────────►
//!                             look up prekey secret, burn one-time
//!                             secret, backward exchange, build ratchet
//!  message {data}  ◄─────────────────────────►  message {data}
//! ```
//!
//! Both peers send `query_exchange` on connect; whichever handshake frame
//! arrives first fixes the role. Each endpoint authenticates its outbound
//! ratchet traffic with `me ∥ peer` as associated data and checks inbound
//! traffic with `peer ∥ me`, so the pair agrees on every frame.
//!
//! The ratchet is owned by the session and shared between its read and
//! write halves behind a single mutex; nothing else may touch it.

use std::sync::Arc;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::{
    connect_async, tungstenite::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};

use crate::crypto::exchange::{
    backward_exchange, forward_exchange, BackwardExchangeParams, ForwardExchangeParams,
};
use crate::crypto::keys::{generate_exchange, IdentityPriv, IdentityPub};
use crate::crypto::ratchet::DoubleRatchet;
use crate::error::{Error, Result};
use crate::protocol::{Message, Payload};
use crate::store::ClientStore;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// The stream endpoint for an identity, derived from the relay's base URL.
fn stream_url(relay_url: &str, identity: &IdentityPub) -> String {
    let root = relay_url.trim_end_matches('/');
    let root = if let Some(rest) = root.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = root.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        root.to_string()
    };
    format!("{root}/rtc/{}", identity.to_base64())
}

async fn send_frame(sink: &mut WsSink, message: &Message) -> Result<()> {
    let json = serde_json::to_string(message)?;
    sink.send(WsMessage::Text(json)).await?;
    Ok(())
}

/// Connect to the relay, complete the handshake with `friend`, and start
/// the session.
///
/// Lines pushed into `input` are encrypted and sent; decrypted incoming
/// lines appear on the returned channel. The function resolves once the
/// handshake is complete, so a caller may report the session as connected
/// when it returns.
pub async fn start_chat(
    relay_url: &str,
    store: Arc<ClientStore>,
    me: IdentityPub,
    me_priv: IdentityPriv,
    friend: IdentityPub,
    mut input: mpsc::Receiver<String>,
) -> Result<mpsc::Receiver<String>> {
    let url = stream_url(relay_url, &me);
    let (ws, _) = connect_async(url.as_str()).await?;
    let (mut sink, mut stream) = ws.split();

    send_frame(
        &mut sink,
        &Message {
            from: None,
            to: friend,
            payload: Payload::QueryExchange,
        },
    )
    .await?;

    let ratchet = handshake(&mut sink, &mut stream, &store, &me_priv, friend).await?;
    let ratchet = Arc::new(Mutex::new(ratchet));

    // Side-specific associated data: "me first" going out, mirrored coming in.
    let send_ad = [me.as_bytes().as_slice(), friend.as_bytes().as_slice()].concat();
    let recv_ad = [friend.as_bytes().as_slice(), me.as_bytes().as_slice()].concat();

    let writer_ratchet = Arc::clone(&ratchet);
    tokio::spawn(async move {
        while let Some(line) = input.recv().await {
            let encrypted = writer_ratchet.lock().await.encrypt(line.as_bytes(), &send_ad);
            match encrypted {
                Ok(data) => {
                    let frame = Message {
                        from: None,
                        to: friend,
                        payload: Payload::Message { data },
                    };
                    if send_frame(&mut sink, &frame).await.is_err() {
                        tracing::warn!("stream closed; stopping writer");
                        break;
                    }
                }
                Err(error) => {
                    tracing::error!(%error, "failed to encrypt outgoing message");
                    break;
                }
            }
        }
    });

    let (out_tx, out_rx) = mpsc::channel(64);
    tokio::spawn(async move {
        while let Some(frame) = stream.next().await {
            let frame = match frame {
                Ok(WsMessage::Text(text)) => text,
                Ok(WsMessage::Close(_)) => break,
                Ok(_) => continue,
                Err(error) => {
                    tracing::warn!(%error, "stream read failed");
                    break;
                }
            };
            let message: Message = match serde_json::from_str(&frame) {
                Ok(message) => message,
                Err(error) => {
                    tracing::warn!(%error, "discarding malformed frame");
                    continue;
                }
            };
            // Only the session peer may speak here.
            if message.from != Some(friend) {
                continue;
            }
            if let Payload::Message { data } = message.payload {
                match ratchet.lock().await.decrypt(&data, &recv_ad) {
                    Ok(plaintext) => {
                        let line = String::from_utf8_lossy(&plaintext).into_owned();
                        if out_tx.send(line).await.is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        tracing::warn!(%error, "discarding undecryptable message");
                    }
                }
            }
        }
    });

    Ok(out_rx)
}

/// Run the handshake until a ratchet exists, in whichever role the first
/// incoming handshake frame dictates.
async fn handshake(
    sink: &mut WsSink,
    stream: &mut WsStream,
    store: &ClientStore,
    me_priv: &IdentityPriv,
    friend: IdentityPub,
) -> Result<DoubleRatchet> {
    loop {
        let frame = stream.next().await.ok_or(Error::HandshakeInterrupted)??;
        let text = match frame {
            WsMessage::Text(text) => text,
            WsMessage::Close(_) => return Err(Error::HandshakeInterrupted),
            _ => continue,
        };
        let message: Message = match serde_json::from_str(&text) {
            Ok(message) => message,
            Err(error) => {
                tracing::warn!(%error, "discarding malformed frame");
                continue;
            }
        };

        match message.payload {
            // We are the initiator: the relay answered our query.
            Payload::StartExchange {
                prekey,
                sig,
                onetime,
            } => {
                if !friend.verify(prekey.as_bytes(), &sig) {
                    return Err(Error::PrekeySignature);
                }

                let (ephemeral_pub, ephemeral_priv) = generate_exchange();
                let secret = forward_exchange(&ForwardExchangeParams {
                    me: me_priv,
                    ephemeral: &ephemeral_priv,
                    them: &friend,
                    prekey: &prekey,
                    onetime: onetime.as_ref(),
                })?;
                let ratchet = DoubleRatchet::from_initiator(secret, prekey)?;

                send_frame(
                    sink,
                    &Message {
                        from: None,
                        to: friend,
                        payload: Payload::EndExchange {
                            prekey,
                            onetime,
                            ephemeral: ephemeral_pub,
                        },
                    },
                )
                .await?;
                return Ok(ratchet);
            }

            // We are the responder: the peer completed an exchange with our
            // published keys.
            Payload::EndExchange {
                prekey,
                onetime,
                ephemeral,
            } => {
                if message.from != Some(friend) {
                    continue;
                }

                let prekey_priv =
                    store.prekey_secret(&prekey)?.ok_or(Error::MissingPrekey)?;
                let onetime_priv = match onetime {
                    Some(named) => Some(
                        store
                            .take_onetime_secret(&named)?
                            .ok_or(Error::MissingOnetime)?,
                    ),
                    None => None,
                };

                let secret = backward_exchange(&BackwardExchangeParams {
                    them: &friend,
                    ephemeral: &ephemeral,
                    me: me_priv,
                    prekey: &prekey_priv,
                    onetime: onetime_priv.as_ref(),
                })?;
                return Ok(DoubleRatchet::from_responder(secret, prekey, prekey_priv));
            }

            _ => continue,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_identity;

    #[test]
    fn test_stream_url_schemes() {
        let (id, _) = generate_identity();
        let b64 = id.to_base64();

        assert_eq!(
            stream_url("http://localhost:1234", &id),
            format!("ws://localhost:1234/rtc/{b64}")
        );
        assert_eq!(
            stream_url("https://relay.example.com/", &id),
            format!("wss://relay.example.com/rtc/{b64}")
        );
        assert_eq!(
            stream_url("ws://localhost:1234", &id),
            format!("ws://localhost:1234/rtc/{b64}")
        );
    }
}
