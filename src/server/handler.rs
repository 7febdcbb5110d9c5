// ABOUTME: WebSocket client handler and command dispatcher
// ABOUTME: Handles join, clock-sync pings, ingestion commands, and playback requests

use crate::protocol::messages::{decode_client, ClientMessage, ServerMessage, TrackEntry};
use crate::server::ingest;
use crate::server::library;
use crate::server::server::AppState;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

/// Handle a WebSocket client connection
pub async fn handle_client(socket: WebSocket, state: AppState) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // First frame must be join_session
    let session_id = match wait_for_join(&mut ws_rx).await {
        Ok(id) => id,
        Err(e) => {
            log::warn!("Connection dropped before join: {}", e);
            return;
        }
    };

    let client_id = short_id();

    // Per-client outbox drained by a dedicated writer task, so a stalled peer
    // never delays fan-out to the others.
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let channel = state.store.attach(&session_id, &client_id, tx);

    let client_id_send = client_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                log::debug!("Client {} disconnected (send failed)", client_id_send);
                break;
            }
        }
    });

    state.store.send_to(
        &session_id,
        &client_id,
        &ServerMessage::SessionJoined {
            session_id: session_id.clone(),
            client_id: client_id.clone(),
            channel,
        },
    );
    state.store.broadcast_client_list(&session_id);
    state.store.send_to(
        &session_id,
        &client_id,
        &ServerMessage::TrackList {
            tracks: track_entries(&state),
        },
    );
    // New joiners to a track-bound session learn about the track right away.
    // They get no play catch-up; the next play or seek broadcast aligns them.
    state.store.send_audio_ready_to(&session_id, &client_id);

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(WsMessage::Text(text)) => {
                handle_frame(&text, &session_id, &client_id, &state).await;
            }
            Ok(WsMessage::Binary(data)) => {
                log::debug!(
                    "Ignoring binary frame from client {} ({} bytes)",
                    client_id,
                    data.len()
                );
            }
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => {
                // Handled automatically by axum
            }
            Ok(WsMessage::Close(_)) => {
                log::info!("Client {} closed connection", client_id);
                break;
            }
            Err(e) => {
                log::warn!("WebSocket error for client {}: {}", client_id, e);
                break;
            }
        }
    }

    state.store.detach(&session_id, &client_id);
    state.store.broadcast_client_list(&session_id);
    send_task.abort();

    log::info!("Client {} disconnected", client_id);
}

/// Wait up to 10 seconds for the opening join_session frame.
async fn wait_for_join(
    ws_rx: &mut futures_util::stream::SplitStream<WebSocket>,
) -> Result<String, String> {
    let timeout = tokio::time::timeout(std::time::Duration::from_secs(10), async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(WsMessage::Text(text)) => match decode_client(&text) {
                    Ok(Some(ClientMessage::JoinSession { session_id })) => {
                        if session_id.is_empty() {
                            return Ok(short_id());
                        }
                        return Ok(session_id);
                    }
                    Ok(Some(other)) => {
                        return Err(format!("expected join_session, got {:?}", other));
                    }
                    Ok(None) => continue,
                    Err(e) => return Err(format!("failed to parse message: {}", e)),
                },
                Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
                Ok(WsMessage::Close(_)) => {
                    return Err("connection closed before join".to_string());
                }
                Err(e) => return Err(format!("websocket error: {}", e)),
                _ => continue,
            }
        }
        Err("connection closed".to_string())
    });

    match timeout.await {
        Ok(result) => result,
        Err(_) => Err("timeout waiting for join_session".to_string()),
    }
}

/// Decode and route a single text frame.
///
/// Transport errors are logged and the frame dropped; recovery is implicit in
/// that the next frame is processed normally.
async fn handle_frame(text: &str, session_id: &str, client_id: &str, state: &AppState) {
    let msg = match decode_client(text) {
        Ok(Some(msg)) => msg,
        Ok(None) => {
            log::debug!("Ignoring unknown message type from {}", client_id);
            return;
        }
        Err(e) => {
            log::warn!("Invalid message from {}: {}", client_id, e);
            send_error(state, session_id, client_id, &e.to_string());
            return;
        }
    };

    match msg {
        ClientMessage::Ping { client_timestamp } => {
            let now = state.clock.now_ms();
            // One-way arrival delta doubles as the latency estimate used for
            // latency-compensated play scheduling.
            state
                .store
                .set_latency(session_id, client_id, (now - client_timestamp).max(0.0));

            state.store.send_to(
                session_id,
                client_id,
                &ServerMessage::Pong {
                    server_timestamp: state.clock.now_ms(),
                    client_timestamp,
                },
            );
        }

        ClientMessage::SubmitLink { url } => {
            handle_submit(url, session_id, client_id, state);
        }

        ClientMessage::LoadTrack { track_id } => {
            match library::read_metadata(&state.config.audio_root, &track_id) {
                Ok(track) => {
                    state.store.set_track(session_id, track);
                    state.store.broadcast_audio_ready(session_id);
                    state.store.broadcast_client_list(session_id);
                }
                Err(e) => {
                    log::warn!("load_track {} failed: {}", track_id, e);
                    send_error(state, session_id, client_id, &e.to_string());
                }
            }
        }

        ClientMessage::Ready => {
            state.store.set_ready(session_id, client_id, true);
            state.store.broadcast_client_list(session_id);
        }

        ClientMessage::PlayRequest => {
            state
                .store
                .broadcast_play(session_id, state.config.lead_time_ms);
        }

        ClientMessage::PauseRequest => {
            state.store.broadcast_pause(session_id);
        }

        ClientMessage::SeekRequest { target_time } => {
            state.store.broadcast_seek(session_id, target_time);
        }

        ClientMessage::VolumeRequest { channel, volume } => {
            // Verbatim rebroadcast, requester included: volume is effectively
            // a shared session-level setting per channel.
            state.store.broadcast(
                session_id,
                &ServerMessage::VolumeChange { channel, volume },
                None,
            );
        }

        ClientMessage::JoinSession { .. } => {
            log::debug!("Client {} sent join_session twice; ignoring", client_id);
        }
    }
}

fn handle_submit(url: String, session_id: &str, client_id: &str, state: &AppState) {
    if let Err(e) = ingest::validate_url(&url, &state.config.allowed_hosts) {
        send_error(state, session_id, client_id, &e.to_string());
        return;
    }

    if !state.store.begin_ingest(session_id) {
        send_error(
            state,
            session_id,
            client_id,
            &crate::error::Error::Busy.to_string(),
        );
        return;
    }

    state.store.broadcast(
        session_id,
        &ServerMessage::AudioLoading { url: url.clone() },
        None,
    );

    let state = state.clone();
    let session_id = session_id.to_string();
    let client_id = client_id.to_string();
    tokio::spawn(async move {
        let now = state.clock.now_ms();
        match ingest::ingest(&state.config, &url, now).await {
            Ok(track) => {
                let mut tracks = track_entries(&state);
                if !tracks.iter().any(|t| t.id == track.id) {
                    tracks.insert(0, track.entry());
                }

                state.store.set_track(&session_id, track);
                state.store.broadcast_audio_ready(&session_id);
                state.store.broadcast_client_list(&session_id);
                state
                    .store
                    .broadcast(&session_id, &ServerMessage::TrackList { tracks }, None);
            }
            Err(e) => {
                log::warn!("Ingestion failed for {}: {}", url, e);
                send_error(&state, &session_id, &client_id, &e.to_string());
            }
        }
        state.store.finish_ingest(&session_id);
    });
}

fn send_error(state: &AppState, session_id: &str, client_id: &str, message: &str) {
    state.store.send_to(
        session_id,
        client_id,
        &ServerMessage::Error {
            message: message.to_string(),
        },
    );
}

fn track_entries(state: &AppState) -> Vec<TrackEntry> {
    library::enumerate(&state.config.audio_root)
        .iter()
        .map(|t| t.entry())
        .collect()
}

fn short_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}
