// ABOUTME: Protocol module for the stereospin wire format
// ABOUTME: JSON envelopes exchanged over a WebSocket, one message per text frame

/// Envelope definitions and the unknown-type-tolerant decoders
pub mod messages;

pub use messages::{decode_client, decode_server, ClientMessage, ServerMessage};
