//! Core traits for generic WebSocket infrastructure.

use serde::de::DeserializeOwned;

/// Message parser trait for converting raw text frames to messages.
///
/// The connection manager hands every text frame to the parser and broadcasts
/// whatever comes back. Returning an empty vec drops the frame silently, which
/// is how envelopes of an unknown kind are ignored. Returning an error marks the
/// frame as a protocol violation; it is logged and dropped, the connection stays up.
///
/// # Example
///
/// ```ignore
/// pub struct SimpleParser;
///
/// impl MessageParser<MyMessage> for SimpleParser {
///     fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<MyMessage>> {
///         let msg: MyMessage = serde_json::from_slice(bytes)?;
///         Ok(vec![msg])
///     }
/// }
/// ```
pub trait MessageParser<M: DeserializeOwned>: Send + Sync + 'static {
    /// Parse incoming bytes into messages.
    ///
    /// May return empty vec if the frame carries nothing this client understands.
    fn parse(&self, bytes: &[u8]) -> crate::Result<Vec<M>>;
}
