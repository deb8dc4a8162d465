//! JSON text framing for the push channel.
//!
//! Frames ride the websocket as UTF-8 text; anything that does not
//! parse is reported as a [`WireError`] and dropped by the caller.

use super::{ClientFrame, ServerFrame};

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("frame is not valid utf-8")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub fn encode_client_frame(frame: &ClientFrame) -> String {
    // ClientFrame serialization cannot fail: no maps with non-string
    // keys, no non-finite floats.
    serde_json::to_string(frame).unwrap_or_default()
}

pub fn decode_server_frame(raw: &[u8]) -> Result<ServerFrame, WireError> {
    let text = std::str::from_utf8(raw)?;
    Ok(serde_json::from_str(text)?)
}
