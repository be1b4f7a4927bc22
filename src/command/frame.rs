use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

pub const STX: u8 = b'<';
pub const ETX: u8 = b'>';
/// Receive buffer is 128 bytes including the terminator
pub const MAX_PAYLOAD_LEN: usize = 127;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum FrameState {
    #[default]
    Idle,
    Reading,
    /// Frame overflowed; swallow bytes until the next delimiter
    Discarding,
}

/// `<payload>` framing used on the operator serial line.
///
/// Bytes outside a frame are ignored and a new `<` restarts the frame.
#[derive(Debug, Default)]
pub struct FrameCodec {
    payload: Vec<u8>,
    state: FrameState,
}

impl FrameCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Decoder for FrameCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        while src.has_remaining() {
            let byte = src.get_u8();
            match (byte, self.state) {
                (STX, _) => {
                    self.payload.clear();
                    self.state = FrameState::Reading;
                }
                (ETX, FrameState::Reading) => {
                    self.state = FrameState::Idle;
                    let payload = std::mem::take(&mut self.payload);
                    return Ok(Some(String::from_utf8_lossy(&payload).into_owned()));
                }
                (ETX, FrameState::Discarding) => self.state = FrameState::Idle,
                (_, FrameState::Reading) => {
                    if self.payload.len() == MAX_PAYLOAD_LEN {
                        warn!(limit = MAX_PAYLOAD_LEN, "command frame too long, dropped");
                        self.payload.clear();
                        self.state = FrameState::Discarding;
                    } else {
                        self.payload.push(byte);
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }
}

/// Replies go out as `<payload>` followed by a newline.
impl Encoder<String> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, payload: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        dst.reserve(payload.len() + 3);
        dst.put_u8(STX);
        dst.put_slice(payload.as_bytes());
        dst.put_u8(ETX);
        dst.put_u8(b'\n');
        Ok(())
    }
}
