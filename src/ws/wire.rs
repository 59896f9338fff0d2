//! RFC 6455 frame encoding with every bit under caller control
//!
//! ```text
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |     Masking-key (0 or 4 bytes)    |       Payload Data ...     |
//! +-----------------------------------+----------------------------+
//! ```

use thiserror::Error;

use super::Frame;

pub const OP_CONTINUATION: u8 = 0x0;
pub const OP_TEXT: u8 = 0x1;
pub const OP_BINARY: u8 = 0x2;
pub const OP_CLOSE: u8 = 0x8;
pub const OP_PING: u8 = 0x9;
pub const OP_PONG: u8 = 0xA;

/// Close code used when a close frame carries no status
pub const CLOSE_NO_STATUS: u16 = 1005;

/// Frame decoding errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Declared payload does not fit in memory
    #[error("payload length {0} overflows")]
    LengthOverflow(u64),
    #[error("close payload of one byte")]
    BadClosePayload,
}

/// One frame exactly as it goes on (or came off) the wire
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireFrame {
    pub fin: bool,
    /// RSV1..RSV3 in the low three bits
    pub rsv: u8,
    pub opcode: u8,
    pub mask: Option<[u8; 4]>,
    /// Unmasked payload
    pub payload: Vec<u8>,
}

impl WireFrame {
    /// Final frame with a random mask, as a client must send it
    pub fn new(opcode: u8, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            fin: true,
            rsv: 0,
            opcode,
            mask: Some(rand::random()),
            payload: payload.into(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self::new(OP_TEXT, text.as_bytes())
    }

    pub fn binary(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(OP_BINARY, bytes)
    }

    pub fn ping(payload: impl Into<Vec<u8>>) -> Self {
        Self::new(OP_PING, payload)
    }

    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = code.to_be_bytes().to_vec();
        payload.extend_from_slice(reason.as_bytes());
        Self::new(OP_CLOSE, payload)
    }

    pub fn continuation(payload: impl Into<Vec<u8>>, fin: bool) -> Self {
        Self {
            fin,
            ..Self::new(OP_CONTINUATION, payload)
        }
    }

    /// Send without a mask (illegal from a client)
    pub fn unmasked(mut self) -> Self {
        self.mask = None;
        self
    }

    pub fn with_mask(mut self, key: [u8; 4]) -> Self {
        self.mask = Some(key);
        self
    }

    pub fn non_final(mut self) -> Self {
        self.fin = false;
        self
    }

    pub fn with_rsv(mut self, rsv: u8) -> Self {
        self.rsv = rsv & 0x7;
        self
    }

    pub fn is_control(&self) -> bool {
        self.opcode & 0x8 != 0
    }

    /// Serialize, masking the payload when a key is set
    pub fn encode(&self) -> Vec<u8> {
        let len = self.payload.len();
        let mut out = Vec::with_capacity(len + 14);
        out.push(((self.fin as u8) << 7) | ((self.rsv & 0x7) << 4) | (self.opcode & 0xF));

        let mask_bit = if self.mask.is_some() { 0x80 } else { 0x00 };
        if len < 126 {
            out.push(mask_bit | len as u8);
        } else if len <= u16::MAX as usize {
            out.push(mask_bit | 126);
            out.extend_from_slice(&(len as u16).to_be_bytes());
        } else {
            out.push(mask_bit | 127);
            out.extend_from_slice(&(len as u64).to_be_bytes());
        }

        match self.mask {
            Some(key) => {
                out.extend_from_slice(&key);
                out.extend(
                    self.payload
                        .iter()
                        .enumerate()
                        .map(|(i, b)| b ^ key[i % 4]),
                );
            }
            None => out.extend_from_slice(&self.payload),
        }
        out
    }

    /// Decode one frame from the front of `bytes`. `Ok(None)` means more
    /// bytes are needed; on success also returns the bytes consumed.
    pub fn decode(bytes: &[u8]) -> Result<Option<(WireFrame, usize)>, WireError> {
        if bytes.len() < 2 {
            return Ok(None);
        }
        let fin = bytes[0] & 0x80 != 0;
        let rsv = (bytes[0] >> 4) & 0x7;
        let opcode = bytes[0] & 0xF;
        let masked = bytes[1] & 0x80 != 0;

        let mut pos = 2;
        let len = match bytes[1] & 0x7F {
            126 => {
                if bytes.len() < pos + 2 {
                    return Ok(None);
                }
                let len = u16::from_be_bytes([bytes[2], bytes[3]]) as u64;
                pos += 2;
                len
            }
            127 => {
                if bytes.len() < pos + 8 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&bytes[2..10]);
                pos += 8;
                u64::from_be_bytes(raw)
            }
            n => n as u64,
        };
        let len = usize::try_from(len).map_err(|_| WireError::LengthOverflow(len))?;

        let mask = if masked {
            if bytes.len() < pos + 4 {
                return Ok(None);
            }
            let key = [bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]];
            pos += 4;
            Some(key)
        } else {
            None
        };

        let end = pos.checked_add(len).ok_or(WireError::LengthOverflow(len as u64))?;
        if bytes.len() < end {
            return Ok(None);
        }
        let payload = match mask {
            Some(key) => bytes[pos..end]
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ key[i % 4])
                .collect(),
            None => bytes[pos..end].to_vec(),
        };

        Ok(Some((
            WireFrame {
                fin,
                rsv,
                opcode,
                mask,
                payload,
            },
            end,
        )))
    }

    /// Typed view of a complete (unfragmented) frame
    pub fn to_frame(&self) -> Result<Frame, WireError> {
        Ok(match self.opcode {
            OP_TEXT | OP_CONTINUATION => {
                Frame::Text(String::from_utf8_lossy(&self.payload).into_owned())
            }
            OP_CLOSE => {
                let (code, reason) = parse_close_payload(&self.payload)?;
                Frame::Close(code, reason)
            }
            OP_PING => Frame::Ping,
            OP_PONG => Frame::Pong,
            _ => Frame::Binary(self.payload.clone()),
        })
    }
}

/// Split a close payload into status code and reason
pub fn parse_close_payload(payload: &[u8]) -> Result<(u16, String), WireError> {
    match payload.len() {
        0 => Ok((CLOSE_NO_STATUS, String::new())),
        1 => Err(WireError::BadClosePayload),
        _ => Ok((
            u16::from_be_bytes([payload[0], payload[1]]),
            String::from_utf8_lossy(&payload[2..]).into_owned(),
        )),
    }
}

/// Split a message into masked fragments of at most `fragment_len` bytes:
/// one `opcode` frame followed by continuations, the last one final
pub fn fragment(opcode: u8, payload: &[u8], fragment_len: usize) -> Vec<WireFrame> {
    let fragment_len = fragment_len.max(1);
    let pieces: Vec<&[u8]> = if payload.is_empty() {
        vec![&[][..]]
    } else {
        payload.chunks(fragment_len).collect()
    };
    let last = pieces.len() - 1;
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, piece)| {
            let op = if i == 0 { opcode } else { OP_CONTINUATION };
            WireFrame {
                fin: i == last,
                ..WireFrame::new(op, piece)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_rfc_example_unmasked() {
        // RFC 6455 section 5.7: single-frame unmasked text "Hello"
        let frame = WireFrame::text("Hello").unmasked();
        assert_eq!(frame.encode(), vec![0x81, 0x05, 0x48, 0x65, 0x6c, 0x6c, 0x6f]);
    }

    #[test]
    fn test_encode_rfc_example_masked() {
        // RFC 6455 section 5.7: single-frame masked text "Hello"
        let frame = WireFrame::text("Hello").with_mask([0x37, 0xfa, 0x21, 0x3d]);
        assert_eq!(
            frame.encode(),
            vec![0x81, 0x85, 0x37, 0xfa, 0x21, 0x3d, 0x7f, 0x9f, 0x4d, 0x51, 0x58]
        );
    }

    #[test]
    fn test_extended_lengths() {
        let medium = WireFrame::binary(vec![0u8; 256]).unmasked().encode();
        assert_eq!(&medium[..4], &[0x82, 126, 0x01, 0x00]);
        assert_eq!(medium.len(), 4 + 256);

        let large = WireFrame::binary(vec![0u8; 65536]).unmasked().encode();
        assert_eq!(large[1], 127);
        assert_eq!(&large[2..10], &65536u64.to_be_bytes());
    }

    #[test]
    fn test_decode_masked_frame() {
        let encoded = WireFrame::text("abc").with_mask([1, 2, 3, 4]).encode();
        let (frame, used) = WireFrame::decode(&encoded).unwrap().unwrap();
        assert_eq!(used, encoded.len());
        assert_eq!(frame.payload, b"abc");
        assert_eq!(frame.mask, Some([1, 2, 3, 4]));
        assert_eq!(frame.to_frame().unwrap(), Frame::Text("abc".to_string()));
    }

    #[test]
    fn test_decode_partial() {
        let encoded = WireFrame::text("partial").unmasked().encode();
        assert!(WireFrame::decode(&encoded[..1]).unwrap().is_none());
        assert!(WireFrame::decode(&encoded[..encoded.len() - 1]).unwrap().is_none());
    }

    #[test]
    fn test_close_payload() {
        let frame = WireFrame::close(3000, "Go away!").unmasked();
        let (decoded, _) = WireFrame::decode(&frame.encode()).unwrap().unwrap();
        assert_eq!(
            decoded.to_frame().unwrap(),
            Frame::Close(3000, "Go away!".to_string())
        );
        assert_eq!(parse_close_payload(&[]).unwrap().0, CLOSE_NO_STATUS);
        let err = parse_close_payload(&[3]).unwrap_err();
        assert_eq!(err.to_string(), "close payload of one byte");
        assert_eq!(
            WireError::LengthOverflow(u64::MAX).to_string(),
            "payload length 18446744073709551615 overflows"
        );
    }

    #[test]
    fn test_fragment() {
        let frames = fragment(OP_TEXT, b"abcdefg", 3);
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].opcode, OP_TEXT);
        assert!(!frames[0].fin);
        assert_eq!(frames[1].opcode, OP_CONTINUATION);
        assert!(frames[2].fin);
        assert_eq!(frames[2].payload, b"g");
        assert!(frames.iter().all(|f| f.mask.is_some()));

        let empty = fragment(OP_TEXT, b"", 3);
        assert_eq!(empty.len(), 1);
        assert!(empty[0].fin);
    }
}
