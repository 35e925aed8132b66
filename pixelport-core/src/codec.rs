//! Stream decoder for the OPC wire format.
//!
//! OPC is length-prefixed, so framing errors cannot occur by construction:
//! the decoder waits for a complete header, peeks the payload length, and
//! waits for the full message before yielding it. A `Framed<TcpStream>`
//! drains whatever the socket has buffered, so a burst of frames never
//! backs up the receive window.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;

use crate::error::BridgeError;
use crate::opc::{OpcMessage, OPC_HEADER_LEN};

/// Decoder yielding one [`OpcMessage`] per length-prefixed wire frame.
#[derive(Debug, Default)]
pub struct OpcCodec;

impl Decoder for OpcCodec {
    type Item = OpcMessage;
    type Error = BridgeError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.len() < OPC_HEADER_LEN {
            return Ok(None);
        }

        let channel = src[0];
        let command = src[1];
        let length = u16::from_be_bytes([src[2], src[3]]) as usize;

        if src.len() < OPC_HEADER_LEN + length {
            // Reserve up front so the next read can complete the message.
            src.reserve(OPC_HEADER_LEN + length - src.len());
            return Ok(None);
        }

        src.advance(OPC_HEADER_LEN);
        let data = src.split_to(length).freeze();

        Ok(Some(OpcMessage::new(channel, command, data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opc::CMD_SET_PIXELS;

    fn decode_all(codec: &mut OpcCodec, buf: &mut BytesMut) -> Vec<OpcMessage> {
        let mut out = Vec::new();
        while let Some(msg) = codec.decode(buf).unwrap() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn incomplete_header_yields_nothing() {
        let mut codec = OpcCodec;
        let mut buf = BytesMut::from(&[0u8, 0, 0][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 3);
    }

    #[test]
    fn incomplete_payload_yields_nothing() {
        let mut codec = OpcCodec;
        // channel 1, command 0, length 6, but only 2 payload bytes so far
        let mut buf = BytesMut::from(&[1u8, 0, 0, 6, 0xFF, 0x00][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&[0x00, 0x00, 0xFF, 0x00]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.channel, 1);
        assert_eq!(msg.command, CMD_SET_PIXELS);
        assert_eq!(&msg.data[..], &[0xFF, 0x00, 0x00, 0x00, 0xFF, 0x00]);
        assert!(buf.is_empty());
    }

    #[test]
    fn multiple_messages_in_one_read() {
        let mut codec = OpcCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0, 3, 1, 2, 3]);
        buf.extend_from_slice(&[2, 0, 0, 0]); // zero-length payload
        buf.extend_from_slice(&[5, 0xFF, 0, 1, 9]); // unknown command

        let msgs = decode_all(&mut codec, &mut buf);
        assert_eq!(msgs.len(), 3);
        assert_eq!(msgs[0].channel, 0);
        assert_eq!(&msgs[0].data[..], &[1, 2, 3]);
        assert_eq!(msgs[1].channel, 2);
        assert!(msgs[1].data.is_empty());
        assert_eq!(msgs[2].command, 0xFF);
        assert_eq!(&msgs[2].data[..], &[9]);
    }

    #[test]
    fn max_length_payload() {
        let mut codec = OpcCodec;
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&[0, 0, 0xFF, 0xFF]);
        buf.extend_from_slice(&vec![0xAB; 65535]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg.data.len(), 65535);
        assert!(buf.is_empty());
    }
}
