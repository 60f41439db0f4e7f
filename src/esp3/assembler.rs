//! Incremental ESP3 frame assembler.
//!
//! Fed arbitrary chunks from the serial link, it yields whole packets as they
//! complete. Bytes before a sync marker are discarded. Once 4 bytes of a frame
//! are buffered the total length is known; at 6 bytes the header checksum is
//! verified. A frame that fails its header check, fails to decode, or fails its
//! payload check is reported and the bytes after its sync byte are rescanned,
//! so a new frame that started inside a broken one is still recovered.
use std::collections::VecDeque;

use bytes::{BufMut, BytesMut};

use super::crc::checksum;
use super::packet::{length_from_header, Packet, HEADER_LEN, SYNC_BYTE};
use crate::error::FramingError;

#[derive(Debug)]
pub struct FrameAssembler {
    buf: BytesMut,
    expected: Option<usize>,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(512),
            expected: None,
        }
    }

    /// Push bytes, returning every frame that completed (valid or not).
    pub fn push(&mut self, input: &[u8]) -> Vec<Result<Packet, FramingError>> {
        let mut out = Vec::new();
        let mut pending: VecDeque<u8> = input.iter().copied().collect();
        while let Some(byte) = pending.pop_front() {
            if let Some(replay) = self.step(byte, &mut out) {
                for &b in replay.iter().rev() {
                    pending.push_front(b);
                }
            }
        }
        out
    }

    /// Bytes of the frame currently being assembled.
    pub fn buffered_len(&self) -> usize {
        self.buf.len()
    }

    /// Total length of the frame in progress, once its header is in.
    pub fn expected_len(&self) -> Option<usize> {
        self.expected
    }

    pub fn clear(&mut self) {
        self.buf.clear();
        self.expected = None;
    }

    fn step(
        &mut self,
        byte: u8,
        out: &mut Vec<Result<Packet, FramingError>>,
    ) -> Option<Vec<u8>> {
        if self.buf.is_empty() {
            if byte == SYNC_BYTE {
                self.buf.put_u8(byte);
            }
            return None;
        }

        self.buf.put_u8(byte);
        if self.buf.len() == 4 {
            self.expected = length_from_header(&self.buf);
        }

        if self.buf.len() == HEADER_LEN {
            let computed = checksum(&self.buf[1..5]);
            let received = self.buf[5];
            if computed != received {
                out.push(Err(FramingError::HeaderChecksum { computed, received }));
                return Some(self.take_for_replay());
            }
        }

        if self.expected == Some(self.buf.len()) {
            let frame = self.buf.split().freeze();
            self.expected = None;
            match Packet::decode(&frame).and_then(|p| p.validate().map(|_| p)) {
                Ok(packet) => out.push(Ok(packet)),
                Err(e) => {
                    out.push(Err(e));
                    return Some(frame[1..].to_vec());
                }
            }
        }
        None
    }

    fn take_for_replay(&mut self) -> Vec<u8> {
        let rest = self.buf[1..].to_vec();
        self.clear();
        rest
    }
}
