use serde::{Deserialize, Serialize};

use helix_core::constants::MAX_SINGLE_FRAME_BYTES;

use crate::error::P2pError;

/// One chunk of a frame-split message (§6). An encoded `WireMessage` above
/// `MAX_SINGLE_FRAME_BYTES` is split into a sequence of chunks carrying a
/// monotonically increasing `seq` and the total chunk count; the receiver
/// reassembles all of them before attempting `WireMessage::from_bytes`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FrameChunk {
    pub seq: u32,
    pub total: u32,
    /// Reserved for an LZ4-compressed body. Always `false`: no compression
    /// crate is part of the dependency stack, so chunks are carried
    /// uncompressed while still round-tripping through this field.
    pub compressed: bool,
    pub data: Vec<u8>,
}

/// Split an encoded message into frame chunks, one chunk if it already fits.
pub fn split(bytes: &[u8]) -> Vec<FrameChunk> {
    if bytes.len() <= MAX_SINGLE_FRAME_BYTES {
        return vec![FrameChunk {
            seq: 0,
            total: 1,
            compressed: false,
            data: bytes.to_vec(),
        }];
    }
    let parts: Vec<&[u8]> = bytes.chunks(MAX_SINGLE_FRAME_BYTES).collect();
    let total = parts.len() as u32;
    parts
        .into_iter()
        .enumerate()
        .map(|(i, data)| FrameChunk {
            seq: i as u32,
            total,
            compressed: false,
            data: data.to_vec(),
        })
        .collect()
}

/// Reassembles frame chunks for one in-flight multi-frame message. One
/// instance is kept per `(peer, sequence)` by the caller.
pub struct Reassembler {
    total: u32,
    parts: Vec<Option<Vec<u8>>>,
}

impl Reassembler {
    pub fn new(total: u32) -> Self {
        Self {
            total,
            parts: vec![None; total as usize],
        }
    }

    /// Absorbs one chunk. Returns the fully reassembled bytes once every
    /// chunk in the sequence has arrived.
    pub fn push(&mut self, chunk: FrameChunk) -> Result<Option<Vec<u8>>, P2pError> {
        if chunk.total != self.total || chunk.seq >= self.total {
            return Err(P2pError::MalformedFrame);
        }
        self.parts[chunk.seq as usize] = Some(chunk.data);
        if self.parts.iter().all(Option::is_some) {
            let mut out = Vec::new();
            for part in self.parts.iter_mut() {
                out.extend(part.take().unwrap());
            }
            Ok(Some(out))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_small_message_is_a_single_chunk() {
        let chunks = split(b"hello");
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].total, 1);
    }

    #[test]
    fn an_oversized_message_splits_and_reassembles() {
        let bytes: Vec<u8> = (0..(MAX_SINGLE_FRAME_BYTES * 2 + 17))
            .map(|i| (i % 251) as u8)
            .collect();
        let chunks = split(&bytes);
        assert!(chunks.len() > 1);
        let total = chunks[0].total;
        let mut reassembler = Reassembler::new(total);
        let mut result = None;
        for chunk in chunks {
            result = reassembler.push(chunk).unwrap();
        }
        assert_eq!(result.unwrap(), bytes);
    }

    #[test]
    fn a_chunk_with_mismatched_total_is_rejected() {
        let mut reassembler = Reassembler::new(2);
        let bad = FrameChunk { seq: 0, total: 3, compressed: false, data: vec![] };
        assert!(matches!(reassembler.push(bad), Err(P2pError::MalformedFrame)));
    }
}
