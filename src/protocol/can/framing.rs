/// Byte-stream <-> CAN frame conversion
///
/// Outbound command bytes are cut into consecutive frames of at most eight
/// bytes, all addressed to the same identifier. Inbound frames are only
/// accepted when they carry the controller's own identifier; everything else
/// on the bus belongs to some other conversation and is dropped.
use anyhow::Result;

use super::CanFrame;

/// Maximum payload of a classic CAN frame.
pub const MAX_FRAME_PAYLOAD: usize = 8;

/// Split `data` into frames addressed to `id`.
///
/// An empty payload produces no frames.
pub fn split_into_frames(id: u32, data: &[u8]) -> Result<Vec<CanFrame>> {
    data.chunks(MAX_FRAME_PAYLOAD)
        .map(|chunk| CanFrame::new(id, chunk))
        .collect()
}

/// Accepts inbound frames addressed to one identifier.
#[derive(Debug, Clone, Copy)]
pub struct InboundFilter {
    own_id: u32,
}

impl InboundFilter {
    pub fn new(own_id: u32) -> Self {
        Self { own_id }
    }

    /// Returns the payload when the frame is for us, `None` otherwise.
    pub fn accept<'a>(&self, frame: &'a CanFrame) -> Option<&'a [u8]> {
        if frame.id() == self.own_id {
            Some(frame.payload())
        } else {
            log::trace!("Ignoring frame for foreign id: {frame}");
            None
        }
    }

    /// Feed every byte of an accepted frame to `on_byte`, in order.
    ///
    /// Returns the number of bytes delivered.
    pub fn deliver(&self, frame: &CanFrame, mut on_byte: impl FnMut(u8)) -> usize {
        match self.accept(frame) {
            Some(payload) => {
                for &byte in payload {
                    on_byte(byte);
                }
                payload.len()
            }
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_respects_frame_limit() {
        let data: Vec<u8> = (0..19).collect();
        let frames = split_into_frames(0x02, &data).unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].payload().len(), 8);
        assert_eq!(frames[1].payload().len(), 8);
        assert_eq!(frames[2].payload(), &[16, 17, 18]);
        assert!(frames.iter().all(|f| f.id() == 0x02));

        let joined: Vec<u8> = frames.iter().flat_map(|f| f.payload().to_vec()).collect();
        assert_eq!(joined, data);
    }

    #[test]
    fn test_split_empty_payload() {
        assert!(split_into_frames(0x02, &[]).unwrap().is_empty());
    }

    #[test]
    fn test_filter_drops_foreign_frames() {
        let filter = InboundFilter::new(0x01);
        let ours = CanFrame::new(0x01, &[1, 2, 3]).unwrap();
        let theirs = CanFrame::new(0x05, &[9, 9]).unwrap();

        let mut received = Vec::new();
        assert_eq!(filter.deliver(&ours, |b| received.push(b)), 3);
        assert_eq!(filter.deliver(&theirs, |b| received.push(b)), 0);
        assert_eq!(received, vec![1, 2, 3]);
    }
}
