//! Splitting outgoing messages into frames (RFC 6455 Section 5.4).

use bytes::Bytes;

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing message.
///
/// The first frame carries the message opcode, the rest are continuations,
/// and only the last has FIN set. Fragments share the payload buffer.
#[derive(Debug)]
pub struct MessageFragmenter {
    payload: Bytes,
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    started: bool,
}

impl MessageFragmenter {
    /// Fragment `payload` into frames of at most `fragment_size` bytes.
    #[must_use]
    pub fn new(payload: impl Into<Bytes>, opcode: OpCode, fragment_size: usize) -> Self {
        Self {
            payload: payload.into(),
            opcode,
            fragment_size: fragment_size.max(1),
            offset: 0,
            started: false,
        }
    }

    #[inline]
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }

    /// Payload bytes not yet handed out.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }
}

impl Iterator for MessageFragmenter {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        // An empty message is still one frame.
        if self.started && self.offset >= self.payload.len() {
            return None;
        }

        let end = self.payload.len().min(self.offset + self.fragment_size);
        let chunk = self.payload.slice(self.offset..end);
        self.offset = end;

        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.started = true;
            self.opcode
        };

        Some(Frame::new(end == self.payload.len(), opcode, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let mut frames = self.remaining().div_ceil(self.fragment_size);
        if !self.started {
            frames = frames.max(1);
        }
        (frames, Some(frames))
    }
}

impl ExactSizeIterator for MessageFragmenter {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_message_is_one_frame() {
        let fragmenter = MessageFragmenter::new("Hello", OpCode::Text, 1024);
        assert!(!fragmenter.needs_fragmentation());

        let frames: Vec<_> = fragmenter.collect();
        assert_eq!(frames, vec![Frame::text("Hello")]);
    }

    #[test]
    fn test_uneven_split() {
        let frames: Vec<_> = MessageFragmenter::new(vec![0xCDu8; 25], OpCode::Binary, 10).collect();

        let shape: Vec<_> = frames
            .iter()
            .map(|f| (f.fin, f.opcode, f.payload().len()))
            .collect();
        assert_eq!(
            shape,
            vec![
                (false, OpCode::Binary, 10),
                (false, OpCode::Continuation, 10),
                (true, OpCode::Continuation, 5),
            ]
        );
    }

    #[test]
    fn test_payload_equal_to_fragment_size() {
        let fragmenter = MessageFragmenter::new(vec![0xEFu8; 100], OpCode::Binary, 100);
        assert!(!fragmenter.needs_fragmentation());
        assert_eq!(fragmenter.count(), 1);
    }

    #[test]
    fn test_empty_payload() {
        let frames: Vec<_> = MessageFragmenter::new(Bytes::new(), OpCode::Text, 16).collect();
        assert_eq!(frames.len(), 1);
        assert!(frames[0].fin);
        assert_eq!(frames[0].opcode, OpCode::Text);
        assert!(frames[0].payload().is_empty());
    }

    #[test]
    fn test_remaining() {
        let mut fragmenter = MessageFragmenter::new(vec![0xABu8; 30], OpCode::Binary, 10);
        assert_eq!(fragmenter.remaining(), 30);
        fragmenter.next();
        assert_eq!(fragmenter.remaining(), 20);
        fragmenter.by_ref().for_each(drop);
        assert_eq!(fragmenter.remaining(), 0);
    }

    #[test]
    fn test_len_tracks_frames_left() {
        let mut fragmenter = MessageFragmenter::new(vec![0x11u8; 25], OpCode::Binary, 10);
        assert_eq!(fragmenter.len(), 3);
        fragmenter.next();
        assert_eq!(fragmenter.len(), 2);
        fragmenter.by_ref().for_each(drop);
        assert_eq!(fragmenter.len(), 0);

        let empty = MessageFragmenter::new(Bytes::new(), OpCode::Text, 10);
        assert_eq!(empty.len(), 1);
    }

    #[test]
    fn test_zero_fragment_size_is_clamped() {
        assert_eq!(MessageFragmenter::new("abc", OpCode::Text, 0).count(), 3);
    }
}
