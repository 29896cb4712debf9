//! Sequence-ordered egress
//!
//! Local and remote results reach the processed channel in no particular
//! order. `Reorder` holds a few of them and always hands out the lowest
//! sequence, never one older than a frame already handed out.

use std::collections::BTreeMap;

use flume::Receiver;

use crate::frame::Frame;

#[derive(Debug, Default)]
pub struct Reorder {
    pending: BTreeMap<u64, Frame>,
    last_delivered: Option<u64>,
    stale: u64,
}

impl Reorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `frame`, discarding it if its sequence has already been passed.
    pub fn push(&mut self, frame: Frame) {
        let sequence = frame.sequence();
        if self.last_delivered.is_some_and(|last| sequence <= last) {
            self.stale += 1;
            metrics::counter!("frameflow_egress_stale_frames_total").increment(1);
            return;
        }
        self.pending.insert(sequence, frame);
    }

    /// Move ready frames from `rx` without blocking, holding at most `limit`.
    pub fn absorb(&mut self, rx: &Receiver<Frame>, limit: usize) {
        while self.pending.len() < limit {
            match rx.try_recv() {
                Ok(frame) => self.push(frame),
                Err(_) => break,
            }
        }
    }

    /// Lowest pending sequence
    pub fn pop(&mut self) -> Option<Frame> {
        let (sequence, frame) = self.pending.pop_first()?;
        self.last_delivered = Some(sequence);
        Some(frame)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Frames discarded for arriving behind the delivered sequence
    pub fn stale(&self) -> u64 {
        self.stale
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;
    use proptest::prelude::*;

    fn frame(seq: u64) -> Frame {
        Frame::new(1, 1, PixelFormat::Gray8, vec![0]).unwrap().with_sequence(seq)
    }

    #[test]
    fn test_pops_lowest_first() {
        let mut reorder = Reorder::new();
        reorder.push(frame(3));
        reorder.push(frame(1));
        reorder.push(frame(2));

        assert_eq!(reorder.pop().unwrap().sequence(), 1);
        assert_eq!(reorder.pop().unwrap().sequence(), 2);
        assert_eq!(reorder.pop().unwrap().sequence(), 3);
        assert!(reorder.pop().is_none());
    }

    #[test]
    fn test_late_frames_are_stale() {
        let mut reorder = Reorder::new();
        reorder.push(frame(5));
        assert_eq!(reorder.pop().unwrap().sequence(), 5);

        reorder.push(frame(4));
        reorder.push(frame(5));
        assert!(reorder.is_empty());
        assert_eq!(reorder.stale(), 2);
    }

    #[test]
    fn test_absorb_respects_limit() {
        let (tx, rx) = flume::unbounded();
        for seq in 1..=5 {
            tx.send(frame(seq)).unwrap();
        }

        let mut reorder = Reorder::new();
        reorder.absorb(&rx, 2);
        assert_eq!(reorder.len(), 2);
        assert_eq!(rx.len(), 3);
    }

    proptest! {
        #[test]
        fn test_delivery_strictly_increasing(
            ops in prop::collection::vec(prop_oneof![(1u64..50).prop_map(Some), Just(None)], 1..100)
        ) {
            let mut reorder = Reorder::new();
            let mut delivered = Vec::new();
            for op in ops {
                match op {
                    Some(seq) => reorder.push(frame(seq)),
                    None => delivered.extend(reorder.pop().map(|f| f.sequence())),
                }
            }
            while let Some(f) = reorder.pop() {
                delivered.push(f.sequence());
            }
            prop_assert!(delivered.windows(2).all(|w| w[0] < w[1]));
        }
    }
}
