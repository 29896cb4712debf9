//! Bounded frame hand-off between two pipeline parties

use flume::{Receiver, Sender, TrySendError};

use crate::frame::Frame;

/// Default channel capacity between stages
pub const DEFAULT_CAPACITY: usize = 2;

/// Outcome of a non-blocking push
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Offer {
    Accepted,
    /// Channel at capacity, frame discarded
    Dropped,
    /// No receiver left, frame discarded
    Closed,
}

/// Bounded FIFO of frames. Both ends are kept together so the pipeline can
/// hand out either end when it rewires stages.
#[derive(Clone)]
pub struct FrameChannel {
    tx: Sender<Frame>,
    rx: Receiver<Frame>,
    capacity: usize,
}

impl FrameChannel {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = flume::bounded(capacity);
        Self { tx, rx, capacity }
    }

    pub fn sender(&self) -> &Sender<Frame> {
        &self.tx
    }

    pub fn receiver(&self) -> &Receiver<Frame> {
        &self.rx
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Drop-if-full push
    pub fn offer(&self, frame: Frame) -> Offer {
        offer(&self.tx, frame)
    }

    /// Discard everything queued; returns how many frames were dropped.
    pub fn clear(&self) -> usize {
        self.rx.drain().count()
    }

    /// Identity comparison, not content comparison.
    pub fn same_channel(&self, other: &FrameChannel) -> bool {
        self.tx.same_channel(&other.tx)
    }
}

/// Drop-if-full push onto any frame sender
pub fn offer(tx: &Sender<Frame>, frame: Frame) -> Offer {
    match tx.try_send(frame) {
        Ok(()) => Offer::Accepted,
        Err(TrySendError::Full(_)) => Offer::Dropped,
        Err(TrySendError::Disconnected(_)) => Offer::Closed,
    }
}

impl std::fmt::Debug for FrameChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameChannel")
            .field("len", &self.len())
            .field("capacity", &self.capacity)
            .finish()
    }
}
