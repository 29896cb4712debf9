//! Stage/pipeline engine
//!
//! Each stage runs on its own thread and talks to its neighbours through
//! bounded channels. Pushes never block: a full channel sheds the frame.

pub mod chain;
pub mod channel;
pub mod stage;

pub use chain::Pipeline;
pub use channel::{FrameChannel, Offer, DEFAULT_CAPACITY};
pub use stage::{Stage, StageStats};
