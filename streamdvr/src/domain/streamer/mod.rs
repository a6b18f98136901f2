//! Streamer record and its state machine.

mod entity;
mod state;

pub use entity::{CaptureId, Streamer, StreamerRef};
pub use state::StreamerState;
