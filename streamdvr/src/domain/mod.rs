//! Domain types shared by every component.

pub mod streamer;

pub use streamer::{CaptureId, Streamer, StreamerRef, StreamerState};
