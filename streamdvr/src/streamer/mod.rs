//! Streamer registry.
//!
//! The registry is the single in-memory source of truth for streamer state
//! within a site.

mod registry;

pub use registry::StreamerRegistry;
