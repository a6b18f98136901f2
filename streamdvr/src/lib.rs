//! StreamDVR: tracks streamers across sites and supervises their recorders.
//!
//! Each [`site::Site`] polls its streamers in batches, starts an external
//! recorder for every online streamer, watches the growing recording and
//! hands finished recordings to a post-processing queue shared by all sites.

pub mod capture;
pub mod config;
pub mod domain;
pub mod dvr;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod pipeline;
pub mod scheduler;
pub mod site;
pub mod streamer;
pub mod utils;

pub use dvr::Dvr;
pub use error::{Error, Result};
