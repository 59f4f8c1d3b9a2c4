//! Badge reader
//!
//! Badge readers present themselves as USB keyboards: a scan "types" the
//! badge identifier followed by Enter. There is no framing beyond the
//! terminating key, so scans are delimited with an inter-key timeout.
//!
//! # Example
//!
//! ```ignore
//! use authbox::badge::BadgeReader;
//!
//! let reader = BadgeReader::open(&config.badge_reader)?;
//! reader.spawn(events_tx)?;
//! ```

mod decoder;
pub mod keymap;
mod reader;

pub use decoder::BadgeDecoder;
pub use reader::{decode_scans, BadgeReader};
