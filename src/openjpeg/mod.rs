//! Streaming JPEG 2000 decode pipeline over libopenjp2.

pub mod jp2;
pub mod stream;

pub use jp2::{reduction_factor, Jp2Decoder};
pub use stream::registered_sources;
