//! Protocol implementations.
//!
//! - [`JsonEnvelopeProtocol`]: `{"t", "d", "v"}` JSON envelopes with configurable field names

mod json;

pub use json::{JsonEnvelopeConfig, JsonEnvelopeProtocol};
