//! Core pipeline building blocks: scaler, feature derivation, batch inference
//! and the block streamer. These are internal primitives consumed by the
//! high-level `api` module.
pub mod features;
pub mod inference;
pub mod params;
pub mod scaler;
pub mod streamer;
