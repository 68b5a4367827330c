// --- Файл: src/layers/mod.rs ---

//! # Augmentation Layers
//!
//! Concrete [`Augmentation`](crate::augmentation::Augmentation) implementations.
//!
//! ## Available Layers
//!
//! ### Photometric
//! - [`ChannelShift`]: Adds a sampled factor to one channel (tinting)
//!
//! ### Geometric
//! - [`RandomFlip`]: Horizontal/vertical flip applied to images and bounding boxes
//!
//! ### Composition
//! - [`Pipeline`]: Applies layers in order
//! - [`RandomChoice`]: Applies N randomly chosen layers per sample

pub mod channel_shift;
pub mod pipeline;
pub mod random_flip;

pub use channel_shift::ChannelShift;
pub use pipeline::{Pipeline, RandomChoice};
pub use random_flip::{FlipMode, RandomFlip};
