//! # vecaug: per-sample to batch augmentation dispatcher
//!
//! **vecaug** applies data-augmentation layers written for a single sample to
//! single samples and to whole batches alike. A layer describes what happens to
//! one sample; the [`BatchDispatcher`] decides how a batch is processed
//! (one batched fast-path call or a per-sample loop), draws one random
//! [`Transformation`] per sample and rescales pixel data between the caller's
//! value range and the canonical `[0, 255]` range the layers work in.
//!
//! ## Usage Example
//!
//! ```no_run
//! use ndarray::{ArrayD, IxDyn};
//! use vecaug::{AugmentationConfig, BatchDispatcher, ChannelShift, FactorSampler, Inputs};
//!
//! # fn main() -> vecaug::Result<()> {
//! // 1. Immutable configuration
//! let config = AugmentationConfig { seed: Some(42), ..AugmentationConfig::default() };
//!
//! // 2. A per-sample layer: shift the last channel by a value in [0, 64)
//! let tint = ChannelShift::new(FactorSampler::uniform(0.0, 64.0)?)?;
//! let dispatcher = BatchDispatcher::new(tint, &config)?;
//!
//! // 3. Batch of 8 RGB images 32x32 (leading batch axis)
//! let batch = Inputs::new(ArrayD::zeros(IxDyn(&[8, 32, 32, 3])));
//! let augmented = dispatcher.process(&batch)?;
//! assert_eq!(augmented.images.shape(), &[8, 32, 32, 3]);
//! # Ok(())
//! # }
//! ```

pub mod augmentation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod inputs;
pub mod layers;
pub mod sampler;
pub mod value_range;

pub use augmentation::{Augmentation, Transformation};
pub use config::{AugmentationConfig, LayerSpec};
pub use dispatcher::{BatchDispatcher, ExecutionPath};
pub use error::{AugmentError, Result};
pub use inputs::{Inputs, Layout};
pub use layers::{ChannelShift, FlipMode, Pipeline, RandomChoice, RandomFlip};
pub use sampler::FactorSampler;
pub use value_range::{transform_value_range, ValueRange, ValueRangeNormalizer, CANONICAL_RANGE};
