// --- Файл: src/layers/channel_shift.rs ---

//! Сдвиг одного канала на случайную величину (тонирование).

use crate::augmentation::{Augmentation, Transformation};
use crate::error::{AugmentError, Result};
use crate::inputs::{Inputs, IMAGES};
use crate::sampler::FactorSampler;
use crate::value_range::CANONICAL_RANGE;
use ndarray::{ArrayD, ArrayViewMutD, Axis};
use rand::RngCore;

/// Прибавляет фактор к одному каналу изображения и обрезает результат до
/// канонического диапазона. Остальные каналы не меняются.
///
/// # Пример
/// ```ignore
/// // Синий оттенок: канал 2 сдвигается на величину из [0, 64)
/// let tint = ChannelShift::new(FactorSampler::uniform(0.0, 64.0)?)?.with_channel(2);
/// ```
#[derive(Debug, Clone)]
pub struct ChannelShift {
    /// Индекс канала, `None` означает последний
    channel: Option<usize>,
    factor: FactorSampler,
}

impl ChannelShift {
    /// Создает слой. Параметры сэмплера проверяются здесь, а не при первом вызове.
    pub fn new(factor: FactorSampler) -> Result<Self> {
        factor.validate()?;
        Ok(Self {
            channel: None,
            factor,
        })
    }

    pub fn with_channel(mut self, channel: usize) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn factor(&self) -> &FactorSampler {
        &self.factor
    }

    fn shift_of(&self, transformation: &Transformation) -> Result<f32> {
        match transformation {
            Transformation::Scalar(k) => Ok(*k),
            Transformation::Identity => Ok(0.0),
            other => Err(other.mismatch(self.name())),
        }
    }

    fn channel_index(&self, channels: usize) -> Result<usize> {
        let channel = self.channel.unwrap_or(channels.saturating_sub(1));
        if channel >= channels {
            return Err(AugmentError::shape(
                IMAGES,
                format!("more than {} channels", channel),
                channels,
            ));
        }
        Ok(channel)
    }

    /// Сдвигает канал у изображения `H x W x C` на месте.
    fn shift_in_place(&self, mut image: ArrayViewMutD<'_, f32>, shift: f32) -> Result<()> {
        let channel_axis = image
            .ndim()
            .checked_sub(1)
            .ok_or_else(|| AugmentError::shape(IMAGES, "at least one axis", image.shape()))?;
        let channel = self.channel_index(image.shape()[channel_axis])?;
        image
            .index_axis_mut(Axis(channel_axis), channel)
            .mapv_inplace(|x| CANONICAL_RANGE.clip(x + shift));
        Ok(())
    }
}

impl Augmentation for ChannelShift {
    fn name(&self) -> &str {
        "channel_shift"
    }

    fn random_transformation(
        &self,
        _sample: &Inputs,
        rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        Ok(Transformation::Scalar(self.factor.draw(rng)?))
    }

    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        let shift = self.shift_of(transformation)?;
        let mut output = image.clone();
        self.shift_in_place(output.view_mut(), shift)?;
        Ok(output)
    }

    fn augment_batch(
        &self,
        batch: &Inputs,
        transformations: &[Transformation],
    ) -> Option<Result<Inputs>> {
        let run = || -> Result<Inputs> {
            if transformations.len() != batch.batch_size() {
                return Err(AugmentError::shape(
                    "transformations",
                    batch.batch_size(),
                    transformations.len(),
                ));
            }
            let mut images = batch.images.clone();
            for (sample, transformation) in images.axis_iter_mut(Axis(0)).zip(transformations) {
                self.shift_in_place(sample, self.shift_of(transformation)?)?;
            }
            Ok(Inputs {
                images,
                ..batch.clone()
            })
        };
        Some(run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn image() -> ArrayD<f32> {
        ArrayD::from_shape_vec(
            IxDyn(&[2, 2, 3]),
            vec![
                0.0, 10.0, 200.0, 1.0, 11.0, 250.0, 2.0, 12.0, 100.0, 3.0, 13.0, 0.0,
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_shifts_last_channel_and_clips() {
        let layer = ChannelShift::new(FactorSampler::constant(20.0).unwrap()).unwrap();
        let input = image();
        let output = layer
            .augment_image(&input, &Transformation::Scalar(20.0))
            .unwrap();

        assert_eq!(output[[0, 0, 2]], 220.0);
        assert_eq!(output[[0, 1, 2]], 255.0);
        assert_eq!(output[[1, 1, 2]], 20.0);
        assert_eq!(output[[1, 0, 0]], 2.0);
        assert_eq!(output[[1, 0, 1]], 12.0);
        // Вход не изменен
        assert_eq!(input, image());
    }

    #[test]
    fn test_rejects_unvalidated_sampler() {
        let degenerate = FactorSampler::Uniform {
            low: 5.0,
            high: 5.0,
        };
        assert!(matches!(
            ChannelShift::new(degenerate),
            Err(AugmentError::Configuration(_))
        ));

        let too_wide = FactorSampler::Uniform {
            low: -3e38,
            high: 3e38,
        };
        assert!(matches!(
            ChannelShift::new(too_wide),
            Err(AugmentError::Configuration(_))
        ));
    }

    #[test]
    fn test_explicit_channel() {
        let layer = ChannelShift::new(FactorSampler::default()).unwrap().with_channel(0);
        let output = layer
            .augment_image(&image(), &Transformation::Scalar(-5.0))
            .unwrap();

        assert_eq!(output[[0, 0, 0]], 0.0);
        assert_eq!(output[[1, 1, 0]], 0.0);
        assert_eq!(output[[0, 0, 2]], 200.0);
    }

    #[test]
    fn test_rejects_missing_channel() {
        let layer = ChannelShift::new(FactorSampler::default()).unwrap().with_channel(5);
        assert!(matches!(
            layer.augment_image(&image(), &Transformation::Scalar(1.0)),
            Err(AugmentError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_wrong_transformation() {
        let layer = ChannelShift::new(FactorSampler::default()).unwrap();
        assert!(matches!(
            layer.augment_image(&image(), &Transformation::Flag(true)),
            Err(AugmentError::InvalidTransformation { .. })
        ));
    }

    #[test]
    fn test_random_transformation_uses_sampler() {
        let layer = ChannelShift::new(FactorSampler::uniform(10.0, 20.0).unwrap()).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let sample = Inputs::new(image());
        for _ in 0..20 {
            match layer.random_transformation(&sample, &mut rng).unwrap() {
                Transformation::Scalar(k) => assert!((10.0..20.0).contains(&k)),
                other => panic!("unexpected transformation {:?}", other),
            }
        }
    }

    #[test]
    fn test_batch_fast_path_uses_per_sample_shift() {
        let layer = ChannelShift::new(FactorSampler::default()).unwrap();
        let views = [image(), image()];
        let views: Vec<_> = views.iter().map(|a| a.view()).collect();
        let batch = Inputs::new(ndarray::stack(Axis(0), &views).unwrap());
        let transformations = [Transformation::Scalar(1.0), Transformation::Scalar(2.0)];

        let output = layer
            .augment_batch(&batch, &transformations)
            .unwrap()
            .unwrap();
        assert_eq!(output.images[[0, 0, 0, 2]], 201.0);
        assert_eq!(output.images[[1, 0, 0, 2]], 202.0);
        assert_eq!(output.images[[1, 0, 0, 1]], 10.0);
    }
}
