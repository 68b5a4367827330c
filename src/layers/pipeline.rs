// --- Файл: src/layers/pipeline.rs ---

//! Композиции слоев: последовательная и со случайным выбором.

use crate::augmentation::{augment_each, Augmentation, Transformation};
use crate::error::{AugmentError, Result};
use crate::inputs::Inputs;
use ndarray::ArrayD;
use rand::{Rng, RngCore};

/// Последовательная композиция слоев.
///
/// Преобразования всех дочерних слоев выбираются по исходному образцу, затем
/// слои применяются по порядку.
pub struct Pipeline {
    layers: Vec<Box<dyn Augmentation>>,
}

impl Pipeline {
    /// Создает пустую композицию.
    pub fn new() -> Self {
        Self { layers: Vec::new() }
    }

    pub fn from_layers(layers: Vec<Box<dyn Augmentation>>) -> Self {
        Self { layers }
    }

    /// Добавляет слой в конец.
    pub fn add<T: Augmentation + 'static>(mut self, layer: T) -> Self {
        self.layers.push(Box::new(layer));
        self
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    fn children<'t>(&self, transformation: &'t Transformation) -> Result<&'t [Transformation]> {
        match transformation {
            Transformation::Sequence(ts) if ts.len() == self.layers.len() => Ok(ts),
            other => Err(other.mismatch(self.name())),
        }
    }

    /// Преобразования `i`-го слоя для каждого образца батча.
    fn column(&self, transformations: &[Transformation], i: usize) -> Result<Vec<Transformation>> {
        transformations
            .iter()
            .map(|t| self.children(t).map(|ts| ts[i].clone()))
            .collect()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Augmentation for Pipeline {
    fn name(&self) -> &str {
        "pipeline"
    }

    fn random_transformation(
        &self,
        sample: &Inputs,
        rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        self.layers
            .iter()
            .map(|layer| layer.random_transformation(sample, rng))
            .collect::<Result<Vec<_>>>()
            .map(Transformation::Sequence)
    }

    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        let ts = self.children(transformation)?;
        let mut image = image.clone();
        for (layer, t) in self.layers.iter().zip(ts) {
            image = layer.augment_image(&image, t)?;
        }
        Ok(image)
    }

    fn augment_label(
        &self,
        label: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        let ts = self.children(transformation)?;
        let mut label = label.clone();
        for (layer, t) in self.layers.iter().zip(ts) {
            label = layer.augment_label(&label, t)?;
        }
        Ok(label)
    }

    fn augment_bounding_boxes(
        &self,
        boxes: &ArrayD<f32>,
        transformation: &Transformation,
        image_shape: &[usize],
    ) -> Result<ArrayD<f32>> {
        let ts = self.children(transformation)?;
        let mut boxes = boxes.clone();
        for (layer, t) in self.layers.iter().zip(ts) {
            boxes = layer.augment_bounding_boxes(&boxes, t, image_shape)?;
        }
        Ok(boxes)
    }

    fn batch_correlated(&self) -> bool {
        self.layers.iter().any(|layer| layer.batch_correlated())
    }

    /// Каждый слой получает весь батч: через свой быстрый путь, если он есть,
    /// иначе поэлементно.
    fn augment_batch(
        &self,
        batch: &Inputs,
        transformations: &[Transformation],
    ) -> Option<Result<Inputs>> {
        let run = || -> Result<Inputs> {
            let mut batch = batch.clone();
            for (i, layer) in self.layers.iter().enumerate() {
                let column = self.column(transformations, i)?;
                batch = match layer.augment_batch(&batch, &column) {
                    Some(result) => result?,
                    None => augment_each(layer, &batch, &column)?,
                };
            }
            Ok(batch)
        };
        Some(run())
    }

    fn augment_sample(&self, sample: &Inputs, transformation: &Transformation) -> Result<Inputs> {
        let ts = self.children(transformation)?;
        let mut sample = sample.clone();
        for (layer, t) in self.layers.iter().zip(ts) {
            sample = layer.augment_sample(&sample, t)?;
        }
        Ok(sample)
    }
}

/// Применяет к каждому образцу `layers_per_sample` случайно выбранных слоев
/// (с повторениями), каждый с вероятностью `rate`.
pub struct RandomChoice {
    layers: Vec<Box<dyn Augmentation>>,
    layers_per_sample: usize,
    rate: f32,
}

impl RandomChoice {
    pub fn new(layers: Vec<Box<dyn Augmentation>>, layers_per_sample: usize) -> Result<Self> {
        if layers.is_empty() {
            return Err(AugmentError::config(
                "random choice requires at least one layer",
            ));
        }
        Ok(Self {
            layers,
            layers_per_sample,
            rate: 1.0,
        })
    }

    /// Вероятность применения каждого выбранного слоя, в [0, 1].
    pub fn with_rate(mut self, rate: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(AugmentError::config(format!(
                "random choice rate must be in [0, 1], got {}",
                rate
            )));
        }
        self.rate = rate;
        Ok(self)
    }

    pub fn layers_per_sample(&self) -> usize {
        self.layers_per_sample
    }

    fn steps<'t>(&self, transformation: &'t Transformation) -> Result<&'t [Transformation]> {
        match transformation {
            Transformation::Sequence(ts) => Ok(ts),
            other => Err(other.mismatch(self.name())),
        }
    }

    /// Выбранный слой шага или `None` для пропущенного шага.
    fn resolve<'t>(
        &self,
        step: &'t Transformation,
    ) -> Result<Option<(&dyn Augmentation, &'t Transformation)>> {
        match step {
            Transformation::Identity => Ok(None),
            Transformation::Choice { index, inner } => self
                .layers
                .get(*index)
                .map(|layer| Some((layer.as_ref(), inner.as_ref())))
                .ok_or_else(|| step.mismatch(self.name())),
            other => Err(other.mismatch(self.name())),
        }
    }

    fn fold<T, F>(&self, init: T, transformation: &Transformation, mut f: F) -> Result<T>
    where
        F: FnMut(&dyn Augmentation, &T, &Transformation) -> Result<T>,
    {
        let mut acc = init;
        for step in self.steps(transformation)? {
            if let Some((layer, t)) = self.resolve(step)? {
                acc = f(layer, &acc, t)?;
            }
        }
        Ok(acc)
    }
}

impl Augmentation for RandomChoice {
    fn name(&self) -> &str {
        "random_choice"
    }

    fn random_transformation(
        &self,
        sample: &Inputs,
        rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        let mut steps = Vec::with_capacity(self.layers_per_sample);
        for _ in 0..self.layers_per_sample {
            let index = rng.random_range(0..self.layers.len());
            if rng.random_bool(f64::from(self.rate)) {
                let inner = self.layers[index].random_transformation(sample, rng)?;
                steps.push(Transformation::Choice {
                    index,
                    inner: Box::new(inner),
                });
            } else {
                steps.push(Transformation::Identity);
            }
        }
        Ok(Transformation::Sequence(steps))
    }

    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        self.fold(image.clone(), transformation, |layer, image, t| {
            layer.augment_image(image, t)
        })
    }

    fn augment_label(
        &self,
        label: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        self.fold(label.clone(), transformation, |layer, label, t| {
            layer.augment_label(label, t)
        })
    }

    fn augment_bounding_boxes(
        &self,
        boxes: &ArrayD<f32>,
        transformation: &Transformation,
        image_shape: &[usize],
    ) -> Result<ArrayD<f32>> {
        self.fold(boxes.clone(), transformation, |layer, boxes, t| {
            layer.augment_bounding_boxes(boxes, t, image_shape)
        })
    }

    fn batch_correlated(&self) -> bool {
        self.layers.iter().any(|layer| layer.batch_correlated())
    }

    fn augment_sample(&self, sample: &Inputs, transformation: &Transformation) -> Result<Inputs> {
        self.fold(sample.clone(), transformation, |layer, sample, t| {
            layer.augment_sample(sample, t)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::{ChannelShift, FlipMode, RandomFlip};
    use crate::sampler::FactorSampler;
    use ndarray::IxDyn;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn shift(k: f32) -> ChannelShift {
        ChannelShift::new(FactorSampler::constant(k).unwrap()).unwrap()
    }

    fn image() -> ArrayD<f32> {
        ArrayD::from_shape_vec(IxDyn(&[1, 2, 2]), vec![1.0, 2.0, 3.0, 4.0]).unwrap()
    }

    #[test]
    fn test_pipeline_applies_in_order() {
        let pipeline = Pipeline::new()
            .add(shift(10.0))
            .add(RandomFlip::new(FlipMode::Horizontal).with_probability(1.0).unwrap());
        let sample = Inputs::new(image());
        let mut rng = StdRng::seed_from_u64(0);

        let t = pipeline.random_transformation(&sample, &mut rng).unwrap();
        let output = pipeline.augment_sample(&sample, &t).unwrap();

        // Сдвиг последнего канала, затем отражение по ширине
        assert_eq!(
            output.images.iter().cloned().collect::<Vec<_>>(),
            vec![3.0, 14.0, 1.0, 12.0]
        );
    }

    #[test]
    fn test_pipeline_rejects_foreign_transformation() {
        let pipeline = Pipeline::new().add(shift(1.0));
        assert!(pipeline
            .augment_image(&image(), &Transformation::Scalar(1.0))
            .is_err());
    }

    #[test]
    fn test_random_choice_requires_layers() {
        assert!(RandomChoice::new(Vec::new(), 2).is_err());
    }

    #[test]
    fn test_random_choice_draws_requested_steps() {
        let choice = RandomChoice::new(vec![Box::new(shift(1.0)), Box::new(shift(2.0))], 3)
            .unwrap();
        let sample = Inputs::new(image());
        let mut rng = StdRng::seed_from_u64(5);

        let t = choice.random_transformation(&sample, &mut rng).unwrap();
        match &t {
            Transformation::Sequence(steps) => {
                assert_eq!(steps.len(), 3);
                assert!(steps
                    .iter()
                    .all(|s| matches!(s, Transformation::Choice { index, .. } if *index < 2)));
            }
            other => panic!("unexpected transformation {:?}", other),
        }

        // Сумма сдвигов последнего канала от 3 до 6
        let output = choice.augment_image(&image(), &t).unwrap();
        let delta = output[[0, 0, 1]] - image()[[0, 0, 1]];
        assert!((3.0..=6.0).contains(&delta));
        assert_eq!(output[[0, 0, 0]], 1.0);
    }

    #[test]
    fn test_random_choice_zero_rate_is_identity() {
        let choice = RandomChoice::new(vec![Box::new(shift(50.0))], 4)
            .unwrap()
            .with_rate(0.0)
            .unwrap();
        let sample = Inputs::new(image());
        let mut rng = StdRng::seed_from_u64(9);

        let t = choice.random_transformation(&sample, &mut rng).unwrap();
        let output = choice.augment_sample(&sample, &t).unwrap();
        assert_eq!(output, sample);
    }
}
