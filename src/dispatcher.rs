// --- Файл: src/dispatcher.rs ---

//! Диспетчер: применяет поэлементный слой к образцу или батчу.
//!
//! Для батча выбирается один из двух путей:
//!
//! - [`ExecutionPath::Vectorized`]: преобразования всех образцов выбираются
//!   заранее, весь батч нормализуется и передается в быстрый путь слоя
//!   ([`Augmentation::augment_batch`]); если слой его не реализует,
//!   поэлементные функции применяются к заранее выбранным преобразованиям.
//! - [`ExecutionPath::Loop`]: для каждого образца по очереди выбирается
//!   преобразование, образец нормализуется, преобразуется и возвращается в
//!   исходный диапазон.
//!
//! Оба пути тратят генератор в одном порядке (по одному выбору на образец),
//! поэтому для слоев без межэлементной зависимости результаты совпадают.

use crate::augmentation::{augment_each, Augmentation, Transformation};
use crate::config::AugmentationConfig;
use crate::error::{AugmentError, Result};
use crate::inputs::{Inputs, Layout, IMAGES};
use crate::value_range::ValueRangeNormalizer;
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};
use std::sync::Mutex;
use tracing::{debug, trace};

/// Способ обработки батча.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPath {
    Vectorized,
    Loop,
}

/// Применяет слой аугментации к образцам и батчам.
///
/// Диспетчер не хранит данных между вызовами, кроме генератора случайных
/// чисел. Генератор защищен мьютексом, поэтому диспетчер можно разделять
/// между потоками; для детерминизма на вызывающего используйте
/// [`BatchDispatcher::process_with_rng`].
///
/// # Пример
/// ```ignore
/// let config = AugmentationConfig::default();
/// let dispatcher = BatchDispatcher::new(ChannelShift::new(FactorSampler::constant(16.0)?)?, &config)?;
/// let augmented = dispatcher.process(&batch)?;
/// ```
pub struct BatchDispatcher {
    layer: Box<dyn Augmentation>,
    normalizer: ValueRangeNormalizer,
    auto_vectorize: bool,
    sample_rank: usize,
    rng: Mutex<StdRng>,
}

impl BatchDispatcher {
    /// Создает диспетчер для слоя с параметрами из конфигурации.
    ///
    /// Список слоев конфигурации здесь не используется, см.
    /// [`AugmentationConfig::build`].
    pub fn new<A: Augmentation + 'static>(layer: A, config: &AugmentationConfig) -> Result<Self> {
        Self::from_boxed(Box::new(layer), config)
    }

    pub fn from_boxed(layer: Box<dyn Augmentation>, config: &AugmentationConfig) -> Result<Self> {
        if config.sample_rank == 0 {
            return Err(AugmentError::config("sample_rank must be at least 1"));
        }
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Ok(Self {
            layer,
            normalizer: ValueRangeNormalizer::new(config.value_range),
            auto_vectorize: config.auto_vectorize,
            sample_rank: config.sample_rank,
            rng: Mutex::new(rng),
        })
    }

    pub fn layer(&self) -> &dyn Augmentation {
        self.layer.as_ref()
    }

    /// Путь, который выберет [`process`](Self::process) для батча.
    pub fn select_path(&self) -> ExecutionPath {
        if self.auto_vectorize && !self.layer.batch_correlated() {
            ExecutionPath::Vectorized
        } else {
            ExecutionPath::Loop
        }
    }

    /// Обрабатывает образец или батч, используя внутренний генератор.
    ///
    /// Образец на входе дает образец на выходе, батч из N образцов дает батч из
    /// N образцов в том же порядке.
    pub fn process(&self, inputs: &Inputs) -> Result<Inputs> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        self.run(inputs, self.select_path(), &mut *rng)
    }

    /// То же, что [`process`](Self::process), но с генератором вызывающего.
    pub fn process_with_rng(&self, inputs: &Inputs, rng: &mut dyn RngCore) -> Result<Inputs> {
        self.run(inputs, self.select_path(), rng)
    }

    /// Обрабатывает батч по явно заданному пути.
    ///
    /// Векторизованный путь для слоя, помеченного как batch-correlated,
    /// возвращает [`AugmentError::IncompatibleTransform`].
    pub fn process_with_path(&self, inputs: &Inputs, path: ExecutionPath) -> Result<Inputs> {
        let mut rng = self.rng.lock().unwrap_or_else(|e| e.into_inner());
        self.run(inputs, path, &mut *rng)
    }

    pub fn process_with_path_and_rng(
        &self,
        inputs: &Inputs,
        path: ExecutionPath,
        rng: &mut dyn RngCore,
    ) -> Result<Inputs> {
        self.run(inputs, path, rng)
    }

    fn run(&self, inputs: &Inputs, path: ExecutionPath, rng: &mut dyn RngCore) -> Result<Inputs> {
        match inputs.layout(self.sample_rank)? {
            Layout::Single => {
                trace!(layer = self.layer.name(), "augmenting single sample");
                self.augment_one(inputs, rng)
            }
            Layout::Batched(batch_size) => {
                debug!(
                    layer = self.layer.name(),
                    batch_size,
                    ?path,
                    "augmenting batch"
                );
                let output = match path {
                    ExecutionPath::Vectorized => self.run_vectorized(inputs, rng)?,
                    ExecutionPath::Loop => self.run_loop(inputs, rng)?,
                };
                if output.batch_size() != batch_size {
                    return Err(AugmentError::shape(
                        IMAGES,
                        format!("batch of {}", batch_size),
                        output.images.shape(),
                    ));
                }
                Ok(output)
            }
        }
    }

    fn augment_one(&self, sample: &Inputs, rng: &mut dyn RngCore) -> Result<Inputs> {
        let transformation = self.layer.random_transformation(sample, rng)?;
        let augmented = self
            .layer
            .augment_sample(&self.to_canonical(sample), &transformation)?;
        Ok(self.from_canonical(augmented))
    }

    fn run_loop(&self, batch: &Inputs, rng: &mut dyn RngCore) -> Result<Inputs> {
        let samples = batch.unstack();
        if samples.is_empty() {
            return Ok(batch.clone());
        }
        let augmented = samples
            .iter()
            .map(|sample| self.augment_one(sample, rng))
            .collect::<Result<Vec<_>>>()?;
        Inputs::stack(&augmented)
    }

    fn run_vectorized(&self, batch: &Inputs, rng: &mut dyn RngCore) -> Result<Inputs> {
        if self.layer.batch_correlated() {
            return Err(AugmentError::IncompatibleTransform {
                layer: self.layer.name().to_string(),
            });
        }
        let transformations = batch
            .unstack()
            .iter()
            .map(|sample| self.layer.random_transformation(sample, rng))
            .collect::<Result<Vec<Transformation>>>()?;

        let canonical = self.to_canonical(batch);
        let augmented = match self.layer.augment_batch(&canonical, &transformations) {
            Some(result) => result?,
            None => {
                trace!(layer = self.layer.name(), "no batch fast path, applying per sample");
                augment_each(&self.layer, &canonical, &transformations)?
            }
        };
        Ok(self.from_canonical(augmented))
    }

    fn to_canonical(&self, inputs: &Inputs) -> Inputs {
        Inputs {
            images: self.normalizer.to_canonical(&inputs.images),
            labels: inputs.labels.clone(),
            bounding_boxes: inputs.bounding_boxes.clone(),
            extras: inputs.extras.clone(),
        }
    }

    fn from_canonical(&self, mut inputs: Inputs) -> Inputs {
        inputs.images = self.normalizer.from_canonical(&inputs.images);
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::ChannelShift;
    use crate::sampler::FactorSampler;
    use crate::value_range::ValueRange;
    use ndarray::{ArrayD, IxDyn};

    /// Слой, который заявляет зависимость между элементами батча.
    struct SharedMask;

    impl Augmentation for SharedMask {
        fn name(&self) -> &str {
            "shared_mask"
        }

        fn augment_image(
            &self,
            image: &ArrayD<f32>,
            _transformation: &Transformation,
        ) -> Result<ArrayD<f32>> {
            Ok(image.mapv(|_| 0.0))
        }

        fn batch_correlated(&self) -> bool {
            true
        }
    }

    fn config(auto_vectorize: bool) -> AugmentationConfig {
        AugmentationConfig {
            auto_vectorize,
            seed: Some(17),
            ..AugmentationConfig::default()
        }
    }

    fn batch(n: usize) -> Inputs {
        Inputs::new(ArrayD::from_shape_vec(
            IxDyn(&[n, 2, 2, 3]),
            (0..n * 12).map(|x| x as f32).collect(),
        )
        .unwrap())
    }

    #[test]
    fn test_select_path() {
        let shift = || ChannelShift::new(FactorSampler::default()).unwrap();
        assert_eq!(
            BatchDispatcher::new(shift(), &config(true)).unwrap().select_path(),
            ExecutionPath::Vectorized
        );
        assert_eq!(
            BatchDispatcher::new(shift(), &config(false)).unwrap().select_path(),
            ExecutionPath::Loop
        );
        assert_eq!(
            BatchDispatcher::new(SharedMask, &config(true)).unwrap().select_path(),
            ExecutionPath::Loop
        );
    }

    #[test]
    fn test_batch_correlated_layer_rejected_on_vectorized_path() {
        let dispatcher = BatchDispatcher::new(SharedMask, &config(true)).unwrap();
        assert!(matches!(
            dispatcher.process_with_path(&batch(2), ExecutionPath::Vectorized),
            Err(AugmentError::IncompatibleTransform { .. })
        ));
        // Автоматический выбор уводит такой слой в цикл
        let output = dispatcher.process(&batch(2)).unwrap();
        assert!(output.images.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_random_draws_match_across_paths() {
        let layer = || ChannelShift::new(FactorSampler::uniform(-30.0, 30.0).unwrap()).unwrap();
        let vectorized = BatchDispatcher::new(layer(), &config(true)).unwrap();
        let looped = BatchDispatcher::new(layer(), &config(false)).unwrap();

        let input = batch(5);
        assert_eq!(
            vectorized.process(&input).unwrap(),
            looped.process(&input).unwrap()
        );
    }

    #[test]
    fn test_normalizes_declared_range() {
        let config = AugmentationConfig {
            value_range: ValueRange::unit(),
            ..config(true)
        };
        let layer = ChannelShift::new(FactorSampler::constant(51.0).unwrap()).unwrap();
        let dispatcher = BatchDispatcher::new(layer, &config).unwrap();

        let sample = Inputs::new(ArrayD::from_elem(IxDyn(&[1, 1, 2]), 0.5));
        let output = dispatcher.process(&sample).unwrap();

        // 51 в каноническом диапазоне это 0.2 в [0, 1]
        assert!((output.images[[0, 0, 1]] - 0.7).abs() < 1e-5);
        assert!((output.images[[0, 0, 0]] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_rejects_zero_sample_rank() {
        let config = AugmentationConfig {
            sample_rank: 0,
            ..AugmentationConfig::default()
        };
        assert!(BatchDispatcher::new(SharedMask, &config).is_err());
    }
}
