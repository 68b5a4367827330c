// --- Файл: src/augmentation.rs ---

//! Трейт слоя аугментации и описание преобразования.
//!
//! Слой разбит на фиксированные слоты по видам полей: основные данные,
//! метки классификации, геометрические цели. Слоты без переопределения
//! возвращают вход без изменений. Все слоты одного образца получают одно и то
//! же [`Transformation`], поэтому, например, отражение изображения и его
//! боксов всегда согласовано.

use crate::error::{AugmentError, Result};
use crate::inputs::Inputs;
use ndarray::ArrayD;
use rand::RngCore;

/// Случайное преобразование, выбранное для одного образца.
#[derive(Debug, Clone, PartialEq)]
pub enum Transformation {
    /// Ничего не делать
    Identity,
    Scalar(f32),
    Flag(bool),
    Vector(Vec<f32>),
    /// Преобразования дочерних слоев по порядку
    Sequence(Vec<Transformation>),
    /// Выбранный дочерний слой и его преобразование
    Choice {
        index: usize,
        inner: Box<Transformation>,
    },
}

impl Transformation {
    /// Короткое имя варианта для сообщений об ошибках.
    pub fn kind(&self) -> &'static str {
        match self {
            Transformation::Identity => "identity",
            Transformation::Scalar(_) => "scalar",
            Transformation::Flag(_) => "flag",
            Transformation::Vector(_) => "vector",
            Transformation::Sequence(_) => "sequence",
            Transformation::Choice { .. } => "choice",
        }
    }

    /// Ошибка "слой получил неподходящее преобразование".
    pub fn mismatch(&self, layer: &str) -> AugmentError {
        AugmentError::InvalidTransformation {
            layer: layer.to_string(),
            found: self.kind().to_string(),
        }
    }
}

/// Слой аугментации данных.
///
/// Изображения, которые получает слой, уже переведены в канонический диапазон
/// `[0, 255]`. Для одного образца `image` имеет форму `H x W x C`.
pub trait Augmentation: Send + Sync {
    /// Имя слоя для логов и ошибок.
    fn name(&self) -> &str;

    /// Выбирает преобразование для одного образца.
    fn random_transformation(
        &self,
        _sample: &Inputs,
        _rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        Ok(Transformation::Identity)
    }

    /// Преобразует основные данные одного образца. Не изменяет вход.
    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>>;

    fn augment_label(
        &self,
        label: &ArrayD<f32>,
        _transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        Ok(label.clone())
    }

    /// `image_shape` это форма изображения образца до преобразования.
    fn augment_bounding_boxes(
        &self,
        boxes: &ArrayD<f32>,
        _transformation: &Transformation,
        _image_shape: &[usize],
    ) -> Result<ArrayD<f32>> {
        Ok(boxes.clone())
    }

    /// Результат для одного элемента зависит от других элементов батча.
    ///
    /// Такие слои всегда выполняются поэлементным циклом.
    fn batch_correlated(&self) -> bool {
        false
    }

    /// Быстрый путь для целого батча, `None` если слой его не реализует.
    ///
    /// `transformations[i]` относится к образцу `i`.
    fn augment_batch(
        &self,
        _batch: &Inputs,
        _transformations: &[Transformation],
    ) -> Option<Result<Inputs>> {
        None
    }

    /// Применяет все слоты к одному образцу.
    fn augment_sample(&self, sample: &Inputs, transformation: &Transformation) -> Result<Inputs> {
        let image_shape = sample.images.shape();
        let labels = sample
            .labels
            .as_ref()
            .map(|l| self.augment_label(l, transformation))
            .transpose()?;
        let bounding_boxes = sample
            .bounding_boxes
            .as_ref()
            .map(|b| self.augment_bounding_boxes(b, transformation, image_shape))
            .transpose()?;

        Ok(Inputs {
            images: self.augment_image(&sample.images, transformation)?,
            labels,
            bounding_boxes,
            extras: sample.extras.clone(),
        })
    }
}

impl<A: Augmentation + ?Sized> Augmentation for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn random_transformation(
        &self,
        sample: &Inputs,
        rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        (**self).random_transformation(sample, rng)
    }

    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        (**self).augment_image(image, transformation)
    }

    fn augment_label(
        &self,
        label: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        (**self).augment_label(label, transformation)
    }

    fn augment_bounding_boxes(
        &self,
        boxes: &ArrayD<f32>,
        transformation: &Transformation,
        image_shape: &[usize],
    ) -> Result<ArrayD<f32>> {
        (**self).augment_bounding_boxes(boxes, transformation, image_shape)
    }

    fn batch_correlated(&self) -> bool {
        (**self).batch_correlated()
    }

    fn augment_batch(
        &self,
        batch: &Inputs,
        transformations: &[Transformation],
    ) -> Option<Result<Inputs>> {
        (**self).augment_batch(batch, transformations)
    }

    fn augment_sample(&self, sample: &Inputs, transformation: &Transformation) -> Result<Inputs> {
        (**self).augment_sample(sample, transformation)
    }
}

/// Применяет слой к каждому образцу батча с заранее выбранными преобразованиями
/// и собирает результат в исходном порядке.
pub fn augment_each<A: Augmentation + ?Sized>(
    layer: &A,
    batch: &Inputs,
    transformations: &[Transformation],
) -> Result<Inputs> {
    if transformations.len() != batch.batch_size() {
        return Err(AugmentError::shape(
            "transformations",
            batch.batch_size(),
            transformations.len(),
        ));
    }
    if transformations.is_empty() {
        return Ok(batch.clone());
    }
    let samples = batch
        .unstack()
        .iter()
        .zip(transformations)
        .map(|(sample, transformation)| layer.augment_sample(sample, transformation))
        .collect::<Result<Vec<_>>>()?;
    Inputs::stack(&samples)
}
