// --- Файл: src/layers/random_flip.rs ---

//! Случайное отражение изображений вместе с их боксами.

use crate::augmentation::{Augmentation, Transformation};
use crate::error::{AugmentError, Result};
use crate::inputs::{Inputs, BOUNDING_BOXES, IMAGES};
use ndarray::{ArrayD, Axis};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

/// Оси отражения.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlipMode {
    #[default]
    Horizontal,
    Vertical,
    HorizontalAndVertical,
}

impl FlipMode {
    fn horizontal(self) -> bool {
        matches!(self, FlipMode::Horizontal | FlipMode::HorizontalAndVertical)
    }

    fn vertical(self) -> bool {
        matches!(self, FlipMode::Vertical | FlipMode::HorizontalAndVertical)
    }
}

/// Отражает изображение `H x W x C` с вероятностью `probability` по каждой
/// включенной оси.
///
/// Преобразование образца это `Vector([h, v])`, где 1.0 означает отражение.
/// Боксы `[x1, y1, x2, y2, ...]` отражаются тем же преобразованием, остальные
/// столбцы бокса (например класс) не меняются.
#[derive(Debug, Clone)]
pub struct RandomFlip {
    mode: FlipMode,
    probability: f32,
}

impl RandomFlip {
    pub fn new(mode: FlipMode) -> Self {
        Self {
            mode,
            probability: 0.5,
        }
    }

    /// Устанавливает вероятность отражения, должна быть в [0, 1].
    pub fn with_probability(mut self, probability: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&probability) {
            return Err(AugmentError::config(format!(
                "flip probability must be in [0, 1], got {}",
                probability
            )));
        }
        self.probability = probability;
        Ok(self)
    }

    fn flags(&self, transformation: &Transformation) -> Result<(bool, bool)> {
        match transformation {
            Transformation::Identity => Ok((false, false)),
            Transformation::Vector(v) if v.len() == 2 => Ok((v[0] > 0.5, v[1] > 0.5)),
            other => Err(other.mismatch(self.name())),
        }
    }
}

impl Augmentation for RandomFlip {
    fn name(&self) -> &str {
        "random_flip"
    }

    fn random_transformation(
        &self,
        _sample: &Inputs,
        rng: &mut dyn RngCore,
    ) -> Result<Transformation> {
        let p = f64::from(self.probability);
        let h = self.mode.horizontal() && rng.random_bool(p);
        let v = self.mode.vertical() && rng.random_bool(p);
        Ok(Transformation::Vector(vec![
            if h { 1.0 } else { 0.0 },
            if v { 1.0 } else { 0.0 },
        ]))
    }

    fn augment_image(
        &self,
        image: &ArrayD<f32>,
        transformation: &Transformation,
    ) -> Result<ArrayD<f32>> {
        if image.ndim() < 2 {
            return Err(AugmentError::shape(IMAGES, "H x W [x C]", image.shape()));
        }
        let (h, v) = self.flags(transformation)?;
        let mut view = image.view();
        if h {
            view.invert_axis(Axis(1));
        }
        if v {
            view.invert_axis(Axis(0));
        }
        Ok(view.to_owned())
    }

    fn augment_bounding_boxes(
        &self,
        boxes: &ArrayD<f32>,
        transformation: &Transformation,
        image_shape: &[usize],
    ) -> Result<ArrayD<f32>> {
        if boxes.ndim() != 2 || boxes.shape()[1] < 4 {
            return Err(AugmentError::shape(
                BOUNDING_BOXES,
                "[num_boxes, 4 + extra]",
                boxes.shape(),
            ));
        }
        if image_shape.len() < 2 {
            return Err(AugmentError::shape(IMAGES, "H x W [x C]", image_shape));
        }
        let (h, v) = self.flags(transformation)?;
        let height = image_shape[0] as f32;
        let width = image_shape[1] as f32;

        let mut output = boxes.clone();
        for mut row in output.axis_iter_mut(Axis(0)) {
            if h {
                let (x1, x2) = (row[0], row[2]);
                row[0] = width - x2;
                row[2] = width - x1;
            }
            if v {
                let (y1, y2) = (row[1], row[3]);
                row[1] = height - y2;
                row[3] = height - y1;
            }
        }
        Ok(output)
    }
}
