// --- Файл: src/inputs.rs ---

//! Входные данные слоев: один образец или батч.
//!
//! [`Inputs`] хранит фиксированный набор именованных полей. Один образец не
//! имеет ведущей batch-оси; батч получается стекингом образцов по новой оси 0.

use crate::error::{AugmentError, Result};
use ndarray::{ArrayD, Axis};
use std::collections::BTreeMap;

/// Имена полей в сообщениях об ошибках.
pub const IMAGES: &str = "images";
pub const LABELS: &str = "labels";
pub const BOUNDING_BOXES: &str = "bounding_boxes";

/// Поля одного образца или батча.
#[derive(Debug, Clone, PartialEq)]
pub struct Inputs {
    /// Основные данные (изображения)
    pub images: ArrayD<f32>,
    /// Метки классификации
    pub labels: Option<ArrayD<f32>>,
    /// Боксы `[x1, y1, x2, y2, ...]` в пикселях
    pub bounding_boxes: Option<ArrayD<f32>>,
    /// Прочие поля, проходят без изменений
    pub extras: BTreeMap<String, ArrayD<f32>>,
}

/// Разметка входа, определяется по рангу `images`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    Single,
    Batched(usize),
}

impl Inputs {
    pub fn new(images: ArrayD<f32>) -> Self {
        Self {
            images,
            labels: None,
            bounding_boxes: None,
            extras: BTreeMap::new(),
        }
    }

    pub fn with_labels(mut self, labels: ArrayD<f32>) -> Self {
        self.labels = Some(labels);
        self
    }

    pub fn with_bounding_boxes(mut self, boxes: ArrayD<f32>) -> Self {
        self.bounding_boxes = Some(boxes);
        self
    }

    pub fn with_extra(mut self, name: impl Into<String>, value: ArrayD<f32>) -> Self {
        self.extras.insert(name.into(), value);
        self
    }

    /// Определяет, образец это или батч, и проверяет согласованность полей.
    ///
    /// `sample_rank` это ранг `images` одного образца (3 для `H x W x C`).
    pub fn layout(&self, sample_rank: usize) -> Result<Layout> {
        let rank = self.images.ndim();
        if rank == sample_rank {
            return Ok(Layout::Single);
        }
        if rank != sample_rank + 1 {
            return Err(AugmentError::shape(
                IMAGES,
                format!("rank {} or {}", sample_rank, sample_rank + 1),
                self.images.shape(),
            ));
        }

        let batch_size = self.images.shape()[0];
        for (name, field) in self.named_fields() {
            let leading = field.shape().first().copied();
            if leading != Some(batch_size) {
                return Err(AugmentError::shape(
                    name,
                    format!("leading dimension {}", batch_size),
                    field.shape(),
                ));
            }
        }
        Ok(Layout::Batched(batch_size))
    }

    /// Все поля, кроме `images`, с их именами.
    fn named_fields(&self) -> Vec<(&str, &ArrayD<f32>)> {
        let mut fields = Vec::with_capacity(2 + self.extras.len());
        if let Some(labels) = &self.labels {
            fields.push((LABELS, labels));
        }
        if let Some(boxes) = &self.bounding_boxes {
            fields.push((BOUNDING_BOXES, boxes));
        }
        fields.extend(self.extras.iter().map(|(k, v)| (k.as_str(), v)));
        fields
    }

    /// Размер батча по ведущей оси `images`. Не проверяет остальные поля.
    pub fn batch_size(&self) -> usize {
        self.images.shape().first().copied().unwrap_or(0)
    }

    /// Возвращает образец `index` батча.
    pub fn sample(&self, index: usize) -> Inputs {
        let take = |a: &ArrayD<f32>| a.index_axis(Axis(0), index).to_owned();
        Inputs {
            images: take(&self.images),
            labels: self.labels.as_ref().map(take),
            bounding_boxes: self.bounding_boxes.as_ref().map(take),
            extras: self
                .extras
                .iter()
                .map(|(k, v)| (k.clone(), take(v)))
                .collect(),
        }
    }

    /// Разбивает батч на образцы в исходном порядке.
    pub fn unstack(&self) -> Vec<Inputs> {
        (0..self.batch_size()).map(|i| self.sample(i)).collect()
    }

    /// Собирает батч из образцов по новой оси 0.
    ///
    /// Все образцы должны иметь одинаковый набор полей и одинаковые формы.
    pub fn stack(samples: &[Inputs]) -> Result<Inputs> {
        let first = samples
            .first()
            .ok_or_else(|| AugmentError::shape(IMAGES, "at least one sample", "empty batch"))?;

        let images = stack_field(IMAGES, samples.iter().map(|s| &s.images))?;

        let labels = stack_optional(LABELS, first.labels.is_some(), samples, |s| {
            s.labels.as_ref()
        })?;
        let bounding_boxes = stack_optional(
            BOUNDING_BOXES,
            first.bounding_boxes.is_some(),
            samples,
            |s| s.bounding_boxes.as_ref(),
        )?;

        let mut extras = BTreeMap::new();
        for name in first.extras.keys() {
            let field = stack_optional(name, true, samples, |s| s.extras.get(name))?;
            if let Some(field) = field {
                extras.insert(name.clone(), field);
            }
        }
        if let Some(odd) = samples.iter().find(|s| s.extras.len() != first.extras.len()) {
            return Err(AugmentError::shape(
                "extras",
                first.extras.keys().collect::<Vec<_>>(),
                odd.extras.keys().collect::<Vec<_>>(),
            ));
        }

        Ok(Inputs {
            images,
            labels,
            bounding_boxes,
            extras,
        })
    }
}

fn stack_field<'a>(
    name: &str,
    arrays: impl Iterator<Item = &'a ArrayD<f32>>,
) -> Result<ArrayD<f32>> {
    let views: Vec<_> = arrays.map(|a| a.view()).collect();
    ndarray::stack(Axis(0), &views).map_err(|_| {
        AugmentError::shape(
            name,
            "equal per-sample shapes",
            views.iter().map(|v| v.shape().to_vec()).collect::<Vec<_>>(),
        )
    })
}

fn stack_optional<'a, F>(
    name: &str,
    present: bool,
    samples: &'a [Inputs],
    get: F,
) -> Result<Option<ArrayD<f32>>>
where
    F: Fn(&'a Inputs) -> Option<&'a ArrayD<f32>>,
{
    let fields: Vec<_> = samples.iter().map(get).collect();
    match (present, fields.iter().all(|f| f.is_some() == present)) {
        (_, false) => Err(AugmentError::shape(
            name,
            if present { "present in every sample" } else { "absent in every sample" },
            "present in some samples only",
        )),
        (false, true) => Ok(None),
        (true, true) => stack_field(name, fields.into_iter().flatten()).map(Some),
    }
}
