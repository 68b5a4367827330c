// --- Файл: src/value_range.rs ---

//! Диапазоны значений и линейная нормализация.
//!
//! Слои аугментации работают в каноническом диапазоне [`CANONICAL_RANGE`].
//! Данные пользователя могут быть в любом диапазоне (например `[0, 1]` или
//! `[-1, 1]`): перед применением слоя они линейно переводятся в канонический
//! диапазон и обратно после него.

use crate::error::{AugmentError, Result};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};

/// Упорядоченная пара (low, high), low < high.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "(f32, f32)", into = "(f32, f32)")]
pub struct ValueRange {
    low: f32,
    high: f32,
}

/// Диапазон, в котором определены все слои.
pub const CANONICAL_RANGE: ValueRange = ValueRange {
    low: 0.0,
    high: 255.0,
};

impl ValueRange {
    /// Создает диапазон. Вырожденный или нечисловой диапазон отклоняется.
    pub fn new(low: f32, high: f32) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() {
            return Err(AugmentError::config(format!(
                "value range bounds must be finite, got ({}, {})",
                low, high
            )));
        }
        if low >= high {
            return Err(AugmentError::config(format!(
                "value range requires low < high, got ({}, {})",
                low, high
            )));
        }
        if !(high - low).is_finite() {
            return Err(AugmentError::config(format!(
                "value range ({}, {}) is wider than f32 can represent",
                low, high
            )));
        }
        Ok(Self { low, high })
    }

    /// Диапазон `[0, 1]`.
    pub fn unit() -> Self {
        Self {
            low: 0.0,
            high: 1.0,
        }
    }

    pub fn low(&self) -> f32 {
        self.low
    }

    pub fn high(&self) -> f32 {
        self.high
    }

    pub fn width(&self) -> f32 {
        self.high - self.low
    }

    /// Обрезает значение до диапазона.
    pub fn clip(&self, value: f32) -> f32 {
        value.clamp(self.low, self.high)
    }
}

impl Default for ValueRange {
    fn default() -> Self {
        CANONICAL_RANGE
    }
}

impl TryFrom<(f32, f32)> for ValueRange {
    type Error = AugmentError;

    fn try_from((low, high): (f32, f32)) -> Result<Self> {
        Self::new(low, high)
    }
}

impl From<ValueRange> for (f32, f32) {
    fn from(range: ValueRange) -> Self {
        (range.low, range.high)
    }
}

/// Линейно переводит данные из диапазона `from` в диапазон `to`.
pub fn transform_value_range(data: &ArrayD<f32>, from: ValueRange, to: ValueRange) -> ArrayD<f32> {
    if from == to {
        return data.clone();
    }
    let scale = to.width() / from.width();
    data.mapv(|x| (x - from.low) * scale + to.low)
}

/// Нормализатор между объявленным диапазоном данных и каноническим.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ValueRangeNormalizer {
    declared: ValueRange,
}

impl ValueRangeNormalizer {
    pub fn new(declared: ValueRange) -> Self {
        Self { declared }
    }

    /// Объявленный диапазон данных.
    pub fn declared(&self) -> ValueRange {
        self.declared
    }

    /// Переводит данные в канонический диапазон.
    pub fn to_canonical(&self, data: &ArrayD<f32>) -> ArrayD<f32> {
        transform_value_range(data, self.declared, CANONICAL_RANGE)
    }

    /// Возвращает данные из канонического диапазона в объявленный.
    pub fn from_canonical(&self, data: &ArrayD<f32>) -> ArrayD<f32> {
        transform_value_range(data, CANONICAL_RANGE, self.declared)
    }
}
