// --- Файл: src/sampler.rs ---

//! Сэмплеры факторов преобразований.
//!
//! Каждый слой аугментации хранит один или несколько [`FactorSampler`] и
//! вызывает [`FactorSampler::draw`] один раз на образец. Генератор случайных
//! чисел передается явно, глобального состояния нет.

use crate::error::{AugmentError, Result};
use rand::distr::Uniform;
use rand::RngCore;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Распределение, из которого берется фактор преобразования.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FactorSampler {
    /// Всегда возвращает одно и то же значение.
    Constant { value: f32 },
    /// Равномерное распределение на [low, high).
    Uniform { low: f32, high: f32 },
    /// Нормальное распределение, обрезанное до [min_value, max_value].
    Normal {
        mean: f32,
        stddev: f32,
        min_value: f32,
        max_value: f32,
    },
}

impl FactorSampler {
    /// Создает константный сэмплер.
    pub fn constant(value: f32) -> Result<Self> {
        Self::Constant { value }.validated()
    }

    /// Создает равномерный сэмплер. Требует `low < high`.
    pub fn uniform(low: f32, high: f32) -> Result<Self> {
        Self::Uniform { low, high }.validated()
    }

    /// Создает нормальный сэмплер с обрезкой. Требует `min_value < max_value`.
    pub fn normal(mean: f32, stddev: f32, min_value: f32, max_value: f32) -> Result<Self> {
        Self::Normal {
            mean,
            stddev,
            min_value,
            max_value,
        }
        .validated()
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Проверяет параметры. Нужна после десериализации, конструкторы вызывают ее сами.
    pub fn validate(&self) -> Result<()> {
        match *self {
            FactorSampler::Constant { value } => {
                if !value.is_finite() {
                    return Err(AugmentError::config(format!(
                        "constant factor must be finite, got {}",
                        value
                    )));
                }
            }
            FactorSampler::Uniform { low, high } => {
                if !low.is_finite() || !high.is_finite() {
                    return Err(AugmentError::config(format!(
                        "uniform bounds must be finite, got ({}, {})",
                        low, high
                    )));
                }
                if low >= high {
                    return Err(AugmentError::config(format!(
                        "uniform sampler requires low < high, got ({}, {})",
                        low, high
                    )));
                }
                if !(high - low).is_finite() {
                    return Err(AugmentError::config(format!(
                        "uniform range ({}, {}) is wider than f32 can represent",
                        low, high
                    )));
                }
            }
            FactorSampler::Normal {
                mean,
                stddev,
                min_value,
                max_value,
            } => {
                if ![mean, stddev, min_value, max_value]
                    .iter()
                    .all(|v| v.is_finite())
                {
                    return Err(AugmentError::config(
                        "normal sampler parameters must be finite",
                    ));
                }
                if stddev < 0.0 {
                    return Err(AugmentError::config(format!(
                        "normal sampler requires stddev >= 0, got {}",
                        stddev
                    )));
                }
                if min_value >= max_value {
                    return Err(AugmentError::config(format!(
                        "normal sampler requires min_value < max_value, got ({}, {})",
                        min_value, max_value
                    )));
                }
            }
        }
        Ok(())
    }

    /// Берет одно значение. Каждый вызов независим.
    ///
    /// Непроверенные параметры дают `Configuration`, а не панику.
    pub fn draw(&self, rng: &mut dyn RngCore) -> Result<f32> {
        self.validate()?;
        match *self {
            FactorSampler::Constant { value } => Ok(value),
            FactorSampler::Uniform { low, high } => {
                let dist = Uniform::new(low, high).map_err(|e| {
                    AugmentError::config(format!("uniform sampler ({}, {}): {}", low, high, e))
                })?;
                Ok(dist.sample(rng))
            }
            FactorSampler::Normal {
                mean,
                stddev,
                min_value,
                max_value,
            } => {
                let dist = Normal::new(mean, stddev).map_err(|e| {
                    AugmentError::config(format!("normal sampler ({}, {}): {}", mean, stddev, e))
                })?;
                Ok(dist.sample(rng).clamp(min_value, max_value))
            }
        }
    }
}

impl Default for FactorSampler {
    fn default() -> Self {
        FactorSampler::Constant { value: 0.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_constant_sampler() {
        let sampler = FactorSampler::constant(3.5).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            assert_eq!(sampler.draw(&mut rng).unwrap(), 3.5);
        }
    }

    #[test]
    fn test_uniform_rejects_degenerate_range() {
        assert!(matches!(
            FactorSampler::uniform(1.0, 1.0),
            Err(AugmentError::Configuration(_))
        ));
        assert!(matches!(
            FactorSampler::uniform(2.0, 1.0),
            Err(AugmentError::Configuration(_))
        ));
    }

    #[test]
    fn test_uniform_rejects_overflowing_width() {
        assert!(matches!(
            FactorSampler::uniform(-3e38, 3e38),
            Err(AugmentError::Configuration(_))
        ));
        // Ширина f32::MAX еще представима
        assert!(FactorSampler::uniform(0.0, f32::MAX).is_ok());
    }

    #[test]
    fn test_draw_on_unvalidated_parameters_is_an_error() {
        let mut rng = StdRng::seed_from_u64(0);
        let raw = [
            FactorSampler::Uniform {
                low: -3e38,
                high: 3e38,
            },
            FactorSampler::Uniform {
                low: 5.0,
                high: 5.0,
            },
            FactorSampler::Normal {
                mean: 0.0,
                stddev: -1.0,
                min_value: -1.0,
                max_value: 1.0,
            },
            FactorSampler::Normal {
                mean: 0.0,
                stddev: 1.0,
                min_value: 1.0,
                max_value: -1.0,
            },
        ];
        for sampler in raw {
            assert!(matches!(
                sampler.draw(&mut rng),
                Err(AugmentError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_uniform_draws_within_bounds() {
        let sampler = FactorSampler::uniform(-2.0, 5.0).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let draws: Vec<f32> = (0..200).map(|_| sampler.draw(&mut rng).unwrap()).collect();

        assert!(draws.iter().all(|&v| (-2.0..5.0).contains(&v)));
        // Независимые вызовы не должны возвращать одно и то же значение
        assert!(draws.windows(2).any(|w| w[0] != w[1]));
    }

    #[test]
    fn test_normal_is_clamped() {
        let sampler = FactorSampler::normal(0.0, 10.0, -1.0, 1.0).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..200 {
            let v = sampler.draw(&mut rng).unwrap();
            assert!((-1.0..=1.0).contains(&v));
        }
    }

    #[test]
    fn test_normal_rejects_bad_bounds() {
        assert!(FactorSampler::normal(0.0, 1.0, 1.0, 1.0).is_err());
        assert!(FactorSampler::normal(0.0, -1.0, 0.0, 1.0).is_err());
        assert!(FactorSampler::normal(f32::NAN, 1.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_deserialize_and_validate() {
        let sampler: FactorSampler =
            serde_json::from_str(r#"{"type": "uniform", "low": 3.0, "high": 3.0}"#).unwrap();
        assert!(sampler.validate().is_err());

        let sampler: FactorSampler =
            serde_json::from_str(r#"{"type": "constant", "value": 42.0}"#).unwrap();
        assert_eq!(sampler, FactorSampler::Constant { value: 42.0 });
    }
}
