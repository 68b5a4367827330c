// --- Файл: src/config.rs ---

//! Конфигурация аугментаций.
//!
//! Конфигурация создается один раз при настройке и дальше только читается.
//! Может загружаться из JSON:
//!
//! ```json
//! {
//!   "value_range": [0.0, 1.0],
//!   "auto_vectorize": true,
//!   "seed": 42,
//!   "layers": [
//!     { "type": "channel_shift", "channel": 2,
//!       "factor": { "type": "uniform", "low": 0.0, "high": 64.0 } },
//!     { "type": "random_flip", "mode": "horizontal", "probability": 0.5 }
//!   ]
//! }
//! ```

use crate::augmentation::Augmentation;
use crate::dispatcher::BatchDispatcher;
use crate::error::{AugmentError, Result};
use crate::layers::{ChannelShift, FlipMode, Pipeline, RandomChoice, RandomFlip};
use crate::sampler::FactorSampler;
use crate::value_range::{ValueRange, CANONICAL_RANGE};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Описание одного слоя.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LayerSpec {
    ChannelShift {
        /// Индекс канала, по умолчанию последний
        #[serde(default)]
        channel: Option<usize>,
        factor: FactorSampler,
    },
    RandomFlip {
        #[serde(default)]
        mode: FlipMode,
        #[serde(default = "default_probability")]
        probability: f32,
    },
    Pipeline {
        layers: Vec<LayerSpec>,
    },
    RandomChoice {
        layers: Vec<LayerSpec>,
        layers_per_sample: usize,
        #[serde(default = "default_rate")]
        rate: f32,
    },
}

fn default_probability() -> f32 {
    0.5
}

fn default_rate() -> f32 {
    1.0
}

impl LayerSpec {
    /// Строит слой, проверяя все параметры.
    pub fn build(&self) -> Result<Box<dyn Augmentation>> {
        match self {
            LayerSpec::ChannelShift { channel, factor } => {
                let mut layer = ChannelShift::new(*factor)?;
                if let Some(channel) = channel {
                    layer = layer.with_channel(*channel);
                }
                Ok(Box::new(layer))
            }
            LayerSpec::RandomFlip { mode, probability } => {
                Ok(Box::new(RandomFlip::new(*mode).with_probability(*probability)?))
            }
            LayerSpec::Pipeline { layers } => {
                Ok(Box::new(Pipeline::from_layers(build_all(layers)?)))
            }
            LayerSpec::RandomChoice {
                layers,
                layers_per_sample,
                rate,
            } => Ok(Box::new(
                RandomChoice::new(build_all(layers)?, *layers_per_sample)?.with_rate(*rate)?,
            )),
        }
    }
}

fn build_all(specs: &[LayerSpec]) -> Result<Vec<Box<dyn Augmentation>>> {
    specs.iter().map(LayerSpec::build).collect()
}

/// Неизменяемые параметры аугментации.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AugmentationConfig {
    /// Диапазон значений входных изображений
    pub value_range: ValueRange,
    /// Разрешить векторизованный путь для батчей
    pub auto_vectorize: bool,
    /// Seed генератора, `None` означает seed от ОС
    pub seed: Option<u64>,
    /// Ранг изображения одного образца (3 для `H x W x C`)
    pub sample_rank: usize,
    /// Слои, применяемые по порядку
    pub layers: Vec<LayerSpec>,
}

impl Default for AugmentationConfig {
    fn default() -> Self {
        Self {
            value_range: CANONICAL_RANGE,
            auto_vectorize: true,
            seed: None,
            sample_rank: 3,
            layers: Vec::new(),
        }
    }
}

impl AugmentationConfig {
    /// Разбирает конфигурацию из JSON и проверяет ее.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(json)?;
        // Диапазон проверяется отдельно, чтобы ошибка была `Configuration`, а не `Json`
        let value_range = match value.as_object_mut().and_then(|o| o.remove("value_range")) {
            Some(raw) => {
                let (low, high): (f32, f32) = serde_json::from_value(raw)?;
                ValueRange::new(low, high)?
            }
            None => CANONICAL_RANGE,
        };
        let config = Self {
            value_range,
            ..serde_json::from_value::<Self>(value)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Загружает конфигурацию из JSON-файла.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Сохраняет конфигурацию в JSON-файл.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_rank == 0 {
            return Err(AugmentError::config("sample_rank must be at least 1"));
        }
        build_all(&self.layers).map(|_| ())
    }

    /// Строит диспетчер из слоев конфигурации.
    ///
    /// Один слой используется как есть, несколько объединяются в [`Pipeline`].
    pub fn build(&self) -> Result<BatchDispatcher> {
        let mut layers = build_all(&self.layers)?;
        let layer: Box<dyn Augmentation> = match layers.len() {
            0 => return Err(AugmentError::config("no augmentation layers configured")),
            1 => layers.remove(0),
            _ => Box::new(Pipeline::from_layers(layers)),
        };
        BatchDispatcher::from_boxed(layer, self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"{
        "value_range": [0.0, 1.0],
        "seed": 42,
        "layers": [
            { "type": "channel_shift", "channel": 2,
              "factor": { "type": "uniform", "low": 0.0, "high": 64.0 } },
            { "type": "random_flip", "mode": "horizontal_and_vertical" }
        ]
    }"#;

    #[test]
    fn test_parse_example() {
        let config = AugmentationConfig::from_json_str(EXAMPLE).unwrap();

        assert_eq!(config.value_range, ValueRange::unit());
        assert!(config.auto_vectorize);
        assert_eq!(config.seed, Some(42));
        assert_eq!(config.sample_rank, 3);
        assert_eq!(config.layers.len(), 2);
        assert_eq!(
            config.layers[1],
            LayerSpec::RandomFlip {
                mode: FlipMode::HorizontalAndVertical,
                probability: 0.5
            }
        );

        let dispatcher = config.build().unwrap();
        assert_eq!(dispatcher.layer().name(), "pipeline");
    }

    #[test]
    fn test_rejects_bad_sampler() {
        let json = r#"{ "layers": [ { "type": "channel_shift",
            "factor": { "type": "uniform", "low": 5.0, "high": 5.0 } } ] }"#;
        assert!(matches!(
            AugmentationConfig::from_json_str(json),
            Err(AugmentError::Configuration(_))
        ));
    }

    #[test]
    fn test_rejects_degenerate_value_range() {
        for json in [
            r#"{ "value_range": [1.0, 1.0] }"#,
            r#"{ "value_range": [-3e38, 3e38] }"#,
        ] {
            assert!(matches!(
                AugmentationConfig::from_json_str(json),
                Err(AugmentError::Configuration(_))
            ));
        }
        // Не пара чисел: это ошибка формата, а не диапазона
        assert!(matches!(
            AugmentationConfig::from_json_str(r#"{ "value_range": "wide" }"#),
            Err(AugmentError::Json(_))
        ));
    }

    #[test]
    fn test_build_requires_layers() {
        assert!(AugmentationConfig::default().build().is_err());
    }

    #[test]
    fn test_nested_random_choice() {
        let json = r#"{ "layers": [ { "type": "random_choice", "layers_per_sample": 2,
            "rate": 0.5,
            "layers": [
                { "type": "channel_shift", "factor": { "type": "constant", "value": 8.0 } },
                { "type": "random_flip" }
            ] } ] }"#;
        let dispatcher = AugmentationConfig::from_json_str(json)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(dispatcher.layer().name(), "random_choice");
    }

    #[test]
    fn test_save_and_load() {
        let config = AugmentationConfig::from_json_str(EXAMPLE).unwrap();
        let path = std::env::temp_dir().join(format!("vecaug_config_{}.json", std::process::id()));

        config.save(&path).unwrap();
        let loaded = AugmentationConfig::load(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, config);
    }
}
