// --- Файл: src/error.rs ---

//! Ошибки библиотеки аугментаций.

use thiserror::Error;

/// Ошибки конфигурации и выполнения аугментаций.
#[derive(Error, Debug)]
pub enum AugmentError {
    /// Неверные параметры: диапазоны, распределения, описания слоев.
    /// Возникает при построении, повторять без исправления конфигурации бессмысленно.
    #[error("Ошибка конфигурации: {0}")]
    Configuration(String),

    /// Поля батча имеют несогласованную форму.
    #[error("Несовпадение формы поля '{field}': ожидалось {expected}, получено {found}")]
    ShapeMismatch {
        field: String,
        expected: String,
        found: String,
    },

    /// Слой помечен как batch-correlated, но вызван на векторизованном пути.
    #[error("Слой '{layer}' коррелирует элементы батча и не может выполняться векторизованно")]
    IncompatibleTransform { layer: String },

    /// Слой получил описание преобразования не того вида.
    #[error("Слой '{layer}' получил неподходящее преобразование: {found}")]
    InvalidTransformation { layer: String, found: String },

    #[error("Ошибка ввода/вывода: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ошибка JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl AugmentError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        AugmentError::Configuration(msg.into())
    }

    pub(crate) fn shape(
        field: impl Into<String>,
        expected: impl std::fmt::Debug,
        found: impl std::fmt::Debug,
    ) -> Self {
        AugmentError::ShapeMismatch {
            field: field.into(),
            expected: format!("{:?}", expected),
            found: format!("{:?}", found),
        }
    }
}

pub type Result<T> = std::result::Result<T, AugmentError>;
