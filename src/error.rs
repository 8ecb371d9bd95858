//! 统一错误处理
//!
//! 引擎内部的任何错误都不会中断一轮标注：失败被收窄为“这一个元素本轮不标注”，
//! 错误类型主要用于日志、统计与配置加载阶段的传播。

use thiserror::Error;

use crate::dom::selector::SelectorError;
use crate::env::EnvError;

/// 引擎错误类型
#[derive(Error, Debug, Clone)]
pub enum EngineError {
    /// 配置错误
    #[error("配置错误: {0}")]
    ConfigError(String),

    /// 选择器错误
    #[error("选择器错误: {0}")]
    SelectorError(#[from] SelectorError),

    /// 设置存储读写错误
    #[error("设置存储错误: {0}")]
    SettingsError(String),

    /// 翻译提供方错误
    #[error("翻译服务错误: {0}")]
    ProviderError(String),

    /// 文档解析或操作错误
    #[error("文档错误: {0}")]
    DocumentError(String),

    /// 适配器目录错误
    #[error("适配器目录错误: {0}")]
    CatalogueError(String),

    /// IO 错误
    #[error("IO错误: {0}")]
    IoError(String),
}

impl EngineError {
    /// 检查错误是否可在下一周期重试
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::SettingsError(_) => true,
            EngineError::ProviderError(_) => true,
            EngineError::IoError(_) => true,
            EngineError::ConfigError(_) => false,
            EngineError::SelectorError(_) => false,
            EngineError::DocumentError(_) => false,
            EngineError::CatalogueError(_) => false,
        }
    }

    /// 获取错误类别
    pub fn category(&self) -> ErrorCategory {
        match self {
            EngineError::ConfigError(_) => ErrorCategory::Configuration,
            EngineError::SelectorError(_) => ErrorCategory::Selector,
            EngineError::SettingsError(_) => ErrorCategory::Reconciliation,
            EngineError::ProviderError(_) => ErrorCategory::Provider,
            EngineError::DocumentError(_) => ErrorCategory::Document,
            EngineError::CatalogueError(_) => ErrorCategory::Configuration,
            EngineError::IoError(_) => ErrorCategory::Io,
        }
    }
}

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Configuration,
    Selector,
    Reconciliation,
    Provider,
    Document,
    Io,
}

impl From<std::io::Error> for EngineError {
    fn from(error: std::io::Error) -> Self {
        EngineError::IoError(error.to_string())
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(error: serde_json::Error) -> Self {
        EngineError::ConfigError(format!("JSON解析失败: {}", error))
    }
}

impl From<toml::de::Error> for EngineError {
    fn from(error: toml::de::Error) -> Self {
        EngineError::ConfigError(format!("TOML解析失败: {}", error))
    }
}

impl From<EnvError> for EngineError {
    fn from(error: EnvError) -> Self {
        EngineError::ConfigError(error.to_string())
    }
}

/// 引擎操作结果类型
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(EngineError::SettingsError("read failed".into()).is_retryable());
        assert!(!EngineError::ConfigError("bad".into()).is_retryable());
        assert!(!EngineError::from(SelectorError::Syntax("a[".into())).is_retryable());
    }

    #[test]
    fn test_category_mapping() {
        assert_eq!(
            EngineError::SettingsError("x".into()).category(),
            ErrorCategory::Reconciliation
        );
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        assert_eq!(EngineError::from(io).category(), ErrorCategory::Io);
    }
}
