//! 配置管理器
//!
//! 按 `.env` → 配置文件 → 环境变量覆盖 → 校验 的顺序产出 [`EngineConfig`]

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::constants;
use crate::env::{engine, provider, EnvVar};
use crate::error::{EngineError, EngineResult};

/// 引擎配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    // 变更监听
    pub debounce_ms: u64,

    // 设置同步
    pub poll_interval_ms: u64,

    // 缓存
    pub cache_capacity: usize,

    // 单轮标注中同时进行的翻译数
    pub max_concurrent_translations: usize,

    // 语言判定
    pub latin_ratio_threshold: f64,
    pub script_ratio_threshold: f64,
    pub survey_threshold: f64,

    // 翻译服务
    pub provider_endpoint: String,
    pub provider_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            debounce_ms: constants::DEFAULT_DEBOUNCE.as_millis() as u64,
            poll_interval_ms: constants::DEFAULT_POLL_INTERVAL.as_millis() as u64,
            cache_capacity: constants::DEFAULT_CACHE_CAPACITY,
            max_concurrent_translations: constants::DEFAULT_MAX_CONCURRENT_TRANSLATIONS,
            latin_ratio_threshold: constants::LATIN_RATIO_THRESHOLD,
            script_ratio_threshold: constants::SCRIPT_RATIO_THRESHOLD,
            survey_threshold: constants::SURVEY_THRESHOLD,
            provider_endpoint: constants::DEFAULT_PROVIDER_ENDPOINT.to_string(),
            provider_timeout_ms: constants::DEFAULT_PROVIDER_TIMEOUT.as_millis() as u64,
        }
    }
}

impl EngineConfig {
    /// 验证配置
    pub fn validate(&self) -> EngineResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(EngineError::ConfigError("轮询间隔不能为0".to_string()));
        }

        if self.cache_capacity == 0 {
            return Err(EngineError::ConfigError("缓存容量不能为0".to_string()));
        }

        if self.max_concurrent_translations == 0 {
            return Err(EngineError::ConfigError("并发翻译数不能为0".to_string()));
        }

        for (name, value) in [
            ("latin_ratio_threshold", self.latin_ratio_threshold),
            ("script_ratio_threshold", self.script_ratio_threshold),
            ("survey_threshold", self.survey_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::ConfigError(format!(
                    "{} 必须位于 0 到 1 之间，当前为 {}",
                    name, value
                )));
            }
        }

        if !self.provider_endpoint.starts_with("http://")
            && !self.provider_endpoint.starts_with("https://")
        {
            return Err(EngineError::ConfigError(format!(
                "无效的翻译接口地址: {}",
                self.provider_endpoint
            )));
        }

        Ok(())
    }

    /// 应用环境变量覆盖（只覆盖已设置的变量）
    pub fn apply_env_overrides(&mut self) -> EngineResult<()> {
        if let Some(debounce) = engine::DebounceInterval::get_if_set() {
            self.debounce_ms = debounce?.as_millis() as u64;
        }

        if let Some(poll) = engine::PollInterval::get_if_set() {
            self.poll_interval_ms = poll?.as_millis() as u64;
        }

        if let Some(capacity) = engine::CacheCapacity::get_if_set() {
            self.cache_capacity = capacity?;
        }

        if let Some(endpoint) = provider::Endpoint::get_if_set() {
            self.provider_endpoint = endpoint?;
            tracing::info!("环境变量覆盖翻译接口地址: {}", self.provider_endpoint);
        }

        if let Some(timeout) = provider::Timeout::get_if_set() {
            self.provider_timeout_ms = timeout?.as_millis() as u64;
        }

        Ok(())
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }
}

/// 配置管理器
pub struct ConfigManager {
    config: EngineConfig,
}

impl ConfigManager {
    /// 按默认搜索路径加载配置
    pub fn new() -> EngineResult<Self> {
        Self::load_dotenv();
        let config = Self::locate_config()?;
        Self::finish(config)
    }

    /// 从指定文件加载配置
    pub fn from_path(path: impl AsRef<Path>) -> EngineResult<Self> {
        Self::load_dotenv();
        let config = Self::load_from_file(path.as_ref())?;
        Self::finish(config)
    }

    fn finish(mut config: EngineConfig) -> EngineResult<Self> {
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(Self { config })
    }

    /// 获取配置
    pub fn get_config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }

    fn locate_config() -> EngineResult<EngineConfig> {
        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            let candidate = Path::new(expanded_path.as_ref());
            if candidate.exists() {
                tracing::info!("加载配置文件: {}", expanded_path);
                return Self::load_from_file(candidate);
            }
        }

        tracing::info!("未找到配置文件，使用默认配置");
        Ok(EngineConfig::default())
    }

    fn load_from_file(path: &Path) -> EngineResult<EngineConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            EngineError::ConfigError(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;

        if path.extension().is_some_and(|ext| ext == "json") {
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(toml::from_str(&content)?)
        }
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }

    /// 生成示例配置文件
    pub fn generate_example_config(path: impl AsRef<Path>) -> EngineResult<()> {
        let content = toml::to_string_pretty(&EngineConfig::default())
            .map_err(|e| EngineError::ConfigError(format!("序列化配置失败: {}", e)))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
