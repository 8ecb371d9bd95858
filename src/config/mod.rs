//! 引擎配置
//!
//! 支持配置文件、环境变量和默认值三层来源

pub mod manager;

pub use manager::{ConfigManager, EngineConfig};

/// 配置常量
pub mod constants {
    use std::time::Duration;

    // 语言判定阈值（经验值）
    pub const LATIN_RATIO_THRESHOLD: f64 = 0.35;
    pub const SCRIPT_RATIO_THRESHOLD: f64 = 0.2;
    pub const MIN_REPEAT_RUN: usize = 4;

    // 页面语言调查
    pub const SURVEY_THRESHOLD: f64 = 0.8;

    // 变更监听与设置轮询
    pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(200);
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1500);

    // 缓存
    pub const DEFAULT_CACHE_CAPACITY: usize = 2000;

    // 单轮标注的并发翻译上限
    pub const DEFAULT_MAX_CONCURRENT_TRANSLATIONS: usize = 8;

    // 翻译服务
    pub const DEFAULT_PROVIDER_ENDPOINT: &str =
        "https://translate.googleapis.com/translate_a/single";
    pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(5);

    // 设置默认值
    pub const DEFAULT_TARGET_LANG: &str = "zh-CN";
    pub const DEFAULT_THEME: &str = "dark";

    // 标注节点
    pub const ANNOTATION_CLASS: &str = "bilingual-translation";
    pub const ORIGINAL_TEXT_ATTR: &str = "data-original-text";
    pub const ANNOTATED_ATTR: &str = "data-translated";

    // 配置文件搜索路径
    pub const CONFIG_PATHS: &[&str] = &[
        "interlinear.toml",
        ".interlinear.toml",
        "interlinear.json",
        "~/.config/interlinear/config.toml",
        "/etc/interlinear/config.toml",
    ];
}

/// 加载配置，失败时回退到默认值
pub fn load_engine_config() -> EngineConfig {
    match ConfigManager::new() {
        Ok(manager) => manager.into_config(),
        Err(e) => {
            tracing::warn!("配置加载失败，使用默认配置: {}", e);
            EngineConfig::default()
        }
    }
}
