//! # Interlinear
//!
//! 增量式双语标注引擎：在文档中选定的文本块下方插入译文，
//! 并让这些译文随文档修改和用户设置保持同步。
//!
//! ## 模块组织
//!
//! - `dom` - 可观察的文档、节点操作与选择器
//! - `classifier` - 判断文本是否已是目标语言
//! - `adapters` / `matcher` - 站点适配器与候选元素匹配
//! - `annotator` - 每个元素的标注状态机
//! - `watcher` - 文档修改监听与防抖重扫
//! - `settings` - 设置存储与双通道协调
//! - `cache` - 译文缓存
//! - `translator` - 翻译提供方
//! - `engine` - 装配以上组件的引擎实例
//! - `config` / `env` - 配置文件与环境变量

pub mod adapters;
pub mod annotator;
pub mod cache;
pub mod classifier;
pub mod config;
pub mod dom;
pub mod engine;
pub mod env;
pub mod error;
pub mod matcher;
pub mod settings;
pub mod themes;
pub mod translator;
pub mod watcher;

// Re-export commonly used items for convenience
pub use adapters::{AdapterCatalogue, AdapterConfig, TextExtraction};
pub use annotator::{AnnotationRecord, AnnotationStateMachine, ElementState, InsertionMode};
pub use cache::{AnnotationCache, Fingerprint};
pub use classifier::LanguageClassifier;
pub use config::{ConfigManager, EngineConfig};
pub use dom::Document;
pub use engine::{Engine, PageLanguageSurvey, PassReport};
pub use error::{EngineError, EngineResult};
pub use matcher::ElementMatcher;
pub use settings::{Channel, MemorySettingsStore, SettingsReconciler, SettingsSnapshot, SettingsStore};
pub use themes::{Theme, ThemeCatalogue};
pub use translator::Translator;
pub use watcher::MutationWatcher;
