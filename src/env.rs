//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，所有变量均以 `INTERLINEAR_` 为前缀

use std::env;
use std::fmt;
use std::time::Duration;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }

    /// 仅在变量已设置时解析，用于覆盖配置文件中的值
    fn get_if_set() -> Option<EnvResult<T>> {
        env::var(Self::NAME).ok().map(|value| Self::parse(&value))
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志级别
    pub struct LogLevel;
    impl EnvVar<String> for LogLevel {
        const NAME: &'static str = "INTERLINEAR_LOG_LEVEL";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Log level: trace, debug, info, warn, error";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("info".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            match value.to_lowercase().as_str() {
                "trace" | "debug" | "info" | "warn" | "error" => Ok(value.to_lowercase()),
                _ => Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: format!(
                        "Invalid log level '{}'. Use: trace, debug, info, warn, error",
                        value
                    ),
                }),
            }
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 标注引擎相关环境变量
pub mod engine {
    use super::*;

    /// 变更触发重扫的防抖间隔
    pub struct DebounceInterval;
    impl EnvVar<Duration> for DebounceInterval {
        const NAME: &'static str = "INTERLINEAR_DEBOUNCE_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(200));
        const DESCRIPTION: &'static str = "Debounce interval for mutation-triggered rescans (ms)";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 0, 10_000)
        }
    }

    /// 设置轮询间隔
    pub struct PollInterval;
    impl EnvVar<Duration> for PollInterval {
        const NAME: &'static str = "INTERLINEAR_POLL_INTERVAL_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(1500));
        const DESCRIPTION: &'static str = "Settings store polling interval (ms)";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 100, 60_000)
        }
    }

    /// 译文缓存容量
    pub struct CacheCapacity;
    impl EnvVar<usize> for CacheCapacity {
        const NAME: &'static str = "INTERLINEAR_CACHE_CAPACITY";
        const DEFAULT: Option<usize> = Some(2000);
        const DESCRIPTION: &'static str = "Annotation cache capacity (number of fingerprints)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 1_000_000)
        }
    }

    /// 目标语言
    pub struct TargetLang;
    impl EnvVar<String> for TargetLang {
        const NAME: &'static str = "INTERLINEAR_TARGET_LANG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Default target language (zh-CN, ja, ko, ar, en)";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("zh-CN".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let lang = value.trim();
            if lang.is_empty() || lang.len() > 8 {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Language tag must be 1-8 characters".to_string(),
                });
            }
            Ok(lang.to_string())
        }
    }
}

/// 翻译提供方相关环境变量
pub mod provider {
    use super::*;

    /// 翻译接口地址
    pub struct Endpoint;
    impl EnvVar<String> for Endpoint {
        const NAME: &'static str = "INTERLINEAR_PROVIDER_ENDPOINT";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Translation provider endpoint URL";

        fn get() -> EnvResult<String> {
            match env::var(Self::NAME) {
                Ok(value) => Self::parse(&value),
                Err(_) => Ok("https://translate.googleapis.com/translate_a/single".to_string()),
            }
        }

        fn parse(value: &str) -> EnvResult<String> {
            let url = value.trim();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(url.to_string())
            } else {
                Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Endpoint must start with http:// or https://".to_string(),
                })
            }
        }
    }

    /// 单次请求超时
    pub struct Timeout;
    impl EnvVar<Duration> for Timeout {
        const NAME: &'static str = "INTERLINEAR_PROVIDER_TIMEOUT_MS";
        const DEFAULT: Option<Duration> = Some(Duration::from_millis(5000));
        const DESCRIPTION: &'static str = "Translation request timeout (ms)";

        fn parse(value: &str) -> EnvResult<Duration> {
            parse_millis(value, Self::NAME, 100, 120_000)
        }
    }
}

/// 解析布尔值
fn parse_bool(value: &str, var_name: &str) -> EnvResult<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Invalid boolean value '{}'. Use: true/false, 1/0, yes/no, on/off", value),
        }),
    }
}

/// 解析有范围限制的正整数
fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive integer".to_string(),
    })?;

    if num < min || num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value must be between {} and {}", min, max),
        });
    }

    Ok(num)
}

fn parse_millis(value: &str, var_name: &str, min: u64, max: u64) -> EnvResult<Duration> {
    let millis: u64 = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid number of milliseconds".to_string(),
    })?;

    if millis < min || millis > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value must be between {} and {} ms", min, max),
        });
    }

    Ok(Duration::from_millis(millis))
}

/// 开关型变量，供 CLI 使用
pub struct UniversalAdapter;
impl EnvVar<bool> for UniversalAdapter {
    const NAME: &'static str = "INTERLINEAR_UNIVERSAL_ADAPTER";
    const DEFAULT: Option<bool> = Some(false);
    const DESCRIPTION: &'static str = "Enable the universal adapter for hosts without a site adapter";

    fn parse(value: &str) -> EnvResult<bool> {
        parse_bool(value, Self::NAME)
    }
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables Documentation\n\n");

    docs.push_str("## Core Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::LogLevel::NAME,
        core::LogLevel::DESCRIPTION,
        core::LogLevel::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::NoColor::NAME,
        core::NoColor::DESCRIPTION,
        core::NoColor::DEFAULT
    ));

    docs.push_str("\n## Engine Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        engine::DebounceInterval::NAME,
        engine::DebounceInterval::DESCRIPTION,
        engine::DebounceInterval::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        engine::PollInterval::NAME,
        engine::PollInterval::DESCRIPTION,
        engine::PollInterval::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        engine::CacheCapacity::NAME,
        engine::CacheCapacity::DESCRIPTION,
        engine::CacheCapacity::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        engine::TargetLang::NAME,
        engine::TargetLang::DESCRIPTION,
        engine::TargetLang::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        UniversalAdapter::NAME,
        UniversalAdapter::DESCRIPTION,
        UniversalAdapter::DEFAULT
    ));

    docs.push_str("\n## Provider Configuration\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        provider::Endpoint::NAME,
        provider::Endpoint::DESCRIPTION,
        provider::Endpoint::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        provider::Timeout::NAME,
        provider::Timeout::DESCRIPTION,
        provider::Timeout::DEFAULT
    ));

    docs
}
