//! 设置同步
//!
//! 同一份设置通过两条通道到达：写入时的推送通知与固定间隔的轮询。
//! [`SettingsReconciler`] 是二者唯一的消费者，持有最近一次应用的快照，
//! 只有与之不同的快照才会被应用，并由 [`ChangeToken`] 保证同一时刻只有一次应用在进行。

pub mod reconciler;
pub mod store;

use serde_json::Value;

pub use reconciler::{Channel, ChangeToken, SettingsDiff, SettingsReconciler};
pub use store::{MemorySettingsStore, SettingsStore};

use crate::config::constants::{DEFAULT_TARGET_LANG, DEFAULT_THEME};

/// 设置存储中的原始键值
pub type SettingsSnapshot = serde_json::Map<String, Value>;

/// 设置存储中的键名
pub mod keys {
    pub const ENABLED: &str = "enabled";
    pub const TARGET_LANG: &str = "targetLang";
    pub const THEME: &str = "theme";
    pub const UNIVERSAL_ADAPTER: &str = "enableUniversalAdapter";
    pub const SELECTION_ENABLED: &str = "selectionEnabled";
    pub const HIDE_UNIVERSAL_TIP: &str = "hideUniversalAdapterTip";
}

/// 应用设置变化后需要执行的动作，按声明顺序执行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsEffect {
    /// 移除全部标注并清空缓存
    RemoveAll,
    /// 就地改写标注样式
    Restyle(String),
    /// 运行一轮标注
    Annotate,
}

/// 引擎使用的权威设置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub enabled: bool,
    pub target_lang: String,
    pub theme: String,
    pub universal_adapter_enabled: bool,
    pub hide_universal_tip: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            target_lang: DEFAULT_TARGET_LANG.to_string(),
            theme: DEFAULT_THEME.to_string(),
            universal_adapter_enabled: false,
            hide_universal_tip: false,
        }
    }
}

impl EngineSettings {
    /// 从原始快照读取，缺失或类型不符的键取默认值
    pub fn from_snapshot(snapshot: &SettingsSnapshot) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            snapshot.get(key).and_then(Value::as_bool).unwrap_or(default)
        };
        let text = |key: &str, default: String| {
            snapshot
                .get(key)
                .and_then(Value::as_str)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .unwrap_or(default)
        };

        Self {
            enabled: flag(keys::ENABLED, defaults.enabled),
            target_lang: text(keys::TARGET_LANG, defaults.target_lang),
            theme: text(keys::THEME, defaults.theme),
            universal_adapter_enabled: flag(
                keys::UNIVERSAL_ADAPTER,
                defaults.universal_adapter_enabled,
            ),
            hide_universal_tip: flag(keys::HIDE_UNIVERSAL_TIP, defaults.hide_universal_tip),
        }
    }

    /// 用新快照替换当前设置，返回需要执行的动作
    ///
    /// - 关闭：移除全部；开启：运行一轮
    /// - 启用期间切换目标语言：移除全部后重新运行
    /// - 通用适配器关闭：移除全部后重新运行（默认适配器此时不再产出候选）；开启：运行一轮
    /// - 主题变化：无论开关状态都先改写样式，之后新建的标注使用新主题
    pub fn apply(&mut self, snapshot: &SettingsSnapshot) -> Vec<SettingsEffect> {
        let next = Self::from_snapshot(snapshot);
        let previous = std::mem::replace(self, next);
        let current = &*self;

        let mut remove_all = false;
        let mut annotate = false;
        let restyle = previous.theme != current.theme;

        match (previous.enabled, current.enabled) {
            (true, false) => remove_all = true,
            (false, true) => annotate = true,
            (false, false) => {}
            (true, true) => {
                if previous.target_lang != current.target_lang {
                    remove_all = true;
                    annotate = true;
                }
                match (
                    previous.universal_adapter_enabled,
                    current.universal_adapter_enabled,
                ) {
                    (true, false) => {
                        remove_all = true;
                        annotate = true;
                    }
                    (false, true) => annotate = true,
                    _ => {}
                }
            }
        }

        let mut effects = Vec::new();
        if restyle {
            effects.push(SettingsEffect::Restyle(current.theme.clone()));
        }
        if remove_all {
            effects.push(SettingsEffect::RemoveAll);
        }
        if annotate {
            effects.push(SettingsEffect::Annotate);
        }
        effects
    }
}
