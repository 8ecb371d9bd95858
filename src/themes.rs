//! 译文主题
//!
//! 主题只影响标注节点的内联样式，切换主题时就地改写 `style`，不重新生成任何文本。

use serde::{Deserialize, Serialize};

use crate::config::constants::DEFAULT_THEME;

/// 译文配色
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Theme {
    pub key: String,
    pub name: String,
    pub background_color: String,
    pub color: String,
    pub border_left_color: String,
}

impl Theme {
    fn new(key: &str, name: &str, background: &str, color: &str, border: &str) -> Self {
        Self {
            key: key.to_string(),
            name: name.to_string(),
            background_color: background.to_string(),
            color: color.to_string(),
            border_left_color: border.to_string(),
        }
    }

    /// 标注节点的内联样式
    pub fn inline_style(&self) -> String {
        [
            "display: block".to_string(),
            "visibility: visible".to_string(),
            "margin-top: 8px".to_string(),
            "padding: 8px 12px".to_string(),
            format!("border-left: 3px solid {}", self.border_left_color),
            format!("color: {}", self.color),
            "font-size: 14px".to_string(),
            "line-height: 1.4".to_string(),
            "opacity: 1".to_string(),
            "height: auto".to_string(),
            "overflow: visible".to_string(),
            "position: relative".to_string(),
            "z-index: 1".to_string(),
            format!("background-color: {}", self.background_color),
            "margin-left: 4px".to_string(),
            "pointer-events: none".to_string(),
            "clear: both".to_string(),
            "width: fit-content".to_string(),
            "max-width: 100%".to_string(),
            "box-sizing: border-box".to_string(),
            "border-radius: 4px".to_string(),
        ]
        .iter()
        .map(|declaration| format!("{} !important;", declaration))
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// 主题目录
#[derive(Debug, Clone)]
pub struct ThemeCatalogue {
    themes: Vec<Theme>,
}

impl ThemeCatalogue {
    pub fn builtin() -> Self {
        Self {
            themes: vec![
                Theme::new("dark", "Dark", "#1a1a1a", "#ffffff", "#4a4a4a"),
                Theme::new("light", "Light", "#ffffff", "#000000", "#0079d3"),
                Theme::new("deepBlue", "Deep Blue", "#1a365d", "#ffffff", "#2b4c7c"),
                Theme::new("darkGrayOrange", "Dark Gray & Orange", "#2D3748", "#ED8936", "#4A5568"),
                Theme::new("brownYellow", "Brown & Yellow", "#744210", "#F6E05E", "#975A16"),
                Theme::new("almostBlackSkyBlue", "Almost Black & Sky Blue", "#1A202C", "#63B3ED", "#2D3748"),
                Theme::new("purpleYellow", "Purple & Yellow", "#702459", "#FBBF24", "#8B2C5F"),
                Theme::new("darkGreenLightGreen", "Dark Green & Light Green", "#065F46", "#6EE7B7", "#047857"),
                Theme::new("blackNeonGreen", "Black & Neon Green", "#131516", "#70e000", "#2a2e30"),
                Theme::new("mysticBlackSlateBlue", "Mystic Black & Slate Blue", "#000000", "#6A5ACD", "#483D8B"),
            ],
        }
    }

    /// 按键查找主题，未知键回退到暗色主题
    pub fn resolve(&self, key: &str) -> &Theme {
        self.themes
            .iter()
            .find(|theme| theme.key == key)
            .or_else(|| self.themes.iter().find(|theme| theme.key == DEFAULT_THEME))
            .unwrap_or(&self.themes[0])
    }

    pub fn contains(&self, key: &str) -> bool {
        self.themes.iter().any(|theme| theme.key == key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.themes.iter().map(|theme| theme.key.as_str())
    }
}

impl Default for ThemeCatalogue {
    fn default() -> Self {
        Self::builtin()
    }
}
