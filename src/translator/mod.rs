//! 翻译提供方
//!
//! 提供方永远返回字符串：失败时返回本地化的错误提示而不是 `Err`。
//! 引擎把空串或与原文相同的结果视为“不标注”。

#[cfg(feature = "google-provider")]
pub mod google;

use async_trait::async_trait;

#[cfg(feature = "google-provider")]
pub use google::GoogleTranslator;

/// 网络不可达或超时时的提示
pub const PROXY_HINT: &str = "无法访问Google翻译api，请检查您的代理设置!";

/// 翻译接口
#[async_trait(?Send)]
pub trait Translator {
    /// 把 `text` 翻译成 `target_lang`
    async fn translate(&self, text: &str, target_lang: &str) -> String;
}

/// 接口受限时按目标语言返回的提示，未知语言回退到英文
pub fn restricted_message(target_lang: &str) -> &'static str {
    match target_lang {
        "zh-CN" => "Google翻译接口今日被限制使用",
        "ja" => "Google翻訳APIの今日の使用が制限されています",
        "ko" => "Google 번역 API가 오늘 사용이 제한되었습니다",
        "ar" => "واجهة برمجة ترجمة Google مقيدة اليوم",
        _ => "Google Translate API is restricted today",
    }
}

/// 是否为提供方的失败提示，这类结果不进入缓存
pub fn is_failure_message(text: &str) -> bool {
    text == PROXY_HINT
        || ["zh-CN", "ja", "ko", "ar", "en"]
            .iter()
            .any(|lang| text == restricted_message(lang))
}

/// 提供方检测出的源语言中，哪些代码等同于目标语言
pub fn equivalent_language_codes(target_lang: &str) -> Vec<&str> {
    match target_lang {
        "zh-CN" => vec!["zh-CN", "zh"],
        other => vec![other],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restricted_message_fallback() {
        assert_eq!(restricted_message("zh-CN"), "Google翻译接口今日被限制使用");
        assert_eq!(restricted_message("fr"), "Google Translate API is restricted today");
        assert!(is_failure_message(restricted_message("ko")));
        assert!(is_failure_message(PROXY_HINT));
        assert!(!is_failure_message("你好"));
    }

    #[test]
    fn test_equivalent_codes() {
        assert_eq!(equivalent_language_codes("zh-CN"), vec!["zh-CN", "zh"]);
        assert_eq!(equivalent_language_codes("ko"), vec!["ko"]);
    }
}
