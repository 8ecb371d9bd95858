//! 语言判定
//!
//! 判断一段文本是否已经是目标语言。纯函数，不做任何 IO。
//!
//! 先剥离对语言判定没有意义的片段（链接、标识符、邮箱、话题标签、路径、文件名、
//! 长重复字符、排除词表、表情、货币、带单位的数字、数字、标点和空白），得到净文本，
//! 再按目标语言的类型计算占比：
//!
//! - 拉丁语系（英语）：以原文中的英文单词数对比净文本中剩余的非单词字符数
//! - 文字体系语言（中日韩阿）：以净文本中属于目标文字区块的字符占比

pub mod lexicon;

use std::rc::Rc;

use regex::Regex;

pub use lexicon::{Lexicon, LexiconSource};

use crate::config::constants;
use crate::error::{EngineError, EngineResult};

/// 目标语言的判定方式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetLanguage {
    /// 以单词计数判定的拉丁语系语言
    Latin(String),
    Chinese(String),
    Japanese,
    Korean,
    Arabic,
    /// 没有判定规则的语言，一律视为已是目标语言
    Unclassified(String),
}

impl TargetLanguage {
    pub fn from_code(code: &str) -> Self {
        let lower = code.trim().to_ascii_lowercase();
        let primary = lower.split(['-', '_']).next().unwrap_or_default();
        match primary {
            "en" => TargetLanguage::Latin(code.to_string()),
            "zh" => TargetLanguage::Chinese(code.to_string()),
            "ja" => TargetLanguage::Japanese,
            "ko" => TargetLanguage::Korean,
            "ar" => TargetLanguage::Arabic,
            _ => TargetLanguage::Unclassified(code.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            TargetLanguage::Latin(code)
            | TargetLanguage::Chinese(code)
            | TargetLanguage::Unclassified(code) => code,
            TargetLanguage::Japanese => "ja",
            TargetLanguage::Korean => "ko",
            TargetLanguage::Arabic => "ar",
        }
    }
}

/// 判定阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    /// 拉丁语系：单词占比需严格大于该值
    pub latin_ratio: f64,
    /// 文字体系语言：目标字符占比需不小于该值
    pub script_ratio: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            latin_ratio: constants::LATIN_RATIO_THRESHOLD,
            script_ratio: constants::SCRIPT_RATIO_THRESHOLD,
        }
    }
}

/// 预编译的清洗规则，按剥离顺序排列
#[derive(Debug)]
struct Normalizer {
    before_lexicon: Vec<Regex>,
    after_lexicon: Vec<Regex>,
    english_word: Regex,
}

impl Normalizer {
    fn new() -> EngineResult<Self> {
        let before_lexicon = [
            // 链接
            r"(?i)\b(?:https?|ftp)://\S+|\bwww\.\S+",
            // 标识符（token_abcdef123、长十六进制串）
            r"\b[A-Za-z0-9]*_[A-Za-z0-9_]+\b|\b[0-9a-fA-F]{16,}\b",
            // 邮箱
            r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            // 话题标签与提及
            r"[#@][\p{L}\p{N}_]+",
            // 路径
            r"(?:[A-Za-z]:)?(?:[/\\][A-Za-z0-9_.-]+){2,}[/\\]?",
            // 文件名
            r"(?i)\b[A-Za-z0-9_-]+\.(?:txt|md|rs|js|ts|jsx|tsx|py|go|java|c|cpp|h|rb|php|json|toml|ya?ml|xml|csv|html?|css|png|jpe?g|gif|svg|webp|pdf|zip|tar|gz|exe|sh|docx?|xlsx?|pptx?|mp3|mp4|mov|wav)\b",
        ];
        let after_lexicon = [
            // 表情与装饰符号
            r"[\x{1F300}-\x{1F9FF}\x{1FA70}-\x{1FAFF}\x{2600}-\x{27BF}\x{1F000}-\x{1F02F}\x{FE0F}\x{200D}]",
            // 货币代码与符号
            r"(?i)\b(?:USD|EUR|GBP|JPY|CNY|RMB)\b|US\$|CN¥|[$¥€£¢₹₽₩₪₱]",
            // 带单位的数字
            r"(?i)\d+(?:[.,]\d+)?\s*(?:%|(?:kg|mg|g|km|cm|mm|m|ms|s|min|hrs?|h|px|rem|em|pt|tb|gb|mb|kb|ghz|mhz|hz|mah|kw|w|v|k)\b)",
            // 数字
            r"\d+",
            // 标点（含全角）与符号
            r"[\p{P}\p{S}]",
            // 空白
            r"\s+",
        ];

        Ok(Self {
            before_lexicon: compile_all(&before_lexicon)?,
            after_lexicon: compile_all(&after_lexicon)?,
            english_word: compile(r"[a-zA-Z][a-zA-Z\-']*")?,
        })
    }
}

fn compile(pattern: &str) -> EngineResult<Regex> {
    Regex::new(pattern)
        .map_err(|e| EngineError::ConfigError(format!("清洗规则编译失败 {}: {}", pattern, e)))
}

fn compile_all(patterns: &[&str]) -> EngineResult<Vec<Regex>> {
    patterns.iter().map(|p| compile(p)).collect()
}

/// 语言判定器
#[derive(Debug, Clone)]
pub struct LanguageClassifier {
    target: TargetLanguage,
    thresholds: Thresholds,
    lexicon: Rc<Lexicon>,
    normalizer: Rc<Normalizer>,
}

impl LanguageClassifier {
    /// 使用内置词表创建判定器
    pub fn new(target_lang: &str) -> EngineResult<Self> {
        Self::with_lexicon(target_lang, Lexicon::builtin()?, Thresholds::default())
    }

    pub fn with_lexicon(
        target_lang: &str,
        lexicon: Lexicon,
        thresholds: Thresholds,
    ) -> EngineResult<Self> {
        Ok(Self {
            target: TargetLanguage::from_code(target_lang),
            thresholds,
            lexicon: Rc::new(lexicon),
            normalizer: Rc::new(Normalizer::new()?),
        })
    }

    /// 切换目标语言，复用已编译的规则
    pub fn retarget(&self, target_lang: &str) -> Self {
        Self {
            target: TargetLanguage::from_code(target_lang),
            ..self.clone()
        }
    }

    pub fn target(&self) -> &TargetLanguage {
        &self.target
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// 文本是否已是目标语言
    pub fn is_already_target_language(&self, text: &str) -> bool {
        let clean = self.clean_text(text);

        match &self.target {
            TargetLanguage::Latin(_) => self.latin_ratio(text, &clean) > self.thresholds.latin_ratio,
            TargetLanguage::Chinese(_) => {
                if clean.chars().any(is_kana) {
                    return false;
                }
                self.script_ratio(&clean, is_han)
            }
            TargetLanguage::Japanese => {
                if !clean.is_empty() && !clean.chars().any(is_kana) {
                    return false;
                }
                self.script_ratio(&clean, |c| is_kana(c) || is_han(c))
            }
            TargetLanguage::Korean => self.script_ratio(&clean, is_hangul),
            TargetLanguage::Arabic => self.script_ratio(&clean, is_arabic),
            TargetLanguage::Unclassified(_) => true,
        }
    }

    /// 拉丁语系单词占比
    ///
    /// 单词取自原文，分母中的非单词部分取自净文本去掉单词后的剩余字符数。
    pub fn latin_ratio(&self, text: &str, clean: &str) -> f64 {
        let words = self.normalizer.english_word.find_iter(text).count();
        let rest = self
            .normalizer
            .english_word
            .replace_all(clean, "")
            .chars()
            .count();

        let total = words + rest;
        if total == 0 {
            0.0
        } else {
            words as f64 / total as f64
        }
    }

    /// 目标字符占比是否达标，空净文本视为达标
    fn script_ratio(&self, clean: &str, is_target: impl Fn(char) -> bool) -> bool {
        let total = clean.chars().count();
        if total == 0 {
            return true;
        }
        let matched = clean.chars().filter(|&c| is_target(c)).count();
        matched as f64 / total as f64 >= self.thresholds.script_ratio
    }

    /// 生成净文本
    pub fn clean_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for regex in &self.normalizer.before_lexicon {
            result = regex.replace_all(&result, " ").into_owned();
        }
        result = strip_long_repeats(&result, constants::MIN_REPEAT_RUN);
        result = self.lexicon.strip(&result);
        for regex in &self.normalizer.after_lexicon {
            result = regex.replace_all(&result, "").into_owned();
        }
        result
    }
}

/// 去掉同一字符连续出现 `min_run` 次及以上的片段（空白除外）
fn strip_long_repeats(text: &str, min_run: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut result = String::with_capacity(text.len());
    let mut i = 0;
    while i < chars.len() {
        let mut j = i + 1;
        while j < chars.len() && chars[j] == chars[i] {
            j += 1;
        }
        if j - i < min_run || chars[i].is_whitespace() {
            result.extend(&chars[i..j]);
        } else {
            result.push(' ');
        }
        i = j;
    }
    result
}

fn in_ranges(c: char, ranges: &[(u32, u32)]) -> bool {
    let code = c as u32;
    ranges.iter().any(|&(start, end)| code >= start && code <= end)
}

/// CJK 统一汉字及扩展 A-F
pub fn is_han(c: char) -> bool {
    in_ranges(
        c,
        &[
            (0x4E00, 0x9FFF),
            (0x3400, 0x4DBF),
            (0x20000, 0x2A6DF),
            (0x2A700, 0x2B73F),
            (0x2B740, 0x2B81F),
            (0x2B820, 0x2CEAF),
            (0x2CEB0, 0x2EBEF),
        ],
    )
}

/// 平假名、片假名及语音扩展
pub fn is_kana(c: char) -> bool {
    in_ranges(c, &[(0x3040, 0x309F), (0x30A0, 0x30FF), (0x31F0, 0x31FF)])
}

pub fn is_hangul(c: char) -> bool {
    in_ranges(c, &[(0xAC00, 0xD7AF), (0x1100, 0x11FF), (0x3130, 0x318F)])
}

pub fn is_arabic(c: char) -> bool {
    in_ranges(
        c,
        &[
            (0x0600, 0x06FF),
            (0x0750, 0x077F),
            (0x08A0, 0x08FF),
            (0xFB50, 0xFDFF),
            (0xFE70, 0xFEFF),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const HAN: &str = "一二三四五六七八九十";

    fn classifier(lang: &str) -> LanguageClassifier {
        LanguageClassifier::new(lang).unwrap()
    }

    #[test]
    fn test_pure_han_is_chinese() {
        let text = HAN.repeat(10);
        assert_eq!(text.chars().count(), 100);
        assert!(classifier("zh-CN").is_already_target_language(&text));
    }

    #[test]
    fn test_mostly_latin_letters_is_not_chinese() {
        let text = format!("{}{}", HAN, "qwertyuiop".repeat(9));
        assert!(!classifier("zh-CN").is_already_target_language(&text));
    }

    #[test]
    fn test_han_without_kana_is_not_japanese() {
        let text = "你好世界";
        assert!(!classifier("ja").is_already_target_language(text));
        assert!(classifier("zh-CN").is_already_target_language(text));
    }

    #[test]
    fn test_kana_blocks_chinese() {
        let text = "日本語の文章です";
        assert!(classifier("ja").is_already_target_language(text));
        assert!(!classifier("zh-CN").is_already_target_language(text));
    }

    #[test]
    fn test_symbol_only_text_is_vacuously_target() {
        let c = classifier("zh-CN");
        assert_eq!(c.clean_text("123 !!! 😀 $45"), "");
        assert!(c.is_already_target_language("123 !!! 😀 $45"));
    }

    #[test]
    fn test_english_target() {
        let c = classifier("en");
        assert!(c.is_already_target_language("This is a plain English sentence."));
        assert!(!c.is_already_target_language("你好世界"));
        assert!(!c.is_already_target_language(""));
    }

    #[test]
    fn test_brand_words_do_not_count_as_english_noise() {
        let c = classifier("zh-CN");
        // 品牌词与链接被剥离后只剩中文
        assert!(c.is_already_target_language(
            "在 GitHub 上查看 https://github.com/foo/bar 的 Pull Request"
        ));
    }

    #[test]
    fn test_clean_text_strips_noise() {
        let c = classifier("ko");
        let clean = c.clean_text("안녕하세요 user@example.com #tag 5kg /usr/local/bin main.rs，。");
        assert_eq!(clean, "안녕하세요");
        assert!(c.is_already_target_language("안녕하세요 user@example.com"));
    }

    #[test]
    fn test_long_repeats_removed() {
        assert_eq!(strip_long_repeats("好好好好好看", 4), " 看");
        assert_eq!(strip_long_repeats("hello", 4), "hello");
        assert_eq!(strip_long_repeats("a    b", 4), "a    b");
    }

    #[test]
    fn test_arabic_and_unclassified() {
        assert!(classifier("ar").is_already_target_language("مرحبا بالعالم"));
        assert!(!classifier("ar").is_already_target_language("Hello world"));
        assert!(classifier("ru").is_already_target_language("Hello world"));
    }

    #[test]
    fn test_retarget_keeps_thresholds() {
        let zh = classifier("zh-CN");
        let ja = zh.retarget("ja");
        assert_eq!(ja.target(), &TargetLanguage::Japanese);
        assert_eq!(ja.thresholds(), zh.thresholds());
    }
}
