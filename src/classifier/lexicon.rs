//! 排除词表
//!
//! 品牌名、产品名、交互用语与技术标准缩写在任何语言的页面里都以原文出现，
//! 计算语言占比前需要先剔除，否则会把中文页面里的 “GitHub” “Like” 算作英文信号。

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// 产品交互常用词
const INTERACTIONS: &[&str] = &[
    // 基础交互
    "Like", "Unlike", "Comment", "Reply", "Share", "Follow", "Unfollow", "Subscribe",
    "Unsubscribe", "Post", "Repost", "Forward", "Download", "Upload", "Save", "Delete", "Edit",
    "Report", "Block", "Mute",
    // 社交媒体
    "Tweet", "Retweet", "Pin", "Favorite", "Bookmark", "Tag", "Mention", "DM",
    // 内容互动
    "Upvote", "Downvote", "Rate", "Review", "Thumbs up", "Thumbs down", "React", "Love", "Wow",
    "Haha", "Sad", "Angry",
    // 代码仓库
    "Fork", "Clone", "Pull Request", "Merge", "Commit", "Branch", "Issue", "Watch", "Star",
];

/// 科技公司
const COMPANIES: &[&str] = &[
    "Apple", "Google", "Microsoft", "Amazon", "Meta", "Tesla", "Intel", "AMD", "NVIDIA",
    "Samsung", "Sony", "LG", "Huawei", "Xiaomi", "OPPO", "VIVO", "OnePlus", "Lenovo", "Dell",
    "HP", "IBM", "Oracle", "Cisco", "Adobe", "Twitter", "LinkedIn", "TikTok", "ByteDance",
    "Tencent", "Alibaba", "Baidu",
];

/// 产品名
const PRODUCTS: &[&str] = &[
    // 操作系统
    "iOS", "iPadOS", "macOS", "watchOS", "tvOS", "Android", "Windows", "Linux", "Ubuntu",
    "Debian", "CentOS", "RedHat", "Fedora",
    // 浏览器
    "Chrome", "Firefox", "Safari", "Edge", "Opera",
    // 编程语言和框架
    "JavaScript", "TypeScript", "Python", "Java", "C++", "Rust", "Go", "Swift", "Kotlin",
    "React", "Vue", "Angular", "Node.js", "Django", "Flask", "Spring", "Laravel", "Kubernetes",
    "Dockerfile", "Docker", "Docker Compose", "Git", "GitHub", "GitLab",
    // 设备和硬件
    "iPhone", "iPad", "MacBook", "iMac", "AirPods", "Apple Watch", "Galaxy", "Surface",
    "ThinkPad", "PlayStation", "Xbox", "Nintendo", "Switch",
    // 软件和应用
    "Photoshop", "Illustrator", "Word", "Excel", "PowerPoint", "Outlook", "Teams", "Slack",
    "Discord", "Zoom", "WeChat", "WhatsApp", "Telegram", "Signal", "Gmail", "YouTube",
    "Netflix", "Spotify", "Instagram", "Facebook", "LinkedIn", "Bitbucket", "VS Code",
    "IntelliJ", "PyCharm", "WebStorm", "Xcode",
];

/// 技术标准和协议
const STANDARDS: &[&str] = &[
    "HTTP", "HTTPS", "FTP", "SSH", "SSL", "TLS", "TCP", "IP", "DNS", "HTML", "CSS", "JSON",
    "XML", "REST", "GraphQL", "OAuth", "JWT", "WebSocket", "SMTP", "IMAP", "POP3", "API", "SDK",
    "CLI",
];

/// 产品型号规则（不区分大小写）
const PRODUCT_PATTERNS: &[&str] = &[
    r"iPhone\s*(?:1[1-9]|[1-9]\d)\s*(?:Pro\s*Max|Pro|Plus|mini)?",
    r"(?:Xiaomi|Redmi)\s*(?:[A-Z][0-9]|[0-9]+[A-Z]?|Note\s*[0-9]+|SU[0-9])",
    r"(?:Huawei|Honor)\s*(?:P[0-9]+|Mate\s*[0-9]+|Nova\s*[0-9]+)",
    r"(?:Samsung\s*)?Galaxy\s*(?:S[0-9]+|Note\s*[0-9]+|A[0-9]+|Z\s*(?:Fold|Flip)\s*[0-9])",
    r"OPPO\s*(?:Find\s*[A-Z][0-9]|Reno[0-9]|[A-Z][0-9])",
    r"VIVO\s*(?:X[0-9]+|Y[0-9]+|[A-Z][0-9]+)",
    r"MacBook\s*(?:Air|Pro)?\s*(?:1[1-9]|[1-9]\d)?(?:\s*inch)?",
    r"ThinkPad\s*(?:X1|T[0-9]+|X[0-9]+|P[0-9]+|E[0-9]+)",
    r"PlayStation\s*[0-9]+|PS[0-9]+",
    r"Xbox\s*(?:One|Series\s*[SX])",
];

/// 词表的可序列化形式，用于从配置文件加载自定义词表
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LexiconSource {
    #[serde(default)]
    pub words: Vec<String>,
    #[serde(default)]
    pub product_patterns: Vec<String>,
}

/// 编译好的排除词表
#[derive(Debug, Clone)]
pub struct Lexicon {
    words: Vec<String>,
    word_regex: Option<Regex>,
    product_patterns: Vec<Regex>,
}

impl Lexicon {
    /// 内置词表
    pub fn builtin() -> EngineResult<Self> {
        let words = INTERACTIONS
            .iter()
            .chain(COMPANIES)
            .chain(PRODUCTS)
            .chain(STANDARDS)
            .map(|w| w.to_string())
            .collect();
        let patterns = PRODUCT_PATTERNS.iter().map(|p| p.to_string()).collect();

        Self::compile(LexiconSource {
            words,
            product_patterns: patterns,
        })
    }

    /// 编译词表
    ///
    /// 词按长度降序组成一个交替式，保证 “Docker Compose” 先于 “Docker” 命中；
    /// 以单词字符开头或结尾的词加上 `\b` 边界，`C++` 这类词只在单词字符一侧加边界。
    pub fn compile(source: LexiconSource) -> EngineResult<Self> {
        let mut words: Vec<String> = source
            .words
            .into_iter()
            .map(|w| w.trim().to_string())
            .filter(|w| !w.is_empty())
            .collect();
        words.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        words.dedup();

        let word_regex = if words.is_empty() {
            None
        } else {
            let alternation = words
                .iter()
                .map(|word| bounded(word))
                .collect::<Vec<_>>()
                .join("|");
            Some(Regex::new(&alternation).map_err(|e| {
                EngineError::ConfigError(format!("排除词表编译失败: {}", e))
            })?)
        };

        let product_patterns = source
            .product_patterns
            .iter()
            .map(|pattern| {
                Regex::new(&format!("(?i){}", pattern)).map_err(|e| {
                    EngineError::ConfigError(format!("产品型号规则无效 {}: {}", pattern, e))
                })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        Ok(Self {
            words,
            word_regex,
            product_patterns,
        })
    }

    /// 剔除词表命中的片段
    ///
    /// 型号规则先于整词执行，否则 “Galaxy” 会先被当作品牌词剔除，型号残留下来。
    pub fn strip(&self, text: &str) -> String {
        let mut result = text.to_string();
        for pattern in &self.product_patterns {
            result = pattern.replace_all(&result, " ").into_owned();
        }
        match &self.word_regex {
            Some(regex) => regex.replace_all(&result, " ").into_owned(),
            None => result,
        }
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len() + self.product_patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn bounded(word: &str) -> String {
    let escaped = regex::escape(word);
    let starts_word = word.chars().next().is_some_and(|c| c.is_alphanumeric());
    let ends_word = word.chars().last().is_some_and(|c| c.is_alphanumeric());

    format!(
        "{}{}{}",
        if starts_word { r"\b" } else { "" },
        escaped,
        if ends_word { r"\b" } else { "" }
    )
}
