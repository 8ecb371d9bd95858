//! 站点适配器目录
//!
//! 每个适配器声明某个站点上哪些元素需要标注、排除哪些区域、如何提取原文。
//! 目录按主机名子串匹配，命中多个时取最长的键；都不命中时使用通用适配器。

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// 通用适配器在目录中的键
pub const DEFAULT_ADAPTER_KEY: &str = "default";

/// 原文提取方式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TextExtraction {
    /// 去掉首尾空白的 textContent
    #[default]
    TextContent,
    /// 跳过隐藏子树、排除区域与交互控件的可见文本
    VisibleText,
}

/// 一组选择器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorGroup {
    #[serde(rename = "type")]
    pub kind: String,
    pub elements: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exclude: Vec<String>,
}

impl SelectorGroup {
    fn new(kind: &str, elements: &[&str]) -> Self {
        Self {
            kind: kind.to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
            exclude: Vec::new(),
        }
    }

    fn excluding(mut self, exclude: &[&str]) -> Self {
        self.exclude = exclude.iter().map(|e| e.to_string()).collect();
        self
    }
}

/// 嵌套插入规则：命中的元素把译文插入自身内部
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NestedInsertion {
    pub elements: Vec<String>,
    /// 译文插在该标签之前；缺失时追加到元素末尾
    #[serde(default)]
    pub before: Option<String>,
}

/// 站点适配器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdapterConfig {
    pub name: String,
    #[serde(alias = "selectors")]
    pub selector_groups: Vec<SelectorGroup>,
    #[serde(default)]
    pub extract: TextExtraction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested_insertion: Option<NestedInsertion>,
    #[serde(skip)]
    is_default: bool,
}

impl AdapterConfig {
    pub fn new(name: &str, selector_groups: Vec<SelectorGroup>) -> Self {
        Self {
            name: name.to_string(),
            selector_groups,
            extract: TextExtraction::TextContent,
            nested_insertion: None,
            is_default: false,
        }
    }

    pub fn with_extraction(mut self, extract: TextExtraction) -> Self {
        self.extract = extract;
        self
    }

    pub fn with_nested_insertion(mut self, elements: &[&str], before: Option<&str>) -> Self {
        self.nested_insertion = Some(NestedInsertion {
            elements: elements.iter().map(|e| e.to_string()).collect(),
            before: before.map(str::to_string),
        });
        self
    }

    /// 是否为通用适配器
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// 所有分组的选择器模式
    pub fn element_patterns(&self) -> impl Iterator<Item = &str> {
        self.selector_groups
            .iter()
            .flat_map(|group| group.elements.iter().map(String::as_str))
    }

    /// 所有分组的排除模式
    pub fn exclude_patterns(&self) -> impl Iterator<Item = &str> {
        self.selector_groups
            .iter()
            .flat_map(|group| group.exclude.iter().map(String::as_str))
    }
}

/// 适配器目录
#[derive(Debug, Clone)]
pub struct AdapterCatalogue {
    sites: BTreeMap<String, AdapterConfig>,
    default: AdapterConfig,
}

impl AdapterCatalogue {
    pub fn new(sites: BTreeMap<String, AdapterConfig>, mut default: AdapterConfig) -> Self {
        default.is_default = true;
        Self { sites, default }
    }

    /// 内置目录
    pub fn builtin() -> Self {
        let mut sites = BTreeMap::new();
        sites.insert("reddit.com".to_string(), reddit());
        sites.insert("x.com".to_string(), twitter());
        sites.insert("quora.com".to_string(), quora());
        sites.insert("medium.com".to_string(), medium());
        sites.insert("producthunt.com".to_string(), product_hunt());

        Self::new(sites, universal())
    }

    /// 从 JSON 加载目录，键为主机名片段；缺少 `default` 时沿用内置通用适配器
    pub fn from_json(json: &str) -> EngineResult<Self> {
        let mut sites: BTreeMap<String, AdapterConfig> = serde_json::from_str(json)
            .map_err(|e| EngineError::CatalogueError(format!("解析适配器目录失败: {}", e)))?;

        if sites.is_empty() {
            return Err(EngineError::CatalogueError("适配器目录为空".to_string()));
        }

        let default = sites.remove(DEFAULT_ADAPTER_KEY).unwrap_or_else(universal);
        Ok(Self::new(sites, default))
    }

    /// 按主机名选择适配器
    pub fn for_host(&self, hostname: &str) -> &AdapterConfig {
        let hostname = hostname.to_ascii_lowercase();
        self.sites
            .iter()
            .filter(|(key, _)| hostname.contains(key.as_str()))
            .max_by_key(|(key, _)| key.len())
            .map(|(_, adapter)| adapter)
            .unwrap_or(&self.default)
    }

    pub fn default_adapter(&self) -> &AdapterConfig {
        &self.default
    }

    pub fn sites(&self) -> impl Iterator<Item = (&str, &AdapterConfig)> {
        self.sites.iter().map(|(key, adapter)| (key.as_str(), adapter))
    }
}

impl Default for AdapterCatalogue {
    fn default() -> Self {
        Self::builtin()
    }
}

fn reddit() -> AdapterConfig {
    AdapterConfig::new(
        "Reddit",
        vec![
            SelectorGroup::new(
                "post",
                &[
                    r#"shreddit-post a[slot="title"]"#,
                    r#"shreddit-post h1[slot="title"]"#,
                    r#"shreddit-post div[slot="text-body"] p"#,
                    r#"shreddit-post a[slot="text-body"] p"#,
                ],
            ),
            SelectorGroup::new("comment", &["shreddit-comment-tree p", "shreddit-profile-comment p"]),
            SelectorGroup::new(
                "community-information",
                &[
                    r#"aside[aria-label="Community information"] div[id="description"]"#,
                    r#"aside[aria-label="Community information"] div[class^="i18n-translatable-text"] div[class^="md"] p"#,
                ],
            ),
        ],
    )
    .with_nested_insertion(
        &[r#"shreddit-post a[slot="title"]"#, r#"h1[slot="title"]"#],
        Some("faceplate-perfmark"),
    )
}

fn twitter() -> AdapterConfig {
    AdapterConfig::new(
        "Twitter",
        vec![SelectorGroup::new(
            "tweet",
            &[
                r#"article[data-testid="tweet"] div[lang] span"#,
                r#"article[data-testid="notification"] div[lang] span"#,
                r#"div[data-testid="UserDescription"] span"#,
                r#"button[data-testid="UserCell"] div[dir="auto"] span"#,
            ],
        )],
    )
}

fn quora() -> AdapterConfig {
    AdapterConfig::new(
        "Quora",
        vec![SelectorGroup::new(
            "post",
            &[
                "#mainContent span.q-box.qu-userSelect--text span",
                "#mainContent span.q-box.qu-userSelect--text p span",
                r#"#mainContent div[class^="q-box"] div[class*="qu-bold"]"#,
                "#main_page_wrapper span.q-box.qu-userSelect--text span",
                "#main_page_wrapper span.q-box.qu-userSelect--text p span",
                r#"#main_page_wrapper div[class^="q-box"] div[class*="qu-bold"]"#,
            ],
        )],
    )
}

fn medium() -> AdapterConfig {
    AdapterConfig::new(
        "Medium",
        vec![
            SelectorGroup::new("feed", &["main h2", "main h3"]),
            SelectorGroup::new(
                "article",
                &[
                    "article h1",
                    "article h2",
                    "article h3",
                    "article h4",
                    "article h5",
                    "article h6",
                    r#"article p[class*="pw-post-body-paragraph"]"#,
                    "article ul li",
                    "article ol li",
                ],
            ),
            SelectorGroup::new("comment", &[r#"pre:not([class*=" "])"#]),
        ],
    )
}

fn product_hunt() -> AdapterConfig {
    AdapterConfig::new(
        "Product Hunt",
        vec![SelectorGroup::new(
            "post",
            &[
                r#"main a[href^="/posts/"]"#,
                r#"main a[href^="/products/"]"#,
                "h1",
                "h2",
                r#"div[class^="styles_htmlText"]"#,
            ],
        )],
    )
}

const UNIVERSAL_ELEMENTS: &[&str] = &[
    // 主要内容区域
    "main article p",
    "main article h1, main article h2, main article h3, main article h4",
    "main .content p",
    "main .post-content p",
    "main .article-content p",
    // 文章和段落
    "article p",
    ".post-content p",
    ".article-content p",
    ".entry-content p",
    ".content-area p",
    r#"div[class*="article"] p"#,
    r#"div[class*="post"] p"#,
    r#"div[class*="content"] > p"#,
    ".blog-post p",
    ".blog-content p",
    ".documentation p",
    ".docs-content p",
    "main p",
    "main li",
    r#"[role="main"] p"#,
    r#"[role="main"] li"#,
    ".product-description p",
    ".service-description p",
    "#main-content p",
    "#content p",
    ".main-content p",
    // 标题
    "main h1, main h2, main h3",
    "#main-content h1, #main-content h2, #main-content h3",
    "article h1, article h2, article h3",
    ".content h1, .content h2, .content h3",
    // 列表
    "main ul li",
    "main ol li",
    "article ul li",
    "article ol li",
    ".content ul li",
    ".content ol li",
    ".details p",
    ".detail-content p",
    ".info-block p",
    ".information p",
    ".description p",
    r#"[class*="description"] p"#,
    r#"[class*="text"] p"#,
    r#"[class*="body"] p"#,
    // 链接
    "#main-content a",
    "article a",
    ".content a",
    ".blog-post a",
    ".blog-content a",
    ".documentation a",
    ".docs-content a",
    ".main-content a",
    ".content-area a",
    ".entry-content a",
    ".post-content a",
    ".article-content a",
];

const UNIVERSAL_EXCLUDE: &[&str] = &[
    // 导航
    "nav", "header", ".navigation", ".nav", ".menu", ".navbar", "#navigation",
    r#"[role="navigation"]"#,
    // 侧边栏
    "aside", ".sidebar", "#sidebar", r#"[role="complementary"]"#,
    // 页脚
    "footer", ".footer", "#footer", r#"[role="contentinfo"]"#, ".entry-footer",
    // 评论、广告
    ".comments", "#comments", ".comment-section", ".ads", ".advertisement", ".banner", ".promo",
    // 按钮
    "button", ".btn", r#"[role="button"]"#, ".button",
    // 面包屑与元数据
    ".breadcrumb", ".breadcrumbs", r#"[aria-label="breadcrumb"]"#, ".meta", ".metadata",
    ".post-meta",
    // 社交、作者、相关内容
    ".share", ".social", ".social-media", ".author-info", ".bio", ".profile", ".related",
    ".recommended", ".suggestions",
    // 工具栏、搜索、标签
    ".toolbar", ".tools", ".search", "#search", r#"[role="search"]"#, ".tags", ".categories",
    // 弹窗、通知、购物车、账户
    ".modal", ".popup", ".notification", ".alert", ".cart", ".basket", ".login", ".register",
    ".account",
    // 语言选择与版权
    ".language-selector", ".lang-switch", ".copyright", ".legal",
    // 不可见内容
    "script", "style", "noscript", "template", r#"[aria-hidden="true"]"#, "[hidden]",
    r#"[style*="display: none"]"#, r#"[style*="display:none"]"#,
    r#"[style*="visibility: hidden"]"#, r#"[style*="visibility:hidden"]"#,
    r#"[style*="opacity: 0"]"#, r#"[style*="opacity:0"]"#,
];

fn universal() -> AdapterConfig {
    AdapterConfig::new(
        "Default",
        vec![SelectorGroup::new("main-content", UNIVERSAL_ELEMENTS).excluding(UNIVERSAL_EXCLUDE)],
    )
    .with_extraction(TextExtraction::VisibleText)
}
