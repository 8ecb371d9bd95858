//! 候选元素匹配
//!
//! 把适配器声明的选择器模式解析成具体元素列表，并负责原文提取。
//! 无效的模式在构造时记录一次警告，之后按“无匹配”处理，不影响其他模式。

use cssparser::{Delimiter, ParseError, Parser, ParserInput, Token};
use markup5ever_rcdom::{Handle, NodeData};
use tracing::{debug, warn};

use crate::adapters::{AdapterConfig, TextExtraction};
use crate::config::constants::ANNOTATION_CLASS;
use crate::dom::node::{ancestor_elements, get_node_attr, has_class, has_node_attr, has_tag};
use crate::dom::{Document, SelectorList, SelectorPattern};

/// 不参与渲染的标签
const NON_RENDERED_TAGS: &[&str] = &["script", "style", "noscript", "template", "head"];

/// 交互控件
const INTERACTIVE_TAGS: &[&str] = &["button", "input", "select", "textarea"];

/// 编译后的适配器
pub struct ElementMatcher {
    adapter: AdapterConfig,
    patterns: Vec<SelectorPattern>,
    exclude: Vec<SelectorPattern>,
    nested: Option<SelectorList>,
}

impl ElementMatcher {
    pub fn new(adapter: &AdapterConfig) -> Self {
        let patterns = compile_patterns(&adapter.name, adapter.element_patterns());
        let exclude = compile_patterns(&adapter.name, adapter.exclude_patterns());

        let nested = adapter.nested_insertion.as_ref().and_then(|rule| {
            match SelectorList::parse(&rule.elements.join(", ")) {
                Ok(list) => Some(list),
                Err(e) => {
                    warn!("适配器 {} 的嵌套插入规则无效: {}", adapter.name, e);
                    None
                }
            }
        });

        Self {
            adapter: adapter.clone(),
            patterns,
            exclude,
            nested,
        }
    }

    pub fn adapter(&self) -> &AdapterConfig {
        &self.adapter
    }

    pub fn patterns(&self) -> &[SelectorPattern] {
        &self.patterns
    }

    /// 按模式顺序拼接所有候选元素
    ///
    /// 不同模式之间的重复元素保留，由状态机去重。
    pub fn get_candidates(&self, document: &Document) -> Vec<Handle> {
        let root = document.root();
        let candidates: Vec<Handle> = self
            .patterns
            .iter()
            .flat_map(|pattern| pattern.resolve(&root))
            .collect();

        debug!("适配器 {} 匹配到 {} 个候选元素", self.adapter.name, candidates.len());
        candidates
    }

    /// 新增节点是否可能带来新的候选元素
    pub fn touches(&self, node: &Handle) -> bool {
        self.patterns.iter().any(|pattern| pattern.touches(node))
    }

    /// 元素是否使用嵌套插入
    pub fn is_nested(&self, element: &Handle) -> bool {
        self.nested.as_ref().is_some_and(|list| list.matches(element))
    }

    /// 嵌套插入时译文之前的标记标签
    pub fn nested_marker(&self) -> Option<&str> {
        self.adapter
            .nested_insertion
            .as_ref()
            .and_then(|rule| rule.before.as_deref())
    }

    /// 提取原文，不可见或被排除的元素返回空串
    pub fn extract_text(&self, document: &Document, element: &Handle) -> String {
        match self.adapter.extract {
            TextExtraction::TextContent => {
                let mut text = String::new();
                collect_text(element, &mut text, false);
                text.trim().to_string()
            }
            TextExtraction::VisibleText => {
                if self.is_excluded(element)
                    || !is_rendered(document, element)
                    || is_inside_interactive(element)
                {
                    return String::new();
                }
                let mut text = String::new();
                collect_text(element, &mut text, true);
                text.trim().to_string()
            }
        }
    }

    /// 元素自身或祖先命中排除规则
    pub fn is_excluded(&self, element: &Handle) -> bool {
        if self.exclude.is_empty() {
            return false;
        }
        std::iter::once(element.clone())
            .chain(ancestor_elements(element))
            .any(|node| self.exclude.iter().any(|pattern| pattern.matches(&node)))
    }
}

fn compile_patterns<'a>(
    adapter: &str,
    sources: impl Iterator<Item = &'a str>,
) -> Vec<SelectorPattern> {
    sources
        .filter_map(|source| match SelectorPattern::classify(source) {
            Ok(pattern) => Some(pattern),
            Err(e) => {
                warn!("适配器 {} 的选择器 {:?} 无效，已忽略: {}", adapter, source, e);
                None
            }
        })
        .collect()
}

/// 递归拼接文本，跳过标注节点；`visible_only` 时同时跳过隐藏子树
fn collect_text(node: &Handle, text: &mut String, visible_only: bool) {
    match &node.data {
        NodeData::Text { contents } => text.push_str(&contents.borrow()),
        NodeData::Element { .. } => {
            if has_class(node, ANNOTATION_CLASS) {
                return;
            }
            if visible_only && is_hidden_element(node) {
                return;
            }
            for child in node.children.borrow().iter() {
                collect_text(child, text, visible_only);
            }
        }
        NodeData::Document => {
            for child in node.children.borrow().iter() {
                collect_text(child, text, visible_only);
            }
        }
        _ => {}
    }
}

/// 元素是否会被渲染：挂在文档上，且自身与祖先都没有隐藏
pub fn is_rendered(document: &Document, element: &Handle) -> bool {
    document.is_connected(element)
        && !is_hidden_element(element)
        && !ancestor_elements(element).iter().any(is_hidden_element)
}

/// 单个元素在标记层面是否隐藏
pub fn is_hidden_element(element: &Handle) -> bool {
    if NON_RENDERED_TAGS.iter().any(|tag| has_tag(element, tag)) {
        return true;
    }
    if has_node_attr(element, "hidden") {
        return true;
    }
    if get_node_attr(element, "aria-hidden").is_some_and(|v| v.trim() == "true") {
        return true;
    }
    get_node_attr(element, "style").is_some_and(|style| style_hides(&style))
}

/// 内联样式是否隐藏元素
fn style_hides(style: &str) -> bool {
    let mut input = ParserInput::new(style);
    let mut parser = Parser::new(&mut input);

    while !parser.is_exhausted() {
        let declaration: Result<bool, ParseError<'_, ()>> =
            parser.parse_until_after(Delimiter::Semicolon, |p| {
                let property = p.expect_ident()?.to_ascii_lowercase();
                p.expect_colon()?;
                let value = p.next()?.clone();
                // 余下的 `!important` 等记号不影响判断
                while p.next().is_ok() {}
                Ok(declaration_hides(&property, &value))
            });
        if let Ok(true) = declaration {
            return true;
        }
    }
    false
}

fn declaration_hides(property: &str, value: &Token<'_>) -> bool {
    match (property, value) {
        ("display", Token::Ident(v)) => v.eq_ignore_ascii_case("none"),
        ("visibility", Token::Ident(v)) => v.eq_ignore_ascii_case("hidden"),
        ("opacity", Token::Number { value, .. }) => *value == 0.0,
        ("opacity", Token::Percentage { unit_value, .. }) => *unit_value == 0.0,
        _ => false,
    }
}

fn is_inside_interactive(element: &Handle) -> bool {
    std::iter::once(element.clone())
        .chain(ancestor_elements(element))
        .any(|node| INTERACTIVE_TAGS.iter().any(|tag| has_tag(&node, tag)))
}
