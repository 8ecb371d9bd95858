//! 选择器引擎
//!
//! 基于 `cssparser` 的分词器实现站点适配器需要的 CSS 子集：
//!
//! - 类型、通配、`.class`、`#id`
//! - 属性选择器 `[a]`、`[a=v]`、`[a~=v]`、`[a|=v]`、`[a^=v]`、`[a$=v]`、`[a*=v]`（支持 `i` 标志）
//! - 后代与 `>` 子代组合符、`,` 选择器列表、`:not(...)`
//!
//! 其余语法返回 [`SelectorError`]，由调用方记录日志并按“无匹配”处理。
//!
//! 适配器里的模式串先经过 [`SelectorPattern::classify`] 分类：
//! 由空格分隔的纯标签链走逐层标签查找，其他一律交给完整的选择器匹配。

use cssparser::{ParseError, ParseErrorKind, Parser, ParserInput, Token};
use markup5ever_rcdom::Handle;
use thiserror::Error;

use super::node::{
    descendant_elements, elements_by_tag, get_node_attr, has_tag, is_element, parent_element,
};

/// 选择器错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// 语法错误
    #[error("无效的选择器: {0}")]
    Syntax(String),

    /// 不支持的语法
    #[error("不支持的选择器语法: {0}")]
    Unsupported(String),

    /// 空选择器
    #[error("空选择器")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrOperator {
    Exists,
    Equals,
    Includes,
    DashMatch,
    Prefix,
    Suffix,
    Substring,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrSelector {
    pub name: String,
    pub operator: AttrOperator,
    pub value: String,
    pub case_insensitive: bool,
}

impl AttrSelector {
    fn matches(&self, element: &Handle) -> bool {
        let Some(actual) = get_node_attr(element, &self.name) else {
            return false;
        };

        let (actual, expected) = if self.case_insensitive {
            (actual.to_lowercase(), self.value.to_lowercase())
        } else {
            (actual, self.value.clone())
        };

        match self.operator {
            AttrOperator::Exists => true,
            AttrOperator::Equals => actual == expected,
            AttrOperator::Includes => {
                !expected.is_empty() && actual.split_ascii_whitespace().any(|w| w == expected)
            }
            AttrOperator::DashMatch => {
                actual == expected || actual.starts_with(&format!("{}-", expected))
            }
            AttrOperator::Prefix => !expected.is_empty() && actual.starts_with(&expected),
            AttrOperator::Suffix => !expected.is_empty() && actual.ends_with(&expected),
            AttrOperator::Substring => !expected.is_empty() && actual.contains(&expected),
        }
    }
}

/// 复合选择器（不含组合符的一段）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    pub tag: Option<String>,
    pub universal: bool,
    pub ids: Vec<String>,
    pub classes: Vec<String>,
    pub attrs: Vec<AttrSelector>,
    pub negations: Vec<SelectorList>,
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none()
            && !self.universal
            && self.ids.is_empty()
            && self.classes.is_empty()
            && self.attrs.is_empty()
            && self.negations.is_empty()
    }

    fn matches(&self, element: &Handle) -> bool {
        if !is_element(element) {
            return false;
        }

        if let Some(tag) = &self.tag {
            if !has_tag(element, tag) {
                return false;
            }
        }

        if !self.ids.is_empty() {
            let id = get_node_attr(element, "id").unwrap_or_default();
            if self.ids.iter().any(|expected| *expected != id) {
                return false;
            }
        }

        if !self.classes.is_empty() {
            let class_attr = get_node_attr(element, "class").unwrap_or_default();
            let classes: Vec<&str> = class_attr.split_ascii_whitespace().collect();
            if !self.classes.iter().all(|c| classes.contains(&c.as_str())) {
                return false;
            }
        }

        self.attrs.iter().all(|attr| attr.matches(element))
            && self.negations.iter().all(|list| !list.matches(element))
    }
}

/// 由组合符连接的复合选择器序列
///
/// `combinators[i]` 位于 `compounds[i]` 与 `compounds[i + 1]` 之间。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComplexSelector {
    pub compounds: Vec<Compound>,
    pub combinators: Vec<Combinator>,
}

impl ComplexSelector {
    fn matches(&self, element: &Handle) -> bool {
        let last = self.compounds.len() - 1;
        self.compounds[last].matches(element) && self.match_from(last, element)
    }

    /// 自右向左匹配：`element` 已满足 `compounds[index]`
    fn match_from(&self, index: usize, element: &Handle) -> bool {
        if index == 0 {
            return true;
        }

        let target = &self.compounds[index - 1];
        match self.combinators[index - 1] {
            Combinator::Child => parent_element(element)
                .is_some_and(|parent| target.matches(&parent) && self.match_from(index - 1, &parent)),
            Combinator::Descendant => {
                let mut current = parent_element(element);
                while let Some(ancestor) = current {
                    if target.matches(&ancestor) && self.match_from(index - 1, &ancestor) {
                        return true;
                    }
                    current = parent_element(&ancestor);
                }
                false
            }
        }
    }
}

/// 逗号分隔的选择器列表
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    /// 解析选择器字符串
    pub fn parse(source: &str) -> Result<Self, SelectorError> {
        let mut input = ParserInput::new(source);
        let mut parser = Parser::new(&mut input);

        let selectors = parse_selector_list(&mut parser).map_err(|e| match e.kind {
            ParseErrorKind::Custom(error) => error,
            ParseErrorKind::Basic(basic) => {
                SelectorError::Syntax(format!("{} ({:?})", source, basic))
            }
        })?;

        Ok(Self { selectors })
    }

    /// 元素是否匹配列表中任一选择器
    pub fn matches(&self, element: &Handle) -> bool {
        self.selectors.iter().any(|selector| selector.matches(element))
    }

    /// 按文档顺序返回 `root` 下所有匹配元素
    pub fn query_all(&self, root: &Handle) -> Vec<Handle> {
        descendant_elements(root)
            .into_iter()
            .filter(|element| self.matches(element))
            .collect()
    }

    /// 自身或最近的匹配祖先
    pub fn closest(&self, element: &Handle) -> Option<Handle> {
        let mut current = Some(element.clone()).filter(is_element);
        while let Some(node) = current {
            if self.matches(&node) {
                return Some(node);
            }
            current = parent_element(&node);
        }
        None
    }

    /// 是否含有需要跨层级解析的选择器
    pub fn is_multi_level(&self) -> bool {
        self.selectors.iter().any(|s| s.compounds.len() > 1)
    }
}

fn parse_selector_list<'i, 't>(
    parser: &mut Parser<'i, 't>,
) -> Result<Vec<ComplexSelector>, ParseError<'i, SelectorError>> {
    let mut selectors = Vec::new();
    let mut compounds: Vec<Compound> = Vec::new();
    let mut combinators: Vec<Combinator> = Vec::new();
    let mut current = Compound::default();
    let mut pending: Option<Combinator> = None;

    loop {
        let token = match parser.next_including_whitespace() {
            Ok(token) => token.clone(),
            Err(_) => break,
        };

        match token {
            Token::WhiteSpace(_) => {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                }
                continue;
            }
            Token::Comma => {
                selectors.push(finish_complex(
                    parser,
                    &mut compounds,
                    &mut combinators,
                    &mut current,
                    &mut pending,
                )?);
                continue;
            }
            Token::Delim('>') => {
                if !current.is_empty() {
                    compounds.push(std::mem::take(&mut current));
                }
                if compounds.is_empty() || pending.is_some() {
                    return Err(parser.new_custom_error(SelectorError::Syntax(
                        "'>' 缺少左侧选择器".to_string(),
                    )));
                }
                pending = Some(Combinator::Child);
                continue;
            }
            _ => {}
        }

        // 开始新的复合选择器时补上前一段的组合符
        if current.is_empty() && compounds.len() > combinators.len() {
            combinators.push(pending.take().unwrap_or(Combinator::Descendant));
        }

        match token {
            Token::Ident(name) => {
                if current.tag.is_some() || current.universal {
                    return Err(parser.new_custom_error(SelectorError::Syntax(format!(
                        "重复的类型选择器: {}",
                        name
                    ))));
                }
                current.tag = Some(name.to_ascii_lowercase());
            }
            Token::Delim('*') => current.universal = true,
            Token::IDHash(id) | Token::Hash(id) => current.ids.push(id.to_string()),
            Token::Delim('.') => {
                let next = parser.next_including_whitespace()?.clone();
                match next {
                    Token::Ident(class) => current.classes.push(class.to_string()),
                    other => {
                        return Err(parser.new_custom_error(SelectorError::Syntax(format!(
                            "'.' 后应为类名，实际为 {:?}",
                            other
                        ))));
                    }
                }
            }
            Token::SquareBracketBlock => {
                let attr = parser.parse_nested_block(parse_attribute)?;
                current.attrs.push(attr);
            }
            Token::Colon => {
                let next = parser.next_including_whitespace()?.clone();
                match next {
                    Token::Function(name) if name.eq_ignore_ascii_case("not") => {
                        let inner = parser.parse_nested_block(|p| parse_selector_list(p))?;
                        current.negations.push(SelectorList { selectors: inner });
                    }
                    other => {
                        return Err(parser.new_custom_error(SelectorError::Unsupported(
                            format!("伪类 {:?}", other),
                        )));
                    }
                }
            }
            other => {
                return Err(parser.new_custom_error(SelectorError::Unsupported(format!(
                    "{:?}",
                    other
                ))));
            }
        }
    }

    selectors.push(finish_complex(
        parser,
        &mut compounds,
        &mut combinators,
        &mut current,
        &mut pending,
    )?);

    Ok(selectors)
}

fn finish_complex<'i, 't>(
    parser: &Parser<'i, 't>,
    compounds: &mut Vec<Compound>,
    combinators: &mut Vec<Combinator>,
    current: &mut Compound,
    pending: &mut Option<Combinator>,
) -> Result<ComplexSelector, ParseError<'i, SelectorError>> {
    if !current.is_empty() {
        compounds.push(std::mem::take(current));
    }
    if pending.take().is_some() {
        return Err(parser.new_custom_error(SelectorError::Syntax(
            "'>' 缺少右侧选择器".to_string(),
        )));
    }
    if compounds.is_empty() {
        return Err(parser.new_custom_error(SelectorError::Empty));
    }

    Ok(ComplexSelector {
        compounds: std::mem::take(compounds),
        combinators: std::mem::take(combinators),
    })
}

fn parse_attribute<'i, 't>(
    parser: &mut Parser<'i, 't>,
) -> Result<AttrSelector, ParseError<'i, SelectorError>> {
    let name = parser.expect_ident()?.to_string();

    if parser.is_exhausted() {
        return Ok(AttrSelector {
            name,
            operator: AttrOperator::Exists,
            value: String::new(),
            case_insensitive: false,
        });
    }

    let next = parser.next()?.clone();
    let operator = match next {
        Token::Delim('=') => AttrOperator::Equals,
        Token::IncludeMatch => AttrOperator::Includes,
        Token::DashMatch => AttrOperator::DashMatch,
        Token::PrefixMatch => AttrOperator::Prefix,
        Token::SuffixMatch => AttrOperator::Suffix,
        Token::SubstringMatch => AttrOperator::Substring,
        other => {
            return Err(parser.new_custom_error(SelectorError::Syntax(format!(
                "未知的属性运算符 {:?}",
                other
            ))));
        }
    };

    let value = parser.expect_ident_or_string()?.to_string();

    let mut case_insensitive = false;
    if !parser.is_exhausted() {
        let flag = parser.expect_ident()?.clone();
        if flag.eq_ignore_ascii_case("i") {
            case_insensitive = true;
        } else if !flag.eq_ignore_ascii_case("s") {
            return Err(parser.new_custom_error(SelectorError::Syntax(format!(
                "未知的属性标志 {}",
                flag
            ))));
        }
    }
    parser.expect_exhausted()?;

    Ok(AttrSelector {
        name: name.to_ascii_lowercase(),
        operator,
        value,
        case_insensitive,
    })
}

/// 适配器中声明的选择器模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SelectorPattern {
    /// 空格分隔的纯标签链，如 `shreddit-feed faceplate-screen-reader-content`
    TagChain(Vec<String>),
    /// 其他一切交给完整选择器匹配
    Css(SelectorList),
}

impl SelectorPattern {
    /// 对模式串分类
    ///
    /// 不含 `.`、`#`、`[` 且由多个纯标签名组成的模式按标签链解析，
    /// 逐层查找只对两层链路做过验证。
    pub fn classify(source: &str) -> Result<Self, SelectorError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Err(SelectorError::Empty);
        }

        let plain = !trimmed.contains(['.', '#', '[']);
        let tags: Vec<&str> = trimmed.split_ascii_whitespace().collect();
        if plain && tags.len() > 1 && tags.iter().all(|tag| is_plain_tag(tag)) {
            return Ok(SelectorPattern::TagChain(
                tags.iter().map(|tag| tag.to_ascii_lowercase()).collect(),
            ));
        }

        SelectorList::parse(trimmed).map(SelectorPattern::Css)
    }

    /// 在 `root` 下解析出所有候选元素
    ///
    /// 标签链按层展开：先取第一个标签的全部元素，再在每个元素内查找下一层标签。
    /// 嵌套结构可能产生重复元素，去重交给状态机。
    pub fn resolve(&self, root: &Handle) -> Vec<Handle> {
        match self {
            SelectorPattern::TagChain(tags) => {
                let mut elements = elements_by_tag(root, &tags[0]);
                for tag in &tags[1..] {
                    elements = elements
                        .iter()
                        .flat_map(|parent| elements_by_tag(parent, tag))
                        .collect();
                }
                elements
            }
            SelectorPattern::Css(list) => list.query_all(root),
        }
    }

    /// 元素本身是否匹配
    pub fn matches(&self, element: &Handle) -> bool {
        match self {
            SelectorPattern::TagChain(tags) => {
                let (last, rest) = match tags.split_last() {
                    Some(split) => split,
                    None => return false,
                };
                if !has_tag(element, last) {
                    return false;
                }
                // 自内向外依次找到链上的各层祖先
                let mut remaining = rest.iter().rev().peekable();
                let mut current = parent_element(element);
                while let (Some(tag), Some(ancestor)) = (remaining.peek(), current.clone()) {
                    if has_tag(&ancestor, tag) {
                        remaining.next();
                    }
                    current = parent_element(&ancestor);
                }
                remaining.peek().is_none()
            }
            SelectorPattern::Css(list) => list.matches(element),
        }
    }

    /// 新增节点是否与模式相关
    ///
    /// 多层模式下，节点自身匹配或其子树中含有匹配都算相关；单层模式只看节点自身。
    pub fn touches(&self, node: &Handle) -> bool {
        if !is_element(node) {
            return false;
        }
        if self.matches(node) {
            return true;
        }
        if self.is_multi_level() {
            return descendant_elements(node).iter().any(|d| self.matches(d));
        }
        false
    }

    pub fn is_multi_level(&self) -> bool {
        match self {
            SelectorPattern::TagChain(_) => true,
            SelectorPattern::Css(list) => list.is_multi_level(),
        }
    }
}

fn is_plain_tag(tag: &str) -> bool {
    tag.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::node::{get_node_attr, text_content};
    use crate::dom::Document;

    fn doc() -> Document {
        Document::parse_html(
            r#"<html><body>
            <main>
              <article class="post featured" id="a1">
                <h1 slot="title">Title</h1>
                <p class="pw-post-body-paragraph">one</p>
                <div lang="en"><span>two</span></div>
              </article>
              <ul><li>three</li></ul>
            </main>
            <aside aria-label="Community information"><div id="description">four</div></aside>
            </body></html>"#,
        )
    }

    fn texts(nodes: &[Handle]) -> Vec<String> {
        nodes.iter().map(|n| text_content(n).trim().to_string()).collect()
    }

    #[test]
    fn test_parse_compound_and_combinators() {
        let list = SelectorList::parse("main > article.post p, h1[slot=\"title\"]").unwrap();
        assert_eq!(list.selectors.len(), 2);
        assert_eq!(list.selectors[0].compounds.len(), 3);
        assert_eq!(
            list.selectors[0].combinators,
            vec![Combinator::Child, Combinator::Descendant]
        );
        assert_eq!(list.selectors[1].compounds[0].attrs[0].operator, AttrOperator::Equals);
    }

    #[test]
    fn test_query_all_in_document_order() {
        let document = doc();
        let list = SelectorList::parse("article p, article span").unwrap();
        assert_eq!(texts(&list.query_all(&document.root())), vec!["one", "two"]);
    }

    #[test]
    fn test_attribute_operators() {
        let document = doc();
        let root = document.root();

        let prefix = SelectorList::parse("p[class^=\"pw-post\"]").unwrap();
        assert_eq!(texts(&prefix.query_all(&root)), vec!["one"]);

        let substring = SelectorList::parse("article[class*=\"feat\"] h1").unwrap();
        assert_eq!(texts(&substring.query_all(&root)), vec!["Title"]);

        let includes = SelectorList::parse("[class~=featured]").unwrap();
        assert_eq!(includes.query_all(&root).len(), 1);

        let exists = SelectorList::parse("div[lang] span").unwrap();
        assert_eq!(texts(&exists.query_all(&root)), vec!["two"]);

        let quoted = SelectorList::parse("aside[aria-label=\"Community information\"] div[id=\"description\"]").unwrap();
        assert_eq!(texts(&quoted.query_all(&root)), vec!["four"]);
    }

    #[test]
    fn test_not_pseudo_class() {
        let document = Document::parse_html(
            "<body><pre class=\"a b\">x</pre><pre class=\"solo\">y</pre><pre>z</pre></body>",
        );
        let list = SelectorList::parse("pre:not([class*=\" \"])").unwrap();
        assert_eq!(texts(&list.query_all(&document.root())), vec!["y", "z"]);
    }

    #[test]
    fn test_invalid_selectors_are_errors() {
        assert!(SelectorList::parse("p[").is_err());
        assert!(SelectorList::parse("> p").is_err());
        assert!(SelectorList::parse("p >").is_err());
        assert!(matches!(
            SelectorList::parse("a:hover"),
            Err(SelectorError::Unsupported(_))
        ));
        assert_eq!(SelectorList::parse(""), Err(SelectorError::Empty));
    }

    #[test]
    fn test_closest() {
        let document = doc();
        let span = SelectorList::parse("span").unwrap().query_all(&document.root()).remove(0);
        let article = SelectorList::parse("article, nav").unwrap().closest(&span).unwrap();
        assert_eq!(get_node_attr(&article, "id").as_deref(), Some("a1"));
        assert!(SelectorList::parse("nav").unwrap().closest(&span).is_none());
    }

    #[test]
    fn test_classify_patterns() {
        assert_eq!(
            SelectorPattern::classify("shreddit-feed faceplate-screen-reader-content").unwrap(),
            SelectorPattern::TagChain(vec![
                "shreddit-feed".to_string(),
                "faceplate-screen-reader-content".to_string()
            ])
        );
        assert!(matches!(SelectorPattern::classify("p").unwrap(), SelectorPattern::Css(_)));
        assert!(matches!(
            SelectorPattern::classify("main .content p").unwrap(),
            SelectorPattern::Css(_)
        ));
        assert!(matches!(
            SelectorPattern::classify("main h1, main h2").unwrap(),
            SelectorPattern::Css(_)
        ));
    }

    #[test]
    fn test_tag_chain_resolution_and_matching() {
        let document = doc();
        let pattern = SelectorPattern::classify("main li").unwrap();
        let found = pattern.resolve(&document.root());
        assert_eq!(texts(&found), vec!["three"]);
        assert!(pattern.matches(&found[0]));

        let h1 = SelectorList::parse("h1").unwrap().query_all(&document.root()).remove(0);
        assert!(!pattern.matches(&h1));
    }

    #[test]
    fn test_touches_for_multi_level_patterns() {
        let document = doc();
        let root = document.root();
        let article = SelectorList::parse("article").unwrap().query_all(&root).remove(0);

        let nested = SelectorPattern::classify("article p").unwrap();
        assert!(nested.touches(&article));

        let single = SelectorPattern::classify("p").unwrap();
        assert!(!single.touches(&article));
    }
}
