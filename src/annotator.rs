//! 标注状态机
//!
//! 每个元素的生命周期：`Unseen -> Processing -> {Annotated | Unseen}`。
//!
//! 状态保存在以元素身份为键的状态表里，不依赖元素上的临时属性：
//! 进入 `Processing` 是一次检查并设置，已在处理中的元素直接放弃，
//! 保证同一元素同时最多只有一次翻译在进行、最多只有一条标注。
//!
//! 翻译期间文档可能已被“移除全部标注”清理（关闭引擎、切换目标语言等），
//! 这类操作会推进纪元号；翻译返回后纪元号变化即丢弃结果。

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use markup5ever_rcdom::Handle;
use tracing::debug;

use crate::cache::{AnnotationCache, Fingerprint};
use crate::classifier::LanguageClassifier;
use crate::config::constants::{ANNOTATED_ATTR, ANNOTATION_CLASS, ORIGINAL_TEXT_ATTR};
use crate::dom::node::{
    ancestor_elements, descendant_elements, element_children, get_node_attr, get_node_name,
    has_class, has_tag, parent_of, set_node_attr,
};
use crate::dom::{Document, NodeKey};
use crate::matcher::ElementMatcher;
use crate::themes::Theme;
use crate::translator::{is_failure_message, Translator};

/// 元素状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Unseen,
    Processing,
    Annotated,
}

/// 译文插入方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertionMode {
    /// 紧跟在原文元素之后
    Sibling,
    /// 插入原文元素内部
    Nested,
}

/// 一条已插入的标注
#[derive(Debug, Clone)]
pub struct AnnotationRecord {
    pub source: Handle,
    pub annotation: Handle,
    pub fingerprint: Fingerprint,
    pub original_text: String,
    pub translated_text: String,
    pub insertion_mode: InsertionMode,
}

/// 元素被跳过的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 已有翻译在进行
    InFlight,
    AlreadyAnnotated,
    /// 祖先已标注
    AncestorAnnotated,
    /// 后代已标注
    DescendantAnnotated,
    /// 元素本身是标注节点或位于标注节点内
    AnnotationNode,
    EmptyText,
    /// 插入点已有相同原文的标注
    ExistingAnnotation,
    /// 子元素全部是已标注元素或标注节点
    OnlyAnnotatedChildren,
    AlreadyTargetLanguage,
    /// 译文为空或与原文相同
    EmptyTranslation,
    /// 翻译期间标注被全部移除或引擎被关闭
    Stale,
    /// 元素已不在文档中
    Detached,
}

/// 单个元素的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementOutcome {
    pub skipped: Option<SkipReason>,
    pub provider_call: bool,
    pub cache_hit: bool,
}

impl ElementOutcome {
    fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            provider_call: false,
            cache_hit: false,
        }
    }

    pub fn is_annotated(&self) -> bool {
        self.skipped.is_none()
    }
}

/// 一轮标注需要的协作者
pub struct PassContext<'a> {
    pub document: &'a Document,
    pub matcher: &'a ElementMatcher,
    pub classifier: &'a LanguageClassifier,
    pub cache: &'a AnnotationCache,
    pub translator: &'a dyn Translator,
}

enum Entry {
    Processing,
    Annotated(AnnotationRecord),
}

/// 状态表项同时保存节点本身，保证键对应的地址在表项存在期间不被复用
struct Slot {
    _node: Handle,
    entry: Entry,
}

/// 离开作用域时把仍处于 `Processing` 的元素退回 `Unseen`
struct ProcessingGuard<'a> {
    machine: &'a AnnotationStateMachine,
    key: NodeKey,
    epoch: u64,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        if self.machine.epoch.get() != self.epoch {
            return;
        }
        let mut slots = self.machine.slots.borrow_mut();
        if matches!(slots.get(&self.key), Some(Slot { entry: Entry::Processing, .. })) {
            slots.remove(&self.key);
        }
    }
}

/// 标注状态机
pub struct AnnotationStateMachine {
    slots: RefCell<HashMap<NodeKey, Slot>>,
    epoch: Cell<u64>,
    style: RefCell<String>,
}

impl AnnotationStateMachine {
    pub fn new(theme: &Theme) -> Self {
        Self {
            slots: RefCell::new(HashMap::new()),
            epoch: Cell::new(0),
            style: RefCell::new(theme.inline_style()),
        }
    }

    pub fn state_of(&self, element: &Handle) -> ElementState {
        match self.slots.borrow().get(&NodeKey::of(element)) {
            None => ElementState::Unseen,
            Some(Slot { entry: Entry::Processing, .. }) => ElementState::Processing,
            Some(Slot { entry: Entry::Annotated(_), .. }) => ElementState::Annotated,
        }
    }

    pub fn record_of(&self, element: &Handle) -> Option<AnnotationRecord> {
        match self.slots.borrow().get(&NodeKey::of(element)) {
            Some(Slot { entry: Entry::Annotated(record), .. }) => Some(record.clone()),
            _ => None,
        }
    }

    /// 当前所有标注记录
    pub fn records(&self) -> Vec<AnnotationRecord> {
        self.slots
            .borrow()
            .values()
            .filter_map(|slot| match &slot.entry {
                Entry::Annotated(record) => Some(record.clone()),
                Entry::Processing => None,
            })
            .collect()
    }

    pub fn annotated_count(&self) -> usize {
        self.slots
            .borrow()
            .values()
            .filter(|slot| matches!(slot.entry, Entry::Annotated(_)))
            .count()
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.get()
    }

    /// 处理一个候选元素
    pub async fn process(&self, ctx: &PassContext<'_>, element: &Handle) -> ElementOutcome {
        let key = NodeKey::of(element);

        match self.state_of(element) {
            ElementState::Processing => return ElementOutcome::skipped(SkipReason::InFlight),
            ElementState::Annotated => {
                return ElementOutcome::skipped(SkipReason::AlreadyAnnotated)
            }
            ElementState::Unseen => {}
        }
        if is_marked(element) {
            return ElementOutcome::skipped(SkipReason::AlreadyAnnotated);
        }
        if is_annotation_node(element) || ancestor_elements(element).iter().any(is_annotation_node)
        {
            return ElementOutcome::skipped(SkipReason::AnnotationNode);
        }
        // 仍在翻译中的祖先不阻塞：它可能最终不产生标注，翻译返回后再复查
        if self.has_annotated_ancestor(element) {
            return ElementOutcome::skipped(SkipReason::AncestorAnnotated);
        }

        // 进入 Processing
        let epoch = self.epoch.get();
        self.slots.borrow_mut().insert(
            key,
            Slot {
                _node: element.clone(),
                entry: Entry::Processing,
            },
        );
        let _guard = ProcessingGuard {
            machine: self,
            key,
            epoch,
        };

        let text = ctx.matcher.extract_text(ctx.document, element);
        if text.is_empty() {
            return ElementOutcome::skipped(SkipReason::EmptyText);
        }

        let mode = if ctx.matcher.is_nested(element) {
            InsertionMode::Nested
        } else {
            InsertionMode::Sibling
        };

        if mode == InsertionMode::Sibling && parent_of(element).is_none() {
            return ElementOutcome::skipped(SkipReason::Detached);
        }
        if has_annotation_at(element, mode, &text) {
            return ElementOutcome::skipped(SkipReason::ExistingAnnotation);
        }
        if has_only_annotated_children(element) {
            return ElementOutcome::skipped(SkipReason::OnlyAnnotatedChildren);
        }
        if self.has_annotated_descendant(element) {
            return ElementOutcome::skipped(SkipReason::DescendantAnnotated);
        }
        if ctx.classifier.is_already_target_language(&text) {
            debug!("已是目标语言，跳过: {}", preview(&text));
            return ElementOutcome::skipped(SkipReason::AlreadyTargetLanguage);
        }

        let fingerprint = Fingerprint::of(&text);
        let mut outcome = ElementOutcome {
            skipped: None,
            provider_call: false,
            cache_hit: false,
        };

        let translated = match ctx.cache.get(&fingerprint) {
            Some(cached) => {
                outcome.cache_hit = true;
                cached
            }
            None => {
                outcome.provider_call = true;
                let target_lang = ctx.classifier.target().code().to_string();
                let translated = ctx.translator.translate(&text, &target_lang).await;

                if self.epoch.get() != epoch {
                    debug!("翻译返回时标注已被清理，丢弃结果: {}", preview(&text));
                    outcome.skipped = Some(SkipReason::Stale);
                    return outcome;
                }
                if !translated.is_empty() && translated != text && !is_failure_message(&translated) {
                    ctx.cache.insert(fingerprint, &text, &translated);
                }
                translated
            }
        };

        if translated.is_empty() || translated == text {
            outcome.skipped = Some(SkipReason::EmptyTranslation);
            return outcome;
        }

        // 翻译期间其他处理可能已经插入了标注或移除了元素
        if !ctx.document.is_connected(element) {
            outcome.skipped = Some(SkipReason::Detached);
            return outcome;
        }
        if has_annotation_at(element, mode, &text) {
            outcome.skipped = Some(SkipReason::ExistingAnnotation);
            return outcome;
        }
        if self.has_annotated_ancestor(element) {
            outcome.skipped = Some(SkipReason::AncestorAnnotated);
            return outcome;
        }
        if self.has_annotated_descendant(element) {
            outcome.skipped = Some(SkipReason::DescendantAnnotated);
            return outcome;
        }

        let annotation = self.create_annotation(ctx.document, &text, &translated);
        self.insert_annotation(ctx, element, &annotation, mode);
        set_node_attr(element, ANNOTATED_ATTR, Some("true".to_string()));

        debug!("已标注 {:?} 元素 <{}>: {}", mode, get_node_name(element).unwrap_or(""), preview(&text));

        self.slots.borrow_mut().insert(
            key,
            Slot {
                _node: element.clone(),
                entry: Entry::Annotated(AnnotationRecord {
                    source: element.clone(),
                    annotation,
                    fingerprint,
                    original_text: text,
                    translated_text: translated,
                    insertion_mode: mode,
                }),
            },
        );

        outcome
    }

    fn has_annotated_ancestor(&self, element: &Handle) -> bool {
        ancestor_elements(element)
            .iter()
            .any(|ancestor| is_marked(ancestor) || self.state_of(ancestor) == ElementState::Annotated)
    }

    fn has_annotated_descendant(&self, element: &Handle) -> bool {
        descendant_elements(element)
            .iter()
            .any(|node| is_marked(node) || self.state_of(node) == ElementState::Annotated)
    }

    fn create_annotation(&self, document: &Document, original: &str, translated: &str) -> Handle {
        let style = self.style.borrow().clone();
        let node = document.create_element(
            "div",
            &[
                ("class", ANNOTATION_CLASS),
                (ORIGINAL_TEXT_ATTR, original),
                ("style", style.as_str()),
            ],
        );
        let text = document.create_text(translated);
        document.append_child(&node, &text);
        node
    }

    fn insert_annotation(
        &self,
        ctx: &PassContext<'_>,
        element: &Handle,
        annotation: &Handle,
        mode: InsertionMode,
    ) {
        match mode {
            InsertionMode::Sibling => {
                ctx.document.insert_after(element, annotation);
            }
            InsertionMode::Nested => {
                let marker = ctx.matcher.nested_marker().and_then(|tag| {
                    descendant_elements(element)
                        .into_iter()
                        .find(|node| has_tag(node, tag))
                });
                match marker.and_then(|m| parent_of(&m).map(|parent| (parent, m))) {
                    Some((parent, marker)) => {
                        ctx.document.insert_before(&parent, annotation, Some(&marker))
                    }
                    None => ctx.document.append_child(element, annotation),
                }
            }
        }
    }

    /// 移除全部标注、清除所有标记与状态，并清空缓存
    ///
    /// 返回移除的标注节点数。正在进行的翻译在返回后会因纪元号变化而被丢弃。
    pub fn remove_all(&self, document: &Document, cache: &AnnotationCache) -> usize {
        self.epoch.set(self.epoch.get() + 1);

        let root = document.root();
        let mut removed = 0;
        for node in descendant_elements(&root) {
            if is_annotation_node(&node) {
                if document.remove(&node) {
                    removed += 1;
                }
            } else if is_marked(&node) {
                set_node_attr(&node, ANNOTATED_ATTR, None);
            }
        }

        // 已脱离文档的源元素同样清除标记
        for slot in self.slots.borrow().values() {
            if let Entry::Annotated(record) = &slot.entry {
                set_node_attr(&record.source, ANNOTATED_ATTR, None);
            }
        }

        self.slots.borrow_mut().clear();
        cache.clear();
        removed
    }

    /// 就地改写所有标注节点的样式
    pub fn restyle(&self, document: &Document, theme: &Theme) -> usize {
        let style = theme.inline_style();
        *self.style.borrow_mut() = style.clone();

        let mut count = 0;
        for node in descendant_elements(&document.root()) {
            if is_annotation_node(&node) {
                set_node_attr(&node, "style", Some(style.clone()));
                count += 1;
            }
        }
        count
    }

    /// 处理被移出文档的节点
    ///
    /// 节点子树中的源元素释放其标注记录；子树中的标注节点让对应源元素回到 `Unseen`。
    /// 源元素被移走而兄弟标注仍留在文档中时，该标注作为孤儿返回，由调用方移除。
    pub fn release_removed(&self, node: &Handle) -> Released {
        let mut subtree = vec![node.clone()];
        subtree.extend(descendant_elements(node));

        let mut released = Released::default();
        let mut slots = self.slots.borrow_mut();

        for element in &subtree {
            if is_annotation_node(element) {
                if let Some(original) = get_node_attr(element, ORIGINAL_TEXT_ATTR) {
                    released.fingerprints.push(Fingerprint::of(&original));
                }

                let owner = slots.iter().find_map(|(key, slot)| match &slot.entry {
                    Entry::Annotated(record) if Rc::ptr_eq(&record.annotation, element) => {
                        Some(*key)
                    }
                    _ => None,
                });
                if let Some(key) = owner {
                    if let Some(Slot { entry: Entry::Annotated(record), .. }) = slots.remove(&key) {
                        set_node_attr(&record.source, ANNOTATED_ATTR, None);
                    }
                }
                continue;
            }

            let key = NodeKey::of(element);
            if !matches!(slots.get(&key), Some(Slot { entry: Entry::Annotated(_), .. })) {
                continue;
            }
            if let Some(Slot { entry: Entry::Annotated(record), .. }) = slots.remove(&key) {
                released.fingerprints.push(record.fingerprint);
                let inside = subtree.iter().any(|n| Rc::ptr_eq(n, &record.annotation));
                if !inside && parent_of(&record.annotation).is_some() {
                    released.orphans.push(record.annotation);
                }
            }
        }

        released.fingerprints.dedup();
        released
    }
}

/// 移除节点后释放的标注
#[derive(Debug, Default)]
pub struct Released {
    /// 需要从缓存驱逐的指纹
    pub fingerprints: Vec<Fingerprint>,
    /// 源元素已不在文档中的兄弟标注
    pub orphans: Vec<Handle>,
}

/// 是否为标注节点
pub fn is_annotation_node(node: &Handle) -> bool {
    has_class(node, ANNOTATION_CLASS)
}

/// 是否带有已标注标记
pub fn is_marked(node: &Handle) -> bool {
    get_node_attr(node, ANNOTATED_ATTR).is_some_and(|value| value == "true")
}

/// 插入点是否已有标注
///
/// 兄弟插入时查看同级节点中原文相同的标注；嵌套插入时查看元素内部的任意标注。
fn has_annotation_at(element: &Handle, mode: InsertionMode, original: &str) -> bool {
    match mode {
        InsertionMode::Sibling => parent_of(element).is_some_and(|parent| {
            element_children(&parent).iter().any(|sibling| {
                is_annotation_node(sibling)
                    && get_node_attr(sibling, ORIGINAL_TEXT_ATTR).as_deref() == Some(original)
            })
        }),
        InsertionMode::Nested => descendant_elements(element).iter().any(is_annotation_node),
    }
}

fn has_only_annotated_children(element: &Handle) -> bool {
    let children = element_children(element);
    !children.is_empty()
        && children
            .iter()
            .all(|child| is_marked(child) || is_annotation_node(child))
}

fn preview(text: &str) -> String {
    let mut preview: String = text.chars().take(40).collect();
    if text.chars().count() > 40 {
        preview.push('…');
    }
    preview
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterConfig, SelectorGroup};
    use crate::dom::node::elements_by_tag;
    use crate::themes::ThemeCatalogue;
    use async_trait::async_trait;

    struct Upper;

    #[async_trait(?Send)]
    impl Translator for Upper {
        async fn translate(&self, text: &str, _target_lang: &str) -> String {
            format!("[{}]", text)
        }
    }

    /// 先让出一次执行权；以 "Intro" 开头的文本原样返回
    struct YieldingEcho;

    #[async_trait(?Send)]
    impl Translator for YieldingEcho {
        async fn translate(&self, text: &str, _target_lang: &str) -> String {
            tokio::task::yield_now().await;
            if text.starts_with("Intro") {
                text.to_string()
            } else {
                format!("[{}]", text)
            }
        }
    }

    fn matcher(elements: &[&str]) -> ElementMatcher {
        ElementMatcher::new(&AdapterConfig::new(
            "Test",
            vec![SelectorGroup {
                kind: "post".to_string(),
                elements: elements.iter().map(|e| e.to_string()).collect(),
                exclude: Vec::new(),
            }],
        ))
    }

    fn machine() -> AnnotationStateMachine {
        AnnotationStateMachine::new(ThemeCatalogue::builtin().resolve("dark"))
    }

    #[tokio::test]
    async fn test_annotates_once_and_marks_source() {
        let document = Document::parse_html("<body><p>Hello world</p></body>");
        let matcher = matcher(&["p"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let p = elements_by_tag(&document.root(), "p").remove(0);

        let first = machine.process(&ctx, &p).await;
        assert!(first.is_annotated());
        assert!(first.provider_call);
        assert_eq!(machine.state_of(&p), ElementState::Annotated);
        assert!(is_marked(&p));

        let second = machine.process(&ctx, &p).await;
        assert_eq!(second.skipped, Some(SkipReason::AlreadyAnnotated));

        let record = machine.record_of(&p).unwrap();
        assert_eq!(record.translated_text, "[Hello world]");
        assert_eq!(record.insertion_mode, InsertionMode::Sibling);
    }

    #[tokio::test]
    async fn test_skip_reasons_leave_element_unseen() {
        let document = Document::parse_html("<body><p>   </p><p>你好世界</p></body>");
        let matcher = matcher(&["p"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let ps = elements_by_tag(&document.root(), "p");

        assert_eq!(machine.process(&ctx, &ps[0]).await.skipped, Some(SkipReason::EmptyText));
        assert_eq!(
            machine.process(&ctx, &ps[1]).await.skipped,
            Some(SkipReason::AlreadyTargetLanguage)
        );
        assert_eq!(machine.state_of(&ps[0]), ElementState::Unseen);
        assert_eq!(machine.state_of(&ps[1]), ElementState::Unseen);
    }

    #[tokio::test]
    async fn test_descendant_of_annotated_is_skipped() {
        let document = Document::parse_html("<body><div><span>Hello there</span></div></body>");
        let matcher = matcher(&["div", "span"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let div = elements_by_tag(&document.root(), "div").remove(0);
        let span = elements_by_tag(&document.root(), "span").remove(0);

        assert!(machine.process(&ctx, &div).await.is_annotated());
        assert_eq!(
            machine.process(&ctx, &span).await.skipped,
            Some(SkipReason::AncestorAnnotated)
        );

        // 标注节点自身也是 div，不能被再次标注
        let annotation = machine.record_of(&div).unwrap().annotation;
        assert_eq!(
            machine.process(&ctx, &annotation).await.skipped,
            Some(SkipReason::AnnotationNode)
        );
    }

    #[tokio::test]
    async fn test_in_flight_ancestor_does_not_block_descendant() {
        let document =
            Document::parse_html("<body><div>Intro <span>Hello there</span></div></body>");
        let matcher = matcher(&["div", "span"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &YieldingEcho,
        };
        let machine = machine();
        let div = elements_by_tag(&document.root(), "div").remove(0);
        let span = elements_by_tag(&document.root(), "span").remove(0);

        let (outer, inner) = tokio::join!(machine.process(&ctx, &div), machine.process(&ctx, &span));

        assert_eq!(outer.skipped, Some(SkipReason::EmptyTranslation));
        assert!(inner.is_annotated());
        assert_eq!(machine.state_of(&div), ElementState::Unseen);
        assert_eq!(machine.state_of(&span), ElementState::Annotated);
        assert_eq!(machine.annotated_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_ancestor_and_descendant_annotate_once() {
        let document =
            Document::parse_html("<body><section>Outer <span>Hello there</span></section></body>");
        let matcher = matcher(&["section", "span"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &YieldingEcho,
        };
        let machine = machine();
        let section = elements_by_tag(&document.root(), "section").remove(0);
        let span = elements_by_tag(&document.root(), "span").remove(0);

        let (outer, inner) =
            tokio::join!(machine.process(&ctx, &section), machine.process(&ctx, &span));

        // 先返回的一方插入标注，另一方在复查时让出
        assert!(outer.provider_call && inner.provider_call);
        assert_ne!(outer.is_annotated(), inner.is_annotated());
        assert_eq!(machine.annotated_count(), 1);
        let annotation_count = descendant_elements(&document.root())
            .iter()
            .filter(|node| is_annotation_node(node))
            .count();
        assert_eq!(annotation_count, 1);
    }

    #[tokio::test]
    async fn test_remove_all_and_restyle() {
        let document = Document::parse_html("<body><p>One</p><p>Two</p></body>");
        let matcher = matcher(&["p"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        for p in elements_by_tag(&document.root(), "p") {
            machine.process(&ctx, &p).await;
        }
        assert_eq!(machine.annotated_count(), 2);

        let light = ThemeCatalogue::builtin().resolve("light").clone();
        assert_eq!(machine.restyle(&document, &light), 2);
        assert!(document.serialize().unwrap().contains("#0079d3"));

        assert_eq!(machine.remove_all(&document, &cache), 2);
        assert_eq!(machine.annotated_count(), 0);
        assert!(cache.is_empty());
        assert!(elements_by_tag(&document.root(), "p").iter().all(|p| !is_marked(p)));
        assert_eq!(elements_by_tag(&document.root(), "div").len(), 0);
    }

    #[tokio::test]
    async fn test_removed_annotation_releases_source() {
        let document = Document::parse_html("<body><p>Hello</p></body>");
        let matcher = matcher(&["p"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let p = elements_by_tag(&document.root(), "p").remove(0);
        machine.process(&ctx, &p).await;

        let annotation = machine.record_of(&p).unwrap().annotation;
        document.remove(&annotation);
        let released = machine.release_removed(&annotation);

        assert_eq!(released.fingerprints, vec![Fingerprint::of("Hello")]);
        assert!(released.orphans.is_empty());
        assert_eq!(machine.state_of(&p), ElementState::Unseen);
        assert!(!is_marked(&p));
    }

    #[tokio::test]
    async fn test_removed_source_orphans_sibling_annotation() {
        let document = Document::parse_html("<body><p>Hello</p></body>");
        let matcher = matcher(&["p"]);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let p = elements_by_tag(&document.root(), "p").remove(0);
        machine.process(&ctx, &p).await;
        let annotation = machine.record_of(&p).unwrap().annotation;

        document.remove(&p);
        let released = machine.release_removed(&p);

        assert_eq!(released.fingerprints, vec![Fingerprint::of("Hello")]);
        assert_eq!(released.orphans.len(), 1);
        assert!(Rc::ptr_eq(&released.orphans[0], &annotation));
        assert_eq!(machine.annotated_count(), 0);
    }

    #[tokio::test]
    async fn test_nested_insertion_before_marker() {
        let document = Document::parse_html(
            r#"<body><shreddit-post><a slot="title">Title text<faceplate-perfmark></faceplate-perfmark></a></shreddit-post></body>"#,
        );
        let adapter = AdapterConfig::new(
            "Reddit",
            vec![SelectorGroup {
                kind: "post".to_string(),
                elements: vec![r#"shreddit-post a[slot="title"]"#.to_string()],
                exclude: Vec::new(),
            }],
        )
        .with_nested_insertion(&[r#"shreddit-post a[slot="title"]"#], Some("faceplate-perfmark"));
        let matcher = ElementMatcher::new(&adapter);
        let classifier = LanguageClassifier::new("zh-CN").unwrap();
        let cache = AnnotationCache::new(16);
        let ctx = PassContext {
            document: &document,
            matcher: &matcher,
            classifier: &classifier,
            cache: &cache,
            translator: &Upper,
        };
        let machine = machine();
        let a = elements_by_tag(&document.root(), "a").remove(0);

        assert!(machine.process(&ctx, &a).await.is_annotated());
        let names: Vec<String> = element_children(&a)
            .iter()
            .filter_map(|n| get_node_name(n).map(str::to_string))
            .collect();
        assert_eq!(names, vec!["div", "faceplate-perfmark"]);
        assert_eq!(machine.record_of(&a).unwrap().insertion_mode, InsertionMode::Nested);
    }
}
