//! 变更监听
//!
//! 消费文档产生的一批修改记录：移除的节点释放标注并驱逐缓存，
//! 新增的节点若可能带来新的候选元素则安排一次防抖后的全量标注。
//!
//! 防抖采用后沿触发：每次需要重扫都把截止时间推迟到“现在 + 间隔”，
//! 一阵连续修改结束后恰好运行一轮。

use std::cell::Cell;
use std::time::Duration;

use markup5ever_rcdom::Handle;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::annotator::{is_annotation_node, is_marked, AnnotationStateMachine};
use crate::cache::AnnotationCache;
use crate::dom::node::{ancestor_elements, is_element};
use crate::dom::{Document, MutationRecord};
use crate::matcher::ElementMatcher;

/// 一批修改的处理结果
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MutationSummary {
    pub records: usize,
    /// 从缓存驱逐的指纹数
    pub evicted: usize,
    /// 随源元素一起失效而被移除的标注数
    pub orphans_removed: usize,
    pub needs_rescan: bool,
}

/// 变更监听器
pub struct MutationWatcher {
    debounce: Duration,
    deadline: Cell<Option<Instant>>,
}

impl MutationWatcher {
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            deadline: Cell::new(None),
        }
    }

    /// 处理一批修改记录
    ///
    /// `matcher` 为空表示当前没有生效的适配器，新增节点不会触发重扫。
    pub fn inspect(
        &self,
        document: &Document,
        records: &[MutationRecord],
        matcher: Option<&ElementMatcher>,
        machine: &AnnotationStateMachine,
        cache: &AnnotationCache,
    ) -> MutationSummary {
        let mut summary = MutationSummary {
            records: records.len(),
            ..MutationSummary::default()
        };

        for record in records {
            for removed in &record.removed_nodes {
                if !is_element(removed) {
                    continue;
                }
                let released = machine.release_removed(removed);
                for fingerprint in &released.fingerprints {
                    if cache.evict(fingerprint) {
                        summary.evicted += 1;
                        debug!("驱逐缓存条目 {}", fingerprint);
                    }
                }
                for orphan in &released.orphans {
                    if document.remove(orphan) {
                        summary.orphans_removed += 1;
                    }
                }
            }

            if summary.needs_rescan {
                continue;
            }
            let Some(matcher) = matcher else {
                continue;
            };
            summary.needs_rescan = record
                .added_nodes
                .iter()
                .any(|added| is_relevant_addition(added, matcher, document));
        }

        if summary.needs_rescan {
            self.schedule();
        }
        summary
    }

    /// 安排一次重扫，已有的截止时间被推迟
    pub fn schedule(&self) {
        self.deadline.set(Some(Instant::now() + self.debounce));
    }

    pub fn is_scheduled(&self) -> bool {
        self.deadline.get().is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline.get()
    }

    /// 截止时间已到时清除并返回 true
    pub fn take_due(&self) -> bool {
        match self.deadline.get() {
            Some(deadline) if deadline <= Instant::now() => {
                self.deadline.set(None);
                true
            }
            _ => false,
        }
    }

    pub fn cancel(&self) {
        self.deadline.set(None);
    }

    /// 等到当前截止时间；未安排时永不返回
    pub async fn wait_due(&self) {
        match self.deadline.get() {
            Some(deadline) => sleep_until(deadline).await,
            None => std::future::pending::<()>().await,
        }
    }
}

/// 新增节点是否需要重扫：跳过标注节点和已标注区域内的节点
fn is_relevant_addition(node: &Handle, matcher: &ElementMatcher, document: &Document) -> bool {
    if !is_element(node) || is_annotation_node(node) || is_marked(node) {
        return false;
    }
    if ancestor_elements(node)
        .iter()
        .any(|ancestor| is_marked(ancestor) || is_annotation_node(ancestor))
    {
        return false;
    }
    document.is_connected(node) && matcher.touches(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{AdapterConfig, SelectorGroup};
    use crate::cache::Fingerprint;
    use crate::config::constants::{ANNOTATED_ATTR, ANNOTATION_CLASS};
    use crate::dom::node::{elements_by_tag, set_node_attr};
    use crate::themes::ThemeCatalogue;

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

    fn setup(html: &str) -> (Document, AnnotationStateMachine, AnnotationCache) {
        let document = Document::parse_html(html);
        document.observe();
        let machine = AnnotationStateMachine::new(ThemeCatalogue::builtin().resolve("dark"));
        (document, machine, AnnotationCache::new(16))
    }

    #[tokio::test]
    async fn test_relevant_addition_schedules_rescan() {
        let (document, machine, cache) = setup("<body><div id='feed'></div></body>");
        let watcher = MutationWatcher::new(Duration::from_millis(200));
        let matcher = matcher(&["p"]);
        let feed = elements_by_tag(&document.root(), "div").remove(0);

        let span = document.create_element("span", &[]);
        document.append_child(&feed, &span);
        let summary = watcher.inspect(&document, &document.take_records(), Some(&matcher), &machine, &cache);
        assert!(!summary.needs_rescan);
        assert!(!watcher.is_scheduled());

        let p = document.create_element("p", &[]);
        document.append_child(&feed, &p);
        let summary = watcher.inspect(&document, &document.take_records(), Some(&matcher), &machine, &cache);
        assert!(summary.needs_rescan);
        assert!(watcher.is_scheduled());
    }

    #[tokio::test]
    async fn test_own_insertions_are_ignored() {
        let (document, machine, cache) = setup("<body><p>Hello</p></body>");
        let watcher = MutationWatcher::new(Duration::from_millis(200));
        let matcher = matcher(&["p", "div"]);
        let p = elements_by_tag(&document.root(), "p").remove(0);
        set_node_attr(&p, ANNOTATED_ATTR, Some("true".to_string()));

        let annotation = document.create_element("div", &[("class", ANNOTATION_CLASS)]);
        document.insert_after(&p, &annotation);
        let inner = document.create_element("p", &[]);
        document.append_child(&p, &inner);

        let summary = watcher.inspect(&document, &document.take_records(), Some(&matcher), &machine, &cache);
        assert_eq!(summary.records, 2);
        assert!(!summary.needs_rescan);
    }

    #[tokio::test]
    async fn test_without_active_adapter_only_evicts() {
        let (document, machine, cache) = setup("<body><p>Hello</p></body>");
        let watcher = MutationWatcher::new(Duration::from_millis(200));
        let body = document.body().unwrap();

        let annotation = document.create_element(
            "div",
            &[("class", ANNOTATION_CLASS), ("data-original-text", "Hello")],
        );
        document.append_child(&body, &annotation);
        cache.insert(Fingerprint::of("Hello"), "Hello", "你好");
        document.take_records();

        document.remove(&annotation);
        let p = document.create_element("p", &[]);
        document.append_child(&body, &p);

        let summary = watcher.inspect(&document, &document.take_records(), None, &machine, &cache);
        assert_eq!(summary.evicted, 1);
        assert!(!summary.needs_rescan);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_is_trailing_edge() {
        let watcher = MutationWatcher::new(Duration::from_millis(200));
        assert!(!watcher.take_due());

        watcher.schedule();
        tokio::time::advance(Duration::from_millis(150)).await;
        watcher.schedule();
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(!watcher.take_due());

        tokio::time::advance(Duration::from_millis(60)).await;
        assert!(watcher.take_due());
        assert!(!watcher.is_scheduled());
    }
}
