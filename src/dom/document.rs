//! 可观察的文档
//!
//! 对 `RcDom` 的包装：所有结构性修改都经过这里，在观察期间为每次修改生成一条
//! [`MutationRecord`]，批量交给变更监听器处理（相当于浏览器里的 MutationObserver）。

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use encoding_rs::Encoding;
use html5ever::interface::{Attribute, QualName};
use html5ever::parse_document;
use html5ever::serialize::{serialize, SerializeOpts};
use html5ever::tendril::{format_tendril, StrTendril, TendrilSink};
use html5ever::tree_builder::create_element;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, Node, NodeData, RcDom, SerializableHandle};
use tokio::sync::Notify;

use super::node::{element_children, has_tag, parent_of};
use crate::error::{EngineError, EngineResult};

/// 一次结构性修改
#[derive(Debug, Clone)]
pub struct MutationRecord {
    /// 子节点发生变化的父节点
    pub target: Handle,
    pub added_nodes: Vec<Handle>,
    pub removed_nodes: Vec<Handle>,
}

/// 引擎所附着的文档
pub struct Document {
    dom: RcDom,
    records: RefCell<Vec<MutationRecord>>,
    observed: Cell<bool>,
    notify: Notify,
}

impl Document {
    /// 从 HTML 字符串解析文档
    pub fn parse_html(html: &str) -> Self {
        let dom = parse_document(RcDom::default(), Default::default()).one(html);
        Self::from_dom(dom)
    }

    /// 按指定字符集解码字节后解析文档
    pub fn from_bytes(data: &[u8], document_encoding: &str) -> Self {
        let html = if let Some(encoding) = Encoding::for_label(document_encoding.as_bytes()) {
            let (string, _, _) = encoding.decode(data);
            string.to_string()
        } else {
            String::from_utf8_lossy(data).to_string()
        };

        Self::parse_html(&html)
    }

    pub fn from_dom(dom: RcDom) -> Self {
        Self {
            dom,
            records: RefCell::new(Vec::new()),
            observed: Cell::new(false),
            notify: Notify::new(),
        }
    }

    /// 文档根节点
    pub fn root(&self) -> Handle {
        self.dom.document.clone()
    }

    /// `<body>` 元素
    pub fn body(&self) -> Option<Handle> {
        let html = element_children(&self.dom.document)
            .into_iter()
            .find(|node| has_tag(node, "html"))?;
        element_children(&html)
            .into_iter()
            .find(|node| has_tag(node, "body"))
    }

    /// 节点是否仍挂在文档树上
    pub fn is_connected(&self, node: &Handle) -> bool {
        let mut current = node.clone();
        loop {
            if Rc::ptr_eq(&current, &self.dom.document) {
                return true;
            }
            match parent_of(&current) {
                Some(parent) => current = parent,
                None => return false,
            }
        }
    }

    /// 序列化为 HTML 字符串
    pub fn serialize(&self) -> EngineResult<String> {
        let mut buf: Vec<u8> = Vec::new();
        let serializable: SerializableHandle = self.dom.document.clone().into();
        serialize(&mut buf, &serializable, SerializeOpts::default())
            .map_err(|e| EngineError::DocumentError(format!("序列化文档失败: {}", e)))?;

        Ok(String::from_utf8_lossy(&buf).to_string())
    }

    /// 创建游离元素
    pub fn create_element(&self, tag: &str, attrs: &[(&str, &str)]) -> Handle {
        let attrs = attrs
            .iter()
            .map(|(name, value)| Attribute {
                name: QualName::new(None, ns!(), LocalName::from(*name)),
                value: format_tendril!("{}", value),
            })
            .collect();

        create_element(
            &self.dom,
            QualName::new(None, ns!(html), LocalName::from(tag)),
            attrs,
        )
    }

    /// 创建游离文本节点
    pub fn create_text(&self, text: &str) -> Handle {
        Node::new(NodeData::Text {
            contents: RefCell::new(StrTendril::from_slice(text)),
        })
    }

    /// 追加子节点
    pub fn append_child(&self, parent: &Handle, child: &Handle) {
        self.insert_before(parent, child, None);
    }

    /// 在 `reference` 之前插入子节点；`reference` 为空或不是 `parent` 的子节点时追加到末尾
    pub fn insert_before(&self, parent: &Handle, child: &Handle, reference: Option<&Handle>) {
        self.detach(child);

        {
            let mut children = parent.children.borrow_mut();
            let index = reference
                .and_then(|r| children.iter().position(|c| Rc::ptr_eq(c, r)))
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        child.parent.set(Some(Rc::downgrade(parent)));

        self.record(MutationRecord {
            target: parent.clone(),
            added_nodes: vec![child.clone()],
            removed_nodes: Vec::new(),
        });
    }

    /// 在 `reference` 之后插入兄弟节点；`reference` 没有父节点时返回 false
    pub fn insert_after(&self, reference: &Handle, child: &Handle) -> bool {
        let Some(parent) = parent_of(reference) else {
            return false;
        };

        self.detach(child);

        {
            let mut children = parent.children.borrow_mut();
            let index = children
                .iter()
                .position(|c| Rc::ptr_eq(c, reference))
                .map(|i| i + 1)
                .unwrap_or(children.len());
            children.insert(index, child.clone());
        }
        child.parent.set(Some(Rc::downgrade(&parent)));

        self.record(MutationRecord {
            target: parent,
            added_nodes: vec![child.clone()],
            removed_nodes: Vec::new(),
        });
        true
    }

    /// 从父节点移除；节点本已游离时返回 false
    pub fn remove(&self, node: &Handle) -> bool {
        match self.detach(node) {
            Some(parent) => {
                self.record(MutationRecord {
                    target: parent,
                    added_nodes: Vec::new(),
                    removed_nodes: vec![node.clone()],
                });
                true
            }
            None => false,
        }
    }

    fn detach(&self, node: &Handle) -> Option<Handle> {
        let parent = parent_of(node)?;
        {
            let mut children = parent.children.borrow_mut();
            if let Some(index) = children.iter().position(|c| Rc::ptr_eq(c, node)) {
                children.remove(index);
            }
        }
        node.parent.set(None);
        Some(parent)
    }

    /// 只记录已挂在文档上的目标，游离子树内的修改不可观察
    fn record(&self, record: MutationRecord) {
        if !self.observed.get() || !self.is_connected(&record.target) {
            return;
        }
        self.records.borrow_mut().push(record);
        self.notify.notify_one();
    }

    /// 开始记录结构性修改
    pub fn observe(&self) {
        self.observed.set(true);
    }

    /// 停止记录并丢弃尚未取走的记录
    pub fn disconnect(&self) {
        self.observed.set(false);
        self.records.borrow_mut().clear();
    }

    pub fn is_observed(&self) -> bool {
        self.observed.get()
    }

    /// 取走当前累积的一批修改记录（按发生顺序）
    pub fn take_records(&self) -> Vec<MutationRecord> {
        std::mem::take(&mut *self.records.borrow_mut())
    }

    /// 丢弃不满足条件的待处理记录
    pub fn retain_records(&self, keep: impl FnMut(&MutationRecord) -> bool) {
        self.records.borrow_mut().retain(keep);
    }

    /// 等待下一批修改记录
    pub async fn mutated(&self) {
        if !self.records.borrow().is_empty() {
            return;
        }
        self.notify.notified().await;
    }
}
