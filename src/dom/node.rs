//! 基础 DOM 节点操作

use std::rc::Rc;

use html5ever::interface::{Attribute, QualName};
use html5ever::tendril::format_tendril;
use html5ever::{namespace_url, ns, LocalName};
use markup5ever_rcdom::{Handle, NodeData};

/// 元素的稳定身份标识
///
/// 取自节点的 `Rc` 指针地址。只要持有对应的 `Handle`，该地址就不会被复用，
/// 因此状态表在保存键的同时必须保存节点本身。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeKey(usize);

impl NodeKey {
    pub fn of(node: &Handle) -> Self {
        NodeKey(Rc::as_ptr(node) as usize)
    }
}

/// 判断是否为元素节点
pub fn is_element(node: &Handle) -> bool {
    matches!(node.data, NodeData::Element { .. })
}

/// 获取节点名称
pub fn get_node_name(node: &Handle) -> Option<&'_ str> {
    match &node.data {
        NodeData::Element { name, .. } => Some(name.local.as_ref()),
        _ => None,
    }
}

/// 判断元素标签名（不区分大小写）
pub fn has_tag(node: &Handle, tag: &str) -> bool {
    get_node_name(node).is_some_and(|name| name.eq_ignore_ascii_case(tag))
}

/// 获取节点属性值
pub fn get_node_attr(node: &Handle, attr_name: &str) -> Option<String> {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            for attr in attrs.borrow().iter() {
                if &*attr.name.local == attr_name {
                    return Some(attr.value.to_string());
                }
            }
            None
        }
        _ => None,
    }
}

/// 判断节点是否带有某属性
pub fn has_node_attr(node: &Handle, attr_name: &str) -> bool {
    match &node.data {
        NodeData::Element { attrs, .. } => {
            attrs.borrow().iter().any(|attr| &*attr.name.local == attr_name)
        }
        _ => false,
    }
}

/// 设置节点属性，`None` 表示删除该属性
pub fn set_node_attr(node: &Handle, attr_name: &str, attr_value: Option<String>) {
    if let NodeData::Element { attrs, .. } = &node.data {
        let attrs_mut = &mut attrs.borrow_mut();
        let mut i = 0;
        let mut found_existing_attr: bool = false;

        while i < attrs_mut.len() {
            if &attrs_mut[i].name.local == attr_name {
                found_existing_attr = true;

                if let Some(attr_value) = attr_value.as_deref() {
                    attrs_mut[i].value.clear();
                    attrs_mut[i].value.push_slice(attr_value);
                } else {
                    // Remove attr completely if attr_value is not defined
                    attrs_mut.remove(i);
                    continue;
                }
            }

            i += 1;
        }

        if !found_existing_attr {
            if let Some(attr_value) = attr_value {
                attrs_mut.push(Attribute {
                    name: QualName::new(None, ns!(), LocalName::from(attr_name)),
                    value: format_tendril!("{}", attr_value),
                });
            }
        }
    };
}

/// 判断元素的 class 属性中是否包含指定类名
pub fn has_class(node: &Handle, class_name: &str) -> bool {
    get_node_attr(node, "class")
        .is_some_and(|classes| classes.split_ascii_whitespace().any(|c| c == class_name))
}

/// 获取父节点
///
/// rcdom 把父指针存放在 `Cell<Option<Weak>>` 中，读取时必须取出再放回。
pub fn parent_of(node: &Handle) -> Option<Handle> {
    let weak = node.parent.take();
    let parent = weak.as_ref().and_then(|w| w.upgrade());
    node.parent.set(weak);
    parent
}

/// 获取父元素（文档节点不算）
pub fn parent_element(node: &Handle) -> Option<Handle> {
    parent_of(node).filter(is_element)
}

/// 由近及远的祖先元素
pub fn ancestor_elements(node: &Handle) -> Vec<Handle> {
    let mut result = Vec::new();
    let mut current = parent_element(node);
    while let Some(ancestor) = current {
        current = parent_element(&ancestor);
        result.push(ancestor);
    }
    result
}

/// 直接子元素
pub fn element_children(node: &Handle) -> Vec<Handle> {
    node.children
        .borrow()
        .iter()
        .filter(|child| is_element(child))
        .cloned()
        .collect()
}

/// 按文档顺序列出所有后代元素（不含自身）
pub fn descendant_elements(node: &Handle) -> Vec<Handle> {
    let mut found = Vec::new();
    collect_descendants(node, &mut found);
    found
}

fn collect_descendants(node: &Handle, found: &mut Vec<Handle>) {
    for child in node.children.borrow().iter() {
        if is_element(child) {
            found.push(child.clone());
        }
        collect_descendants(child, found);
    }
}

/// 按文档顺序查找指定标签的后代元素
pub fn elements_by_tag(node: &Handle, tag: &str) -> Vec<Handle> {
    descendant_elements(node)
        .into_iter()
        .filter(|element| has_tag(element, tag))
        .collect()
}

/// 拼接节点下所有文本（等价于 textContent）
pub fn text_content(node: &Handle) -> String {
    let mut text = String::new();
    append_text(node, &mut text);
    text
}

fn append_text(node: &Handle, text: &mut String) {
    match &node.data {
        NodeData::Text { contents } => text.push_str(&contents.borrow()),
        _ => {
            for child in node.children.borrow().iter() {
                append_text(child, text);
            }
        }
    }
}

/// `ancestor` 是否包含 `node`（含自身）
pub fn contains(ancestor: &Handle, node: &Handle) -> bool {
    if Rc::ptr_eq(ancestor, node) {
        return true;
    }
    let mut current = parent_of(node);
    while let Some(parent) = current {
        if Rc::ptr_eq(&parent, ancestor) {
            return true;
        }
        current = parent_of(&parent);
    }
    false
}
