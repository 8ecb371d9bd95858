//! 文档模型
//!
//! - `node`: rcdom 节点的基础读写
//! - `document`: 带修改记录的文档包装
//! - `selector`: 适配器使用的选择器子集

pub mod document;
pub mod node;
pub mod selector;

pub use document::{Document, MutationRecord};
pub use node::NodeKey;
pub use selector::{SelectorError, SelectorList, SelectorPattern};
