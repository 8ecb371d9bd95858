// 集成测试公共模块
//
// 提供可编排的模拟翻译服务、测试适配器与文档辅助函数

#![allow(dead_code)]

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use async_trait::async_trait;
use markup5ever_rcdom::Handle;
use serde_json::Value;
use tokio::sync::Semaphore;

use interlinear::adapters::SelectorGroup;
use interlinear::annotator::{is_annotation_node, is_marked};
use interlinear::dom::node::{descendant_elements, elements_by_tag, text_content};
use interlinear::{
    AdapterCatalogue, AdapterConfig, Document, Engine, EngineConfig, MemorySettingsStore,
    SettingsSnapshot, Translator,
};

/// 测试站点的主机名
pub const TEST_HOST: &str = "news.example.com";

/// 模拟翻译服务
///
/// 默认立即返回 `[目标语言] 原文`；`gated()` 创建的实例每次调用都要等待一个许可，
/// 用于制造翻译进行中的交错。
pub struct MockTranslator {
    calls: Cell<usize>,
    texts: RefCell<Vec<String>>,
    responses: RefCell<HashMap<String, String>>,
    gate: Option<Semaphore>,
}

impl MockTranslator {
    pub fn new() -> Self {
        Self {
            calls: Cell::new(0),
            texts: RefCell::new(Vec::new()),
            responses: RefCell::new(HashMap::new()),
            gate: None,
        }
    }

    pub fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::new()
        }
    }

    /// 为指定原文预设译文
    pub fn respond(&self, text: &str, translation: &str) {
        self.responses
            .borrow_mut()
            .insert(text.to_string(), translation.to_string());
    }

    /// 放行 `n` 个等待中的（或之后的）调用
    pub fn release(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.borrow().clone()
    }
}

#[async_trait(?Send)]
impl Translator for MockTranslator {
    async fn translate(&self, text: &str, target_lang: &str) -> String {
        self.calls.set(self.calls.get() + 1);
        self.texts.borrow_mut().push(text.to_string());

        if let Some(gate) = &self.gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        self.responses
            .borrow()
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target_lang, text))
    }
}

/// 把 JSON 对象转换成设置快照
pub fn snapshot(value: Value) -> SettingsSnapshot {
    value.as_object().cloned().unwrap_or_default()
}

/// 只有一个站点适配器的目录，站点上的候选元素由 `elements` 声明
pub fn catalogue(elements: &[&str]) -> AdapterCatalogue {
    let adapter = AdapterConfig::new(
        "Test",
        vec![SelectorGroup {
            kind: "post".to_string(),
            elements: elements.iter().map(|e| e.to_string()).collect(),
            exclude: Vec::new(),
        }],
    );
    let mut sites = BTreeMap::new();
    sites.insert("example.com".to_string(), adapter);
    AdapterCatalogue::new(sites, AdapterCatalogue::builtin().default_adapter().clone())
}

/// 测试用引擎及其协作者
pub struct Harness {
    pub engine: Engine,
    pub translator: Rc<MockTranslator>,
    pub store: Rc<MemorySettingsStore>,
}

impl Harness {
    pub fn document(&self) -> &Document {
        self.engine.document()
    }

    pub fn annotations(&self) -> Vec<Handle> {
        annotation_nodes(self.document())
    }
}

pub struct HarnessBuilder {
    html: String,
    host: String,
    catalogue: AdapterCatalogue,
    settings: Value,
    translator: MockTranslator,
    config: EngineConfig,
}

impl HarnessBuilder {
    pub fn new(html: &str) -> Self {
        Self {
            html: html.to_string(),
            host: TEST_HOST.to_string(),
            catalogue: catalogue(&["p"]),
            settings: serde_json::json!({ "enabled": true, "targetLang": "zh-CN" }),
            translator: MockTranslator::new(),
            config: EngineConfig::default(),
        }
    }

    pub fn host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn elements(mut self, elements: &[&str]) -> Self {
        self.catalogue = catalogue(elements);
        self
    }

    pub fn builtin_catalogue(mut self) -> Self {
        self.catalogue = AdapterCatalogue::builtin();
        self
    }

    pub fn settings(mut self, settings: Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn translator(mut self, translator: MockTranslator) -> Self {
        self.translator = translator;
        self
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub async fn build(self) -> Harness {
        let translator = Rc::new(self.translator);
        let store = Rc::new(MemorySettingsStore::with_values(snapshot(self.settings)));
        let engine = Engine::create(
            Rc::new(Document::parse_html(&self.html)),
            &self.host,
            translator.clone(),
            store.clone(),
            &self.catalogue,
            self.config,
        )
        .await
        .expect("engine should be created");

        Harness {
            engine,
            translator,
            store,
        }
    }
}

/// 文档中所有标注节点
pub fn annotation_nodes(document: &Document) -> Vec<Handle> {
    descendant_elements(&document.root())
        .into_iter()
        .filter(is_annotation_node)
        .collect()
}

/// 第 `index` 个指定标签的元素
pub fn nth_tag(document: &Document, tag: &str, index: usize) -> Handle {
    elements_by_tag(&document.root(), tag)
        .into_iter()
        .nth(index)
        .expect("element should exist")
}

/// 创建一个带文本的游离元素
pub fn element_with_text(document: &Document, tag: &str, text: &str) -> Handle {
    let element = document.create_element(tag, &[]);
    let text = document.create_text(text);
    document.append_child(&element, &text);
    element
}

/// 所有已标注元素中，是否有元素的后代也被标注
pub fn has_nested_annotation(document: &Document) -> bool {
    descendant_elements(&document.root())
        .iter()
        .filter(|element| is_marked(element))
        .any(|element| descendant_elements(element).iter().any(is_marked))
}

pub fn annotation_text(annotation: &Handle) -> String {
    text_content(annotation)
}
