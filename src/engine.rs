//! 标注引擎
//!
//! [`Engine`] 把各组件装配成一个有明确生命周期的实例：
//! `create` 读取初始设置并开始监听文档，`run` 驱动推送、轮询、文档修改与防抖重扫，
//! `destroy` 断开监听并移除全部标注，让文档回到附着之前的样子。
//!
//! 引擎是单线程的：所有方法接收 `&self`，并发只来自挂起点（翻译请求与设置读取）之间的交错。

use std::cell::{Cell, RefCell};
use std::future::Future;
use std::rc::Rc;

use futures::stream::{self, StreamExt};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::adapters::AdapterCatalogue;
use crate::annotator::{
    is_annotation_node, AnnotationStateMachine, ElementOutcome, PassContext,
};
use crate::cache::AnnotationCache;
use crate::classifier::lexicon::Lexicon;
use crate::classifier::{LanguageClassifier, Thresholds};
use crate::config::EngineConfig;
use crate::dom::Document;
use crate::error::{EngineError, EngineResult};
use crate::matcher::ElementMatcher;
use crate::settings::{
    ChangeToken, Channel, EngineSettings, SettingsEffect, SettingsReconciler, SettingsSnapshot,
    SettingsStore,
};
use crate::themes::ThemeCatalogue;
use crate::translator::Translator;
use crate::watcher::{MutationSummary, MutationWatcher};

/// 一轮标注的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub candidates: usize,
    pub annotated: usize,
    pub skipped: usize,
    pub provider_calls: usize,
    pub cache_hits: usize,
    /// 调用了翻译服务却没有插入标注的元素
    pub failures: usize,
}

impl PassReport {
    fn record(&mut self, outcome: &ElementOutcome) {
        if outcome.is_annotated() {
            self.annotated += 1;
        } else {
            self.skipped += 1;
            if outcome.provider_call {
                self.failures += 1;
            }
        }
        if outcome.provider_call {
            self.provider_calls += 1;
        }
        if outcome.cache_hit {
            self.cache_hits += 1;
        }
    }
}

/// 页面语言调查结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageLanguageSurvey {
    pub total: usize,
    pub non_target: usize,
    pub ratio: f64,
    /// 非目标语言占比足够高，建议开启通用适配器
    pub suggest_universal_adapter: bool,
}

/// 标注引擎实例
pub struct Engine {
    document: Rc<Document>,
    host: String,
    translator: Rc<dyn Translator>,
    store: Rc<dyn SettingsStore>,
    config: EngineConfig,
    themes: ThemeCatalogue,
    matcher: ElementMatcher,
    classifier: RefCell<LanguageClassifier>,
    cache: AnnotationCache,
    machine: AnnotationStateMachine,
    watcher: MutationWatcher,
    reconciler: SettingsReconciler,
    push: RefCell<Option<mpsc::UnboundedReceiver<SettingsSnapshot>>>,
    passes: Cell<u64>,
    destroyed: Cell<bool>,
}

impl Engine {
    /// 创建引擎并开始监听文档
    ///
    /// 初始设置读取失败时以默认值启动，下一次轮询会补上真实设置。
    pub async fn create(
        document: Rc<Document>,
        host: &str,
        translator: Rc<dyn Translator>,
        store: Rc<dyn SettingsStore>,
        catalogue: &AdapterCatalogue,
        config: EngineConfig,
    ) -> EngineResult<Self> {
        config.validate()?;

        let initial = match store.get().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("读取初始设置失败，使用默认设置: {}", e);
                SettingsSnapshot::new()
            }
        };
        let reconciler = SettingsReconciler::new(initial);
        let settings = reconciler.settings();

        let adapter = catalogue.for_host(host);
        info!("主机 {} 使用适配器 {}", host, adapter.name);
        let matcher = ElementMatcher::new(adapter);

        let thresholds = Thresholds {
            latin_ratio: config.latin_ratio_threshold,
            script_ratio: config.script_ratio_threshold,
        };
        let classifier =
            LanguageClassifier::with_lexicon(&settings.target_lang, Lexicon::builtin()?, thresholds)?;

        let themes = ThemeCatalogue::builtin();
        let machine = AnnotationStateMachine::new(themes.resolve(&settings.theme));
        let push = store.subscribe();

        document.observe();

        Ok(Self {
            host: host.to_string(),
            translator,
            store,
            themes,
            matcher,
            classifier: RefCell::new(classifier),
            cache: AnnotationCache::new(config.cache_capacity),
            machine,
            watcher: MutationWatcher::new(config.debounce()),
            reconciler,
            push: RefCell::new(Some(push)),
            passes: Cell::new(0),
            destroyed: Cell::new(false),
            document,
            config,
        })
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.document
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn settings(&self) -> EngineSettings {
        self.reconciler.settings()
    }

    pub fn reconciler(&self) -> &SettingsReconciler {
        &self.reconciler
    }

    pub fn cache(&self) -> &AnnotationCache {
        &self.cache
    }

    pub fn state_machine(&self) -> &AnnotationStateMachine {
        &self.machine
    }

    pub fn watcher(&self) -> &MutationWatcher {
        &self.watcher
    }

    pub fn matcher(&self) -> &ElementMatcher {
        &self.matcher
    }

    /// 已运行的标注轮数
    pub fn pass_count(&self) -> u64 {
        self.passes.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.get()
    }

    /// 当前生效的适配器；引擎关闭、已销毁或通用适配器未开启时为空
    fn active_matcher(&self) -> Option<&ElementMatcher> {
        if self.destroyed.get() {
            return None;
        }
        let settings = self.reconciler.settings();
        if !settings.enabled {
            return None;
        }
        if self.matcher.adapter().is_default() && !settings.universal_adapter_enabled {
            return None;
        }
        Some(&self.matcher)
    }

    /// 运行一轮标注
    ///
    /// 候选元素总是从当前文档重新解析；同一元素的并发处理由状态机拦截。
    pub async fn annotate_pass(&self) -> PassReport {
        let Some(matcher) = self.active_matcher() else {
            debug!("没有生效的适配器，跳过本轮标注");
            return PassReport::default();
        };

        let candidates = matcher.get_candidates(&self.document);
        let classifier = self.classifier.borrow().clone();
        let ctx = PassContext {
            document: &self.document,
            matcher,
            classifier: &classifier,
            cache: &self.cache,
            translator: self.translator.as_ref(),
        };

        let outcomes: Vec<ElementOutcome> = stream::iter(candidates.iter())
            .map(|element| self.machine.process(&ctx, element))
            .buffer_unordered(self.config.max_concurrent_translations)
            .collect()
            .await;

        let mut report = PassReport {
            candidates: candidates.len(),
            ..PassReport::default()
        };
        for outcome in &outcomes {
            report.record(outcome);
        }

        self.passes.set(self.passes.get() + 1);
        info!(
            "标注完成: 候选 {} 个, 新增 {} 个, 跳过 {} 个, 翻译请求 {} 次, 缓存命中 {} 次",
            report.candidates,
            report.annotated,
            report.skipped,
            report.provider_calls,
            report.cache_hits
        );
        report
    }

    /// 移除全部标注并清空缓存
    pub fn remove_all_annotations(&self) -> usize {
        let removed = self.machine.remove_all(&self.document, &self.cache);
        self.watcher.cancel();
        // 丢弃引擎自己制造的修改记录
        self.document.retain_records(|record| {
            !record
                .removed_nodes
                .iter()
                .chain(record.added_nodes.iter())
                .all(is_annotation_node)
        });
        info!("已移除 {} 条标注", removed);
        removed
    }

    /// 按主题键改写已有标注的样式
    pub fn restyle(&self, theme: &str) -> usize {
        let theme = self.themes.resolve(theme);
        let count = self.machine.restyle(&self.document, theme);
        debug!("已将 {} 条标注切换为主题 {}", count, theme.key);
        count
    }

    /// 取走待处理的修改记录并交给变更监听器
    pub fn handle_mutations(&self) -> MutationSummary {
        let records = self.document.take_records();
        if records.is_empty() {
            return MutationSummary::default();
        }
        let summary = self.watcher.inspect(
            &self.document,
            &records,
            self.active_matcher(),
            &self.machine,
            &self.cache,
        );
        if summary.needs_rescan {
            debug!("{} 条修改记录触发重扫", summary.records);
        }
        summary
    }

    /// 通过指定通道应用一份设置快照，返回是否真正应用
    pub async fn apply_settings(&self, snapshot: SettingsSnapshot, channel: Channel) -> bool {
        let Some(token) = self.reconciler.try_begin(channel) else {
            return false;
        };
        self.apply_with(token, snapshot).await
    }

    /// 轮询设置存储
    ///
    /// 读取失败时释放令牌，等待下一次轮询重试。
    pub async fn poll_settings(&self) -> bool {
        let Some(token) = self.reconciler.try_begin(Channel::Poll) else {
            return false;
        };
        match self.store.get().await {
            Ok(snapshot) => self.apply_with(token, snapshot).await,
            Err(e) => {
                warn!("轮询设置失败，下个周期重试: {}", e);
                false
            }
        }
    }

    async fn apply_with(&self, token: ChangeToken<'_>, snapshot: SettingsSnapshot) -> bool {
        let Some((diff, effects)) = self.reconciler.accept(&token, snapshot) else {
            return false;
        };
        info!(
            "应用来自 {:?} 通道的设置变化: {:?}",
            token.channel(),
            diff.changed
        );

        self.sync_classifier();
        for effect in effects {
            match effect {
                SettingsEffect::RemoveAll => {
                    self.remove_all_annotations();
                }
                SettingsEffect::Restyle(theme) => {
                    self.restyle(&theme);
                }
                SettingsEffect::Annotate => {
                    self.annotate_pass().await;
                }
            }
        }
        true
    }

    fn sync_classifier(&self) {
        let target_lang = self.reconciler.settings().target_lang;
        let mut classifier = self.classifier.borrow_mut();
        if classifier.target().code() != target_lang {
            *classifier = classifier.retarget(&target_lang);
        }
    }

    /// 统计默认适配器候选中非目标语言的占比，用于提示开启通用适配器
    pub fn survey_page_language(&self) -> Option<PageLanguageSurvey> {
        let settings = self.reconciler.settings();
        if self.destroyed.get()
            || !settings.enabled
            || settings.universal_adapter_enabled
            || settings.hide_universal_tip
            || !self.matcher.adapter().is_default()
        {
            return None;
        }

        let classifier = self.classifier.borrow();
        let texts: Vec<String> = self
            .matcher
            .get_candidates(&self.document)
            .iter()
            .map(|element| self.matcher.extract_text(&self.document, element))
            .filter(|text| !text.is_empty())
            .collect();
        if texts.is_empty() {
            return None;
        }

        let non_target = texts
            .iter()
            .filter(|text| !classifier.is_already_target_language(text))
            .count();
        let ratio = non_target as f64 / texts.len() as f64;

        Some(PageLanguageSurvey {
            total: texts.len(),
            non_target,
            ratio,
            suggest_universal_adapter: ratio > self.config.survey_threshold,
        })
    }

    /// 驱动引擎直到 `shutdown` 完成
    ///
    /// 启动时若已启用先运行一轮，之后响应推送、轮询、文档修改与防抖截止。
    pub async fn run<F>(&self, shutdown: F) -> EngineResult<()>
    where
        F: Future<Output = ()>,
    {
        let mut push = self
            .push
            .borrow_mut()
            .take()
            .ok_or_else(|| EngineError::SettingsError("引擎已在运行".to_string()))?;

        tokio::pin!(shutdown);
        let mut poll = tokio::time::interval(self.config.poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        poll.tick().await;

        if self.active_matcher().is_some() {
            self.annotate_pass().await;
        }

        loop {
            if self.destroyed.get() {
                break;
            }
            tokio::select! {
                _ = &mut shutdown => break,
                Some(snapshot) = push.recv() => {
                    self.apply_settings(snapshot, Channel::Push).await;
                }
                _ = poll.tick() => {
                    self.poll_settings().await;
                }
                _ = self.document.mutated() => {
                    self.handle_mutations();
                }
                _ = self.watcher.wait_due() => {
                    if self.watcher.take_due() {
                        self.annotate_pass().await;
                    }
                }
            }
        }

        *self.push.borrow_mut() = Some(push);
        Ok(())
    }

    /// 断开监听并移除全部标注
    pub fn destroy(&self) {
        if self.destroyed.replace(true) {
            return;
        }
        self.document.disconnect();
        self.watcher.cancel();
        let removed = self.machine.remove_all(&self.document, &self.cache);
        info!("引擎已销毁，移除 {} 条标注", removed);
    }
}
