//! 设置协调器

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use tracing::debug;

use super::{EngineSettings, SettingsEffect, SettingsSnapshot};

/// 设置变化的来源通道
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Push,
    Poll,
}

/// 与最近一次应用的快照相比发生变化的键
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDiff {
    pub changed: BTreeSet<String>,
}

/// 正在进行的一次设置应用
///
/// 持有期间其他通道的 [`SettingsReconciler::try_begin`] 返回 `None`，析构时释放。
pub struct ChangeToken<'a> {
    in_flight: &'a Cell<bool>,
    channel: Channel,
}

impl ChangeToken<'_> {
    pub fn channel(&self) -> Channel {
        self.channel
    }
}

impl Drop for ChangeToken<'_> {
    fn drop(&mut self) {
        self.in_flight.set(false);
    }
}

/// 推送与轮询两条通道的唯一消费者
pub struct SettingsReconciler {
    settings: RefCell<EngineSettings>,
    last_applied: RefCell<SettingsSnapshot>,
    in_flight: Cell<bool>,
    applied_changes: Cell<u64>,
}

impl SettingsReconciler {
    pub fn new(initial: SettingsSnapshot) -> Self {
        Self {
            settings: RefCell::new(EngineSettings::from_snapshot(&initial)),
            last_applied: RefCell::new(initial),
            in_flight: Cell::new(false),
            applied_changes: Cell::new(0),
        }
    }

    /// 当前权威设置
    pub fn settings(&self) -> EngineSettings {
        self.settings.borrow().clone()
    }

    pub fn last_applied(&self) -> SettingsSnapshot {
        self.last_applied.borrow().clone()
    }

    /// 已应用的变化次数
    pub fn applied_changes(&self) -> u64 {
        self.applied_changes.get()
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.get()
    }

    /// 获取应用令牌，已有应用在进行时返回 `None`
    pub fn try_begin(&self, channel: Channel) -> Option<ChangeToken<'_>> {
        if self.in_flight.replace(true) {
            debug!("{:?} 通道的设置变化被忽略：已有变化正在应用", channel);
            return None;
        }
        Some(ChangeToken {
            in_flight: &self.in_flight,
            channel,
        })
    }

    /// 按键集合与值相等性比较快照
    pub fn diff(&self, snapshot: &SettingsSnapshot) -> Option<SettingsDiff> {
        let last = self.last_applied.borrow();
        let changed: BTreeSet<String> = last
            .keys()
            .chain(snapshot.keys())
            .filter(|key| last.get(*key) != snapshot.get(*key))
            .cloned()
            .collect();

        if changed.is_empty() {
            None
        } else {
            Some(SettingsDiff { changed })
        }
    }

    /// 接受一份快照：无变化时返回 `None`，否则更新权威设置并返回需要执行的动作
    ///
    /// 调用方必须持有令牌；快照在动作执行前就记为已应用，
    /// 动作执行期间到达的相同快照因此不会再次触发。
    pub fn accept(
        &self,
        _token: &ChangeToken<'_>,
        snapshot: SettingsSnapshot,
    ) -> Option<(SettingsDiff, Vec<SettingsEffect>)> {
        let diff = self.diff(&snapshot)?;
        let effects = self.settings.borrow_mut().apply(&snapshot);
        *self.last_applied.borrow_mut() = snapshot;
        self.applied_changes.set(self.applied_changes.get() + 1);
        Some((diff, effects))
    }
}
