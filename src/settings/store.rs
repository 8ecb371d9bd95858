//! 设置存储

use std::cell::{Cell, RefCell};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use super::SettingsSnapshot;
use crate::error::{EngineError, EngineResult};

/// 键值设置存储
///
/// `get` 是轮询通道，`subscribe` 返回推送通道：每次写入后推送完整快照。
#[async_trait(?Send)]
pub trait SettingsStore {
    async fn get(&self) -> EngineResult<SettingsSnapshot>;

    async fn set(&self, key: &str, value: Value) -> EngineResult<()>;

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SettingsSnapshot>;
}

/// 进程内存储
#[derive(Default)]
pub struct MemorySettingsStore {
    values: RefCell<SettingsSnapshot>,
    subscribers: RefCell<Vec<mpsc::UnboundedSender<SettingsSnapshot>>>,
    failing_reads: Cell<usize>,
    reads: Cell<usize>,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: SettingsSnapshot) -> Self {
        Self {
            values: RefCell::new(values),
            ..Self::default()
        }
    }

    /// 写入但不推送，只能被轮询发现
    pub fn set_silently(&self, key: &str, value: Value) {
        self.values.borrow_mut().insert(key.to_string(), value);
    }

    /// 当前快照（不计入读取次数）
    pub fn snapshot(&self) -> SettingsSnapshot {
        self.values.borrow().clone()
    }

    /// 让接下来的 `n` 次读取失败
    pub fn fail_next_reads(&self, n: usize) {
        self.failing_reads.set(n);
    }

    pub fn read_count(&self) -> usize {
        self.reads.get()
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        self.subscribers
            .borrow_mut()
            .retain(|sender| sender.send(snapshot.clone()).is_ok());
    }
}

#[async_trait(?Send)]
impl SettingsStore for MemorySettingsStore {
    async fn get(&self) -> EngineResult<SettingsSnapshot> {
        self.reads.set(self.reads.get() + 1);

        let failing = self.failing_reads.get();
        if failing > 0 {
            self.failing_reads.set(failing - 1);
            return Err(EngineError::SettingsError("读取设置失败".to_string()));
        }

        Ok(self.snapshot())
    }

    async fn set(&self, key: &str, value: Value) -> EngineResult<()> {
        debug!("写入设置 {} = {}", key, value);
        self.set_silently(key, value);
        self.notify();
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<SettingsSnapshot> {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.subscribers.borrow_mut().push(sender);
        receiver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_set_pushes_full_snapshot() {
        let store = MemorySettingsStore::new();
        let mut updates = store.subscribe();

        store.set("theme", json!("light")).await.unwrap();
        store.set("enabled", json!(false)).await.unwrap();

        let first = updates.recv().await.unwrap();
        assert_eq!(first.get("theme"), Some(&json!("light")));
        let second = updates.recv().await.unwrap();
        assert_eq!(second.len(), 2);
    }

    #[tokio::test]
    async fn test_silent_write_is_only_visible_to_polls() {
        let store = MemorySettingsStore::new();
        let mut updates = store.subscribe();

        store.set_silently("targetLang", json!("ja"));
        assert!(updates.try_recv().is_err());
        assert_eq!(store.get().await.unwrap().get("targetLang"), Some(&json!("ja")));
    }

    #[tokio::test]
    async fn test_failing_reads() {
        let store = MemorySettingsStore::new();
        store.fail_next_reads(1);
        assert!(matches!(store.get().await, Err(EngineError::SettingsError(_))));
        assert!(store.get().await.is_ok());
        assert_eq!(store.read_count(), 2);
    }
}
