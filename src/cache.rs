//! 译文缓存
//!
//! 以原文指纹为键保存已经得到的译文，作用域为当前文档。
//! 只缓存非空且不同于原文的译文；失败结果不缓存，下一轮可以重试。

use std::cell::RefCell;
use std::fmt;
use std::num::NonZeroUsize;

use blake3::Hasher;
use lru::LruCache;

use crate::config::constants::DEFAULT_CACHE_CAPACITY;

/// 原文指纹
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// 对规范化后的原文（去首尾空白、合并连续空白）取 blake3 摘要
    pub fn of(text: &str) -> Self {
        let mut hasher = Hasher::new();
        for (i, word) in text.split_whitespace().enumerate() {
            if i > 0 {
                hasher.update(b" ");
            }
            hasher.update(word.as_bytes());
        }
        Fingerprint(*hasher.finalize().as_bytes())
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// 缓存统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub inserts: u64,
    pub evictions: u64,
}

/// 标注缓存
pub struct AnnotationCache {
    entries: RefCell<LruCache<Fingerprint, String>>,
    stats: RefCell<CacheStats>,
}

impl AnnotationCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);

        Self {
            entries: RefCell::new(LruCache::new(capacity)),
            stats: RefCell::new(CacheStats::default()),
        }
    }

    /// 查找译文
    pub fn get(&self, fingerprint: &Fingerprint) -> Option<String> {
        let found = self.entries.borrow_mut().get(fingerprint).cloned();
        let mut stats = self.stats.borrow_mut();
        if found.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        found
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.entries.borrow().contains(fingerprint)
    }

    /// 写入译文，空译文或与原文相同的译文被拒绝
    pub fn insert(&self, fingerprint: Fingerprint, original: &str, translated: &str) -> bool {
        if translated.is_empty() || translated == original {
            return false;
        }
        self.entries
            .borrow_mut()
            .put(fingerprint, translated.to_string());
        self.stats.borrow_mut().inserts += 1;
        true
    }

    /// 移除指纹，返回是否存在
    pub fn evict(&self, fingerprint: &Fingerprint) -> bool {
        let removed = self.entries.borrow_mut().pop(fingerprint).is_some();
        if removed {
            self.stats.borrow_mut().evictions += 1;
        }
        removed
    }

    pub fn clear(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.borrow()
    }
}

impl Default for AnnotationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}
