//! 网关读缓存
//!
//! get 与 list 的结果按 (种类, 键) 缓存，条目在 TTL 后失效，总数不超过 max_entries。
//! 写操作按种类整体失效；删除会级联，因此清空全部条目。锁从不跨越 `.await`。

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;

use crate::resources::{ListScope, ResourceKind, ResourceRef};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum CacheKey {
    Get(ResourceKind, String),
    List(ResourceKind, String),
}

impl CacheKey {
    fn kind(&self) -> ResourceKind {
        match self {
            CacheKey::Get(kind, _) | CacheKey::List(kind, _) => *kind,
        }
    }
}

struct Entry {
    value: Value,
    inserted_at: Instant,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub enabled: bool,
    pub entries: usize,
    pub max_entries: usize,
    pub ttl_secs: u64,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<CacheKey, Entry>,
    hits: u64,
    misses: u64,
}

pub struct ReadCache {
    ttl: Duration,
    max_entries: usize,
    inner: Mutex<Inner>,
}

fn scope_key(scope: &ListScope) -> String {
    match scope {
        ListScope::Mine { filter } => format!("mine:{filter}"),
        ListScope::Under { parent, filter } => {
            format!("{}:{}:{filter}", parent.kind.label(), parent.id)
        }
    }
}

impl ReadCache {
    /// ttl 为 0 或 max_entries 为 0 时不缓存
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            ttl,
            max_entries,
            inner: Mutex::new(Inner::default()),
        }
    }

    pub fn disabled() -> Self {
        Self::new(Duration::ZERO, 0)
    }

    pub fn is_enabled(&self) -> bool {
        !self.ttl.is_zero() && self.max_entries > 0
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lookup(&self, key: &CacheKey) -> Option<Value> {
        if !self.is_enabled() {
            return None;
        }
        let mut inner = self.lock();
        let fresh = match inner.entries.get(key) {
            Some(e) if e.inserted_at.elapsed() < self.ttl => Some(e.value.clone()),
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };
        match fresh {
            Some(_) => inner.hits += 1,
            None => inner.misses += 1,
        }
        fresh
    }

    fn store(&self, key: CacheKey, value: Value) {
        if !self.is_enabled() {
            return;
        }
        let mut inner = self.lock();
        if inner.entries.len() >= self.max_entries && !inner.entries.contains_key(&key) {
            let ttl = self.ttl;
            inner.entries.retain(|_, e| e.inserted_at.elapsed() < ttl);
            if inner.entries.len() >= self.max_entries {
                let oldest = inner
                    .entries
                    .iter()
                    .min_by_key(|(_, e)| e.inserted_at)
                    .map(|(k, _)| k.clone());
                if let Some(k) = oldest {
                    inner.entries.remove(&k);
                }
            }
        }
        inner.entries.insert(
            key,
            Entry {
                value,
                inserted_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, target: &ResourceRef) -> Option<Value> {
        self.lookup(&CacheKey::Get(target.kind, target.id.clone()))
    }

    pub fn put(&self, target: &ResourceRef, value: &Value) {
        self.store(CacheKey::Get(target.kind, target.id.clone()), value.clone());
    }

    pub fn get_list(&self, kind: ResourceKind, scope: &ListScope) -> Option<Vec<Value>> {
        match self.lookup(&CacheKey::List(kind, scope_key(scope)))? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn put_list(&self, kind: ResourceKind, scope: &ListScope, items: &[Value]) {
        self.store(
            CacheKey::List(kind, scope_key(scope)),
            Value::Array(items.to_vec()),
        );
    }

    /// 某种资源被创建或修改；清单项变化同时影响清单的渲染结果
    pub fn invalidate(&self, kind: ResourceKind) {
        let mut inner = self.lock();
        inner.entries.retain(|key, _| {
            let k = key.kind();
            k != kind && !(kind == ResourceKind::CheckItem && k == ResourceKind::Checklist)
        });
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.lock();
        let lookups = inner.hits + inner.misses;
        CacheStats {
            enabled: self.is_enabled(),
            entries: inner.entries.len(),
            max_entries: self.max_entries,
            ttl_secs: self.ttl.as_secs(),
            hits: inner.hits,
            misses: inner.misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                inner.hits as f64 / lookups as f64
            },
        }
    }
}
