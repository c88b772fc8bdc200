//! Atomic CSS.
//!
//! Each style declaration maps to one generated class and one rule. Rules are
//! appended to an ordered list the client mirrors; clients acknowledge how far
//! they have read with `nextRuleIndex`, and updates carry only the tail.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::lock;

const CLASS_PREFIX: &str = "w";
const CLASS_HASH_LEN: usize = 10;
const DEFAULT_CACHE_CAPACITY: usize = 512;

/// Maps style declarations to class names and tracks emitted rules.
pub trait CssEngine: Send + Sync {
    /// Class names for the given declarations, emitting rules for new ones.
    fn classes_for(&self, declarations: &[String]) -> Vec<String>;

    fn rule_count(&self) -> usize;

    /// Rule texts from `index` onwards.
    fn rules_since(&self, index: usize) -> Vec<String>;

    fn export(&self) -> CssState;
}

/// One emitted rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssRule {
    pub class: String,
    pub declaration: String,
}

impl CssRule {
    pub fn text(&self) -> String {
        format!(".{}{{{}}}", self.class, self.declaration)
    }
}

/// Persistable rule list, so a reconnecting client's stylesheet indexes stay
/// valid across a server restart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CssState {
    pub rules: Vec<CssRule>,
}

#[derive(Debug)]
struct Inner {
    rules: Vec<CssRule>,
    emitted: HashSet<String>,
    cache: LruCache,
}

/// Hash-named atomic classes with an LRU cache in front of the hasher.
#[derive(Debug)]
pub struct AtomicCss {
    inner: Mutex<Inner>,
}

impl AtomicCss {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                rules: Vec::new(),
                emitted: HashSet::new(),
                cache: LruCache::new(capacity),
            }),
        }
    }

    pub fn import(state: CssState) -> Self {
        let engine = Self::new();
        {
            let mut inner = lock(&engine.inner);
            inner.emitted = state.rules.iter().map(|r| r.class.clone()).collect();
            inner.rules = state.rules;
        }
        engine
    }
}

impl Default for AtomicCss {
    fn default() -> Self {
        Self::new()
    }
}

impl CssEngine for AtomicCss {
    fn classes_for(&self, declarations: &[String]) -> Vec<String> {
        let mut inner = lock(&self.inner);
        let mut classes = Vec::with_capacity(declarations.len());
        for raw in declarations {
            let declaration = normalize(raw);
            if declaration.is_empty() {
                continue;
            }
            let class = match inner.cache.get(&declaration) {
                Some(class) => class,
                None => {
                    let class = class_name(&declaration);
                    inner.cache.put(declaration.clone(), class.clone());
                    class
                }
            };
            if inner.emitted.insert(class.clone()) {
                inner.rules.push(CssRule {
                    class: class.clone(),
                    declaration,
                });
            }
            if !classes.contains(&class) {
                classes.push(class);
            }
        }
        classes
    }

    fn rule_count(&self) -> usize {
        lock(&self.inner).rules.len()
    }

    fn rules_since(&self, index: usize) -> Vec<String> {
        lock(&self.inner)
            .rules
            .iter()
            .skip(index)
            .map(CssRule::text)
            .collect()
    }

    fn export(&self) -> CssState {
        CssState {
            rules: lock(&self.inner).rules.clone(),
        }
    }
}

fn normalize(declaration: &str) -> String {
    declaration.trim().trim_end_matches(';').trim().to_string()
}

fn class_name(declaration: &str) -> String {
    let digest = Sha256::digest(declaration.as_bytes());
    let mut hash = hex::encode(digest);
    hash.truncate(CLASS_HASH_LEN);
    format!("{CLASS_PREFIX}{hash}")
}

/// Declaration to class cache. Every access stamps the entry with a fresh
/// tick; `recency` orders ticks so the oldest is evicted in `O(log n)`.
#[derive(Debug)]
struct LruCache {
    capacity: usize,
    tick: u64,
    entries: HashMap<String, (String, u64)>,
    recency: BTreeMap<u64, String>,
}

impl LruCache {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            tick: 0,
            entries: HashMap::new(),
            recency: BTreeMap::new(),
        }
    }

    fn get(&mut self, key: &str) -> Option<String> {
        let tick = self.next_tick();
        let (value, stamp) = self.entries.get_mut(key)?;
        let previous = std::mem::replace(stamp, tick);
        let value = value.clone();
        self.recency.remove(&previous);
        self.recency.insert(tick, key.to_string());
        Some(value)
    }

    fn put(&mut self, key: String, value: String) {
        let tick = self.next_tick();
        if let Some((_, previous)) = self.entries.insert(key.clone(), (value, tick)) {
            self.recency.remove(&previous);
        }
        self.recency.insert(tick, key);
        while self.entries.len() > self.capacity {
            let Some((_, evicted)) = self.recency.pop_first() else {
                break;
            };
            self.entries.remove(&evicted);
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }
}
