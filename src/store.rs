//! In-memory document store.
//!
//! The sole serialization point for all state. Each collection keeps its
//! documents in insertion order behind one `RwLock`, and every update runs
//! its guard and mutation under a single write acquisition. That per-document
//! atomic update is the only mutual-exclusion primitive the rest of the crate
//! relies on; in particular `update_one_if` is the conditional
//! "decrement quantity by N only if quantity >= N" step that keeps stock from
//! going negative under concurrent requests.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use thiserror::Error;

use crate::cart::Cart;
use crate::catalog::Food;
use crate::orders::Order;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store lock poisoned during {0}")]
    Unavailable(&'static str),
}

/// Documents carry their own identity; the collection assigns it on insert.
pub trait Keyed {
    fn key(&self) -> &str;
    fn assign_key(&mut self, key: String);
}

pub type Sort<T> = fn(&T, &T) -> Ordering;

pub struct FindOptions<T> {
    pub sort: Option<Sort<T>>,
    pub skip: u64,
    pub limit: Option<u64>,
}

impl<T> Default for FindOptions<T> {
    fn default() -> Self {
        Self {
            sort: None,
            skip: 0,
            limit: None,
        }
    }
}

impl<T> FindOptions<T> {
    pub fn page(page: u64, page_size: u64) -> Self {
        Self {
            sort: None,
            skip: page.saturating_mul(page_size),
            limit: Some(page_size),
        }
    }
}

/// Outcome of a conditional update.
#[derive(Debug, Clone, PartialEq)]
pub enum Conditional<T> {
    Applied(T),
    Rejected,
    Missing,
}

pub struct Collection<T> {
    docs: Arc<RwLock<Vec<T>>>,
    next_key: Arc<AtomicU64>,
}

impl<T> Clone for Collection<T> {
    fn clone(&self) -> Self {
        Self {
            docs: self.docs.clone(),
            next_key: self.next_key.clone(),
        }
    }
}

impl<T: Keyed + Clone> Collection<T> {
    pub fn new() -> Self {
        Self {
            docs: Arc::new(RwLock::new(Vec::new())),
            next_key: Arc::new(AtomicU64::new(1)),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Vec<T>>, StoreError> {
        self.docs.read().map_err(|_| StoreError::Unavailable("read"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Vec<T>>, StoreError> {
        self.docs.write().map_err(|_| StoreError::Unavailable("write"))
    }

    fn fresh_key(&self) -> String {
        self.next_key.fetch_add(1, AtomicOrdering::SeqCst).to_string()
    }

    /// Assigns a key and stores the document, returning it with the key set.
    pub fn insert(&self, mut doc: T) -> Result<T, StoreError> {
        doc.assign_key(self.fresh_key());
        let mut docs = self.write()?;
        docs.push(doc.clone());
        Ok(doc)
    }

    pub fn find(
        &self,
        filter: impl Fn(&T) -> bool,
        options: &FindOptions<T>,
    ) -> Result<Vec<T>, StoreError> {
        let docs = self.read()?;
        let mut matched: Vec<T> = docs.iter().filter(|doc| filter(doc)).cloned().collect();
        if let Some(sort) = options.sort {
            // stable sort: equal keys keep insertion order
            matched.sort_by(sort);
        }
        let picked = matched.into_iter().skip(options.skip as usize);
        Ok(match options.limit {
            Some(limit) => picked.take(limit as usize).collect(),
            None => picked.collect(),
        })
    }

    pub fn find_one(&self, filter: impl Fn(&T) -> bool) -> Result<Option<T>, StoreError> {
        Ok(self.read()?.iter().find(|doc| filter(doc)).cloned())
    }

    /// Like `find`, but maps each match through a projection instead of
    /// cloning whole documents.
    pub fn project<P>(
        &self,
        filter: impl Fn(&T) -> bool,
        options: &FindOptions<T>,
        projection: impl Fn(&T) -> P,
    ) -> Result<Vec<P>, StoreError> {
        let docs = self.read()?;
        let mut matched: Vec<&T> = docs.iter().filter(|doc| filter(doc)).collect();
        if let Some(sort) = options.sort {
            matched.sort_by(|a, b| sort(a, b));
        }
        let picked = matched.into_iter().skip(options.skip as usize);
        Ok(match options.limit {
            Some(limit) => picked.take(limit as usize).map(&projection).collect(),
            None => picked.map(&projection).collect(),
        })
    }

    pub fn count(&self, filter: impl Fn(&T) -> bool) -> Result<u64, StoreError> {
        Ok(self.read()?.iter().filter(|doc| filter(doc)).count() as u64)
    }

    /// Read-modify-write of the first match under one write lock. Returns the
    /// updated document, or `None` when nothing matched.
    pub fn update_one(
        &self,
        filter: impl Fn(&T) -> bool,
        mutate: impl FnOnce(&mut T),
    ) -> Result<Option<T>, StoreError> {
        let mut docs = self.write()?;
        match docs.iter_mut().find(|doc| filter(&**doc)) {
            Some(doc) => {
                mutate(doc);
                Ok(Some(doc.clone()))
            }
            None => Ok(None),
        }
    }

    /// Conditional update: the guard and the mutation run under the same
    /// write lock, so a rejected guard means nothing was touched.
    pub fn update_one_if(
        &self,
        filter: impl Fn(&T) -> bool,
        guard: impl FnOnce(&T) -> bool,
        mutate: impl FnOnce(&mut T),
    ) -> Result<Conditional<T>, StoreError> {
        let mut docs = self.write()?;
        match docs.iter_mut().find(|doc| filter(&**doc)) {
            Some(doc) => {
                if !guard(doc) {
                    return Ok(Conditional::Rejected);
                }
                mutate(doc);
                Ok(Conditional::Applied(doc.clone()))
            }
            None => Ok(Conditional::Missing),
        }
    }

    /// Update the first match, or insert a fresh document when none exists.
    /// Both paths hold the same write lock, so two concurrent upserts for the
    /// same filter cannot both insert.
    pub fn upsert(
        &self,
        filter: impl Fn(&T) -> bool,
        mutate: impl FnOnce(&mut T),
        insert: impl FnOnce() -> T,
    ) -> Result<T, StoreError> {
        let mut docs = self.write()?;
        if let Some(doc) = docs.iter_mut().find(|doc| filter(&**doc)) {
            mutate(doc);
            return Ok(doc.clone());
        }
        let mut doc = insert();
        doc.assign_key(self.fresh_key());
        docs.push(doc.clone());
        Ok(doc)
    }

    /// Removes and returns the first match.
    pub fn take_one(&self, filter: impl Fn(&T) -> bool) -> Result<Option<T>, StoreError> {
        let mut docs = self.write()?;
        match docs.iter().position(|doc| filter(doc)) {
            Some(index) => Ok(Some(docs.remove(index))),
            None => Ok(None),
        }
    }

    pub fn delete_many(&self, filter: impl Fn(&T) -> bool) -> Result<u64, StoreError> {
        let mut docs = self.write()?;
        let before = docs.len();
        docs.retain(|doc| !filter(doc));
        Ok((before - docs.len()) as u64)
    }
}

/// Process-scoped handle to every collection. Acquired once at startup and
/// handed to handlers through the shared state; cloning shares the data.
#[derive(Clone)]
pub struct Store {
    pub foods: Collection<Food>,
    pub carts: Collection<Cart>,
    pub orders: Collection<Order>,
}

impl Store {
    pub fn new() -> Self {
        Self {
            foods: Collection::new(),
            carts: Collection::new(),
            orders: Collection::new(),
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Doc {
        id: String,
        label: String,
        rank: u64,
    }

    impl Keyed for Doc {
        fn key(&self) -> &str {
            &self.id
        }

        fn assign_key(&mut self, key: String) {
            self.id = key;
        }
    }

    fn doc(label: &str, rank: u64) -> Doc {
        Doc {
            id: String::new(),
            label: label.to_string(),
            rank,
        }
    }

    fn seeded() -> Collection<Doc> {
        let collection = Collection::new();
        collection.insert(doc("a", 3)).unwrap();
        collection.insert(doc("b", 1)).unwrap();
        collection.insert(doc("c", 3)).unwrap();
        collection.insert(doc("d", 2)).unwrap();
        collection
    }

    #[test]
    fn insert_assigns_distinct_keys_in_order() {
        let collection = seeded();
        let all = collection.find(|_| true, &FindOptions::default()).unwrap();
        let keys: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(keys, ["1", "2", "3", "4"]);
    }

    #[test]
    fn find_respects_skip_and_limit() {
        let collection = seeded();
        let page = collection
            .find(
                |_| true,
                &FindOptions {
                    sort: None,
                    skip: 1,
                    limit: Some(2),
                },
            )
            .unwrap();
        let labels: Vec<&str> = page.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["b", "c"]);
    }

    #[test]
    fn page_options_compute_skip() {
        let collection = seeded();
        let page = collection.find(|_| true, &FindOptions::page(1, 3)).unwrap();
        let labels: Vec<&str> = page.iter().map(|d| d.label.as_str()).collect();
        assert_eq!(labels, ["d"]);
    }

    fn by_rank_desc(a: &Doc, b: &Doc) -> std::cmp::Ordering {
        b.rank.cmp(&a.rank)
    }

    #[test]
    fn sort_is_stable_for_equal_keys() {
        let collection = seeded();
        let sorted = collection
            .find(
                |_| true,
                &FindOptions {
                    sort: Some(by_rank_desc),
                    skip: 0,
                    limit: None,
                },
            )
            .unwrap();
        let labels: Vec<&str> = sorted.iter().map(|d| d.label.as_str()).collect();
        // "a" and "c" share rank 3 and keep their insertion order
        assert_eq!(labels, ["a", "c", "d", "b"]);
    }

    #[test]
    fn update_one_if_rejects_without_mutating() {
        let collection = seeded();
        let outcome = collection
            .update_one_if(|d| d.label == "b", |d| d.rank >= 5, |d| d.rank -= 5)
            .unwrap();
        assert_eq!(outcome, Conditional::Rejected);
        let unchanged = collection.find_one(|d| d.label == "b").unwrap().unwrap();
        assert_eq!(unchanged.rank, 1);
    }

    #[test]
    fn update_one_if_applies_under_guard() {
        let collection = seeded();
        let outcome = collection
            .update_one_if(|d| d.label == "a", |d| d.rank >= 2, |d| d.rank -= 2)
            .unwrap();
        match outcome {
            Conditional::Applied(updated) => assert_eq!(updated.rank, 1),
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[test]
    fn update_one_if_reports_missing() {
        let collection = seeded();
        let outcome = collection
            .update_one_if(|d| d.label == "zzz", |_| true, |_| {})
            .unwrap();
        assert_eq!(outcome, Conditional::Missing);
    }

    #[test]
    fn upsert_merges_then_inserts() {
        let collection = seeded();
        let merged = collection
            .upsert(|d| d.label == "a", |d| d.rank += 10, || doc("a", 0))
            .unwrap();
        assert_eq!(merged.rank, 13);
        assert_eq!(collection.count(|_| true).unwrap(), 4);

        let inserted = collection
            .upsert(|d| d.label == "e", |d| d.rank += 10, || doc("e", 7))
            .unwrap();
        assert_eq!(inserted.rank, 7);
        assert!(!inserted.id.is_empty());
        assert_eq!(collection.count(|_| true).unwrap(), 5);
    }

    #[test]
    fn take_one_removes_exactly_one() {
        let collection = seeded();
        let taken = collection.take_one(|d| d.rank == 3).unwrap().unwrap();
        assert_eq!(taken.label, "a");
        assert_eq!(collection.count(|_| true).unwrap(), 3);
        assert!(collection.take_one(|d| d.label == "zzz").unwrap().is_none());
    }

    #[test]
    fn delete_many_reports_removed_count() {
        let collection = seeded();
        assert_eq!(collection.delete_many(|d| d.rank == 3).unwrap(), 2);
        assert_eq!(collection.count(|_| true).unwrap(), 2);
        assert_eq!(collection.delete_many(|d| d.rank == 99).unwrap(), 0);
    }

    #[test]
    fn project_maps_matches() {
        let collection = seeded();
        let labels = collection
            .project(|d| d.rank >= 2, &FindOptions::default(), |d| d.label.clone())
            .unwrap();
        assert_eq!(labels, ["a", "c", "d"]);
    }
}
