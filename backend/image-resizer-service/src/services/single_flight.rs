//! In-process request coalescing
//!
//! The first caller for a key runs the work; callers arriving while it is in
//! flight await the same outcome. The slot is released once the work finishes
//! or every caller for it has been dropped, so later callers start fresh.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub struct SingleFlight<T> {
    calls: DashMap<String, Arc<OnceCell<T>>>,
}

impl<T: Clone> SingleFlight<T> {
    pub fn new() -> Self {
        Self {
            calls: DashMap::new(),
        }
    }

    /// Run `work` for `key` unless a call for the same key is already running,
    /// in which case wait for that call's result instead.
    ///
    /// If the running caller is cancelled, one of the waiters takes over.
    /// The key's slot is released when the work completes or when the last
    /// caller for it is dropped, so cancelled calls never leave entries behind.
    pub async fn run<F, Fut>(&self, key: &str, work: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let slot = Slot::join(&self.calls, key);
        match slot.cell.as_deref() {
            Some(cell) => cell.get_or_init(work).await.clone(),
            None => work().await,
        }
    }

    /// Keys with a call currently running
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}

/// One caller's share of an in-flight key.
///
/// Every clone and drop of the shared cell happens under the map's shard
/// lock, so the reference count seen in `drop` is exact.
struct Slot<'a, T> {
    calls: &'a DashMap<String, Arc<OnceCell<T>>>,
    key: String,
    cell: Option<Arc<OnceCell<T>>>,
}

impl<'a, T> Slot<'a, T> {
    fn join(calls: &'a DashMap<String, Arc<OnceCell<T>>>, key: &str) -> Self {
        let cell = calls
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone();
        Self {
            calls,
            key: key.to_string(),
            cell: Some(cell),
        }
    }
}

impl<T> Drop for Slot<'_, T> {
    fn drop(&mut self) {
        let Some(cell) = self.cell.take() else {
            return;
        };
        if let Entry::Occupied(entry) = self.calls.entry(std::mem::take(&mut self.key)) {
            let ours = Arc::ptr_eq(entry.get(), &cell);
            let done = cell.initialized();
            drop(cell);
            // Only the map still holds it: nobody is left to finish the work
            if ours && (done || Arc::strong_count(entry.get()) == 1) {
                entry.remove();
            }
        }
    }
}

impl<T: Clone> Default for SingleFlight<T> {
    fn default() -> Self {
        Self::new()
    }
}
