//! Deferred-loading attribute map.
//!
//! A [`LazyAttributes`] starts empty and carries a loader. Reading a name
//! the map does not hold runs the loader (once, under the store's lock),
//! merges the result and drops the loader. After that, reads are plain
//! lookups. Bulk preload fills the map directly; names it covered are then
//! answered without ever calling the loader.
//!
//! Attribute names match without regard to ASCII case, as in the directory.
//!
//! `None` from [`LazyAttributes::get`] means the entry genuinely lacks the
//! attribute. `Some(vec![])` means the attribute is known to be empty.

use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use roster_core::{attribute_key, insert_attribute, AttributeMap, Modification, RosterResult};
use tokio::sync::Mutex;
use tracing::debug;

/// Fetches the full attribute map of one entry.
pub type Loader = Arc<dyn Fn() -> BoxFuture<'static, RosterResult<AttributeMap>> + Send + Sync>;

/// Lifecycle of an attribute store.
///
/// `Unloaded -> Loading -> Loaded`, or `Unloaded -> Preloaded` when a bulk
/// preload fills the store first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadPhase {
    Unloaded,
    Loading,
    Loaded,
    Preloaded,
}

impl LoadPhase {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Loading,
            2 => Self::Loaded,
            3 => Self::Preloaded,
            _ => Self::Unloaded,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Unloaded => 0,
            Self::Loading => 1,
            Self::Loaded => 2,
            Self::Preloaded => 3,
        }
    }
}

struct LazyState {
    values: AttributeMap,
    loader: Option<Loader>,
}

impl LazyState {
    fn lookup(&self, name: &str) -> Option<&Vec<String>> {
        self.values.get(attribute_key(&self.values, name)?)
    }

    fn merge(&mut self, values: AttributeMap) {
        for (name, list) in values {
            insert_attribute(&mut self.values, name, list);
        }
    }
}

/// Attribute store attached to one entity instance.
pub struct LazyAttributes {
    state: Mutex<LazyState>,
    phase: AtomicU8,
}

impl LazyAttributes {
    /// An empty store that will call `loader` on first miss.
    pub fn new(loader: Loader) -> Self {
        Self {
            state: Mutex::new(LazyState {
                values: AttributeMap::new(),
                loader: Some(loader),
            }),
            phase: AtomicU8::new(LoadPhase::Unloaded.as_u8()),
        }
    }

    /// An empty store whose loader is the async function `load`.
    pub fn from_fn<F, Fut>(load: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = RosterResult<AttributeMap>> + Send + 'static,
    {
        Self::new(Arc::new(move || load().boxed()))
    }

    /// A store that is already complete and never loads.
    pub fn loaded(values: AttributeMap) -> Self {
        Self {
            state: Mutex::new(LazyState {
                values,
                loader: None,
            }),
            phase: AtomicU8::new(LoadPhase::Loaded.as_u8()),
        }
    }

    pub fn phase(&self) -> LoadPhase {
        LoadPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    /// True once the store has been loaded or preloaded.
    pub fn is_populated(&self) -> bool {
        matches!(self.phase(), LoadPhase::Loaded | LoadPhase::Preloaded)
    }

    /// Values of `name`, loading the entry first if the name is not held.
    pub async fn get(&self, name: &str) -> RosterResult<Option<Vec<String>>> {
        let mut state = self.state.lock().await;
        if let Some(values) = state.lookup(name) {
            return Ok(Some(values.clone()));
        }
        self.load_locked(&mut state).await?;
        Ok(state.lookup(name).cloned())
    }

    /// First value of `name`.
    pub async fn first(&self, name: &str) -> RosterResult<Option<String>> {
        Ok(self
            .get(name)
            .await?
            .and_then(|values| values.into_iter().next()))
    }

    /// Values of `name` without triggering a load.
    pub async fn peek(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().await.lookup(name).cloned()
    }

    /// Force the loader to run if it has not yet.
    pub async fn load(&self) -> RosterResult<()> {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state).await
    }

    /// The full map, loading it first if needed.
    pub async fn snapshot(&self) -> RosterResult<AttributeMap> {
        let mut state = self.state.lock().await;
        self.load_locked(&mut state).await?;
        Ok(state.values.clone())
    }

    /// Merge bulk-preloaded values.
    ///
    /// An unloaded store becomes `Preloaded`; the loader is kept for names
    /// the preload did not cover.
    pub async fn merge_preloaded(&self, values: AttributeMap) {
        let mut state = self.state.lock().await;
        state.merge(values);
        if self.phase() == LoadPhase::Unloaded {
            self.set_phase(LoadPhase::Preloaded);
        }
    }

    /// Store `values` under `name` without touching the directory.
    pub async fn set(&self, name: &str, values: Vec<String>) {
        let mut state = self.state.lock().await;
        insert_attribute(&mut state.values, name, values);
    }

    /// Apply a modification that the directory has already accepted.
    ///
    /// The current values are loaded first so add/delete work on the real
    /// value list rather than an empty placeholder.
    pub async fn apply(&self, modification: &Modification) -> RosterResult<Vec<String>> {
        let mut state = self.state.lock().await;
        if let Modification::Add { .. } | Modification::Delete { .. } = modification {
            if state.lookup(modification.attribute()).is_none() {
                self.load_locked(&mut state).await?;
            }
        }
        let current = state
            .lookup(modification.attribute())
            .map(Vec::as_slice)
            .unwrap_or_default();
        let next = modification.apply(current);
        insert_attribute(&mut state.values, modification.attribute(), next.clone());
        Ok(next)
    }

    async fn load_locked(&self, state: &mut LazyState) -> RosterResult<()> {
        let Some(loader) = state.loader.clone() else {
            return Ok(());
        };

        let previous = self.phase();
        self.set_phase(LoadPhase::Loading);
        debug!("loading attribute store");

        match loader().await {
            Ok(fetched) => {
                state.merge(fetched);
                state.loader = None;
                self.set_phase(LoadPhase::Loaded);
                Ok(())
            }
            Err(e) => {
                self.set_phase(previous);
                Err(e)
            }
        }
    }

    fn set_phase(&self, phase: LoadPhase) {
        self.phase.store(phase.as_u8(), Ordering::Release);
    }
}

impl std::fmt::Debug for LazyAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyAttributes")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roster_core::{RosterError, TransportError};
    use std::sync::atomic::AtomicUsize;

    fn map(pairs: &[(&str, &[&str])]) -> AttributeMap {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    fn counting_loader(calls: Arc<AtomicUsize>, values: AttributeMap) -> Loader {
        Arc::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let values = values.clone();
            async move { Ok(values) }.boxed()
        })
    }

    #[tokio::test]
    async fn test_loader_runs_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = LazyAttributes::new(counting_loader(
            calls.clone(),
            map(&[("cn", &["Alice"]), ("mail", &["a@example.org"])]),
        ));
        assert_eq!(store.phase(), LoadPhase::Unloaded);

        assert_eq!(store.first("cn").await.unwrap().as_deref(), Some("Alice"));
        assert_eq!(store.get("mail").await.unwrap().unwrap(), vec!["a@example.org"]);
        assert_eq!(store.get("missing").await.unwrap(), None);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.phase(), LoadPhase::Loaded);
    }

    #[tokio::test]
    async fn test_preloaded_names_skip_loader() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = LazyAttributes::new(counting_loader(calls.clone(), map(&[("cn", &["A"])])));

        store.merge_preloaded(map(&[("mail", &[])])).await;
        assert_eq!(store.phase(), LoadPhase::Preloaded);
        assert_eq!(store.get("mail").await.unwrap(), Some(vec![]));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // A name the preload did not cover still loads.
        assert_eq!(store.first("cn").await.unwrap().as_deref(), Some("A"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get("mail").await.unwrap(), Some(vec![]));
    }

    #[tokio::test]
    async fn test_failed_load_can_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let store = LazyAttributes::from_fn(move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(RosterError::SearchFailed {
                        host: "ldap://h1:389".into(),
                        attempts: 2,
                        last: TransportError::Closed,
                    })
                } else {
                    Ok(map(&[("cn", &["B"])]))
                }
            }
        });

        assert!(store.get("cn").await.is_err());
        assert_eq!(store.phase(), LoadPhase::Unloaded);
        assert_eq!(store.first("cn").await.unwrap().as_deref(), Some("B"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_readers_share_one_load() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = Arc::new(LazyAttributes::new(counting_loader(
            calls.clone(),
            map(&[("cn", &["C"])]),
        )));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.first("cn").await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().as_deref(), Some("C"));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_apply_modifications() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = LazyAttributes::new(counting_loader(
            calls.clone(),
            map(&[("memberUid", &["a", "b"])]),
        ));

        let after = store
            .apply(&Modification::add("memberUid", vec!["c".into()]))
            .await
            .unwrap();
        assert_eq!(after, vec!["a", "b", "c"]);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let after = store
            .apply(&Modification::replace("mail", vec!["x@example.org".into()]))
            .await
            .unwrap();
        assert_eq!(after, vec!["x@example.org"]);
        assert_eq!(store.peek("mail").await.unwrap(), vec!["x@example.org"]);
    }

    #[tokio::test]
    async fn test_names_match_case_insensitively() {
        let calls = Arc::new(AtomicUsize::new(0));
        let store = LazyAttributes::new(counting_loader(
            calls.clone(),
            map(&[("mail", &["a@example.org"]), ("cn", &["A"])]),
        ));

        store.merge_preloaded(map(&[("Mail", &["a@example.org"])])).await;
        assert_eq!(store.peek("mail").await.unwrap(), vec!["a@example.org"]);
        assert_eq!(store.get("MAIL").await.unwrap().unwrap(), vec!["a@example.org"]);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        assert_eq!(store.first("CN").await.unwrap().as_deref(), Some("A"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        // The loaded "mail" replaced the preloaded "Mail" instead of sitting beside it.
        assert_eq!(store.snapshot().await.unwrap().len(), 2);

        let after = store
            .apply(&Modification::add("MAIL", vec!["b@example.org".into()]))
            .await
            .unwrap();
        assert_eq!(after, vec!["a@example.org", "b@example.org"]);
        assert_eq!(store.snapshot().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_loaded_store_never_loads() {
        let store = LazyAttributes::loaded(map(&[("cn", &["D"])]));
        assert!(store.is_populated());
        assert_eq!(store.get("mail").await.unwrap(), None);
        assert_eq!(store.snapshot().await.unwrap().len(), 1);
    }
}
