//! Collection-parameterized data access with per-operation loading/error
//! state, mirroring the query/insert/update/delete hooks a UI consumes.
//! Every failure is captured into hook state and returned through the
//! result channel; nothing here panics past its public boundary.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::store::{SelectQuery, StoreError, TabularStore};

fn decode_rows<T: DeserializeOwned>(rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
    rows.into_iter()
        .map(serde_json::from_value)
        .collect::<Result<Vec<T>, _>>()
        .map_err(|e| StoreError { code: "decode".into(), message: format!("invalid row: {e}") })
}

struct QueryState<T> {
    data: Option<Vec<T>>,
    loading: bool,
    error: Option<StoreError>,
    last_deps: Option<Vec<Value>>,
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self { data: None, loading: false, error: None, last_deps: None }
    }
}

/// A lazily-triggered read over one collection. `run` re-executes when the
/// dependency values change; `refetch` always re-executes. Overlapping
/// fetches never interleave: each fetch takes a generation number and only
/// the holder of the current generation may publish, so the state always
/// reflects the latest triggered call once everything settles.
pub struct QueryHook<T, S> {
    store: Arc<S>,
    table: String,
    refine: Arc<dyn Fn(SelectQuery) -> SelectQuery + Send + Sync>,
    state: Arc<RwLock<QueryState<T>>>,
    generation: Arc<AtomicU64>,
}

impl<T, S> Clone for QueryHook<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            refine: Arc::clone(&self.refine),
            state: Arc::clone(&self.state),
            generation: Arc::clone(&self.generation),
        }
    }
}

impl<T, S> QueryHook<T, S>
where
    T: DeserializeOwned + Clone,
    S: TabularStore,
{
    pub fn new<F>(store: Arc<S>, table: impl Into<String>, refine: F) -> Self
    where
        F: Fn(SelectQuery) -> SelectQuery + Send + Sync + 'static,
    {
        Self {
            store,
            table: table.into(),
            refine: Arc::new(refine),
            state: Arc::new(RwLock::new(QueryState::default())),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Runs the query if it has never run or if `dependencies` differ from
    /// the last observed set.
    pub async fn run(&self, dependencies: &[Value]) {
        let stale = {
            let state = self.state.read();
            state.last_deps.as_deref() != Some(dependencies)
        };
        if stale {
            self.fetch(Some(dependencies.to_vec())).await;
        }
    }

    pub async fn refetch(&self) {
        self.fetch(None).await;
    }

    /// Drops interest in any in-flight fetch; a late completion becomes a
    /// no-op instead of a write nobody observes.
    pub fn detach(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    async fn fetch(&self, deps: Option<Vec<Value>>) {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut state = self.state.write();
            state.loading = true;
            state.error = None;
            if let Some(deps) = deps {
                state.last_deps = Some(deps);
            }
        }

        let query = (self.refine)(SelectQuery::default());
        let result = self.store.select(&self.table, query).await;

        // a newer fetch (or detach) owns the state now
        if self.generation.load(Ordering::SeqCst) != generation {
            info!("discarding stale fetch for '{}'", self.table);
            return;
        }

        let mut state = self.state.write();
        match result.and_then(decode_rows::<T>) {
            Ok(rows) => state.data = Some(rows),
            Err(err) => {
                error!("query on '{}' failed: {}", self.table, err);
                state.error = Some(err);
            }
        }
        state.loading = false;
    }

    pub fn data(&self) -> Option<Vec<T>> {
        self.state.read().data.clone()
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state.read().error.clone()
    }
}

#[derive(Default)]
struct MutationState {
    loading: bool,
    error: Option<StoreError>,
}

impl MutationState {
    fn begin(state: &RwLock<MutationState>) {
        let mut state = state.write();
        state.loading = true;
        state.error = None;
    }

    fn finish(state: &RwLock<MutationState>, error: Option<StoreError>) {
        let mut state = state.write();
        state.error = error;
        state.loading = false;
    }
}

/// Insert into one collection. Success resolves to the created record(s)
/// with the store-assigned `id`/`created_at`; failure resolves to `None`
/// with the store's error captured in hook state.
pub struct InsertHook<T, S> {
    store: Arc<S>,
    table: String,
    state: Arc<RwLock<MutationState>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Clone for InsertHook<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            state: Arc::clone(&self.state),
            _marker: PhantomData,
        }
    }
}

impl<T, S> InsertHook<T, S>
where
    T: DeserializeOwned,
    S: TabularStore,
{
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self { store, table: table.into(), state: Arc::default(), _marker: PhantomData }
    }

    pub async fn insert<C: Serialize>(&self, rows: &[C]) -> Option<Vec<T>> {
        MutationState::begin(&self.state);
        let result = self.try_insert(rows).await;
        match result {
            Ok(created) => {
                MutationState::finish(&self.state, None);
                Some(created)
            }
            Err(err) => {
                error!("insert into '{}' failed: {}", self.table, err);
                MutationState::finish(&self.state, Some(err));
                None
            }
        }
    }

    pub async fn insert_one<C: Serialize>(&self, row: &C) -> Option<Vec<T>> {
        self.insert(std::slice::from_ref(row)).await
    }

    async fn try_insert<C: Serialize>(&self, rows: &[C]) -> Result<Vec<T>, StoreError> {
        let payload = rows
            .iter()
            .map(serde_json::to_value)
            .collect::<Result<Vec<Value>, _>>()
            .map_err(|e| StoreError { code: "encode".into(), message: e.to_string() })?;
        let created = self.store.insert(&self.table, payload).await?;
        decode_rows(created)
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state.read().error.clone()
    }
}

/// Update by id with a partial payload. A nonexistent id surfaces however
/// the store reports it (here: an empty updated set), not a local taxonomy.
pub struct UpdateHook<T, S> {
    store: Arc<S>,
    table: String,
    state: Arc<RwLock<MutationState>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T, S> Clone for UpdateHook<T, S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            table: self.table.clone(),
            state: Arc::clone(&self.state),
            _marker: PhantomData,
        }
    }
}

impl<T, S> UpdateHook<T, S>
where
    T: DeserializeOwned,
    S: TabularStore,
{
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self { store, table: table.into(), state: Arc::default(), _marker: PhantomData }
    }

    pub async fn update<U: Serialize>(&self, id: &str, patch: &U) -> Option<Vec<T>> {
        MutationState::begin(&self.state);
        let result = self.try_update(id, patch).await;
        match result {
            Ok(updated) => {
                MutationState::finish(&self.state, None);
                Some(updated)
            }
            Err(err) => {
                error!("update of '{}' id={} failed: {}", self.table, id, err);
                MutationState::finish(&self.state, Some(err));
                None
            }
        }
    }

    async fn try_update<U: Serialize>(&self, id: &str, patch: &U) -> Result<Vec<T>, StoreError> {
        let patch = serde_json::to_value(patch)
            .map_err(|e| StoreError { code: "encode".into(), message: e.to_string() })?;
        let updated = self.store.update(&self.table, id, patch).await?;
        decode_rows(updated)
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state.read().error.clone()
    }
}

/// Delete by id, resolving to a success flag. Deleting an id that matches
/// no row resolves to `false` with a `not_found` error recorded.
pub struct DeleteHook<S> {
    store: Arc<S>,
    table: String,
    state: Arc<RwLock<MutationState>>,
}

impl<S> Clone for DeleteHook<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), table: self.table.clone(), state: Arc::clone(&self.state) }
    }
}

impl<S: TabularStore> DeleteHook<S> {
    pub fn new(store: Arc<S>, table: impl Into<String>) -> Self {
        Self { store, table: table.into(), state: Arc::default() }
    }

    pub async fn remove(&self, id: &str) -> bool {
        MutationState::begin(&self.state);
        match self.store.delete(&self.table, id).await {
            Ok(0) => {
                let err = StoreError::not_found(format!("no row in '{}' with id {}", self.table, id));
                MutationState::finish(&self.state, Some(err));
                false
            }
            Ok(_) => {
                MutationState::finish(&self.state, None);
                true
            }
            Err(err) => {
                error!("delete from '{}' id={} failed: {}", self.table, id, err);
                MutationState::finish(&self.state, Some(err));
                false
            }
        }
    }

    pub fn loading(&self) -> bool {
        self.state.read().loading
    }

    pub fn error(&self) -> Option<StoreError> {
        self.state.read().error.clone()
    }
}
