//! Generic list view: one remote collection, its client-side projection,
//! row actions, batch jobs and transient banners.
//!
//! All methods that start remote work spawn tokio tasks and must be called
//! from within a runtime. State sits behind a std mutex that is never held
//! across an await point.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
};

use serde_json::Value;
use shared::domain::{BannerKind, QueryParams, Row, RowKey};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{
    banner::{banner_ttl, Banner, BannerBoard},
    binding::ViewBinding,
    error::{ControllerError, FetchError},
    projection,
    transport::{ActionRequest, HttpMethod, ListTransport},
};

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Loading,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    LifecycleChanged(Lifecycle),
    RowsReplaced {
        count: usize,
    },
    QueryChanged,
    RowPatched {
        row_key: RowKey,
    },
    ActionFinished {
        row_key: RowKey,
        action: String,
        succeeded: bool,
    },
    BatchFinished {
        name: String,
        succeeded: bool,
    },
    BannerRaised(Banner),
    BannerCleared(BannerKind),
}

#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    pub lifecycle: Lifecycle,
    pub params: QueryParams,
    pub row_count: usize,
    pub error: Option<Banner>,
    pub success: Option<Banner>,
    pub pending_actions: Vec<(RowKey, String)>,
    pub running_batch: Option<String>,
}

struct ViewState {
    params: QueryParams,
    rows: Vec<Arc<Row>>,
    lifecycle: Lifecycle,
    generation: u64,
    inflight_load: Option<JoinHandle<()>>,
    pending_actions: HashMap<(RowKey, String), Option<JoinHandle<()>>>,
    running_batch: Option<(String, Option<JoinHandle<()>>)>,
    banners: BannerBoard,
    shut_down: bool,
}

pub struct ListViewController {
    self_ref: Weak<Self>,
    binding: ViewBinding,
    transport: Arc<dyn ListTransport>,
    state: Mutex<ViewState>,
    events: broadcast::Sender<ViewEvent>,
}

impl ListViewController {
    pub fn new(binding: ViewBinding, transport: Arc<dyn ListTransport>) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let params = binding.default_params.clone();
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            binding,
            transport,
            state: Mutex::new(ViewState {
                params,
                rows: Vec::new(),
                lifecycle: Lifecycle::Idle,
                generation: 0,
                inflight_load: None,
                pending_actions: HashMap::new(),
                running_batch: None,
                banners: BannerBoard::default(),
                shut_down: false,
            }),
            events,
        })
    }

    pub fn binding(&self) -> &ViewBinding {
        &self.binding
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewEvent> {
        self.events.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, ViewState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn emit(&self, event: ViewEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Stores `params` and fetches the collection, superseding any fetch
    /// still in flight. The lifecycle is `Loading` when this returns.
    pub fn load(self: &Arc<Self>, params: QueryParams) -> Result<(), ControllerError> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(ControllerError::ShutDown);
        }
        state.params = params;
        self.start_fetch(&mut state);
        Ok(())
    }

    pub fn reload(self: &Arc<Self>) -> Result<(), ControllerError> {
        let params = self.params();
        self.load(params)
    }

    fn start_fetch(self: &Arc<Self>, state: &mut ViewState) {
        if let Some(previous) = state.inflight_load.take() {
            debug!(screen = %self.binding.name, "list: superseding in-flight fetch");
            previous.abort();
        }
        state.generation += 1;
        let generation = state.generation;
        state.lifecycle = Lifecycle::Loading;
        self.emit(ViewEvent::LifecycleChanged(Lifecycle::Loading));

        let request = self.binding.collection_request(&state.params);
        info!(
            screen = %self.binding.name,
            path = %request.path,
            generation,
            "list: fetch started"
        );
        let controller = Arc::clone(self);
        state.inflight_load = Some(tokio::spawn(async move {
            let result = controller.transport.fetch_collection(&request).await;
            controller.commit_fetch(generation, result);
        }));
    }

    fn commit_fetch(&self, generation: u64, result: Result<Vec<Row>, FetchError>) {
        let mut state = self.lock_state();
        if state.shut_down || state.generation != generation {
            debug!(
                screen = %self.binding.name,
                generation,
                "list: discarding superseded fetch result"
            );
            return;
        }
        match result {
            Ok(rows) => {
                state.inflight_load = None;
                state.rows = self.keyed_rows(rows);
                state.lifecycle = Lifecycle::Succeeded;
                let count = state.rows.len();
                info!(screen = %self.binding.name, count, "list: fetch committed");
                self.emit(ViewEvent::RowsReplaced { count });
                self.emit(ViewEvent::LifecycleChanged(Lifecycle::Succeeded));
            }
            Err(FetchError::Cancelled) => {
                // Lifecycle stays `Loading` until the next `load`.
                state.inflight_load = None;
                debug!(screen = %self.binding.name, "list: fetch cancelled, awaiting next load");
            }
            Err(err) => {
                state.inflight_load = None;
                warn!(screen = %self.binding.name, error = %err, "list: fetch failed");
                state.lifecycle = Lifecycle::Failed;
                self.emit(ViewEvent::LifecycleChanged(Lifecycle::Failed));
                self.raise_banner(&mut state, BannerKind::Error, err.describe("Request failed"));
            }
        }
    }

    fn keyed_rows(&self, rows: Vec<Row>) -> Vec<Arc<Row>> {
        let key_field = &self.binding.key_field;
        rows.into_iter()
            .filter(|row| {
                let keyed = row.key(key_field).is_some();
                if !keyed {
                    warn!(
                        screen = %self.binding.name,
                        key_field = %key_field,
                        "list: dropping row without key"
                    );
                }
                keyed
            })
            .map(Arc::new)
            .collect()
    }

    /// Refetches only when a server-side filter changed; search, sort and
    /// local filters take effect on the next `visible_rows` call.
    pub fn set_query_params(self: &Arc<Self>, params: QueryParams) -> Result<(), ControllerError> {
        let mut state = self.lock_state();
        if state.shut_down {
            return Err(ControllerError::ShutDown);
        }
        let refetch = self.binding.server_query(&state.params) != self.binding.server_query(&params);
        state.params = params;
        self.emit(ViewEvent::QueryChanged);
        if refetch {
            self.start_fetch(&mut state);
        }
        Ok(())
    }

    pub fn params(&self) -> QueryParams {
        self.lock_state().params.clone()
    }

    pub fn visible_rows(&self) -> Vec<Arc<Row>> {
        let state = self.lock_state();
        projection::visible_rows(&self.binding, &state.rows, &state.params)
    }

    /// Every loaded row in fetch order, ignoring the query.
    pub fn rows(&self) -> Vec<Arc<Row>> {
        self.lock_state().rows.clone()
    }

    pub fn row(&self, row_key: &RowKey) -> Option<Arc<Row>> {
        let key_field = &self.binding.key_field;
        self.lock_state()
            .rows
            .iter()
            .find(|row| row.key(key_field).as_ref() == Some(row_key))
            .cloned()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lock_state().lifecycle
    }

    pub fn banner(&self, kind: BannerKind) -> Option<Banner> {
        self.lock_state().banners.get(kind).cloned()
    }

    pub fn is_pending(&self, row_key: &RowKey) -> bool {
        self.lock_state()
            .pending_actions
            .keys()
            .any(|(key, _)| key == row_key)
    }

    pub fn snapshot(&self) -> ViewSnapshot {
        let state = self.lock_state();
        let mut pending_actions: Vec<_> = state.pending_actions.keys().cloned().collect();
        pending_actions.sort();
        ViewSnapshot {
            lifecycle: state.lifecycle,
            params: state.params.clone(),
            row_count: state.rows.len(),
            error: state.banners.get(BannerKind::Error).cloned(),
            success: state.banners.get(BannerKind::Success).cloned(),
            pending_actions,
            running_batch: state.running_batch.as_ref().map(|(name, _)| name.clone()),
        }
    }

    /// Runs a row action. Pending state is tracked per (row, action) so
    /// different rows proceed independently.
    pub fn perform_action(
        self: &Arc<Self>,
        row_key: impl Into<RowKey>,
        action_name: &str,
        payload: Value,
    ) -> Result<(), ControllerError> {
        let row_key = row_key.into();
        let action = self
            .binding
            .find_action(action_name)
            .ok_or_else(|| ControllerError::UnknownAction(action_name.to_string()))?;

        let mut state = self.lock_state();
        if state.shut_down {
            return Err(ControllerError::ShutDown);
        }
        let pending_key = (row_key.clone(), action.name.clone());
        if state.pending_actions.contains_key(&pending_key) {
            return Err(ControllerError::ActionPending {
                row_key,
                action: action.name.clone(),
            });
        }
        state.pending_actions.insert(pending_key.clone(), None);

        let request = action.request(&row_key, &payload);
        info!(
            screen = %self.binding.name,
            row_key = %row_key,
            action = %action.name,
            "action: started"
        );
        let controller = Arc::clone(self);
        let action_name = action.name.clone();
        let task = tokio::spawn(async move {
            let result = controller.transport.invoke(&request).await;
            controller.commit_action(row_key, &action_name, result);
        });
        if let Some(slot) = state.pending_actions.get_mut(&pending_key) {
            *slot = Some(task);
        }
        Ok(())
    }

    fn commit_action(&self, row_key: RowKey, action_name: &str, result: Result<Value, FetchError>) {
        let mut state = self.lock_state();
        if state.shut_down {
            return;
        }
        state
            .pending_actions
            .remove(&(row_key.clone(), action_name.to_string()));
        let Some(action) = self.binding.find_action(action_name) else {
            return;
        };

        let succeeded = match result {
            Ok(response) => {
                let patch = action.patch_for(&response);
                let key_field = &self.binding.key_field;
                match state
                    .rows
                    .iter()
                    .position(|row| row.key(key_field).as_ref() == Some(&row_key))
                {
                    Some(index) if !patch.is_empty() => {
                        let updated = state.rows[index].patched(&patch);
                        state.rows[index] = Arc::new(updated);
                        self.emit(ViewEvent::RowPatched {
                            row_key: row_key.clone(),
                        });
                    }
                    Some(_) => {}
                    None => debug!(
                        screen = %self.binding.name,
                        row_key = %row_key,
                        "action: row no longer loaded, patch skipped"
                    ),
                }
                info!(
                    screen = %self.binding.name,
                    row_key = %row_key,
                    action = %action.name,
                    "action: succeeded"
                );
                let message = (action.success_message)(&row_key, &response);
                self.raise_banner(&mut state, BannerKind::Success, message);
                true
            }
            Err(FetchError::Cancelled) => false,
            Err(err) => {
                warn!(
                    screen = %self.binding.name,
                    row_key = %row_key,
                    action = %action.name,
                    error = %err,
                    "action: failed"
                );
                let prefix = format!("{} failed for {}", action.label, row_key);
                self.raise_banner(&mut state, BannerKind::Error, err.describe(&prefix));
                false
            }
        };
        self.emit(ViewEvent::ActionFinished {
            row_key,
            action: action_name.to_string(),
            succeeded,
        });
    }

    /// Runs a collection-level job, then reloads the list on success.
    pub fn run_batch(self: &Arc<Self>, name: &str) -> Result<(), ControllerError> {
        let batch = self
            .binding
            .find_batch(name)
            .ok_or_else(|| ControllerError::UnknownBatch(name.to_string()))?;

        let mut state = self.lock_state();
        if state.shut_down {
            return Err(ControllerError::ShutDown);
        }
        if let Some((running, _)) = &state.running_batch {
            return Err(ControllerError::BatchRunning(running.clone()));
        }
        state.running_batch = Some((batch.name.clone(), None));

        let request = ActionRequest {
            method: HttpMethod::Get,
            path: batch.path.clone(),
            segment: None,
            query: Vec::new(),
            body: None,
        };
        info!(screen = %self.binding.name, batch = %batch.name, "batch: started");
        let controller = Arc::clone(self);
        let batch_name = batch.name.clone();
        let task = tokio::spawn(async move {
            let result = controller.transport.invoke(&request).await;
            controller.commit_batch(&batch_name, result);
        });
        if let Some((_, slot)) = state.running_batch.as_mut() {
            *slot = Some(task);
        }
        Ok(())
    }

    fn commit_batch(self: &Arc<Self>, name: &str, result: Result<Value, FetchError>) {
        let reload = {
            let mut state = self.lock_state();
            if state.shut_down {
                return;
            }
            state.running_batch = None;
            let Some(batch) = self.binding.find_batch(name) else {
                return;
            };
            let succeeded = match result {
                Ok(_) => {
                    info!(screen = %self.binding.name, batch = %name, "batch: completed");
                    self.raise_banner(&mut state, BannerKind::Success, batch.success_message.clone());
                    true
                }
                Err(FetchError::Cancelled) => false,
                Err(err) => {
                    warn!(screen = %self.binding.name, batch = %name, error = %err, "batch: failed");
                    let prefix = format!("{} failed", batch.label);
                    self.raise_banner(&mut state, BannerKind::Error, err.describe(&prefix));
                    false
                }
            };
            self.emit(ViewEvent::BatchFinished {
                name: name.to_string(),
                succeeded,
            });
            succeeded
        };
        if reload {
            // Only fails after shutdown, which was checked above.
            let _ = self.reload();
        }
    }

    fn raise_banner(&self, state: &mut ViewState, kind: BannerKind, message: String) {
        let banner = Banner::new(kind, message);
        let generation = state.banners.raise(banner.clone());
        self.emit(ViewEvent::BannerRaised(banner));

        let ttl = banner_ttl(kind);
        let weak = self.self_ref.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(controller) = weak.upgrade() {
                controller.expire_banner(kind, generation);
            }
        });
        state.banners.attach_timer(kind, generation, timer);
    }

    fn expire_banner(&self, kind: BannerKind, generation: u64) {
        let mut state = self.lock_state();
        if state.banners.expire(kind, generation) {
            debug!(screen = %self.binding.name, %kind, "banner: auto-dismissed");
            self.emit(ViewEvent::BannerCleared(kind));
        }
    }

    /// Clears the banner of `kind` and its timer; nothing happens when no
    /// banner of that kind is shown.
    pub fn dismiss_banner(&self, kind: BannerKind) {
        let mut state = self.lock_state();
        if state.banners.dismiss(kind) {
            self.emit(ViewEvent::BannerCleared(kind));
        }
    }

    /// Teardown: cancels every in-flight request and banner timer. No state
    /// changes afterwards, even if a transport call still resolves.
    pub fn shutdown(&self) {
        let mut state = self.lock_state();
        if state.shut_down {
            return;
        }
        state.shut_down = true;
        state.generation += 1;
        if let Some(task) = state.inflight_load.take() {
            task.abort();
        }
        for task in state.pending_actions.drain().filter_map(|(_, task)| task) {
            task.abort();
        }
        if let Some((_, Some(task))) = state.running_batch.take() {
            task.abort();
        }
        state.banners.clear_all();
        info!(screen = %self.binding.name, "list: shut down");
    }

    pub fn is_shut_down(&self) -> bool {
        self.lock_state().shut_down
    }
}

#[cfg(test)]
#[path = "tests/controller_tests.rs"]
mod tests;
