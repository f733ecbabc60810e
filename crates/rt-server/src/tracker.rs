//! Model Tracker (C9, spec §4.9): the in-memory registry of every loaded
//! model plus which one is active.
//!
//! Grounded on the teacher's `AppStateInner` (a mutex-guarded struct holding
//! whatever is currently loaded) in `main.rs`, generalized from "one worker
//! process per module" to an ordered multi-model map with deterministic
//! `model-<n>` ids.

use rt_core::{Accelerator, Engine, ModelState, Recipe};
use std::collections::BTreeMap;
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct LoadedModel {
    pub model_id: String,
    pub source: String,
    pub engine: Engine,
    pub accelerator: Accelerator,
    pub recipe: Recipe,
    /// `Loading` on insert; the handler moves it to `Ready` once the adapter
    /// handle exists, and to `Failed` on a fatal generation error or a
    /// cancelled timeout (spec §3 state machine).
    pub state: ModelState,
}

/// `model_id -> LoadedModel`, insertion-ordered so `list()` is stable across
/// calls (spec §4.9: "list order is insertion order, not hash order").
pub struct ModelTracker {
    inner: Mutex<TrackerState>,
}

struct TrackerState {
    models: BTreeMap<String, LoadedModel>,
    order: Vec<String>,
    active_model_id: Option<String>,
    next_id: u64,
}

impl Default for ModelTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelTracker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TrackerState {
                models: BTreeMap::new(),
                order: Vec::new(),
                active_model_id: None,
                next_id: 1,
            }),
        }
    }

    /// Assigns `model-<n>` deterministically (lowest unused `n`) unless the
    /// caller supplied an explicit id. The newly inserted model becomes
    /// active unless another model already is, matching the "first load
    /// wins active slot" rule (spec §4.9).
    pub fn insert(&self, explicit_id: Option<String>, source: String, engine: Engine, accelerator: Accelerator, recipe: Recipe) -> String {
        let mut state = self.inner.lock().unwrap();
        let model_id = explicit_id.unwrap_or_else(|| {
            let id = format!("model-{}", state.next_id);
            state.next_id += 1;
            id
        });
        state.order.retain(|id| id != &model_id);
        state.order.push(model_id.clone());
        state.models.insert(
            model_id.clone(),
            LoadedModel { model_id: model_id.clone(), source, engine, accelerator, recipe, state: ModelState::Loading },
        );
        if state.active_model_id.is_none() {
            state.active_model_id = Some(model_id.clone());
        }
        model_id
    }

    /// Transitions a tracked model's lifecycle state; a no-op (returns
    /// `false`) if the model has already been removed.
    pub fn set_state(&self, model_id: &str, new_state: ModelState) -> bool {
        let mut state = self.inner.lock().unwrap();
        match state.models.get_mut(model_id) {
            Some(m) => {
                m.state = new_state;
                true
            }
            None => false,
        }
    }

    /// Idempotent. Clears the active slot if it pointed at the removed
    /// model, leaving no active model until the caller selects one.
    pub fn remove(&self, model_id: &str) -> Option<LoadedModel> {
        let mut state = self.inner.lock().unwrap();
        state.order.retain(|id| id != model_id);
        let removed = state.models.remove(model_id);
        if state.active_model_id.as_deref() == Some(model_id) {
            state.active_model_id = None;
        }
        removed
    }

    pub fn set_active(&self, model_id: &str) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.models.contains_key(model_id) {
            state.active_model_id = Some(model_id.to_string());
            true
        } else {
            false
        }
    }

    pub fn get_active(&self) -> Option<LoadedModel> {
        let state = self.inner.lock().unwrap();
        state.active_model_id.as_ref().and_then(|id| state.models.get(id)).cloned()
    }

    pub fn get(&self, model_id: &str) -> Option<LoadedModel> {
        self.inner.lock().unwrap().models.get(model_id).cloned()
    }

    /// Insertion-ordered snapshot, each flagged with whether it's the active
    /// model.
    pub fn list(&self) -> Vec<(LoadedModel, bool)> {
        let state = self.inner.lock().unwrap();
        state
            .order
            .iter()
            .filter_map(|id| state.models.get(id).map(|m| (m.clone(), state.active_model_id.as_deref() == Some(id.as_str()))))
            .collect()
    }

    pub fn count_by_engine(&self, engine: Engine) -> usize {
        self.inner.lock().unwrap().models.values().filter(|m| m.engine == engine).count()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().unwrap().models.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rt_core::{Scalar, SpeedTier};
    use std::collections::HashMap as StdHashMap;

    fn recipe() -> Recipe {
        Recipe { engine: Engine::LlamaCpp, accelerator: Accelerator::Cpu, context_size: 4096, batch_size: 512, threads: None, extra: StdHashMap::<String, Scalar>::new() }
    }

    #[test]
    fn auto_assigned_ids_are_sequential_and_unique() {
        let tracker = ModelTracker::new();
        let a = tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        let b = tracker.insert(None, "b".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        assert_eq!(a, "model-1");
        assert_eq!(b, "model-2");
    }

    #[test]
    fn first_load_becomes_active_automatically() {
        let tracker = ModelTracker::new();
        let id = tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        assert_eq!(tracker.get_active().unwrap().model_id, id);
    }

    #[test]
    fn removing_active_model_clears_active_slot() {
        let tracker = ModelTracker::new();
        let id = tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        tracker.remove(&id);
        assert!(tracker.get_active().is_none());
        assert!(tracker.is_empty());
    }

    #[test]
    fn list_preserves_insertion_order() {
        let tracker = ModelTracker::new();
        let a = tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        let b = tracker.insert(None, "b".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        let ids: Vec<_> = tracker.list().into_iter().map(|(m, _)| m.model_id).collect();
        assert_eq!(ids, vec![a, b]);
    }

    #[test]
    fn set_active_rejects_unknown_model() {
        let tracker = ModelTracker::new();
        tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        assert!(!tracker.set_active("model-99"));
    }

    #[test]
    fn new_models_start_loading_and_can_transition() {
        let tracker = ModelTracker::new();
        let id = tracker.insert(None, "a".into(), Engine::LlamaCpp, Accelerator::Cpu, recipe());
        assert_eq!(tracker.get(&id).unwrap().state, ModelState::Loading);
        assert!(tracker.set_state(&id, ModelState::Ready));
        assert_eq!(tracker.get(&id).unwrap().state, ModelState::Ready);
        assert!(tracker.set_state(&id, ModelState::Failed));
        assert_eq!(tracker.get(&id).unwrap().state, ModelState::Failed);
    }

    #[test]
    fn set_state_on_removed_model_is_a_no_op() {
        let tracker = ModelTracker::new();
        assert!(!tracker.set_state("model-99", ModelState::Failed));
    }
}
