//! Task name interning.
//!
//! Maps caller-facing task names to the dense `TaskId`s the scheduler works on.

use rustc_hash::FxHashMap;

use crate::dag::{DagError, TaskId};

/// Bidirectional map between task names and dense ids, in insertion order.
#[derive(Debug, Clone)]
pub struct TaskNameInterner {
    to_id: FxHashMap<String, TaskId>,
    names: Vec<String>,
}

impl TaskNameInterner {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            to_id: FxHashMap::with_capacity_and_hasher(capacity, Default::default()),
            names: Vec::with_capacity(capacity),
        }
    }

    /// Intern `name`, returning the existing id if already known.
    pub fn intern(&mut self, name: &str) -> TaskId {
        if let Some(&id) = self.to_id.get(name) {
            return id;
        }
        let id = self.names.len() as TaskId;
        self.names.push(name.to_string());
        self.to_id.insert(name.to_string(), id);
        id
    }

    /// Intern a name that must not be known yet.
    pub fn intern_unique(&mut self, name: &str) -> Result<TaskId, DagError> {
        if self.to_id.contains_key(name) {
            return Err(DagError::DuplicateTask(name.to_string()));
        }
        Ok(self.intern(name))
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<TaskId> {
        self.to_id.get(name).copied()
    }

    /// Id of a name that must already be interned.
    pub fn lookup(&self, name: &str) -> Result<TaskId, DagError> {
        self.get(name)
            .ok_or_else(|| DagError::UnknownTaskName(name.to_string()))
    }

    #[inline]
    pub fn resolve(&self, id: TaskId) -> Option<&str> {
        self.names.get(id as usize).map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl Default for TaskNameInterner {
    fn default() -> Self {
        Self::with_capacity(0)
    }
}
