// Workflow session - the branch tree of workflow instances for one editing session

//! # Workflow Sessions
//!
//! A `WorkflowSession` is the operation surface the transport layer talks to.
//! It owns every `WorkflowInstance` of one editing session in an arena keyed
//! by `InstanceId`, plus the one `TempIdAllocator` they all draw from.
//!
//! ## Branch Tree
//!
//! ```text
//!   root: new-relation ──FirstRole──▶ role ──Player──▶ new-physical-object
//!                      └─SecondRole─▶ role
//! ```
//!
//! - `root` is the workflow the session was initialized with
//! - `current` points at the instance the user is working in
//! - `stack` (root → current) is derived on demand by walking parent links
//!
//! Branching creates a child for one field of the current instance, or
//! resumes the child that already exists for that field. Popping moves
//! `current` back to the parent but keeps the child in the arena, so the
//! user's partial progress survives until the same field is branched again.
//!
//! ## Completing a Branch
//!
//! When a child enters a state with an `End` entry action the session
//! validates and finalizes it, copies its bound field back into the parent's
//! linked field, and pops to the parent. A child failing validation stays
//! current and the error is returned to the caller; once its fields are
//! filled in, `validate_workflow` completes the branch.
//!
//! A completed child is never re-entered. Branching again for its field
//! leaves `current` on the parent.
//!
//! Only the root commits facts to the outside world: `finalize_workflow`
//! returns the root's facts followed by those of every completed descendant.

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::instance::{FiredAction, InstanceId, Linkage, WorkflowInstance, WorkflowStatus};
use super::registry::WorkflowRegistry;
use super::temp_id::TempIdAllocator;
use crate::models::{
    Context, ContextEntry, ContextUpdate, EntryAction, EventId, Fact, HistoryEvent, StateRef,
    StepSpec, Uid,
};
use crate::{ModellingError, Result};

/// What the UI needs to render the current step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDescriptor {
    pub instance_id: InstanceId,
    pub workflow_id: String,
    pub state: StateRef,
    pub status: WorkflowStatus,
    /// Spec of the innermost active state that has one
    pub step: Option<StepSpec>,
    pub events: Vec<EventId>,
    pub is_final: bool,
    pub can_go_back: bool,
}

/// Full read model of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    /// Instance ids from root to current
    pub stack: Vec<InstanceId>,
    /// `[child, parent]` pairs, in creation order
    pub tree: Vec<(InstanceId, InstanceId)>,
    /// Current step, if a workflow is active
    pub workflow: Option<StepDescriptor>,
    /// Context of the current instance
    pub context: Option<Context>,
    /// Root facts followed by the committed facts of completed descendants
    pub facts: Vec<Fact>,
}

/// All workflow instances of one editing session
#[derive(Debug)]
pub struct WorkflowSession {
    registry: Arc<WorkflowRegistry>,
    ids: TempIdAllocator,
    instances: IndexMap<InstanceId, WorkflowInstance>,
    root: Option<InstanceId>,
    current: Option<InstanceId>,
}

impl WorkflowSession {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        WorkflowSession {
            registry,
            ids: TempIdAllocator::new(),
            instances: IndexMap::new(),
            root: None,
            current: None,
        }
    }

    pub fn registry(&self) -> &WorkflowRegistry {
        &self.registry
    }

    pub fn root_id(&self) -> Option<InstanceId> {
        self.root
    }

    pub fn current_id(&self) -> Option<InstanceId> {
        self.current
    }

    pub fn instance(&self, id: InstanceId) -> Option<&WorkflowInstance> {
        self.instances.get(&id)
    }

    /// Transition history of the current instance
    pub fn history(&self) -> Vec<HistoryEvent> {
        self.current_instance()
            .map(|i| i.history().to_vec())
            .unwrap_or_default()
    }

    /// Start a new editing session on `workflow_id`
    ///
    /// Every instance of the previous session is discarded and the provisional
    /// uid sequence restarts.
    pub fn init_workflow(&mut self, workflow_id: &str) -> Result<StepDescriptor> {
        let definition = self.registry.require(workflow_id)?;

        self.instances.clear();
        self.ids.reset();
        self.root = None;
        self.current = None;

        let mut instance = WorkflowInstance::new(definition)?;
        let fired = instance.start(None, &mut self.ids)?;
        let id = instance.id();
        self.instances.insert(id, instance);
        self.root = Some(id);
        self.current = Some(id);

        info!(workflow = workflow_id, instance = %id, "🚀 Initialized workflow session");
        self.handle_entry_actions(id, fired)?;
        self.current_descriptor()
    }

    /// Branch from the current instance into `workflow_id` for `field_id`
    pub fn branch_workflow(&mut self, field_id: &str, workflow_id: &str) -> Result<StepDescriptor> {
        let parent = self.require_current()?;
        self.branch_from(parent, field_id, workflow_id)?;
        self.current_descriptor()
    }

    /// `NEXT` on the current instance
    pub fn increment_workflow_step(&mut self) -> Result<StepDescriptor> {
        self.send_event(&EventId::next())
    }

    /// Step the current instance back one configuration
    pub fn decrement_workflow_step(&mut self) -> Result<StepDescriptor> {
        let id = self.require_current()?;
        let moved = self.instance_mut(id)?.prev()?;
        if !moved {
            debug!(instance = %id, "nothing to step back to");
        }
        self.current_descriptor()
    }

    /// Send any event to the current instance, e.g. a branching choice
    pub fn send_event(&mut self, event: &EventId) -> Result<StepDescriptor> {
        let id = self.require_current()?;
        let fired = self.instance_mut(id)?.send(event)?;
        self.handle_entry_actions(id, fired)?;
        self.current_descriptor()
    }

    /// Validate the current instance
    ///
    /// A child left in its `End` state by a failed completion is completed now.
    pub fn validate_workflow(&mut self) -> Result<()> {
        let id = self.require_current()?;
        let instance = self.instance_mut(id)?;
        if instance.parent.is_some() && instance.ends_branch() {
            return self.complete_branch(id);
        }
        instance.validate()
    }

    /// Finalize the root and return every fact of the session
    pub fn finalize_workflow(&mut self) -> Result<Vec<Fact>> {
        let root = self
            .root
            .ok_or_else(|| ModellingError::InvalidState("no workflow initialized".to_string()))?;
        self.instance_mut(root)?.finalize()?;
        let facts = self.session_facts();
        info!(instance = %root, facts = facts.len(), "🏁 Finalized workflow session");
        Ok(facts)
    }

    /// Put a finalized root back to `PENDING` so `finalize_workflow` can run again
    ///
    /// No-op when the session was re-initialized since `root` was finalized.
    pub fn reopen_root(&mut self, root: InstanceId) -> Result<()> {
        if self.root != Some(root) {
            debug!(instance = %root, "finalized root was replaced; nothing to reopen");
            return Ok(());
        }
        self.instance_mut(root)?.reopen()?;
        warn!(instance = %root, "↩️  Reopened finalized workflow");
        Ok(())
    }

    /// Return to the parent of the current instance
    ///
    /// The child stays reachable through the parent's `children`.
    pub fn pop_workflow(&mut self) -> Result<()> {
        let id = self.require_current()?;
        let parent = self.instance_mut(id)?.parent.ok_or_else(|| {
            ModellingError::InvalidState("the root workflow has no parent to return to".to_string())
        })?;
        self.current = Some(parent);
        info!(from = %id, to = %parent, "⬅️  Popped workflow");
        Ok(())
    }

    /// Free-text fill of a field of the current instance
    ///
    /// A key the context has never seen gets a fresh provisional uid.
    pub fn set_workflow_value(&mut self, key: &str, value: &str) -> Result<ContextEntry> {
        let id = self.require_current()?;
        let fresh = !self.instance_mut(id)?.context().contains(key);
        let update = if fresh {
            ContextUpdate::both(self.ids.next()?, value)
        } else {
            ContextUpdate::value(value)
        };
        Ok(self.instance_mut(id)?.set_context(key, update).clone())
    }

    /// Knowledge-graph fill of a field of the current instance
    pub fn set_workflow_kg_value(&mut self, key: &str, uid: Uid, value: &str) -> Result<ContextEntry> {
        let id = self.require_current()?;
        Ok(self
            .instance_mut(id)?
            .set_context(key, ContextUpdate::both(uid, value))
            .clone())
    }

    pub fn get_state(&self) -> SessionSnapshot {
        let current = self.current_instance();
        SessionSnapshot {
            stack: self.stack(),
            tree: self
                .instances
                .values()
                .filter_map(|i| i.parent.map(|p| (i.id(), p)))
                .collect(),
            workflow: current.map(|i| self.describe(i)),
            context: current.map(|i| i.context().clone()),
            facts: self.session_facts(),
        }
    }

    /// Instance ids from root to current
    pub fn stack(&self) -> Vec<InstanceId> {
        let mut stack = Vec::new();
        let mut cursor = self.current;
        while let Some(id) = cursor {
            stack.push(id);
            cursor = self.instances.get(&id).and_then(|i| i.parent);
        }
        stack.reverse();
        stack
    }

    fn current_instance(&self) -> Option<&WorkflowInstance> {
        self.current.and_then(|id| self.instances.get(&id))
    }

    fn current_descriptor(&self) -> Result<StepDescriptor> {
        self.current_instance()
            .map(|i| self.describe(i))
            .ok_or_else(|| ModellingError::InvalidState("no active workflow".to_string()))
    }

    fn describe(&self, instance: &WorkflowInstance) -> StepDescriptor {
        StepDescriptor {
            instance_id: instance.id(),
            workflow_id: instance.definition().id.clone(),
            state: instance.state().clone(),
            status: instance.status(),
            step: instance.current_step().map(|(_, spec)| spec.clone()),
            events: instance.available_events(),
            is_final: instance.is_final(),
            can_go_back: instance.can_go_back(),
        }
    }

    fn require_current(&self) -> Result<InstanceId> {
        self.current
            .ok_or_else(|| ModellingError::InvalidState("no active workflow".to_string()))
    }

    fn instance_mut(&mut self, id: InstanceId) -> Result<&mut WorkflowInstance> {
        self.instances
            .get_mut(&id)
            .ok_or_else(|| ModellingError::NotFound(format!("workflow instance {}", id)))
    }

    fn branch_from(&mut self, parent_id: InstanceId, field_id: &str, workflow_id: &str) -> Result<InstanceId> {
        let definition = self.registry.require(workflow_id)?;
        let parent = self.instance_mut(parent_id)?;

        if let Some(&existing) = parent.children.get(field_id) {
            let completed = self
                .instances
                .get(&existing)
                .map_or(false, |child| child.status() == WorkflowStatus::Completed);
            if completed {
                info!(field = field_id, instance = %existing, "branch already completed; staying in parent");
            } else {
                self.current = Some(existing);
                info!(field = field_id, instance = %existing, "↩️  Resumed branch");
            }
            return Ok(existing);
        }

        let linkage = Linkage {
            field_id: field_id.to_string(),
            inherited: parent.get_context(field_id).cloned(),
        };

        let mut child = WorkflowInstance::new(definition)?;
        child.parent = Some(parent_id);
        let fired = child.start(Some(linkage), &mut self.ids)?;
        let child_id = child.id();

        self.instances.insert(child_id, child);
        self.instance_mut(parent_id)?
            .children
            .insert(field_id.to_string(), child_id);
        self.current = Some(child_id);

        info!(
            field = field_id,
            workflow = workflow_id,
            parent = %parent_id,
            child = %child_id,
            "🌿 Branched workflow"
        );
        self.handle_entry_actions(child_id, fired)?;
        Ok(child_id)
    }

    fn handle_entry_actions(&mut self, origin: InstanceId, fired: Vec<FiredAction>) -> Result<()> {
        for (state, action) in fired {
            match action {
                EntryAction::Branch { field_id, workflow_id } => {
                    if !self.registry.contains(&workflow_id) {
                        warn!(
                            state = %state,
                            workflow = %workflow_id,
                            "Entry action branches into an unknown workflow; ignoring"
                        );
                        continue;
                    }
                    self.branch_from(origin, &field_id, &workflow_id)?;
                }
                EntryAction::End => {
                    let has_parent = self.instance_mut(origin)?.parent.is_some();
                    if has_parent {
                        self.complete_branch(origin)?;
                    } else {
                        debug!(instance = %origin, "root workflow reached its end");
                    }
                }
            }
        }
        Ok(())
    }

    /// Finalize a child, hand its result to the parent and return there
    fn complete_branch(&mut self, child_id: InstanceId) -> Result<()> {
        let child = self.instance_mut(child_id)?;
        child.validate()?;
        child.finalize()?;

        let parent_id = child.parent.ok_or_else(|| {
            ModellingError::InvalidState("only branched workflows can complete into a parent".to_string())
        })?;
        let result = match (child.linked_field(), child.bound_field()) {
            (Some(linked), Some(bound)) => child
                .get_context(bound)
                .map(|entry| (linked.to_string(), entry.clone())),
            _ => None,
        };

        if let Some((field, entry)) = result {
            let update = ContextUpdate {
                uid: entry.uid,
                value: Some(entry.value),
            };
            self.instance_mut(parent_id)?.set_context(&field, update);
        }

        self.current = Some(parent_id);
        info!(child = %child_id, parent = %parent_id, "🔗 Completed branch");
        Ok(())
    }

    /// Root facts, then the committed facts of completed descendants
    fn session_facts(&self) -> Vec<Fact> {
        let Some(root) = self.root.and_then(|id| self.instances.get(&id)) else {
            return Vec::new();
        };
        let mut facts = root.facts();
        self.collect_descendant_facts(root, &mut facts);
        facts
    }

    fn collect_descendant_facts(&self, instance: &WorkflowInstance, out: &mut Vec<Fact>) {
        for child_id in instance.children.values() {
            if let Some(child) = self.instances.get(child_id) {
                if child.status() == WorkflowStatus::Completed {
                    out.extend(child.committed_facts().iter().cloned());
                }
                self.collect_descendant_facts(child, out);
            }
        }
    }
}
