// Workflow instance - one run of a guided workflow with its context and facts

//! # Workflow Instances
//!
//! A `WorkflowInstance` couples one `StateMachineCore` run to:
//! - a `Context` holding the values of every field the workflow asks for
//! - a fact ledger (`facts_by_state`) fed by the `PatternCompiler`
//! - links to its parent and children in the session's branch tree
//!
//! ## Lifecycle
//!
//! ```text
//! NOT_STARTED --start--> IN_PROGRESS --validate--> PENDING --finalize--> COMPLETED
//!                             ^                       |
//!                             +------ send/prev ------+
//! ```
//!
//! Facts are captured when the user **leaves** a step with `NEXT`: the step's
//! `create` templates are compiled against the context as it stands at that
//! moment and stored under the step's state id. Re-visiting a step replaces
//! its entry, so every step contributes at most one batch of facts.
//!
//! Instances never touch each other. Branching, popping and the copying of
//! values between parent and child are done by `WorkflowSession`, which owns
//! the instance arena.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use super::compiler::PatternCompiler;
use super::machine::StateMachineCore;
use super::temp_id::TempIdAllocator;
use crate::models::{
    Context, ContextEntry, ContextUpdate, EntryAction, EventId, Fact, HistoryEvent, StateId,
    StateRef, StepSpec, WorkflowDefinition,
};
use crate::{ModellingError, Result};

/// Session-unique identifier of an instance
pub type InstanceId = Uuid;

/// Lifecycle status of an instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Pending,
    Completed,
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WorkflowStatus::NotStarted => "NOT_STARTED",
            WorkflowStatus::InProgress => "IN_PROGRESS",
            WorkflowStatus::Pending => "PENDING",
            WorkflowStatus::Completed => "COMPLETED",
        };
        write!(f, "{}", name)
    }
}

/// How a child instance is bound to its parent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linkage {
    /// Parent field the child resolves
    pub field_id: String,
    /// Parent's value for that field at branch time, if any
    pub inherited: Option<ContextEntry>,
}

/// An entry action fired by a transition, tagged with the state declaring it
pub type FiredAction = (StateId, EntryAction);

/// One run of a workflow definition
#[derive(Debug, Clone)]
pub struct WorkflowInstance {
    id: InstanceId,
    machine: StateMachineCore,
    context: Context,
    status: WorkflowStatus,
    compiler: PatternCompiler,

    /// Non-owning back reference into the session arena
    pub parent: Option<InstanceId>,
    /// Field id → child instance, in creation order
    pub children: IndexMap<String, InstanceId>,
    /// Parent field this instance was branched for
    linked_field: Option<String>,

    facts_by_state: IndexMap<StateId, Vec<Fact>>,
    committed: Vec<Fact>,
    history: Vec<HistoryEvent>,
}

impl WorkflowInstance {
    pub fn new(definition: Arc<WorkflowDefinition>) -> Result<Self> {
        Ok(WorkflowInstance {
            id: Uuid::new_v4(),
            machine: StateMachineCore::new(definition)?,
            context: Context::new(),
            status: WorkflowStatus::NotStarted,
            compiler: PatternCompiler::new(),
            parent: None,
            children: IndexMap::new(),
            linked_field: None,
            facts_by_state: IndexMap::new(),
            committed: Vec::new(),
            history: Vec::new(),
        })
    }

    pub fn id(&self) -> InstanceId {
        self.id
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        self.machine.definition()
    }

    pub fn status(&self) -> WorkflowStatus {
        self.status
    }

    pub fn state(&self) -> &StateRef {
        self.machine.current_state()
    }

    pub fn available_events(&self) -> Vec<EventId> {
        self.machine.available_events()
    }

    pub fn is_final(&self) -> bool {
        self.machine.is_final()
    }

    pub fn can_go_back(&self) -> bool {
        self.machine.can_go_back()
    }

    /// Whether the machine rests in a final configuration with an `End` action
    pub fn ends_branch(&self) -> bool {
        let definition = self.definition();
        self.machine.is_final()
            && self.state().path().iter().any(|id| {
                matches!(
                    definition.state(id).and_then(|node| node.entry.as_ref()),
                    Some(EntryAction::End)
                )
            })
    }

    /// Parent field this instance was branched for
    pub fn linked_field(&self) -> Option<&str> {
        self.linked_field.as_deref()
    }

    /// Own field bound to the parent's linked field
    ///
    /// The definition's subject when it declares one, else the linked field id.
    pub fn bound_field(&self) -> Option<&str> {
        let linked = self.linked_field.as_deref()?;
        Some(self.definition().subject.as_deref().unwrap_or(linked))
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn history(&self) -> &[HistoryEvent] {
        &self.history
    }

    /// Facts committed by `finalize`; empty until then
    pub fn committed_facts(&self) -> &[Fact] {
        &self.committed
    }

    /// The innermost active state with a step spec, and that spec
    pub fn current_step(&self) -> Option<(&StateId, &StepSpec)> {
        let definition = self.machine.definition();
        let state = self
            .machine
            .current_state()
            .resolve(&|id: &StateId| definition.steps.contains_key(id))?;
        definition.step(state).map(|spec| (state, spec))
    }

    /// Seed the context and enter the initial state
    ///
    /// Every field of the definition gets a provisional placeholder, except
    /// the bound field of a branch, which takes the parent's value.
    /// Returns the entry actions of the initial configuration.
    pub fn start(&mut self, linkage: Option<Linkage>, ids: &mut TempIdAllocator) -> Result<Vec<FiredAction>> {
        if self.status != WorkflowStatus::NotStarted {
            return Err(ModellingError::InvalidState(format!(
                "workflow '{}' already started ({})",
                self.definition().id,
                self.status
            )));
        }

        let fields: Vec<String> = self
            .definition()
            .field_sources()
            .into_iter()
            .map(|f| f.field.clone())
            .collect();

        let (linked_field, inherited) = match linkage {
            Some(linkage) => (Some(linkage.field_id), linkage.inherited),
            None => (None, None),
        };
        let bound = linked_field
            .as_deref()
            .map(|linked| self.definition().subject.as_deref().unwrap_or(linked).to_string());

        // allocate everything first so a failed start leaves the instance untouched
        let mut seeded = Vec::with_capacity(fields.len());
        for field in fields {
            let entry = match (&inherited, &bound) {
                (Some(entry), Some(bound)) if *bound == field => entry.clone(),
                _ => ContextEntry::new(Some(ids.next()?), ""),
            };
            seeded.push((field, entry));
        }

        self.linked_field = linked_field;
        for (field, entry) in seeded {
            self.context.insert(field, entry);
        }

        self.status = WorkflowStatus::InProgress;
        info!(
            instance = %self.id,
            workflow = %self.definition().id,
            linked_field = ?self.linked_field,
            "▶️  Started workflow instance"
        );

        let mut fired = Vec::new();
        self.machine
            .start(|id, action| fired.push((id.clone(), action.clone())));
        Ok(fired)
    }

    /// Drive the machine with `event`
    ///
    /// `NEXT` first captures the facts of the step being left. Fails when the
    /// instance is not running or its machine is already final; an event the
    /// machine does not handle is not a failure.
    pub fn send(&mut self, event: &EventId) -> Result<Vec<FiredAction>> {
        self.ensure_running("send an event to")?;
        if self.machine.is_final() {
            return Err(ModellingError::InvalidState(format!(
                "workflow '{}' is in final state '{}'",
                self.definition().id,
                self.machine.current_state()
            )));
        }

        if event.is_next() {
            self.capture_pending_facts();
        }

        let from = self.machine.current_state().clone();
        let mut fired = Vec::new();
        let to = self
            .machine
            .send(event, |id, action| fired.push((id.clone(), action.clone())))
            .clone();

        if to != from {
            self.status = WorkflowStatus::InProgress;
            self.history.push(HistoryEvent::new(event.clone(), from, to));
        }
        Ok(fired)
    }

    /// Step back to the previously visited configuration
    ///
    /// Facts captured for later steps stay in the ledger until those steps are
    /// left again. Returns false when there is nothing to go back to.
    pub fn prev(&mut self) -> Result<bool> {
        self.ensure_running("step back in")?;

        let from = self.machine.current_state().clone();
        if !self.machine.back() {
            return Ok(false);
        }
        let to = self.machine.current_state().clone();
        self.status = WorkflowStatus::InProgress;
        self.history.push(HistoryEvent::new(EventId::from("BACK"), from, to));
        Ok(true)
    }

    /// Required fields of the current step that are not yet resolved
    ///
    /// `free` fields may be left empty.
    pub fn missing_fields(&self) -> Vec<String> {
        let Some((_, spec)) = self.current_step() else {
            return Vec::new();
        };
        spec.field_sources
            .iter()
            .filter(|f| !f.source.is_optional())
            .filter(|f| !self.context.get(&f.field).map_or(false, ContextEntry::is_resolved))
            .map(|f| f.field.clone())
            .collect()
    }

    pub fn are_all_fields_valid(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Check the current step and mark the instance `PENDING`
    ///
    /// The current step's facts are captured too, so a workflow may be
    /// finalized on its last data step without leaving it first.
    pub fn validate(&mut self) -> Result<()> {
        self.ensure_running("validate")?;

        let missing = self.missing_fields();
        if !missing.is_empty() {
            return Err(ModellingError::Validation {
                state: self.machine.current_state().to_string(),
                missing,
            });
        }

        self.capture_pending_facts();
        self.status = WorkflowStatus::Pending;
        debug!(instance = %self.id, state = %self.machine.current_state(), "validated");
        Ok(())
    }

    /// Commit the captured facts; only legal from `PENDING`
    pub fn finalize(&mut self) -> Result<&[Fact]> {
        if self.status != WorkflowStatus::Pending {
            return Err(ModellingError::InvalidState(format!(
                "cannot finalize workflow '{}' in status {}",
                self.definition().id,
                self.status
            )));
        }

        self.committed = self.facts();
        self.status = WorkflowStatus::Completed;
        info!(
            instance = %self.id,
            workflow = %self.definition().id,
            facts = self.committed.len(),
            "✅ Finalized workflow instance"
        );
        Ok(self.committed.as_slice())
    }

    /// Undo `finalize`, back to `PENDING`; used when the commit downstream failed
    pub fn reopen(&mut self) -> Result<()> {
        if self.status != WorkflowStatus::Completed {
            return Err(ModellingError::InvalidState(format!(
                "cannot reopen workflow '{}' in status {}",
                self.definition().id,
                self.status
            )));
        }
        self.committed.clear();
        self.status = WorkflowStatus::Pending;
        Ok(())
    }

    /// Merge a partial update into one context field
    pub fn set_context(&mut self, key: &str, update: ContextUpdate) -> &ContextEntry {
        debug!(instance = %self.id, key, uid = ?update.uid, value = ?update.value, "context write");
        self.context.set(key, update)
    }

    pub fn get_context(&self, key: &str) -> Option<&ContextEntry> {
        self.context.get(key)
    }

    /// All captured facts, in the order their steps were first left
    pub fn facts(&self) -> Vec<Fact> {
        self.facts_by_state.values().flatten().cloned().collect()
    }

    pub fn facts_by_state(&self) -> &IndexMap<StateId, Vec<Fact>> {
        &self.facts_by_state
    }

    fn capture_pending_facts(&mut self) {
        let pending = self
            .current_step()
            .map(|(state, spec)| (state.clone(), self.compiler.compile(&spec.create, &self.context)));
        if let Some((state, facts)) = pending {
            debug!(instance = %self.id, state = %state, facts = facts.len(), "captured step facts");
            self.facts_by_state.insert(state, facts);
        }
    }

    fn ensure_running(&self, action: &str) -> Result<()> {
        match self.status {
            WorkflowStatus::InProgress | WorkflowStatus::Pending => Ok(()),
            status => Err(ModellingError::InvalidState(format!(
                "cannot {} workflow '{}' in status {}",
                action,
                self.definition().id,
                status
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldSource, FieldSourceSpec, Pattern, StateNode};

    fn new_concept() -> Arc<WorkflowDefinition> {
        Arc::new(
            WorkflowDefinition::new(
                "new-concept",
                "New concept",
                "name",
                vec![
                    StateNode::leaf("name").on("NEXT", "supertype"),
                    StateNode::leaf("supertype").on("NEXT", "done"),
                    StateNode::leaf("done").final_state(),
                ],
            )
            .with_step(
                "name",
                StepSpec {
                    field_sources: vec![FieldSourceSpec::new("NewConcept", FieldSource::Free)],
                    ..Default::default()
                },
            )
            .with_step(
                "supertype",
                StepSpec {
                    create: Pattern::parse(["1.NewConcept? > 1146.is a specialization of > 2.Supertype?"])
                        .unwrap(),
                    field_sources: vec![FieldSourceSpec::new("Supertype", FieldSource::KnowledgeGraph)],
                    ..Default::default()
                },
            ),
        )
    }

    fn started() -> (WorkflowInstance, TempIdAllocator) {
        let mut ids = TempIdAllocator::new();
        let mut instance = WorkflowInstance::new(new_concept()).unwrap();
        instance.start(None, &mut ids).unwrap();
        (instance, ids)
    }

    #[test]
    fn test_start_seeds_placeholders() {
        let (instance, ids) = started();

        assert_eq!(instance.status(), WorkflowStatus::InProgress);
        assert_eq!(instance.get_context("NewConcept"), Some(&ContextEntry::new(Some(1), "")));
        assert_eq!(instance.get_context("Supertype"), Some(&ContextEntry::new(Some(2), "")));
        assert_eq!(ids.current(), 2);
    }

    #[test]
    fn test_start_with_linkage_inherits_parent_value() {
        let mut ids = TempIdAllocator::new();
        let mut instance = WorkflowInstance::new(new_concept()).unwrap();
        instance
            .start(
                Some(Linkage {
                    field_id: "NewConcept".to_string(),
                    inherited: Some(ContextEntry::new(Some(42), "Gadget")),
                }),
                &mut ids,
            )
            .unwrap();

        assert_eq!(instance.get_context("NewConcept"), Some(&ContextEntry::new(Some(42), "Gadget")));
        assert_eq!(instance.get_context("Supertype").unwrap().uid, Some(1));
        assert_eq!(instance.linked_field(), Some("NewConcept"));
    }

    #[test]
    fn test_linkage_binds_subject_field() {
        let definition = (*new_concept()).clone().with_subject("NewConcept");
        let mut ids = TempIdAllocator::new();
        let mut instance = WorkflowInstance::new(Arc::new(definition)).unwrap();
        instance
            .start(
                Some(Linkage {
                    field_id: "Supertype".to_string(),
                    inherited: Some(ContextEntry::new(Some(2), "Gadget")),
                }),
                &mut ids,
            )
            .unwrap();

        assert_eq!(instance.linked_field(), Some("Supertype"));
        assert_eq!(instance.bound_field(), Some("NewConcept"));
        assert_eq!(instance.get_context("NewConcept"), Some(&ContextEntry::new(Some(2), "Gadget")));
        assert_eq!(instance.get_context("Supertype"), Some(&ContextEntry::new(Some(1), "")));
    }

    #[test]
    fn test_start_fails_cleanly_without_provisional_uids() {
        let mut ids = TempIdAllocator::new();
        while ids.current() < crate::engine::temp_id::PROVISIONAL_UID_MAX - 1 {
            ids.next().unwrap();
        }

        // two fields to seed, one uid left
        let mut instance = WorkflowInstance::new(new_concept()).unwrap();
        assert!(matches!(
            instance.start(None, &mut ids),
            Err(ModellingError::ProvisionalUidsExhausted { .. })
        ));
        assert_eq!(instance.status(), WorkflowStatus::NotStarted);
        assert!(instance.context().is_empty());
    }

    #[test]
    fn test_next_captures_facts_of_step_left() {
        let (mut instance, _) = started();
        instance.set_context("NewConcept", ContextUpdate::value("Widget"));
        instance.send(&EventId::next()).unwrap();
        instance.set_context("Supertype", ContextUpdate::both(730044, "Physical Object"));

        // nothing to capture on the name step
        assert!(instance.facts().is_empty());

        instance.send(&EventId::next()).unwrap();
        let facts = instance.facts();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].to_string(), "1.Widget > 1146.is a specialization of > 730044.Physical Object");
        assert_eq!(instance.history().len(), 2);
    }

    #[test]
    fn test_revisiting_a_step_replaces_its_facts() {
        let (mut instance, _) = started();
        instance.set_context("NewConcept", ContextUpdate::value("Widget"));
        instance.set_context("Supertype", ContextUpdate::both(730044, "Physical Object"));
        instance.send(&EventId::next()).unwrap();
        instance.send(&EventId::next()).unwrap();

        assert!(instance.prev().unwrap());
        instance.set_context("NewConcept", ContextUpdate::value("Gizmo"));
        instance.send(&EventId::next()).unwrap();

        let facts = instance.facts();
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].lh_object_name, "Gizmo");
        assert_eq!(instance.history().last().unwrap().event, EventId::next());
    }

    #[test]
    fn test_send_on_final_machine_is_invalid() {
        let (mut instance, _) = started();
        instance.send(&EventId::next()).unwrap();
        instance.send(&EventId::next()).unwrap();
        assert!(instance.is_final());

        assert!(matches!(
            instance.send(&EventId::next()),
            Err(ModellingError::InvalidState(_))
        ));
    }

    #[test]
    fn test_unknown_event_is_not_an_error() {
        let (mut instance, _) = started();
        let fired = instance.send(&EventId::from("WHATEVER")).unwrap();
        assert!(fired.is_empty());
        assert_eq!(instance.state(), &StateRef::Leaf(StateId::from("name")));
        assert!(instance.history().is_empty());
    }

    #[test]
    fn test_validate_requires_non_free_fields() {
        let (mut instance, _) = started();

        // free field left empty is fine
        instance.validate().unwrap();
        assert_eq!(instance.status(), WorkflowStatus::Pending);

        instance.send(&EventId::next()).unwrap();
        assert_eq!(instance.status(), WorkflowStatus::InProgress);
        match instance.validate() {
            Err(ModellingError::Validation { state, missing }) => {
                assert_eq!(state, "supertype");
                assert_eq!(missing, vec!["Supertype".to_string()]);
            }
            other => panic!("expected validation error, got {:?}", other),
        }
        assert_eq!(instance.status(), WorkflowStatus::InProgress);

        instance.set_context("Supertype", ContextUpdate::both(730044, "Physical Object"));
        instance.validate().unwrap();
        assert_eq!(instance.status(), WorkflowStatus::Pending);
    }

    #[test]
    fn test_finalize_only_from_pending() {
        let mut ids = TempIdAllocator::new();
        let mut fresh = WorkflowInstance::new(new_concept()).unwrap();
        assert!(matches!(fresh.finalize(), Err(ModellingError::InvalidState(_))));
        fresh.start(None, &mut ids).unwrap();

        fresh.set_context("NewConcept", ContextUpdate::value("Widget"));
        fresh.send(&EventId::next()).unwrap();
        fresh.set_context("Supertype", ContextUpdate::both(730044, "Physical Object"));

        let before = fresh.facts().len();
        assert!(matches!(fresh.finalize(), Err(ModellingError::InvalidState(_))));
        assert_eq!(fresh.facts().len(), before);
        assert!(fresh.committed_facts().is_empty());

        fresh.validate().unwrap();
        let committed = fresh.finalize().unwrap().to_vec();
        assert_eq!(committed.len(), 1);
        assert_eq!(fresh.status(), WorkflowStatus::Completed);

        assert!(matches!(fresh.finalize(), Err(ModellingError::InvalidState(_))));
        assert_eq!(fresh.committed_facts(), committed.as_slice());
    }

    #[test]
    fn test_reopen_allows_second_finalize() {
        let (mut instance, _) = started();
        assert!(matches!(instance.reopen(), Err(ModellingError::InvalidState(_))));

        instance.set_context("NewConcept", ContextUpdate::value("Widget"));
        instance.validate().unwrap();
        instance.finalize().unwrap();

        instance.reopen().unwrap();
        assert_eq!(instance.status(), WorkflowStatus::Pending);
        assert!(instance.committed_facts().is_empty());
        instance.finalize().unwrap();
        assert_eq!(instance.status(), WorkflowStatus::Completed);
    }

    #[test]
    fn test_status_serializes_screaming() {
        assert_eq!(
            serde_json::to_value(WorkflowStatus::NotStarted).unwrap(),
            serde_json::json!("NOT_STARTED")
        );
        assert_eq!(WorkflowStatus::InProgress.to_string(), "IN_PROGRESS");
    }
}
