// Hierarchical state machine interpreter for guided workflows

//! # State Machine Core
//!
//! `StateMachineCore` runs one `WorkflowDefinition`: it knows the active
//! configuration, which events are available, and how an event moves the
//! configuration. It knows nothing about contexts or facts; that is the
//! job of `WorkflowInstance`.
//!
//! ## Semantics
//!
//! - **Event lookup is hierarchical.** The innermost active state that declares
//!   the event handles it; otherwise its ancestors are tried, outermost last.
//!   An event nobody handles is a no-op. `send` never fails.
//! - **Entering a compound state** enters its `initial` child, or with
//!   `history` set, the child that was active when it was last left
//!   (shallow history).
//! - **Entry actions** fire outer-to-inner for every state that becomes active,
//!   through the `on_entry` callback, before `send` returns.
//! - **Stepping back** restores the previous configuration without firing
//!   entry actions.
//!
//! ## Rust Learning Notes:
//!
//! ### Callbacks with FnMut
//! `send` takes `impl FnMut(&StateId, &EntryAction)`. `FnMut` lets the caller
//! pass a closure that pushes into a local `Vec`, which is how the owning
//! instance collects entry actions without the machine knowing about sessions.
//!
//! ### Shared Read-Only Definitions
//! The definition is held through an `Arc`, so every instance running the same
//! workflow shares one copy.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::models::{EntryAction, EventId, StateId, StateRef, StateNode, WorkflowDefinition};
use crate::{ModellingError, Result};

/// Interpreter for one run of a workflow definition
#[derive(Debug, Clone)]
pub struct StateMachineCore {
    definition: Arc<WorkflowDefinition>,
    current: StateRef,
    /// Compound state → child that was active most recently
    last_visited: HashMap<StateId, StateId>,
    /// Previous configurations, most recent last
    visits: Vec<StateRef>,
}

impl StateMachineCore {
    /// Build a machine sitting in the definition's initial configuration
    ///
    /// No entry actions have fired yet; call [`StateMachineCore::start`].
    pub fn new(definition: Arc<WorkflowDefinition>) -> Result<Self> {
        let mut machine = StateMachineCore {
            current: StateRef::Leaf(definition.initial.clone()),
            definition,
            last_visited: HashMap::new(),
            visits: Vec::new(),
        };
        let initial = machine.definition.initial.clone();
        let configuration = machine.configuration_for(&initial).ok_or_else(|| {
            ModellingError::Definition(format!(
                "workflow '{}' has no initial state '{}'",
                machine.definition.id, initial
            ))
        })?;
        machine.enter(configuration);
        Ok(machine)
    }

    /// Fire the entry actions of the initial configuration
    pub fn start<F>(&self, mut on_entry: F)
    where
        F: FnMut(&StateId, &EntryAction),
    {
        for id in self.current.path() {
            if let Some(action) = self.node(&id).and_then(|n| n.entry.as_ref()) {
                on_entry(&id, action);
            }
        }
    }

    pub fn definition(&self) -> &Arc<WorkflowDefinition> {
        &self.definition
    }

    pub fn current_state(&self) -> &StateRef {
        &self.current
    }

    /// Events handled somewhere in the active configuration, innermost first
    pub fn available_events(&self) -> Vec<EventId> {
        let mut events: Vec<EventId> = Vec::new();
        for id in self.current.path().iter().rev() {
            if let Some(node) = self.node(id) {
                for event in node.on.keys() {
                    if !events.contains(event) {
                        events.push(event.clone());
                    }
                }
            }
        }
        events
    }

    /// Whether the active top-level state is final
    pub fn is_final(&self) -> bool {
        self.node(self.current.head()).map_or(false, |n| n.is_final)
    }

    /// Child of `compound` that was active most recently
    pub fn last_visited_child(&self, compound: &StateId) -> Option<&StateId> {
        self.last_visited.get(compound)
    }

    pub fn can_go_back(&self) -> bool {
        !self.visits.is_empty()
    }

    /// Apply `event` and return the resulting configuration
    ///
    /// Unknown events leave the configuration unchanged. Entry actions of
    /// every newly active state are passed to `on_entry`, outer-to-inner.
    pub fn send<F>(&mut self, event: &EventId, mut on_entry: F) -> &StateRef
    where
        F: FnMut(&StateId, &EntryAction),
    {
        let Some(target) = self.target_for(event).cloned() else {
            trace!(event = %event, state = %self.current, "event not handled; ignoring");
            return &self.current;
        };

        let Some(next) = self.configuration_for(&target) else {
            warn!(event = %event, target = %target, "transition targets unknown state; ignoring");
            return &self.current;
        };

        let before = self.current.path();
        let after = next.path();
        let shared = before
            .iter()
            .zip(after.iter())
            .take_while(|(a, b)| a == b)
            .count();

        debug!(event = %event, from = %self.current, to = %next, "transition");
        let previous = std::mem::replace(&mut self.current, next.clone());
        self.visits.push(previous);
        self.enter(next);

        for id in &after[shared..] {
            if let Some(action) = self.node(id).and_then(|n| n.entry.as_ref()) {
                on_entry(id, action);
            }
        }

        &self.current
    }

    /// Restore the previous configuration; returns false when there is none
    pub fn back(&mut self) -> bool {
        match self.visits.pop() {
            Some(previous) => {
                debug!(from = %self.current, to = %previous, "stepping back");
                self.enter(previous);
                true
            }
            None => false,
        }
    }

    fn node(&self, id: &StateId) -> Option<&StateNode> {
        self.definition.state(id)
    }

    /// Innermost active state handling `event`, resolved to its target
    fn target_for(&self, event: &EventId) -> Option<&StateId> {
        let path = self.current.path();
        path.iter()
            .rev()
            .filter_map(|id| self.node(id))
            .find_map(|node| node.on.get(event))
    }

    /// Full configuration that becomes active when `target` is entered
    fn configuration_for(&self, target: &StateId) -> Option<StateRef> {
        let mut path = self.definition.path_to(target)?;
        loop {
            let node = path.last().and_then(|id| self.node(id))?;
            if !node.is_compound() {
                break;
            }
            let remembered = node
                .history
                .then(|| self.last_visited.get(&node.id))
                .flatten();
            match remembered.or_else(|| node.initial_child()) {
                Some(child) => path.push(child.clone()),
                None => break,
            }
        }
        StateRef::from_path(&path)
    }

    /// Make `configuration` active and remember the active child of each compound
    fn enter(&mut self, configuration: StateRef) {
        let path = configuration.path();
        for pair in path.windows(2) {
            self.last_visited.insert(pair[0].clone(), pair[1].clone());
        }
        self.current = configuration;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn role() -> Arc<WorkflowDefinition> {
        Arc::new(WorkflowDefinition::new(
            "role",
            "Define a role",
            "name",
            vec![
                StateNode::leaf("name").on("NEXT", "R"),
                StateNode::compound(
                    "R",
                    "player",
                    vec![
                        StateNode::leaf("player").on("NEXT", "kind").branch("Player", "new-physical-object"),
                        StateNode::leaf("kind").on("NEXT", "done").on("EDIT_NAME", "name"),
                    ],
                )
                .with_history()
                .on("RENAME", "name"),
                StateNode::leaf("done").final_state(),
            ],
        ))
    }

    fn collect_entries(machine: &mut StateMachineCore, event: &str) -> Vec<StateId> {
        let mut entered = Vec::new();
        machine.send(&EventId::from(event), |id, _| entered.push(id.clone()));
        entered
    }

    #[test]
    fn test_starts_in_initial_state() {
        let machine = StateMachineCore::new(role()).unwrap();
        assert_eq!(machine.current_state(), &StateRef::Leaf(StateId::from("name")));
        assert_eq!(machine.available_events(), vec![EventId::next()]);
        assert!(!machine.is_final());
    }

    #[test]
    fn test_unknown_event_is_noop() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        let before = machine.current_state().clone();

        let after = machine.send(&EventId::from("NOPE"), |_, _| panic!("no entry expected")).clone();

        assert_eq!(after, before);
        assert!(!machine.can_go_back());
    }

    #[test]
    fn test_compound_entry_descends_and_fires_actions() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        let mut actions = Vec::new();

        machine.send(&EventId::next(), |id, action| actions.push((id.clone(), action.clone())));

        assert_eq!(machine.current_state().to_string(), "R.player");
        assert_eq!(
            actions,
            vec![(
                StateId::from("player"),
                EntryAction::Branch {
                    field_id: "Player".to_string(),
                    workflow_id: "new-physical-object".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_events_bubble_to_ancestors() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        machine.send(&EventId::next(), |_, _| {});

        let events = machine.available_events();
        assert_eq!(events, vec![EventId::next(), EventId::from("RENAME")]);

        machine.send(&EventId::from("RENAME"), |_, _| {});
        assert_eq!(machine.current_state(), &StateRef::Leaf(StateId::from("name")));
    }

    #[test]
    fn test_history_restores_last_child() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        machine.send(&EventId::next(), |_, _| {});
        machine.send(&EventId::next(), |_, _| {});
        assert_eq!(machine.current_state().to_string(), "R.kind");

        machine.send(&EventId::from("EDIT_NAME"), |_, _| {});
        assert_eq!(machine.last_visited_child(&StateId::from("R")), Some(&StateId::from("kind")));

        // re-entering R resumes at kind, so the player branch does not fire again
        let entered = collect_entries(&mut machine, "NEXT");
        assert_eq!(machine.current_state().to_string(), "R.kind");
        assert!(entered.is_empty());
    }

    #[test]
    fn test_without_history_reenters_initial_child() {
        let mut definition = (*role()).clone();
        definition.states[1].history = false;
        let mut machine = StateMachineCore::new(Arc::new(definition)).unwrap();

        machine.send(&EventId::next(), |_, _| {});
        machine.send(&EventId::next(), |_, _| {});
        machine.send(&EventId::from("EDIT_NAME"), |_, _| {});
        let entered = collect_entries(&mut machine, "NEXT");

        assert_eq!(machine.current_state().to_string(), "R.player");
        assert_eq!(entered, vec![StateId::from("player")]);
    }

    #[test]
    fn test_final_state() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        for _ in 0..3 {
            machine.send(&EventId::next(), |_, _| {});
        }
        assert!(machine.is_final());
        assert!(machine.available_events().is_empty());

        // still total once final
        machine.send(&EventId::next(), |_, _| {});
        assert!(machine.is_final());
    }

    #[test]
    fn test_back_restores_without_entry_actions() {
        let mut machine = StateMachineCore::new(role()).unwrap();
        machine.send(&EventId::next(), |_, _| {});
        machine.send(&EventId::next(), |_, _| {});

        assert!(machine.back());
        assert_eq!(machine.current_state().to_string(), "R.player");
        assert!(machine.back());
        assert_eq!(machine.current_state().to_string(), "name");
        assert!(!machine.back());
    }

    #[test]
    fn test_start_fires_initial_entry_actions() {
        let definition = Arc::new(WorkflowDefinition::new(
            "ends-immediately",
            "Ends immediately",
            "done",
            vec![StateNode::leaf("done").entry(EntryAction::End).final_state()],
        ));
        let machine = StateMachineCore::new(definition).unwrap();

        let mut fired = Vec::new();
        machine.start(|id, action| fired.push((id.clone(), action.clone())));

        assert_eq!(fired, vec![(StateId::from("done"), EntryAction::End)]);
        assert!(machine.is_final());
    }

    #[test]
    fn test_missing_initial_state_is_an_error() {
        let definition = Arc::new(WorkflowDefinition::new("broken", "Broken", "ghost", vec![]));
        assert!(matches!(
            StateMachineCore::new(definition),
            Err(ModellingError::Definition(_))
        ));
    }
}
