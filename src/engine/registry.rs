// Workflow registry - the process-wide table of guided workflow definitions

//! # Workflow Registry
//!
//! Definitions are registered once at start-up and never change afterwards.
//! The registry is shared between sessions behind an `Arc`; every definition
//! inside is itself an `Arc<WorkflowDefinition>` so instances can hold on to
//! the one they run without cloning it.
//!
//! Two sources feed the registry:
//! - the built-in workflows from [`WorkflowRegistry::with_defaults`]
//! - JSON files from a directory ([`WorkflowRegistry::load_dir`])
//!
//! Everything is checked on the way in: pattern lines are parsed while the
//! JSON is deserialized and each definition is validated, so a malformed
//! template never reaches a session.
//!
//! ## Built-in Workflows
//!
//! | id                    | defines                          | branches into          |
//! |-----------------------|----------------------------------|------------------------|
//! | `new-physical-object` | a physical object kind           | itself (new supertype) |
//! | `role`                | a role, its player and its kind  | `new-physical-object`  |
//! | `new-relation`        | a relation kind with two roles   | `role`                 |

use indexmap::IndexMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::models::{
    EntryAction, FieldSource, FieldSourceSpec, Pattern, StateId, StateNode, StepSpec,
    WorkflowDefinition,
};
use crate::{ModellingError, Result};

/// Immutable table of workflow definitions keyed by id
#[derive(Debug, Clone, Default)]
pub struct WorkflowRegistry {
    definitions: IndexMap<String, Arc<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in guided modelling workflows
    ///
    /// Fails only if a built-in template or definition is malformed.
    pub fn with_defaults() -> Result<Self> {
        let mut registry = Self::new();
        for definition in [new_physical_object()?, role()?, new_relation()?] {
            registry.register(definition)?;
        }
        Ok(registry)
    }

    /// Validate and add a definition, replacing any with the same id
    pub fn register(&mut self, definition: WorkflowDefinition) -> Result<()> {
        definition
            .validate()
            .map_err(|e| ModellingError::Definition(format!("workflow '{}': {}", definition.id, e)))?;

        let unreachable = definition.find_unreachable_states();
        if !unreachable.is_empty() {
            warn!(
                workflow = %definition.id,
                states = ?unreachable,
                "⚠️  Workflow has unreachable states"
            );
        }

        debug!(workflow = %definition.id, states = definition.all_states().len(), "registered workflow");
        self.definitions
            .insert(definition.id.clone(), Arc::new(definition));
        Ok(())
    }

    /// Load every `*.json` file in `dir` as a workflow definition
    ///
    /// Files are read in name order. Returns how many definitions were added.
    pub fn load_dir(&mut self, dir: impl AsRef<Path>) -> Result<usize> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        paths.sort();

        for path in &paths {
            let contents = std::fs::read_to_string(path)?;
            let definition: WorkflowDefinition = serde_json::from_str(&contents).map_err(|e| {
                ModellingError::Definition(format!("{}: {}", path.display(), e))
            })?;
            self.register(definition)?;
        }

        info!("📂 Loaded {} workflow definition(s) from {}", paths.len(), dir.display());
        Ok(paths.len())
    }

    pub fn get(&self, id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.definitions.get(id).cloned()
    }

    /// Like [`WorkflowRegistry::get`] but an unknown id is an error
    pub fn require(&self, id: &str) -> Result<Arc<WorkflowDefinition>> {
        self.get(id)
            .ok_or_else(|| ModellingError::UnknownWorkflow { id: id.to_string() })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Registry dump, in registration order
    pub fn definitions(&self) -> Vec<&WorkflowDefinition> {
        self.definitions.values().map(|d| d.as_ref()).collect()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    /// Branch actions naming workflows this registry does not know
    ///
    /// Returned as `(workflow id, state id, missing workflow id)`.
    pub fn dangling_branches(&self) -> Vec<(String, StateId, String)> {
        let mut dangling = Vec::new();
        for definition in self.definitions.values() {
            for state in definition.all_states() {
                if let Some(EntryAction::Branch { workflow_id, .. }) = &state.entry {
                    if !self.contains(workflow_id) {
                        dangling.push((definition.id.clone(), state.id.clone(), workflow_id.clone()));
                    }
                }
            }
        }
        dangling
    }
}

fn step(create: &[&str], fields: Vec<FieldSourceSpec>) -> Result<StepSpec> {
    Ok(StepSpec {
        match_patterns: Pattern::default(),
        create: Pattern::parse(create)?,
        field_sources: fields,
    })
}

const SPECIALIZATION: &str = "1.NewConcept? > 1146.is a specialization of > 2.Supertype?";

/// Define a new kind of physical object
fn new_physical_object() -> Result<WorkflowDefinition> {
    let supertype = || {
        step(
            &[SPECIALIZATION],
            vec![FieldSourceSpec::with_workflow(
                "Supertype",
                FieldSource::KnowledgeGraphOrWorkflow,
                "new-physical-object",
            )],
        )
    };

    Ok(WorkflowDefinition::new(
        "new-physical-object",
        "New physical object",
        "name",
        vec![
            StateNode::leaf("name").on("NEXT", "supertype"),
            StateNode::leaf("supertype")
                .on("NEXT", "definition")
                .on("NEW_SUPERTYPE", "new-supertype"),
            StateNode::leaf("new-supertype")
                .branch("Supertype", "new-physical-object")
                .on("NEXT", "definition")
                .on("PICK_SUPERTYPE", "supertype"),
            StateNode::leaf("definition").on("NEXT", "done"),
            StateNode::leaf("done").entry(EntryAction::End).final_state(),
        ],
    )
    .with_description("Name a new kind of physical object, place it under a supertype and define it")
    .with_subject("NewConcept")
    .with_step(
        "name",
        step(&[], vec![FieldSourceSpec::new("NewConcept", FieldSource::Context)])?,
    )
    .with_step("supertype", supertype()?)
    .with_step("new-supertype", supertype()?)
    .with_step(
        "definition",
        step(
            &["@full_definition:?Definition"],
            vec![FieldSourceSpec::new("Definition", FieldSource::Free)],
        )?,
    ))
}

/// Define a role, the kind of object playing it, and the kind of role it is
fn role() -> Result<WorkflowDefinition> {
    Ok(WorkflowDefinition::new(
        "role",
        "Role",
        "name",
        vec![
            StateNode::leaf("name").on("NEXT", "R"),
            StateNode::compound(
                "R",
                "player",
                vec![
                    StateNode::leaf("player")
                        .on("NEXT", "kind")
                        .on("NEW_PLAYER", "new-player"),
                    StateNode::leaf("new-player")
                        .branch("Player", "new-physical-object")
                        .on("NEXT", "kind")
                        .on("PICK_PLAYER", "player"),
                    StateNode::leaf("kind")
                        .on("NEXT", "done")
                        .on("CHANGE_PLAYER", "player"),
                ],
            )
            .with_history()
            .on("RENAME", "name"),
            StateNode::leaf("done").entry(EntryAction::End).final_state(),
        ],
    )
    .with_description("Name a role, choose what plays it and what kind of role it is")
    .with_subject("Role")
    .with_step(
        "name",
        step(&[], vec![FieldSourceSpec::new("Role", FieldSource::Context)])?,
    )
    .with_step(
        "player",
        step(
            &["1.Player? > 4714.can have as role a > 2.Role?"],
            vec![FieldSourceSpec::with_workflow(
                "Player",
                FieldSource::KnowledgeGraphOrWorkflow,
                "new-physical-object",
            )],
        )?,
    )
    .with_step(
        "new-player",
        step(
            &["1.Player? > 4714.can have as role a > 2.Role?"],
            vec![FieldSourceSpec::with_workflow("Player", FieldSource::Workflow, "new-physical-object")],
        )?,
    )
    .with_step(
        "kind",
        step(
            &["2.Role? > 1146.is a specialization of > 3.RoleKind?"],
            vec![FieldSourceSpec::new("RoleKind", FieldSource::KnowledgeGraph)],
        )?,
    ))
}

/// Define a binary relation kind by the two roles it requires
fn new_relation() -> Result<WorkflowDefinition> {
    let role_step = |field: &str, rel: &str| {
        let line = format!("1.Relation? > {} > 2.{}?", rel, field);
        step(
            &[line.as_str()],
            vec![FieldSourceSpec::with_workflow(field, FieldSource::KnowledgeGraphOrWorkflow, "role")],
        )
    };

    Ok(WorkflowDefinition::new(
        "new-relation",
        "New relation",
        "name",
        vec![
            StateNode::leaf("name").on("NEXT", "first-role"),
            StateNode::leaf("first-role")
                .on("NEXT", "second-role")
                .on("NEW_ROLE", "new-first-role"),
            StateNode::leaf("new-first-role")
                .branch("FirstRole", "role")
                .on("NEXT", "second-role"),
            StateNode::leaf("second-role")
                .on("NEXT", "done")
                .on("NEW_ROLE", "new-second-role"),
            StateNode::leaf("new-second-role")
                .branch("SecondRole", "role")
                .on("NEXT", "done"),
            StateNode::leaf("done").entry(EntryAction::End).final_state(),
        ],
    )
    .with_description("Name a relation kind and the two roles it requires")
    .with_subject("Relation")
    .with_step(
        "name",
        step(
            &["1.Relation? > 1146.is a specialization of > 2850.relation"],
            vec![FieldSourceSpec::new("Relation", FieldSource::Context)],
        )?,
    )
    .with_step("first-role", role_step("FirstRole", "4731.requires a role-1 as a")?)
    .with_step("new-first-role", role_step("FirstRole", "4731.requires a role-1 as a")?)
    .with_step("second-role", role_step("SecondRole", "4733.requires a role-2 as a")?)
    .with_step("new-second-role", role_step("SecondRole", "4733.requires a role-2 as a")?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_valid_and_complete() {
        let registry = WorkflowRegistry::with_defaults().unwrap();

        let ids: Vec<&str> = registry.definitions().into_iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["new-physical-object", "role", "new-relation"]);
        assert!(registry.dangling_branches().is_empty());

        for definition in registry.definitions() {
            assert!(definition.find_unreachable_states().is_empty(), "{}", definition.id);
            assert!(
                definition.steps.values().all(|s| !s.field_sources.is_empty()),
                "{} has a step without fields",
                definition.id
            );
        }
    }

    #[test]
    fn test_builtin_templates_parse() {
        let registry = WorkflowRegistry::with_defaults().unwrap();
        let relation = registry.require("new-relation").unwrap();

        let first = relation.step(&StateId::from("first-role")).unwrap();
        assert_eq!(first.create.triples().count(), 1);
        assert_eq!(first.create.placeholder_names(), vec!["Relation", "FirstRole"]);

        let role = registry.require("role").unwrap();
        let r = role.state(&StateId::from("R")).unwrap();
        assert!(r.history);
        assert_eq!(r.states.len(), 3);
    }

    #[test]
    fn test_every_builtin_step_template_is_kept() {
        let registry = WorkflowRegistry::with_defaults().unwrap();
        let counts = |id: &str| -> Vec<(String, usize)> {
            let definition = registry.require(id).unwrap();
            definition
                .steps
                .iter()
                .map(|(state, spec)| (state.to_string(), spec.create.lines().len()))
                .collect()
        };

        assert_eq!(
            counts("new-physical-object"),
            vec![
                ("definition".to_string(), 1),
                ("name".to_string(), 0),
                ("new-supertype".to_string(), 1),
                ("supertype".to_string(), 1),
            ]
        );
        assert_eq!(
            counts("role"),
            vec![
                ("kind".to_string(), 1),
                ("name".to_string(), 0),
                ("new-player".to_string(), 1),
                ("player".to_string(), 1),
            ]
        );
        assert_eq!(
            counts("new-relation"),
            vec![
                ("first-role".to_string(), 1),
                ("name".to_string(), 1),
                ("new-first-role".to_string(), 1),
                ("new-second-role".to_string(), 1),
                ("second-role".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_malformed_builtin_template_is_an_error() {
        assert!(matches!(
            step(&["1.Part? > 1190.has as part"], Vec::new()),
            Err(ModellingError::Pattern(_))
        ));
    }

    #[test]
    fn test_unknown_workflow() {
        let registry = WorkflowRegistry::with_defaults().unwrap();
        assert!(registry.get("nope").is_none());
        assert!(matches!(
            registry.require("nope"),
            Err(ModellingError::UnknownWorkflow { id }) if id == "nope"
        ));
    }

    #[test]
    fn test_register_rejects_invalid_definitions() {
        let mut registry = WorkflowRegistry::new();
        let broken = WorkflowDefinition::new("broken", "Broken", "ghost", vec![StateNode::leaf("a")]);

        assert!(matches!(registry.register(broken), Err(ModellingError::Definition(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_dangling_branches_reported() {
        let mut registry = WorkflowRegistry::new();
        registry.register(role().unwrap()).unwrap();

        assert_eq!(
            registry.dangling_branches(),
            vec![(
                "role".to_string(),
                StateId::from("new-player"),
                "new-physical-object".to_string()
            )]
        );
    }

    #[test]
    fn test_load_dir() {
        let dir = tempfile::tempdir().unwrap();
        let definition = serde_json::json!({
            "id": "quantity",
            "name": "Quantity",
            "initial": "name",
            "states": [
                {"id": "name", "on": {"NEXT": "unit"}},
                {"id": "unit", "on": {"NEXT": "done"}},
                {"id": "done", "final": true, "entry": {"type": "end"}}
            ],
            "steps": {
                "unit": {
                    "create": ["1.Quantity? > 5020.has as scale > 2.Unit?"],
                    "field_sources": [
                        {"field": "Quantity", "source": "context"},
                        {"field": "Unit", "source": "knowledge-graph"}
                    ]
                }
            }
        });
        std::fs::write(dir.path().join("quantity.json"), definition.to_string()).unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let mut registry = WorkflowRegistry::with_defaults().unwrap();
        assert_eq!(registry.load_dir(dir.path()).unwrap(), 1);
        assert_eq!(registry.len(), 4);

        let quantity = registry.require("quantity").unwrap();
        assert_eq!(quantity.field_sources().len(), 2);
    }

    #[test]
    fn test_load_dir_rejects_bad_patterns() {
        let dir = tempfile::tempdir().unwrap();
        let definition = serde_json::json!({
            "id": "bad",
            "name": "Bad",
            "initial": "a",
            "states": [{"id": "a"}],
            "steps": {"a": {"create": ["not a triple"]}}
        });
        std::fs::write(dir.path().join("bad.json"), definition.to_string()).unwrap();

        let mut registry = WorkflowRegistry::new();
        let err = registry.load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, ModellingError::Definition(ref msg) if msg.contains("bad.json")));
    }
}
