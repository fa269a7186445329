// Step specifications - static per-state metadata of a guided workflow

//! # Step Specs
//!
//! Each state of a workflow definition may carry a `StepSpec` describing:
//! - `match`: precondition triples (informational, shown to the modeller)
//! - `create`: fact templates compiled when the user leaves the step
//! - `field_sources`: where each field of the step gets its value from
//!
//! A field whose source includes `workflow` may be satisfied by branching
//! into a nested workflow instead of asking the user directly.

use serde::{Deserialize, Serialize};

use super::pattern::Pattern;

/// Provenance of a step field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldSource {
    /// Typed by the user; empty input means "skip"
    #[serde(rename = "free")]
    Free,
    /// Inherited from the instance context
    #[serde(rename = "context")]
    Context,
    /// Picked from the knowledge graph
    #[serde(rename = "knowledge-graph")]
    KnowledgeGraph,
    /// Produced by a nested workflow
    #[serde(rename = "workflow")]
    Workflow,
    #[serde(rename = "context|workflow")]
    ContextOrWorkflow,
    #[serde(rename = "knowledge-graph|workflow")]
    KnowledgeGraphOrWorkflow,
}

impl FieldSource {
    /// Whether an empty value is acceptable at validation time
    pub fn is_optional(&self) -> bool {
        matches!(self, FieldSource::Free)
    }

    /// Whether the field may be filled by branching into a nested workflow
    pub fn allows_workflow(&self) -> bool {
        matches!(
            self,
            FieldSource::Workflow | FieldSource::ContextOrWorkflow | FieldSource::KnowledgeGraphOrWorkflow
        )
    }
}

/// One field of a step and where it comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSourceSpec {
    pub field: String,
    pub source: FieldSource,
    /// Workflow to branch into for `workflow` sources
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
}

impl FieldSourceSpec {
    pub fn new(field: impl Into<String>, source: FieldSource) -> Self {
        FieldSourceSpec {
            field: field.into(),
            source,
            workflow_id: None,
        }
    }

    pub fn with_workflow(field: impl Into<String>, source: FieldSource, workflow_id: impl Into<String>) -> Self {
        FieldSourceSpec {
            field: field.into(),
            source,
            workflow_id: Some(workflow_id.into()),
        }
    }
}

/// Static description of one step
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StepSpec {
    #[serde(rename = "match", default)]
    pub match_patterns: Pattern,

    #[serde(default)]
    pub create: Pattern,

    #[serde(default)]
    pub field_sources: Vec<FieldSourceSpec>,
}

impl StepSpec {
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.field_sources.iter().map(|f| f.field.as_str())
    }

    pub fn field(&self, name: &str) -> Option<&FieldSourceSpec> {
        self.field_sources.iter().find(|f| f.field == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_spec_from_json() {
        let spec: StepSpec = serde_json::from_value(serde_json::json!({
            "match": ["730044.Physical Object > 1146.is a specialization of > 730000.anything"],
            "create": ["1.NewConcept? > 1146.is a specialization of > 2.Supertype?"],
            "field_sources": [
                {"field": "NewConcept", "source": "free"},
                {"field": "Supertype", "source": "knowledge-graph|workflow", "workflow_id": "new-physical-object"}
            ]
        }))
        .unwrap();

        assert_eq!(spec.match_patterns.triples().count(), 1);
        assert_eq!(spec.create.triples().count(), 1);
        assert_eq!(spec.fields().collect::<Vec<_>>(), vec!["NewConcept", "Supertype"]);

        let supertype = spec.field("Supertype").unwrap();
        assert!(supertype.source.allows_workflow());
        assert!(!supertype.source.is_optional());
        assert_eq!(supertype.workflow_id.as_deref(), Some("new-physical-object"));
        assert!(spec.field("NewConcept").unwrap().source.is_optional());
    }

    #[test]
    fn test_source_names() {
        let sources: Vec<FieldSource> = serde_json::from_value(serde_json::json!([
            "free", "context", "knowledge-graph", "workflow", "context|workflow", "knowledge-graph|workflow"
        ]))
        .unwrap();
        assert_eq!(sources.len(), 6);
        assert_eq!(sources[4], FieldSource::ContextOrWorkflow);
        assert!(serde_json::from_value::<FieldSource>(serde_json::json!("psychic")).is_err());
    }
}
