// REST handlers - thin adapters from routes to session commands

//! Every session route turns its path and body into a [`SessionCommand`] and
//! hands it to [`dispatch`], the one place that touches `WorkflowSession`.
//! The WebSocket handler uses the same function, so both transports behave
//! identically.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::types::{
    BranchRequest, CommandResponse, ErrorResponse, InitRequest, KgValueRequest, SendRequest,
    SessionCommand, SessionCreated, ValueRequest,
};
use super::AppState;
use crate::engine::{EntityInfo, WorkflowSession};
use crate::models::{EventId, Fact, Uid, WorkflowDefinition};
use crate::{ModellingError, Result};

/// Run `command` against session `session_id`
///
/// The session is locked only while the command runs; facts produced by
/// `finalize` are committed to the fact store after the lock is released.
/// When that commit fails the root is reopened, so the caller can retry
/// `finalize` once the store is back.
pub async fn dispatch(
    state: &AppState,
    session_id: Uuid,
    command: SessionCommand,
) -> Result<CommandResponse> {
    debug!(session = %session_id, command = command.name(), "dispatching session command");

    let (snapshot, finalized) = {
        let mut session = state
            .sessions
            .get_mut(&session_id)
            .ok_or_else(|| ModellingError::NotFound(format!("session {}", session_id)))?;
        let finalized = apply(&mut session, command)?
            .map(|facts| (session.root_id(), facts));
        (session.get_state(), finalized)
    };

    let committed = match finalized {
        Some((root, facts)) => match state.facts.commit(facts).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                error!(session = %session_id, "❌ Fact commit failed: {}", e);
                if let (Some(root), Some(mut session)) = (root, state.sessions.get_mut(&session_id)) {
                    session.reopen_root(root)?;
                }
                return Err(e);
            }
        },
        None => None,
    };

    Ok(CommandResponse {
        session_id,
        state: snapshot,
        committed,
    })
}

/// Returns the session facts when the command was `finalize`
fn apply(session: &mut WorkflowSession, command: SessionCommand) -> Result<Option<Vec<Fact>>> {
    match command {
        SessionCommand::Init { workflow_id } => {
            session.init_workflow(&workflow_id)?;
        }
        SessionCommand::Branch { field_id, workflow_id } => {
            session.branch_workflow(&field_id, &workflow_id)?;
        }
        SessionCommand::Next => {
            session.increment_workflow_step()?;
        }
        SessionCommand::Prev => {
            session.decrement_workflow_step()?;
        }
        SessionCommand::Send { event } => {
            session.send_event(&EventId::new(event))?;
        }
        SessionCommand::Validate => session.validate_workflow()?,
        SessionCommand::Finalize => return Ok(Some(session.finalize_workflow()?)),
        SessionCommand::Pop => session.pop_workflow()?,
        SessionCommand::Value { key, value } => {
            session.set_workflow_value(&key, &value)?;
        }
        SessionCommand::KgValue { key, uid, value } => {
            session.set_workflow_kg_value(&key, uid, &value)?;
        }
        SessionCommand::State => {}
    }
    Ok(None)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "guided-modelling",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// GET /workflows: every registered definition, in registration order
pub async fn list_workflows(State(state): State<AppState>) -> Json<Vec<WorkflowDefinition>> {
    Json(state.registry.definitions().into_iter().cloned().collect())
}

/// POST /sessions
pub async fn create_session(State(state): State<AppState>) -> impl IntoResponse {
    let session_id = Uuid::new_v4();
    state
        .sessions
        .insert(session_id, WorkflowSession::new(state.registry.clone()));
    info!(session = %session_id, "🆕 Created editing session");
    (StatusCode::CREATED, Json(SessionCreated { session_id }))
}

pub async fn get_state(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::State).await.map(Json)
}

pub async fn init(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<InitRequest>,
) -> Result<Json<CommandResponse>> {
    let command = SessionCommand::Init {
        workflow_id: request.workflow_id,
    };
    dispatch(&state, id, command).await.map(Json)
}

pub async fn branch(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<BranchRequest>,
) -> Result<Json<CommandResponse>> {
    let command = SessionCommand::Branch {
        field_id: request.field_id,
        workflow_id: request.workflow_id,
    };
    dispatch(&state, id, command).await.map(Json)
}

pub async fn next(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::Next).await.map(Json)
}

pub async fn prev(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::Prev).await.map(Json)
}

pub async fn send(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SendRequest>,
) -> Result<Json<CommandResponse>> {
    let command = SessionCommand::Send { event: request.event };
    dispatch(&state, id, command).await.map(Json)
}

pub async fn validate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::Validate).await.map(Json)
}

pub async fn finalize(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::Finalize).await.map(Json)
}

pub async fn pop(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommandResponse>> {
    dispatch(&state, id, SessionCommand::Pop).await.map(Json)
}

pub async fn set_value(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ValueRequest>,
) -> Result<Json<CommandResponse>> {
    let command = SessionCommand::Value {
        key: request.key,
        value: request.value,
    };
    dispatch(&state, id, command).await.map(Json)
}

pub async fn set_kg_value(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<KgValueRequest>,
) -> Result<Json<CommandResponse>> {
    let command = SessionCommand::KgValue {
        key: request.key,
        uid: request.uid,
        value: request.value,
    };
    dispatch(&state, id, command).await.map(Json)
}

/// GET /kg/:uid
pub async fn get_entity(
    State(state): State<AppState>,
    Path(uid): Path<Uid>,
) -> Result<Json<EntityInfo>> {
    state
        .graph
        .resolve(uid)
        .await?
        .map(Json)
        .ok_or_else(|| ModellingError::NotFound(format!("entity {}", uid)))
}

/// Fallback for unknown routes
pub async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new("Not found", "not_found_error")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::engine::{FactStore, WorkflowRegistry, WorkflowStatus};

    fn state_with_session() -> (AppState, Uuid) {
        let state = AppState::in_memory(Arc::new(WorkflowRegistry::with_defaults().unwrap()), 5000);
        let id = Uuid::new_v4();
        state
            .sessions
            .insert(id, WorkflowSession::new(state.registry.clone()));
        (state, id)
    }

    #[tokio::test]
    async fn test_health_check() {
        let response = health_check().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_dispatch_unknown_session() {
        let (state, _) = state_with_session();
        let err = dispatch(&state, Uuid::new_v4(), SessionCommand::State)
            .await
            .unwrap_err();
        assert!(matches!(err, ModellingError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_finalize_commits_through_fact_store() {
        let (state, id) = state_with_session();
        let commands = vec![
            SessionCommand::Init {
                workflow_id: "new-physical-object".to_string(),
            },
            SessionCommand::Value {
                key: "NewConcept".to_string(),
                value: "Widget".to_string(),
            },
            SessionCommand::Next,
            SessionCommand::KgValue {
                key: "Supertype".to_string(),
                uid: 730044,
                value: "physical object".to_string(),
            },
            SessionCommand::Validate,
        ];
        for command in commands {
            let response = dispatch(&state, id, command).await.unwrap();
            assert!(response.committed.is_none());
        }

        let response = dispatch(&state, id, SessionCommand::Finalize).await.unwrap();
        let committed = response.committed.unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].lh_object_uid, Some(5000));
        assert_eq!(committed[0].rh_object_uid, Some(730044));
        assert!(committed[0].fact_uid.is_some());
        // the session keeps its provisional view
        assert_eq!(response.state.facts[0].lh_object_uid, Some(1));
        assert_eq!(state.facts.list().await.unwrap().len(), 1);
    }

    struct OfflineFactStore;

    #[async_trait::async_trait]
    impl FactStore for OfflineFactStore {
        async fn commit(&self, _facts: Vec<Fact>) -> Result<Vec<Fact>> {
            Err(anyhow::anyhow!("fact store offline").into())
        }

        async fn list(&self) -> Result<Vec<Fact>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failed_commit_can_be_retried() {
        let (working, id) = state_with_session();
        let offline = AppState {
            facts: Arc::new(OfflineFactStore),
            ..working.clone()
        };

        for command in [
            SessionCommand::Init {
                workflow_id: "new-physical-object".to_string(),
            },
            SessionCommand::Value {
                key: "NewConcept".to_string(),
                value: "Widget".to_string(),
            },
            SessionCommand::Next,
            SessionCommand::KgValue {
                key: "Supertype".to_string(),
                uid: 730044,
                value: "physical object".to_string(),
            },
            SessionCommand::Validate,
        ] {
            dispatch(&offline, id, command).await.unwrap();
        }

        let err = dispatch(&offline, id, SessionCommand::Finalize).await.unwrap_err();
        assert!(matches!(err, ModellingError::Storage(_)));

        // the batch is still there and the root is back to PENDING
        let response = dispatch(&offline, id, SessionCommand::State).await.unwrap();
        assert_eq!(response.state.facts.len(), 1);
        assert_eq!(response.state.workflow.unwrap().status, WorkflowStatus::Pending);

        let response = dispatch(&working, id, SessionCommand::Finalize).await.unwrap();
        assert_eq!(response.committed.unwrap().len(), 1);
        assert_eq!(working.facts.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_failure_leaves_session_usable() {
        let (state, id) = state_with_session();
        dispatch(
            &state,
            id,
            SessionCommand::Init {
                workflow_id: "new-physical-object".to_string(),
            },
        )
        .await
        .unwrap();

        let err = dispatch(&state, id, SessionCommand::Validate).await.unwrap_err();
        assert!(matches!(err, ModellingError::Validation { .. }));

        let response = dispatch(&state, id, SessionCommand::State).await.unwrap();
        assert!(response.state.workflow.is_some());
    }
}
