// API types - session commands, request bodies and the error envelope

//! Wire types shared by the REST and WebSocket handlers.
//!
//! Every mutating request is expressed as a [`SessionCommand`]. REST routes
//! build one from their path and body; WebSocket clients send one as a JSON
//! text frame:
//!
//! ```json
//! {"command": "kg_value", "key": "Supertype", "uid": 730044, "value": "physical object"}
//! ```

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::SessionSnapshot;
use crate::models::{Fact, Uid};
use crate::ModellingError;

/// One operation on a session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum SessionCommand {
    Init { workflow_id: String },
    Branch { field_id: String, workflow_id: String },
    Next,
    Prev,
    Send { event: String },
    Validate,
    Finalize,
    Pop,
    Value { key: String, value: String },
    KgValue { key: String, uid: Uid, value: String },
    State,
}

impl SessionCommand {
    /// Short name used in logs
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::Init { .. } => "init",
            SessionCommand::Branch { .. } => "branch",
            SessionCommand::Next => "next",
            SessionCommand::Prev => "prev",
            SessionCommand::Send { .. } => "send",
            SessionCommand::Validate => "validate",
            SessionCommand::Finalize => "finalize",
            SessionCommand::Pop => "pop",
            SessionCommand::Value { .. } => "value",
            SessionCommand::KgValue { .. } => "kg_value",
            SessionCommand::State => "state",
        }
    }
}

/// Body of `POST /sessions/:id/init`
#[derive(Debug, Deserialize)]
pub struct InitRequest {
    pub workflow_id: String,
}

/// Body of `POST /sessions/:id/branch`
#[derive(Debug, Deserialize)]
pub struct BranchRequest {
    pub field_id: String,
    pub workflow_id: String,
}

/// Body of `POST /sessions/:id/send`
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub event: String,
}

/// Body of `POST /sessions/:id/value`
#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    pub key: String,
    pub value: String,
}

/// Body of `POST /sessions/:id/kg-value`
#[derive(Debug, Deserialize)]
pub struct KgValueRequest {
    pub key: String,
    pub uid: Uid,
    pub value: String,
}

/// Response of `POST /sessions`
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
}

/// Result of any session command
#[derive(Debug, Clone, Serialize)]
pub struct CommandResponse {
    pub session_id: Uuid,
    pub state: SessionSnapshot,
    /// Facts as persisted by the fact store, only set by `finalize`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub committed: Option<Vec<Fact>>,
}

/// Error envelope returned by every failing route
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub message: String,

    #[serde(rename = "type")]
    pub error_type: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>, error_type: impl Into<String>) -> Self {
        ErrorResponse {
            error: ErrorDetail {
                message: message.into(),
                error_type: error_type.into(),
            },
        }
    }
}

impl ModellingError {
    /// HTTP status and envelope `type` for this error
    pub fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            ModellingError::UnknownWorkflow { .. } | ModellingError::NotFound(_) => {
                (StatusCode::NOT_FOUND, "not_found_error")
            }
            ModellingError::Validation { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
            }
            ModellingError::InvalidState(_) | ModellingError::ProvisionalUidsExhausted { .. } => {
                (StatusCode::CONFLICT, "invalid_state_error")
            }
            ModellingError::Pattern(_) | ModellingError::Definition(_) => {
                (StatusCode::BAD_REQUEST, "invalid_request_error")
            }
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        }
    }
}

impl From<&ModellingError> for ErrorResponse {
    fn from(err: &ModellingError) -> Self {
        let (_, error_type) = err.classify();
        ErrorResponse::new(err.to_string(), error_type)
    }
}

impl IntoResponse for ModellingError {
    fn into_response(self) -> Response {
        let (status, _) = self.classify();
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_format() {
        let command: SessionCommand = serde_json::from_str(
            r#"{"command": "kg_value", "key": "Supertype", "uid": 730044, "value": "physical object"}"#,
        )
        .unwrap();
        assert_eq!(
            command,
            SessionCommand::KgValue {
                key: "Supertype".to_string(),
                uid: 730044,
                value: "physical object".to_string(),
            }
        );

        let command: SessionCommand = serde_json::from_str(r#"{"command": "next"}"#).unwrap();
        assert_eq!(command, SessionCommand::Next);
        assert_eq!(command.name(), "next");
    }

    #[test]
    fn test_error_classification() {
        let missing = ModellingError::Validation {
            state: "name".to_string(),
            missing: vec!["NewConcept".to_string()],
        };
        assert_eq!(missing.classify().0, StatusCode::UNPROCESSABLE_ENTITY);

        let unknown = ModellingError::UnknownWorkflow { id: "nope".to_string() };
        assert_eq!(unknown.classify().0, StatusCode::NOT_FOUND);

        let body = ErrorResponse::from(&ModellingError::InvalidState("no active workflow".into()));
        assert_eq!(body.error.error_type, "invalid_state_error");
        assert!(body.error.message.contains("no active workflow"));
    }
}
