//! Contains the data models for API requests and responses.

use serde::{Deserialize, Serialize};

use crate::web::auth::UserAccount;
use crate::web::task_store::{NewTask, TaskPriority, TaskStatus};

/// Represents a register or login request. Missing fields deserialize empty.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct AuthRequest {
    pub email: String,
    pub password: String,
}

/// Represents a login response with JWT token.
#[derive(Serialize)]
pub struct LoginResponse {
    pub message: String,
    pub token: String,
    pub user: UserAccount,
}

/// Represents a token validation response.
#[derive(Serialize)]
pub struct TokenCheckResponse {
    pub valid: bool,
}

/// Query string for `GET /api/tasks`.
#[derive(Deserialize, Default)]
pub struct ListParams {
    pub q: Option<String>,
}

/// Body of `POST /api/tasks`.
#[derive(Deserialize, Default)]
#[serde(default)]
pub struct CreateTaskRequest {
    pub title: String,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub module: Option<String>,
}

impl From<CreateTaskRequest> for NewTask {
    fn from(req: CreateTaskRequest) -> Self {
        NewTask {
            title: req.title,
            status: req.status,
            priority: req.priority,
            module: req.module,
        }
    }
}
