//! HTTP surface for the tool-call boundary
//!
//! Routes:
//! - `GET  /health`        liveness + launcher in use
//! - `GET  /tools`         tool definitions for the model
//! - `POST /execute`       `{code, options?}` -> `SandboxResult`
//! - `POST /tools/{name}`  raw tool arguments -> `SandboxResult`

use anyhow::{Context, Result};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

use crate::sandbox::{SandboxOptions, SandboxResult};
use crate::tool::{CodeSandboxTool, ToolDefinition, ToolError};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub tool: CodeSandboxTool,
}

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    #[serde(default)]
    pub options: Option<SandboxOptions>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub launcher: String,
}

/// Errors surfaced to HTTP clients
#[derive(Debug)]
pub enum ApiError {
    Tool(ToolError),
    InvalidOptions(String),
}

impl From<ToolError> for ApiError {
    fn from(e: ToolError) -> Self {
        ApiError::Tool(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Tool(e @ ToolError::UnknownTool(_)) => (StatusCode::NOT_FOUND, e.to_string()),
            ApiError::Tool(e @ ToolError::InvalidArguments { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ApiError::InvalidOptions(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/tools/{name}", post(call_tool))
        .route("/execute", post(execute))
        .with_state(state)
}

/// Bind and serve until Ctrl-C
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        launcher: state.tool.executor().launcher_name().to_string(),
    })
}

async fn list_tools() -> Json<Vec<ToolDefinition>> {
    Json(CodeSandboxTool::definitions())
}

async fn execute(
    State(state): State<AppState>,
    Json(request): Json<ExecuteRequest>,
) -> Result<Json<SandboxResult>, ApiError> {
    if let Some(options) = &request.options {
        if options.timeout_ms == Some(0) {
            return Err(ApiError::InvalidOptions(
                "timeoutMs must be a positive integer".to_string(),
            ));
        }
        // Extra engine arguments are operator configuration, never request input
        if !options.extra_constraints.is_empty() {
            return Err(ApiError::InvalidOptions(
                "extraConstraints cannot be set per request".to_string(),
            ));
        }
    }

    let result = state.tool.execute(&request.code, request.options).await;
    Ok(Json(result))
}

async fn call_tool(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Json(arguments): Json<Value>,
) -> Result<Json<SandboxResult>, ApiError> {
    let result = state.tool.call(&name, arguments).await?;
    Ok(Json(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExecutorSettings, SandboxExecutor};
    use crate::runner::testing::ShellLauncher;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    fn test_app() -> Router {
        let executor =
            SandboxExecutor::new(Arc::new(ShellLauncher::new()), ExecutorSettings::default());
        router(AppState {
            tool: CodeSandboxTool::new(executor),
        })
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json(response: Response) -> Value {
        let body = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let response = test_app()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json, json!({ "status": "ok", "launcher": "shell" }));
    }

    #[tokio::test]
    async fn test_list_tools() {
        let response = test_app()
            .oneshot(Request::get("/tools").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json[0]["name"], "run_typescript_javascript");
    }

    #[tokio::test]
    async fn test_execute_returns_result() {
        let response = test_app()
            .oneshot(post_json(
                "/execute",
                json!({ "code": "echo hi; exit 2", "options": { "timeoutMs": 2000 } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(
            json,
            json!({ "stdout": "hi\n", "stderr": "", "exitCode": 2, "timedOut": false })
        );
    }

    #[tokio::test]
    async fn test_execute_rejects_zero_timeout() {
        let response = test_app()
            .oneshot(post_json(
                "/execute",
                json!({ "code": "true", "options": { "timeoutMs": 0 } }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_execute_rejects_extra_constraints() {
        let response = test_app()
            .oneshot(post_json(
                "/execute",
                json!({
                    "code": "id -u",
                    "options": { "extraConstraints": ["--user", "0:0", "-v", "/:/host:rw"] }
                }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        let json = body_json(response).await;
        assert_eq!(json["error"], "extraConstraints cannot be set per request");
    }

    #[tokio::test]
    async fn test_call_tool_by_name() {
        let response = test_app()
            .oneshot(post_json(
                "/tools/run_typescript_javascript",
                json!({ "code": "echo 2" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["stdout"], "2\n");
        assert_eq!(json["timedOut"], false);
    }

    #[tokio::test]
    async fn test_call_unknown_tool_is_404() {
        let response = test_app()
            .oneshot(post_json("/tools/roll_dice", json!({})))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let json = body_json(response).await;
        assert_eq!(json["error"], "unknown tool: roll_dice");
    }

    #[tokio::test]
    async fn test_call_tool_bad_arguments_is_422() {
        let response = test_app()
            .oneshot(post_json(
                "/tools/run_typescript_javascript",
                json!({ "code": 42 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
