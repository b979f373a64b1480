//! Stack summary endpoint.

use axum::{extract::State, Json};
use sitedeck_core::StackSummary;

use crate::error::ApiResult;
use crate::state::AppState;

/// List stack summaries, most recently updated first.
pub async fn list_stacks(State(state): State<AppState>) -> ApiResult<Json<Vec<StackSummary>>> {
    let stacks = state.orchestrator.summaries().await?;
    Ok(Json(stacks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::http::StatusCode;
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use sitedeck_workspace::LocalWorkspace;

    use crate::orchestrator::Orchestrator;

    fn server() -> TestServer {
        let orchestrator =
            Orchestrator::new(Arc::new(LocalWorkspace::new()), "test", "us-west-2");
        TestServer::new(crate::create_router(AppState::new(orchestrator)))
            .expect("Failed to create test server")
    }

    #[tokio::test]
    async fn test_list_stacks_reports_summaries() {
        let server = server();
        for id in ["a", "b"] {
            server
                .post("/api/sites")
                .json(&json!({ "id": id, "content": id }))
                .await
                .assert_status_ok();
        }
        server
            .put("/api/sites/a")
            .json(&json!({ "content": "a2" }))
            .await
            .assert_status_ok();

        let response = server.get("/api/stacks").await;
        response.assert_status_ok();
        let stacks: Vec<Value> = response.json();

        assert_eq!(stacks.len(), 2);
        assert_eq!(stacks[0]["name"], "a");
        assert_eq!(stacks[0]["status"], "active");
        assert_eq!(stacks[0]["resourceCount"], 3);
        assert!(stacks[0]["lastUpdate"].is_string());
        assert_eq!(stacks[1]["name"], "b");
    }

    #[tokio::test]
    async fn test_stack_routes_alias_site_routes() {
        let server = server();
        let created: Value = server
            .post("/api/sites")
            .json(&json!({ "id": "site1", "content": "x" }))
            .await
            .json();

        let response = server.get("/api/stacks/site1").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>(), created);

        server.delete("/api/stacks/site1").await.assert_status_ok();
        server
            .get("/api/stacks/site1")
            .expect_failure()
            .await
            .assert_status(StatusCode::NOT_FOUND);
    }
}
