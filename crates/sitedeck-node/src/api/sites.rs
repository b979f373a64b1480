//! Site API endpoints.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sitedeck_core::SiteOutput;

use crate::error::ApiResult;
use crate::state::AppState;

/// Response listing every site id.
#[derive(Debug, Serialize, Deserialize)]
pub struct ListSitesResponse {
    pub ids: Vec<String>,
}

/// Request to create a new site.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateSiteRequest {
    pub id: String,
    pub content: String,
}

/// Request to replace a site's content.
#[derive(Debug, Serialize, Deserialize)]
pub struct UpdateSiteRequest {
    pub content: String,
}

/// List all sites.
pub async fn list_sites(State(state): State<AppState>) -> ApiResult<Json<ListSitesResponse>> {
    let ids = state.orchestrator.list().await?;
    Ok(Json(ListSitesResponse { ids }))
}

/// Create a site and deploy its content.
pub async fn create_site(
    State(state): State<AppState>,
    Json(req): Json<CreateSiteRequest>,
) -> ApiResult<Json<SiteOutput>> {
    let site = state.orchestrator.create(&req.id, &req.content).await?;
    Ok(Json(site))
}

/// Get a site's endpoint.
pub async fn get_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<SiteOutput>> {
    let site = state.orchestrator.get(&id).await?;
    Ok(Json(site))
}

/// Replace a site's content.
pub async fn update_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(req): Json<UpdateSiteRequest>,
) -> ApiResult<Json<SiteOutput>> {
    let site = state.orchestrator.update(&id, &req.content).await?;
    Ok(Json(site))
}

/// Destroy a site.
pub async fn delete_site(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.orchestrator.delete(&id).await?;
    Ok(StatusCode::OK)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

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

    async fn create(server: &TestServer, id: &str, content: &str) -> SiteOutput {
        let response = server
            .post("/api/sites")
            .json(&json!({ "id": id, "content": content }))
            .await;
        response.assert_status_ok();
        response.json()
    }

    #[tokio::test]
    async fn test_site_lifecycle() {
        let server = server();

        let created = create(&server, "site1", "<h1>hi</h1>").await;
        assert_eq!(created.id, "site1");
        assert!(created.url.contains(".s3-website-us-west-2."));

        let response = server.get("/api/sites/site1").await;
        response.assert_status_ok();
        assert_eq!(response.json::<SiteOutput>(), created);

        let response = server.delete("/api/sites/site1").await;
        response.assert_status_ok();
        assert!(response.text().is_empty());

        let response = server.get("/api/sites/site1").expect_failure().await;
        response.assert_status(StatusCode::NOT_FOUND);
        assert_eq!(
            response.json::<Value>(),
            json!({ "error": "stack \"site1\" does not exist" })
        );
    }

    #[tokio::test]
    async fn test_create_duplicate_is_conflict() {
        let server = server();
        create(&server, "site1", "a").await;

        let response = server
            .post("/api/sites")
            .json(&json!({ "id": "site1", "content": "b" }))
            .expect_failure()
            .await;
        response.assert_status(StatusCode::CONFLICT);
        assert_eq!(
            response.json::<Value>()["error"],
            "stack \"site1\" already exists"
        );
    }

    #[tokio::test]
    async fn test_update_takes_id_from_path() {
        let server = server();
        let created = create(&server, "site1", "v1").await;

        let response = server
            .put("/api/sites/site1")
            .json(&UpdateSiteRequest {
                content: "v2".to_string(),
            })
            .await;
        response.assert_status_ok();
        assert_eq!(response.json::<SiteOutput>(), created);
    }

    #[tokio::test]
    async fn test_missing_site_is_not_found() {
        let server = server();

        let response = server
            .put("/api/sites/ghost")
            .json(&json!({ "content": "x" }))
            .expect_failure()
            .await;
        response.assert_status(StatusCode::NOT_FOUND);

        let response = server.delete("/api/sites/ghost").expect_failure().await;
        response.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_sites() {
        let server = server();
        create(&server, "a", "a").await;
        create(&server, "b", "b").await;
        server.delete("/api/sites/a").await.assert_status_ok();

        let response = server.get("/api/sites").await;
        response.assert_status_ok();
        assert_eq!(response.json::<ListSitesResponse>().ids, vec!["b"]);
    }

    #[tokio::test]
    async fn test_invalid_name_is_server_error() {
        let server = server();
        let response = server
            .post("/api/sites")
            .json(&json!({ "id": "has.bad/char", "content": "x" }))
            .expect_failure()
            .await;
        response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_health() {
        let server = server();
        let response = server.get("/health").await;
        response.assert_status_ok();
        assert_eq!(response.json::<Value>()["project"], "test");
    }
}
