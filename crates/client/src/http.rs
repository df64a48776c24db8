// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! reqwest implementation of [`ControlPlane`].
//!
//! One `reqwest::Client` shared across all operations, bearer tokens from an
//! OIDC client-credentials grant cached until shortly before expiry. Every
//! remote path hangs off `/api/v1/projects/{project}/`.

use crate::api::{
    ApiError, ApiResult, ControlPlane, ExtractionPipelineCreate, ExtractionRunCreate,
    IntegrationCreate, ModelRevisionFilter, Page, RoutineRevisionFilter, RunData, RunFilter,
    TokenInfo,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sim_core::{
    Datapoint, Integration, IntegrationUpdate, LogEntry, ModelRevision, ParsingState,
    RoutineRevision, RunCallback, RunCreate, SimulationRun, Simulator, SimulatorCreate,
};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Refresh the token this long before it actually expires.
const TOKEN_EXPIRY_SLACK: Duration = Duration::from_secs(60);

/// Per-request timeout applied by the client.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// OIDC client-credentials material.
#[derive(Debug, Clone)]
pub struct OidcCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
}

/// Connection settings for the HTTP client.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Base host, e.g. `https://api.cognitedata.com`.
    pub host: String,
    pub project: String,
    pub credentials: OidcCredentials,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FilterBody<F> {
    filter: F,
    #[serde(skip_serializing_if = "Option::is_none")]
    cursor: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct ItemsBody<T> {
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct ItemsResponse<T> {
    items: Vec<T>,
}

/// Production control-plane client.
pub struct HttpControlPlane {
    config: HttpConfig,
    client: reqwest::Client,
    token: Mutex<Option<CachedToken>>,
}

impl HttpControlPlane {
    pub fn new(config: HttpConfig) -> ApiResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self { config, client, token: Mutex::new(None) })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1/projects/{}/{path}", self.config.host, self.config.project)
    }

    /// Fetch or reuse the bearer token.
    async fn bearer(&self) -> ApiResult<String> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let creds = &self.config.credentials;
        let form = [
            ("grant_type", "client_credentials".to_string()),
            ("client_id", creds.client_id.clone()),
            ("client_secret", creds.client_secret.clone()),
            ("scope", creds.scopes.join(" ")),
        ];
        let response = self
            .client
            .post(&creds.token_url)
            .form(&form)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Status { status: status.as_u16(), message });
        }
        let token: TokenResponse =
            response.json().await.map_err(|e| ApiError::Decode(e.to_string()))?;
        let ttl = Duration::from_secs(token.expires_in.unwrap_or(300));
        tracing::debug!(ttl_secs = ttl.as_secs(), "acquired control plane token");
        let expires_at = Instant::now() + ttl.saturating_sub(TOKEN_EXPIRY_SLACK);
        let access = token.access_token.clone();
        *guard = Some(CachedToken { access_token: token.access_token, expires_at });
        Ok(access)
    }

    async fn post_json<B: Serialize, R: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> ApiResult<R> {
        let token = self.bearer().await?;
        let response = self
            .client
            .post(self.url(path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .map_err(transport)?;
        decode(response).await
    }

    /// Retrieve exactly one item from a byIds-style endpoint.
    async fn one_by_external_id<R: DeserializeOwned>(
        &self,
        path: &str,
        kind: &'static str,
        external_id: &str,
    ) -> ApiResult<R> {
        let body = serde_json::json!({ "items": [{ "externalId": external_id }] });
        let mut response: ItemsResponse<R> = self.post_json(path, &body).await?;
        response
            .items
            .pop()
            .ok_or_else(|| ApiError::NotFound { kind, external_id: external_id.to_string() })
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    match err.status() {
        Some(status) => ApiError::Status { status: status.as_u16(), message: err.to_string() },
        None => ApiError::Transport(err.to_string()),
    }
}

async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> ApiResult<R> {
    let status = response.status();
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ApiError::Status { status: status.as_u16(), message });
    }
    response.json().await.map_err(|e| ApiError::Decode(e.to_string()))
}

#[async_trait]
impl ControlPlane for HttpControlPlane {
    async fn token_inspect(&self) -> ApiResult<TokenInfo> {
        // Token inspection lives at the API root, not under the project.
        let token = self.bearer().await?;
        let url = format!("{}/api/v1/token/inspect", self.config.host);
        let response =
            self.client.get(url).bearer_auth(token).send().await.map_err(transport)?;
        decode(response).await
    }

    async fn upsert_simulator(&self, simulator: SimulatorCreate) -> ApiResult<Simulator> {
        let body = ItemsBody { items: vec![simulator] };
        let mut response: ItemsResponse<Simulator> =
            self.post_json("simulators", &body).await?;
        response.items.pop().ok_or_else(|| ApiError::Decode("empty simulator upsert".into()))
    }

    async fn list_simulators(&self) -> ApiResult<Vec<Simulator>> {
        let body = FilterBody { filter: serde_json::json!({}), cursor: None, limit: None };
        let response: ItemsResponse<Simulator> =
            self.post_json("simulators/list", &body).await?;
        Ok(response.items)
    }

    async fn list_integrations(&self, simulator_external_id: &str) -> ApiResult<Vec<Integration>> {
        let body = FilterBody {
            filter: serde_json::json!({ "simulatorExternalIds": [simulator_external_id] }),
            cursor: None,
            limit: None,
        };
        let response: ItemsResponse<Integration> =
            self.post_json("simulators/integrations/list", &body).await?;
        Ok(response.items)
    }

    async fn upsert_integration(&self, create: IntegrationCreate) -> ApiResult<Integration> {
        let body = ItemsBody { items: vec![create] };
        let mut response: ItemsResponse<Integration> =
            self.post_json("simulators/integrations", &body).await?;
        response.items.pop().ok_or_else(|| ApiError::Decode("empty integration upsert".into()))
    }

    async fn update_integration(&self, id: i64, update: IntegrationUpdate) -> ApiResult<()> {
        let body = serde_json::json!({ "items": [{ "id": id, "update": update }] });
        let _: serde_json::Value =
            self.post_json("simulators/integrations/update", &body).await?;
        Ok(())
    }

    async fn upsert_extraction_pipeline(
        &self,
        create: ExtractionPipelineCreate,
    ) -> ApiResult<()> {
        let body = ItemsBody { items: vec![create] };
        let _: serde_json::Value = self.post_json("extpipes", &body).await?;
        Ok(())
    }

    async fn create_extraction_run(&self, item: ExtractionRunCreate) -> ApiResult<()> {
        let body = ItemsBody { items: vec![item] };
        let _: serde_json::Value = self.post_json("extpipes/runs", &body).await?;
        Ok(())
    }

    async fn list_model_revisions(
        &self,
        filter: ModelRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<ModelRevision>> {
        self.post_json(
            "simulators/models/revisions/list",
            &FilterBody { filter, cursor, limit: Some(limit) },
        )
        .await
    }

    async fn model_revision_by_external_id(&self, external_id: &str) -> ApiResult<ModelRevision> {
        self.one_by_external_id("simulators/models/revisions/byids", "model revision", external_id)
            .await
    }

    async fn update_parsing_status(&self, revision_id: i64, state: ParsingState) -> ApiResult<()> {
        let body = serde_json::json!({
            "items": [{ "id": revision_id, "update": { "status": state } }]
        });
        let _: serde_json::Value =
            self.post_json("simulators/models/revisions/update", &body).await?;
        Ok(())
    }

    async fn list_routine_revisions(
        &self,
        filter: RoutineRevisionFilter,
        cursor: Option<String>,
        limit: usize,
    ) -> ApiResult<Page<RoutineRevision>> {
        self.post_json(
            "simulators/routines/revisions/list",
            &FilterBody { filter, cursor, limit: Some(limit) },
        )
        .await
    }

    async fn routine_revision_by_external_id(
        &self,
        external_id: &str,
    ) -> ApiResult<RoutineRevision> {
        self.one_by_external_id(
            "simulators/routines/revisions/byids",
            "routine revision",
            external_id,
        )
        .await
    }

    async fn list_runs(&self, filter: RunFilter) -> ApiResult<Vec<SimulationRun>> {
        let response: ItemsResponse<SimulationRun> = self
            .post_json("simulators/runs/list", &FilterBody { filter, cursor: None, limit: None })
            .await?;
        Ok(response.items)
    }

    async fn create_runs(&self, items: Vec<RunCreate>) -> ApiResult<Vec<SimulationRun>> {
        let response: ItemsResponse<SimulationRun> =
            self.post_json("simulators/runs", &ItemsBody { items }).await?;
        Ok(response.items)
    }

    async fn run_by_id(&self, id: i64) -> ApiResult<SimulationRun> {
        let body = serde_json::json!({ "items": [{ "id": id }] });
        let mut response: ItemsResponse<SimulationRun> =
            self.post_json("simulators/runs/byids", &body).await?;
        response
            .items
            .pop()
            .ok_or_else(|| ApiError::NotFound { kind: "run", external_id: id.to_string() })
    }

    async fn update_run(&self, callback: RunCallback) -> ApiResult<SimulationRun> {
        let body = ItemsBody { items: vec![callback] };
        let mut response: ItemsResponse<SimulationRun> =
            self.post_json("simulators/runs/callback", &body).await?;
        response.items.pop().ok_or_else(|| ApiError::Decode("empty run callback".into()))
    }

    async fn list_run_data(&self, run_id: i64) -> ApiResult<RunData> {
        let body = serde_json::json!({ "items": [{ "runId": run_id }] });
        let mut response: ItemsResponse<RunData> =
            self.post_json("simulators/runs/data/list", &body).await?;
        Ok(response.items.pop().unwrap_or(RunData { run_id, ..RunData::default() }))
    }

    async fn file_download_link(&self, file_id: i64) -> ApiResult<String> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Link {
            download_url: String,
        }
        let body = serde_json::json!({ "items": [{ "id": file_id }] });
        let mut response: ItemsResponse<Link> =
            self.post_json("files/downloadlink", &body).await?;
        response
            .items
            .pop()
            .map(|l| l.download_url)
            .ok_or_else(|| ApiError::NotFound { kind: "file", external_id: file_id.to_string() })
    }

    async fn latest_datapoint(
        &self,
        ts_external_id: &str,
        before: i64,
    ) -> ApiResult<Option<Datapoint>> {
        #[derive(Deserialize)]
        struct Series {
            datapoints: Vec<Datapoint>,
        }
        let body = serde_json::json!({
            "items": [{ "externalId": ts_external_id, "before": before }]
        });
        let mut response: ItemsResponse<Series> =
            self.post_json("timeseries/data/latest", &body).await?;
        Ok(response.items.pop().and_then(|mut s| s.datapoints.pop()))
    }

    async fn datapoints_window(
        &self,
        ts_external_id: &str,
        start: i64,
        end: i64,
    ) -> ApiResult<Vec<Datapoint>> {
        #[derive(Deserialize)]
        struct Series {
            datapoints: Vec<Datapoint>,
        }
        let body = serde_json::json!({
            "items": [{ "externalId": ts_external_id, "start": start, "end": end }]
        });
        let mut response: ItemsResponse<Series> =
            self.post_json("timeseries/data/list", &body).await?;
        Ok(response.items.pop().map(|s| s.datapoints).unwrap_or_default())
    }

    async fn insert_datapoint(&self, ts_external_id: &str, point: Datapoint) -> ApiResult<()> {
        let body = serde_json::json!({
            "items": [{ "externalId": ts_external_id, "datapoints": [point] }]
        });
        let _: serde_json::Value = self.post_json("timeseries/data", &body).await?;
        Ok(())
    }

    async fn append_logs(&self, log_id: i64, entries: Vec<LogEntry>) -> ApiResult<()> {
        let body = serde_json::json!({
            "items": [{ "id": log_id, "update": { "data": { "add": entries } } }]
        });
        let _: serde_json::Value = self.post_json("simulators/logs/update", &body).await?;
        Ok(())
    }
}
