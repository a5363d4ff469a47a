//! Page endpoints: thin typed mappings onto the page manager.

use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use super::ServeState;
use crate::config::{DEFAULT_CREATE_TIMEOUT_MS, DEFAULT_NAVIGATE_TIMEOUT_MS};
use crate::errors::ControlError;
use crate::events::PageInfo;
use crate::manager::{HealthInfo, StructureInfo};

pub async fn health(State(state): State<ServeState>) -> Json<HealthInfo> {
    Json(state.manager.health())
}

pub async fn list(State(state): State<ServeState>) -> Json<Vec<PageInfo>> {
    Json(state.manager.list_pages())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageBody {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_create_timeout")]
    pub timeout: u64,
    #[serde(default = "default_true")]
    pub record_actions: bool,
}

fn default_create_timeout() -> u64 {
    DEFAULT_CREATE_TIMEOUT_MS
}

fn default_navigate_timeout() -> u64 {
    DEFAULT_NAVIGATE_TIMEOUT_MS
}

fn default_true() -> bool {
    true
}

pub async fn create(
    State(state): State<ServeState>,
    Json(body): Json<CreatePageBody>,
) -> Result<Json<PageInfo>, ControlError> {
    let manager = state.manager.clone();
    let info = super::run_detached(async move {
        manager
            .create_page(
                body.name,
                body.url,
                body.description,
                body.timeout,
                body.record_actions,
            )
            .await
    })
    .await?;
    Ok(Json(info))
}

pub async fn detail(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<Json<PageInfo>, ControlError> {
    Ok(Json(state.manager.page_info(&id).await?))
}

pub async fn close(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move { manager.close_page(&id).await }).await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigateBody {
    pub url: String,
    #[serde(default = "default_navigate_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn navigate(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<NavigateBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    let url = super::run_detached(async move {
        manager
            .navigate(&id, &body.url, body.timeout, body.description)
            .await
    })
    .await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

#[derive(Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionBody {
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn navigate_back(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    body: Option<Json<DescriptionBody>>,
) -> Result<Json<Value>, ControlError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let manager = state.manager.clone();
    let url =
        super::run_detached(async move { manager.navigate_back(&id, body.description).await })
            .await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

pub async fn navigate_forward(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    body: Option<Json<DescriptionBody>>,
) -> Result<Json<Value>, ControlError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let manager = state.manager.clone();
    let url =
        super::run_detached(async move { manager.navigate_forward(&id, body.description).await })
            .await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

#[derive(Deserialize)]
pub struct ReloadBody {
    #[serde(default = "default_navigate_timeout")]
    pub timeout: u64,
}

impl Default for ReloadBody {
    fn default() -> Self {
        Self {
            timeout: default_navigate_timeout(),
        }
    }
}

pub async fn reload(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    body: Option<Json<ReloadBody>>,
) -> Result<Json<Value>, ControlError> {
    let body = body.map(|Json(body)| body).unwrap_or_default();
    let manager = state.manager.clone();
    let url = super::run_detached(async move { manager.reload(&id, body.timeout).await }).await?;
    Ok(Json(json!({ "success": true, "url": url })))
}

#[derive(Deserialize)]
pub struct StructureQuery {
    #[serde(default)]
    pub selector: Option<String>,
}

pub async fn structure(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Query(query): Query<StructureQuery>,
) -> Result<Json<StructureInfo>, ControlError> {
    Ok(Json(
        state
            .manager
            .structure(&id, query.selector.as_deref())
            .await?,
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActXPathBody {
    pub xpath: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn act_xpath(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<ActXPathBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move {
        manager
            .act_xpath(&id, body.xpath, &body.method, body.args, body.description)
            .await
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActIdBody {
    pub encoded_id: String,
    pub method: String,
    #[serde(default)]
    pub args: Vec<Value>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn act_id(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<ActIdBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move {
        manager
            .act_encoded(
                &id,
                body.encoded_id,
                &body.method,
                body.args,
                body.description,
            )
            .await
    })
    .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct WaitBody {
    pub timeout: u64,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn wait(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<WaitBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move { manager.wait(&id, body.timeout, body.description).await })
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Deserialize)]
pub struct ConditionBody {
    pub pattern: String,
    #[serde(default)]
    pub flags: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn condition(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<ConditionBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    let matched = super::run_detached(async move {
        manager
            .condition(&id, &body.pattern, body.flags.as_deref(), body.description)
            .await
    })
    .await?;
    Ok(Json(json!({ "matched": matched })))
}

pub async fn screenshot(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ControlError> {
    let bytes = state.manager.screenshot(&id).await?;
    Ok(([(header::CONTENT_TYPE, "image/png")], bytes))
}

pub async fn xpath(
    State(state): State<ServeState>,
    Path((id, encoded_id)): Path<(String, String)>,
) -> Result<Json<Value>, ControlError> {
    let xpath = state.manager.xpath_for(&id, &encoded_id)?;
    Ok(Json(json!({ "xpath": xpath })))
}

#[derive(Deserialize)]
pub struct SelectorBody {
    pub selector: String,
}

pub async fn get_list_html(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<SelectorBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    let (list_file, count) =
        super::run_detached(async move { manager.get_list_html(&id, &body.selector).await })
            .await?;
    Ok(Json(
        json!({ "success": true, "listFile": list_file, "count": count }),
    ))
}

pub async fn get_list_html_by_parent(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<SelectorBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    let (list_file, count) = super::run_detached(async move {
        manager.get_list_html_by_parent(&id, &body.selector).await
    })
    .await?;
    Ok(Json(
        json!({ "success": true, "listFile": list_file, "count": count }),
    ))
}

pub async fn get_element_html(
    State(state): State<ServeState>,
    Path(id): Path<String>,
    Json(body): Json<SelectorBody>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    let element_file =
        super::run_detached(async move { manager.get_element_html(&id, &body.selector).await })
            .await?;
    Ok(Json(json!({ "success": true, "elementFile": element_file })))
}

pub async fn delete_action(
    State(state): State<ServeState>,
    Path((id, idx)): Path<(String, usize)>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move { manager.delete_action(&id, idx).await }).await?;
    Ok(Json(json!({ "success": true })))
}

pub async fn delete_records(
    State(state): State<ServeState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ControlError> {
    let manager = state.manager.clone();
    super::run_detached(async move { manager.delete_records(&id).await }).await?;
    Ok(Json(json!({ "success": true })))
}
