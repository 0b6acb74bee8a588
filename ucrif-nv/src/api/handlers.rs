//! Request handlers for the record API
//!
//! Every body may carry `user_id`; the scope strategy decides whether it
//! is required. `timestamp` and `hash` ride in the same body and are
//! consumed by the auth middleware before the handler runs.

use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use ucrif_common::db::{records, subrecords, SubKind};
use ucrif_common::{groups, Error};

use crate::api::ApiError;
use crate::AppState;

fn parse_anio(value: &Value) -> Result<i64, Error> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::InvalidInput("anio must be an integer".to_string())),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::InvalidInput(format!("anio is not a year: {}", s))),
        _ => Err(Error::InvalidInput(
            "anio must be a number or numeric string".to_string(),
        )),
    }
}

#[derive(Debug, Deserialize)]
pub struct SaveRecordRequest {
    pub collection: String,
    pub data: Value,
    pub doc_id: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/records/save
pub async fn save_record(
    State(state): State<AppState>,
    Json(req): Json<SaveRecordRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let id = records::save_record(
        &state.db,
        &scope,
        &req.collection,
        &req.data,
        req.doc_id.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct LoadRecordRequest {
    pub collection: String,
    pub doc_id: String,
    pub user_id: Option<String>,
}

/// POST /api/records/load
///
/// A missing record is not an error: the data field comes back null.
pub async fn load_record(
    State(state): State<AppState>,
    Json(req): Json<LoadRecordRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let data = records::load_record(&state.db, &scope, &req.collection, &req.doc_id).await?;
    Ok(Json(json!({
        "id": req.doc_id,
        "data": data,
    })))
}

#[derive(Debug, Deserialize)]
pub struct ListRecordsRequest {
    pub collection: String,
    pub group_key: Option<String>,
    pub display1: String,
    pub display2: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/records/list
pub async fn list_records(
    State(state): State<AppState>,
    Json(req): Json<ListRecordsRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());

    // The filter travels as a group key; records store the display name
    let grupo = match req.group_key.as_deref() {
        Some(key) => Some(
            groups::by_key(key)
                .ok_or_else(|| Error::InvalidInput(format!("Unknown group: {}", key)))?
                .name,
        ),
        None => None,
    };

    let options = records::list_for_select(
        &state.db,
        &scope,
        &req.collection,
        grupo,
        &req.display1,
        req.display2.as_deref(),
    )
    .await?;
    Ok(Json(json!({ "options": options })))
}

#[derive(Debug, Deserialize)]
pub struct NextCodeRequest {
    pub collection: String,
    pub grupo: String,
    pub anio: Value,
    pub user_id: Option<String>,
}

/// POST /api/codes/next
pub async fn next_code(
    State(state): State<AppState>,
    Json(req): Json<NextCodeRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let anio = parse_anio(&req.anio)?;
    let code = records::next_code(&state.db, &scope, &req.collection, &req.grupo, anio).await?;
    Ok(Json(json!({ "next_code": code })))
}

#[derive(Debug, Deserialize)]
pub struct LoadSubCollectionRequest {
    pub operation_id: String,
    pub kind: String,
    pub user_id: Option<String>,
}

/// POST /api/subrecords/load
pub async fn load_sub_collection(
    State(state): State<AppState>,
    Json(req): Json<LoadSubCollectionRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let kind: SubKind = req.kind.parse()?;
    let items = subrecords::load_sub_collection(&state.db, &scope, &req.operation_id, kind).await?;
    Ok(Json(json!({ "items": items })))
}

#[derive(Debug, Deserialize)]
pub struct AddRelatedItemRequest {
    pub operation_id: String,
    pub kind: String,
    pub data: Value,
    pub user_id: Option<String>,
}

/// POST /api/subrecords/add
pub async fn add_related_item(
    State(state): State<AppState>,
    Json(req): Json<AddRelatedItemRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let kind: SubKind = req.kind.parse()?;
    let id =
        subrecords::add_related_item(&state.db, &scope, &req.operation_id, kind, &req.data).await?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    pub task_id: String,
    pub operation_id: Option<String>,
    pub user_id: Option<String>,
}

/// POST /api/tasks/complete
pub async fn complete_task(
    State(state): State<AppState>,
    Json(req): Json<CompleteTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    subrecords::complete_pending_task(
        &state.db,
        &scope,
        &req.task_id,
        req.operation_id.as_deref(),
    )
    .await?;
    Ok(Json(json!({})))
}

#[derive(Debug, Deserialize)]
pub struct PendingTasksRequest {
    pub user_id: Option<String>,
}

/// POST /api/tasks/pending
pub async fn pending_tasks(
    State(state): State<AppState>,
    Json(req): Json<PendingTasksRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let tasks = subrecords::fetch_global_pending_tasks(&state.db, &scope).await?;
    Ok(Json(json!({ "tasks": tasks })))
}

#[derive(Debug, Deserialize)]
pub struct AddTaskRequest {
    pub descripcion: String,
    pub fecha_limite: String,
    pub user_id: Option<String>,
}

/// POST /api/tasks/add
pub async fn add_task(
    State(state): State<AppState>,
    Json(req): Json<AddTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let id =
        subrecords::add_global_pending_task(&state.db, &scope, &req.descripcion, &req.fecha_limite)
            .await?;
    Ok(Json(json!({ "id": id })))
}

#[derive(Debug, Deserialize)]
pub struct StatsRequest {
    pub from: String,
    pub to: String,
    pub user_id: Option<String>,
}

/// POST /api/stats
pub async fn stats(
    State(state): State<AppState>,
    Json(req): Json<StatsRequest>,
) -> Result<Json<Value>, ApiError> {
    let scope = state.scope_for(req.user_id.as_deref());
    let counts = records::stats_by_group(&state.db, &scope, &req.from, &req.to).await?;

    let mut map = Map::new();
    for entry in counts {
        map.insert(entry.key, Value::from(entry.count));
    }
    Ok(Json(json!({ "counts": map })))
}
