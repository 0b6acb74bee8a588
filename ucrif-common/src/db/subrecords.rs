//! Child collections of operation records
//!
//! Chronology events and pending tasks have row identity of their own and
//! are written immediately, independent of parent saves. Pending tasks
//! with no operation back-reference are the tenant-wide task list.

use crate::scope::DocScope;
use crate::time;
use crate::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::debug;
use uuid::Uuid;

pub const ESTADO_PENDIENTE: &str = "Pendiente";
pub const ESTADO_COMPLETADO: &str = "Completado";

/// The two child collections an operation carries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubKind {
    Chronology,
    PendingTasks,
}

impl FromStr for SubKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chronology" => Ok(SubKind::Chronology),
            "pendingTasks" => Ok(SubKind::PendingTasks),
            other => Err(Error::InvalidInput(format!(
                "Unknown sub-collection: {}",
                other
            ))),
        }
    }
}

async fn operation_exists(
    pool: &SqlitePool,
    scope: &DocScope,
    user: Option<&str>,
    operation_id: &str,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        "SELECT 1 FROM records
         WHERE guid = ? AND tenant_id = ? AND user_id IS ? AND collection = 'operations'",
    )
    .bind(operation_id)
    .bind(&scope.tenant_id)
    .bind(user)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

fn text_field(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn parse_payload(guid: &str, payload: &str) -> Result<Value> {
    serde_json::from_str(payload)
        .map_err(|e| Error::Internal(format!("Corrupt payload for sub-record {}: {}", guid, e)))
}

/// Add one item to an operation's child collection, written immediately.
/// The parent operation must already be saved.
pub async fn add_related_item(
    pool: &SqlitePool,
    scope: &DocScope,
    operation_id: &str,
    kind: SubKind,
    data: &Value,
) -> Result<String> {
    if !data.is_object() {
        return Err(Error::InvalidInput(
            "Sub-record data must be a JSON object".to_string(),
        ));
    }
    let user = scope.user_for_query()?;

    if !operation_exists(pool, scope, user, operation_id).await? {
        return Err(Error::InvalidInput(
            "Operation must be saved before adding related items".to_string(),
        ));
    }

    let guid = Uuid::new_v4().to_string();
    let now = time::now_rfc3339();
    let payload = serde_json::to_string(data)
        .map_err(|e| Error::Internal(format!("Serialize failed: {}", e)))?;

    match kind {
        SubKind::Chronology => {
            sqlx::query(
                "INSERT INTO chronology
                 (guid, tenant_id, user_id, operation_id, fecha, hora, payload, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&guid)
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(operation_id)
            .bind(text_field(data, "fecha"))
            .bind(text_field(data, "hora"))
            .bind(&payload)
            .bind(&now)
            .execute(pool)
            .await?;
        }
        SubKind::PendingTasks => {
            let estado = text_field(data, "estado").unwrap_or_else(|| ESTADO_PENDIENTE.to_string());
            sqlx::query(
                "INSERT INTO pending_tasks
                 (guid, tenant_id, user_id, operation_id, descripcion, fecha_limite, estado,
                  payload, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&guid)
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(operation_id)
            .bind(text_field(data, "descripcion"))
            .bind(text_field(data, "fechaLimite"))
            .bind(&estado)
            .bind(&payload)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;
        }
    }

    debug!("Added {:?} item {} to operation {}", kind, guid, operation_id);
    Ok(guid)
}

/// Load an operation's child collection in its fixed presentation order:
/// chronology by (fecha, hora) ascending, pending tasks by deadline
/// ascending.
pub async fn load_sub_collection(
    pool: &SqlitePool,
    scope: &DocScope,
    operation_id: &str,
    kind: SubKind,
) -> Result<Vec<Value>> {
    let user = scope.user_for_query()?;

    match kind {
        SubKind::Chronology => {
            let rows: Vec<(String, String, String)> = sqlx::query_as(
                "SELECT guid, payload, created_at FROM chronology
                 WHERE tenant_id = ? AND user_id IS ? AND operation_id = ?
                 ORDER BY fecha ASC, hora ASC",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(operation_id)
            .fetch_all(pool)
            .await?;

            rows.into_iter()
                .map(|(guid, payload, created_at)| {
                    let mut value = parse_payload(&guid, &payload)?;
                    if let Some(obj) = value.as_object_mut() {
                        obj.insert("id".to_string(), Value::String(guid));
                        obj.insert("createdAt".to_string(), Value::String(created_at));
                    }
                    Ok(value)
                })
                .collect()
        }
        SubKind::PendingTasks => {
            let rows: Vec<(String, String, String, String)> = sqlx::query_as(
                "SELECT guid, payload, estado, created_at FROM pending_tasks
                 WHERE tenant_id = ? AND user_id IS ? AND operation_id = ?
                 ORDER BY fecha_limite ASC",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(operation_id)
            .fetch_all(pool)
            .await?;

            rows.into_iter()
                .map(|(guid, payload, estado, created_at)| {
                    let mut value = parse_payload(&guid, &payload)?;
                    if let Some(obj) = value.as_object_mut() {
                        obj.insert("id".to_string(), Value::String(guid));
                        // The column is authoritative after completions
                        obj.insert("estado".to_string(), Value::String(estado));
                        obj.insert("createdAt".to_string(), Value::String(created_at));
                    }
                    Ok(value)
                })
                .collect()
        }
    }
}

/// Mark a pending task Completado, touching only the status field.
///
/// Two addressing paths: operation-scoped (task id plus operation id) and
/// global (task id alone, operation back-reference must be absent).
/// Completing an already completed task is a no-op update.
pub async fn complete_pending_task(
    pool: &SqlitePool,
    scope: &DocScope,
    task_id: &str,
    operation_id: Option<&str>,
) -> Result<()> {
    let user = scope.user_for_query()?;
    let now = time::now_rfc3339();

    let result = match operation_id {
        Some(op_id) => {
            sqlx::query(
                "UPDATE pending_tasks SET estado = ?, updated_at = ?
                 WHERE guid = ? AND tenant_id = ? AND user_id IS ? AND operation_id = ?",
            )
            .bind(ESTADO_COMPLETADO)
            .bind(&now)
            .bind(task_id)
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(op_id)
            .execute(pool)
            .await?
        }
        None => {
            sqlx::query(
                "UPDATE pending_tasks SET estado = ?, updated_at = ?
                 WHERE guid = ? AND tenant_id = ? AND user_id IS ? AND operation_id IS NULL",
            )
            .bind(ESTADO_COMPLETADO)
            .bind(&now)
            .bind(task_id)
            .bind(&scope.tenant_id)
            .bind(user)
            .execute(pool)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!("Task {} not found", task_id)));
    }

    debug!("Completed task {}", task_id);
    Ok(())
}

/// All global tasks still Pendiente, earliest deadline first
pub async fn fetch_global_pending_tasks(
    pool: &SqlitePool,
    scope: &DocScope,
) -> Result<Vec<Value>> {
    let user = scope.user_for_query()?;

    let rows: Vec<(String, String, String)> = sqlx::query_as(
        "SELECT guid, payload, created_at FROM pending_tasks
         WHERE tenant_id = ? AND user_id IS ? AND operation_id IS NULL AND estado = ?
         ORDER BY fecha_limite ASC",
    )
    .bind(&scope.tenant_id)
    .bind(user)
    .bind(ESTADO_PENDIENTE)
    .fetch_all(pool)
    .await?;

    rows.into_iter()
        .map(|(guid, payload, created_at)| {
            let mut value = parse_payload(&guid, &payload)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("id".to_string(), Value::String(guid));
                obj.insert(
                    "estado".to_string(),
                    Value::String(ESTADO_PENDIENTE.to_string()),
                );
                obj.insert("createdAt".to_string(), Value::String(created_at));
            }
            Ok(value)
        })
        .collect()
}

/// Create a global pending task (no operation back-reference)
pub async fn add_global_pending_task(
    pool: &SqlitePool,
    scope: &DocScope,
    descripcion: &str,
    fecha_limite: &str,
) -> Result<String> {
    if descripcion.trim().is_empty() {
        return Err(Error::InvalidInput(
            "Task description must not be empty".to_string(),
        ));
    }
    let user = scope.user_for_query()?;

    let guid = Uuid::new_v4().to_string();
    let now = time::now_rfc3339();
    let payload = serde_json::to_string(&serde_json::json!({
        "descripcion": descripcion,
        "fechaLimite": fecha_limite,
    }))
    .map_err(|e| Error::Internal(format!("Serialize failed: {}", e)))?;

    sqlx::query(
        "INSERT INTO pending_tasks
         (guid, tenant_id, user_id, operation_id, descripcion, fecha_limite, estado,
          payload, created_at, updated_at)
         VALUES (?, ?, ?, NULL, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&guid)
    .bind(&scope.tenant_id)
    .bind(user)
    .bind(descripcion)
    .bind(fecha_limite)
    .bind(ESTADO_PENDIENTE)
    .bind(&payload)
    .bind(&now)
    .bind(&now)
    .execute(pool)
    .await?;

    debug!("Added global pending task {}", guid);
    Ok(guid)
}

/// Load one pending task by id regardless of scope path
pub async fn load_pending_task(
    pool: &SqlitePool,
    scope: &DocScope,
    task_id: &str,
) -> Result<Option<Value>> {
    let user = scope.user_for_query()?;

    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT payload, estado, created_at FROM pending_tasks
         WHERE guid = ? AND tenant_id = ? AND user_id IS ?",
    )
    .bind(task_id)
    .bind(&scope.tenant_id)
    .bind(user)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((payload, estado, created_at)) => {
            let mut value = parse_payload(task_id, &payload)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("id".to_string(), Value::String(task_id.to_string()));
                obj.insert("estado".to_string(), Value::String(estado));
                obj.insert("createdAt".to_string(), Value::String(created_at));
            }
            Ok(Some(value))
        }
        None => Ok(None),
    }
}
