//! Record repository: save/merge, load, sequential codes, selection lists
//!
//! Records are free-form JSON documents. Filter fields (`grupo`, `anio`,
//! `codigo`, `fecha`) are extracted into columns on every save so queries
//! never parse JSON; the payload column stays authoritative for everything
//! else.

use crate::db::models::{GroupCount, SelectOption};
use crate::groups;
use crate::scope::DocScope;
use crate::time;
use crate::{Error, Result};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

/// Reject collections that no group maps to
pub fn validate_collection(collection: &str) -> Result<()> {
    if groups::is_known_collection(collection) {
        Ok(())
    } else {
        Err(Error::InvalidInput(format!(
            "Unknown collection: {}",
            collection
        )))
    }
}

fn extract_text(data: &Value, key: &str) -> Option<String> {
    data.get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

/// Year as stored by clients: JSON number or numeric string
fn extract_year(data: &Value) -> Option<i64> {
    match data.get("anio") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn extract_code(data: &Value) -> Option<i64> {
    match data.get("codigo") {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_payload(guid: &str, payload: &str) -> Result<Value> {
    serde_json::from_str(payload)
        .map_err(|e| Error::Internal(format!("Corrupt payload for record {}: {}", guid, e)))
}

/// Save a document: insert when `doc_id` is None, shallow merge-update
/// otherwise. Returns the document id.
///
/// The merge is top-level only. A field present in `data` replaces the
/// stored field wholesale (including whole embedded arrays); fields absent
/// from `data` are preserved. Last write wins.
pub async fn save_record(
    pool: &SqlitePool,
    scope: &DocScope,
    collection: &str,
    data: &Value,
    doc_id: Option<&str>,
) -> Result<String> {
    validate_collection(collection)?;
    if !data.is_object() {
        return Err(Error::InvalidInput(
            "Record data must be a JSON object".to_string(),
        ));
    }
    let user = scope.user_for_query()?;

    match doc_id {
        Some(id) => {
            let row: Option<(String,)> = sqlx::query_as(
                "SELECT payload FROM records
                 WHERE guid = ? AND tenant_id = ? AND user_id IS ? AND collection = ?",
            )
            .bind(id)
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .fetch_optional(pool)
            .await?;

            let (existing,) = row.ok_or_else(|| {
                Error::NotFound(format!("Record {} not found in {}", id, collection))
            })?;

            let mut merged = parse_payload(id, &existing)?;
            match (merged.as_object_mut(), data.as_object()) {
                (Some(target), Some(updates)) => {
                    for (k, v) in updates {
                        target.insert(k.clone(), v.clone());
                    }
                }
                _ => merged = data.clone(),
            }

            let payload = serde_json::to_string(&merged)
                .map_err(|e| Error::Internal(format!("Serialize failed: {}", e)))?;

            sqlx::query(
                "UPDATE records
                 SET payload = ?, grupo = ?, anio = ?, codigo = ?, fecha = ?, updated_at = ?
                 WHERE guid = ? AND tenant_id = ? AND user_id IS ?",
            )
            .bind(&payload)
            .bind(extract_text(&merged, "grupo"))
            .bind(extract_year(&merged))
            .bind(extract_code(&merged))
            .bind(extract_text(&merged, "fecha"))
            .bind(time::now_rfc3339())
            .bind(id)
            .bind(&scope.tenant_id)
            .bind(user)
            .execute(pool)
            .await?;

            debug!("Updated record {} in {}", id, scope.collection_path(collection)?);
            Ok(id.to_string())
        }
        None => {
            let guid = Uuid::new_v4().to_string();
            let now = time::now_rfc3339();
            let payload = serde_json::to_string(data)
                .map_err(|e| Error::Internal(format!("Serialize failed: {}", e)))?;

            sqlx::query(
                "INSERT INTO records
                 (guid, tenant_id, user_id, collection, grupo, anio, codigo, fecha,
                  payload, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&guid)
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .bind(extract_text(data, "grupo"))
            .bind(extract_year(data))
            .bind(extract_code(data))
            .bind(extract_text(data, "fecha"))
            .bind(&payload)
            .bind(&now)
            .bind(&now)
            .execute(pool)
            .await?;

            debug!("Created record {} in {}", guid, scope.collection_path(collection)?);
            Ok(guid)
        }
    }
}

/// Load one document by id. A missing document is None, not an error.
/// The returned payload echoes server timestamps as `createdAt` and
/// `updatedAt`.
pub async fn load_record(
    pool: &SqlitePool,
    scope: &DocScope,
    collection: &str,
    doc_id: &str,
) -> Result<Option<Value>> {
    validate_collection(collection)?;
    let user = scope.user_for_query()?;

    let row: Option<(String, String, String)> = sqlx::query_as(
        "SELECT payload, created_at, updated_at FROM records
         WHERE guid = ? AND tenant_id = ? AND user_id IS ? AND collection = ?",
    )
    .bind(doc_id)
    .bind(&scope.tenant_id)
    .bind(user)
    .bind(collection)
    .fetch_optional(pool)
    .await?;

    match row {
        Some((payload, created_at, updated_at)) => {
            let mut value = parse_payload(doc_id, &payload)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("createdAt".to_string(), Value::String(created_at));
                obj.insert("updatedAt".to_string(), Value::String(updated_at));
            }
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

/// Next sequential code for (group display name, year) within a collection.
///
/// Reads the current maximum and returns max+1, or 1 when the partition is
/// empty. There is no reservation step: two callers with no intervening
/// save get the same value. Known limitation carried over from the data
/// this service inherits.
pub async fn next_code(
    pool: &SqlitePool,
    scope: &DocScope,
    collection: &str,
    grupo: &str,
    anio: i64,
) -> Result<i64> {
    validate_collection(collection)?;
    let user = scope.user_for_query()?;

    let rows: Vec<(Option<i64>,)> = sqlx::query_as(
        "SELECT codigo FROM records
         WHERE tenant_id = ? AND user_id IS ? AND collection = ? AND grupo = ? AND anio = ?",
    )
    .bind(&scope.tenant_id)
    .bind(user)
    .bind(collection)
    .bind(grupo)
    .bind(anio)
    .fetch_all(pool)
    .await?;

    let max = rows.iter().filter_map(|r| r.0).max().unwrap_or(0);
    Ok(max + 1)
}

/// Build the label for one selection entry
///
/// payload[display1] (or "Sin nombre"), then " (payload[display2])" when
/// present, prefixed "{codigo}/{anio} - " when the record carries a code,
/// truncated past 100 characters.
pub fn build_option_label(payload: &Value, display1: &str, display2: Option<&str>) -> String {
    let mut label = match payload.get(display1) {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "Sin nombre".to_string(),
    };

    if let Some(field) = display2 {
        if let Some(Value::String(s)) = payload.get(field) {
            if !s.is_empty() {
                label = format!("{} ({})", label, s);
            }
        }
    }

    if let (Some(codigo), Some(anio)) = (extract_code(payload), extract_year(payload)) {
        label = format!("{}/{} - {}", codigo, anio, label);
    }

    if label.chars().count() > 100 {
        label = label.chars().take(100).collect::<String>() + "\u{2026}";
    }

    label
}

/// List a collection for a selection dropdown, newest first
///
/// The whole matching set is fetched and sorted in memory with a lenient
/// timestamp parse, so rows imported with legacy date formats still sort.
pub async fn list_for_select(
    pool: &SqlitePool,
    scope: &DocScope,
    collection: &str,
    grupo: Option<&str>,
    display1: &str,
    display2: Option<&str>,
) -> Result<Vec<SelectOption>> {
    validate_collection(collection)?;
    let user = scope.user_for_query()?;

    let rows: Vec<(String, String, String)> = match grupo {
        Some(grupo) => {
            sqlx::query_as(
                "SELECT guid, payload, created_at FROM records
                 WHERE tenant_id = ? AND user_id IS ? AND collection = ? AND grupo = ?",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .bind(grupo)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as(
                "SELECT guid, payload, created_at FROM records
                 WHERE tenant_id = ? AND user_id IS ? AND collection = ?",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .fetch_all(pool)
            .await?
        }
    };

    let mut entries = Vec::with_capacity(rows.len());
    for (guid, payload, created_at) in rows {
        let value = parse_payload(&guid, &payload)?;
        entries.push((time::parse_timestamp_lenient(&created_at), guid, value));
    }

    // Stable sort, newest first
    entries.sort_by(|a, b| b.0.cmp(&a.0));

    Ok(entries
        .into_iter()
        .map(|(_, guid, value)| SelectOption {
            label: build_option_label(&value, display1, display2),
            id: guid,
        })
        .collect())
}

/// Per-group record counts for `fecha` within [from, to] inclusive
///
/// Groups sharing a collection (the two investigative groups both store in
/// `operations`) are told apart by the `grupo` column; groups with a
/// dedicated collection count the whole collection.
pub async fn stats_by_group(
    pool: &SqlitePool,
    scope: &DocScope,
    from: &str,
    to: &str,
) -> Result<Vec<GroupCount>> {
    let user = scope.user_for_query()?;

    let mut counts = Vec::new();
    for group in groups::GROUPS.iter() {
        let Some(collection) = group.collection else {
            continue;
        };

        let shared = groups::GROUPS
            .iter()
            .filter(|g| g.collection == Some(collection))
            .count()
            > 1;

        let count: i64 = if shared {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM records
                 WHERE tenant_id = ? AND user_id IS ? AND collection = ? AND grupo = ?
                   AND fecha >= ? AND fecha <= ?",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .bind(group.name)
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await?
        } else {
            sqlx::query_scalar(
                "SELECT COUNT(*) FROM records
                 WHERE tenant_id = ? AND user_id IS ? AND collection = ?
                   AND fecha >= ? AND fecha <= ?",
            )
            .bind(&scope.tenant_id)
            .bind(user)
            .bind(collection)
            .bind(from)
            .bind(to)
            .fetch_one(pool)
            .await?
        };

        counts.push(GroupCount {
            key: group.key.to_string(),
            count,
        });
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init::create_tables;
    use crate::scope::ScopeStrategy;
    use serde_json::json;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup() -> (SqlitePool, DocScope) {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_tables(&pool).await.unwrap();
        let scope = DocScope::new("test-app", ScopeStrategy::TenantGlobal, None);
        (pool, scope)
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrip() {
        let (pool, scope) = setup().await;

        let data = json!({
            "fecha": "2024-01-10",
            "anio": "2024",
            "descripcionBreve": "test"
        });
        let id = save_record(&pool, &scope, "grupo1_novedades", &data, None)
            .await
            .unwrap();

        let loaded = load_record(&pool, &scope, "grupo1_novedades", &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded["descripcionBreve"], "test");
        assert_eq!(loaded["fecha"], "2024-01-10");
        assert!(loaded["createdAt"].is_string());
        assert!(loaded["updatedAt"].is_string());
    }

    #[tokio::test]
    async fn test_load_missing_returns_none() {
        let (pool, scope) = setup().await;
        let loaded = load_record(&pool, &scope, "grupo1_novedades", "no-such-id")
            .await
            .unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn test_merge_preserves_absent_fields() {
        let (pool, scope) = setup().await;

        let id = save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "Op Alfa", "juzgado": "Instruccion 3", "anio": 2024}),
            None,
        )
        .await
        .unwrap();

        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "Op Alfa Bis"}),
            Some(&id),
        )
        .await
        .unwrap();

        let loaded = load_record(&pool, &scope, "operations", &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded["nombre"], "Op Alfa Bis");
        assert_eq!(loaded["juzgado"], "Instruccion 3");
        assert_eq!(loaded["anio"], 2024);
    }

    #[tokio::test]
    async fn test_merge_replaces_embedded_array_wholesale() {
        let (pool, scope) = setup().await;

        let id = save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "Op", "detenidos": [{"nombre": "A"}, {"nombre": "B"}]}),
            None,
        )
        .await
        .unwrap();

        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"detenidos": [{"nombre": "C"}]}),
            Some(&id),
        )
        .await
        .unwrap();

        let loaded = load_record(&pool, &scope, "operations", &id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(loaded["detenidos"].as_array().unwrap().len(), 1);
        assert_eq!(loaded["nombre"], "Op");
    }

    #[tokio::test]
    async fn test_update_missing_record_is_not_found() {
        let (pool, scope) = setup().await;
        let result = save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "x"}),
            Some("ghost"),
        )
        .await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unknown_collection_rejected() {
        let (pool, scope) = setup().await;
        let result = save_record(&pool, &scope, "mystery", &json!({}), None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_non_object_data_rejected() {
        let (pool, scope) = setup().await;
        let result = save_record(&pool, &scope, "operations", &json!([1, 2]), None).await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_next_code_empty_partition_is_one() {
        let (pool, scope) = setup().await;
        let code = next_code(&pool, &scope, "grupo1_novedades", "Grupo 1\u{ba} Expulsiones", 2024)
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_next_code_is_max_plus_one() {
        let (pool, scope) = setup().await;
        let grupo = "Grupo 1\u{ba} Expulsiones";

        for codigo in [1, 5, 3] {
            save_record(
                &pool,
                &scope,
                "grupo1_novedades",
                &json!({"grupo": grupo, "anio": 2024, "codigo": codigo}),
                None,
            )
            .await
            .unwrap();
        }

        let code = next_code(&pool, &scope, "grupo1_novedades", grupo, 2024)
            .await
            .unwrap();
        assert_eq!(code, 6);
    }

    #[tokio::test]
    async fn test_next_code_partitions_by_year() {
        let (pool, scope) = setup().await;
        let grupo = "Grupo 1\u{ba} Expulsiones";

        save_record(
            &pool,
            &scope,
            "grupo1_novedades",
            &json!({"grupo": grupo, "anio": "2023", "codigo": 17}),
            None,
        )
        .await
        .unwrap();

        let code = next_code(&pool, &scope, "grupo1_novedades", grupo, 2024)
            .await
            .unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_two_sequential_next_code_calls_agree() {
        let (pool, scope) = setup().await;
        let grupo = "Grupo 1\u{ba} Expulsiones";

        save_record(
            &pool,
            &scope,
            "grupo1_novedades",
            &json!({"grupo": grupo, "anio": 2024, "codigo": 2}),
            None,
        )
        .await
        .unwrap();

        let first = next_code(&pool, &scope, "grupo1_novedades", grupo, 2024)
            .await
            .unwrap();
        let second = next_code(&pool, &scope, "grupo1_novedades", grupo, 2024)
            .await
            .unwrap();
        // No reservation step: both observers see the same maximum
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_per_user_scope_isolates_records() {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_tables(&pool).await.unwrap();

        let alice = DocScope::new("test-app", ScopeStrategy::PerUser, Some("alice"));
        let bob = DocScope::new("test-app", ScopeStrategy::PerUser, Some("bob"));

        let id = save_record(&pool, &alice, "operations", &json!({"nombre": "x"}), None)
            .await
            .unwrap();

        assert!(load_record(&pool, &alice, "operations", &id)
            .await
            .unwrap()
            .is_some());
        assert!(load_record(&pool, &bob, "operations", &id)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_per_user_scope_without_user_rejected() {
        let (pool, _) = setup().await;
        let scope = DocScope::new("test-app", ScopeStrategy::PerUser, None);
        let result = save_record(&pool, &scope, "operations", &json!({}), None).await;
        assert!(matches!(result, Err(Error::Unauthenticated)));
    }

    #[test]
    fn test_label_basic() {
        let payload = json!({"nombre": "Operacion Faro"});
        assert_eq!(
            build_option_label(&payload, "nombre", None),
            "Operacion Faro"
        );
    }

    #[test]
    fn test_label_missing_field_is_sin_nombre() {
        let payload = json!({"otro": "x"});
        assert_eq!(build_option_label(&payload, "nombre", None), "Sin nombre");
    }

    #[test]
    fn test_label_with_secondary_field() {
        let payload = json!({"nombre": "Operacion Faro", "juzgado": "Instruccion 3"});
        assert_eq!(
            build_option_label(&payload, "nombre", Some("juzgado")),
            "Operacion Faro (Instruccion 3)"
        );
    }

    #[test]
    fn test_label_code_prefix() {
        let payload = json!({"nombre": "Faro", "codigo": 7, "anio": "2024"});
        assert_eq!(
            build_option_label(&payload, "nombre", None),
            "7/2024 - Faro"
        );
    }

    #[test]
    fn test_label_truncates_past_100_chars() {
        let long = "x".repeat(150);
        let payload = json!({ "nombre": long });
        let label = build_option_label(&payload, "nombre", None);
        assert_eq!(label.chars().count(), 101);
        assert!(label.ends_with('\u{2026}'));
    }

    #[tokio::test]
    async fn test_list_sorted_newest_first() {
        let (pool, scope) = setup().await;

        let first = save_record(&pool, &scope, "operations", &json!({"nombre": "old"}), None)
            .await
            .unwrap();
        let second = save_record(&pool, &scope, "operations", &json!({"nombre": "new"}), None)
            .await
            .unwrap();

        // Force distinct creation times
        sqlx::query("UPDATE records SET created_at = '2023-01-01T00:00:00Z' WHERE guid = ?")
            .bind(&first)
            .execute(&pool)
            .await
            .unwrap();
        sqlx::query("UPDATE records SET created_at = '2024-01-01T00:00:00Z' WHERE guid = ?")
            .bind(&second)
            .execute(&pool)
            .await
            .unwrap();

        let options = list_for_select(&pool, &scope, "operations", None, "nombre", None)
            .await
            .unwrap();
        assert_eq!(options.len(), 2);
        assert_eq!(options[0].label, "new");
        assert_eq!(options[1].label, "old");
    }

    #[tokio::test]
    async fn test_list_filters_by_group() {
        let (pool, scope) = setup().await;

        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "a", "grupo": "Grupo 2\u{ba} Investigaci\u{f3}n"}),
            None,
        )
        .await
        .unwrap();
        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"nombre": "b", "grupo": "Grupo 3\u{ba} Investigaci\u{f3}n"}),
            None,
        )
        .await
        .unwrap();

        let options = list_for_select(
            &pool,
            &scope,
            "operations",
            Some("Grupo 2\u{ba} Investigaci\u{f3}n"),
            "nombre",
            None,
        )
        .await
        .unwrap();
        assert_eq!(options.len(), 1);
        assert_eq!(options[0].label, "a");
    }

    #[tokio::test]
    async fn test_stats_respect_date_window() {
        let (pool, scope) = setup().await;

        save_record(
            &pool,
            &scope,
            "grupo1_novedades",
            &json!({"fecha": "2024-03-05", "descripcionBreve": "in"}),
            None,
        )
        .await
        .unwrap();
        save_record(
            &pool,
            &scope,
            "grupo1_novedades",
            &json!({"fecha": "2024-06-01", "descripcionBreve": "out"}),
            None,
        )
        .await
        .unwrap();

        let counts = stats_by_group(&pool, &scope, "2024-03-01", "2024-03-31")
            .await
            .unwrap();
        let grupo1 = counts.iter().find(|c| c.key == "grupo1").unwrap();
        assert_eq!(grupo1.count, 1);
    }

    #[tokio::test]
    async fn test_stats_split_shared_collection_by_group() {
        let (pool, scope) = setup().await;

        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"fecha": "2024-03-05", "grupo": "Grupo 2\u{ba} Investigaci\u{f3}n"}),
            None,
        )
        .await
        .unwrap();
        save_record(
            &pool,
            &scope,
            "operations",
            &json!({"fecha": "2024-03-06", "grupo": "Grupo 3\u{ba} Investigaci\u{f3}n"}),
            None,
        )
        .await
        .unwrap();

        let counts = stats_by_group(&pool, &scope, "2024-03-01", "2024-03-31")
            .await
            .unwrap();
        let grupo2 = counts.iter().find(|c| c.key == "grupo2").unwrap();
        let grupo3 = counts.iter().find(|c| c.key == "grupo3").unwrap();
        assert_eq!(grupo2.count, 1);
        assert_eq!(grupo3.count, 1);
    }
}
