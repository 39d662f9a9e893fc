//! Namespaced document storage: create, read, query, update, delete.
//!
//! Documents are JSON bodies addressed by `(app_id, user_id, collection,
//! parent_id, id)`. Queries are ordered by the document timestamp and may be
//! limited and filtered on one top-level field. Every mutation is published
//! on the [`ChangeFeed`].
use crate::journal_db::change_feed::{ChangeFeed, ChangeKind};
use crate::journal_db::schema::*;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use regex::Regex;
use rusqlite::{params, OptionalExtension, ToSql, TransactionBehavior};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

lazy_static! {
    static ref FIELD_NAME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid field regex");
}

pub struct DocumentStore {
    pool: Arc<Pool<SqliteConnectionManager>>,
    changes: ChangeFeed,
}

impl DocumentStore {
    pub fn new(pool: Arc<Pool<SqliteConnectionManager>>, changes: ChangeFeed) -> Self {
        Self { pool, changes }
    }

    fn get_conn(&self) -> anyhow::Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| anyhow::anyhow!("Failed to get connection from pool: {}", e))
    }

    fn path_of<T: DocumentModel>(parent_id: Option<&str>) -> CollectionPath {
        CollectionPath {
            collection: T::COLLECTION,
            parent_id: parent_id.map(str::to_string),
        }
    }

    pub fn changes(&self) -> &ChangeFeed {
        &self.changes
    }

    pub fn create<T: DocumentModel>(
        &self,
        ns: &Namespace,
        parent_id: Option<&str>,
        document: T,
    ) -> anyhow::Result<Stored<T>> {
        let path = Self::path_of::<T>(parent_id);
        let id = Uuid::new_v4().to_string();
        let data = serde_json::to_string(&document)?;
        let now = Utc::now().to_rfc3339();

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO documents
             (id, app_id, user_id, collection, parent_id, data, ts_millis, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                &id,
                &ns.app_id,
                &ns.user_id,
                path.collection.as_str(),
                &path.parent_id,
                data,
                document.timestamp().timestamp_millis(),
                &now,
                &now,
            ],
        )?;

        debug!("Created {} document {} under {}", path, id, ns);
        self.changes.publish(ChangeKind::Created, ns, &path, &id);
        Ok(Stored { id, data: document })
    }

    pub fn get<T: DocumentModel>(
        &self,
        ns: &Namespace,
        parent_id: Option<&str>,
        id: &str,
    ) -> anyhow::Result<Option<Stored<T>>> {
        let path = Self::path_of::<T>(parent_id);
        let conn = self.get_conn()?;
        let data: Option<String> = conn
            .query_row(
                "SELECT data FROM documents
                 WHERE id = ?1 AND app_id = ?2 AND user_id = ?3 AND collection = ?4 AND parent_id IS ?5",
                params![id, &ns.app_id, &ns.user_id, path.collection.as_str(), &path.parent_id],
                |row| row.get(0),
            )
            .optional()?;

        match data {
            Some(data) => {
                let document: T = serde_json::from_str(&data)
                    .map_err(|e| anyhow::anyhow!("Stored {} document {} is malformed: {}", path, id, e))?;
                Ok(Some(Stored { id: id.to_string(), data: document }))
            }
            None => Ok(None),
        }
    }

    /// Typed query. Documents whose body no longer matches `T` are skipped
    /// and logged rather than failing the whole list.
    pub fn list<T: DocumentModel>(
        &self,
        ns: &Namespace,
        parent_id: Option<&str>,
        query: &Query,
    ) -> anyhow::Result<Vec<Stored<T>>> {
        let path = Self::path_of::<T>(parent_id);
        let documents = self.query_raw(ns, &path, query)?;
        let mut typed = Vec::with_capacity(documents.len());

        for document in documents {
            match serde_json::from_value::<T>(Value::Object(document.data)) {
                Ok(data) => typed.push(Stored { id: document.id, data }),
                Err(e) => warn!("Skipping malformed {} document {}: {}", path, document.id, e),
            }
        }

        Ok(typed)
    }

    pub fn query_raw(
        &self,
        ns: &Namespace,
        path: &CollectionPath,
        query: &Query,
    ) -> anyhow::Result<Vec<Document>> {
        let mut sql = String::from(
            "SELECT id, data, ts_millis FROM documents
             WHERE app_id = ? AND user_id = ? AND collection = ? AND parent_id IS ?",
        );
        let mut bindings: Vec<Box<dyn ToSql>> = vec![
            Box::new(ns.app_id.clone()),
            Box::new(ns.user_id.clone()),
            Box::new(path.collection.as_str()),
            Box::new(path.parent_id.clone()),
        ];

        if let Some(filter) = &query.filter {
            if !FIELD_NAME.is_match(&filter.field) {
                return Err(anyhow::anyhow!("Invalid filter field name: {}", filter.field));
            }
            sql.push_str(" AND json_extract(data, ?) = ?");
            bindings.push(Box::new(format!("$.{}", filter.field)));
            bindings.push(json_to_sql(&filter.value)?);
        }

        let order = query.order.sql();
        sql.push_str(&format!(" ORDER BY ts_millis {}, created_at {}", order, order));

        if let Some(limit) = query.limit {
            sql.push_str(" LIMIT ?");
            bindings.push(Box::new(limit as i64));
        }

        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let binding_refs: Vec<&dyn ToSql> = bindings.iter().map(|b| b.as_ref()).collect();
        let mut rows = stmt.query(rusqlite::params_from_iter(binding_refs))?;

        let mut documents = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let data: String = row.get(1)?;
            let ts_millis: i64 = row.get(2)?;

            let data = match serde_json::from_str::<Value>(&data) {
                Ok(Value::Object(map)) => map,
                Ok(_) | Err(_) => {
                    warn!("Skipping {} document {} with non-object body", path, id);
                    continue;
                }
            };
            let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_millis).unwrap_or_else(|| {
                warn!("Document {} has out-of-range timestamp {}", id, ts_millis);
                Utc::now()
            });

            documents.push(Document { id, timestamp, data });
        }

        Ok(documents)
    }

    /// Shallow merge of `patch` into the stored body. The merged body must
    /// still deserialize as `T`. Returns `None` when the document is missing.
    pub fn update<T: DocumentModel>(
        &self,
        ns: &Namespace,
        parent_id: Option<&str>,
        id: &str,
        patch: Value,
    ) -> anyhow::Result<Option<Stored<T>>> {
        let Value::Object(patch) = patch else {
            return Err(anyhow::anyhow!("Update patch must be a JSON object"));
        };
        let path = Self::path_of::<T>(parent_id);

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing: Option<String> = tx
            .query_row(
                "SELECT data FROM documents
                 WHERE id = ?1 AND app_id = ?2 AND user_id = ?3 AND collection = ?4 AND parent_id IS ?5",
                params![id, &ns.app_id, &ns.user_id, path.collection.as_str(), &path.parent_id],
                |row| row.get(0),
            )
            .optional()?;

        let Some(existing) = existing else {
            return Ok(None);
        };

        let mut body: Value = serde_json::from_str(&existing)?;
        match body.as_object_mut() {
            Some(map) => map.extend(patch),
            None => return Err(anyhow::anyhow!("Stored {} document {} is not an object", path, id)),
        }
        let updated: T = serde_json::from_value(body)
            .map_err(|e| anyhow::anyhow!("Update would leave {} document {} malformed: {}", path, id, e))?;

        tx.execute(
            "UPDATE documents SET data = ?1, ts_millis = ?2, updated_at = ?3 WHERE id = ?4",
            params![
                serde_json::to_string(&updated)?,
                updated.timestamp().timestamp_millis(),
                Utc::now().to_rfc3339(),
                id,
            ],
        )?;
        tx.commit()?;

        debug!("Updated {} document {} under {}", path, id, ns);
        self.changes.publish(ChangeKind::Updated, ns, &path, id);
        Ok(Some(Stored { id: id.to_string(), data: updated }))
    }

    pub fn delete<T: DocumentModel>(
        &self,
        ns: &Namespace,
        parent_id: Option<&str>,
        id: &str,
    ) -> anyhow::Result<bool> {
        let path = Self::path_of::<T>(parent_id);
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM documents
             WHERE id = ?1 AND app_id = ?2 AND user_id = ?3 AND collection = ?4 AND parent_id IS ?5",
            params![id, &ns.app_id, &ns.user_id, path.collection.as_str(), &path.parent_id],
        )?;

        if deleted > 0 {
            debug!("Deleted {} document {} under {}", path, id, ns);
            self.changes.publish(ChangeKind::Deleted, ns, &path, id);
        }
        Ok(deleted > 0)
    }

    /// Write `target` into its collection and remove the top-level source
    /// document `source_id` of collection `S`, in one transaction. Returns
    /// `None` (and writes nothing) when the source does not exist.
    pub fn move_document<S: DocumentModel, T: DocumentModel>(
        &self,
        ns: &Namespace,
        source_id: &str,
        target: T,
    ) -> anyhow::Result<Option<Stored<T>>> {
        let source_path = Self::path_of::<S>(None);
        let target_path = Self::path_of::<T>(None);
        let target_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        tx.execute(
            "INSERT INTO documents
             (id, app_id, user_id, collection, parent_id, data, ts_millis, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, NULL, ?5, ?6, ?7, ?8)",
            params![
                &target_id,
                &ns.app_id,
                &ns.user_id,
                target_path.collection.as_str(),
                serde_json::to_string(&target)?,
                target.timestamp().timestamp_millis(),
                &now,
                &now,
            ],
        )?;

        let removed = tx.execute(
            "DELETE FROM documents
             WHERE id = ?1 AND app_id = ?2 AND user_id = ?3 AND collection = ?4 AND parent_id IS NULL",
            params![source_id, &ns.app_id, &ns.user_id, source_path.collection.as_str()],
        )?;

        if removed == 0 {
            // Dropping the transaction rolls back the insert.
            debug!("Move aborted: {} document {} not found under {}", source_path, source_id, ns);
            return Ok(None);
        }
        tx.commit()?;

        debug!("Moved {} {} -> {} {}", source_path, source_id, target_path, target_id);
        self.changes.publish(ChangeKind::Created, ns, &target_path, &target_id);
        self.changes.publish(ChangeKind::Deleted, ns, &source_path, source_id);
        Ok(Some(Stored { id: target_id, data: target }))
    }
}

fn json_to_sql(value: &Value) -> anyhow::Result<Box<dyn ToSql>> {
    match value {
        Value::Bool(b) => Ok(Box::new(*b)),
        Value::String(s) => Ok(Box::new(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Box::new(i)),
            None => Ok(Box::new(n.as_f64().unwrap_or_default())),
        },
        other => Err(anyhow::anyhow!("Unsupported filter value: {}", other)),
    }
}
