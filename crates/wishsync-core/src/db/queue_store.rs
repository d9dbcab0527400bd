//! Durable queue store implementation
//!
//! The append-only store of pending offline actions. `get_all` returns
//! actions in enqueue order; that ordering is load-bearing for replay
//! correctness and must never be changed.

use rusqlite::{params, Connection, Row};

use crate::error::{Error, Result};
use crate::models::{
    ActionId, ActionKind, ActionPayload, ActionStatus, EntityKind, EntityRef, FieldMap,
    OfflineAction,
};

/// Trait for durable queue storage operations
pub trait ActionStore {
    /// Append an action; returns the stored action with its assigned id
    fn append(
        &self,
        kind: ActionKind,
        payload: &ActionPayload,
        created_at: i64,
    ) -> Result<OfflineAction>;

    /// All stored actions in enqueue order
    fn get_all(&self) -> Result<Vec<OfflineAction>>;

    /// Remove an action by id
    fn remove(&self, id: ActionId) -> Result<()>;

    /// Update an action's replay status
    fn update_status(&self, id: ActionId, status: ActionStatus) -> Result<()>;

    /// Normalize `IN_FLIGHT` rows back to `PENDING`; returns how many
    /// rows were touched. Called once on load after a restart.
    fn reset_in_flight(&self) -> Result<usize>;
}

/// SQLite implementation of `ActionStore`
pub struct SqliteActionStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteActionStore<'a> {
    /// Create a new store over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse an action from a database row
    fn parse_action(row: &Row<'_>) -> rusqlite::Result<OfflineAction> {
        let kind_raw: String = row.get(1)?;
        let entity_kind_raw: String = row.get(2)?;
        let entity_id: String = row.get(3)?;
        let changes_raw: String = row.get(4)?;
        let pre_image_raw: Option<String> = row.get(5)?;
        let status_raw: String = row.get(7)?;

        let kind = ActionKind::parse(&kind_raw)
            .ok_or_else(|| invalid_text(1, format!("unknown action kind: {kind_raw}")))?;
        let entity_kind = parse_entity_kind(&entity_kind_raw)
            .ok_or_else(|| invalid_text(2, format!("unknown entity kind: {entity_kind_raw}")))?;
        let changes: FieldMap = serde_json::from_str(&changes_raw)
            .map_err(|error| invalid_text(4, format!("malformed changes JSON: {error}")))?;
        let pre_image: Option<FieldMap> = match pre_image_raw {
            Some(raw) => Some(
                serde_json::from_str(&raw)
                    .map_err(|error| invalid_text(5, format!("malformed pre-image JSON: {error}")))?,
            ),
            None => None,
        };
        let status = ActionStatus::parse(&status_raw)
            .ok_or_else(|| invalid_text(7, format!("unknown status: {status_raw}")))?;

        Ok(OfflineAction {
            id: ActionId::new(row.get(0)?),
            kind,
            payload: ActionPayload::new(EntityRef::new(entity_kind, entity_id), changes, pre_image),
            created_at: row.get(6)?,
            status,
        })
    }
}

fn parse_entity_kind(value: &str) -> Option<EntityKind> {
    match value {
        "item" => Some(EntityKind::Item),
        "category" => Some(EntityKind::Category),
        "wishlist" => Some(EntityKind::Wishlist),
        _ => None,
    }
}

fn entity_kind_str(kind: EntityKind) -> &'static str {
    match kind {
        EntityKind::Item => "item",
        EntityKind::Category => "category",
        EntityKind::Wishlist => "wishlist",
    }
}

fn invalid_text(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        message.into(),
    )
}

/// Map storage-full conditions onto the dedicated error so callers can
/// tell the user the action was NOT saved.
fn map_append_error(error: rusqlite::Error) -> Error {
    if let rusqlite::Error::SqliteFailure(inner, _) = &error {
        if matches!(
            inner.code,
            rusqlite::ErrorCode::DiskFull | rusqlite::ErrorCode::OutOfMemory
        ) {
            return Error::Storage(format!("queue storage is full: {error}"));
        }
    }
    Error::Database(error)
}

impl ActionStore for SqliteActionStore<'_> {
    fn append(
        &self,
        kind: ActionKind,
        payload: &ActionPayload,
        created_at: i64,
    ) -> Result<OfflineAction> {
        let changes = serde_json::to_string(&payload.changes)?;
        let pre_image = payload
            .pre_image
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO pending_actions (kind, entity_kind, entity_id, changes, pre_image, created_at, status)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    kind.as_str(),
                    entity_kind_str(payload.entity.kind),
                    payload.entity.id,
                    changes,
                    pre_image,
                    created_at,
                    ActionStatus::Pending.as_str()
                ],
            )
            .map_err(map_append_error)?;

        Ok(OfflineAction {
            id: ActionId::new(self.conn.last_insert_rowid()),
            kind,
            payload: payload.clone(),
            created_at,
            status: ActionStatus::Pending,
        })
    }

    fn get_all(&self) -> Result<Vec<OfflineAction>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, entity_kind, entity_id, changes, pre_image, created_at, status
             FROM pending_actions
             ORDER BY id ASC",
        )?;

        let actions = stmt
            .query_map([], Self::parse_action)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(actions)
    }

    fn remove(&self, id: ActionId) -> Result<()> {
        let rows = self.conn.execute(
            "DELETE FROM pending_actions WHERE id = ?",
            params![id.value()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn update_status(&self, id: ActionId, status: ActionStatus) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE pending_actions SET status = ? WHERE id = ?",
            params![status.as_str(), id.value()],
        )?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }

        Ok(())
    }

    fn reset_in_flight(&self) -> Result<usize> {
        let rows = self.conn.execute(
            "UPDATE pending_actions SET status = ? WHERE status = ?",
            params![
                ActionStatus::Pending.as_str(),
                ActionStatus::InFlight.as_str()
            ],
        )?;

        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tempfile::tempdir;

    use super::*;
    use crate::db::Database;

    fn claim_payload(item_id: &str) -> ActionPayload {
        let mut changes = FieldMap::new();
        changes.insert("claimed_by".to_string(), json!("user-1"));
        let mut pre_image = FieldMap::new();
        pre_image.insert("claimed_by".to_string(), json!(null));
        ActionPayload::new(
            EntityRef::new(EntityKind::Item, item_id),
            changes,
            Some(pre_image),
        )
    }

    #[test]
    fn test_append_and_get_all() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteActionStore::new(db.connection());

        let action = store
            .append(ActionKind::ClaimItem, &claim_payload("i-1"), 100)
            .unwrap();
        assert_eq!(action.status, ActionStatus::Pending);

        let all = store.get_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], action);
    }

    #[test]
    fn test_get_all_preserves_enqueue_order() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteActionStore::new(db.connection());

        let first = store
            .append(ActionKind::ClaimItem, &claim_payload("i-1"), 100)
            .unwrap();
        let second = store
            .append(ActionKind::UnclaimItem, &claim_payload("i-1"), 101)
            .unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[1].id, second.id);
        assert!(first.id < second.id);
    }

    #[test]
    fn test_remove() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteActionStore::new(db.connection());

        let action = store
            .append(ActionKind::ClaimItem, &claim_payload("i-1"), 100)
            .unwrap();
        store.remove(action.id).unwrap();

        assert!(store.get_all().unwrap().is_empty());
        assert!(matches!(
            store.remove(action.id),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_update_status() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteActionStore::new(db.connection());

        let action = store
            .append(ActionKind::ClaimItem, &claim_payload("i-1"), 100)
            .unwrap();
        store
            .update_status(action.id, ActionStatus::Conflicted)
            .unwrap();

        let all = store.get_all().unwrap();
        assert_eq!(all[0].status, ActionStatus::Conflicted);
    }

    #[test]
    fn test_reset_in_flight() {
        let db = Database::open_in_memory().unwrap();
        let store = SqliteActionStore::new(db.connection());

        let a = store
            .append(ActionKind::ClaimItem, &claim_payload("i-1"), 100)
            .unwrap();
        let b = store
            .append(ActionKind::ClaimItem, &claim_payload("i-2"), 101)
            .unwrap();
        store.update_status(a.id, ActionStatus::InFlight).unwrap();
        store.update_status(b.id, ActionStatus::Conflicted).unwrap();

        let touched = store.reset_in_flight().unwrap();
        assert_eq!(touched, 1);

        let all = store.get_all().unwrap();
        assert_eq!(all[0].status, ActionStatus::Pending);
        assert_eq!(all[1].status, ActionStatus::Conflicted);
    }

    #[test]
    fn test_durability_across_reopen() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("queue.db");

        let appended = {
            let db = Database::open(&path).unwrap();
            let store = SqliteActionStore::new(db.connection());
            store
                .append(ActionKind::ClaimItem, &claim_payload("i-1"), 42)
                .unwrap()
        };

        let db = Database::open(&path).unwrap();
        let store = SqliteActionStore::new(db.connection());
        let all = store.get_all().unwrap();

        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, appended.id);
        assert_eq!(all[0].payload, appended.payload);
        assert_eq!(all[0].created_at, 42);
    }
}
