//! Dashboard users

use crate::models::{Role, User};
use crate::store::{Database, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use rusqlite::{params, OptionalExtension, Row};

impl ToSql for Role {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for Role {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        text.parse::<Role>().map_err(|e| FromSqlError::Other(e.into()))
    }
}

/// Fields a super admin may change on another user
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub username: Option<String>,
    pub hashed_password: Option<String>,
    pub role: Option<Role>,
    pub is_active: Option<bool>,
}

const USER_COLUMNS: &str = "id, username, hashed_password, role, is_active, created_at, created_by";

fn row_to_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        hashed_password: row.get(2)?,
        role: row.get(3)?,
        is_active: row.get(4)?,
        created_at: row.get(5)?,
        created_by: row.get(6)?,
    })
}

impl Database {
    pub fn insert_user(
        &self,
        username: &str,
        hashed_password: &str,
        role: Role,
        created_by: Option<i64>,
        at: DateTime<Utc>,
    ) -> StoreResult<User> {
        let id = {
            let conn = self.conn();
            conn.execute(
                "INSERT INTO users (username, hashed_password, role, is_active, created_at, updated_at, created_by)
                 VALUES (?1, ?2, ?3, 1, ?4, ?4, ?5)",
                params![username, hashed_password, role, at, created_by],
            )?;
            conn.last_insert_rowid()
        };
        self.user_by_id(id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
    }

    pub fn user_by_id(&self, id: i64) -> StoreResult<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM users WHERE id = ?1", USER_COLUMNS),
                params![id],
                row_to_user,
            )
            .optional()
    }

    pub fn user_by_username(&self, username: &str) -> StoreResult<Option<User>> {
        self.conn()
            .query_row(
                &format!("SELECT {} FROM users WHERE username = ?1", USER_COLUMNS),
                params![username],
                row_to_user,
            )
            .optional()
    }

    /// Whether `username` belongs to a user other than `except_id`
    pub fn username_taken(&self, username: &str, except_id: Option<i64>) -> StoreResult<bool> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM users WHERE username = ?1 AND id != COALESCE(?2, -1)",
            params![username, except_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn users(&self) -> StoreResult<Vec<User>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!("SELECT {} FROM users ORDER BY id", USER_COLUMNS))?;
        let rows = stmt.query_map([], row_to_user)?;
        rows.collect()
    }

    pub fn user_count(&self) -> StoreResult<i64> {
        self.conn()
            .query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))
    }

    /// Apply the non-empty fields of `changes`
    pub fn update_user(&self, id: i64, changes: &UserChanges, at: DateTime<Utc>) -> StoreResult<Option<User>> {
        let updated = self.conn().execute(
            "UPDATE users SET
                username = COALESCE(?1, username),
                hashed_password = COALESCE(?2, hashed_password),
                role = COALESCE(?3, role),
                is_active = COALESCE(?4, is_active),
                updated_at = ?5
             WHERE id = ?6",
            params![changes.username, changes.hashed_password, changes.role, changes.is_active, at, id],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        self.user_by_id(id)
    }

    pub fn delete_user(&self, id: i64) -> StoreResult<bool> {
        let removed = self.conn().execute("DELETE FROM users WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_crud() {
        let db = Database::open_in_memory().unwrap();
        let root = db.insert_user("root", "hash", Role::SuperAdmin, None, Utc::now()).unwrap();
        let editor = db.insert_user("editor", "hash2", Role::Admin, Some(root.id), Utc::now()).unwrap();

        assert_eq!(db.user_count().unwrap(), 2);
        assert_eq!(db.user_by_username("editor").unwrap().unwrap().created_by, Some(root.id));
        assert!(db.username_taken("editor", None).unwrap());
        assert!(!db.username_taken("editor", Some(editor.id)).unwrap());

        let changes = UserChanges { is_active: Some(false), role: Some(Role::SuperAdmin), ..Default::default() };
        let updated = db.update_user(editor.id, &changes, Utc::now()).unwrap().unwrap();
        assert!(!updated.is_active);
        assert_eq!(updated.role, Role::SuperAdmin);
        assert_eq!(updated.username, "editor");
        assert_eq!(updated.hashed_password, "hash2");

        assert!(db.delete_user(editor.id).unwrap());
        assert!(db.user_by_id(editor.id).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_username_is_rejected_by_schema() {
        let db = Database::open_in_memory().unwrap();
        db.insert_user("root", "hash", Role::SuperAdmin, None, Utc::now()).unwrap();
        assert!(db.insert_user("root", "hash", Role::Admin, None, Utc::now()).is_err());
    }
}
