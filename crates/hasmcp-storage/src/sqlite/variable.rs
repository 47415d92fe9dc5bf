//! Variable and server-token persistence.
//!
//! SECRET variable values arrive as hex ciphertext with a hex nonce; ENV
//! values are plaintext with an empty nonce. Server tokens store only the
//! bcrypt hash of the minted JWT.

use async_trait::async_trait;
use chrono::Utc;
use hasmcp_core::repository::{RepoResult, TokenStore, VariableStore};
use hasmcp_core::{ServerToken, Variable, VariableKind};
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_time, parse_time, SqliteStorage};

const VARIABLE_COLUMNS: &str = "id, created_at, updated_at, kind, name, value, nonce";

fn row_to_variable(row: &Row<'_>) -> rusqlite::Result<Variable> {
    Ok(Variable {
        id: row.get(0)?,
        created_at: parse_time(&row.get::<_, String>(1)?),
        updated_at: parse_time(&row.get::<_, String>(2)?),
        kind: VariableKind::parse(&row.get::<_, String>(3)?).unwrap_or_default(),
        name: row.get(4)?,
        value: row.get(5)?,
        nonce: row.get(6)?,
    })
}

#[async_trait]
impl VariableStore for SqliteStorage {
    async fn create_variable(&self, variable: &Variable) -> RepoResult<()> {
        let db = self.db().lock().await;
        let now = fmt_time(Utc::now());
        db.connection().execute(
            "INSERT INTO variables (id, created_at, updated_at, kind, name, value, nonce) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                variable.id,
                now,
                now,
                variable.kind.as_str(),
                variable.name,
                variable.value,
                variable.nonce,
            ],
        )?;
        Ok(())
    }

    async fn update_variable(&self, variable: &Variable) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE variables SET updated_at = ?2, kind = ?3, name = ?4, value = ?5, nonce = ?6 \
             WHERE id = ?1",
            params![
                variable.id,
                fmt_time(Utc::now()),
                variable.kind.as_str(),
                variable.name,
                variable.value,
                variable.nonce,
            ],
        )?;
        Ok(())
    }

    async fn save_variable(&self, variable: &Variable) -> RepoResult<Variable> {
        let db = self.db().lock().await;
        let conn = db.connection();
        let now = fmt_time(Utc::now());

        let existing_id: Option<i64> = conn
            .query_row(
                "SELECT id FROM variables WHERE name = ?1",
                [&variable.name],
                |row| row.get(0),
            )
            .optional()?;

        let id = match existing_id {
            Some(id) => {
                conn.execute(
                    "UPDATE variables SET updated_at = ?2, kind = ?3, value = ?4, nonce = ?5 \
                     WHERE id = ?1",
                    params![id, now, variable.kind.as_str(), variable.value, variable.nonce],
                )?;
                id
            }
            None => {
                conn.execute(
                    "INSERT INTO variables (id, created_at, updated_at, kind, name, value, nonce) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        variable.id,
                        now,
                        now,
                        variable.kind.as_str(),
                        variable.name,
                        variable.value,
                        variable.nonce,
                    ],
                )?;
                variable.id
            }
        };

        let saved = conn.query_row(
            &format!("SELECT {VARIABLE_COLUMNS} FROM variables WHERE id = ?1"),
            [id],
            row_to_variable,
        )?;
        Ok(saved)
    }

    async fn delete_variable(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM variables WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn get_variable_by_name(&self, name: &str) -> RepoResult<Option<Variable>> {
        let db = self.db().lock().await;
        let variable = db
            .connection()
            .query_row(
                &format!("SELECT {VARIABLE_COLUMNS} FROM variables WHERE name = ?1"),
                [name],
                row_to_variable,
            )
            .optional()?;
        Ok(variable)
    }

    async fn list_variables(&self) -> RepoResult<Vec<Variable>> {
        let db = self.db().lock().await;
        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT {VARIABLE_COLUMNS} FROM variables ORDER BY id ASC"))?;
        let variables = stmt
            .query_map([], row_to_variable)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(variables)
    }
}

#[async_trait]
impl TokenStore for SqliteStorage {
    async fn create_server_token(&self, token: &ServerToken) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "INSERT INTO server_tokens (id, server_id, created_at, expires_at, scope, hashed_value) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                token.id,
                token.server_id,
                fmt_time(token.created_at),
                fmt_time(token.expires_at),
                token.scope,
                token.hashed_value,
            ],
        )?;
        Ok(())
    }

    async fn list_server_tokens(&self, server_id: i64) -> RepoResult<Vec<ServerToken>> {
        let db = self.db().lock().await;
        let mut stmt = db.connection().prepare(
            "SELECT id, server_id, created_at, expires_at, scope, hashed_value \
             FROM server_tokens WHERE server_id = ?1 ORDER BY id ASC",
        )?;
        let tokens = stmt
            .query_map([server_id], |row| {
                Ok(ServerToken {
                    id: row.get(0)?,
                    server_id: row.get(1)?,
                    created_at: parse_time(&row.get::<_, String>(2)?),
                    expires_at: parse_time(&row.get::<_, String>(3)?),
                    scope: row.get(4)?,
                    hashed_value: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(tokens)
    }

    async fn delete_server_token(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM server_tokens WHERE id = ?1", [id])?;
        Ok(())
    }
}
