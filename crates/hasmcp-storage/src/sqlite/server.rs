//! Server rows, binding junctions, and reverse lookups for change fan-out.

use async_trait::async_trait;
use chrono::Utc;
use hasmcp_core::repository::{RepoResult, ServerStore};
use hasmcp_core::{ServerRecord, ServerToolRef, Visibility};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{fmt_time, parse_time, SqliteStorage};

const SERVER_COLUMNS: &str =
    "id, created_at, updated_at, version, name, instructions, request_headers_proxy_enabled, visibility";

fn row_to_server(row: &Row<'_>) -> rusqlite::Result<ServerRecord> {
    Ok(ServerRecord {
        id: row.get(0)?,
        created_at: parse_time(&row.get::<_, String>(1)?),
        updated_at: parse_time(&row.get::<_, String>(2)?),
        version: row.get(3)?,
        name: row.get(4)?,
        instructions: row.get(5)?,
        request_headers_proxy_enabled: row.get::<_, i64>(6)? != 0,
        visibility: Visibility::parse(&row.get::<_, String>(7)?).unwrap_or_default(),
        tool_refs: Vec::new(),
        prompt_ids: Vec::new(),
        resource_ids: Vec::new(),
    })
}

fn load_bindings(conn: &Connection, record: &mut ServerRecord) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare(
        "SELECT provider_id, tool_id FROM server_tools WHERE server_id = ?1 ORDER BY tool_id ASC",
    )?;
    record.tool_refs = stmt
        .query_map([record.id], |row| {
            Ok(ServerToolRef {
                provider_id: row.get(0)?,
                tool_id: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT prompt_id FROM server_prompts WHERE server_id = ?1 ORDER BY prompt_id ASC",
    )?;
    record.prompt_ids = stmt
        .query_map([record.id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut stmt = conn.prepare(
        "SELECT resource_id FROM server_resources WHERE server_id = ?1 ORDER BY resource_id ASC",
    )?;
    record.resource_ids = stmt
        .query_map([record.id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(())
}

fn list_ids(conn: &Connection, sql: &str, id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(sql)?;
    let result = stmt
        .query_map([id], |row| row.get(0))?
        .collect::<Result<Vec<_>, _>>();
    result
}

#[async_trait]
impl ServerStore for SqliteStorage {
    async fn create_server(&self, server: &ServerRecord) -> RepoResult<()> {
        let db = self.db().lock().await;
        let conn = db.connection();
        let now = fmt_time(Utc::now());

        let tx = conn.unchecked_transaction()?;
        conn.execute(
            "INSERT INTO servers (id, created_at, updated_at, version, name, instructions, \
             request_headers_proxy_enabled, visibility) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                server.id,
                now,
                now,
                server.version.max(1),
                server.name,
                server.instructions,
                server.request_headers_proxy_enabled as i64,
                server.visibility.as_str(),
            ],
        )?;
        for t in &server.tool_refs {
            conn.execute(
                "INSERT INTO server_tools (server_id, provider_id, tool_id) VALUES (?1, ?2, ?3)",
                params![server.id, t.provider_id, t.tool_id],
            )?;
        }
        for prompt_id in &server.prompt_ids {
            conn.execute(
                "INSERT INTO server_prompts (server_id, prompt_id) VALUES (?1, ?2)",
                params![server.id, prompt_id],
            )?;
        }
        for resource_id in &server.resource_ids {
            conn.execute(
                "INSERT INTO server_resources (server_id, resource_id) VALUES (?1, ?2)",
                params![server.id, resource_id],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn update_server(&self, server: &ServerRecord) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE servers SET updated_at = ?2, version = version + 1, name = ?3, \
             instructions = ?4, request_headers_proxy_enabled = ?5, visibility = ?6 WHERE id = ?1",
            params![
                server.id,
                fmt_time(Utc::now()),
                server.name,
                server.instructions,
                server.request_headers_proxy_enabled as i64,
                server.visibility.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn delete_server(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM servers WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn get_server(&self, id: i64) -> RepoResult<Option<ServerRecord>> {
        let db = self.db().lock().await;
        let conn = db.connection();

        let record = conn
            .query_row(
                &format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?1"),
                [id],
                row_to_server,
            )
            .optional()?;

        match record {
            Some(mut record) => {
                load_bindings(conn, &mut record)?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    async fn list_servers(&self) -> RepoResult<Vec<ServerRecord>> {
        let db = self.db().lock().await;
        let conn = db.connection();

        let mut stmt =
            conn.prepare(&format!("SELECT {SERVER_COLUMNS} FROM servers ORDER BY id ASC"))?;
        let mut records = stmt
            .query_map([], row_to_server)?
            .collect::<Result<Vec<_>, _>>()?;
        for record in &mut records {
            load_bindings(conn, record)?;
        }
        Ok(records)
    }

    async fn bump_server_version(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE servers SET version = version + 1, updated_at = ?2 WHERE id = ?1",
            params![id, fmt_time(Utc::now())],
        )?;
        Ok(())
    }

    async fn add_server_tool(
        &self,
        server_id: i64,
        provider_id: i64,
        tool_id: i64,
    ) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "INSERT OR IGNORE INTO server_tools (server_id, provider_id, tool_id) VALUES (?1, ?2, ?3)",
            params![server_id, provider_id, tool_id],
        )?;
        Ok(())
    }

    async fn remove_server_tool(&self, server_id: i64, tool_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "DELETE FROM server_tools WHERE server_id = ?1 AND tool_id = ?2",
            [server_id, tool_id],
        )?;
        Ok(())
    }

    async fn add_server_prompt(&self, server_id: i64, prompt_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "INSERT OR IGNORE INTO server_prompts (server_id, prompt_id) VALUES (?1, ?2)",
            [server_id, prompt_id],
        )?;
        Ok(())
    }

    async fn remove_server_prompt(&self, server_id: i64, prompt_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "DELETE FROM server_prompts WHERE server_id = ?1 AND prompt_id = ?2",
            [server_id, prompt_id],
        )?;
        Ok(())
    }

    async fn add_server_resource(&self, server_id: i64, resource_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "INSERT OR IGNORE INTO server_resources (server_id, resource_id) VALUES (?1, ?2)",
            [server_id, resource_id],
        )?;
        Ok(())
    }

    async fn remove_server_resource(&self, server_id: i64, resource_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "DELETE FROM server_resources WHERE server_id = ?1 AND resource_id = ?2",
            [server_id, resource_id],
        )?;
        Ok(())
    }

    async fn list_server_ids_by_provider_id(&self, provider_id: i64) -> RepoResult<Vec<i64>> {
        let db = self.db().lock().await;
        Ok(list_ids(
            db.connection(),
            "SELECT DISTINCT server_id FROM server_tools WHERE provider_id = ?1 ORDER BY server_id",
            provider_id,
        )?)
    }

    async fn list_server_ids_by_tool_id(&self, tool_id: i64) -> RepoResult<Vec<i64>> {
        let db = self.db().lock().await;
        Ok(list_ids(
            db.connection(),
            "SELECT DISTINCT server_id FROM server_tools WHERE tool_id = ?1 ORDER BY server_id",
            tool_id,
        )?)
    }

    async fn list_server_ids_by_prompt_id(&self, prompt_id: i64) -> RepoResult<Vec<i64>> {
        let db = self.db().lock().await;
        Ok(list_ids(
            db.connection(),
            "SELECT DISTINCT server_id FROM server_prompts WHERE prompt_id = ?1 ORDER BY server_id",
            prompt_id,
        )?)
    }

    async fn list_server_ids_by_resource_id(&self, resource_id: i64) -> RepoResult<Vec<i64>> {
        let db = self.db().lock().await;
        Ok(list_ids(
            db.connection(),
            "SELECT DISTINCT server_id FROM server_resources WHERE resource_id = ?1 ORDER BY server_id",
            resource_id,
        )?)
    }
}
