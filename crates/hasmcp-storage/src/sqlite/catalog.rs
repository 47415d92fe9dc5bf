//! Prompt and resource persistence.

use async_trait::async_trait;
use chrono::Utc;
use hasmcp_core::repository::{CatalogStore, RepoResult};
use hasmcp_core::{Prompt, Resource, Visibility};
use rusqlite::{params, OptionalExtension, Row};

use super::{fmt_time, parse_json, parse_time, SqliteStorage};

const PROMPT_COLUMNS: &str =
    "id, created_at, updated_at, name, description, arguments, messages, visibility";

const RESOURCE_COLUMNS: &str =
    "id, created_at, updated_at, name, description, uri, mime_type, size, annotations, visibility";

fn row_to_prompt(row: &Row<'_>) -> rusqlite::Result<Prompt> {
    Ok(Prompt {
        id: row.get(0)?,
        created_at: parse_time(&row.get::<_, String>(1)?),
        updated_at: parse_time(&row.get::<_, String>(2)?),
        name: row.get(3)?,
        description: row.get(4)?,
        arguments: parse_json(&row.get::<_, String>(5)?),
        messages: parse_json(&row.get::<_, String>(6)?),
        visibility: Visibility::parse(&row.get::<_, String>(7)?).unwrap_or_default(),
    })
}

fn row_to_resource(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        created_at: parse_time(&row.get::<_, String>(1)?),
        updated_at: parse_time(&row.get::<_, String>(2)?),
        name: row.get(3)?,
        description: row.get(4)?,
        uri: row.get(5)?,
        mime_type: row.get(6)?,
        size: row.get(7)?,
        annotations: parse_json(&row.get::<_, String>(8)?),
        visibility: Visibility::parse(&row.get::<_, String>(9)?).unwrap_or_default(),
    })
}

#[async_trait]
impl CatalogStore for SqliteStorage {
    async fn create_prompt(&self, prompt: &Prompt) -> RepoResult<()> {
        let db = self.db().lock().await;
        let now = fmt_time(Utc::now());
        db.connection().execute(
            "INSERT INTO prompts (id, created_at, updated_at, name, description, arguments, messages, visibility) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                prompt.id,
                now,
                now,
                prompt.name,
                prompt.description,
                prompt.arguments.to_string(),
                prompt.messages.to_string(),
                prompt.visibility.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn update_prompt(&self, prompt: &Prompt) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE prompts SET updated_at = ?2, name = ?3, description = ?4, arguments = ?5, \
             messages = ?6, visibility = ?7 WHERE id = ?1",
            params![
                prompt.id,
                fmt_time(Utc::now()),
                prompt.name,
                prompt.description,
                prompt.arguments.to_string(),
                prompt.messages.to_string(),
                prompt.visibility.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn delete_prompt(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM prompts WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn get_prompt(&self, id: i64) -> RepoResult<Option<Prompt>> {
        let db = self.db().lock().await;
        let prompt = db
            .connection()
            .query_row(
                &format!("SELECT {PROMPT_COLUMNS} FROM prompts WHERE id = ?1"),
                [id],
                row_to_prompt,
            )
            .optional()?;
        Ok(prompt)
    }

    async fn list_prompts(&self) -> RepoResult<Vec<Prompt>> {
        let db = self.db().lock().await;
        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT {PROMPT_COLUMNS} FROM prompts ORDER BY id ASC"))?;
        let prompts = stmt
            .query_map([], row_to_prompt)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(prompts)
    }

    async fn create_resource(&self, resource: &Resource) -> RepoResult<()> {
        let db = self.db().lock().await;
        let now = fmt_time(Utc::now());
        db.connection().execute(
            "INSERT INTO resources (id, created_at, updated_at, name, description, uri, mime_type, size, annotations, visibility) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                resource.id,
                now,
                now,
                resource.name,
                resource.description,
                resource.uri,
                resource.mime_type,
                resource.size,
                resource.annotations.to_string(),
                resource.visibility.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn update_resource(&self, resource: &Resource) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE resources SET updated_at = ?2, name = ?3, description = ?4, uri = ?5, \
             mime_type = ?6, size = ?7, annotations = ?8, visibility = ?9 WHERE id = ?1",
            params![
                resource.id,
                fmt_time(Utc::now()),
                resource.name,
                resource.description,
                resource.uri,
                resource.mime_type,
                resource.size,
                resource.annotations.to_string(),
                resource.visibility.as_str(),
            ],
        )?;
        Ok(())
    }

    async fn delete_resource(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM resources WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn get_resource(&self, id: i64) -> RepoResult<Option<Resource>> {
        let db = self.db().lock().await;
        let resource = db
            .connection()
            .query_row(
                &format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = ?1"),
                [id],
                row_to_resource,
            )
            .optional()?;
        Ok(resource)
    }

    async fn list_resources(&self) -> RepoResult<Vec<Resource>> {
        let db = self.db().lock().await;
        let mut stmt = db
            .connection()
            .prepare(&format!("SELECT {RESOURCE_COLUMNS} FROM resources ORDER BY id ASC"))?;
        let resources = stmt
            .query_map([], row_to_resource)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(resources)
    }
}
