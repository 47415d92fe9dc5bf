//! Provider and provider-tool persistence.

use async_trait::async_trait;
use chrono::Utc;
use hasmcp_core::repository::{ProviderStore, RepoResult};
use hasmcp_core::{ApiKind, HttpMethod, Oauth2Config, Provider, ProviderTool, Visibility};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{fmt_time, parse_time, SqliteStorage};

const PROVIDER_COLUMNS: &str = "id, created_at, updated_at, version, api_kind, visibility, \
     base_url, document_url, icon_url, secret_prefix, name, description, \
     oauth2_client_id, oauth2_client_secret, oauth2_client_secret_nonce, \
     oauth2_auth_url, oauth2_token_url";

const TOOL_COLUMNS: &str = "id, provider_id, method, path, name, title, description, \
     path_args_schema, query_args_schema, req_body_schema, res_body_schema, \
     headers, oauth2_scopes";

fn row_to_provider(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        id: row.get(0)?,
        created_at: parse_time(&row.get::<_, String>(1)?),
        updated_at: parse_time(&row.get::<_, String>(2)?),
        version: row.get(3)?,
        api_kind: ApiKind::parse(&row.get::<_, String>(4)?).unwrap_or_default(),
        visibility: Visibility::parse(&row.get::<_, String>(5)?).unwrap_or_default(),
        base_url: row.get(6)?,
        document_url: row.get(7)?,
        icon_url: row.get(8)?,
        secret_prefix: row.get(9)?,
        name: row.get(10)?,
        description: row.get(11)?,
        oauth2: Oauth2Config {
            client_id: row.get(12)?,
            client_secret_encrypted: row.get(13)?,
            client_secret_nonce: row.get(14)?,
            auth_url: row.get(15)?,
            token_url: row.get(16)?,
        },
        tools: Vec::new(),
    })
}

fn row_to_tool(row: &Row<'_>) -> rusqlite::Result<ProviderTool> {
    let headers: String = row.get(11)?;
    let scopes: String = row.get(12)?;
    Ok(ProviderTool {
        id: row.get(0)?,
        provider_id: row.get(1)?,
        method: HttpMethod::parse(&row.get::<_, String>(2)?).unwrap_or_default(),
        path: row.get(3)?,
        name: row.get(4)?,
        title: row.get(5)?,
        description: row.get(6)?,
        path_args_schema: row.get(7)?,
        query_args_schema: row.get(8)?,
        req_body_schema: row.get(9)?,
        res_body_schema: row.get(10)?,
        headers: serde_json::from_str(&headers).unwrap_or_default(),
        oauth2_scopes: serde_json::from_str(&scopes).unwrap_or_default(),
    })
}

fn insert_tool(conn: &Connection, tool: &ProviderTool) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO provider_tools (id, provider_id, method, path, name, title, description, \
         path_args_schema, query_args_schema, req_body_schema, res_body_schema, headers, oauth2_scopes) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
        params![
            tool.id,
            tool.provider_id,
            tool.method.as_str(),
            tool.path,
            tool.name,
            tool.title,
            tool.description,
            tool.path_args_schema,
            tool.query_args_schema,
            tool.req_body_schema,
            tool.res_body_schema,
            serde_json::to_string(&tool.headers).unwrap_or_else(|_| "[]".into()),
            serde_json::to_string(&tool.oauth2_scopes).unwrap_or_else(|_| "[]".into()),
        ],
    )?;
    Ok(())
}

fn load_tools(conn: &Connection, provider_id: i64) -> rusqlite::Result<Vec<ProviderTool>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TOOL_COLUMNS} FROM provider_tools WHERE provider_id = ?1 ORDER BY id ASC"
    ))?;
    let tools = stmt
        .query_map([provider_id], row_to_tool)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tools)
}

#[async_trait]
impl ProviderStore for SqliteStorage {
    async fn create_provider(&self, provider: &Provider) -> RepoResult<()> {
        let db = self.db().lock().await;
        let conn = db.connection();
        let now = fmt_time(Utc::now());

        let tx = conn.unchecked_transaction()?;
        conn.execute(
            "INSERT INTO providers (id, created_at, updated_at, version, api_kind, visibility, \
             base_url, document_url, icon_url, secret_prefix, name, description, \
             oauth2_client_id, oauth2_client_secret, oauth2_client_secret_nonce, \
             oauth2_auth_url, oauth2_token_url) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                provider.id,
                now,
                now,
                provider.version.max(1),
                provider.api_kind.as_str(),
                provider.visibility.as_str(),
                provider.base_url,
                provider.document_url,
                provider.icon_url,
                provider.secret_prefix,
                provider.name,
                provider.description,
                provider.oauth2.client_id,
                provider.oauth2.client_secret_encrypted,
                provider.oauth2.client_secret_nonce,
                provider.oauth2.auth_url,
                provider.oauth2.token_url,
            ],
        )?;
        for tool in &provider.tools {
            insert_tool(conn, tool)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn update_provider(&self, provider: &Provider) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE providers SET updated_at = ?2, version = version + 1, visibility = ?3, \
             base_url = ?4, document_url = ?5, icon_url = ?6, secret_prefix = ?7, name = ?8, \
             description = ?9, oauth2_client_id = ?10, oauth2_client_secret = ?11, \
             oauth2_client_secret_nonce = ?12, oauth2_auth_url = ?13, oauth2_token_url = ?14 \
             WHERE id = ?1",
            params![
                provider.id,
                fmt_time(Utc::now()),
                provider.visibility.as_str(),
                provider.base_url,
                provider.document_url,
                provider.icon_url,
                provider.secret_prefix,
                provider.name,
                provider.description,
                provider.oauth2.client_id,
                provider.oauth2.client_secret_encrypted,
                provider.oauth2.client_secret_nonce,
                provider.oauth2.auth_url,
                provider.oauth2.token_url,
            ],
        )?;
        Ok(())
    }

    async fn delete_provider(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection()
            .execute("DELETE FROM providers WHERE id = ?1", [id])?;
        Ok(())
    }

    async fn get_provider(&self, id: i64) -> RepoResult<Option<Provider>> {
        let db = self.db().lock().await;
        let conn = db.connection();

        let provider = conn
            .query_row(
                &format!("SELECT {PROVIDER_COLUMNS} FROM providers WHERE id = ?1"),
                [id],
                row_to_provider,
            )
            .optional()?;

        match provider {
            Some(mut p) => {
                p.tools = load_tools(conn, id)?;
                Ok(Some(p))
            }
            None => Ok(None),
        }
    }

    async fn list_providers(&self) -> RepoResult<Vec<Provider>> {
        let db = self.db().lock().await;
        let conn = db.connection();

        let mut stmt =
            conn.prepare(&format!("SELECT {PROVIDER_COLUMNS} FROM providers ORDER BY id ASC"))?;
        let mut providers = stmt
            .query_map([], row_to_provider)?
            .collect::<Result<Vec<_>, _>>()?;
        for p in &mut providers {
            p.tools = load_tools(conn, p.id)?;
        }
        Ok(providers)
    }

    async fn create_provider_tool(&self, tool: &ProviderTool) -> RepoResult<()> {
        let db = self.db().lock().await;
        insert_tool(db.connection(), tool)?;
        Ok(())
    }

    async fn update_provider_tool(&self, tool: &ProviderTool) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE provider_tools SET method = ?2, path = ?3, name = ?4, title = ?5, \
             description = ?6, path_args_schema = ?7, query_args_schema = ?8, \
             req_body_schema = ?9, res_body_schema = ?10, headers = ?11, oauth2_scopes = ?12 \
             WHERE id = ?1",
            params![
                tool.id,
                tool.method.as_str(),
                tool.path,
                tool.name,
                tool.title,
                tool.description,
                tool.path_args_schema,
                tool.query_args_schema,
                tool.req_body_schema,
                tool.res_body_schema,
                serde_json::to_string(&tool.headers).unwrap_or_else(|_| "[]".into()),
                serde_json::to_string(&tool.oauth2_scopes).unwrap_or_else(|_| "[]".into()),
            ],
        )?;
        Ok(())
    }

    async fn delete_provider_tool(&self, provider_id: i64, tool_id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "DELETE FROM provider_tools WHERE provider_id = ?1 AND id = ?2",
            [provider_id, tool_id],
        )?;
        Ok(())
    }

    async fn get_provider_tool(&self, id: i64) -> RepoResult<Option<ProviderTool>> {
        let db = self.db().lock().await;
        let tool = db
            .connection()
            .query_row(
                &format!("SELECT {TOOL_COLUMNS} FROM provider_tools WHERE id = ?1"),
                [id],
                row_to_tool,
            )
            .optional()?;
        Ok(tool)
    }

    async fn provider_tool_exists(
        &self,
        provider_id: i64,
        method: &str,
        path: &str,
    ) -> RepoResult<bool> {
        let db = self.db().lock().await;
        let count: i64 = db.connection().query_row(
            "SELECT COUNT(*) FROM provider_tools WHERE provider_id = ?1 AND method = ?2 AND path = ?3",
            params![provider_id, method, path],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    async fn bump_provider_version(&self, id: i64) -> RepoResult<()> {
        let db = self.db().lock().await;
        db.connection().execute(
            "UPDATE providers SET version = version + 1, updated_at = ?2 WHERE id = ?1",
            params![id, fmt_time(Utc::now())],
        )?;
        Ok(())
    }
}
