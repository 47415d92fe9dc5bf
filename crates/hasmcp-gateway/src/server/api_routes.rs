//! `/api/v1` admin CRUD surface.
//!
//! Thin handlers: decode ids and DTOs, delegate to the CRUD controller,
//! serialize views. All mutation side effects (versions, cache eviction,
//! change events) live in the controller.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use hasmcp_core::repository::{CatalogStore, ProviderStore, ServerStore};
use hasmcp_core::Visibility;

use super::state::AppState;
use super::views::*;
use crate::error::ApiError;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/providers", post(create_provider).get(list_providers))
        .route(
            "/providers/{id}",
            get(get_provider).patch(update_provider).delete(delete_provider),
        )
        .route("/providers/{id}/tools", post(create_tool))
        .route(
            "/providers/{id}/tools/{tool_id}",
            patch(update_tool).delete(delete_tool),
        )
        .route("/servers", post(create_server).get(list_servers))
        .route(
            "/servers/{id}",
            get(get_server).patch(update_server).delete(delete_server),
        )
        .route("/servers/{id}/tools", post(bind_tool))
        .route("/servers/{id}/tools/{tool_id}", delete(unbind_tool))
        .route("/servers/{id}/prompts", post(bind_prompt))
        .route("/servers/{id}/prompts/{prompt_id}", delete(unbind_prompt))
        .route("/servers/{id}/resources", post(bind_resource))
        .route("/servers/{id}/resources/{resource_id}", delete(unbind_resource))
        .route("/servers/{id}/tokens", post(create_token).get(list_tokens))
        .route("/servers/{id}/tokens/{token_id}", delete(delete_token))
        .route("/prompts", post(create_prompt).get(list_prompts))
        .route(
            "/prompts/{id}",
            get(get_prompt).patch(update_prompt).delete(delete_prompt),
        )
        .route("/resources", post(create_resource).get(list_resources))
        .route(
            "/resources/{id}",
            get(get_resource).patch(update_resource).delete(delete_resource),
        )
        .route("/variables", post(create_variable).get(list_variables))
        .route(
            "/variables/{id}",
            patch(update_variable).delete(delete_variable),
        )
        .with_state(state)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(json!({ "error": self }))).into_response()
    }
}

// ---------------------------------------------------------------------------
// providers

async fn create_provider(
    State(state): State<AppState>,
    Json(body): Json<CreateProviderRequest>,
) -> Result<Response, ApiError> {
    let (provider, client_secret) = body.into_provider();
    let provider = state.crud.create_provider(provider, client_secret).await?;
    Ok((StatusCode::CREATED, Json(ProviderView::from(&provider))).into_response())
}

async fn list_providers(State(state): State<AppState>) -> Result<Response, ApiError> {
    let providers = state
        .storage
        .list_providers()
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?;
    let views: Vec<ProviderView> = providers.iter().map(ProviderView::from).collect();
    Ok(Json(views).into_response())
}

async fn get_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let provider = state
        .storage
        .get_provider(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("provider not found", None))?;
    Ok(Json(ProviderView::from(&provider)).into_response())
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UpdateProviderRequest {
    base_url: Option<String>,
    document_url: Option<String>,
    icon_url: Option<String>,
    name: Option<String>,
    description: Option<String>,
    visibility: Option<Visibility>,
    oauth2: Option<Oauth2Request>,
}

async fn update_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProviderRequest>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let mut provider = state
        .storage
        .get_provider(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("provider not found", None))?;

    if let Some(base_url) = body.base_url {
        provider.base_url = base_url;
    }
    if let Some(document_url) = body.document_url {
        provider.document_url = document_url;
    }
    if let Some(icon_url) = body.icon_url {
        provider.icon_url = icon_url;
    }
    if let Some(name) = body.name {
        provider.name = name;
    }
    if let Some(description) = body.description {
        provider.description = description;
    }
    if let Some(visibility) = body.visibility {
        provider.visibility = visibility;
    }
    let mut client_secret = None;
    if let Some(oauth2) = body.oauth2 {
        provider.oauth2.client_id = oauth2.client_id;
        provider.oauth2.auth_url = oauth2.auth_url;
        provider.oauth2.token_url = oauth2.token_url;
        if !oauth2.client_secret.is_empty() {
            client_secret = Some(oauth2.client_secret);
        }
    }

    let provider = state.crud.update_provider(provider, client_secret).await?;
    Ok(Json(ProviderView::from(&provider)).into_response())
}

async fn delete_provider(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.crud.delete_provider(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// provider tools

async fn create_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpsertToolRequest>,
) -> Result<Response, ApiError> {
    let provider_id = parse_id(&id)?;
    let tool = state
        .crud
        .create_provider_tool(body.into_tool(provider_id))
        .await?;
    Ok((StatusCode::CREATED, Json(ToolView::from(&tool))).into_response())
}

async fn update_tool(
    State(state): State<AppState>,
    Path((id, tool_id)): Path<(String, String)>,
    Json(body): Json<UpsertToolRequest>,
) -> Result<Response, ApiError> {
    let provider_id = parse_id(&id)?;
    let tool_id = parse_id(&tool_id)?;

    let mut tool = body.into_tool(provider_id);
    tool.id = tool_id;
    let tool = state.crud.update_provider_tool(tool).await?;
    Ok(Json(ToolView::from(&tool)).into_response())
}

async fn delete_tool(
    State(state): State<AppState>,
    Path((id, tool_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .crud
        .delete_provider_tool(parse_id(&id)?, parse_id(&tool_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// servers

async fn create_server(
    State(state): State<AppState>,
    Json(body): Json<UpsertServerRequest>,
) -> Result<Response, ApiError> {
    let record = hasmcp_core::ServerRecord {
        name: body.name,
        instructions: body.instructions,
        request_headers_proxy_enabled: body.request_headers_proxy_enabled,
        visibility: body.visibility.unwrap_or_default(),
        ..Default::default()
    };
    let record = state.crud.create_server(record).await?;
    Ok((StatusCode::CREATED, Json(ServerView::from(&record))).into_response())
}

async fn list_servers(State(state): State<AppState>) -> Result<Response, ApiError> {
    let servers = state
        .storage
        .list_servers()
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?;
    let views: Vec<ServerView> = servers.iter().map(ServerView::from).collect();
    Ok(Json(views).into_response())
}

async fn get_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let record = state
        .storage
        .get_server(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("server not found", None))?;
    Ok(Json(ServerView::from(&record)).into_response())
}

async fn update_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpsertServerRequest>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let mut record = state
        .storage
        .get_server(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("server not found", None))?;

    record.name = body.name;
    record.instructions = body.instructions;
    record.request_headers_proxy_enabled = body.request_headers_proxy_enabled;
    if let Some(visibility) = body.visibility {
        record.visibility = visibility;
    }

    let record = state.crud.update_server(record).await?;
    Ok(Json(ServerView::from(&record)).into_response())
}

async fn delete_server(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.crud.delete_server(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn bind_tool(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BindToolRequest>,
) -> Result<Response, ApiError> {
    state
        .crud
        .add_server_tool(
            parse_id(&id)?,
            parse_id(&body.provider_id)?,
            parse_id(&body.tool_id)?,
        )
        .await?;
    Ok(StatusCode::CREATED.into_response())
}

async fn unbind_tool(
    State(state): State<AppState>,
    Path((id, tool_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .crud
        .remove_server_tool(parse_id(&id)?, parse_id(&tool_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn bind_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BindPromptRequest>,
) -> Result<Response, ApiError> {
    state
        .crud
        .add_server_prompt(parse_id(&id)?, parse_id(&body.prompt_id)?)
        .await?;
    Ok(StatusCode::CREATED.into_response())
}

async fn unbind_prompt(
    State(state): State<AppState>,
    Path((id, prompt_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .crud
        .remove_server_prompt(parse_id(&id)?, parse_id(&prompt_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

async fn bind_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<BindResourceRequest>,
) -> Result<Response, ApiError> {
    state
        .crud
        .add_server_resource(parse_id(&id)?, parse_id(&body.resource_id)?)
        .await?;
    Ok(StatusCode::CREATED.into_response())
}

async fn unbind_resource(
    State(state): State<AppState>,
    Path((id, resource_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state
        .crud
        .remove_server_resource(parse_id(&id)?, parse_id(&resource_id)?)
        .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// server tokens

async fn create_token(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<CreateTokenRequest>,
) -> Result<Response, ApiError> {
    let result = state
        .crud
        .create_server_token(parse_id(&id)?, &body.scopes, body.ttl_days)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateTokenResponse {
            token: TokenView::from(&result.token),
            value: result.value,
        }),
    )
        .into_response())
}

async fn list_tokens(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let tokens = state.crud.list_server_tokens(parse_id(&id)?).await?;
    let views: Vec<TokenView> = tokens.iter().map(TokenView::from).collect();
    Ok(Json(views).into_response())
}

async fn delete_token(
    State(state): State<AppState>,
    Path((_id, token_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.crud.delete_server_token(parse_id(&token_id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// prompts

async fn create_prompt(
    State(state): State<AppState>,
    Json(body): Json<UpsertPromptRequest>,
) -> Result<Response, ApiError> {
    let prompt = state.crud.create_prompt(body.into_prompt(0)).await?;
    Ok((StatusCode::CREATED, Json(PromptView::from(&prompt))).into_response())
}

async fn list_prompts(State(state): State<AppState>) -> Result<Response, ApiError> {
    let prompts = state
        .storage
        .list_prompts()
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?;
    let views: Vec<PromptView> = prompts.iter().map(PromptView::from).collect();
    Ok(Json(views).into_response())
}

async fn get_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let prompt = state
        .storage
        .get_prompt(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("prompt not found", None))?;
    Ok(Json(PromptView::from(&prompt)).into_response())
}

async fn update_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpsertPromptRequest>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let prompt = state.crud.update_prompt(body.into_prompt(id)).await?;
    Ok(Json(PromptView::from(&prompt)).into_response())
}

async fn delete_prompt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.crud.delete_prompt(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// resources

async fn create_resource(
    State(state): State<AppState>,
    Json(body): Json<UpsertResourceRequest>,
) -> Result<Response, ApiError> {
    let resource = state.crud.create_resource(body.into_resource(0)).await?;
    Ok((StatusCode::CREATED, Json(ResourceView::from(&resource))).into_response())
}

async fn list_resources(State(state): State<AppState>) -> Result<Response, ApiError> {
    let resources = state
        .storage
        .list_resources()
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?;
    let views: Vec<ResourceView> = resources.iter().map(ResourceView::from).collect();
    Ok(Json(views).into_response())
}

async fn get_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let resource = state
        .storage
        .get_resource(id)
        .await
        .map_err(|e| ApiError::internal("storage failure", Some(json!({ "reason": e.to_string() }))))?
        .ok_or_else(|| ApiError::not_found("resource not found", None))?;
    Ok(Json(ResourceView::from(&resource)).into_response())
}

async fn update_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpsertResourceRequest>,
) -> Result<Response, ApiError> {
    let id = parse_id(&id)?;
    let resource = state.crud.update_resource(body.into_resource(id)).await?;
    Ok(Json(ResourceView::from(&resource)).into_response())
}

async fn delete_resource(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.crud.delete_resource(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ---------------------------------------------------------------------------
// variables

async fn create_variable(
    State(state): State<AppState>,
    Json(body): Json<UpsertVariableRequest>,
) -> Result<Response, ApiError> {
    let variable = state
        .crud
        .create_variable(body.kind, &body.name, &body.value)
        .await?;
    Ok((StatusCode::CREATED, Json(VariableView::from(&variable))).into_response())
}

async fn list_variables(State(state): State<AppState>) -> Result<Response, ApiError> {
    let variables = state.crud.list_variables().await?;
    let views: Vec<VariableView> = variables.iter().map(VariableView::from).collect();
    Ok(Json(views).into_response())
}

async fn update_variable(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpsertVariableRequest>,
) -> Result<Response, ApiError> {
    let variable = state
        .crud
        .update_variable(parse_id(&id)?, body.kind, &body.name, &body.value)
        .await?;
    Ok(Json(VariableView::from(&variable)).into_response())
}

async fn delete_variable(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    state.crud.delete_variable(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}
