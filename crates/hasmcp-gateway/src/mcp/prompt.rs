//! `prompts/list` and `prompts/get`.
//!
//! Prompt messages are stored as raw protocol JSON; `prompts/get` substitutes
//! `{{.Arg}}` placeholders in text content blocks from the caller's
//! arguments. Templating never fails a request: a placeholder with no
//! matching argument renders as the literal `<no value>`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use super::{
    paginate, parse_cursor, CallSessionRequest, CallSessionResponse, McpController,
    PAGE_SIZE_PROMPTS,
};
use crate::jsonrpc::{JsonRpcError, ResultResponse};
use crate::mcp::protocol::{GetPromptRequestParams, GetPromptResult, ListPromptsResult};

static TEMPLATE_ARG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*\.([A-Za-z0-9_]+)\s*\}\}").expect("static pattern"));

impl McpController {
    pub(super) async fn call_prompts_list(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let entry = self.server_entry(req.server_id).await?;
        let cursor = parse_cursor(&req.request)?;

        let mut ids = entry.prompt_ids.clone();
        ids.sort_unstable();

        let (page, next) = paginate(&ids, cursor, PAGE_SIZE_PROMPTS);
        let prompts = page
            .iter()
            .filter_map(|id| entry.protocol.prompts.get(id).cloned())
            .collect();

        let result = ListPromptsResult {
            prompts,
            next_cursor: next.map(|n| n.to_string()),
        };
        let data = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::internal(
                "failed to marshal prompts/list response",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: req.mcp_session_id.clone(),
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), data)),
        })
    }

    pub(super) async fn call_prompts_get(
        &self,
        req: &CallSessionRequest,
    ) -> Result<CallSessionResponse, JsonRpcError> {
        let entry = self.server_entry(req.server_id).await?;

        let params: GetPromptRequestParams = match &req.request.params {
            Some(value) => serde_json::from_value(value.clone()).map_err(|e| {
                JsonRpcError::invalid_json(
                    "invalid params for prompts/get",
                    Some(json!({ "reason": e.to_string() })),
                )
            })?,
            None => GetPromptRequestParams::default(),
        };

        let prompt_id = super::id_from_mcp_name(&params.name);
        if prompt_id == 0 {
            return Err(JsonRpcError::invalid_params(
                "prompt not found",
                Some(json!({ "name": params.name })),
            ));
        }

        let Some(wire_prompt) = entry.protocol.prompts.get(&prompt_id) else {
            return Err(JsonRpcError::invalid_params(
                "prompt not found for this server",
                Some(json!({ "name": params.name })),
            ));
        };

        let stored = self.cache().get_prompt(prompt_id).await.map_err(|e| {
            JsonRpcError::server_error(
                "failed to retrieve prompt data",
                Some(json!({ "id": prompt_id, "reason": e.to_string() })),
            )
        })?;

        let mut messages: Vec<Value> = serde_json::from_value(stored.messages.clone())
            .map_err(|e| {
                JsonRpcError::internal(
                    "failed to parse prompt messages",
                    Some(json!({ "id": prompt_id, "reason": e.to_string() })),
                )
            })?;

        if !params.arguments.is_empty() {
            for message in &mut messages {
                apply_arguments(message, &params.arguments);
            }
        }

        let result = GetPromptResult {
            description: wire_prompt.description.clone(),
            messages,
        };
        let data = serde_json::to_value(&result).map_err(|e| {
            JsonRpcError::internal(
                "failed to marshal prompts/get response",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;

        Ok(CallSessionResponse {
            http_status: 200,
            mcp_session_id: req.mcp_session_id.clone(),
            mcp_protocol_version: req.mcp_protocol_version.clone(),
            result: Some(ResultResponse::new(req.request.id.clone(), data)),
        })
    }
}

/// Substitute `{{.Arg}}` placeholders inside a message's text content.
fn apply_arguments(message: &mut Value, arguments: &BTreeMap<String, String>) {
    let Some(content) = message.get_mut("content") else {
        return;
    };
    let is_text = content.get("type").and_then(Value::as_str) == Some("text");
    if !is_text {
        return;
    }
    let Some(text) = content.get("text").and_then(Value::as_str) else {
        return;
    };

    let rendered = render_template(text, arguments);
    content["text"] = Value::String(rendered);
}

/// Replace `{{.Name}}` references; an unknown name renders as `<no value>`,
/// the template engine's missing-key output.
fn render_template(text: &str, arguments: &BTreeMap<String, String>) -> String {
    TEMPLATE_ARG
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match arguments.get(&caps[1]) {
                Some(value) => value.clone(),
                None => "<no value>".to_string(),
            }
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn args(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn template_substitutes_known_args() {
        let rendered = render_template(
            "Hello {{.Name}}, welcome to {{.Place}}!",
            &args(&[("Name", "Ada"), ("Place", "the gateway")]),
        );
        assert_eq!(rendered, "Hello Ada, welcome to the gateway!");
    }

    #[test]
    fn template_renders_unknown_args_as_no_value() {
        let rendered = render_template("Hello {{.Name}}", &args(&[("Other", "x")]));
        assert_eq!(rendered, "Hello <no value>");
    }

    #[test]
    fn template_tolerates_spacing() {
        let rendered = render_template("{{ .Name }} / {{.Name}}", &args(&[("Name", "Ada")]));
        assert_eq!(rendered, "Ada / Ada");
    }

    #[test]
    fn only_text_content_is_templated() {
        let mut message = json!({
            "role": "user",
            "content": {"type": "image", "data": "{{.Name}}"}
        });
        apply_arguments(&mut message, &args(&[("Name", "Ada")]));
        assert_eq!(message["content"]["data"], "{{.Name}}");

        let mut message = json!({
            "role": "user",
            "content": {"type": "text", "text": "hi {{.Name}}"}
        });
        apply_arguments(&mut message, &args(&[("Name", "Ada")]));
        assert_eq!(message["content"]["text"], "hi Ada");
    }
}
