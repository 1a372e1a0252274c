// Dialect translation between the gateway surface and upstream wire formats.

use serde_json::Value;

use crate::api::types::{ChatCompletionRequest, Usage};
use crate::domain::{GatewayError, Result};
use crate::routing::Candidate;

#[derive(Debug, Clone)]
pub struct TranslatedRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

/// Build the upstream request for one candidate: wire model name, per-edge
/// parameter defaults and renames, credential injection.
pub fn translate_request(
    candidate: &Candidate,
    request: &ChatCompletionRequest,
) -> Result<TranslatedRequest> {
    let mut body = serde_json::to_value(request)
        .map_err(|e| GatewayError::Translated(format!("request not serializable: {}", e)))?;

    let obj = body
        .as_object_mut()
        .ok_or_else(|| GatewayError::Translated("request body is not an object".to_string()))?;

    obj.insert(
        "model".to_string(),
        Value::String(candidate.upstream_model.clone()),
    );

    // Edge defaults apply only where the caller left the field unset.
    if !obj.contains_key("max_tokens") {
        if let Some(max_tokens) = candidate.edge.max_tokens {
            obj.insert("max_tokens".to_string(), Value::from(max_tokens));
        }
    }
    if !obj.contains_key("temperature") {
        if let Some(temperature) = candidate.edge.temperature {
            obj.insert("temperature".to_string(), Value::from(temperature));
        }
    }

    // Field renames last, so defaults are renamed too.
    for (from, to) in &candidate.edge.parameter_mapping {
        if let Some(value) = obj.remove(from) {
            obj.insert(to.clone(), value);
        }
    }

    let base = candidate.provider.base_url.trim_end_matches('/');
    let endpoint = &candidate.edge.endpoint;
    let url = if endpoint.starts_with('/') {
        format!("{}{}", base, endpoint)
    } else {
        format!("{}/{}", base, endpoint)
    };

    let mut headers: Vec<(String, String)> = Vec::with_capacity(candidate.edge.headers.len() + 1);
    match &candidate.provider.auth_header {
        Some(header) => headers.push((header.clone(), candidate.provider.upstream_key.clone())),
        None => headers.push((
            "Authorization".to_string(),
            format!("Bearer {}", candidate.provider.upstream_key),
        )),
    }
    for (name, value) in &candidate.edge.headers {
        headers.push((name.clone(), value.clone()));
    }

    Ok(TranslatedRequest { url, headers, body })
}

/// What the proxy could recover from an upstream response body.
#[derive(Debug, Clone)]
pub struct ParsedResponse {
    pub content: String,
    pub usage: Option<Usage>,
}

/// Extract usage counts and assistant content, tolerating both chat
/// (`choices[].message.content`) and legacy completion (`choices[].text`)
/// shapes.
pub fn parse_response(body: &Value) -> ParsedResponse {
    let usage = body.get("usage").and_then(|u| {
        let prompt = u.get("prompt_tokens")?.as_i64()?;
        let completion = u.get("completion_tokens")?.as_i64()?;
        Some(Usage {
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: u
                .get("total_tokens")
                .and_then(Value::as_i64)
                .unwrap_or(prompt + completion),
        })
    });

    let content = body
        .get("choices")
        .and_then(Value::as_array)
        .map(|choices| {
            choices
                .iter()
                .filter_map(|c| {
                    c.pointer("/message/content")
                        .or_else(|| c.get("text"))
                        .and_then(Value::as_str)
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default();

    ParsedResponse { content, usage }
}

/// Rewrite the upstream body into the gateway's response contract: logical
/// model name, stable id, accounted usage.
pub fn normalize_response(
    mut body: Value,
    request_id: &str,
    logical_model: &str,
    usage: &Usage,
) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert(
            "id".to_string(),
            Value::String(format!("chatcmpl-{}", request_id)),
        );
        obj.entry("object")
            .or_insert_with(|| Value::String("chat.completion".to_string()));
        obj.insert(
            "model".to_string(),
            Value::String(logical_model.to_string()),
        );
        obj.insert(
            "usage".to_string(),
            serde_json::json!({
                "prompt_tokens": usage.prompt_tokens,
                "completion_tokens": usage.completion_tokens,
                "total_tokens": usage.total_tokens,
            }),
        );
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EdgeConfig, Provider, ProviderModelSupport};
    use crate::routing::selector::tests_support::candidate_for;

    fn request() -> ChatCompletionRequest {
        serde_json::from_value(serde_json::json!({
            "model": "gpt-4",
            "messages": [{"role": "user", "content": "hello"}],
            "max_tokens": 128
        }))
        .unwrap()
    }

    #[test]
    fn test_translate_injects_bearer_and_wire_name() {
        let provider = Provider::new("A".into(), "a".into(), "http://a.test/".into(), "key-1".into());
        let edge = ProviderModelSupport::new(1, "gpt-4".into()).with_upstream_name("gpt-4-0613".into());
        let candidate = candidate_for(provider, edge);

        let translated = translate_request(&candidate, &request()).unwrap();
        assert_eq!(translated.url, "http://a.test/v1/chat/completions");
        assert_eq!(translated.body["model"], "gpt-4-0613");
        assert_eq!(
            translated.headers[0],
            ("Authorization".to_string(), "Bearer key-1".to_string())
        );
    }

    #[test]
    fn test_translate_applies_parameter_mapping() {
        let provider = Provider::new("A".into(), "a".into(), "http://a.test".into(), "k".into());
        let mut config = EdgeConfig::default();
        config
            .parameter_mapping
            .insert("max_tokens".into(), "max_output_tokens".into());
        let edge = ProviderModelSupport::new(1, "gpt-4".into()).with_config(config);
        let candidate = candidate_for(provider, edge);

        let translated = translate_request(&candidate, &request()).unwrap();
        assert!(translated.body.get("max_tokens").is_none());
        assert_eq!(translated.body["max_output_tokens"], 128);
    }

    #[test]
    fn test_translate_custom_auth_header() {
        let mut provider = Provider::new("A".into(), "a".into(), "http://a.test".into(), "k".into());
        provider.auth_header = Some("x-api-key".to_string());
        let edge = ProviderModelSupport::new(1, "gpt-4".into());
        let candidate = candidate_for(provider, edge);

        let translated = translate_request(&candidate, &request()).unwrap();
        assert_eq!(
            translated.headers[0],
            ("x-api-key".to_string(), "k".to_string())
        );
    }

    #[test]
    fn test_parse_response_with_usage() {
        let body = serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        });
        let parsed = parse_response(&body);
        assert_eq!(parsed.content, "hi there");
        let usage = parsed.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 5);
    }

    #[test]
    fn test_parse_response_without_usage() {
        let body = serde_json::json!({
            "choices": [{"text": "legacy completion"}]
        });
        let parsed = parse_response(&body);
        assert_eq!(parsed.content, "legacy completion");
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_normalize_overwrites_model_and_usage() {
        let body = serde_json::json!({
            "model": "gpt-4-0613",
            "choices": []
        });
        let usage = Usage {
            prompt_tokens: 3,
            completion_tokens: 4,
            total_tokens: 7,
        };
        let normalized = normalize_response(body, "req-9", "gpt-4", &usage);
        assert_eq!(normalized["model"], "gpt-4");
        assert_eq!(normalized["id"], "chatcmpl-req-9");
        assert_eq!(normalized["object"], "chat.completion");
        assert_eq!(normalized["usage"]["total_tokens"], 7);
    }
}
