//! HTTP client for the tool gateway's `/tools/invoke` endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use drover_core::{ToolArgs, ToolError, ToolGateway};

/// reqwest-backed [`ToolGateway`]. One `invoke` is one attempt; retry policy
/// lives in [`crate::ToolRouter`].
pub struct GatewayClient {
    base_url: String,
    token: String,
    session_key: String,
    client: reqwest::Client,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        token: impl Into<String>,
        session_key: impl Into<String>,
        timeout: std::time::Duration,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("failed to create HTTP client");

        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            session_key: session_key.into(),
            client,
        }
    }
}

/// JSON body sent to POST /tools/invoke.
#[derive(Debug, Serialize)]
struct InvokeRequest<'a> {
    tool: &'a str,
    args: &'a ToolArgs,
    #[serde(rename = "sessionKey")]
    session_key: &'a str,
}

/// JSON body returned by /tools/invoke.
#[derive(Debug, Deserialize)]
struct InvokeResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Option<serde_json::Value>,
    #[serde(default)]
    error: Option<InvokeError>,
}

#[derive(Debug, Deserialize)]
struct InvokeError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

#[async_trait]
impl ToolGateway for GatewayClient {
    async fn invoke(&self, tool: &str, args: ToolArgs) -> Result<String, ToolError> {
        let url = format!("{}/tools/invoke", self.base_url);
        let body = InvokeRequest {
            tool,
            args: &args,
            session_key: &self.session_key,
        };

        debug!(tool, "invoking tool gateway");

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", self.token))
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(transport_error)?;

        if status != 200 {
            return Err(ToolError::Http {
                status,
                body: text.trim().to_string(),
            });
        }

        let invoke_response: InvokeResponse = serde_json::from_str(&text)
            .map_err(|e| ToolError::Protocol(format!("unmarshalling gateway response: {e}")))?;

        if !invoke_response.ok {
            return match invoke_response.error {
                Some(err) => Err(ToolError::Gateway {
                    kind: err.kind,
                    message: err.message,
                }),
                None => Err(ToolError::Protocol(
                    "gateway returned ok=false with no error detail".into(),
                )),
            };
        }

        Ok(invoke_response
            .result
            .map(|v| v.to_string())
            .unwrap_or_default())
    }
}

/// reqwest renders its timeout errors as "operation timed out"; the retry
/// classifier probes for "timeout", so stamp it on explicitly.
fn transport_error(e: reqwest::Error) -> ToolError {
    if e.is_timeout() {
        ToolError::Transport(format!("timeout: {e}"))
    } else {
        ToolError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invoke_request_wire_shape() {
        let mut args = ToolArgs::new();
        args.insert("query".into(), serde_json::json!("rust"));
        let req = InvokeRequest {
            tool: "web_search",
            args: &args,
            session_key: "main",
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["tool"], "web_search");
        assert_eq!(json["args"]["query"], "rust");
        assert_eq!(json["sessionKey"], "main");
    }

    #[test]
    fn ok_response_parses_result() {
        let resp: InvokeResponse =
            serde_json::from_str(r#"{"ok": true, "result": {"rows": [1, 2]}}"#).unwrap();
        assert!(resp.ok);
        assert_eq!(resp.result.unwrap().to_string(), r#"{"rows":[1,2]}"#);
    }

    #[test]
    fn string_result_keeps_json_quoting() {
        let resp: InvokeResponse = serde_json::from_str(r#"{"ok": true, "result": "R"}"#).unwrap();
        assert_eq!(resp.result.unwrap().to_string(), "\"R\"");
    }

    #[test]
    fn error_response_parses_kind_and_message() {
        let resp: InvokeResponse = serde_json::from_str(
            r#"{"ok": false, "error": {"type": "denied", "message": "not allowed"}}"#,
        )
        .unwrap();
        assert!(!resp.ok);
        let err = resp.error.unwrap();
        assert_eq!(err.kind, "denied");
        assert_eq!(err.message, "not allowed");
    }
}
