//! Tool gateway trait: the abstraction over the external tool service.
//!
//! All tools (web search, fetch, file read/write, shell, browser) live behind
//! a single POST endpoint on an external gateway. The engine never executes
//! tools itself; it maps parsed intents to gateway argument shapes and
//! invokes this trait.

use async_trait::async_trait;

use crate::error::ToolError;

/// The argument object sent to the gateway under the `args` field.
pub type ToolArgs = serde_json::Map<String, serde_json::Value>;

/// A tool gateway the dispatcher can invoke.
///
/// A single `invoke` is one attempt with no retry; retry policy lives in the
/// dispatcher. On success the raw JSON result is returned re-serialised as a
/// string.
#[async_trait]
pub trait ToolGateway: Send + Sync {
    async fn invoke(&self, tool: &str, args: ToolArgs) -> Result<String, ToolError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoGateway;

    #[async_trait]
    impl ToolGateway for EchoGateway {
        async fn invoke(&self, tool: &str, args: ToolArgs) -> Result<String, ToolError> {
            Ok(format!("{tool}:{}", serde_json::Value::Object(args)))
        }
    }

    #[tokio::test]
    async fn trait_object_is_invocable() {
        let gw: Box<dyn ToolGateway> = Box::new(EchoGateway);
        let mut args = ToolArgs::new();
        args.insert("query".into(), serde_json::json!("rust"));
        let out = gw.invoke("web_search", args).await.unwrap();
        assert_eq!(out, r#"web_search:{"query":"rust"}"#);
    }
}
