//! Tool handlers
//!
//! A tool is a named external capability a step can call. The host supplies
//! a [`ToolRegistry`] mapping tool names to async handlers; the executor looks
//! handlers up by the step's `tool` field.

mod builtin;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::task::StepOutcome;

pub use builtin::{
    register_builtin_tools, CrawlPageTool, DelegateAgentTool, GenerateImageTool, HostClient,
    WebSearchTool,
};

/// Errors a handler may raise instead of returning an outcome
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Host-supplied implementation of one named capability
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Unique tool name, as referenced by `Step::tool`
    fn name(&self) -> &str;

    /// Short description, listed in the planning prompt
    fn description(&self) -> &str {
        ""
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError>;
}

/// Adapter turning an async closure into a handler
pub struct FnTool<F> {
    name: String,
    description: String,
    func: F,
}

impl<F> FnTool<F> {
    pub fn new(name: impl Into<String>, description: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            func,
        }
    }
}

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: Future<Output = Result<StepOutcome, ToolError>> + Send,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError> {
        (self.func)(input).await
    }
}

/// Name -> handler mapping
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one with the same name
    pub fn register(&mut self, tool: Arc<dyn ToolHandler>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// (name, description) pairs in sorted order
    pub fn descriptions(&self) -> Vec<(&str, &str)> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.as_str(), tool.description()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_tool(name: &str) -> Arc<dyn ToolHandler> {
        Arc::new(FnTool::new(name, "Echo the input", |input: Value| async move {
            Ok::<_, ToolError>(StepOutcome::ok(input.to_string()))
        }))
    }

    #[test]
    fn test_register_and_get() {
        let mut registry = ToolRegistry::new();
        assert!(registry.is_empty());

        registry.register(echo_tool("web_search"));
        registry.register(echo_tool("crawl_page"));

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("web_search"));
        assert!(registry.get("foo_bar").is_none());
        assert_eq!(registry.names(), vec!["crawl_page", "web_search"]);
        assert_eq!(registry.descriptions()[0], ("crawl_page", "Echo the input"));
    }

    #[test]
    fn test_register_replaces_same_name() {
        let mut registry = ToolRegistry::new();
        registry.register(echo_tool("web_search"));
        registry.register(echo_tool("web_search"));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_fn_tool_invoke() {
        let tool = echo_tool("echo");
        let outcome = tool.invoke(json!({"q": 1})).await.unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.result.as_deref(), Some(r#"{"q":1}"#));
    }

    #[test]
    fn test_tool_error_messages() {
        assert_eq!(
            ToolError::InvalidInput("missing 'query'".into()).to_string(),
            "Invalid input: missing 'query'"
        );
        let other = ToolError::from(anyhow::anyhow!("socket closed"));
        assert_eq!(other.to_string(), "socket closed");
    }
}
