use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{ToolError, ToolHandler, ToolRegistry};
use crate::task::StepOutcome;

const DEFAULT_IMAGE_MODEL: &str = "flux-schnell";
const PROMPT_PREVIEW_CHARS: usize = 50;

/// HTTP client bound to the host application's API
#[derive(Debug, Clone)]
pub struct HostClient {
    base_url: String,
    client: Client,
}

enum HostResponse {
    Body(Value),
    Status(StatusCode),
}

impl HostClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: Client::new(),
        }
    }

    /// Client whose requests give up after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        Ok(Self {
            base_url: base_url.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, path: &str, body: &Value) -> Result<HostResponse, reqwest::Error> {
        let response = self.client.post(self.url(path)).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Ok(HostResponse::Status(status));
        }
        Ok(HostResponse::Body(response.json().await?))
    }

    /// POST and translate every failure into a halting outcome
    async fn call(&self, label: &str, path: &str, body: Value) -> Result<Value, StepOutcome> {
        debug!(path, "Calling host endpoint");
        match self.post_json(path, &body).await {
            Ok(HostResponse::Body(value)) => Ok(value),
            Ok(HostResponse::Status(status)) => {
                warn!(path, status = status.as_u16(), "Host endpoint returned an error status");
                Err(StepOutcome::fatal(format!(
                    "{label} failed with status: {}",
                    status.as_u16()
                )))
            }
            Err(err) => {
                warn!(path, error = %err, "Host endpoint request failed");
                Err(StepOutcome::fatal(format!("{label} failed: {err}")))
            }
        }
    }
}

fn required_str<'a>(input: &'a Value, key: &str) -> Result<&'a str, ToolError> {
    input
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| ToolError::InvalidInput(format!("missing '{key}'")))
}

/// Web search through the host's search endpoint
pub struct WebSearchTool {
    host: HostClient,
}

impl WebSearchTool {
    pub fn new(host: HostClient) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for WebSearchTool {
    fn name(&self) -> &str {
        "web_search"
    }

    fn description(&self) -> &str {
        "Search the internet for information (input: query)"
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError> {
        let query = required_str(&input, "query")?;
        let results = match self
            .host
            .call("Search", "/api/search", json!({ "query": query }))
            .await
        {
            Ok(value) => value,
            Err(outcome) => return Ok(outcome),
        };

        let count = match &results {
            Value::Array(items) => items.len(),
            Value::Object(map) => map
                .get("results")
                .and_then(Value::as_array)
                .map(Vec::len)
                .unwrap_or(0),
            _ => 0,
        };

        Ok(StepOutcome::ok(format!("Found {count} results for: {query}")).with_output(results))
    }
}

/// Page crawling through the host's crawler endpoint
pub struct CrawlPageTool {
    host: HostClient,
}

impl CrawlPageTool {
    pub fn new(host: HostClient) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for CrawlPageTool {
    fn name(&self) -> &str {
        "crawl_page"
    }

    fn description(&self) -> &str {
        "Fetch and extract the content of a web page (input: url)"
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError> {
        let url = required_str(&input, "url")?;
        let content = match self
            .host
            .call("Crawl", "/api/webtools/crawl", json!({ "url": url }))
            .await
        {
            Ok(value) => value,
            Err(outcome) => return Ok(outcome),
        };

        let title = content
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .unwrap_or(url)
            .to_string();

        Ok(StepOutcome::ok(format!("Crawled page: {title}")).with_output(content))
    }
}

/// Image generation through the host's generation endpoint
pub struct GenerateImageTool {
    host: HostClient,
}

impl GenerateImageTool {
    pub fn new(host: HostClient) -> Self {
        Self { host }
    }
}

#[async_trait]
impl ToolHandler for GenerateImageTool {
    fn name(&self) -> &str {
        "generate_image"
    }

    fn description(&self) -> &str {
        "Create an image with AI (input: prompt, optional model)"
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError> {
        let prompt = required_str(&input, "prompt")?;
        let model = input
            .get("model")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_IMAGE_MODEL);

        let image = match self
            .host
            .call(
                "Image generation",
                "/api/generate/image",
                json!({ "model": model, "prompt": prompt }),
            )
            .await
        {
            Ok(value) => value,
            Err(outcome) => return Ok(outcome),
        };

        let preview: String = prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
        Ok(StepOutcome::ok(format!("Generated image for: {preview}...")).with_output(image))
    }
}

/// Acknowledges a hand-off; the coordinator does the actual routing.
pub struct DelegateAgentTool;

#[async_trait]
impl ToolHandler for DelegateAgentTool {
    fn name(&self) -> &str {
        "delegate_agent"
    }

    fn description(&self) -> &str {
        "Delegate work to a specialist agent (input: agentId)"
    }

    async fn invoke(&self, input: Value) -> Result<StepOutcome, ToolError> {
        let agent = input.get("agentId").and_then(Value::as_str).unwrap_or("auto");
        Ok(StepOutcome::ok(format!("Delegated to agent: {agent}")))
    }
}

/// Register every built-in handler against one host
pub fn register_builtin_tools(registry: &mut ToolRegistry, host: HostClient) {
    registry.register(Arc::new(WebSearchTool::new(host.clone())));
    registry.register(Arc::new(CrawlPageTool::new(host.clone())));
    registry.register(Arc::new(GenerateImageTool::new(host)));
    registry.register(Arc::new(DelegateAgentTool));
}
