use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::agent::{builtin_profile_specs, AgentRegistry, ProfileSpec, COORDINATOR_ID};
use crate::tools::HostClient;

const CONFIG_FILE: &str = "config.json";

fn default_host_base_url() -> String {
    "http://localhost:3010".into()
}

fn default_fallback_profile() -> String {
    COORDINATOR_ID.into()
}

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Base URL of the host serving the tool endpoints
    #[serde(default = "default_host_base_url")]
    pub host_base_url: String,
    /// Per-request timeout for tool HTTP calls
    #[serde(default)]
    pub http_timeout_secs: Option<u64>,
    /// Profile that receives steps no other profile claims
    #[serde(default = "default_fallback_profile")]
    pub fallback_profile: String,
    /// Specialist profiles, in registry order
    #[serde(default = "builtin_profile_specs")]
    pub profiles: Vec<ProfileSpec>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            host_base_url: default_host_base_url(),
            http_timeout_secs: None,
            fallback_profile: default_fallback_profile(),
            profiles: builtin_profile_specs(),
        }
    }
}

impl OrchestratorConfig {
    /// Default config directory (`<user config dir>/conductor`)
    pub fn default_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("conductor"))
    }

    /// Load from `<dir>/config.json`. Falls back to defaults when the file
    /// or its `orchestrator` section is missing.
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            let config: serde_json::Value =
                serde_json::from_str(&content).context("Failed to parse config.json")?;

            if let Some(orch) = config.get("orchestrator") {
                return serde_json::from_value(orch.clone())
                    .context("Failed to parse orchestrator config");
            }
        }
        Ok(Self::default())
    }

    pub fn profile_ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }

    /// Build the agent registry from the configured profile table
    pub fn build_registry(&self) -> Result<AgentRegistry> {
        AgentRegistry::from_specs(&self.profiles, &self.fallback_profile)
            .context("Invalid profile configuration")
    }

    /// HTTP client for the built-in tools
    pub fn host_client(&self) -> Result<HostClient> {
        match self.http_timeout_secs {
            Some(secs) => HostClient::with_timeout(&self.host_base_url, Duration::from_secs(secs))
                .context("Failed to build HTTP client"),
            None => Ok(HostClient::new(&self.host_base_url)),
        }
    }
}
