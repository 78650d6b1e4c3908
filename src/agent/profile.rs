use std::collections::BTreeSet;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Id of the built-in fallback profile
pub const COORDINATOR_ID: &str = "coordinator";

/// A compiled trigger rule: when `pattern` matches, the text expresses `intent`.
#[derive(Debug, Clone)]
pub struct TriggerRule {
    pub intent: String,
    pattern: Regex,
}

impl TriggerRule {
    /// Compile a case-insensitive rule
    pub fn new(intent: impl Into<String>, pattern: &str) -> Result<Self, regex::Error> {
        let pattern = RegexBuilder::new(pattern).case_insensitive(true).build()?;
        Ok(Self {
            intent: intent.into(),
            pattern,
        })
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.pattern.is_match(text)
    }
}

/// Decides whether a text triggers a set of rules.
///
/// The registry only talks to this trait, so the regex matcher can be swapped
/// for something else (embedding similarity, say) without touching routing.
pub trait TriggerMatcher: Send + Sync {
    fn matches(&self, rules: &[TriggerRule], text: &str) -> bool;
}

/// Default matcher: any rule's pattern matches
#[derive(Debug, Clone, Copy, Default)]
pub struct PatternMatcher;

impl TriggerMatcher for PatternMatcher {
    fn matches(&self, rules: &[TriggerRule], text: &str) -> bool {
        matches_any(rules, text)
    }
}

pub fn matches_any(rules: &[TriggerRule], text: &str) -> bool {
    rules.iter().any(|rule| rule.is_match(text))
}

/// Opaque configuration handed to the reasoning collaborator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

/// Serialized trigger rule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerSpec {
    pub intent: String,
    pub pattern: String,
}

impl TriggerSpec {
    fn new(intent: &str, pattern: &str) -> Self {
        Self {
            intent: intent.into(),
            pattern: pattern.into(),
        }
    }
}

/// Profile as written in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSpec {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub triggers: Vec<TriggerSpec>,
    #[serde(default)]
    pub execution: ExecutionConfig,
}

/// Specialist capability profile used for routing. Immutable once built.
#[derive(Debug, Clone)]
pub struct SpecialistProfile {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Higher wins when several profiles match
    pub priority: i32,
    pub triggers: Vec<TriggerRule>,
    pub tools: BTreeSet<String>,
    pub execution: ExecutionConfig,
}

impl SpecialistProfile {
    pub fn has_tool(&self, tool: &str) -> bool {
        self.tools.contains(tool)
    }
}

impl TryFrom<&ProfileSpec> for SpecialistProfile {
    type Error = regex::Error;

    fn try_from(spec: &ProfileSpec) -> Result<Self, Self::Error> {
        let triggers = spec
            .triggers
            .iter()
            .map(|t| TriggerRule::new(t.intent.clone(), &t.pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id: spec.id.clone(),
            name: spec.name.clone(),
            description: spec.description.clone(),
            priority: spec.priority,
            triggers,
            tools: spec.tools.iter().cloned().collect(),
            execution: spec.execution.clone(),
        })
    }
}

fn prompt(text: &str) -> ExecutionConfig {
    ExecutionConfig {
        system_prompt: text.into(),
        extra: Map::new(),
    }
}

fn tools(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

/// Built-in specialist table
pub fn builtin_profile_specs() -> Vec<ProfileSpec> {
    vec![
        ProfileSpec {
            id: "researcher".into(),
            name: "Research Agent".into(),
            description: "Finds, analyzes and synthesizes information from the web. Best for research, fact-finding and competitive analysis.".into(),
            priority: 80,
            tools: tools(&["web_search", "crawl_page", "read_file"]),
            triggers: vec![
                TriggerSpec::new("research", r"research\s+(about|on|into)"),
                TriggerSpec::new("research", r"find\s+(out|information|data)\s+(about|on)"),
                TriggerSpec::new("research", r"investigate"),
                TriggerSpec::new("summarize", r"analyze\s+and\s+summarize"),
                TriggerSpec::new("lookup", r"look\s+up"),
                TriggerSpec::new("news", r"what\s+are\s+the\s+(latest|recent)"),
            ],
            execution: prompt(
                "You are a meticulous research analyst. Search multiple sources, cross-reference facts, \
                 provide structured summaries with citations and flag gaps in the available information.",
            ),
        },
        ProfileSpec {
            id: "coder".into(),
            name: "Code Agent".into(),
            description: "Writes, debugs and optimizes code. Handles implementation tasks, bug fixes and technical solutions.".into(),
            priority: 85,
            tools: tools(&["run_code", "write_file", "read_file"]),
            triggers: vec![
                TriggerSpec::new("write_code", r"write\s+(code|a\s+script|a\s+function|a\s+program)"),
                TriggerSpec::new("implement", r"implement"),
                TriggerSpec::new("debug", r"debug"),
                TriggerSpec::new("fix", r"fix\s+(the\s+)?(bug|error|issue)"),
                TriggerSpec::new("refactor", r"refactor"),
                TriggerSpec::new("optimize", r"optimize\s+(the\s+)?code"),
            ],
            execution: prompt(
                "You are a senior software engineer. Write clean, documented code, debug systematically \
                 and consider edge cases.",
            ),
        },
        ProfileSpec {
            id: "creative".into(),
            name: "Creative Agent".into(),
            description: "Generates images, designs visual content and writes creative copy.".into(),
            priority: 70,
            tools: tools(&["generate_image", "write_file"]),
            triggers: vec![
                TriggerSpec::new("design", r"design"),
                TriggerSpec::new("image", r"create\s+(an?\s+)?(image|illustration|graphic|logo)"),
                TriggerSpec::new("image", r"generate\s+(an?\s+)?(image|visual|artwork)"),
                TriggerSpec::new("writing", r"creative\s+writing"),
                TriggerSpec::new("writing", r"write\s+(a\s+)?(story|poem|article)"),
            ],
            execution: prompt(
                "You are a creative director and artist. Produce compelling visuals and engaging copy \
                 with attention to aesthetics and clarity.",
            ),
        },
        ProfileSpec {
            id: "analyst".into(),
            name: "Data Analyst".into(),
            description: "Analyzes data, computes statistics and derives insights. Best for trend detection and reporting.".into(),
            priority: 75,
            tools: tools(&["query_database", "run_code", "web_search"]),
            triggers: vec![
                TriggerSpec::new("analysis", r"analyze\s+(the\s+)?data"),
                TriggerSpec::new("statistics", r"statistics"),
                TriggerSpec::new("compare", r"compare\s+(and|then)"),
                TriggerSpec::new("trend", r"trend"),
                TriggerSpec::new("report", r"report\s+on"),
                TriggerSpec::new("metrics", r"metrics"),
            ],
            execution: prompt(
                "You are a data analyst and statistician. Quantify findings, explain methodology and \
                 give actionable recommendations.",
            ),
        },
        ProfileSpec {
            id: "integrator".into(),
            name: "Integration Agent".into(),
            description: "Integrates external services, manages APIs and orchestrates workflows between systems.".into(),
            priority: 65,
            tools: tools(&["call_api", "run_code", "read_file", "write_file"]),
            triggers: vec![
                TriggerSpec::new("integrate", r"integrate"),
                TriggerSpec::new("connect", r"connect\s+to"),
                TriggerSpec::new("api", r"call\s+(the\s+)?api"),
                TriggerSpec::new("automate", r"automate"),
                TriggerSpec::new("workflow", r"workflow"),
            ],
            execution: prompt(
                "You are a systems integration specialist. Connect services, transform data between \
                 formats and validate every input and output.",
            ),
        },
        ProfileSpec {
            id: COORDINATOR_ID.into(),
            name: "Coordinator".into(),
            description: "Generalist that handles steps no specialist claims.".into(),
            priority: 0,
            tools: Vec::new(),
            triggers: Vec::new(),
            execution: prompt(
                "You are a task coordinator. Complete the step directly using the results gathered so far.",
            ),
        },
    ]
}
