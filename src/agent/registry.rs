use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::profile::{
    builtin_profile_specs, PatternMatcher, ProfileSpec, SpecialistProfile, TriggerMatcher,
    COORDINATOR_ID,
};
use crate::task::Step;

/// Registry construction errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Fallback profile '{0}' is not in the registry")]
    MissingFallback(String),

    #[error("Duplicate profile id: {0}")]
    DuplicateProfile(String),

    #[error("Invalid trigger pattern for profile '{profile}': {source}")]
    InvalidPattern {
        profile: String,
        #[source]
        source: regex::Error,
    },
}

/// Assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    #[default]
    Idle,
    Working,
    Done,
    Failed,
    Cancelled,
}

/// Steps routed to one agent profile for a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAssignment {
    pub agent_id: String,
    pub step_ids: Vec<String>,
    pub status: AssignmentStatus,
    /// Combined result from this agent's steps
    pub result: Option<String>,
    pub error: Option<String>,
}

impl AgentAssignment {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            step_ids: Vec::new(),
            status: AssignmentStatus::Idle,
            result: None,
            error: None,
        }
    }
}

/// Static catalog of specialist profiles plus the routing function.
pub struct AgentRegistry {
    profiles: Vec<SpecialistProfile>,
    fallback: usize,
    matcher: Box<dyn TriggerMatcher>,
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRegistry")
            .field("profiles", &self.profile_ids())
            .field("fallback", &self.fallback().id)
            .finish()
    }
}

impl AgentRegistry {
    /// Build a registry from a profile table. `fallback_id` must name one of
    /// the profiles.
    pub fn new(profiles: Vec<SpecialistProfile>, fallback_id: &str) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(RegistryError::DuplicateProfile(profile.id.clone()));
            }
        }

        let fallback = profiles
            .iter()
            .position(|p| p.id == fallback_id)
            .ok_or_else(|| RegistryError::MissingFallback(fallback_id.to_string()))?;

        Ok(Self {
            profiles,
            fallback,
            matcher: Box::new(PatternMatcher),
        })
    }

    /// Compile profile specs (from config or the built-in table)
    pub fn from_specs(specs: &[ProfileSpec], fallback_id: &str) -> Result<Self, RegistryError> {
        let profiles = specs
            .iter()
            .map(|spec| {
                SpecialistProfile::try_from(spec).map_err(|source| RegistryError::InvalidPattern {
                    profile: spec.id.clone(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(profiles, fallback_id)
    }

    /// Registry over the built-in specialist table
    pub fn builtin() -> Result<Self, RegistryError> {
        Self::from_specs(&builtin_profile_specs(), COORDINATOR_ID)
    }

    /// Replace the trigger matcher
    pub fn with_matcher(mut self, matcher: impl TriggerMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn get(&self, id: &str) -> Option<&SpecialistProfile> {
        self.profiles.iter().find(|p| p.id == id)
    }

    pub fn profiles(&self) -> &[SpecialistProfile] {
        &self.profiles
    }

    pub fn profile_ids(&self) -> Vec<&str> {
        self.profiles.iter().map(|p| p.id.as_str()).collect()
    }

    pub fn fallback(&self) -> &SpecialistProfile {
        &self.profiles[self.fallback]
    }

    /// Highest-priority profile declaring `tool`
    pub fn find_agent_for_tool(&self, tool: &str) -> Option<&SpecialistProfile> {
        let mut candidates: Vec<&SpecialistProfile> =
            self.profiles.iter().filter(|p| p.has_tool(tool)).collect();
        sort_by_priority(&mut candidates);
        candidates.into_iter().next()
    }

    /// Profiles whose triggers match `text`, highest priority first
    pub fn find_agents_for_query(&self, text: &str) -> Vec<&SpecialistProfile> {
        let mut matched: Vec<&SpecialistProfile> = self
            .profiles
            .iter()
            .filter(|p| self.matcher.matches(&p.triggers, text))
            .collect();
        sort_by_priority(&mut matched);
        matched
    }

    /// Profile a single step is routed to
    pub fn route_step(&self, step: &Step) -> &SpecialistProfile {
        let routed = match step.tool.as_deref() {
            Some(tool) => self.find_agent_for_tool(tool),
            None => self.find_agents_for_query(&step.description).into_iter().next(),
        };
        routed.unwrap_or_else(|| self.fallback())
    }

    /// Group steps by routed agent, in the order agents are first encountered.
    pub fn route_steps_to_agents(&self, steps: &[Step]) -> Vec<AgentAssignment> {
        let mut assignments: Vec<AgentAssignment> = Vec::new();

        for step in steps {
            let agent_id = &self.route_step(step).id;
            match assignments.iter_mut().find(|a| &a.agent_id == agent_id) {
                Some(assignment) => assignment.step_ids.push(step.id.clone()),
                None => {
                    let mut assignment = AgentAssignment::new(agent_id.clone());
                    assignment.step_ids.push(step.id.clone());
                    assignments.push(assignment);
                }
            }
        }

        assignments
    }

    pub fn should_use_multi_agent(&self, steps: &[Step]) -> bool {
        self.route_steps_to_agents(steps).len() >= 2
    }
}

/// Stable sort, so equal priorities keep table order
fn sort_by_priority(profiles: &mut [&SpecialistProfile]) {
    profiles.sort_by(|a, b| b.priority.cmp(&a.priority));
}
