mod coordinator;
mod executor;
mod profile;
mod registry;

pub use coordinator::{
    merge_agent_results, merge_partial_results, AgentCoordinator, ExecutionHooks, NoHooks,
    NO_RESULTS, SECTION_SEPARATOR,
};
pub use executor::{PlaceholderReasoner, Reasoner, ReasoningRequest, StepContext, StepExecutor};
pub use profile::{
    builtin_profile_specs, matches_any, ExecutionConfig, PatternMatcher, ProfileSpec,
    SpecialistProfile, TriggerMatcher, TriggerRule, TriggerSpec, COORDINATOR_ID,
};
pub use registry::{AgentAssignment, AgentRegistry, AssignmentStatus, RegistryError};
