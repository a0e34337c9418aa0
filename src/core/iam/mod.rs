//! Identity and Access Management for stacks
//!
//! Provides:
//! - Policy documents in the provider's JSON layout, declared and resolved
//! - Minimum-privilege grant synthesis with de-duplication
//! - Wildcard ARN matching and explicit-deny evaluation of resolved policies

mod pattern;
mod policy;
mod synthesizer;

pub use pattern::PatternMatcher;
pub use policy::{
    Action, Effect, PolicyDocument, Principal, ResolvedPolicy, ResolvedPrincipal,
    ResolvedStatement, Statement, POLICY_VERSION,
};
pub use synthesizer::{AccessGrant, AccessPolicySynthesizer, ActionProfile, GrantKey};
