//! IAM policy document structure
//!
//! Two shapes of the same document live here. [`PolicyDocument`] is the declared
//! form, whose principals and resources may still be tokens. [`ResolvedPolicy`] is
//! what the backend stores once every token has a real value, and is the form that
//! can be evaluated.

use super::pattern::PatternMatcher;
use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Policy language version written into every document
pub const POLICY_VERSION: &str = "2012-10-17";

/// Effect of a policy statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

/// Object-storage data actions
///
/// There is deliberately no wildcard variant: every grant names its actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "s3:GetObject")]
    GetObject,
    #[serde(rename = "s3:ListBucket")]
    ListBucket,
    #[serde(rename = "s3:PutObject")]
    PutObject,
    #[serde(rename = "s3:DeleteObject")]
    DeleteObject,
    #[serde(rename = "s3:GetObjectVersion")]
    GetObjectVersion,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::GetObject => "s3:GetObject",
            Action::ListBucket => "s3:ListBucket",
            Action::PutObject => "s3:PutObject",
            Action::DeleteObject => "s3:DeleteObject",
            Action::GetObjectVersion => "s3:GetObjectVersion",
        }
    }
}

/// Who a resource policy statement applies to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Principal {
    /// Cloud service principal, e.g. "s3.amazonaws.com"
    Service(String),
    /// Canonical user id, used by origin-access identities
    CanonicalUser(Value),
    /// Account or role ARN
    Aws(Value),
}

impl Principal {
    /// `{"Service" | "CanonicalUser" | "AWS": id}`
    pub fn to_value(&self) -> Value {
        match self {
            Principal::Service(service) => Value::map([("Service", service.as_str())]),
            Principal::CanonicalUser(id) => Value::map([("CanonicalUser", id.clone())]),
            Principal::Aws(arn) => Value::map([("AWS", arn.clone())]),
        }
    }
}

/// A single declared policy statement
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Statement ID (optional)
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Principal, for resource policies; identity policies leave it empty
    pub principal: Option<Principal>,

    /// Actions this statement applies to
    pub actions: BTreeSet<Action>,

    /// Resources this statement applies to (ARNs, possibly tokens)
    pub resources: Vec<Value>,
}

impl Statement {
    /// Create a new statement
    pub fn new(
        effect: Effect,
        actions: impl IntoIterator<Item = Action>,
        resources: Vec<Value>,
    ) -> Self {
        Statement {
            sid: None,
            effect,
            principal: None,
            actions: actions.into_iter().collect(),
            resources,
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_principal(mut self, principal: Principal) -> Self {
        self.principal = Some(principal);
        self
    }

    /// Render as a configuration value in the provider's JSON layout
    pub fn to_value(&self) -> Value {
        let mut entries = vec![("Effect", Value::from(self.effect.as_str()))];
        if let Some(sid) = &self.sid {
            entries.push(("Sid", Value::from(sid.as_str())));
        }
        if let Some(principal) = &self.principal {
            entries.push(("Principal", principal.to_value()));
        }
        entries.push((
            "Action",
            Value::list(self.actions.iter().map(|a| a.as_str())),
        ));
        entries.push(("Resource", Value::List(self.resources.clone())));
        Value::map(entries)
    }
}

/// Declared policy document
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyDocument {
    /// Policy format version
    pub version: String,

    /// List of policy statements
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Create a new empty policy
    pub fn new() -> Self {
        PolicyDocument {
            version: POLICY_VERSION.to_string(),
            statements: Vec::new(),
        }
    }

    /// Add a statement to this policy
    pub fn add_statement(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Validate policy structure
    pub fn validate(&self) -> Result<(), String> {
        if self.statements.is_empty() {
            return Err("Policy must have at least one statement".to_string());
        }

        for (i, stmt) in self.statements.iter().enumerate() {
            if stmt.actions.is_empty() {
                return Err(format!("Statement {} has no actions", i));
            }
            if stmt.resources.is_empty() {
                return Err(format!("Statement {} has no resources", i));
            }
        }

        Ok(())
    }

    /// Render as a configuration value in the provider's JSON layout
    pub fn to_value(&self) -> Value {
        Value::map([
            ("Version", Value::from(self.version.as_str())),
            (
                "Statement",
                Value::List(self.statements.iter().map(Statement::to_value).collect()),
            ),
        ])
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// Principal with its real identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResolvedPrincipal {
    Service(String),
    CanonicalUser(String),
    #[serde(rename = "AWS")]
    Aws(String),
}

/// Statement with every token resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedStatement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    pub effect: Effect,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub principal: Option<ResolvedPrincipal>,

    pub action: Vec<Action>,

    pub resource: Vec<String>,
}

impl ResolvedStatement {
    /// Check if this statement applies to the given caller, action and resource
    ///
    /// A statement without a principal applies to whoever it is attached to.
    pub fn applies_to(&self, principal: &ResolvedPrincipal, action: Action, arn: &str) -> bool {
        if let Some(own) = &self.principal {
            if own != principal {
                return false;
            }
        }

        if !self.action.contains(&action) {
            return false;
        }

        self.resource
            .iter()
            .any(|pattern| PatternMatcher::matches(pattern, arn))
    }
}

/// Policy document as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ResolvedPolicy {
    pub version: String,
    pub statement: Vec<ResolvedStatement>,
}

impl ResolvedPolicy {
    /// Parse a resolved document from JSON
    pub fn from_json_value(value: serde_json::Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    /// Serialize policy to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Evaluate with explicit-deny precedence; no matching allow means deny
    pub fn is_allowed(&self, principal: &ResolvedPrincipal, action: Action, arn: &str) -> bool {
        let mut has_allow = false;

        for statement in &self.statement {
            if !statement.applies_to(principal, action, arn) {
                continue;
            }

            match statement.effect {
                Effect::Deny => return false,
                Effect::Allow => has_allow = true,
            }
        }

        has_allow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_policy_validation() {
        let empty_policy = PolicyDocument::new();
        assert!(empty_policy.validate().is_err());

        let mut valid_policy = PolicyDocument::new();
        valid_policy.add_statement(Statement::new(
            Effect::Allow,
            [Action::GetObject],
            vec![Value::from("arn:aws:s3:::bucket/*")],
        ));
        assert!(valid_policy.validate().is_ok());

        let mut no_resources = PolicyDocument::new();
        no_resources.add_statement(Statement::new(Effect::Allow, [Action::GetObject], vec![]));
        assert!(no_resources.validate().is_err());
    }

    #[test]
    fn test_statement_layout() {
        let statement = Statement::new(
            Effect::Allow,
            [Action::ListBucket, Action::GetObject],
            vec![Value::from("arn:aws:s3:::bucket")],
        )
        .with_sid("Read")
        .with_principal(Principal::Service("s3.amazonaws.com".to_string()));

        struct NoTokens;
        impl crate::core::value::TokenResolver for NoTokens {
            fn attribute(&self, _: &crate::core::value::AttributeRef) -> Option<String> {
                None
            }
            fn import(
                &self,
                _: &crate::core::reference::CrossStackReference,
            ) -> crate::error::Result<String> {
                unreachable!()
            }
        }

        let rendered = statement.to_value().resolve(&NoTokens).unwrap();
        assert_eq!(
            rendered,
            json!({
                "Sid": "Read",
                "Effect": "Allow",
                "Principal": { "Service": "s3.amazonaws.com" },
                "Action": ["s3:GetObject", "s3:ListBucket"],
                "Resource": ["arn:aws:s3:::bucket"]
            })
        );

        let parsed: ResolvedStatement = serde_json::from_value(rendered).unwrap();
        assert_eq!(parsed.action, vec![Action::GetObject, Action::ListBucket]);
        assert_eq!(
            parsed.principal,
            Some(ResolvedPrincipal::Service("s3.amazonaws.com".to_string()))
        );
    }

    #[test]
    fn test_deny_precedence() {
        let policy = ResolvedPolicy::from_json_value(json!({
            "Version": POLICY_VERSION,
            "Statement": [
                {
                    "Effect": "Allow",
                    "Principal": { "CanonicalUser": "abc" },
                    "Action": ["s3:GetObject"],
                    "Resource": ["arn:aws:s3:::bucket/*"]
                },
                {
                    "Effect": "Deny",
                    "Action": ["s3:GetObject"],
                    "Resource": ["arn:aws:s3:::bucket/secret/*"]
                }
            ]
        }))
        .unwrap();

        let oai = ResolvedPrincipal::CanonicalUser("abc".to_string());
        assert!(policy.is_allowed(&oai, Action::GetObject, "arn:aws:s3:::bucket/index.html"));
        assert!(!policy.is_allowed(&oai, Action::GetObject, "arn:aws:s3:::bucket/secret/key"));
        assert!(!policy.is_allowed(&oai, Action::PutObject, "arn:aws:s3:::bucket/index.html"));

        let other = ResolvedPrincipal::CanonicalUser("xyz".to_string());
        assert!(!policy.is_allowed(&other, Action::GetObject, "arn:aws:s3:::bucket/index.html"));
    }

    #[test]
    fn test_wildcard_action_rejected() {
        let parsed: Result<ResolvedStatement, _> = serde_json::from_value(json!({
            "Effect": "Allow",
            "Action": ["s3:*"],
            "Resource": ["*"]
        }));
        assert!(parsed.is_err());
    }
}
