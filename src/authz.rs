//! Role-based authorization.
//!
//! Who may do what is a table of `(role, resource, action)` grants. Every handler and
//! resolver asks [`Authorizer::require`] once, before it touches the repository, and the
//! answer depends only on the principal's role, the operation and the table.

use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{auth::Principal, error::AppError, models::Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceKind {
    Planet,
    Moon,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Read,
    Create,
    Update,
    Delete,
    AdminQuery,
    AdminMutation,
}

impl Action {
    pub const CRUD_WRITE: [Action; 3] = [Action::Create, Action::Update, Action::Delete];
}

/// The thing being attempted: an action on a kind of resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Operation {
    pub resource: ResourceKind,
    pub action: Action,
}

impl Operation {
    pub const fn new(resource: ResourceKind, action: Action) -> Self {
        Self { resource, action }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} on {:?}", self.action, self.resource)
    }
}

/// One row of the policy table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Grant {
    pub role: Role,
    pub resource: ResourceKind,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(String),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Policy
///
/// The set of granted triples. Anything not in the set is denied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Policy {
    grants: HashSet<Grant>,
}

impl Policy {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builder: grants every listed action on `resource` to each of `roles`.
    pub fn grant(mut self, roles: &[Role], resource: ResourceKind, actions: &[Action]) -> Self {
        for &role in roles {
            for &action in actions {
                self.grants.insert(Grant {
                    role,
                    resource,
                    action,
                });
            }
        }
        self
    }

    pub fn allows(&self, role: Role, op: Operation) -> bool {
        self.grants.contains(&Grant {
            role,
            resource: op.resource,
            action: op.action,
        })
    }

    pub fn grants(&self) -> impl Iterator<Item = &Grant> {
        self.grants.iter()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }
}

impl FromIterator<Grant> for Policy {
    fn from_iter<I: IntoIterator<Item = Grant>>(iter: I) -> Self {
        Self {
            grants: iter.into_iter().collect(),
        }
    }
}

/// AccessProfile
///
/// Everything a deployment variant decides about access: the policy table plus whether
/// planet names must be unique (case-insensitive) at create time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessProfile {
    pub policy: Policy,
    pub unique_planet_names: bool,
}

/// PolicyPreset
///
/// The deployment variants the service ships with. They agree on the catalog rules and
/// on `createUser` being ADMIN-only; they differ on who may query users and on whether
/// planet names are kept unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyPreset {
    /// User queries ADMIN-only, unique planet names.
    #[default]
    Strict,
    /// User queries ADMIN-only, duplicate planet names allowed.
    AdminGraphql,
    /// Any authenticated role may look users up, duplicate planet names allowed.
    OpenDirectory,
}

impl PolicyPreset {
    pub const ALL: [PolicyPreset; 3] = [
        PolicyPreset::Strict,
        PolicyPreset::AdminGraphql,
        PolicyPreset::OpenDirectory,
    ];

    pub fn name(self) -> &'static str {
        match self {
            PolicyPreset::Strict => "strict",
            PolicyPreset::AdminGraphql => "admin-graphql",
            PolicyPreset::OpenDirectory => "open-directory",
        }
    }

    pub fn policy(self) -> Policy {
        let user_readers: &[Role] = match self {
            PolicyPreset::OpenDirectory => &Role::ALL,
            PolicyPreset::Strict | PolicyPreset::AdminGraphql => &[Role::Admin],
        };

        catalog_baseline()
            .grant(user_readers, ResourceKind::User, &[Action::AdminQuery])
            .grant(&[Role::Admin], ResourceKind::User, &[Action::AdminMutation])
    }

    pub fn enforces_unique_planet_names(self) -> bool {
        matches!(self, PolicyPreset::Strict)
    }

    pub fn profile(self) -> AccessProfile {
        AccessProfile {
            policy: self.policy(),
            unique_planet_names: self.enforces_unique_planet_names(),
        }
    }
}

/// Catalog grants common to every preset: everyone reads, ADMIN and STAFF write.
fn catalog_baseline() -> Policy {
    let writers = [Role::Admin, Role::Staff];
    Policy::empty()
        .grant(&Role::ALL, ResourceKind::Planet, &[Action::Read])
        .grant(&Role::ALL, ResourceKind::Moon, &[Action::Read])
        .grant(&writers, ResourceKind::Planet, &Action::CRUD_WRITE)
        .grant(&writers, ResourceKind::Moon, &Action::CRUD_WRITE)
}

impl fmt::Display for PolicyPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyPreset {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyPreset::ALL
            .into_iter()
            .find(|preset| preset.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| PolicyError::UnknownPreset(s.to_string()))
    }
}

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("unknown access policy preset '{0}' (expected strict, admin-graphql or open-directory)")]
    UnknownPreset(String),
    #[error("cannot read policy file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid policy document: {0}")]
    Parse(#[from] serde_json::Error),
}

/// PolicyDocument
///
/// On-disk form of an access profile, for deployments that need a table other than
/// the presets:
///
/// ```json
/// { "grants": [{ "role": "ADMIN", "resource": "Planet", "action": "Read" }],
///   "unique_planet_names": true }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDocument {
    pub grants: Vec<Grant>,
    #[serde(default)]
    pub unique_planet_names: bool,
}

impl PolicyDocument {
    pub fn from_json(json: &str) -> Result<Self, PolicyError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, PolicyError> {
        let json = std::fs::read_to_string(path).map_err(|source| PolicyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    pub fn into_profile(self) -> AccessProfile {
        AccessProfile {
            policy: self.grants.into_iter().collect(),
            unique_planet_names: self.unique_planet_names,
        }
    }
}

/// Authorizer
///
/// Read-only after startup; clones share one table.
#[derive(Debug, Clone)]
pub struct Authorizer {
    policy: Arc<Policy>,
}

impl Authorizer {
    pub fn new(policy: Policy) -> Self {
        Self {
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    pub fn authorize(&self, principal: &Principal, op: Operation) -> Decision {
        if self.policy.allows(principal.role, op) {
            Decision::Allow
        } else {
            Decision::Deny(format!("role {} may not perform {}", principal.role, op))
        }
    }

    /// `authorize`, turning a denial into `AppError::Forbidden`.
    pub fn require(&self, principal: &Principal, op: Operation) -> Result<(), AppError> {
        match self.authorize(principal, op) {
            Decision::Allow => Ok(()),
            Decision::Deny(reason) => {
                tracing::info!(user = %principal.username, role = %principal.role, %op, "authorization denied");
                Err(AppError::Forbidden(reason))
            }
        }
    }
}
