//! Caller identity, resolved from a bearer token by a pluggable resolver.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::GatewayError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Pending,
    User,
    Admin,
}

impl Role {
    pub fn is_verified(self) -> bool {
        matches!(self, Self::User | Self::Admin)
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Self::Admin)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Option<Caller>;
}

/// Tier a handler requires from its caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    /// Any resolved caller, including pending accounts.
    CurrentUser,
    /// `user` or `admin`.
    VerifiedUser,
    Admin,
}

impl Capability {
    pub fn check(self, caller: Option<Caller>) -> Result<Caller, GatewayError> {
        let caller = caller.ok_or(GatewayError::Unauthorized)?;
        let allowed = match self {
            Self::CurrentUser => true,
            Self::VerifiedUser => caller.role.is_verified(),
            Self::Admin => caller.role.is_admin(),
        };
        if allowed {
            Ok(caller)
        } else {
            Err(GatewayError::Forbidden)
        }
    }
}

#[derive(Clone, Deserialize, Serialize)]
pub struct UserConfig {
    pub id: String,
    pub token: String,
    pub role: Role,
}

impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserConfig")
            .field("id", &self.id)
            .field("token", &"<redacted>")
            .field("role", &self.role)
            .finish()
    }
}

/// Fixed token table, typically loaded from the gateway config.
#[derive(Clone, Default)]
pub struct StaticIdentities {
    by_token: HashMap<String, Caller>,
}

impl StaticIdentities {
    pub fn new(users: &[UserConfig]) -> Self {
        let by_token = users
            .iter()
            .filter(|user| !user.token.trim().is_empty())
            .map(|user| {
                (
                    user.token.trim().to_string(),
                    Caller {
                        id: user.id.clone(),
                        role: user.role,
                    },
                )
            })
            .collect();
        Self { by_token }
    }

    pub fn with_user(mut self, id: impl Into<String>, token: impl Into<String>, role: Role) -> Self {
        self.by_token.insert(
            token.into(),
            Caller {
                id: id.into(),
                role,
            },
        );
        self
    }
}

#[async_trait]
impl IdentityResolver for StaticIdentities {
    async fn resolve(&self, token: &str) -> Option<Caller> {
        self.by_token.get(token.trim()).cloned()
    }
}
