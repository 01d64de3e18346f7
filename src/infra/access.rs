//! Static role grants and bearer-token actors loaded from configuration.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::application::access::{Actor, PermissionGate};
use crate::infra::error::InfraError;

/// Maps role names to permission patterns.
///
/// A pattern is an exact permission (`cms.edit`), a prefix wildcard
/// (`cms.*`, matching `cms.edit` and `cms.meta.edit`) or `*`.
#[derive(Debug, Clone, Default)]
pub struct RolePermissions {
    roles: HashMap<String, Vec<String>>,
}

impl RolePermissions {
    pub fn new(roles: HashMap<String, Vec<String>>) -> Self {
        Self { roles }
    }

    pub fn grant(mut self, role: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.roles
            .entry(role.into())
            .or_default()
            .push(pattern.into());
        self
    }
}

fn pattern_matches(pattern: &str, permission: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix(".*") {
        Some(prefix) => permission
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.') && rest.len() > 1),
        None => pattern == permission,
    }
}

impl PermissionGate for RolePermissions {
    fn allows(&self, actor: &Actor, permission: &str) -> bool {
        actor
            .roles
            .iter()
            .filter_map(|role| self.roles.get(role))
            .flatten()
            .any(|pattern| pattern_matches(pattern, permission))
    }
}

#[derive(Debug, Clone)]
pub struct ActorCredential {
    actor: Actor,
    token_hash: Vec<u8>,
}

impl ActorCredential {
    /// `token_sha256` is the lowercase or uppercase hex SHA-256 of the bearer token.
    pub fn new(
        name: impl Into<String>,
        roles: Vec<String>,
        token_sha256: &str,
    ) -> Result<Self, InfraError> {
        let name = name.into();
        let token_hash = hex::decode(token_sha256.trim()).map_err(|err| {
            InfraError::configuration(format!("actor `{name}` has an invalid token hash: {err}"))
        })?;
        if token_hash.len() != 32 {
            return Err(InfraError::configuration(format!(
                "actor `{name}` token hash must be 64 hex digits"
            )));
        }
        Ok(Self {
            actor: Actor::new(name, roles),
            token_hash,
        })
    }
}

/// Resolves bearer tokens to configured actors.
#[derive(Debug, Clone, Default)]
pub struct ActorDirectory {
    credentials: Vec<ActorCredential>,
}

impl ActorDirectory {
    pub fn new(credentials: Vec<ActorCredential>) -> Self {
        Self { credentials }
    }

    pub fn hash_token(token: &str) -> Vec<u8> {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hasher.finalize().to_vec()
    }

    pub fn authenticate(&self, token: &str) -> Option<Actor> {
        let hashed = Self::hash_token(token);
        let mut found = None;
        for credential in &self.credentials {
            if credential.token_hash.ct_eq(&hashed).unwrap_u8() == 1 && found.is_none() {
                found = Some(credential.actor.clone());
            }
        }
        found
    }

    pub fn len(&self) -> usize {
        self.credentials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.credentials.is_empty()
    }
}
