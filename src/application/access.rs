//! Actors and the permission seam used to gate editing.

use serde::Serialize;

/// An authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Actor {
    pub name: String,
    pub roles: Vec<String>,
}

impl Actor {
    pub fn new(name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            name: name.into(),
            roles,
        }
    }

    pub fn label(&self) -> String {
        format!("actor:{}", self.name)
    }
}

pub trait PermissionGate: Send + Sync {
    fn allows(&self, actor: &Actor, permission: &str) -> bool;
}
