//! Validated identifiers used to address pieces, page meta, and views.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::error::DomainError;

const MAX_CODE_LEN: usize = 255;

/// Code identifying a piece or a page meta record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentCode(String);

impl ContentCode {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::validation("code", "must not be empty"));
        }
        if trimmed.chars().count() > MAX_CODE_LEN {
            return Err(DomainError::validation(
                "code",
                format!("must be at most {MAX_CODE_LEN} characters"),
            ));
        }
        if trimmed
            .chars()
            .any(|ch| ch.is_whitespace() || ch.is_control())
        {
            return Err(DomainError::validation(
                "code",
                "must not contain whitespace or control characters",
            ));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ContentCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentCode> for String {
    fn from(code: ContentCode) -> Self {
        code.0
    }
}

impl fmt::Display for ContentCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A template addressed by namespace and view path.
///
/// Both parts end up in file-system paths, so they are restricted to a
/// conservative character set and views may not walk out of their namespace.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewAddress {
    namespace: String,
    view: String,
}

impl ViewAddress {
    pub fn new(namespace: &str, view: &str) -> Result<Self, DomainError> {
        let namespace = namespace.trim();
        if namespace.is_empty() {
            return Err(DomainError::validation("namespace", "must not be empty"));
        }
        if !namespace
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_')
        {
            return Err(DomainError::validation(
                "namespace",
                format!("`{namespace}` may only contain ASCII letters, digits, `-` and `_`"),
            ));
        }

        let view = view.trim().trim_matches('/');
        if view.is_empty() {
            return Err(DomainError::validation("view", "must not be empty"));
        }
        for segment in view.split('/') {
            if segment.is_empty() || segment == "." || segment == ".." {
                return Err(DomainError::validation(
                    "view",
                    format!("`{view}` contains an empty or relative segment"),
                ));
            }
            if !segment
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
            {
                return Err(DomainError::validation(
                    "view",
                    format!("`{view}` may only contain ASCII letters, digits, `-`, `_`, `.` and `/`"),
                ));
            }
        }

        Ok(Self {
            namespace: namespace.to_string(),
            view: view.to_string(),
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn view(&self) -> &str {
        &self.view
    }

    /// View path split into its segments.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.view.split('/')
    }
}

impl fmt::Display for ViewAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.view)
    }
}

/// Composite key of a page meta record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetaKey {
    pub address: ViewAddress,
    pub code: ContentCode,
}

impl MetaKey {
    pub fn new(address: ViewAddress, code: ContentCode) -> Self {
        Self { address, code }
    }

    pub fn parse(namespace: &str, view: &str, code: &str) -> Result<Self, DomainError> {
        Ok(Self {
            address: ViewAddress::new(namespace, view)?,
            code: ContentCode::parse(code)?,
        })
    }
}
