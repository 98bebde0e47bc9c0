//! Validated ROS graph resource names.
//!
//! The original C node passed raw `char *` topic/service names around and
//! only implicitly relied on them beginning with `/`. Here that invariant
//! (spec: "topic name is non-empty and begins with `/`") is enforced by
//! construction instead.

use crate::error::{Error, Result};

/// A fully-resolved, global graph resource name (always begins with `/`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Name(String);

impl Name {
    /// Wraps an already-global name, validating it.
    pub fn new(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidName("name is empty".to_string()));
        }
        if !raw.starts_with('/') {
            return Err(Error::InvalidName(format!(
                "name must be global (begin with '/'): {raw:?}"
            )));
        }
        if raw.contains(' ') {
            return Err(Error::InvalidName(format!(
                "name must not contain whitespace: {raw:?}"
            )));
        }
        Ok(Self(raw.to_string()))
    }

    /// Resolves `raw` against `namespace`, producing a global [`Name`].
    ///
    /// - Names already beginning with `/` are global and pass through.
    /// - Names beginning with `~` are "private": resolved under `namespace`
    ///   directly (roslibrust has no concept of a node-local sub-namespace
    ///   distinct from its own namespace, so `~foo` and a relative `foo`
    ///   resolve identically here).
    /// - Anything else is relative and resolved under `namespace`.
    pub fn resolve(namespace: &str, raw: &str) -> Result<Self> {
        if raw.starts_with('/') {
            return Self::new(raw);
        }
        let stripped = raw.strip_prefix('~').unwrap_or(raw);
        let ns = namespace.trim_end_matches('/');
        Self::new(&format!("{ns}/{stripped}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::ops::Deref for Name {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn global_names_pass_through() {
        assert_eq!(Name::new("/chatter").unwrap().as_str(), "/chatter");
    }

    #[test]
    fn empty_and_relative_names_are_rejected_without_namespace() {
        assert!(Name::new("").is_err());
        assert!(Name::new("chatter").is_err());
    }

    #[test]
    fn relative_names_resolve_against_namespace() {
        let resolved = Name::resolve("/robot1", "chatter").unwrap();
        assert_eq!(resolved.as_str(), "/robot1/chatter");
    }

    #[test]
    fn private_names_resolve_against_namespace() {
        let resolved = Name::resolve("/robot1", "~status").unwrap();
        assert_eq!(resolved.as_str(), "/robot1/status");
    }

    #[test]
    fn already_global_names_ignore_namespace() {
        let resolved = Name::resolve("/robot1", "/chatter").unwrap();
        assert_eq!(resolved.as_str(), "/chatter");
    }
}
