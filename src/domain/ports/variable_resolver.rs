//! Variable/secret resolution port.
//!
//! Resolution turns placeholder names inside a script body into plain values
//! scoped to a project. The resolver returns the substituted names alongside
//! the resolved body so callers can log *what* was injected without ever
//! logging secret values.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::models::ProjectScope;

/// One substitution performed during resolution. Carries the name only;
/// values live in the resolved body and nowhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Substitution {
    /// Placeholder name
    pub name: String,
    /// Secret substitutions must never appear in logs verbatim
    pub secret: bool,
}

/// A script body after variable resolution.
#[derive(Debug, Clone)]
pub struct ResolvedScript {
    /// Body with every placeholder substituted
    pub body: String,
    /// Names substituted, for audit-safe logging
    pub substitutions: Vec<Substitution>,
}

impl ResolvedScript {
    /// Names safe to log: plain variables verbatim, secrets flagged.
    pub fn audit_names(&self) -> Vec<String> {
        self.substitutions
            .iter()
            .map(|s| {
                if s.secret {
                    format!("{} (secret)", s.name)
                } else {
                    s.name.clone()
                }
            })
            .collect()
    }
}

/// Resolution failures abort dispatch before any run or queue footprint
/// exists; they are configuration problems, not runtime faults.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("unknown variable {name} in scope {scope}")]
    UnknownVariable { name: String, scope: String },

    #[error("unknown project scope {0}")]
    UnknownScope(String),

    #[error("variable store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Port to the external variable/secret store.
#[async_trait]
pub trait VariableResolver: Send + Sync {
    /// Resolve every placeholder in `body` within a project scope.
    async fn resolve(
        &self,
        body: &str,
        scope: &ProjectScope,
    ) -> Result<ResolvedScript, ResolveError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_names_flag_secrets() {
        let resolved = ResolvedScript {
            body: "token=abc".to_string(),
            substitutions: vec![
                Substitution {
                    name: "BASE_URL".to_string(),
                    secret: false,
                },
                Substitution {
                    name: "API_TOKEN".to_string(),
                    secret: true,
                },
            ],
        };
        let names = resolved.audit_names();
        assert_eq!(names, vec!["BASE_URL", "API_TOKEN (secret)"]);
    }
}
