//! Config-seeded variable resolver.
//!
//! Resolves `{{NAME}}` placeholders from per-project maps loaded at startup.
//! Production deployments point the resolver port at the real variable store;
//! this adapter serves local use and tests, and defines the substitution
//! semantics both share.

use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;

use crate::domain::models::{ProjectScope, VariableSpec};
use crate::domain::ports::{ResolveError, ResolvedScript, Substitution, VariableResolver};

#[derive(Debug, Clone)]
struct StoredVariable {
    value: String,
    secret: bool,
}

/// Resolver over a fixed in-memory map of scopes.
pub struct StaticVariableResolver {
    scopes: HashMap<String, HashMap<String, StoredVariable>>,
    placeholder: Regex,
}

impl StaticVariableResolver {
    pub fn new() -> Self {
        Self {
            scopes: HashMap::new(),
            // {{NAME}}, optional inner whitespace
            placeholder: Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_]*)\s*\}\}")
                .expect("placeholder pattern is valid"),
        }
    }

    /// Build from the `variables` section of the config file.
    pub fn from_config(variables: &HashMap<String, Vec<VariableSpec>>) -> Self {
        let mut resolver = Self::new();
        for (scope, specs) in variables {
            for spec in specs {
                resolver.insert(scope, &spec.name, &spec.value, spec.secret);
            }
        }
        resolver
    }

    /// Add a variable to a scope.
    pub fn insert(&mut self, scope: &str, name: &str, value: &str, secret: bool) {
        self.scopes.entry(scope.to_string()).or_default().insert(
            name.to_string(),
            StoredVariable {
                value: value.to_string(),
                secret,
            },
        );
    }
}

impl Default for StaticVariableResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl VariableResolver for StaticVariableResolver {
    async fn resolve(
        &self,
        body: &str,
        scope: &ProjectScope,
    ) -> Result<ResolvedScript, ResolveError> {
        let names: Vec<String> = self
            .placeholder
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .collect();

        if names.is_empty() {
            return Ok(ResolvedScript {
                body: body.to_string(),
                substitutions: vec![],
            });
        }

        let variables = self
            .scopes
            .get(scope.as_str())
            .ok_or_else(|| ResolveError::UnknownScope(scope.to_string()))?;

        // Fail before substituting anything so a half-resolved body never
        // escapes this function.
        for name in &names {
            if !variables.contains_key(name) {
                return Err(ResolveError::UnknownVariable {
                    name: name.clone(),
                    scope: scope.to_string(),
                });
            }
        }

        let resolved = self
            .placeholder
            .replace_all(body, |caps: &regex::Captures| {
                variables[&caps[1]].value.clone()
            })
            .to_string();

        let mut substitutions: Vec<Substitution> = Vec::new();
        for name in names {
            if substitutions.iter().any(|s| s.name == name) {
                continue;
            }
            let secret = variables[&name].secret;
            substitutions.push(Substitution { name, secret });
        }

        Ok(ResolvedScript {
            body: resolved,
            substitutions,
        })
    }
}
