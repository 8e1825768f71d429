//! Check task domain model.
//!
//! A check task is an immutable execution request: one or more scripts, an
//! execution profile, and routing hints. Tasks are validated once at dispatch
//! and never mutated afterwards.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use uuid::Uuid;

use crate::domain::errors::DomainError;

/// What initiated a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerSource {
    /// A human clicked "run now"
    Manual,
    /// A schedule fired
    Scheduled,
    /// An API/CI caller triggered the run
    Remote,
}

impl Default for TriggerSource {
    fn default() -> Self {
        Self::Manual
    }
}

impl TriggerSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Scheduled => "scheduled",
            Self::Remote => "remote",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "manual" => Some(Self::Manual),
            "scheduled" => Some(Self::Scheduled),
            "remote" => Some(Self::Remote),
            _ => None,
        }
    }
}

/// One script definition inside a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptSpec {
    /// Script identifier in the external script store
    pub id: Uuid,
    /// Human-readable name
    pub name: String,
    /// Raw script body, before variable resolution
    pub body: String,
    /// Optional declared script type (e.g. "playwright", "k6")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
}

impl ScriptSpec {
    pub fn new(name: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            body: body.into(),
            declared_type: None,
        }
    }

    /// Set the declared script type.
    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }
}

/// How a task is executed, with per-variant routing payload.
///
/// Modeled as a tagged variant so the two submission paths stay statically
/// distinguishable instead of branching on runtime type inspection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "profile", rename_all = "snake_case")]
pub enum ExecutionProfile {
    /// Single-script browser automation check
    Browser,
    /// Distributed load test, routed by geographic location
    LoadTest {
        /// Location the load is generated from
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<String>,
    },
}

impl ExecutionProfile {
    /// Engine name recorded on the run.
    pub fn engine(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::LoadTest { .. } => "loadtest",
        }
    }

    /// Whether this profile accepts a single script only.
    pub fn single_script(&self) -> bool {
        matches!(self, Self::Browser)
    }

    /// Queue class for capacity accounting and broker routing.
    ///
    /// An explicit location hint on the task overrides the profile's own.
    pub fn queue_class(&self, location_hint: Option<&str>) -> QueueClass {
        match self {
            Self::Browser => QueueClass::browser(),
            Self::LoadTest { location } => {
                let loc = location_hint.or(location.as_deref());
                QueueClass::load_test(loc)
            }
        }
    }
}

/// Partitioning key for capacity accounting and broker routing.
///
/// Rendered as a stable string: `browser`, `loadtest`, `loadtest:<location>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueueClass(String);

impl QueueClass {
    pub fn browser() -> Self {
        Self("browser".to_string())
    }

    pub fn load_test(location: Option<&str>) -> Self {
        match location {
            Some(loc) if !loc.is_empty() => Self(format!("loadtest:{loc}")),
            _ => Self("loadtest".to_string()),
        }
    }

    /// Parse from the stable string form.
    pub fn parse(s: &str) -> Self {
        Self(s.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Scope under which variables and secrets are resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectScope(String);

impl ProjectScope {
    pub fn new(scope: impl Into<String>) -> Self {
        Self(scope.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProjectScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckTask {
    /// The job (check definition) being executed
    pub job_id: Uuid,
    /// Ordered list of scripts to execute
    pub scripts: Vec<ScriptSpec>,
    /// Execution profile, drives routing and validation
    pub profile: ExecutionProfile,
    /// Optional geographic hint, overrides the profile's location
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_hint: Option<String>,
}

impl CheckTask {
    pub fn new(job_id: Uuid, profile: ExecutionProfile, scripts: Vec<ScriptSpec>) -> Self {
        Self {
            job_id,
            scripts,
            profile,
            location_hint: None,
        }
    }

    /// Set a location hint.
    pub fn with_location_hint(mut self, location: impl Into<String>) -> Self {
        self.location_hint = Some(location.into());
        self
    }

    /// Queue class this task routes to.
    pub fn queue_class(&self) -> QueueClass {
        self.profile.queue_class(self.location_hint.as_deref())
    }

    /// Effective location, if any.
    pub fn location(&self) -> Option<&str> {
        self.location_hint.as_deref().or(match &self.profile {
            ExecutionProfile::LoadTest { location } => location.as_deref(),
            ExecutionProfile::Browser => None,
        })
    }

    /// Validate the task shape before any state is created.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.scripts.is_empty() {
            return Err(DomainError::ValidationFailed(
                "task contains no scripts".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for script in &self.scripts {
            if !seen.insert(script.id) {
                return Err(DomainError::ValidationFailed(format!(
                    "duplicate script {} in task",
                    script.id
                )));
            }
            if script.body.trim().is_empty() {
                return Err(DomainError::ValidationFailed(format!(
                    "script {} has an empty body",
                    script.id
                )));
            }
        }

        if self.profile.single_script() && self.scripts.len() > 1 {
            return Err(DomainError::ValidationFailed(format!(
                "{} profile accepts a single script, got {}",
                self.profile.engine(),
                self.scripts.len()
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_task(scripts: Vec<ScriptSpec>) -> CheckTask {
        CheckTask::new(Uuid::new_v4(), ExecutionProfile::Browser, scripts)
    }

    #[test]
    fn test_valid_browser_task() {
        let task = browser_task(vec![ScriptSpec::new("homepage", "open('/');")]);
        assert!(task.validate().is_ok());
        assert_eq!(task.queue_class().as_str(), "browser");
    }

    #[test]
    fn test_empty_script_list_rejected() {
        let task = browser_task(vec![]);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_duplicate_scripts_rejected() {
        let script = ScriptSpec::new("dup", "open('/');");
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::LoadTest { location: None },
            vec![script.clone(), script],
        );
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_browser_profile_is_single_script() {
        let task = browser_task(vec![
            ScriptSpec::new("one", "open('/');"),
            ScriptSpec::new("two", "open('/about');"),
        ]);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_load_test_accepts_multiple_scripts() {
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::LoadTest { location: None },
            vec![
                ScriptSpec::new("warmup", "get('/');"),
                ScriptSpec::new("main", "get('/api');"),
            ],
        );
        assert!(task.validate().is_ok());
    }

    #[test]
    fn test_empty_body_rejected() {
        let task = browser_task(vec![ScriptSpec::new("blank", "   ")]);
        assert!(task.validate().is_err());
    }

    #[test]
    fn test_queue_class_routing() {
        assert_eq!(QueueClass::browser().as_str(), "browser");
        assert_eq!(QueueClass::load_test(None).as_str(), "loadtest");
        assert_eq!(
            QueueClass::load_test(Some("eu-west")).as_str(),
            "loadtest:eu-west"
        );
    }

    #[test]
    fn test_location_hint_overrides_profile_location() {
        let task = CheckTask::new(
            Uuid::new_v4(),
            ExecutionProfile::LoadTest {
                location: Some("us-east".to_string()),
            },
            vec![ScriptSpec::new("load", "get('/');")],
        )
        .with_location_hint("ap-south");

        assert_eq!(task.queue_class().as_str(), "loadtest:ap-south");
        assert_eq!(task.location(), Some("ap-south"));
    }

    #[test]
    fn test_trigger_source_round_trip() {
        for trigger in [
            TriggerSource::Manual,
            TriggerSource::Scheduled,
            TriggerSource::Remote,
        ] {
            assert_eq!(TriggerSource::from_str(trigger.as_str()), Some(trigger));
        }
    }
}
