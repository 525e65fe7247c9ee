//! # Job definitions: the immutable run contract.
//!
//! A [`JobDefinition`] names an executable together with the policies that
//! govern its runs: arguments, environment overlay, working directory, restart
//! policy, backoff and an optional per-attempt timeout. Definitions are
//! validated once by [`DefinitionBuilder::build`] and are immutable afterwards;
//! instances hold an `Arc` reference and never copy or mutate them.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use runjob::{JobDefinition, RestartPolicy};
//!
//! let def = JobDefinition::builder("echo-ok", "/bin/sh")
//!     .with_args(["-c", "echo ok"])
//!     .with_env("LANG", "C")
//!     .with_restart(RestartPolicy::OnFailure { max_attempts: 2 })
//!     .with_timeout(Duration::from_secs(5))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(def.id().as_str(), "echo-ok");
//! assert_eq!(def.command(), "/bin/sh");
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::policies::{BackoffPolicy, RestartPolicy};

/// Stable identity of a job definition.
///
/// Cheap to clone (`Arc`-backed). Identities are 1..=128 characters drawn
/// from `[A-Za-z0-9._-]`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(Arc<str>);

impl JobId {
    /// Validates and wraps an identity string.
    pub fn new(id: impl AsRef<str>) -> Result<Self, DefinitionError> {
        let raw = id.as_ref();
        if raw.is_empty() {
            return Err(invalid(raw, "identity must not be empty"));
        }
        if raw.len() > 128 {
            return Err(invalid(raw, "identity longer than 128 characters"));
        }
        if !raw
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(invalid(raw, "identity may only use [A-Za-z0-9._-]"));
        }
        Ok(Self(Arc::from(raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for JobId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

// Journal records are written by this crate; identities read back from them
// are trusted and not re-validated.
impl<'de> Deserialize<'de> for JobId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(|s| JobId(Arc::from(s.as_str())))
    }
}

fn invalid(id: &str, reason: &str) -> DefinitionError {
    DefinitionError::Invalid {
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// Immutable description of an executable to run under supervision.
///
/// Built via [`JobDefinition::builder`]; owned by the
/// [`DefinitionStore`](crate::DefinitionStore) after registration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobDefinition {
    id: JobId,
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    restart: RestartPolicy,
    backoff: BackoffPolicy,
    timeout: Option<Duration>,
}

impl JobDefinition {
    /// Starts a builder for the given identity and executable.
    pub fn builder(id: impl Into<String>, command: impl Into<String>) -> DefinitionBuilder {
        DefinitionBuilder::new(id, command)
    }

    pub fn id(&self) -> &JobId {
        &self.id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Environment overlay applied on top of the inherited environment.
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn cwd(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    pub fn restart(&self) -> RestartPolicy {
        self.restart
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    /// Per-attempt timeout, if configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Re-runs static validation.
    ///
    /// The store calls this at registration and replacement time so that
    /// filesystem-dependent checks (working directory) reflect the state at
    /// that moment, not at build time.
    pub fn validate(&self) -> Result<(), DefinitionError> {
        if self.command.trim().is_empty() {
            return Err(invalid(self.id.as_str(), "command must not be empty"));
        }
        if let Some(dir) = &self.cwd {
            if !dir.is_dir() {
                return Err(invalid(
                    self.id.as_str(),
                    &format!("working directory {} does not exist", dir.display()),
                ));
            }
        }
        for (i, (key, _)) in self.env.iter().enumerate() {
            if key.is_empty() {
                return Err(invalid(self.id.as_str(), "environment key must not be empty"));
            }
            if self.env[..i].iter().any(|(k, _)| k == key) {
                return Err(invalid(
                    self.id.as_str(),
                    &format!("conflicting environment key {key:?}"),
                ));
            }
        }
        if self.restart.max_attempts() == 0 {
            return Err(invalid(self.id.as_str(), "max_attempts must be at least 1"));
        }
        if !self.backoff.factor.is_finite() || self.backoff.factor < 0.0 {
            return Err(invalid(self.id.as_str(), "backoff factor must be finite and >= 0"));
        }
        if self.timeout == Some(Duration::ZERO) {
            return Err(invalid(self.id.as_str(), "timeout must be positive"));
        }
        Ok(())
    }
}

/// Fluent builder for [`JobDefinition`].
#[derive(Clone, Debug)]
pub struct DefinitionBuilder {
    id: String,
    command: String,
    args: Vec<String>,
    env: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    restart: RestartPolicy,
    backoff: BackoffPolicy,
    timeout: Option<Duration>,
}

impl DefinitionBuilder {
    pub fn new(id: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            command: command.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
            restart: RestartPolicy::default(),
            backoff: BackoffPolicy::default(),
            timeout: None,
        }
    }

    /// Replaces the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Appends one environment overlay entry.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn with_cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn with_restart(mut self, restart: RestartPolicy) -> Self {
        self.restart = restart;
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Validates and produces the immutable definition.
    pub fn build(self) -> Result<JobDefinition, DefinitionError> {
        let id = JobId::new(&self.id)?;
        let def = JobDefinition {
            id,
            command: self.command,
            args: self.args,
            env: self.env,
            cwd: self.cwd,
            restart: self.restart,
            backoff: self.backoff,
            timeout: self.timeout,
        };
        def.validate()?;
        Ok(def)
    }
}
