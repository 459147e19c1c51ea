//! Sweep files: a whole sweep described as one JSON document
//!
//! ```json
//! {
//!   "parameters": [
//!     { "name": "r", "values": [1, 2] },
//!     { "name": "trace", "values": ["gcc", "mcf"] }
//!   ],
//!   "command": {
//!     "program": "./procsim",
//!     "args": ["-r{r}", { "path": { "base": "traces", "file": "{trace}.trace" } }]
//!   },
//!   "extractor": {
//!     "line_from_end": 2,
//!     "delimiter": { "char": ":" },
//!     "fields": [{ "name": "ipc", "index": 1 }]
//!   },
//!   "workers": 4,
//!   "timeout_ms": 60000
//! }
//! ```
//!
//! Plain-string arguments are placeholder patterns; `literal`, `format` and
//! `path` objects select the argument kind explicitly.

use crate::command::{ArgTemplate, CommandTemplate};
use crate::extract::LineFieldExtractor;
use crate::space::{ConfigSpace, Parameter, Value};
use crate::sweep::{ExitPolicy, Sweep, SweepConfig};
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// A parameter as written in a sweep file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name, referenced as `{name}` in command patterns
    pub name: String,
    /// Candidate values: JSON integers, floats or strings
    pub values: Vec<Value>,
}

/// One command argument as written in a sweep file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgSpec {
    /// Shorthand for a placeholder pattern
    Pattern(String),
    /// Explicit argument kind
    Template(ArgTemplate),
}

impl From<ArgSpec> for ArgTemplate {
    fn from(spec: ArgSpec) -> Self {
        match spec {
            ArgSpec::Pattern(pattern) => Self::Format(pattern),
            ArgSpec::Template(template) => template,
        }
    }
}

/// The command section of a sweep file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Executable to run
    pub program: PathBuf,
    /// Arguments, in order
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

/// A complete sweep description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    /// Parameters in declaration order (the last varies fastest)
    pub parameters: Vec<ParameterSpec>,
    /// How each configuration becomes a command line
    pub command: CommandSpec,
    /// How metrics are read from stdout
    pub extractor: LineFieldExtractor,
    /// Worker-pool size (default: available parallelism)
    #[serde(default)]
    pub workers: Option<usize>,
    /// Per-invocation timeout in milliseconds
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Non-zero exit handling
    #[serde(default)]
    pub exit_policy: ExitPolicy,
}

impl SweepFile {
    /// Read and parse a sweep file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a JSON error if it
    /// is not a valid sweep description.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let file = Self::from_json(&text)?;
        debug!(path = %path.display(), parameters = file.parameters.len(), "loaded sweep file");
        Ok(file)
    }

    /// Parse a sweep description from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the text is not a valid sweep description.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Build the declared configuration space.
    ///
    /// # Errors
    ///
    /// Returns a configuration-space error for empty or duplicate
    /// declarations.
    pub fn space(&self) -> Result<ConfigSpace> {
        ConfigSpace::new(
            self.parameters
                .iter()
                .map(|p| Parameter::new(p.name.clone(), p.values.iter().cloned()))
                .collect(),
        )
    }

    /// Build the command template.
    #[must_use]
    pub fn command_template(&self) -> CommandTemplate {
        CommandTemplate::with_args(
            self.command.program.clone(),
            self.command.args.iter().cloned().map(Into::into).collect(),
        )
    }

    /// Build the execution knobs.
    ///
    /// # Errors
    ///
    /// Returns an invalid-pool-size error for `"workers": 0`.
    pub fn sweep_config(&self) -> Result<SweepConfig> {
        let mut builder = SweepConfig::builder().exit_policy(self.exit_policy);
        if let Some(workers) = self.workers {
            builder = builder.workers(workers);
        }
        if let Some(ms) = self.timeout_ms {
            builder = builder.timeout(Duration::from_millis(ms));
        }
        builder.build()
    }

    /// Assemble the runnable sweep, validating every section.
    ///
    /// # Errors
    ///
    /// Returns the first space, extractor, template or pool-size error.
    pub fn into_sweep(self) -> Result<Sweep> {
        let space = self.space()?;
        self.extractor.validate()?;
        let config = self.sweep_config()?;
        let command = self.command_template();
        Sweep::new(space, command, self.extractor, config)
    }
}
