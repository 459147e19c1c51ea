//! Command building: configuration → external process invocation
//!
//! A [`CommandBuilder`] maps one [`Configuration`] to an [`Invocation`]
//! (executable path + ordered arguments). The stock implementation is
//! [`CommandTemplate`], which substitutes `{name}` placeholders with the
//! configuration's values; any closure `Fn(&Configuration) -> Invocation`
//! works too.
//!
//! ```rust
//! use trueno_sweep::command::{CommandBuilder, CommandTemplate};
//! use trueno_sweep::space::ConfigSpace;
//!
//! # fn main() -> trueno_sweep::Result<()> {
//! let space = ConfigSpace::builder()
//!     .param("r", [2])
//!     .param("trace", ["gcc"])
//!     .build()?;
//! let template = CommandTemplate::new("./procsim")
//!     .literal("-r")
//!     .format("{r}")
//!     .literal("-i")
//!     .path("traces", "{trace}.100k.trace");
//! template.validate(&space)?;
//!
//! let config = space.iter().next().unwrap();
//! let invocation = template.build(&config);
//! assert_eq!(invocation.arg_list().len(), 4);
//! # Ok(())
//! # }
//! ```

use crate::space::{ConfigSpace, Configuration};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

/// A concrete external-process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    program: PathBuf,
    args: Vec<OsString>,
}

impl Invocation {
    /// Create an invocation of `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Get the executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Get the ordered argument list.
    #[must_use]
    pub fn arg_list(&self) -> &[OsString] {
        &self.args
    }
}

impl fmt::Display for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in &self.args {
            write!(f, " {}", arg.to_string_lossy())?;
        }
        Ok(())
    }
}

/// Maps configurations to invocations.
///
/// `build` must be total over the space it was validated against: every
/// configuration of that space yields exactly one well-formed invocation.
pub trait CommandBuilder: Send + Sync {
    /// Build the invocation for one configuration.
    fn build(&self, config: &Configuration) -> Invocation;

    /// Check, before any work starts, that every configuration of `space`
    /// can be built.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommandTemplate`] if the builder depends on
    /// something the space does not declare.
    fn validate(&self, space: &ConfigSpace) -> Result<()> {
        let _ = space;
        Ok(())
    }
}

impl<F> CommandBuilder for F
where
    F: Fn(&Configuration) -> Invocation + Send + Sync,
{
    fn build(&self, config: &Configuration) -> Invocation {
        self(config)
    }
}

/// One argument of a [`CommandTemplate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgTemplate {
    /// Passed through verbatim
    Literal(String),
    /// `{name}` placeholders replaced by configuration values (`{{`/`}}` escape)
    Format(String),
    /// `base` joined with the rendered `file` pattern
    Path {
        /// Directory the file lives in
        base: PathBuf,
        /// File name pattern, rendered like [`ArgTemplate::Format`]
        file: String,
    },
}

/// Placeholder-based [`CommandBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTemplate {
    program: PathBuf,
    #[serde(default)]
    args: Vec<ArgTemplate>,
}

impl CommandTemplate {
    /// Create a template for `program` with no arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Create a template from a prepared argument list.
    #[must_use]
    pub fn with_args(program: impl Into<PathBuf>, args: Vec<ArgTemplate>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Append a verbatim argument.
    #[must_use]
    pub fn literal(mut self, arg: impl Into<String>) -> Self {
        self.args.push(ArgTemplate::Literal(arg.into()));
        self
    }

    /// Append a placeholder-formatted argument.
    #[must_use]
    pub fn format(mut self, pattern: impl Into<String>) -> Self {
        self.args.push(ArgTemplate::Format(pattern.into()));
        self
    }

    /// Append a path argument: `base` joined with the rendered `file` pattern.
    #[must_use]
    pub fn path(mut self, base: impl Into<PathBuf>, file: impl Into<String>) -> Self {
        self.args.push(ArgTemplate::Path {
            base: base.into(),
            file: file.into(),
        });
        self
    }

    /// Get the executable path.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Number of arguments every built invocation carries.
    #[must_use]
    pub fn arity(&self) -> usize {
        self.args.len()
    }
}

impl CommandBuilder for CommandTemplate {
    fn build(&self, config: &Configuration) -> Invocation {
        let args = self.args.iter().map(|arg| match arg {
            ArgTemplate::Literal(s) => OsString::from(s),
            ArgTemplate::Format(pattern) => OsString::from(render(pattern, config)),
            ArgTemplate::Path { base, file } => base.join(render(file, config)).into_os_string(),
        });
        Invocation::new(&self.program).args(args)
    }

    fn validate(&self, space: &ConfigSpace) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(Error::CommandTemplate("program path is empty".to_string()));
        }

        for arg in &self.args {
            let pattern = match arg {
                ArgTemplate::Literal(_) => continue,
                ArgTemplate::Path { file, .. } if file.is_empty() => {
                    return Err(Error::CommandTemplate(
                        "path argument has an empty file pattern".to_string(),
                    ));
                }
                ArgTemplate::Format(pattern) | ArgTemplate::Path { file: pattern, .. } => pattern,
            };
            for segment in parse_pattern(pattern).map_err(Error::CommandTemplate)? {
                if let Segment::Field(name) = segment {
                    if space.param(name).is_none() {
                        return Err(Error::CommandTemplate(format!(
                            "placeholder {{{name}}} in \"{pattern}\" names no declared parameter"
                        )));
                    }
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Text(&'a str),
    Field(&'a str),
}

fn parse_pattern(pattern: &str) -> std::result::Result<Vec<Segment<'_>>, String> {
    let mut segments = Vec::new();
    let mut rest = pattern;

    while let Some(pos) = rest.find(|c: char| c == '{' || c == '}') {
        if pos > 0 {
            segments.push(Segment::Text(&rest[..pos]));
        }
        let tail = &rest[pos..];

        if let Some(after) = tail.strip_prefix("{{") {
            segments.push(Segment::Text("{"));
            rest = after;
        } else if let Some(after) = tail.strip_prefix("}}") {
            segments.push(Segment::Text("}"));
            rest = after;
        } else if tail.starts_with('{') {
            let end = tail
                .find('}')
                .ok_or_else(|| format!("unclosed '{{' in \"{pattern}\""))?;
            let name = &tail[1..end];
            if name.is_empty() || name.contains('{') {
                return Err(format!("malformed placeholder in \"{pattern}\""));
            }
            segments.push(Segment::Field(name));
            rest = &tail[end + 1..];
        } else {
            return Err(format!("unmatched '}}' in \"{pattern}\""));
        }
    }

    if !rest.is_empty() {
        segments.push(Segment::Text(rest));
    }
    Ok(segments)
}

/// Render a placeholder pattern; unknown or malformed placeholders are kept
/// verbatim (validation rejects them before a sweep starts).
fn render(pattern: &str, config: &Configuration) -> String {
    let Ok(segments) = parse_pattern(pattern) else {
        return pattern.to_string();
    };

    let mut out = String::with_capacity(pattern.len());
    for segment in segments {
        match segment {
            Segment::Text(text) => out.push_str(text),
            Segment::Field(name) => match config.get(name) {
                Some(value) => out.push_str(&value.to_string()),
                None => {
                    out.push('{');
                    out.push_str(name);
                    out.push('}');
                }
            },
        }
    }
    out
}
