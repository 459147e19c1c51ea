//! # Trueno-Sweep: Parameter-Sweep Benchmark Harness
//!
//! **Version**: 0.1.0
//!
//! Trueno-Sweep runs an external simulator once per point of a Cartesian
//! configuration space, extracts fixed-format statistics from each run's
//! output and collects everything into a frozen table for selection
//! queries (per-group best, near-optimal filtering, cheapest near-optimal
//! configuration).
//!
//! ## Pipeline
//!
//! ```text
//! ConfigSpace ──► Sweep (bounded worker pool)
//!                   │  CommandBuilder → ProcessRunner → Extractor
//!                   ▼
//!               ResultTable ──► aggregation / rows / Arrow
//! ```
//!
//! - **Deterministic**: configurations enumerate with the last parameter
//!   varying fastest; tables keep that order
//! - **Isolated failures**: a crash, timeout or unparsable output is recorded
//!   for its configuration and never aborts sibling runs
//! - **Bounded**: at most `workers` child processes run at once
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use trueno_sweep::command::CommandTemplate;
//! use trueno_sweep::extract::{Delimiter, LineFieldExtractor, MetricKind};
//! use trueno_sweep::space::ConfigSpace;
//! use trueno_sweep::sweep::{Sweep, SweepConfig};
//! use trueno_sweep::table::sum_of;
//!
//! # async fn example() -> trueno_sweep::Result<()> {
//! let space = ConfigSpace::builder()
//!     .param("r", [2, 4, 8])
//!     .param("f", [2, 4])
//!     .param("trace", ["gcc", "mcf"])
//!     .build()?;
//!
//! let command = CommandTemplate::new("./procsim")
//!     .format("-r{r}")
//!     .format("-f{f}")
//!     .path("traces", "{trace}.100k.trace");
//! let extractor = LineFieldExtractor::new(2)
//!     .delimiter(Delimiter::Char(':'))
//!     .field("ipc", 1, MetricKind::Float);
//!
//! let sweep = Sweep::new(space, command, extractor, SweepConfig::default())?;
//! let table = sweep.run().await;
//! println!("{}", table.summary());
//!
//! let by_trace = table.param_key("trace")?;
//! for (trace, pick) in table.select_min_cost(by_trace, "ipc", 0.05, sum_of(["r", "f"]))? {
//!     println!("{trace}: {} (ipc {:.3})", pick.candidate.configuration, pick.candidate.value);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod command;
pub mod config;
pub mod error;
pub mod extract;
pub mod runner;
pub mod space;
pub mod sweep;
pub mod table;

pub use error::{Error, Result};
