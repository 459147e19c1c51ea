//! Sweep orchestration: bounded worker pool over a configuration space
//!
//! A fixed number of workers pull configurations from one shared queue and
//! each performs Build → Run → Extract. Results are inserted into a
//! concurrent map keyed by configuration; the table is assembled only after
//! every worker has finished, so callers never see a partial sweep.
//!
//! Every configuration ends up in the table exactly once: as a success, as a
//! typed [`Failure`], or as [`Outcome::Skipped`] if cancellation stopped the
//! sweep before it was dispatched.
//!
//! # Example
//!
//! ```rust,no_run
//! use trueno_sweep::command::CommandTemplate;
//! use trueno_sweep::extract::{LineFieldExtractor, MetricKind};
//! use trueno_sweep::space::ConfigSpace;
//! use trueno_sweep::sweep::{Sweep, SweepConfig};
//!
//! # async fn example() -> trueno_sweep::Result<()> {
//! let space = ConfigSpace::builder()
//!     .param("r", [1, 2])
//!     .param("j", [1, 2])
//!     .build()?;
//! let command = CommandTemplate::new("./procsim").format("-r{r}").format("-j{j}");
//! let extractor = LineFieldExtractor::new(1).field("ipc", -1, MetricKind::Float);
//! let config = SweepConfig::builder().workers(2).build()?;
//!
//! let table = Sweep::new(space, command, extractor, config)?.run().await;
//! println!("{}", table.summary());
//! # Ok(())
//! # }
//! ```

mod cancel;
mod outcome;

pub use cancel::{cancellation, CancelSignal, Canceller};
pub use outcome::{Failure, FailureKind, Outcome};

use crate::command::CommandBuilder;
use crate::extract::{tail, Extractor};
use crate::runner::{ExitState, ProcessRunner, RunError, RunResult, DEFAULT_KILL_GRACE};
use crate::space::{ConfigSpace, Configuration};
use crate::table::{ResultRecord, ResultTable};
use crate::{Error, Result};
use chrono::Utc;
use dashmap::DashMap;
use outcome::STDERR_TAIL_BYTES;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::{JoinError, JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

/// What to do with the output of a process that exited non-zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPolicy {
    /// Record a process failure without looking at stdout
    #[default]
    Fail,
    /// Try extraction anyway; keep the exit failure if it does not succeed
    ExtractAnyway,
}

/// Execution knobs for one sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepConfig {
    workers: usize,
    timeout: Option<Duration>,
    exit_policy: ExitPolicy,
    kill_grace: Duration,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout: None,
            exit_policy: ExitPolicy::default(),
            kill_grace: DEFAULT_KILL_GRACE,
        }
    }
}

impl SweepConfig {
    /// Create a config builder.
    #[must_use]
    pub fn builder() -> SweepConfigBuilder {
        SweepConfigBuilder::default()
    }

    /// Number of concurrent workers.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Per-invocation timeout.
    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Non-zero exit handling.
    #[must_use]
    pub const fn exit_policy(&self) -> ExitPolicy {
        self.exit_policy
    }

    /// Pipe drain allowance after a forced kill.
    #[must_use]
    pub const fn kill_grace(&self) -> Duration {
        self.kill_grace
    }
}

/// Builder for [`SweepConfig`].
#[derive(Debug, Default)]
pub struct SweepConfigBuilder {
    workers: Option<usize>,
    timeout: Option<Duration>,
    exit_policy: ExitPolicy,
    kill_grace: Option<Duration>,
}

impl SweepConfigBuilder {
    /// Set the worker-pool size (default: available parallelism).
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Kill any invocation running longer than `timeout`.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the non-zero exit policy.
    #[must_use]
    pub const fn exit_policy(mut self, policy: ExitPolicy) -> Self {
        self.exit_policy = policy;
        self
    }

    /// Set how long to wait for output pipes after a forced kill.
    #[must_use]
    pub const fn kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = Some(grace);
        self
    }

    /// Build the config.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPoolSize`] if zero workers were requested.
    pub fn build(self) -> Result<SweepConfig> {
        let workers = self.workers.unwrap_or_else(default_workers);
        if workers == 0 {
            return Err(Error::InvalidPoolSize(workers));
        }
        Ok(SweepConfig {
            workers,
            timeout: self.timeout,
            exit_policy: self.exit_policy,
            kill_grace: self.kill_grace.unwrap_or(DEFAULT_KILL_GRACE),
        })
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// A fully specified sweep, ready to run any number of times.
pub struct Sweep {
    space: ConfigSpace,
    config: SweepConfig,
    shared: Arc<Shared>,
}

/// State every evaluation task needs; read-only during a sweep.
struct Shared {
    command: Arc<dyn CommandBuilder>,
    extractor: Arc<dyn Extractor>,
    runner: ProcessRunner,
    exit_policy: ExitPolicy,
}

impl std::fmt::Debug for Sweep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweep")
            .field("parameters", &self.space.names())
            .field("configurations", &self.space.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

type Queue = Mutex<Box<dyn Iterator<Item = (usize, Configuration)> + Send>>;
type Collected = DashMap<Configuration, (usize, Outcome)>;

impl Sweep {
    /// Assemble a sweep from its space, strategies and execution knobs.
    ///
    /// # Errors
    ///
    /// Returns the command builder's validation error (e.g. a placeholder
    /// naming an unknown parameter), or [`Error::InvalidPoolSize`] for a
    /// zero-worker config.
    pub fn new(
        space: ConfigSpace,
        command: impl CommandBuilder + 'static,
        extractor: impl Extractor + 'static,
        config: SweepConfig,
    ) -> Result<Self> {
        Self::from_shared(space, Arc::new(command), Arc::new(extractor), config)
    }

    /// Like [`Sweep::new`] for strategies that are already shared.
    ///
    /// # Errors
    ///
    /// Same as [`Sweep::new`].
    pub fn from_shared(
        space: ConfigSpace,
        command: Arc<dyn CommandBuilder>,
        extractor: Arc<dyn Extractor>,
        config: SweepConfig,
    ) -> Result<Self> {
        if config.workers == 0 {
            return Err(Error::InvalidPoolSize(0));
        }
        command.validate(&space)?;

        let runner = ProcessRunner::new(config.timeout).kill_grace(config.kill_grace);
        let shared = Arc::new(Shared {
            command,
            extractor,
            runner,
            exit_policy: config.exit_policy,
        });
        Ok(Self {
            space,
            config,
            shared,
        })
    }

    /// The configuration space swept.
    #[must_use]
    pub const fn space(&self) -> &ConfigSpace {
        &self.space
    }

    /// Execution knobs.
    #[must_use]
    pub const fn config(&self) -> &SweepConfig {
        &self.config
    }

    /// Run every configuration of the space to completion.
    pub async fn run(&self) -> ResultTable {
        self.run_until_cancelled(CancelSignal::never()).await
    }

    /// Run every configuration of the space, stopping early on `cancel`.
    ///
    /// On cancellation running children are killed (their records become
    /// [`Failure::Cancelled`]) and undispatched configurations are recorded
    /// as [`Outcome::Skipped`].
    pub async fn run_until_cancelled(&self, cancel: CancelSignal) -> ResultTable {
        self.execute(self.space.iter(), self.space.len(), cancel).await
    }

    /// Run an explicit list of configurations from this sweep's space.
    ///
    /// Used to re-submit failed configurations; the table only holds the
    /// listed configurations, in the order given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if a configuration is listed twice or
    /// does not belong to this space.
    pub async fn run_configurations(
        &self,
        configurations: Vec<Configuration>,
        cancel: CancelSignal,
    ) -> Result<ResultTable> {
        let mut seen = FxHashSet::default();
        for configuration in &configurations {
            if !self.space.contains(configuration) {
                return Err(Error::InvalidInput(format!(
                    "configuration {configuration} is not part of this sweep's space"
                )));
            }
            if !seen.insert(configuration) {
                return Err(Error::InvalidInput(format!(
                    "configuration {configuration} submitted twice"
                )));
            }
        }

        let total = configurations.len();
        Ok(self.execute(configurations.into_iter(), total, cancel).await)
    }

    async fn execute<I>(
        &self,
        configurations: I,
        total: usize,
        cancel: CancelSignal,
    ) -> ResultTable
    where
        I: Iterator<Item = Configuration> + Send + 'static,
    {
        let started_at = Utc::now();
        let started = Instant::now();
        let workers = self.config.workers.min(total.max(1));
        info!(configurations = total, workers, "starting sweep");

        let queue: Arc<Queue> = Arc::new(Mutex::new(Box::new(configurations.enumerate())));
        let collected: Arc<Collected> = Arc::new(DashMap::with_capacity(total));

        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(worker(
                id,
                Arc::clone(&queue),
                Arc::clone(&self.shared),
                Arc::clone(&collected),
                cancel.clone(),
            ));
        }
        while let Some(joined) = pool.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "sweep worker exited abnormally");
            }
        }

        // Barrier passed: whatever is still queued was never dispatched.
        {
            let mut remaining = queue.lock().await;
            for (index, configuration) in remaining.by_ref() {
                collected.insert(configuration, (index, Outcome::Skipped));
            }
        }

        let collected = Arc::try_unwrap(collected).unwrap_or_else(|shared| (*shared).clone());
        let mut ordered: Vec<(usize, ResultRecord)> = collected
            .into_iter()
            .map(|(configuration, (index, outcome))| {
                (index, ResultRecord::new(configuration, outcome))
            })
            .collect();
        ordered.sort_unstable_by_key(|(index, _)| *index);

        let table = ResultTable::new(
            self.space.shared_names(),
            ordered.into_iter().map(|(_, record)| record).collect(),
            started_at,
            Utc::now(),
        );

        let summary = table.summary();
        info!(
            succeeded = summary.succeeded(),
            failed = summary.failed(),
            skipped = summary.skipped(),
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "sweep finished"
        );
        table
    }
}

/// Pull configurations until the queue is empty or the sweep is cancelled.
async fn worker(
    id: usize,
    queue: Arc<Queue>,
    shared: Arc<Shared>,
    collected: Arc<Collected>,
    cancel: CancelSignal,
) {
    loop {
        if cancel.is_cancelled() {
            debug!(worker = id, "cancelled, leaving queue");
            break;
        }
        let next = queue.lock().await.next();
        let Some((index, configuration)) = next else {
            break;
        };

        // Evaluated on its own task so a panic is confined to one record.
        let mut task = Evaluation(tokio::spawn(evaluate(
            Arc::clone(&shared),
            configuration.clone(),
            cancel.clone(),
        )));
        let outcome = match (&mut task.0).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = panic_message(e);
                error!(worker = id, %configuration, %message, "evaluation panicked");
                Outcome::Failure(Failure::Panicked { message })
            }
        };
        collected.insert(configuration, (index, outcome));
    }
}

/// Evaluation task owned by one worker; aborted if the worker is dropped,
/// which kills the process group of the run in flight.
struct Evaluation(JoinHandle<Outcome>);

impl Drop for Evaluation {
    fn drop(&mut self) {
        self.0.abort();
    }
}

async fn evaluate(
    shared: Arc<Shared>,
    configuration: Configuration,
    mut cancel: CancelSignal,
) -> Outcome {
    let invocation = shared.command.build(&configuration);
    debug!(%configuration, %invocation, "dispatching");

    let run = match shared.runner.run(&invocation, &mut cancel).await {
        Ok(run) => run,
        Err(RunError::Spawn(e)) => {
            warn!(%configuration, error = %e, "failed to spawn");
            return Outcome::Failure(Failure::Spawn {
                message: e.to_string(),
            });
        }
        Err(RunError::Wait(e)) => {
            warn!(%configuration, error = %e, "failed to wait for process");
            return Outcome::Failure(Failure::Wait {
                message: e.to_string(),
            });
        }
    };

    let outcome = judge(&shared, &run);
    match &outcome {
        Outcome::Failure(failure) => {
            warn!(%configuration, kind = %failure.kind(), "{failure}");
        }
        _ => debug!(
            %configuration,
            duration_ms = u64::try_from(run.duration().as_millis()).unwrap_or(u64::MAX),
            "completed"
        ),
    }
    outcome
}

/// Turn one run into an outcome.
fn judge(shared: &Shared, run: &RunResult) -> Outcome {
    match run.exit() {
        ExitState::Exited(0) => extract(shared, run),
        ExitState::Exited(code) => non_zero(shared, run, Some(code)),
        ExitState::Terminated => non_zero(shared, run, None),
        ExitState::TimedOut => Outcome::Failure(Failure::Timeout {
            after: shared.runner.timeout().unwrap_or_default(),
        }),
        ExitState::Cancelled => Outcome::Failure(Failure::Cancelled),
    }
}

fn extract(shared: &Shared, run: &RunResult) -> Outcome {
    match shared.extractor.extract(run.stdout()) {
        Ok(metrics) => Outcome::Success(metrics),
        Err(e) => Outcome::Failure(Failure::Extraction(e)),
    }
}

fn non_zero(shared: &Shared, run: &RunResult, code: Option<i32>) -> Outcome {
    if shared.exit_policy == ExitPolicy::ExtractAnyway {
        if let Ok(metrics) = shared.extractor.extract(run.stdout()) {
            return Outcome::Success(metrics);
        }
    }
    Outcome::Failure(Failure::Exit {
        code,
        stderr: tail(run.stderr(), STDERR_TAIL_BYTES),
    })
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string()),
        Err(err) => err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::Invocation;
    use crate::extract::{ExtractionError, MetricValue, Metrics};
    use crate::space::Value;

    fn space() -> ConfigSpace {
        ConfigSpace::builder()
            .param("r", [1, 2])
            .param("j", [1, 2])
            .build()
            .unwrap()
    }

    #[test]
    fn test_config_defaults() {
        let config = SweepConfig::builder().build().unwrap();
        assert!(config.workers() >= 1);
        assert_eq!(config.timeout(), None);
        assert_eq!(config.exit_policy(), ExitPolicy::Fail);
        assert_eq!(config.kill_grace(), DEFAULT_KILL_GRACE);
        assert_eq!(SweepConfig::default().workers(), config.workers());
    }

    #[test]
    fn test_zero_workers_rejected() {
        let err = SweepConfig::builder().workers(0).build().unwrap_err();
        assert!(matches!(err, Error::InvalidPoolSize(0)));
    }

    #[test]
    fn test_exit_policy_serde() {
        let policy: ExitPolicy = serde_json::from_str("\"extract_anyway\"").unwrap();
        assert_eq!(policy, ExitPolicy::ExtractAnyway);
    }

    #[tokio::test]
    async fn test_panic_message_from_str_payload() {
        let err = tokio::spawn(async { panic!("boom") }).await.unwrap_err();
        assert_eq!(panic_message(err), "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_panicking_command_is_isolated() {
        let command = |configuration: &Configuration| {
            assert_ne!(configuration.get("r"), Some(&Value::Int(2)), "bad knob");
            Invocation::new("true")
        };
        let extractor =
            |_: &str| Ok::<_, ExtractionError>(Metrics::new().with("x", MetricValue::Int(1)));
        let config = SweepConfig::builder().workers(2).build().unwrap();

        let table = Sweep::new(space(), command, extractor, config)
            .unwrap()
            .run()
            .await;

        assert_eq!(table.len(), 4);
        let panicked = table
            .failures()
            .filter(|(_, failure)| failure.kind() == FailureKind::Panicked)
            .count();
        assert_eq!(panicked, 2);
    }

    #[tokio::test]
    async fn test_resubmitting_foreign_configuration_rejected() {
        let other = ConfigSpace::builder().param("q", [7]).build().unwrap();
        let foreign = other.iter().next().unwrap();
        let extractor = |_: &str| Ok::<_, ExtractionError>(Metrics::new());
        let sweep = Sweep::new(
            space(),
            |_: &Configuration| Invocation::new("true"),
            extractor,
            SweepConfig::default(),
        )
        .unwrap();

        let err = sweep
            .run_configurations(vec![foreign], CancelSignal::never())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));

        let first = space().iter().next().unwrap();
        let err = sweep
            .run_configurations(vec![first.clone(), first], CancelSignal::never())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("twice"));
    }
}
