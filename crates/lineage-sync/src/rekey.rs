//! Chain re-keying: rewrite placeholder chains to the credentials above them.
//!
//! Discovery yields `(start, end)` pairs where `start` is a full node and the
//! nodes below it down to `end` hold the placeholder password. Each pair is
//! handled by its own task. A task recomputes its path at commit time and
//! only writes when its preconditions still hold, so tasks may run in any
//! order. At most `max_in_flight` tasks are outstanding at once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use lineage_core::{CredentialState, Credentials, DistributorId, JobConfig};
use lineage_graph::{ChainCandidate, GraphError, NodeStore, PathNode, WriteGuard};

use crate::error::{Result, SyncError};

/// Outcome of one or more re-keying passes.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RekeyReport {
    pub passes: u32,
    pub candidates: usize,
    pub rekeyed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub nodes_written: u64,
    /// Highest number of tasks outstanding at once.
    pub peak_in_flight: usize,
}

type Joined = std::result::Result<
    (ChainCandidate, std::result::Result<TaskOutcome, GraphError>),
    tokio::task::JoinError,
>;

impl RekeyReport {
    /// Count one finished task.
    fn tally(&mut self, joined: Joined) {
        match joined {
            Ok((_, Ok(TaskOutcome::Rekeyed { written }))) => {
                self.rekeyed += 1;
                self.nodes_written += written;
            }
            Ok((candidate, Ok(TaskOutcome::Skipped(reason)))) => {
                self.skipped += 1;
                tracing::debug!(
                    start = %candidate.start,
                    end = %candidate.end,
                    reason = ?reason,
                    "Skipped re-keying candidate"
                );
            }
            Ok((candidate, Err(e))) => {
                self.failed += 1;
                tracing::warn!(
                    start = %candidate.start,
                    end = %candidate.end,
                    error = %e,
                    "Re-keying task failed"
                );
            }
            Err(e) => {
                self.failed += 1;
                tracing::error!(error = %e, "Re-keying task panicked");
            }
        }
    }

    fn absorb(&mut self, pass: &RekeyReport) {
        self.candidates += pass.candidates;
        self.rekeyed += pass.rekeyed;
        self.skipped += pass.skipped;
        self.failed += pass.failed;
        self.nodes_written += pass.nodes_written;
        self.peak_in_flight = self.peak_in_flight.max(pass.peak_in_flight);
    }
}

/// Why a candidate was left alone. None of these are errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `end` is no longer below `start`.
    PathGone,
    /// `start` no longer holds full credentials.
    StartNotFull,
    /// An interior node no longer holds the placeholder.
    InteriorChanged,
    /// The path has no placeholder node to rewrite.
    NothingToWrite,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TaskOutcome {
    Rekeyed { written: u64 },
    Skipped(SkipReason),
}

/// Nodes to rewrite and the credentials to write, decided from a fresh path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RekeyPlan {
    pub credentials: Credentials,
    /// Placeholder holders, written only while they still hold it.
    pub targets: Vec<DistributorId>,
    /// An `end` with no credentials, written only while it is not full.
    pub empty_end: Option<DistributorId>,
}

/// Check a freshly recomputed `start → end` path against the re-keying
/// preconditions.
///
/// Every interior node must hold the placeholder, and either the path spans
/// more than two nodes or `end` holds the placeholder. `start` is never a
/// target, nor is a full `end`. An empty `end` inherits along with the chain.
pub fn plan_rekey(
    path: &[PathNode],
    placeholder: &str,
) -> std::result::Result<RekeyPlan, SkipReason> {
    let (start, rest) = path.split_first().ok_or(SkipReason::PathGone)?;
    let (end, interior) = rest.split_last().ok_or(SkipReason::PathGone)?;

    if start.state(placeholder) != CredentialState::Full {
        return Err(SkipReason::StartNotFull);
    }
    let credentials = start.credentials().ok_or(SkipReason::StartNotFull)?;

    if !interior.iter().all(|n| n.holds_placeholder(placeholder)) {
        return Err(SkipReason::InteriorChanged);
    }

    let end_absorbs = end.holds_placeholder(placeholder);
    if !(path.len() > 2 || end_absorbs) {
        return Err(SkipReason::NothingToWrite);
    }

    let mut targets: Vec<DistributorId> = interior.iter().map(|n| n.id.clone()).collect();
    let mut empty_end = None;
    if end_absorbs {
        targets.push(end.id.clone());
    } else if end.state(placeholder) == CredentialState::Empty {
        empty_end = Some(end.id.clone());
    }
    Ok(RekeyPlan {
        credentials,
        targets,
        empty_end,
    })
}

/// Counts outstanding tasks for the lifetime of the guard.
struct InFlight {
    current: Arc<AtomicUsize>,
}

impl InFlight {
    fn enter(current: &Arc<AtomicUsize>, peak: &AtomicUsize) -> Self {
        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        Self {
            current: current.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Bounded-concurrency re-keying over the whole tree.
pub struct RekeyJob {
    store: Arc<dyn NodeStore>,
    config: JobConfig,
}

impl RekeyJob {
    pub fn new(store: Arc<dyn NodeStore>, config: JobConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    /// Run up to the configured number of passes.
    pub async fn run(&self) -> Result<RekeyReport> {
        self.run_until_converged(self.config.max_passes).await
    }

    /// Repeat discovery and dispatch until a pass writes nothing, at most
    /// `max_passes` times.
    ///
    /// Sibling chains share their upper interior nodes; when one commits
    /// first the other skips and only re-qualifies on the next pass.
    pub async fn run_until_converged(&self, max_passes: u32) -> Result<RekeyReport> {
        let mut total = RekeyReport::default();
        for pass in 1..=max_passes.max(1) {
            let report = self.run_pass().await?;
            total.absorb(&report);
            total.passes = pass;
            if report.nodes_written == 0 {
                break;
            }
        }

        tracing::info!(
            passes = total.passes,
            candidates = total.candidates,
            rekeyed = total.rekeyed,
            skipped = total.skipped,
            failed = total.failed,
            written = total.nodes_written,
            "Chain re-keying complete"
        );
        Ok(total)
    }

    /// One discovery pass followed by dispatch of every candidate.
    pub async fn run_pass(&self) -> Result<RekeyReport> {
        let candidates = self
            .store
            .rekey_candidates(&self.config.placeholder_password, self.config.max_depth)
            .await?;
        tracing::info!(candidates = candidates.len(), "Discovered re-keying candidates");
        self.dispatch(candidates).await
    }

    /// Run one task per candidate with at most `max_in_flight` outstanding.
    pub async fn dispatch(&self, candidates: Vec<ChainCandidate>) -> Result<RekeyReport> {
        let mut report = RekeyReport {
            passes: 1,
            candidates: candidates.len(),
            ..Default::default()
        };

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight));
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = AtomicUsize::new(0);
        let mut tasks = JoinSet::new();

        for candidate in candidates {
            while let Some(joined) = tasks.try_join_next() {
                report.tally(joined);
            }
            let permit = permits
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| SyncError::Task(e.to_string()))?;
            let gauge = InFlight::enter(&in_flight, &peak);
            let store = self.store.clone();
            let placeholder = self.config.placeholder_password.clone();
            let max_depth = self.config.max_depth;

            tasks.spawn(async move {
                let _permit = permit;
                let _gauge = gauge;
                let result =
                    rekey_chain(store.as_ref(), &candidate, &placeholder, max_depth).await;
                (candidate, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            report.tally(joined);
        }

        report.peak_in_flight = peak.load(Ordering::SeqCst);
        Ok(report)
    }
}

/// Verify one candidate against the current tree and commit if it still holds.
async fn rekey_chain(
    store: &dyn NodeStore,
    candidate: &ChainCandidate,
    placeholder: &str,
    max_depth: u32,
) -> std::result::Result<TaskOutcome, GraphError> {
    let Some(path) = store
        .downward_path(&candidate.start, &candidate.end, max_depth)
        .await?
    else {
        return Ok(TaskOutcome::Skipped(SkipReason::PathGone));
    };

    let plan = match plan_rekey(&path, placeholder) {
        Ok(plan) => plan,
        Err(reason) => return Ok(TaskOutcome::Skipped(reason)),
    };

    let mut written = store
        .set_credentials(
            &plan.targets,
            &plan.credentials,
            WriteGuard::Placeholder { placeholder },
        )
        .await?;
    // A short count means the chain changed under us; leave the end for the
    // next pass or propagation.
    if let Some(end) = plan.empty_end.filter(|_| written == plan.targets.len() as u64) {
        written += store
            .set_credentials(
                &[end],
                &plan.credentials,
                WriteGuard::NotFull { placeholder },
            )
            .await?;
    }
    Ok(TaskOutcome::Rekeyed { written })
}
