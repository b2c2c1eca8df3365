//! Credential propagation: fill empty nodes from their nearest full ancestor.
//!
//! Empty nodes are processed in independent batches. For each node the store
//! walks `PARENT` edges up to the first full node; every non-full node on that
//! walk inherits the full node's credentials. Nodes with no full ancestor are
//! left alone. A failed batch is logged and skipped; re-running the whole job
//! is always safe because a completed run leaves nothing further to write.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use lineage_core::{Credentials, DistributorId, JobConfig};
use lineage_graph::{GraphError, NodeStore, WriteGuard};

use crate::error::Result;

/// Outcome of one propagation run.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropagationReport {
    /// Empty nodes found at the start of the run.
    pub empty_nodes: usize,
    /// Size of the terminator set (full nodes).
    pub terminators: usize,
    pub batches: usize,
    /// Indices of batches that failed and were skipped.
    pub failed_batches: Vec<usize>,
    pub nodes_written: u64,
    /// Batch nodes with no full ancestor within the depth bound.
    pub unreachable: usize,
}

struct BatchOutcome {
    written: u64,
    unreachable: usize,
}

/// One-shot credential propagation over the whole tree.
pub struct PropagationJob {
    store: Arc<dyn NodeStore>,
    config: JobConfig,
}

impl PropagationJob {
    pub fn new(store: Arc<dyn NodeStore>, config: JobConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { store, config })
    }

    pub async fn run(&self) -> Result<PropagationReport> {
        let placeholder = &self.config.placeholder_password;
        let empty = self.store.empty_ids().await?;
        let full = self.store.full_ids(placeholder).await?;

        let mut report = PropagationReport {
            empty_nodes: empty.len(),
            terminators: full.len(),
            ..Default::default()
        };

        tracing::info!(
            empty = empty.len(),
            full = full.len(),
            batch_size = self.config.batch_size,
            "Starting credential propagation"
        );

        for (index, batch) in empty.chunks(self.config.batch_size).enumerate() {
            report.batches += 1;
            match self.propagate_batch(batch, &full).await {
                Ok(outcome) => {
                    report.nodes_written += outcome.written;
                    report.unreachable += outcome.unreachable;
                    tracing::debug!(
                        batch = index,
                        size = batch.len(),
                        written = outcome.written,
                        unreachable = outcome.unreachable,
                        "Propagation batch complete"
                    );
                }
                Err(e) => {
                    tracing::error!(
                        batch = index,
                        size = batch.len(),
                        first_id = %batch[0],
                        error = %e,
                        "Propagation batch failed, re-run the job to retry"
                    );
                    report.failed_batches.push(index);
                }
            }
        }

        tracing::info!(
            batches = report.batches,
            failed = report.failed_batches.len(),
            written = report.nodes_written,
            unreachable = report.unreachable,
            "Credential propagation complete"
        );
        Ok(report)
    }

    async fn propagate_batch(
        &self,
        batch: &[DistributorId],
        full: &HashSet<DistributorId>,
    ) -> std::result::Result<BatchOutcome, GraphError> {
        let paths = self
            .store
            .upward_paths(batch, full, self.config.max_depth)
            .await?;

        let reached: HashSet<&DistributorId> = paths.iter().map(|p| &p.origin).collect();
        let unreachable = batch.iter().filter(|id| !reached.contains(id)).count();

        // Paths sharing a terminator share its credentials; write them together.
        let mut groups: BTreeMap<DistributorId, (Credentials, Vec<DistributorId>)> =
            BTreeMap::new();
        for path in paths {
            let (_, targets) = groups
                .entry(path.terminator)
                .or_insert_with(|| (path.credentials, Vec::new()));
            targets.extend(path.walked.into_iter().filter(|id| !full.contains(id)));
        }

        let guard = WriteGuard::NotFull {
            placeholder: &self.config.placeholder_password,
        };
        let mut written = 0;
        for (terminator, (credentials, mut targets)) in groups {
            targets.sort();
            targets.dedup();
            let n = self
                .store
                .set_credentials(&targets, &credentials, guard)
                .await?;
            tracing::trace!(
                terminator = %terminator,
                targets = targets.len(),
                written = n,
                "Inherited credentials"
            );
            written += n;
        }

        Ok(BatchOutcome {
            written,
            unreachable,
        })
    }
}
