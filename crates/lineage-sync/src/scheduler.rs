//! Maintenance scheduling.
//!
//! Runs a maintenance cycle (propagation, then re-keying) on a fixed
//! interval while the tree builder keeps growing the tree. A failed cycle is
//! logged and the next tick tries again.

use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration, MissedTickBehavior};

use lineage_core::JobConfig;
use lineage_graph::NodeStore;

use crate::config::ScheduleConfig;
use crate::error::Result;
use crate::journal::{self, JobOutcome, Journal, RunReport};
use crate::propagate::PropagationJob;
use crate::rekey::RekeyJob;

/// Reports for both jobs of one cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub propagation: RunReport,
    pub rekey: RunReport,
}

pub struct MaintenanceScheduler {
    propagation: PropagationJob,
    rekey: RekeyJob,
    schedule: ScheduleConfig,
    journal: Option<Journal>,
}

impl MaintenanceScheduler {
    pub fn new(
        store: Arc<dyn NodeStore>,
        jobs: JobConfig,
        schedule: ScheduleConfig,
        journal: Option<Journal>,
    ) -> Result<Self> {
        Ok(Self {
            propagation: PropagationJob::new(store.clone(), jobs.clone())?,
            rekey: RekeyJob::new(store, jobs)?,
            schedule,
            journal,
        })
    }

    /// Run cycles forever at the configured interval.
    pub async fn run(&self) -> Result<()> {
        let mut ticker = interval(Duration::from_secs(self.schedule.interval_secs.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_secs = self.schedule.interval_secs,
            "Maintenance scheduler started"
        );

        loop {
            ticker.tick().await;
            if let Err(e) = self.run_cycle().await {
                tracing::error!(error = %e, "Maintenance cycle failed");
            }
        }
    }

    /// Propagate first so freshly filled nodes can bound re-keying chains.
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let started = Utc::now();
        let outcome = self.propagation.run().await?;
        let propagation = journal::record(
            self.journal.as_ref(),
            started,
            JobOutcome::Propagation(outcome),
        )?;

        let started = Utc::now();
        let outcome = self.rekey.run().await?;
        let rekey = journal::record(self.journal.as_ref(), started, JobOutcome::Rekey(outcome))?;

        tracing::info!(
            propagation_run = %propagation.id,
            rekey_run = %rekey.id,
            "Maintenance cycle complete"
        );
        Ok(CycleReport { propagation, rekey })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::{Credentials, DistributorId, PersonRecord};
    use lineage_graph::{MemoryStore, Side};

    const PH: &str = "changeme";

    fn id(s: &str) -> DistributorId {
        DistributorId::from(s)
    }

    /// root(full) -> a(empty) -> b(placeholder) -> c(placeholder, leaf)
    ///            \-> d(full) (never touched)
    fn mixed_tree() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store.insert(PersonRecord::new("root").with_credentials("boss", "real"));
        store.insert(PersonRecord::new("a"));
        store.insert(PersonRecord::new("b").with_credentials("b", PH));
        store.insert(PersonRecord::new("c").with_credentials("c", PH));
        store.insert(PersonRecord::new("d").with_credentials("dana", "d-pw"));
        store.attach(&id("root"), &id("a"), Side::Left);
        store.attach(&id("root"), &id("d"), Side::Right);
        store.attach(&id("a"), &id("b"), Side::Left);
        store.attach(&id("b"), &id("c"), Side::Left);
        store
    }

    #[tokio::test]
    async fn test_cycle_runs_both_jobs_and_journals() {
        let store = mixed_tree();
        let dir = tempfile::tempdir().unwrap();
        let journal = Journal::open(dir.path()).unwrap();
        let scheduler = MaintenanceScheduler::new(
            store.clone(),
            JobConfig::new(PH),
            ScheduleConfig::default(),
            Some(journal),
        )
        .unwrap();

        let cycle = scheduler.run_cycle().await.unwrap();

        let boss = Some(Credentials::new("boss", "real"));
        for name in ["a", "b", "c"] {
            assert_eq!(store.credentials_of(&id(name)), boss);
        }
        assert_eq!(
            store.credentials_of(&id("d")),
            Some(Credentials::new("dana", "d-pw"))
        );

        let reopened = Journal::open(dir.path()).unwrap();
        assert_eq!(reopened.get(cycle.propagation.id).unwrap(), cycle.propagation);
        assert!(reopened.get(cycle.rekey.id).unwrap().verify_integrity());
    }

    #[tokio::test]
    async fn test_full_nodes_survive_every_job() {
        let store = mixed_tree();
        let scheduler = MaintenanceScheduler::new(
            store.clone(),
            JobConfig::new(PH),
            ScheduleConfig::default(),
            None,
        )
        .unwrap();

        let before: Vec<_> = ["root", "d"]
            .iter()
            .map(|n| store.credentials_of(&id(n)))
            .collect();
        scheduler.run_cycle().await.unwrap();
        scheduler.run_cycle().await.unwrap();
        let after: Vec<_> = ["root", "d"]
            .iter()
            .map(|n| store.credentials_of(&id(n)))
            .collect();

        assert_eq!(before, after);
    }
}
