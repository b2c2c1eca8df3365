//! In-memory node store.
//!
//! Mirrors the Neo4j semantics of [`NodeStore`] over a plain map so the jobs
//! can be exercised without a database. It also plays the tree builder
//! (`insert`, `attach`) and can simulate latency and store failures.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use lineage_core::{
    CredentialCensus, CredentialState, Credentials, DistributorId, PersonRecord, Relations,
};

use crate::client::GraphError;
use crate::store::{ChainCandidate, NodeStore, PathNode, UpwardPath, WriteGuard};

/// Which child slot a node occupies under its parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Default)]
struct MemoryGraph {
    people: HashMap<DistributorId, PersonRecord>,
    relations: HashMap<DistributorId, Relations>,
}

impl MemoryGraph {
    fn parent_of(&self, id: &DistributorId) -> Option<&DistributorId> {
        self.relations.get(id).and_then(|r| r.parent_id.as_ref())
    }

    fn children_of(&self, id: &DistributorId) -> Vec<DistributorId> {
        self.relations
            .get(id)
            .map(|r| {
                r.left_id
                    .iter()
                    .chain(r.right_id.iter())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn password(&self, id: &DistributorId) -> Option<&str> {
        self.people
            .get(id)
            .and_then(|p| p.attributes.password.as_deref())
    }

    fn state(&self, id: &DistributorId, placeholder: &str) -> CredentialState {
        self.people
            .get(id)
            .map(|p| p.attributes.credential_state(placeholder))
            .unwrap_or(CredentialState::Empty)
    }

    fn path_node(&self, id: &DistributorId) -> PathNode {
        let attrs = self.people.get(id).map(|p| &p.attributes);
        PathNode {
            id: id.clone(),
            username: attrs.and_then(|a| a.username.clone()),
            password: attrs.and_then(|a| a.password.clone()),
        }
    }
}

/// Counters describing how the store has been used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Total calls across all store operations.
    pub calls: u64,
    /// Calls to [`NodeStore::relations`].
    pub relation_lookups: u64,
    /// Calls to [`NodeStore::set_credentials`].
    pub write_calls: u64,
    /// Nodes actually written.
    pub nodes_written: u64,
    /// Highest number of simultaneously outstanding calls.
    pub peak_concurrent_calls: usize,
}

#[derive(Default)]
struct Counters {
    calls: AtomicU64,
    relation_lookups: AtomicU64,
    write_calls: AtomicU64,
    nodes_written: AtomicU64,
    outstanding: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the outstanding-call counter when an operation finishes.
struct CallGuard<'a> {
    counters: &'a Counters,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        self.counters.outstanding.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A [`NodeStore`] backed by process memory.
#[derive(Default)]
pub struct MemoryStore {
    graph: Mutex<MemoryGraph>,
    failing: Mutex<HashSet<DistributorId>>,
    latency: Option<Duration>,
    counters: Counters,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency` before it touches the graph.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    // ── Tree building ────────────────────────────────────────────

    /// Insert or replace a person. Relationships are left as they are.
    pub fn insert(&self, record: PersonRecord) {
        let mut graph = self.graph();
        graph
            .relations
            .entry(record.distributor_id.clone())
            .or_default();
        graph.people.insert(record.distributor_id.clone(), record);
    }

    /// Link `child` under `parent`, maintaining `PARENT` and the child slot.
    pub fn attach(&self, parent: &DistributorId, child: &DistributorId, side: Side) {
        let mut graph = self.graph();
        let parent_rel = graph.relations.entry(parent.clone()).or_default();
        match side {
            Side::Left => parent_rel.left_id = Some(child.clone()),
            Side::Right => parent_rel.right_id = Some(child.clone()),
        }
        graph.relations.entry(child.clone()).or_default().parent_id = Some(parent.clone());
    }

    // ── Inspection and external mutation ─────────────────────────

    /// Snapshot of one person.
    pub fn person(&self, id: &DistributorId) -> Option<PersonRecord> {
        self.graph().people.get(id).cloned()
    }

    /// Credentials of one person, `None` when the pair is incomplete.
    pub fn credentials_of(&self, id: &DistributorId) -> Option<Credentials> {
        self.graph()
            .people
            .get(id)
            .and_then(|p| p.attributes.credentials())
    }

    /// Overwrite credentials outside of any job, as another writer would.
    pub fn overwrite_credentials(&self, id: &DistributorId, credentials: Option<Credentials>) {
        if let Some(person) = self.graph().people.get_mut(id) {
            let (username, password) = match credentials {
                Some(c) => (Some(c.username), Some(c.password)),
                None => (None, None),
            };
            person.attributes.username = username;
            person.attributes.password = password;
        }
    }

    /// Make every operation that touches `id` fail with [`GraphError::Unavailable`].
    pub fn fail_on(&self, id: &DistributorId) {
        self.failing_ids().insert(id.clone());
    }

    pub fn clear_failures(&self) {
        self.failing_ids().clear();
    }

    pub fn stats(&self) -> StoreStats {
        let c = &self.counters;
        StoreStats {
            calls: c.calls.load(Ordering::SeqCst),
            relation_lookups: c.relation_lookups.load(Ordering::SeqCst),
            write_calls: c.write_calls.load(Ordering::SeqCst),
            nodes_written: c.nodes_written.load(Ordering::SeqCst),
            peak_concurrent_calls: c.peak.load(Ordering::SeqCst),
        }
    }

    // ── Internals ────────────────────────────────────────────────

    fn graph(&self) -> MutexGuard<'_, MemoryGraph> {
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn failing_ids(&self) -> MutexGuard<'_, HashSet<DistributorId>> {
        self.failing
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self) -> CallGuard<'_> {
        let c = &self.counters;
        c.calls.fetch_add(1, Ordering::SeqCst);
        let now = c.outstanding.fetch_add(1, Ordering::SeqCst) + 1;
        c.peak.fetch_max(now, Ordering::SeqCst);
        let guard = CallGuard { counters: c };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        guard
    }

    fn check_available<'a>(
        &self,
        ids: impl IntoIterator<Item = &'a DistributorId>,
    ) -> Result<(), GraphError> {
        let failing = self.failing_ids();
        if failing.is_empty() {
            return Ok(());
        }
        match ids.into_iter().find(|id| failing.contains(*id)) {
            Some(id) => Err(GraphError::Unavailable(format!(
                "simulated failure touching {id}"
            ))),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get_person(&self, id: &DistributorId) -> Result<Option<PersonRecord>, GraphError> {
        let _call = self.enter().await;
        self.check_available([id])?;
        Ok(self.graph().people.get(id).cloned())
    }

    async fn relations(&self, id: &DistributorId) -> Result<Relations, GraphError> {
        let _call = self.enter().await;
        self.counters.relation_lookups.fetch_add(1, Ordering::SeqCst);
        self.check_available([id])?;
        let graph = self.graph();
        if !graph.people.contains_key(id) {
            return Err(GraphError::NotFound {
                label: "Person".to_string(),
                id: id.to_string(),
            });
        }
        Ok(graph.relations.get(id).cloned().unwrap_or_default())
    }

    async fn empty_ids(&self) -> Result<Vec<DistributorId>, GraphError> {
        let _call = self.enter().await;
        let graph = self.graph();
        let mut ids: Vec<DistributorId> = graph
            .people
            .values()
            .filter(|p| p.attributes.username.is_none() || p.attributes.password.is_none())
            .map(|p| p.distributor_id.clone())
            .collect();
        ids.sort();
        Ok(ids)
    }

    async fn full_ids(&self, placeholder: &str) -> Result<HashSet<DistributorId>, GraphError> {
        let _call = self.enter().await;
        let graph = self.graph();
        Ok(graph
            .people
            .values()
            .filter(|p| p.attributes.credential_state(placeholder) == CredentialState::Full)
            .map(|p| p.distributor_id.clone())
            .collect())
    }

    async fn upward_paths(
        &self,
        origins: &[DistributorId],
        terminators: &HashSet<DistributorId>,
        max_depth: u32,
    ) -> Result<Vec<UpwardPath>, GraphError> {
        let _call = self.enter().await;
        self.check_available(origins)?;
        let graph = self.graph();
        let mut paths = Vec::new();

        for origin in origins {
            if !graph.people.contains_key(origin) {
                continue;
            }
            let mut walked = vec![origin.clone()];
            let mut current = origin;
            for _ in 0..max_depth {
                let Some(parent) = graph.parent_of(current) else {
                    break;
                };
                if terminators.contains(parent) {
                    if let Some(credentials) =
                        graph.people.get(parent).and_then(|p| p.attributes.credentials())
                    {
                        paths.push(UpwardPath {
                            origin: origin.clone(),
                            walked,
                            terminator: parent.clone(),
                            credentials,
                        });
                    }
                    break;
                }
                walked.push(parent.clone());
                current = parent;
            }
        }
        Ok(paths)
    }

    async fn rekey_candidates(
        &self,
        placeholder: &str,
        max_depth: u32,
    ) -> Result<Vec<ChainCandidate>, GraphError> {
        let _call = self.enter().await;
        let graph = self.graph();
        let mut candidates = Vec::new();

        let mut starts: Vec<&DistributorId> = graph
            .people
            .keys()
            .filter(|id| graph.state(id, placeholder) == CredentialState::Full)
            .collect();
        starts.sort();

        for start in starts {
            // (node, edges from start)
            let mut stack: Vec<(DistributorId, u32)> = graph
                .children_of(start)
                .into_iter()
                .map(|c| (c, 1))
                .collect();

            while let Some((node, depth)) = stack.pop() {
                if depth > max_depth {
                    continue;
                }
                let children = graph.children_of(&node);
                if graph.password(&node) == Some(placeholder) {
                    if children.is_empty() {
                        candidates.push(ChainCandidate {
                            start: start.clone(),
                            end: node,
                        });
                    } else {
                        stack.extend(children.into_iter().map(|c| (c, depth + 1)));
                    }
                } else if depth > 1 {
                    candidates.push(ChainCandidate {
                        start: start.clone(),
                        end: node,
                    });
                }
            }
        }
        candidates.sort();
        Ok(candidates)
    }

    async fn downward_path(
        &self,
        start: &DistributorId,
        end: &DistributorId,
        max_depth: u32,
    ) -> Result<Option<Vec<PathNode>>, GraphError> {
        let _call = self.enter().await;
        self.check_available([start, end])?;
        let graph = self.graph();
        if !graph.people.contains_key(end) {
            return Ok(None);
        }

        let mut path = vec![graph.path_node(end)];
        let mut current = end;
        for _ in 0..max_depth {
            let Some(parent) = graph.parent_of(current) else {
                return Ok(None);
            };
            path.push(graph.path_node(parent));
            if parent == start {
                path.reverse();
                return Ok(Some(path));
            }
            current = parent;
        }
        Ok(None)
    }

    async fn set_credentials(
        &self,
        ids: &[DistributorId],
        credentials: &Credentials,
        guard: WriteGuard<'_>,
    ) -> Result<u64, GraphError> {
        let _call = self.enter().await;
        self.counters.write_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available(ids)?;
        let mut graph = self.graph();
        let mut written = 0;

        let unique: HashSet<&DistributorId> = ids.iter().collect();
        for id in unique {
            let Some(person) = graph.people.get_mut(id) else {
                continue;
            };
            let attrs = &mut person.attributes;
            if guard.permits(attrs.username.as_deref(), attrs.password.as_deref()) {
                attrs.username = Some(credentials.username.clone());
                attrs.password = Some(credentials.password.clone());
                written += 1;
            }
        }

        self.counters
            .nodes_written
            .fetch_add(written, Ordering::SeqCst);
        Ok(written)
    }

    async fn credential_census(&self, placeholder: &str) -> Result<CredentialCensus, GraphError> {
        let _call = self.enter().await;
        let graph = self.graph();
        let mut census = CredentialCensus::default();
        for person in graph.people.values() {
            census.record(person.attributes.credential_state(placeholder));
        }
        Ok(census)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PH: &str = "changeme";

    fn id(s: &str) -> DistributorId {
        DistributorId::from(s)
    }

    /// root(full) -> a(placeholder) -> b(placeholder, leaf)
    ///                               \-> c(empty)
    fn small_tree() -> MemoryStore {
        let store = MemoryStore::new();
        store.insert(PersonRecord::new("root").with_credentials("boss", "real"));
        store.insert(PersonRecord::new("a").with_credentials("a", PH));
        store.insert(PersonRecord::new("b").with_credentials("b", PH));
        store.insert(PersonRecord::new("c"));
        store.attach(&id("root"), &id("a"), Side::Left);
        store.attach(&id("a"), &id("b"), Side::Left);
        store.attach(&id("a"), &id("c"), Side::Right);
        store
    }

    #[tokio::test]
    async fn test_relations_resolve_all_three() {
        let store = small_tree();
        let rel = store.relations(&id("a")).await.unwrap();
        assert_eq!(rel.parent_id, Some(id("root")));
        assert_eq!(rel.left_id, Some(id("b")));
        assert_eq!(rel.right_id, Some(id("c")));

        let missing = store.relations(&id("nobody")).await;
        assert!(matches!(missing, Err(GraphError::NotFound { .. })));
    }

    #[tokio::test]
    async fn test_state_sets() {
        let store = small_tree();
        assert_eq!(store.empty_ids().await.unwrap(), vec![id("c")]);
        let full = store.full_ids(PH).await.unwrap();
        assert_eq!(full, HashSet::from([id("root")]));

        let census = store.credential_census(PH).await.unwrap();
        assert_eq!(census.placeholder, 2);
        assert_eq!(census.total(), 4);
    }

    #[tokio::test]
    async fn test_upward_path_stops_at_first_terminator() {
        let store = small_tree();
        let full = store.full_ids(PH).await.unwrap();
        let paths = store.upward_paths(&[id("c")], &full, 100).await.unwrap();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].walked, vec![id("c"), id("a")]);
        assert_eq!(paths[0].terminator, id("root"));
        assert_eq!(paths[0].credentials, Credentials::new("boss", "real"));
    }

    #[tokio::test]
    async fn test_upward_path_respects_depth_bound() {
        let store = small_tree();
        let full = store.full_ids(PH).await.unwrap();
        let paths = store.upward_paths(&[id("c")], &full, 1).await.unwrap();
        assert!(paths.is_empty());
    }

    #[tokio::test]
    async fn test_rekey_candidates_find_leaf_and_empty_ends() {
        let store = small_tree();
        let candidates = store.rekey_candidates(PH, 100).await.unwrap();
        assert_eq!(
            candidates,
            vec![
                ChainCandidate {
                    start: id("root"),
                    end: id("b"),
                },
                ChainCandidate {
                    start: id("root"),
                    end: id("c"),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_rekey_candidates_skip_direct_non_placeholder_child() {
        let store = MemoryStore::new();
        store.insert(PersonRecord::new("root").with_credentials("boss", "real"));
        store.insert(PersonRecord::new("e"));
        store.insert(PersonRecord::new("f").with_credentials("fay", "f-pw"));
        store.attach(&id("root"), &id("e"), Side::Left);
        store.attach(&id("root"), &id("f"), Side::Right);

        assert!(store.rekey_candidates(PH, 100).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_downward_path_start_first() {
        let store = small_tree();
        let path = store
            .downward_path(&id("root"), &id("b"), 100)
            .await
            .unwrap()
            .unwrap();
        let ids: Vec<_> = path.iter().map(|n| n.id.clone()).collect();
        assert_eq!(ids, vec![id("root"), id("a"), id("b")]);

        assert!(store
            .downward_path(&id("b"), &id("root"), 100)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_guarded_write() {
        let store = small_tree();
        let creds = Credentials::new("new", "pw");
        let written = store
            .set_credentials(
                &[id("root"), id("a"), id("c")],
                &creds,
                WriteGuard::Placeholder { placeholder: PH },
            )
            .await
            .unwrap();
        assert_eq!(written, 1);
        assert_eq!(store.credentials_of(&id("a")), Some(creds));
        assert_eq!(
            store.credentials_of(&id("root")),
            Some(Credentials::new("boss", "real"))
        );
        assert_eq!(store.credentials_of(&id("c")), None);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = small_tree();
        store.fail_on(&id("a"));
        assert!(matches!(
            store.relations(&id("a")).await,
            Err(GraphError::Unavailable(_))
        ));
        store.clear_failures();
        assert!(store.relations(&id("a")).await.is_ok());
        assert_eq!(store.stats().relation_lookups, 2);
    }
}
