//! The `Person` entity with lazily resolved relationships.
//!
//! Bulk fetches only carry a node's own attributes. The parent and child ids
//! are resolved together on first access through the injected [`NodeStore`]
//! and cached on the instance. A failed resolution leaves the entity
//! unresolved, so the next access retries.

use std::sync::Arc;

use serde::Serialize;

use lineage_core::{DistributorId, PersonAttributes, PersonRecord};

use crate::client::GraphError;
use crate::store::NodeStore;

/// A distributor node. Not meant to be shared across tasks.
pub struct Person {
    record: PersonRecord,
    store: Arc<dyn NodeStore>,
    parent_id: Option<DistributorId>,
    left_id: Option<DistributorId>,
    right_id: Option<DistributorId>,
    resolved: bool,
}

/// External representation: own attributes plus the three relationship ids,
/// with the distributor id under `id`.
#[derive(Serialize)]
struct PersonDocument<'a> {
    id: &'a DistributorId,
    #[serde(flatten)]
    attributes: &'a PersonAttributes,
    parent_id: Option<&'a DistributorId>,
    left_id: Option<&'a DistributorId>,
    right_id: Option<&'a DistributorId>,
}

impl Person {
    pub fn from_record(record: PersonRecord, store: Arc<dyn NodeStore>) -> Self {
        Self {
            record,
            store,
            parent_id: None,
            left_id: None,
            right_id: None,
            resolved: false,
        }
    }

    /// Fetch a person's own attributes by id.
    pub async fn load(
        store: Arc<dyn NodeStore>,
        id: &DistributorId,
    ) -> Result<Option<Self>, GraphError> {
        let record = store.get_person(id).await?;
        Ok(record.map(|r| Self::from_record(r, store)))
    }

    pub fn id(&self) -> &DistributorId {
        &self.record.distributor_id
    }

    pub fn attributes(&self) -> &PersonAttributes {
        &self.record.attributes
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved
    }

    pub async fn parent_id(&mut self) -> Result<Option<&DistributorId>, GraphError> {
        self.resolve().await?;
        Ok(self.parent_id.as_ref())
    }

    pub async fn left_id(&mut self) -> Result<Option<&DistributorId>, GraphError> {
        self.resolve().await?;
        Ok(self.left_id.as_ref())
    }

    pub async fn right_id(&mut self) -> Result<Option<&DistributorId>, GraphError> {
        self.resolve().await?;
        Ok(self.right_id.as_ref())
    }

    /// Serialize to the external document form, resolving relationships first.
    pub async fn to_document(&mut self) -> Result<serde_json::Value, GraphError> {
        self.resolve().await?;
        let doc = PersonDocument {
            id: &self.record.distributor_id,
            attributes: &self.record.attributes,
            parent_id: self.parent_id.as_ref(),
            left_id: self.left_id.as_ref(),
            right_id: self.right_id.as_ref(),
        };
        serde_json::to_value(doc).map_err(|e| GraphError::Serialization(e.to_string()))
    }

    async fn resolve(&mut self) -> Result<(), GraphError> {
        if self.resolved {
            return Ok(());
        }
        let relations = self.store.relations(&self.record.distributor_id).await?;
        self.parent_id = relations.parent_id;
        self.left_id = relations.left_id;
        self.right_id = relations.right_id;
        self.resolved = true;
        tracing::trace!(id = %self.record.distributor_id, "Resolved person relations");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryStore, Side};

    fn id(s: &str) -> DistributorId {
        DistributorId::from(s)
    }

    fn family() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        let mut root = PersonRecord::new("root").with_credentials("boss", "real");
        root.attributes.name = Some("Root Person".to_string());
        root.attributes.total_pv = 120.5;
        store.insert(root);
        store.insert(PersonRecord::new("left"));
        store.insert(PersonRecord::new("lonely"));
        store.attach(&id("root"), &id("left"), Side::Left);
        store
    }

    #[tokio::test]
    async fn test_construction_does_not_query_relations() {
        let store = family();
        let person = Person::load(store.clone(), &id("root")).await.unwrap().unwrap();
        assert!(!person.is_resolved());
        assert_eq!(store.stats().relation_lookups, 0);
        assert_eq!(person.attributes().name.as_deref(), Some("Root Person"));
    }

    #[tokio::test]
    async fn test_relations_resolved_once() {
        let store = family();
        let mut person = Person::load(store.clone(), &id("root")).await.unwrap().unwrap();

        assert_eq!(person.left_id().await.unwrap(), Some(&id("left")));
        assert_eq!(person.parent_id().await.unwrap(), None);
        assert_eq!(person.right_id().await.unwrap(), None);
        assert!(person.is_resolved());
        assert_eq!(store.stats().relation_lookups, 1);
    }

    #[tokio::test]
    async fn test_all_empty_relations_still_resolve_once() {
        let store = family();
        let mut person = Person::load(store.clone(), &id("lonely")).await.unwrap().unwrap();

        assert_eq!(person.parent_id().await.unwrap(), None);
        assert_eq!(person.left_id().await.unwrap(), None);
        assert_eq!(store.stats().relation_lookups, 1);
    }

    #[tokio::test]
    async fn test_failed_resolution_retries() {
        let store = family();
        let mut person = Person::load(store.clone(), &id("left")).await.unwrap().unwrap();

        store.fail_on(&id("left"));
        assert!(person.parent_id().await.is_err());
        assert!(!person.is_resolved());

        store.clear_failures();
        assert_eq!(person.parent_id().await.unwrap(), Some(&id("root")));
        assert!(person.is_resolved());
        assert_eq!(store.stats().relation_lookups, 2);
    }

    #[tokio::test]
    async fn test_document_relabels_id() {
        let store = family();
        let mut person = Person::load(store, &id("root")).await.unwrap().unwrap();
        let doc = person.to_document().await.unwrap();

        assert_eq!(doc["id"], "root");
        assert!(doc.get("distributor_id").is_none());
        assert_eq!(doc["left_id"], "left");
        assert!(doc["parent_id"].is_null());
        assert!(doc["right_id"].is_null());
        assert_eq!(doc["username"], "boss");
        assert_eq!(doc["total_pv"], 120.5);
    }

    #[tokio::test]
    async fn test_load_missing_person() {
        let store = family();
        assert!(Person::load(store, &id("ghost")).await.unwrap().is_none());
    }
}
