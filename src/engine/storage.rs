// Collaborator interfaces - fact persistence and knowledge-graph lookup

//! # Collaborators
//!
//! The engine itself never performs I/O. Two capabilities live outside it and
//! are called by the transport layer around engine operations:
//!
//! - **FactStore**: receives the facts of a finalized workflow and persists
//!   them, replacing provisional uids with real ones
//! - **GraphLookup**: resolves a knowledge-graph uid to its name, category and
//!   descendants, feeding `knowledge-graph` field sources
//!
//! Both are async traits so that real backends (a graph database, a remote
//! service) can be dropped in without touching the callers. The in-memory
//! implementations here back the development server and the tests.
//!
//! ## Rust Learning Notes:
//!
//! ### Async Traits
//! `#[async_trait]` rewrites `async fn` in traits into methods returning boxed
//! futures, which is what makes `Arc<dyn FactStore>` possible.
//!
//! ### Interior Mutability
//! `InMemoryFactStore` mutates through `&self` by keeping its state behind an
//! `RwLock`, so one store can be shared by every request handler.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::info;

use super::temp_id::TempIdAllocator;
use crate::models::{Fact, Uid};
use crate::Result;

/// First uid minted by the in-memory fact store
pub const DEFAULT_COMMITTED_UID_BASE: Uid = 1_000_000_000;

/// Persistence capability for finalized facts
#[async_trait::async_trait]
pub trait FactStore: Send + Sync {
    /// Persist one finalized batch and return it as stored
    ///
    /// Provisional uids are replaced consistently across the batch: the same
    /// provisional uid maps to the same real uid in every fact.
    async fn commit(&self, facts: Vec<Fact>) -> Result<Vec<Fact>>;

    /// Every fact stored so far, in commit order
    async fn list(&self) -> Result<Vec<Fact>>;
}

/// What the knowledge graph knows about one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityInfo {
    pub uid: Uid,
    pub name: String,
    /// Upper-ontology category, e.g. "physical object"
    pub category: String,
    /// Uids of every known subtype
    #[serde(default)]
    pub descendants: Vec<Uid>,
}

/// Lookup capability against the knowledge graph
#[async_trait::async_trait]
pub trait GraphLookup: Send + Sync {
    /// `Ok(None)` when the uid is unknown
    async fn resolve(&self, uid: Uid) -> Result<Option<EntityInfo>>;
}

#[derive(Debug, Default)]
struct FactLedger {
    facts: Vec<Fact>,
    next_uid: Uid,
}

impl FactLedger {
    fn mint(&mut self) -> Uid {
        let uid = self.next_uid;
        self.next_uid += 1;
        uid
    }
}

/// Fact store keeping everything in process memory
#[derive(Debug)]
pub struct InMemoryFactStore {
    ledger: RwLock<FactLedger>,
}

impl InMemoryFactStore {
    /// A store minting real uids from `uid_base` upwards
    pub fn new(uid_base: Uid) -> Self {
        InMemoryFactStore {
            ledger: RwLock::new(FactLedger {
                facts: Vec::new(),
                next_uid: uid_base,
            }),
        }
    }
}

impl Default for InMemoryFactStore {
    fn default() -> Self {
        Self::new(DEFAULT_COMMITTED_UID_BASE)
    }
}

fn poisoned<T>(_: T) -> crate::ModellingError {
    crate::ModellingError::Storage(anyhow::anyhow!("fact store lock poisoned"))
}

#[async_trait::async_trait]
impl FactStore for InMemoryFactStore {
    async fn commit(&self, mut facts: Vec<Fact>) -> Result<Vec<Fact>> {
        let mut ledger = self.ledger.write().map_err(poisoned)?;

        let mut minted: HashMap<Uid, Uid> = HashMap::new();
        for fact in &mut facts {
            for provisional in fact.provisional_uids() {
                if !minted.contains_key(&provisional) {
                    let uid = ledger.mint();
                    minted.insert(provisional, uid);
                }
            }
            fact.remap_uids(|uid| minted.get(&uid).copied());
            if fact.fact_uid.is_none() {
                fact.fact_uid = Some(ledger.mint());
            }
        }

        info!(
            "💾 Committed {} fact(s), minted {} uid(s) for new entities",
            facts.len(),
            minted.len()
        );
        ledger.facts.extend(facts.iter().cloned());
        Ok(facts)
    }

    async fn list(&self) -> Result<Vec<Fact>> {
        let ledger = self.ledger.read().map_err(poisoned)?;
        Ok(ledger.facts.clone())
    }
}

/// Graph lookup over a fixed table of entities
#[derive(Debug, Default)]
pub struct InMemoryGraphLookup {
    entities: HashMap<Uid, EntityInfo>,
}

impl InMemoryGraphLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// The upper ontology every modelling session starts from
    pub fn seeded() -> Self {
        let mut lookup = Self::new();
        lookup.insert(EntityInfo {
            uid: 730000,
            name: "anything".to_string(),
            category: "anything".to_string(),
            descendants: vec![730044, 160170, 2850, 193671],
        });
        lookup.insert(EntityInfo {
            uid: 730044,
            name: "physical object".to_string(),
            category: "physical object".to_string(),
            descendants: vec![],
        });
        lookup.insert(EntityInfo {
            uid: 160170,
            name: "role".to_string(),
            category: "role".to_string(),
            descendants: vec![],
        });
        lookup.insert(EntityInfo {
            uid: 2850,
            name: "relation".to_string(),
            category: "relation".to_string(),
            descendants: vec![],
        });
        lookup.insert(EntityInfo {
            uid: 193671,
            name: "occurrence".to_string(),
            category: "occurrence".to_string(),
            descendants: vec![],
        });
        lookup
    }

    pub fn insert(&mut self, entity: EntityInfo) {
        self.entities.insert(entity.uid, entity);
    }
}

#[async_trait::async_trait]
impl GraphLookup for InMemoryGraphLookup {
    async fn resolve(&self, uid: Uid) -> Result<Option<EntityInfo>> {
        if TempIdAllocator::is_provisional(uid) {
            // provisional entities exist only inside a session
            return Ok(None);
        }
        Ok(self.entities.get(&uid).cloned())
    }
}
