// Fact model - the unit of knowledge a guided workflow emits

//! # Facts
//!
//! A `Fact` is a Gellish-style subject–relation–object triple:
//!
//! ```text
//! 5.Widget  >  1146.is a specialization of  >  730044.Physical Object
//! ```
//!
//! Besides the triple itself a fact carries optional metadata (its own uid,
//! the collection it belongs to, textual definitions, unit of measure) that
//! stays empty until a later stage supplies it.
//!
//! Uids are plain integers. Values in the provisional range (see
//! [`TempIdAllocator::is_provisional`]) stand for entities that exist only in
//! the current editing session and must be replaced before persistence.

use serde::{Deserialize, Serialize};

use crate::engine::temp_id::TempIdAllocator;

/// Integer identifier of a knowledge-graph entity (real or provisional)
pub type Uid = u64;

/// A subject–relation–object triple with metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Fact {
    #[serde(default)]
    pub fact_uid: Option<Uid>,

    pub lh_object_uid: Option<Uid>,
    #[serde(default)]
    pub lh_object_name: String,

    pub rel_type_uid: Option<Uid>,
    #[serde(default)]
    pub rel_type_name: String,

    pub rh_object_uid: Option<Uid>,
    #[serde(default)]
    pub rh_object_name: String,

    #[serde(default)]
    pub collection_uid: Option<Uid>,
    #[serde(default)]
    pub collection_name: String,

    #[serde(default)]
    pub full_definition: String,
    #[serde(default)]
    pub partial_definition: String,

    #[serde(default)]
    pub uom_uid: Option<Uid>,
    #[serde(default)]
    pub uom_name: String,
}

/// A uid counts as present when it is set and non-zero
///
/// Zero is never issued by the allocator nor used by the graph, so it is
/// treated like a missing value.
fn present(uid: Option<Uid>) -> bool {
    matches!(uid, Some(u) if u != 0)
}

impl Fact {
    /// Build a bare triple; metadata stays empty
    pub fn triple(
        lh: (Option<Uid>, impl Into<String>),
        rel: (Option<Uid>, impl Into<String>),
        rh: (Option<Uid>, impl Into<String>),
    ) -> Self {
        Fact {
            lh_object_uid: lh.0,
            lh_object_name: lh.1.into(),
            rel_type_uid: rel.0,
            rel_type_name: rel.1.into(),
            rh_object_uid: rh.0,
            rh_object_name: rh.1.into(),
            ..Default::default()
        }
    }

    /// A fact is complete iff both objects and the relation have uid and name
    pub fn is_complete(&self) -> bool {
        present(self.lh_object_uid)
            && !self.lh_object_name.is_empty()
            && present(self.rel_type_uid)
            && !self.rel_type_name.is_empty()
            && present(self.rh_object_uid)
            && !self.rh_object_name.is_empty()
    }

    /// Object uids of this fact that are still provisional
    ///
    /// Relation uids are authored literally and never provisional.
    pub fn provisional_uids(&self) -> Vec<Uid> {
        [self.lh_object_uid, self.rh_object_uid]
            .into_iter()
            .flatten()
            .filter(|uid| TempIdAllocator::is_provisional(*uid))
            .collect()
    }

    /// Rewrite object uids through `map`, leaving unmapped uids untouched
    pub fn remap_uids<F>(&mut self, mut map: F)
    where
        F: FnMut(Uid) -> Option<Uid>,
    {
        for slot in [&mut self.lh_object_uid, &mut self.rh_object_uid] {
            if let Some(uid) = *slot {
                if let Some(replacement) = map(uid) {
                    *slot = Some(replacement);
                }
            }
        }
    }
}

impl std::fmt::Display for Fact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let uid = |u: Option<Uid>| u.map(|u| u.to_string()).unwrap_or_else(|| "?".to_string());
        write!(
            f,
            "{}.{} > {}.{} > {}.{}",
            uid(self.lh_object_uid),
            self.lh_object_name,
            uid(self.rel_type_uid),
            self.rel_type_name,
            uid(self.rh_object_uid),
            self.rh_object_name
        )
    }
}
