// Workflow states and events - the vocabulary of a guided modelling step machine
//
// ## Workflow Model Overview
//
// A guided modelling workflow is a **finite state machine** whose states are
// UI steps. The user moves between steps by sending **events**:
//
// - **States (StateId)**: one step of the guided flow, e.g. "name", "supertype",
//   "definition". States may nest: a compound state owns child states and
//   remembers which child was active when it was left.
// - **Events (EventId)**: named transitions, e.g. "NEXT", "BACK", "PICK_ROLE".
//   The reserved event `NEXT` also captures the facts of the step being left.
//
// ### Example Workflow:
//
// ```
//     [name] --NEXT--> [supertype] --NEXT--> [definition] --NEXT--> [done]
//                           |
//                           +-- entry: branch "Supertype" into new-physical-object
// ```
//
// ### Implementation Notes:
//
// - StateId and EventId are simple string wrappers so definitions can be
//   authored as JSON without a schema compiler
// - StateRef is the runtime *configuration* of a (possibly nested) machine

use serde::{Deserialize, Serialize};

/// Identifier of one state (step) in a workflow definition
///
/// State ids are unique across a whole definition, including nested states,
/// so a transition can target any state by id alone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub String);

impl StateId {
    /// Get the state identifier as a string slice
    ///
    /// ```rust
    /// # use guided_modelling::StateId;
    /// let state = StateId::from("supertype");
    /// assert_eq!(state.as_str(), "supertype");
    /// ```
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Create a new state from any string-like input
    pub fn new<S: Into<String>>(name: S) -> Self {
        StateId(name.into())
    }
}

impl From<&str> for StateId {
    fn from(s: &str) -> Self {
        StateId(s.to_string())
    }
}

impl From<String> for StateId {
    fn from(s: String) -> Self {
        StateId(s)
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Name of an event that may move a machine between states
///
/// ## Reserved Events:
///
/// - `NEXT`: advance to the following step; the step being left has its
///   fact templates compiled and cached first
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    /// The reserved "advance one step" event
    pub const NEXT: &'static str = "NEXT";

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn new<S: Into<String>>(name: S) -> Self {
        EventId(name.into())
    }

    /// Shorthand for the reserved `NEXT` event
    pub fn next() -> Self {
        EventId(Self::NEXT.to_string())
    }

    /// Whether this is the reserved `NEXT` event
    pub fn is_next(&self) -> bool {
        self.0 == Self::NEXT
    }
}

impl From<&str> for EventId {
    fn from(s: &str) -> Self {
        EventId(s.to_string())
    }
}

impl From<String> for EventId {
    fn from(s: String) -> Self {
        EventId(s)
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// **State Reference** - the active configuration of a hierarchical machine
///
/// A flat machine is always in a `Leaf`. A machine inside a compound state is
/// in `Compound(parent, inner)`, where `inner` is the configuration of the
/// compound state's own sub-machine.
///
/// ## Example:
///
/// The role workflow sitting on the `player` step inside its `R` state is
/// `Compound("R", Leaf("player"))`, serialized as `{"R": "player"}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateRef {
    Leaf(StateId),
    Compound(StateId, Box<StateRef>),
}

impl StateRef {
    /// Build a configuration from an outer-to-inner path of state ids
    ///
    /// Returns `None` for an empty path.
    pub fn from_path(path: &[StateId]) -> Option<Self> {
        let (last, outer) = path.split_last()?;
        let mut current = StateRef::Leaf(last.clone());
        for id in outer.iter().rev() {
            current = StateRef::Compound(id.clone(), Box::new(current));
        }
        Some(current)
    }

    /// The outermost state of this configuration
    pub fn head(&self) -> &StateId {
        match self {
            StateRef::Leaf(id) | StateRef::Compound(id, _) => id,
        }
    }

    /// The innermost (active leaf) state of this configuration
    pub fn leaf(&self) -> &StateId {
        match self {
            StateRef::Leaf(id) => id,
            StateRef::Compound(_, inner) => inner.leaf(),
        }
    }

    /// Outer-to-inner list of active state ids
    pub fn path(&self) -> Vec<StateId> {
        let mut path = Vec::new();
        let mut current = self;
        loop {
            match current {
                StateRef::Leaf(id) => {
                    path.push(id.clone());
                    return path;
                }
                StateRef::Compound(id, inner) => {
                    path.push(id.clone());
                    current = inner;
                }
            }
        }
    }

    /// Innermost active state for which `has` holds
    ///
    /// Inner states take precedence over the compound states that contain
    /// them; used to find the step spec of a nested configuration.
    pub fn resolve<'a, F>(&'a self, has: &F) -> Option<&'a StateId>
    where
        F: Fn(&StateId) -> bool,
    {
        match self {
            StateRef::Leaf(id) => has(id).then_some(id),
            StateRef::Compound(id, inner) => inner.resolve(has).or_else(|| has(id).then_some(id)),
        }
    }

    /// Whether `id` is active anywhere in this configuration
    pub fn contains(&self, id: &StateId) -> bool {
        match self {
            StateRef::Leaf(own) => own == id,
            StateRef::Compound(own, inner) => own == id || inner.contains(id),
        }
    }
}

impl std::fmt::Display for StateRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let path: Vec<String> = self.path().into_iter().map(|s| s.0).collect();
        write!(f, "{}", path.join("."))
    }
}

/// Serialized like the UI expects it: `"name"` or `{"R": "player"}`
impl Serialize for StateRef {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            StateRef::Leaf(id) => serializer.serialize_str(id.as_str()),
            StateRef::Compound(id, inner) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(id.as_str(), inner.as_ref())?;
                map.end()
            }
        }
    }
}

impl<'de> Deserialize<'de> for StateRef {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        state_ref_from_value(&value).map_err(serde::de::Error::custom)
    }
}

fn state_ref_from_value(value: &serde_json::Value) -> std::result::Result<StateRef, String> {
    match value {
        serde_json::Value::String(id) => Ok(StateRef::Leaf(StateId::from(id.as_str()))),
        serde_json::Value::Object(map) if map.len() == 1 => {
            let (id, inner) = map.iter().next().ok_or("empty state object")?;
            Ok(StateRef::Compound(
                StateId::from(id.as_str()),
                Box::new(state_ref_from_value(inner)?),
            ))
        }
        other => Err(format!("invalid state value: {}", other)),
    }
}
