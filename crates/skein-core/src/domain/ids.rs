//! Domain identifiers (strongly-typed IDs).
//!
//! All ids are ULIDs wrapped in a phantom-typed `Id<T>`, so a `TaskId` can
//! never be passed where a `ChainId` is expected. On the wire an id is the
//! prefixed string form (`task-01J...`), which is also what the inbound
//! tracker and revoke triggers accept.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// Marker trait for each id flavour.
///
/// Provides the prefix used by `Display` / `FromStr`.
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Generic id type.
///
/// `T` only exists at compile time (PhantomData), the runtime layout is a
/// bare 128-bit ULID.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Error returned when an id string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdParseError {
    #[error("invalid id '{0}': not a ULID")]
    InvalidUlid(String),

    #[error("invalid id '{value}': expected prefix '{expected}'")]
    WrongPrefix { value: String, expected: &'static str },

    #[error("invalid node id '{0}': unknown prefix")]
    UnknownPrefix(String),
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// Accepts both the prefixed form and a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = match s.strip_prefix(T::prefix()) {
            Some(rest) => rest,
            None if s.contains('-') => {
                return Err(IdParseError::WrongPrefix {
                    value: s.to_string(),
                    expected: T::prefix(),
                });
            }
            None => s,
        };
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError::InvalidUlid(s.to_string()))
    }
}

impl<T: IdMarker> Serialize for Id<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de, T: IdMarker> Deserialize<'de> for Id<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

// ========================================
// Marker types
// ========================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Task {}

impl IdMarker for Task {
    fn prefix() -> &'static str {
        "task-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Chain {}

impl IdMarker for Chain {
    fn prefix() -> &'static str {
        "chain-"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Group {}

impl IdMarker for Group {
    fn prefix() -> &'static str {
        "group-"
    }
}

/// Identifier of a Task (one unit of work, stable across queue retries).
pub type TaskId = Id<Task>;

/// Identifier of a Chain (ordered sequence of tasks).
pub type ChainId = Id<Chain>;

/// Identifier of a Group (fan-out / fan-in set).
pub type GroupId = Id<Group>;

/// Any node of a workflow graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum NodeId {
    Task(TaskId),
    Chain(ChainId),
    Group(GroupId),
}

impl NodeId {
    pub fn as_task(self) -> Option<TaskId> {
        match self {
            NodeId::Task(id) => Some(id),
            _ => None,
        }
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeId::Task(id) => id.fmt(f),
            NodeId::Chain(id) => id.fmt(f),
            NodeId::Group(id) => id.fmt(f),
        }
    }
}

impl FromStr for NodeId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with(Task::prefix()) {
            s.parse().map(NodeId::Task)
        } else if s.starts_with(Chain::prefix()) {
            s.parse().map(NodeId::Chain)
        } else if s.starts_with(Group::prefix()) {
            s.parse().map(NodeId::Group)
        } else {
            Err(IdParseError::UnknownPrefix(s.to_string()))
        }
    }
}

impl From<TaskId> for NodeId {
    fn from(id: TaskId) -> Self {
        NodeId::Task(id)
    }
}

impl From<ChainId> for NodeId {
    fn from(id: ChainId) -> Self {
        NodeId::Chain(id)
    }
}

impl From<GroupId> for NodeId {
    fn from(id: GroupId) -> Self {
        NodeId::Group(id)
    }
}

impl Serialize for NodeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_distinct_types() {
        let task = TaskId::from_ulid(Ulid::new());
        let chain = ChainId::from_ulid(Ulid::new());
        let group = GroupId::from_ulid(Ulid::new());

        assert!(task.to_string().starts_with("task-"));
        assert!(chain.to_string().starts_with("chain-"));
        assert!(group.to_string().starts_with("group-"));

        // let _: ChainId = task; // <- does not compile
    }

    #[test]
    fn id_parses_prefixed_and_bare_forms() {
        let ulid = Ulid::new();
        let id = TaskId::from_ulid(ulid);

        assert_eq!(id.to_string().parse::<TaskId>().unwrap(), id);
        assert_eq!(ulid.to_string().parse::<TaskId>().unwrap(), id);
    }

    #[test]
    fn id_rejects_foreign_prefix() {
        let chain = ChainId::from_ulid(Ulid::new());
        let err = chain.to_string().parse::<TaskId>().unwrap_err();
        assert!(matches!(err, IdParseError::WrongPrefix { expected: "task-", .. }));
    }

    #[test]
    fn node_id_dispatches_on_prefix() {
        let group = GroupId::from_ulid(Ulid::new());
        let node: NodeId = group.to_string().parse().unwrap();
        assert_eq!(node, NodeId::Group(group));

        assert!(matches!(
            "step-01ARZ3NDEKTSV4RRFFQ69G5FAV".parse::<NodeId>(),
            Err(IdParseError::UnknownPrefix(_))
        ));
    }

    #[test]
    fn ids_serialize_as_strings() {
        let task = TaskId::from_ulid(Ulid::new());
        let json = serde_json::to_string(&NodeId::Task(task)).unwrap();
        assert_eq!(json, format!("\"{task}\""));

        let back: NodeId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, NodeId::Task(task));
    }

    #[test]
    fn phantom_data_does_not_consume_memory() {
        use std::mem::size_of;
        assert_eq!(size_of::<TaskId>(), size_of::<Ulid>());
        assert_eq!(size_of::<GroupId>(), 16);
    }
}
