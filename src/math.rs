//! Aliases for the collection types used throughout the crate. They exist
//! to hide which concrete map and set implementations are actually used.

/// Type alias for maps whose iteration order must be deterministic but need
/// not be sorted. Keys iterate in insertion order.
pub type Map<K, V> = indexmap::IndexMap<K, V>;

/// Type alias for sets that iterate in ascending order.
pub type OrderedSet<S> = std::collections::BTreeSet<S>;
