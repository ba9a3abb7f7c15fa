#![doc = include_str!("../README.md")]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

/// A propositional alphabet assigns each symbol a Boolean valuation of a
/// fixed set of atomic propositions. Guards of automaton edges and the
/// letters enumerated during complementation are expressions over these
/// propositions, backed by BDDs.
pub mod alphabet;

/// Defines the transition-based nondeterministic Büchi automaton that the
/// complementation procedures consume and produce, together with lasso-word
/// membership used to compare languages.
pub mod nba;

/// Strongly connected components of the state graph and the structural
/// predicates derived from them: the deterministic part of an automaton,
/// semi-determinism and unambiguity.
pub mod connected_components;

/// The complementation procedures themselves.
pub mod complement;

/// Defines aliases for the mathematical collection types in use.
pub mod math;

pub use alphabet::PropAlphabet;
pub use complement::{
    complement_semidet, complement_semidet_onthefly, complement_semidet_opt,
    complement_semidet_opt_onthefly, complement_unambiguous, new_complement_semidet,
    ComplementError,
};
pub use nba::{Edge, Nba, StateId};
