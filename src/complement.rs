//! Rank-based complementation of Büchi automata via a subset construction
//! over labelled macrostates.
//!
//! Three constructions are implemented on one shared skeleton: NCSB for
//! semi-deterministic inputs (with two optional policies), NCB for
//! unambiguous inputs and NSBC for semi-deterministic inputs with an
//! explicit initial phase. A macrostate assigns every input state at most
//! one label; the successor rules move labels along the edges compatible
//! with the current letter and color an edge of the complement whenever the
//! breakpoint obligation completes a round. The constructions only differ
//! in their label alphabet, successor rule and letter-domain computation,
//! which is what the private `Variant` trait abstracts over.

mod ncb;
mod ncsb;
mod nsbc;

use std::collections::VecDeque;
use std::hash::Hash;

use biodivine_lib_bdd::{Bdd, BddVariable};
use thiserror::Error;
use tracing::{info, trace};

use crate::connected_components::{is_semi_deterministic, is_unambiguous};
use crate::math::{Map, OrderedSet};
use crate::nba::{Nba, StateId};

use self::ncb::Ncb;
use self::ncsb::Ncsb;
use self::nsbc::Nsbc;

/// The ways in which a complementation run can fail.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum ComplementError {
    /// The input automaton does not have the structure the chosen
    /// construction requires. Raised before any state is built.
    #[error("{algorithm} requires a {requirement} input")]
    PreconditionViolated {
        /// Name of the entry point that was called.
        algorithm: &'static str,
        /// The structural property the input lacks.
        requirement: &'static str,
    },
    /// The exploration produced a macrostate with a label combination the
    /// construction forbids. This indicates a bug, not a property of the
    /// input.
    #[error("macrostate {macrostate} is malformed: {details}")]
    InvariantViolation {
        /// Rendering of the offending macrostate.
        macrostate: String,
        /// Which rule the macrostate breaks.
        details: &'static str,
    },
    /// The id space for result states ran out.
    #[error("the result-state id space is exhausted")]
    ResourceExhaustion,
}

/// A macrostate during successor computation: one label slot per input
/// state, [`None`] meaning the state is not tracked.
pub(crate) type Dense<L> = Vec<Option<L>>;

/// The canonical form of a macrostate, listing only tracked states in
/// ascending order. Used as the deduplication key and for display.
pub(crate) type Canonical<L> = Vec<(StateId, L)>;

pub(crate) fn canonicalize<L: Copy>(ms: &Dense<L>) -> Canonical<L> {
    ms.iter()
        .enumerate()
        .filter_map(|(i, label)| label.map(|label| (i as StateId, label)))
        .collect()
}

/// Facts about one input state, computed once per run.
pub(crate) struct StateData {
    /// Union of the supports of the outgoing guards.
    pub support: OrderedSet<BddVariable>,
    /// Disjunction of the outgoing guards.
    pub compat: Bdd,
    /// Whether the state has outgoing edges and all of them are accepting.
    pub all_accepting: bool,
}

pub(crate) fn analyze_states(aut: &Nba) -> Vec<StateData> {
    aut.state_indices()
        .map(|q| {
            let mut support = OrderedSet::new();
            let mut compat = aut.alphabet().ff();
            let mut all_accepting = true;
            let mut has_edges = false;
            for edge in aut.edges_from(q) {
                has_edges = true;
                support.extend(aut.alphabet().support(&edge.guard));
                compat = compat.or(&edge.guard);
                all_accepting &= edge.accepting;
            }
            StateData {
                support,
                compat,
                all_accepting: all_accepting && has_edges,
            }
        })
        .collect()
}

/// Read-only context handed to the successor rules.
pub(crate) struct Ctx<'a> {
    pub aut: &'a Nba,
    pub states: &'a [StateData],
}

/// The symbolic letter domain of a macrostate.
pub(crate) struct Domain {
    /// Variables a letter must be fixed on.
    pub support: OrderedSet<BddVariable>,
    /// Disjunction of all letters under which the macrostate has live
    /// successors.
    pub all: Bdd,
    /// Guard of the colored edge into the sink, for the letters outside of
    /// `all`. [`None`] when `all` covers the whole alphabet or when the
    /// macrostate must not escape.
    pub escape: Option<Bdd>,
}

impl Domain {
    /// The default domain: the union of the compatible letters of all
    /// tracked states, escaping to the sink on everything else.
    pub(crate) fn union_of_active<L>(ctx: &Ctx, ms: &Dense<L>) -> Domain {
        let mut support = OrderedSet::new();
        let mut all = ctx.aut.alphabet().ff();
        for (i, label) in ms.iter().enumerate() {
            if label.is_none() {
                continue;
            }
            support.extend(ctx.states[i].support.iter().copied());
            all = all.or(&ctx.states[i].compat);
        }
        let escape = (!all.is_true()).then(|| all.not());
        Domain {
            support,
            all,
            escape,
        }
    }
}

/// What distinguishes the three constructions: the label alphabet, the
/// initial macrostate, the letter domain, the successor rule and the
/// rendering of macrostates.
pub(crate) trait Variant {
    /// The label alphabet of the construction.
    type Label: Copy + Eq + Ord + Hash + std::fmt::Debug;

    /// Short tag for logging.
    const ALGORITHM: &'static str;

    /// The macrostate the exploration starts from.
    fn initial(&self, aut: &Nba) -> Dense<Self::Label>;

    /// The letters to enumerate from the given macrostate.
    fn letter_domain(&self, ctx: &Ctx, ms: &Dense<Self::Label>) -> Domain;

    /// Appends all successors of `ms` under `letter` to `out`, each with
    /// its acceptance color. Appending nothing drops the letter, which is
    /// how a rule rejects a branch.
    fn successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<Self::Label>,
        letter: &Bdd,
        out: &mut Vec<(Dense<Self::Label>, bool)>,
    );

    /// Checks a freshly discovered macrostate for label combinations the
    /// construction forbids.
    fn validate(&self, _ms: &Canonical<Self::Label>) -> Result<(), ComplementError> {
        Ok(())
    }

    /// Renders a macrostate the way its states should be named.
    fn render(ms: &Canonical<Self::Label>) -> String;
}

/// The worklist exploration shared by all constructions. Owns the result
/// automaton, the deduplication map from canonical macrostates to result
/// states and the queue of macrostates whose successors are still missing.
pub(crate) struct Explorer<'a, V: Variant> {
    aut: &'a Nba,
    states: Vec<StateData>,
    variant: V,
    show_names: bool,
    res: Nba,
    ids: Map<Canonical<V::Label>, StateId>,
    todo: VecDeque<(Dense<V::Label>, StateId)>,
    names: Vec<String>,
}

impl<'a, V: Variant> Explorer<'a, V> {
    pub(crate) fn new(aut: &'a Nba, variant: V, show_names: bool) -> Result<Self, ComplementError> {
        let initial = variant.initial(aut);
        let mut explorer = Self {
            states: analyze_states(aut),
            res: Nba::new(aut.alphabet().clone()),
            ids: Map::default(),
            todo: VecDeque::new(),
            names: Vec::new(),
            aut,
            variant,
            show_names,
        };
        let id = explorer.insert(initial)?;
        explorer.res.set_initial(id);
        Ok(explorer)
    }

    /// Looks the macrostate up in the deduplication map, allocating a fresh
    /// result state and scheduling the macrostate on first sight.
    fn insert(&mut self, ms: Dense<V::Label>) -> Result<StateId, ComplementError> {
        let key = canonicalize(&ms);
        if let Some(&id) = self.ids.get(&key) {
            return Ok(id);
        }
        self.variant.validate(&key)?;
        if self.res.num_states() >= StateId::MAX as usize {
            return Err(ComplementError::ResourceExhaustion);
        }
        let id = self.res.add_state();
        trace!("new macrostate {id}: {}", V::render(&key));
        if self.show_names {
            self.names.push(V::render(&key));
        }
        self.ids.insert(key, id);
        self.todo.push_back((ms, id));
        Ok(id)
    }

    pub(crate) fn run(mut self) -> Result<Nba, ComplementError> {
        let mut succs = Vec::new();
        while let Some((ms, origin)) = self.todo.pop_front() {
            let domain = {
                let ctx = Ctx {
                    aut: self.aut,
                    states: &self.states,
                };
                self.variant.letter_domain(&ctx, &ms)
            };
            if let Some(escape) = domain.escape {
                let sink = self.insert(vec![None; self.aut.num_states()])?;
                self.res.add_edge(origin, sink, escape, true);
            }
            let mut all = domain.all;
            while let Some(one) = self.aut.alphabet().sat_one(&all, &domain.support) {
                all = all.and_not(&one);
                succs.clear();
                {
                    let ctx = Ctx {
                        aut: self.aut,
                        states: &self.states,
                    };
                    self.variant.successors(&ctx, &ms, &one, &mut succs);
                }
                trace!(
                    "macrostate {origin} has {} successors under {}",
                    succs.len(),
                    self.aut.alphabet().fmt_guard(&one)
                );
                for (succ, colored) in succs.drain(..) {
                    let target = self.insert(succ)?;
                    self.res.add_edge(origin, target, one.clone(), colored);
                }
            }
        }
        self.res.merge_edges();
        if self.show_names {
            self.res.set_state_names(self.names);
        }
        info!(
            "{} complemented {} input states into {} macrostates",
            V::ALGORITHM,
            self.aut.num_states(),
            self.res.num_states()
        );
        Ok(self.res)
    }
}

fn ensure_semi_deterministic(algorithm: &'static str, aut: &Nba) -> Result<(), ComplementError> {
    if is_semi_deterministic(aut) {
        Ok(())
    } else {
        Err(ComplementError::PreconditionViolated {
            algorithm,
            requirement: "semi-deterministic",
        })
    }
}

/// Complements a semi-deterministic Büchi automaton with the NCSB
/// construction.
///
/// When `show_names` is set, every state of the result is named after its
/// macrostate as `{N},{C},{S},{B}`.
pub fn complement_semidet(aut: &Nba, show_names: bool) -> Result<Nba, ComplementError> {
    ensure_semi_deterministic("complement_semidet", aut)?;
    Explorer::new(aut, Ncsb::new(aut, false), show_names)?.run()
}

/// Like [`complement_semidet`], but only states that stayed in the check
/// set for a full step are promoted into the next breakpoint.
pub fn complement_semidet_opt(aut: &Nba, show_names: bool) -> Result<Nba, ComplementError> {
    ensure_semi_deterministic("complement_semidet_opt", aut)?;
    Explorer::new(aut, Ncsb::new(aut, true), show_names)?.run()
}

/// Like [`complement_semidet`], but without the up-front pass computing the
/// deterministic part: nondeterministic states commit to the check set
/// exactly when they take an accepting edge.
pub fn complement_semidet_onthefly(aut: &Nba, show_names: bool) -> Result<Nba, ComplementError> {
    ensure_semi_deterministic("complement_semidet_onthefly", aut)?;
    Explorer::new(aut, Ncsb::on_the_fly(false), show_names)?.run()
}

/// Combines the policies of [`complement_semidet_opt`] and
/// [`complement_semidet_onthefly`].
pub fn complement_semidet_opt_onthefly(
    aut: &Nba,
    show_names: bool,
) -> Result<Nba, ComplementError> {
    ensure_semi_deterministic("complement_semidet_opt_onthefly", aut)?;
    Explorer::new(aut, Ncsb::on_the_fly(true), show_names)?.run()
}

/// Complements an unambiguous Büchi automaton with the NCB construction.
///
/// With `show_names` set, states are named `{N},{C},{B}`, where the first
/// group also lists initial-phase states with an `i` prefix.
pub fn complement_unambiguous(aut: &Nba, show_names: bool) -> Result<Nba, ComplementError> {
    if !is_unambiguous(aut) {
        return Err(ComplementError::PreconditionViolated {
            algorithm: "complement_unambiguous",
            requirement: "unambiguous",
        });
    }
    Explorer::new(aut, Ncb, show_names)?.run()
}

/// Complements a semi-deterministic Büchi automaton with the NSBC
/// construction, which tracks the subset construction in an explicit
/// initial phase before committing to any obligation.
///
/// With `show_names` set, states are named `{I},{N},{S},{B},{C}` with an
/// `i` prefix on initial-phase states.
pub fn new_complement_semidet(aut: &Nba, show_names: bool) -> Result<Nba, ComplementError> {
    ensure_semi_deterministic("new_complement_semidet", aut)?;
    Explorer::new(aut, Nsbc::new(aut), show_names)?.run()
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::alphabet::PropAlphabet;

    /// All letters of the alphabet, as minterms over every proposition.
    pub(crate) fn letters(ap: &PropAlphabet) -> Vec<Bdd> {
        (0..1usize << ap.ap_count())
            .map(|mask| {
                (0..ap.ap_count()).fold(ap.tt(), |acc, i| {
                    acc.and(&ap.literal(i, mask & (1 << i) != 0))
                })
            })
            .collect()
    }

    /// A family of ultimately periodic words: all cycles of length one and
    /// two, with all prefixes of length at most one.
    pub(crate) fn sample_words(ap: &PropAlphabet) -> Vec<(Vec<Bdd>, Vec<Bdd>)> {
        let letters = letters(ap);
        let mut prefixes = vec![Vec::new()];
        prefixes.extend(letters.iter().map(|letter| vec![letter.clone()]));
        let mut cycles: Vec<Vec<Bdd>> = letters.iter().map(|letter| vec![letter.clone()]).collect();
        for first in &letters {
            for second in &letters {
                cycles.push(vec![first.clone(), second.clone()]);
            }
        }

        let mut words = Vec::new();
        for prefix in &prefixes {
            for cycle in &cycles {
                words.push((prefix.clone(), cycle.clone()));
            }
        }
        words
    }

    /// Asserts on a sample of ultimately periodic words that `complement`
    /// accepts exactly the words `aut` rejects.
    pub(crate) fn assert_complements(aut: &Nba, complement: &Nba) {
        let ap = aut.alphabet();
        for (prefix, cycle) in sample_words(ap) {
            let in_input = aut.accepts(&prefix, &cycle);
            let in_complement = complement.accepts(&prefix, &cycle);
            assert!(
                in_input != in_complement,
                "word {} ({})^ω is {}",
                prefix.iter().map(|letter| ap.fmt_guard(letter)).collect::<Vec<_>>().join(" "),
                cycle.iter().map(|letter| ap.fmt_guard(letter)).collect::<Vec<_>>().join(" "),
                if in_input {
                    "in both languages"
                } else {
                    "in neither language"
                },
            );
        }
    }

    /// Asserts that merging left at most one edge per target and color.
    pub(crate) fn assert_edges_merged(aut: &Nba) {
        for q in aut.state_indices() {
            let out = aut.edges_from(q);
            for (i, first) in out.iter().enumerate() {
                for second in &out[i + 1..] {
                    assert!(
                        (first.target, first.accepting) != (second.target, second.accepting),
                        "state {q} has unmerged parallel edges"
                    );
                }
            }
        }
    }

    /// Asserts that the outgoing guards of every state disjoin to true.
    /// This holds for the constructions that never drop a letter; NCSB
    /// states with safe or breakpoint obligations may lack successors for
    /// letters that refute the obligation.
    pub(crate) fn assert_edge_guards_exhaustive(aut: &Nba) {
        for q in aut.state_indices() {
            let union = aut
                .edges_from(q)
                .iter()
                .fold(aut.alphabet().ff(), |acc, edge| acc.or(&edge.guard));
            assert!(union.is_true(), "outgoing guards of state {q} do not cover the alphabet");
        }
    }
}
