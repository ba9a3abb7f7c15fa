use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, VecDeque};

use biodivine_lib_bdd::Bdd;
use bit_set::BitSet;
use itertools::Itertools;
use tracing::trace;

use crate::alphabet::PropAlphabet;
use crate::connected_components::SccInfo;

/// The type used to identify states of an [`Nba`].
pub type StateId = u32;

/// A single labelled transition of an [`Nba`]. The guard is an arbitrary
/// expression over the automaton's alphabet and the acceptance bit sits on
/// the edge, not on its endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    /// Index of the state this edge leads to.
    pub target: StateId,
    /// Symbolic guard of the edge.
    pub guard: Bdd,
    /// Whether the edge is marked by the Büchi acceptance condition.
    pub accepting: bool,
}

/// A nondeterministic Büchi automaton with transition-based acceptance over
/// a propositional alphabet.
///
/// A run is accepting if it takes accepting edges infinitely often. The
/// container keeps one outgoing edge list per state, a single initial state
/// and optionally a display name per state. It serves both as the input of
/// the complementation procedures and as the automaton they build.
#[derive(Clone)]
pub struct Nba {
    alphabet: PropAlphabet,
    edges: Vec<Vec<Edge>>,
    initial: StateId,
    names: Option<Vec<String>>,
}

impl Nba {
    /// Creates an empty automaton over the given alphabet. Until
    /// [`Self::set_initial`] is called, state `0` is considered initial.
    pub fn new(alphabet: PropAlphabet) -> Self {
        Self {
            alphabet,
            edges: Vec::new(),
            initial: 0,
            names: None,
        }
    }

    /// Adds a fresh state and returns its index.
    pub fn add_state(&mut self) -> StateId {
        debug_assert!(self.edges.len() < StateId::MAX as usize);
        self.edges.push(Vec::new());
        (self.edges.len() - 1) as StateId
    }

    /// Adds an edge between two existing states.
    pub fn add_edge(&mut self, source: StateId, target: StateId, guard: Bdd, accepting: bool) {
        debug_assert!((target as usize) < self.edges.len());
        self.edges[source as usize].push(Edge {
            target,
            guard,
            accepting,
        });
    }

    /// Declares the initial state.
    pub fn set_initial(&mut self, state: StateId) {
        debug_assert!((state as usize) < self.edges.len());
        self.initial = state;
    }

    /// Returns the initial state.
    pub fn initial(&self) -> StateId {
        self.initial
    }

    /// Gives the number of states.
    pub fn num_states(&self) -> usize {
        self.edges.len()
    }

    /// Returns the alphabet the guards of this automaton live in.
    pub fn alphabet(&self) -> &PropAlphabet {
        &self.alphabet
    }

    /// The outgoing edges of a state, in insertion order.
    pub fn edges_from(&self, state: StateId) -> &[Edge] {
        &self.edges[state as usize]
    }

    /// Iterates over all states.
    pub fn state_indices(&self) -> impl Iterator<Item = StateId> {
        0..self.edges.len() as StateId
    }

    /// Attaches a display name to every state. The vector must have one
    /// entry per state, in state order.
    pub fn set_state_names(&mut self, names: Vec<String>) {
        debug_assert_eq!(names.len(), self.edges.len());
        self.names = Some(names);
    }

    /// The display names set via [`Self::set_state_names`], if any.
    pub fn state_names(&self) -> Option<&[String]> {
        self.names.as_deref()
    }

    /// Merges parallel edges. Afterwards every state has at most one edge
    /// per combination of target and acceptance bit, its guard being the
    /// disjunction of the merged guards, and edges are sorted by target.
    pub fn merge_edges(&mut self) {
        for out in &mut self.edges {
            let mut merged: BTreeMap<(StateId, bool), Bdd> = BTreeMap::new();
            for edge in out.drain(..) {
                match merged.entry((edge.target, edge.accepting)) {
                    Entry::Occupied(mut entry) => {
                        let guard = entry.get().or(&edge.guard);
                        entry.insert(guard);
                    }
                    Entry::Vacant(entry) => {
                        entry.insert(edge.guard);
                    }
                }
            }
            out.extend(merged.into_iter().map(|((target, accepting), guard)| Edge {
                target,
                guard,
                accepting,
            }));
        }
    }

    /// Decides membership of the ultimately periodic word
    /// `prefix · cycle^ω`, where every element of `prefix` and `cycle` is a
    /// letter, i.e. an expression with exactly one satisfying valuation.
    ///
    /// The word is turned into a lasso-shaped transition system, the product
    /// with the automaton is built and its reachable strongly connected
    /// components are scanned for an internal accepting edge.
    pub fn accepts(&self, prefix: &[Bdd], cycle: &[Bdd]) -> bool {
        assert!(!cycle.is_empty(), "the periodic part must not be empty");
        let len = prefix.len() + cycle.len();
        let index = |q: StateId, pos: usize| q as usize * len + pos;

        let mut adjacency = vec![Vec::new(); self.num_states() * len];
        let mut accepting_edges = Vec::new();
        for q in self.state_indices() {
            for pos in 0..len {
                let letter = if pos < prefix.len() {
                    &prefix[pos]
                } else {
                    &cycle[pos - prefix.len()]
                };
                debug_assert!(!letter.is_false());
                let next = if pos + 1 < len { pos + 1 } else { prefix.len() };
                for edge in self.edges_from(q) {
                    if !self.alphabet.implies(letter, &edge.guard) {
                        continue;
                    }
                    let (u, v) = (index(q, pos), index(edge.target, next));
                    adjacency[u].push(v as StateId);
                    if edge.accepting {
                        accepting_edges.push((u, v));
                    }
                }
            }
        }

        let mut reachable = BitSet::with_capacity(adjacency.len());
        let mut queue = VecDeque::from([index(self.initial, 0)]);
        reachable.insert(index(self.initial, 0));
        while let Some(u) = queue.pop_front() {
            for &v in &adjacency[u] {
                if reachable.insert(v as usize) {
                    queue.push_back(v as usize);
                }
            }
        }

        let si = SccInfo::from_adjacency(&adjacency);
        let found = accepting_edges
            .iter()
            .any(|&(u, v)| reachable.contains(u) && si.scc_of(u as StateId) == si.scc_of(v as StateId));
        trace!(
            "word with prefix length {} and cycle length {} is {}",
            prefix.len(),
            cycle.len(),
            if found { "accepted" } else { "rejected" }
        );
        found
    }
}

impl std::fmt::Debug for Nba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(
            f,
            "NBA with {} states over {:?}, initial {}",
            self.num_states(),
            self.alphabet.aps(),
            self.initial
        )?;
        for q in self.state_indices() {
            writeln!(
                f,
                "  {q}: {}",
                self.edges_from(q)
                    .iter()
                    .map(|edge| format!(
                        "--{}{}--> {}",
                        self.alphabet.fmt_guard(&edge.guard),
                        if edge.accepting { " !" } else { "" },
                        edge.target
                    ))
                    .join("  ")
            )?;
        }
        Ok(())
    }
}
