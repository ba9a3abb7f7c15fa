use std::collections::VecDeque;

use bit_set::BitSet;
use tracing::trace;

use crate::math::Map;
use crate::nba::{Nba, StateId};

/// The decomposition of a directed graph into strongly connected components.
///
/// Components are numbered in reverse topological order: whenever an edge
/// leaves its component, it leads to a component with a strictly smaller
/// index. The predicates in this module rely on that ordering to propagate
/// information through the condensation in a single pass.
#[derive(Debug, Clone)]
pub struct SccInfo {
    scc_of: Vec<u32>,
    members: Vec<Vec<StateId>>,
}

impl SccInfo {
    /// Decomposes the state graph of the given automaton, ignoring guards.
    pub fn new(aut: &Nba) -> Self {
        let adjacency: Vec<Vec<StateId>> = aut
            .state_indices()
            .map(|q| aut.edges_from(q).iter().map(|edge| edge.target).collect())
            .collect();
        Self::from_adjacency(&adjacency)
    }

    /// Iterative Tarjan over a plain adjacency list. The explicit frame
    /// stack takes the role of the recursion, storing for every open state
    /// the position of the next edge to look at.
    pub fn from_adjacency(adjacency: &[Vec<StateId>]) -> Self {
        let n = adjacency.len();
        const UNVISITED: usize = usize::MAX;
        let mut index = vec![UNVISITED; n];
        let mut low = vec![0usize; n];
        let mut on_stack = BitSet::with_capacity(n);
        let mut stack: Vec<StateId> = Vec::new();
        let mut frames: Vec<(StateId, usize)> = Vec::new();
        let mut scc_of = vec![0u32; n];
        let mut members: Vec<Vec<StateId>> = Vec::new();
        let mut next_index = 0usize;

        for root in 0..n {
            if index[root] != UNVISITED {
                continue;
            }
            frames.push((root as StateId, 0));
            while let Some((q, mut e)) = frames.pop() {
                let qi = q as usize;
                if e == 0 {
                    index[qi] = next_index;
                    low[qi] = next_index;
                    next_index += 1;
                    stack.push(q);
                    on_stack.insert(qi);
                }
                let mut descended = false;
                while e < adjacency[qi].len() {
                    let t = adjacency[qi][e] as usize;
                    if index[t] == UNVISITED {
                        frames.push((q, e + 1));
                        frames.push((t as StateId, 0));
                        descended = true;
                        break;
                    }
                    if on_stack.contains(t) {
                        low[qi] = low[qi].min(index[t]);
                    }
                    e += 1;
                }
                if descended {
                    continue;
                }
                if low[qi] == index[qi] {
                    let c = members.len() as u32;
                    let mut scc = Vec::new();
                    loop {
                        let top = stack.pop().expect("tarjan stack holds the root");
                        on_stack.remove(top as usize);
                        scc_of[top as usize] = c;
                        scc.push(top);
                        if top == q {
                            break;
                        }
                    }
                    scc.reverse();
                    members.push(scc);
                }
                if let Some(&(parent, _)) = frames.last() {
                    let pi = parent as usize;
                    low[pi] = low[pi].min(low[qi]);
                }
            }
        }

        trace!("found {} sccs among {} states", members.len(), n);
        Self { scc_of, members }
    }

    /// The component index of the given state.
    pub fn scc_of(&self, state: StateId) -> u32 {
        self.scc_of[state as usize]
    }

    /// The number of components.
    pub fn count(&self) -> usize {
        self.members.len()
    }

    /// The states of the component with the given index.
    pub fn members(&self, scc: u32) -> &[StateId] {
        &self.members[scc as usize]
    }
}

/// Computes, per component, whether it belongs to the deterministic part of
/// the automaton: the components containing the target of some accepting
/// edge, closed under reachability.
pub fn deterministic_part(aut: &Nba, si: &SccInfo) -> Vec<bool> {
    let mut part = vec![false; si.count()];
    for q in aut.state_indices() {
        for edge in aut.edges_from(q) {
            if edge.accepting {
                part[si.scc_of(edge.target) as usize] = true;
            }
        }
    }
    // component indices decrease along edges, so one descending sweep
    // saturates the marking
    for c in (0..si.count()).rev() {
        if !part[c] {
            continue;
        }
        for &q in si.members(c as u32) {
            for edge in aut.edges_from(q) {
                part[si.scc_of(edge.target) as usize] = true;
            }
        }
    }
    part
}

/// Per-state view of [`deterministic_part`].
pub fn deterministic_states(aut: &Nba) -> Vec<bool> {
    let si = SccInfo::new(aut);
    let part = deterministic_part(aut, &si);
    aut.state_indices()
        .map(|q| part[si.scc_of(q) as usize])
        .collect()
}

/// Checks whether the automaton is semi-deterministic, i.e. whether every
/// state of the deterministic part has pairwise disjoint outgoing guards.
pub fn is_semi_deterministic(aut: &Nba) -> bool {
    let deter = deterministic_states(aut);
    for q in aut.state_indices() {
        if !deter[q as usize] {
            continue;
        }
        let out = aut.edges_from(q);
        for (i, first) in out.iter().enumerate() {
            for second in &out[i + 1..] {
                if !first.guard.and(&second.guard).is_false() {
                    trace!("state {q} of the deterministic part has overlapping guards");
                    return false;
                }
            }
        }
    }
    true
}

/// Checks whether the automaton is unambiguous, i.e. whether no word has
/// two distinct accepting runs.
///
/// Two runs on the same word form a path in the product of the automaton
/// with itself, and they are distinct iff that path visits a state off the
/// diagonal. The automaton is therefore ambiguous iff some reachable
/// off-diagonal product state can reach a product component that contains,
/// internally, an edge accepting in the first and an edge accepting in the
/// second component.
pub fn is_unambiguous(aut: &Nba) -> bool {
    if aut.num_states() == 0 {
        return true;
    }

    let mut ids: Map<(StateId, StateId), usize> = Map::default();
    let mut adjacency: Vec<Vec<StateId>> = Vec::new();
    let mut edges: Vec<(usize, usize, bool, bool)> = Vec::new();
    let mut todo = VecDeque::new();

    ids.insert((aut.initial(), aut.initial()), 0);
    adjacency.push(Vec::new());
    todo.push_back((aut.initial(), aut.initial()));

    while let Some((q1, q2)) = todo.pop_front() {
        let source = ids[&(q1, q2)];
        for first in aut.edges_from(q1) {
            for second in aut.edges_from(q2) {
                if first.guard.and(&second.guard).is_false() {
                    continue;
                }
                let pair = (first.target, second.target);
                let target = *ids.entry(pair).or_insert_with(|| {
                    adjacency.push(Vec::new());
                    todo.push_back(pair);
                    adjacency.len() - 1
                });
                adjacency[source].push(target as StateId);
                edges.push((source, target, first.accepting, second.accepting));
            }
        }
    }

    let si = SccInfo::from_adjacency(&adjacency);
    let mut first_accepting = vec![false; si.count()];
    let mut second_accepting = vec![false; si.count()];
    for &(u, v, acc1, acc2) in &edges {
        if si.scc_of(u as StateId) == si.scc_of(v as StateId) {
            let c = si.scc_of(u as StateId) as usize;
            first_accepting[c] |= acc1;
            second_accepting[c] |= acc2;
        }
    }

    // ascending component order visits successors first
    let mut reaches_accepting = vec![false; si.count()];
    for c in 0..si.count() {
        let reaches = first_accepting[c] && second_accepting[c]
            || si.members(c as u32).iter().any(|&u| {
                adjacency[u as usize]
                    .iter()
                    .any(|&v| reaches_accepting[si.scc_of(v) as usize])
            });
        reaches_accepting[c] = reaches;
    }

    for (&(q1, q2), &id) in &ids {
        if q1 != q2 && reaches_accepting[si.scc_of(id as StateId) as usize] {
            trace!("state pair ({q1}, {q2}) witnesses ambiguity");
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alphabet::PropAlphabet;

    #[test]
    fn tarjan_iterative() {
        let adjacency: Vec<Vec<StateId>> = vec![vec![0, 1, 2], vec![1], vec![3, 2], vec![2]];
        let si = SccInfo::from_adjacency(&adjacency);

        assert_eq!(si.count(), 3);
        assert_eq!(si.scc_of(2), si.scc_of(3));
        assert_ne!(si.scc_of(0), si.scc_of(1));
        assert_ne!(si.scc_of(0), si.scc_of(2));
        // edges leaving a component lead to smaller indices
        assert!(si.scc_of(0) > si.scc_of(1));
        assert!(si.scc_of(0) > si.scc_of(2));
        assert_eq!(si.members(si.scc_of(2)), &[2, 3]);
    }

    fn semi_deterministic() -> Nba {
        let ap = PropAlphabet::new(["a"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        let q1 = aut.add_state();
        aut.add_edge(q0, q0, ap.tt(), false);
        aut.add_edge(q0, q1, ap.expression("a"), false);
        aut.add_edge(q1, q1, ap.expression("a"), true);
        aut.set_initial(q0);
        aut
    }

    /// One accepting loop, then two branches with disjoint tails. Every
    /// word has at most one accepting run, but the branching state sits in
    /// the deterministic part.
    fn unambiguous_not_semi_deterministic() -> Nba {
        let ap = PropAlphabet::new(["p"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        let q1 = aut.add_state();
        let q2 = aut.add_state();
        aut.add_edge(q0, q0, ap.expression("p"), true);
        aut.add_edge(q0, q1, ap.expression("!p"), false);
        aut.add_edge(q0, q2, ap.expression("!p"), false);
        aut.add_edge(q1, q1, ap.expression("!p"), true);
        aut.add_edge(q2, q2, ap.expression("p"), true);
        aut.set_initial(q0);
        aut
    }

    #[test]
    fn deterministic_part_marks_the_accepting_cone() {
        let aut = semi_deterministic();
        let deter = deterministic_states(&aut);
        assert_eq!(deter, vec![false, true]);
        assert!(is_semi_deterministic(&aut));
    }

    #[test]
    fn overlapping_guards_in_the_accepting_cone() {
        let aut = unambiguous_not_semi_deterministic();
        let deter = deterministic_states(&aut);
        assert_eq!(deter, vec![true, true, true]);
        assert!(!is_semi_deterministic(&aut));
    }

    #[test]
    fn unambiguity() {
        // jumping into the accepting loop at any position yields distinct
        // accepting runs for a^ω
        assert!(!is_unambiguous(&semi_deterministic()));
        assert!(is_unambiguous(&unambiguous_not_semi_deterministic()));

        // two interchangeable accepting runs for a^ω
        let ap = PropAlphabet::new(["a"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        let q1 = aut.add_state();
        let q2 = aut.add_state();
        aut.add_edge(q0, q1, ap.expression("a"), false);
        aut.add_edge(q0, q2, ap.expression("a"), false);
        aut.add_edge(q1, q1, ap.expression("a"), true);
        aut.add_edge(q2, q2, ap.expression("a"), true);
        aut.set_initial(q0);
        assert!(!is_unambiguous(&aut));
    }
}
