use biodivine_lib_bdd::Bdd;
use itertools::Itertools;

use crate::connected_components::deterministic_states;
use crate::math::OrderedSet;
use crate::nba::{Nba, StateId};

use super::{Canonical, Ctx, Dense, Domain, Variant};

/// Labels of the NCSB construction. `Cb` marks a check state that is also
/// part of the current breakpoint, so the check set is everything labelled
/// `C` or `Cb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum NcsbLabel {
    /// Still in the nondeterministic part of the input.
    N,
    /// Committed to a deterministic continuation.
    C,
    /// Must avoid accepting edges forever.
    S,
    /// Check state inside the breakpoint.
    Cb,
}

fn in_check(label: NcsbLabel) -> bool {
    matches!(label, NcsbLabel::C | NcsbLabel::Cb)
}

/// The NCSB construction for semi-deterministic inputs.
///
/// Both policies are fixed at construction time. With `optb` set, only
/// states that entered the check set from it are promoted when the
/// breakpoint empties. In the on-the-fly mode no deterministic part is
/// precomputed and nondeterministic states commit to the check set exactly
/// when they take an accepting edge.
pub(crate) struct Ncsb {
    /// Per input state, whether it lies in the deterministic part.
    /// [`None`] selects the on-the-fly mode.
    deter: Option<Vec<bool>>,
    optb: bool,
}

impl Ncsb {
    pub(crate) fn new(aut: &Nba, optb: bool) -> Self {
        Self {
            deter: Some(deterministic_states(aut)),
            optb,
        }
    }

    pub(crate) fn on_the_fly(optb: bool) -> Self {
        Self { deter: None, optb }
    }
}

impl Variant for Ncsb {
    type Label = NcsbLabel;

    const ALGORITHM: &'static str = "NCSB";

    fn initial(&self, aut: &Nba) -> Dense<NcsbLabel> {
        // a single initial state always starts in N, otherwise the whole
        // automaton would already be deterministic
        let mut ms = vec![None; aut.num_states()];
        ms[aut.initial() as usize] = Some(NcsbLabel::N);
        ms
    }

    fn letter_domain(&self, ctx: &Ctx, ms: &Dense<NcsbLabel>) -> Domain {
        let alphabet = ctx.aut.alphabet();
        let mut support = OrderedSet::new();
        let mut x_compat = alphabet.ff();
        let mut y_compat = alphabet.tt();
        let mut y_empty = true;
        for (i, label) in ms.iter().enumerate() {
            let Some(label) = *label else { continue };
            let data = &ctx.states[i];
            support.extend(data.support.iter().copied());
            // states that could just as well sit in the safe set widen the
            // domain, breakpoint states that must survive narrow it
            if !matches!(label, NcsbLabel::Cb) || data.all_accepting {
                x_compat = x_compat.or(&data.compat);
            } else {
                y_empty = false;
                y_compat = y_compat.and(&data.compat);
            }
        }
        if y_empty {
            let escape = (!x_compat.is_true()).then(|| x_compat.not());
            Domain {
                support,
                all: x_compat,
                escape,
            }
        } else {
            Domain {
                support,
                all: y_compat,
                escape: None,
            }
        }
    }

    fn successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NcsbLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NcsbLabel>, bool)>,
    ) {
        use NcsbLabel::*;

        let n = ctx.aut.num_states();
        let alphabet = ctx.aut.alphabet();
        let mut succs: Vec<Dense<NcsbLabel>> = vec![vec![None; n]];
        let mut colored = vec![false];

        // Safe states stay safe. Handled first because an accepting move
        // kills the whole letter.
        for i in 0..n {
            if ms[i] != Some(S) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                if t.accepting || ctx.states[t.target as usize].all_accepting {
                    return;
                }
                succs[0][t.target as usize] = Some(S);
                // the deterministic part has a single compatible edge
                break;
            }
        }

        // Check states, including the breakpoint ones. Targets already in
        // the safe set stay there.
        let mut from_check = vec![false; n];
        for i in 0..n {
            if !ms[i].is_some_and(in_check) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                if succs[0][t.target as usize].is_none() {
                    succs[0][t.target as usize] = Some(C);
                    if self.optb {
                        from_check[t.target as usize] = true;
                    }
                }
                break;
            }
        }

        // Nondeterministic states.
        for i in 0..n {
            if ms[i] != Some(N) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                let target = t.target as usize;
                match &self.deter {
                    None => {
                        // on the fly: the acceptance bit decides
                        if t.accepting {
                            if succs[0][target].is_none() {
                                succs[0][target] = Some(C);
                            }
                        } else {
                            for succ in &mut succs {
                                if succ[target].is_none() {
                                    succ[target] = Some(N);
                                }
                            }
                        }
                    }
                    Some(deter) => {
                        if deter[target] {
                            if succs[0][target].is_none() {
                                succs[0][target] = Some(C);
                            }
                        } else {
                            for succ in &mut succs {
                                succ[target] = Some(N);
                            }
                        }
                    }
                }
            }
        }

        // Breakpoint states, first pass: follow the unique compatible edge
        // and keep the target in the breakpoint. A breakpoint state whose
        // run dies kills the letter, as does a non-accepting move into the
        // safe set, because then the source should have been safe already.
        for i in 0..n {
            if ms[i] != Some(Cb) {
                continue;
            }
            let mut has_succ = false;
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                has_succ = true;
                let target = t.target as usize;
                if succs[0][target] == Some(C) {
                    succs[0][target] = Some(Cb);
                }
                if !t.accepting && succs[0][target] == Some(S) {
                    return;
                }
                break;
            }
            if !has_succ && !ctx.states[i].all_accepting {
                return;
            }
        }

        // Breakpoint states, second pass: a target reached by an accepting
        // edge may alternatively be moved into the safe set, which branches
        // the candidate set.
        for i in 0..n {
            if ms[i] != Some(Cb) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) || !t.accepting {
                    continue;
                }
                let target = t.target as usize;
                let length = succs.len();
                for j in 0..length {
                    if succs[j][target] == Some(Cb) && !ctx.states[target].all_accepting {
                        let mut clone = succs[j].clone();
                        clone[target] = Some(S);
                        succs.push(clone);
                        colored.push(false);
                    }
                }
            }
        }

        // Breakpoint check: every candidate whose breakpoint emptied starts
        // the next round by promoting check states, takes the acceptance
        // color, and branches once more over the promoted states that may
        // instead go safe.
        let length = succs.len();
        for j in 0..length {
            if succs[j].iter().any(|label| *label == Some(Cb)) {
                continue;
            }
            for i in 0..n {
                let promote = if self.optb {
                    from_check[i] && succs[j][i] == Some(C)
                } else {
                    succs[j][i] == Some(C)
                };
                if promote {
                    succs[j][i] = Some(Cb);
                }
            }
            colored[j] = true;

            let mut clones = vec![succs[j].clone()];
            for i in 0..n {
                let branches = if self.optb {
                    succs[j][i].is_some_and(in_check)
                } else {
                    succs[j][i] == Some(Cb)
                };
                if !branches || ctx.states[i].all_accepting {
                    continue;
                }
                let clone_count = clones.len();
                for k in 0..clone_count {
                    let mut clone = clones[k].clone();
                    clone[i] = Some(S);
                    clones.push(clone);
                }
            }
            for clone in clones.into_iter().skip(1) {
                succs.push(clone);
                colored.push(true);
            }
        }

        out.extend(succs.into_iter().zip(colored));
    }

    fn render(ms: &Canonical<NcsbLabel>) -> String {
        fn group(ms: &Canonical<NcsbLabel>, pred: fn(NcsbLabel) -> bool) -> String {
            ms.iter()
                .filter(|(_, label)| pred(*label))
                .map(|(q, _)| q.to_string())
                .join(",")
        }
        format!(
            "{{{}}},{{{}}},{{{}}},{{{}}}",
            group(ms, |label| label == NcsbLabel::N),
            group(ms, in_check),
            group(ms, |label| label == NcsbLabel::S),
            group(ms, |label| label == NcsbLabel::Cb),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::alphabet::PropAlphabet;
    use crate::complement::testing::{assert_complements, assert_edges_merged, sample_words};
    use crate::complement::{
        complement_semidet, complement_semidet_onthefly, complement_semidet_opt,
        complement_semidet_opt_onthefly, ComplementError,
    };
    use crate::nba::Nba;

    type EntryPoint = fn(&Nba, bool) -> Result<Nba, ComplementError>;

    const ENTRY_POINTS: [EntryPoint; 4] = [
        complement_semidet,
        complement_semidet_opt,
        complement_semidet_onthefly,
        complement_semidet_opt_onthefly,
    ];

    /// A single state accepting every word.
    fn universal() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        aut.add_edge(q0, q0, ap.tt(), true);
        aut.set_initial(q0);
        aut
    }

    /// A single state rejecting every word.
    fn empty() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        aut.add_edge(q0, q0, ap.tt(), false);
        aut.set_initial(q0);
        aut
    }

    /// Accepts the words with infinitely many positions satisfying `a`.
    fn infinitely_often_a() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        let q1 = aut.add_state();
        aut.add_edge(q0, q1, ap.expression("a"), true);
        aut.add_edge(q0, q0, ap.expression("!a"), false);
        aut.add_edge(q1, q1, ap.expression("a"), true);
        aut.add_edge(q1, q0, ap.expression("!a"), false);
        aut.set_initial(q0);
        aut
    }

    /// Accepts `a` followed by `b` forever. Not all letters are enabled
    /// everywhere, so the complement needs the sink.
    fn a_then_b_forever() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        let q1 = aut.add_state();
        aut.add_edge(q0, q1, ap.expression("a"), false);
        aut.add_edge(q1, q1, ap.expression("b"), true);
        aut.set_initial(q0);
        aut
    }

    #[test]
    fn complement_of_universal_is_empty() {
        let aut = universal();
        for entry in ENTRY_POINTS {
            let complement = entry(&aut, false).unwrap();
            assert_complements(&aut, &complement);
            for (prefix, cycle) in sample_words(aut.alphabet()) {
                assert!(!complement.accepts(&prefix, &cycle));
            }
        }
    }

    #[test]
    fn complement_of_empty_is_universal() {
        let aut = empty();
        for entry in ENTRY_POINTS {
            let complement = entry(&aut, false).unwrap();
            assert_complements(&aut, &complement);
            // the whole alphabet stays live, so everything loops on an
            // accepting ⊤ edge instead of falling into the sink
            assert!(complement.state_indices().any(|q| {
                complement
                    .edges_from(q)
                    .iter()
                    .any(|edge| edge.target == q && edge.accepting && edge.guard.is_true())
            }));
        }
    }

    #[test_log::test]
    fn complement_of_infinitely_often_a() {
        let aut = infinitely_often_a();
        let a = aut.alphabet().expression("a & b");
        let na = aut.alphabet().expression("!a & !b");
        for entry in ENTRY_POINTS {
            let complement = entry(&aut, false).unwrap();
            assert_complements(&aut, &complement);
            // finitely many a's
            assert!(complement.accepts(&[], &[na.clone()]));
            assert!(complement.accepts(&[a.clone()], &[na.clone()]));
            assert!(!complement.accepts(&[], &[a.clone()]));
            assert!(!complement.accepts(&[na.clone()], &[a.clone(), na.clone()]));
        }
    }

    #[test]
    fn complement_of_a_then_b_forever() {
        let aut = a_then_b_forever();
        for entry in ENTRY_POINTS {
            let complement = entry(&aut, false).unwrap();
            assert_complements(&aut, &complement);
        }
    }

    #[test]
    fn sink_is_present_iff_a_letter_domain_is_partial() {
        let complement = complement_semidet(&a_then_b_forever(), true).unwrap();
        let names = complement.state_names().unwrap();
        assert!(names.contains(&"{},{},{},{}".to_string()));

        // with every letter enabled everywhere the sink never materializes
        let complement = complement_semidet(&empty(), true).unwrap();
        let names = complement.state_names().unwrap();
        assert_eq!(names.len(), 1);
        assert_eq!(names[0], "{0},{},{},{}");
    }

    #[test]
    fn edges_are_merged() {
        for aut in [infinitely_often_a(), a_then_b_forever()] {
            for entry in ENTRY_POINTS {
                assert_edges_merged(&entry(&aut, false).unwrap());
            }
        }
    }

    #[test]
    fn macrostates_are_named_by_label_groups() {
        let complement = complement_semidet(&infinitely_often_a(), true).unwrap();
        let names = complement.state_names().unwrap();
        assert_eq!(names[0], "{0},{},{},{}");
        assert!(names
            .iter()
            .all(|name| name.matches('{').count() == 4 && name.matches('}').count() == 4));
    }
}
