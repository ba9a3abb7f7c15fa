use biodivine_lib_bdd::Bdd;
use itertools::Itertools;

use crate::math::Map;
use crate::nba::{Nba, StateId};

use super::{Canonical, ComplementError, Ctx, Dense, Domain, Variant};

/// Labels of the NCB construction. The sets are nested: every check state
/// is also tracked and the breakpoint is part of the check set, so `C`
/// means "tracked and checked" and `B` means "tracked, checked and in the
/// breakpoint".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum NcbLabel {
    /// Initial phase, plain subset tracking without any obligation.
    I,
    /// Tracked by the accepting phase.
    N,
    /// Tracked and in the check set.
    C,
    /// Tracked, checked and in the breakpoint.
    B,
}

fn tracked(label: NcbLabel) -> bool {
    matches!(label, NcbLabel::N | NcbLabel::C | NcbLabel::B)
}

fn in_check(label: NcbLabel) -> bool {
    matches!(label, NcbLabel::C | NcbLabel::B)
}

/// The NCB construction for unambiguous inputs.
pub(crate) struct Ncb;

impl Ncb {
    /// One step of the accepting phase. The subset step runs over all
    /// tracked states and records, per successor, the first source that
    /// reached it; the check and breakpoint steps follow that record.
    fn accepting_successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NcbLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NcbLabel>, bool)>,
    ) {
        use NcbLabel::*;

        let n = ctx.aut.num_states();
        let alphabet = ctx.aut.alphabet();
        let mut succ: Dense<NcbLabel> = vec![None; n];
        let mut dst_src: Map<StateId, StateId> = Map::default();

        // subset step; an accepting move seeds the check set
        for i in 0..n {
            if !ms[i].is_some_and(tracked) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                succ[t.target as usize] = Some(N);
                if t.accepting {
                    succ[t.target as usize] = Some(C);
                }
                dst_src.entry(t.target).or_insert(i as StateId);
            }
        }

        // successors recorded from check sources stay in the check set
        for i in 0..n {
            if !ms[i].is_some_and(in_check) {
                continue;
            }
            for (&target, &source) in &dst_src {
                if source == i as StateId {
                    succ[target as usize] = Some(C);
                }
            }
        }

        // breakpoint step
        let mut breakpoint_empty = true;
        for i in 0..n {
            if ms[i] != Some(B) {
                continue;
            }
            breakpoint_empty = false;
            for (&target, &source) in &dst_src {
                if source == i as StateId {
                    succ[target as usize] = Some(B);
                }
            }
        }

        // an emptied breakpoint reloads from the check set
        if breakpoint_empty {
            for label in &mut succ {
                if *label == Some(C) {
                    *label = Some(B);
                }
            }
        }

        let accepting = !succ.iter().any(|label| *label == Some(B));
        out.push((succ, accepting));
    }

    /// One step of the initial phase: the plain subset successor, plus the
    /// lift that promotes the whole subset into the accepting phase.
    fn initial_successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NcbLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NcbLabel>, bool)>,
    ) {
        use NcbLabel::*;

        let n = ctx.aut.num_states();
        let alphabet = ctx.aut.alphabet();
        let mut subset: Dense<NcbLabel> = vec![None; n];
        for i in 0..n {
            if ms[i] != Some(I) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if alphabet.implies(letter, &t.guard) {
                    subset[t.target as usize] = Some(I);
                }
            }
        }
        out.push((subset, false));

        let lift = ms
            .iter()
            .map(|label| match label {
                Some(I) => Some(N),
                _ => None,
            })
            .collect();
        self.accepting_successors(ctx, &lift, letter, out);
    }
}

impl Variant for Ncb {
    type Label = NcbLabel;

    const ALGORITHM: &'static str = "NCB";

    fn initial(&self, aut: &Nba) -> Dense<NcbLabel> {
        let mut ms = vec![None; aut.num_states()];
        ms[aut.initial() as usize] = Some(NcbLabel::I);
        ms
    }

    fn letter_domain(&self, ctx: &Ctx, ms: &Dense<NcbLabel>) -> Domain {
        Domain::union_of_active(ctx, ms)
    }

    fn successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NcbLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NcbLabel>, bool)>,
    ) {
        if ms.iter().flatten().any(|label| *label == NcbLabel::I) {
            self.initial_successors(ctx, ms, letter, out);
        } else {
            self.accepting_successors(ctx, ms, letter, out);
        }
    }

    fn validate(&self, ms: &Canonical<NcbLabel>) -> Result<(), ComplementError> {
        let has_initial = ms.iter().any(|(_, label)| *label == NcbLabel::I);
        let has_tracked = ms.iter().any(|(_, label)| tracked(*label));
        if has_initial && has_tracked {
            return Err(ComplementError::InvariantViolation {
                macrostate: Self::render(ms),
                details: "initial-phase labels mixed with accepting-phase labels",
            });
        }
        Ok(())
    }

    fn render(ms: &Canonical<NcbLabel>) -> String {
        format!(
            "{{{}}},{{{}}},{{{}}}",
            ms.iter()
                .map(|(q, label)| if *label == NcbLabel::I {
                    format!("i{q}")
                } else {
                    q.to_string()
                })
                .join(","),
            ms.iter()
                .filter(|(_, label)| in_check(*label))
                .map(|(q, _)| q.to_string())
                .join(","),
            ms.iter()
                .filter(|(_, label)| *label == NcbLabel::B)
                .map(|(q, _)| q.to_string())
                .join(","),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::alphabet::PropAlphabet;
    use crate::complement::testing::{assert_complements, assert_edge_guards_exhaustive};
    use crate::complement::complement_unambiguous;
    use crate::nba::Nba;

    /// An accepting loop that branches on the first `!p` into two
    /// deterministic tails with disjoint languages. Unambiguous, but the
    /// branching state sits in the deterministic part, so the automaton is
    /// not semi-deterministic.
    fn branching() -> Nba {
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

    /// Accepts the words with infinitely many `a` positions, with a
    /// deterministic transition structure.
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

    #[test_log::test]
    fn complement_of_branching_tails() {
        let aut = branching();
        let complement = complement_unambiguous(&aut, false).unwrap();
        assert_complements(&aut, &complement);
        assert_edge_guards_exhaustive(&complement);
        // stays within a subset-sized blowup
        assert!(complement.num_states() <= 1 << (aut.num_states() + 1));
    }

    #[test]
    fn complement_of_deterministic_input() {
        let aut = infinitely_often_a();
        let complement = complement_unambiguous(&aut, false).unwrap();
        assert_complements(&aut, &complement);
        assert_edge_guards_exhaustive(&complement);
    }

    #[test]
    fn initial_phase_spawns_subset_and_lift() {
        let complement = complement_unambiguous(&branching(), true).unwrap();
        let names = complement.state_names().unwrap().to_vec();
        assert_eq!(names[0], "{i0},{},{}");
        // the subset successor keeps the initial phase, the lift leaves it
        assert!(names.contains(&"{i1,i2},{},{}".to_string()));
        assert!(names.contains(&"{1,2},{},{}".to_string()));
    }
}
