use biodivine_lib_bdd::Bdd;
use itertools::Itertools;

use crate::connected_components::deterministic_states;
use crate::nba::{Nba, StateId};

use super::{Canonical, ComplementError, Ctx, Dense, Domain, Variant};

/// Labels of the NSBC construction, which splits the check obligations
/// into a safe set, a breakpoint and a plain check set next to the
/// initial-phase and nondeterministic labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) enum NsbcLabel {
    /// Initial phase, plain subset tracking.
    I,
    /// Still in the nondeterministic part.
    N,
    /// Must avoid accepting edges forever.
    S,
    /// In the breakpoint.
    B,
    /// Committed to the check set, waiting for the next breakpoint.
    C,
}

/// The NSBC construction for semi-deterministic inputs. Keeps the
/// per-state deterministic part computed at construction time.
pub(crate) struct Nsbc {
    deter: Vec<bool>,
}

impl Nsbc {
    pub(crate) fn new(aut: &Nba) -> Self {
        Self {
            deter: deterministic_states(aut),
        }
    }

    fn accepting_successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NsbcLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NsbcLabel>, bool)>,
    ) {
        use NsbcLabel::*;

        let n = ctx.aut.num_states();
        let alphabet = ctx.aut.alphabet();
        let mut succ: Dense<NsbcLabel> = vec![None; n];

        // safe states; an accepting move demotes the target to the check
        // set unless it is already safe
        for i in 0..n {
            if ms[i] != Some(S) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                let target = t.target as usize;
                if t.accepting {
                    if succ[target] != Some(S) {
                        succ[target] = Some(C);
                    }
                } else {
                    succ[target] = Some(S);
                }
            }
        }

        // breakpoint states follow their unique compatible edge
        let mut breakpoint_empty = true;
        for i in 0..n {
            if ms[i] != Some(B) {
                continue;
            }
            breakpoint_empty = false;
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                let target = t.target as usize;
                if succ[target] != Some(S) {
                    succ[target] = Some(B);
                }
                break;
            }
        }

        // nondeterministic states; moves into the deterministic part join
        // the check set
        for i in 0..n {
            if ms[i] != Some(N) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                let target = t.target as usize;
                if self.deter[target] {
                    if succ[target] != Some(S) && succ[target] != Some(B) {
                        succ[target] = Some(C);
                    }
                } else {
                    succ[target] = Some(N);
                }
            }
        }

        // check states follow their unique compatible edge
        for i in 0..n {
            if ms[i] != Some(C) {
                continue;
            }
            for t in ctx.aut.edges_from(i as StateId) {
                if !alphabet.implies(letter, &t.guard) {
                    continue;
                }
                let target = t.target as usize;
                if succ[target] != Some(S) && succ[target] != Some(B) {
                    succ[target] = Some(C);
                }
                break;
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

    /// The subset successor of a pure initial-phase macrostate, plus the
    /// lift that commits the subset: deterministic-part states enter the
    /// breakpoint or the safe set depending on their compatible edge, the
    /// rest stays nondeterministic.
    fn initial_successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NsbcLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NsbcLabel>, bool)>,
    ) {
        use NsbcLabel::*;

        let n = ctx.aut.num_states();
        let alphabet = ctx.aut.alphabet();
        let mut subset: Dense<NsbcLabel> = vec![None; n];
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

        let mut lift: Dense<NsbcLabel> = vec![None; n];
        for i in 0..n {
            if ms[i] != Some(I) {
                continue;
            }
            if self.deter[i] {
                for t in ctx.aut.edges_from(i as StateId) {
                    if !alphabet.implies(letter, &t.guard) {
                        continue;
                    }
                    lift[i] = Some(if t.accepting { B } else { S });
                }
            } else {
                lift[i] = Some(N);
            }
        }
        self.accepting_successors(ctx, &lift, letter, out);
    }
}

impl Variant for Nsbc {
    type Label = NsbcLabel;

    const ALGORITHM: &'static str = "NSBC";

    fn initial(&self, aut: &Nba) -> Dense<NsbcLabel> {
        let mut ms = vec![None; aut.num_states()];
        ms[aut.initial() as usize] = Some(NsbcLabel::I);
        ms
    }

    fn letter_domain(&self, ctx: &Ctx, ms: &Dense<NsbcLabel>) -> Domain {
        Domain::union_of_active(ctx, ms)
    }

    fn successors(
        &self,
        ctx: &Ctx,
        ms: &Dense<NsbcLabel>,
        letter: &Bdd,
        out: &mut Vec<(Dense<NsbcLabel>, bool)>,
    ) {
        if ms.iter().flatten().any(|label| *label == NsbcLabel::I) {
            self.initial_successors(ctx, ms, letter, out);
        } else {
            self.accepting_successors(ctx, ms, letter, out);
        }
    }

    fn validate(&self, ms: &Canonical<NsbcLabel>) -> Result<(), ComplementError> {
        let has_initial = ms.iter().any(|(_, label)| *label == NsbcLabel::I);
        if has_initial && ms.iter().any(|(_, label)| *label != NsbcLabel::I) {
            return Err(ComplementError::InvariantViolation {
                macrostate: Self::render(ms),
                details: "initial-phase labels mixed with accepting-phase labels",
            });
        }
        Ok(())
    }

    fn render(ms: &Canonical<NsbcLabel>) -> String {
        fn group(ms: &Canonical<NsbcLabel>, which: NsbcLabel) -> String {
            ms.iter()
                .filter(|(_, label)| *label == which)
                .map(|(q, _)| q.to_string())
                .join(",")
        }
        format!(
            "{{{}}},{{{}}},{{{}}},{{{}}},{{{}}}",
            ms.iter()
                .filter(|(_, label)| *label == NsbcLabel::I)
                .map(|(q, _)| format!("i{q}"))
                .join(","),
            group(ms, NsbcLabel::N),
            group(ms, NsbcLabel::S),
            group(ms, NsbcLabel::B),
            group(ms, NsbcLabel::C),
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::alphabet::PropAlphabet;
    use crate::complement::testing::{
        assert_complements, assert_edge_guards_exhaustive, assert_edges_merged, sample_words,
    };
    use crate::complement::new_complement_semidet;
    use crate::nba::Nba;

    fn universal() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        aut.add_edge(q0, q0, ap.tt(), true);
        aut.set_initial(q0);
        aut
    }

    fn empty() -> Nba {
        let ap = PropAlphabet::new(["a", "b"]);
        let mut aut = Nba::new(ap.clone());
        let q0 = aut.add_state();
        aut.add_edge(q0, q0, ap.tt(), false);
        aut.set_initial(q0);
        aut
    }

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

    #[test]
    fn complement_of_trivial_inputs() {
        let aut = universal();
        let complement = new_complement_semidet(&aut, false).unwrap();
        assert_complements(&aut, &complement);
        for (prefix, cycle) in sample_words(aut.alphabet()) {
            assert!(!complement.accepts(&prefix, &cycle));
        }

        let aut = empty();
        let complement = new_complement_semidet(&aut, false).unwrap();
        assert_complements(&aut, &complement);
    }

    #[test_log::test]
    fn complement_with_initial_phase() {
        for aut in [a_then_b_forever(), infinitely_often_a()] {
            let complement = new_complement_semidet(&aut, false).unwrap();
            assert_complements(&aut, &complement);
            assert_edge_guards_exhaustive(&complement);
            assert_edges_merged(&complement);
        }
    }

    #[test]
    fn colored_edges_lead_to_empty_breakpoints() {
        let complement = new_complement_semidet(&a_then_b_forever(), true).unwrap();
        let names = complement.state_names().unwrap();
        assert_eq!(names[0], "{i0},{},{},{},{}");
        for q in complement.state_indices() {
            for edge in complement.edges_from(q) {
                let groups: Vec<&str> = names[edge.target as usize].split("},{").collect();
                if edge.accepting {
                    assert_eq!(groups[3], "", "colored edge into a non-empty breakpoint");
                }
            }
        }
    }
}
