use biodivine_lib_bdd::{Bdd, BddVariable, BddVariableSet, BddVariableSetBuilder};

use crate::math::OrderedSet;

/// A propositional alphabet over a fixed set of named atomic propositions.
///
/// Symbols of the alphabet are the Boolean valuations of the atomic
/// propositions; guards and letters are expressions over them, represented
/// as [`Bdd`]s drawn from the variable set this struct owns. A letter in the
/// strict sense is a minterm, i.e. an expression with exactly one satisfying
/// valuation over the variables it mentions.
#[derive(Clone)]
pub struct PropAlphabet {
    aps: Vec<String>,
    variables: Vec<BddVariable>,
    vars: BddVariableSet,
}

impl PropAlphabet {
    /// Creates an alphabet from the given atomic proposition names. The
    /// names double as variable names for [`Self::expression`], so they
    /// should be plain identifiers.
    pub fn new<I>(aps: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let aps: Vec<String> = aps.into_iter().map(|ap| ap.into()).collect();
        let mut builder = BddVariableSetBuilder::new();
        let variables = aps.iter().map(|ap| builder.make_variable(ap)).collect();
        Self {
            aps,
            variables,
            vars: builder.build(),
        }
    }

    /// Returns the atomic proposition names in variable order.
    pub fn aps(&self) -> &[String] {
        &self.aps
    }

    /// Gives the number of atomic propositions.
    pub fn ap_count(&self) -> usize {
        self.aps.len()
    }

    /// The constant true expression.
    pub fn tt(&self) -> Bdd {
        self.vars.mk_true()
    }

    /// The constant false expression.
    pub fn ff(&self) -> Bdd {
        self.vars.mk_false()
    }

    /// The expression requiring that the `ap`-th proposition has the given
    /// polarity.
    pub fn literal(&self, ap: usize, polarity: bool) -> Bdd {
        self.vars.mk_literal(self.variables[ap], polarity)
    }

    /// Parses a guard such as `"a & !b"` over the proposition names given at
    /// construction time. Panics on malformed input, which makes it mainly
    /// useful for tests and examples.
    pub fn expression(&self, expression: &str) -> Bdd {
        self.vars.eval_expression_string(expression)
    }

    /// Returns true if every valuation satisfying `x` also satisfies `y`.
    pub fn implies(&self, x: &Bdd, y: &Bdd) -> bool {
        x.and_not(y).is_false()
    }

    /// The set of variables the expression actually depends on.
    pub fn support(&self, x: &Bdd) -> OrderedSet<BddVariable> {
        x.support_set().into_iter().collect()
    }

    /// Picks a single satisfying valuation of `x` and widens it to the
    /// minterm over exactly the variables in `support`. Returns [`None`] if
    /// `x` is unsatisfiable.
    ///
    /// The caller is expected to subtract the returned minterm from its
    /// remaining domain; as long as `support` covers the support of `x`,
    /// the minterm is contained in `x` and repeated calls enumerate a
    /// partition of `x`.
    pub fn sat_one(&self, x: &Bdd, support: &OrderedSet<BddVariable>) -> Option<Bdd> {
        let witness = x.sat_witness()?;
        let mut minterm = self.vars.mk_true();
        for &var in support {
            minterm = minterm.and(&self.vars.mk_literal(var, witness.value(var)));
        }
        Some(minterm)
    }

    /// Renders the expression with the proposition names, for diagnostics.
    pub fn fmt_guard(&self, x: &Bdd) -> String {
        if x.is_true() {
            "t".to_string()
        } else if x.is_false() {
            "f".to_string()
        } else {
            x.to_boolean_expression(&self.vars).to_string()
        }
    }
}

impl std::fmt::Debug for PropAlphabet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropAlphabet{:?}", self.aps)
    }
}

impl PartialEq for PropAlphabet {
    fn eq(&self, other: &Self) -> bool {
        self.aps == other.aps
    }
}
impl Eq for PropAlphabet {}
