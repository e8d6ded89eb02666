use crate::{
    config::EngineConfig,
    destruct::destruct,
    error::{Error, Result},
    formula::{Formula, NameGen, Scope, mk_and, mk_int, mk_le, mk_var},
    solver::{Interrupt, SatResult, Smt},
    star::{Elimination, StarProblem, StarTransformer},
    statistic::StarStatistic,
};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerifyResult {
    /// No counterexample exists.
    Eq,
    /// A counterexample exists.
    Neq,
    Unknown,
    Timeout,
}

impl fmt::Display for VerifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VerifyResult::Eq => "EQ",
            VerifyResult::Neq => "NEQ",
            VerifyResult::Unknown => "UNKNOWN",
            VerifyResult::Timeout => "TIMEOUT",
        };
        f.write_str(s)
    }
}

/// A counterexample query: the pair is equivalent iff `formula` is
/// unsatisfiable.
#[derive(Clone, Debug)]
pub struct Obligation {
    pub name: String,
    pub formula: Formula,
    pub scope: Scope,
}

impl Obligation {
    pub fn new(name: &str, formula: Formula, scope: Scope) -> Self {
        Self {
            name: name.to_string(),
            formula,
            scope,
        }
    }
}

enum Case {
    Unsat,
    /// satisfiable and every elimination was exact
    Witness,
    Unknown,
}

pub struct Verifier {
    cfg: EngineConfig,
    smt: Smt,
    names: NameGen,
    pub statistic: StarStatistic,
}

impl Verifier {
    pub fn new(cfg: EngineConfig, interrupt: Interrupt) -> Self {
        Self {
            smt: Smt::new(cfg.smt.clone(), interrupt),
            cfg,
            names: NameGen::new(),
            statistic: StarStatistic::default(),
        }
    }

    pub fn check(&mut self, ob: &Obligation) -> Result<VerifyResult> {
        debug!("checking {}", ob.name);
        let cases = destruct(&ob.formula, &ob.scope, &self.smt, &mut self.names)?;
        let mut res = VerifyResult::Eq;
        for (i, case) in cases.iter().enumerate() {
            match self.check_case(case, &ob.scope) {
                Ok(Case::Unsat) => trace!("case {i} is unsatisfiable"),
                Ok(Case::Witness) => {
                    res = VerifyResult::Neq;
                    break;
                }
                Ok(Case::Unknown) => res = VerifyResult::Unknown,
                Err(e) if e.is_recoverable() => {
                    debug!("case {i}: {e}");
                    res = VerifyResult::Unknown;
                }
                Err(e) => return Err(e),
            }
        }
        info!("{}: {res}", ob.name);
        debug!("{:#?}", self.smt.statistic());
        debug!("avg smt query time: {:?}", self.smt.statistic().avg_query_time());
        debug!("{:#?}", self.statistic);
        debug!("saturation steps: {}", self.statistic.num_saturate_step());
        Ok(res)
    }

    fn check_case(&mut self, case: &Formula, scope: &Scope) -> Result<Case> {
        let (iterates, rest): (Vec<Formula>, Vec<Formula>) = case
            .decompose_conjunction()
            .into_iter()
            .partition(|c| c.is_iterate());
        if rest.iter().any(|c| c.contains_iterate()) {
            debug!("iterate below a top level conjunct");
            return Ok(Case::Unknown);
        }
        if !case.is_separable(scope) {
            debug!("parameters are not separable in {case}");
            return Ok(Case::Unknown);
        }
        let outer = mk_and(rest);
        let mut query: Vec<Formula> = outer
            .free_vars()
            .values()
            .filter(|v| v.is_nat())
            .map(|v| mk_le(&mk_int(0), &mk_var(v)))
            .collect();
        query.push(outer.clone());
        let mut exact = true;
        let mut t = StarTransformer::new(&self.cfg.star, &self.cfg.sls, &self.smt, &mut self.names);
        for it in iterates.iter() {
            let res = t.transform(&StarProblem::from_iterate(&outer, it));
            self.statistic += &t.statistic;
            t.statistic = StarStatistic::default();
            let res = res?;
            if res.formula.is_false() {
                return Ok(Case::Unsat);
            }
            exact &= res.kind != Elimination::Approx;
            query.push(res.formula);
        }
        Ok(match self.smt.check_sat(&mk_and(query))? {
            SatResult::Unsat => Case::Unsat,
            SatResult::Sat(model) if exact => {
                debug!("counterexample {model:?}");
                Case::Witness
            }
            SatResult::Sat(_) => Case::Unknown,
            SatResult::Unknown(reason) => return Err(Error::SolverUnknown(reason)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Var, mk_add, mk_eq, mk_iterate, mk_lt, mk_not};

    fn v(n: &str) -> Formula {
        mk_var(&Var::int(n))
    }

    fn verifier() -> Verifier {
        Verifier::new(EngineConfig::default(), Interrupt::new())
    }

    /// `(v1, _) ∈ {(w1, w2) | w2 = w1 + 1 ∧ w1 ≥ 0}*`
    fn counting() -> Formula {
        let body = mk_and([
            mk_eq(&v("w2"), &mk_add([v("w1"), mk_int(1)])),
            mk_le(&mk_int(0), &v("w1")),
        ])
        .mark_star();
        mk_iterate(&[Var::int("v1")], &[Var::int("w1"), Var::int("w2")], &body)
    }

    #[test]
    fn negative_total_is_impossible() {
        let f = mk_and([counting(), mk_lt(&v("v1"), &mk_int(0))]);
        let ob = Obligation::new("neg", f, Scope::default());
        assert_eq!(verifier().check(&ob).unwrap(), VerifyResult::Eq);
    }

    #[test]
    fn exact_elimination_finds_counterexample() {
        let f = mk_and([counting(), mk_eq(&v("v1"), &mk_int(3))]);
        let ob = Obligation::new("three", f, Scope::default());
        assert_eq!(verifier().check(&ob).unwrap(), VerifyResult::Neq);
    }

    #[test]
    fn nested_iterate_is_unknown() {
        let f = mk_and([mk_not(&counting()), mk_eq(&v("v1"), &mk_int(3))]);
        let ob = Obligation::new("nested", f, Scope::default());
        assert_eq!(verifier().check(&ob).unwrap(), VerifyResult::Unknown);
    }

    #[test]
    fn shared_parameter_variable_is_unknown() {
        let scope = Scope::new(["p"], Vec::<String>::new());
        let f = mk_and([
            counting(),
            mk_eq(&v("v1"), &mk_int(3)),
            mk_eq(&v("p"), &v("x")),
            mk_le(&v("x"), &mk_int(7)),
        ]);
        let ob = Obligation::new("shared", f.clone(), scope);
        assert_eq!(verifier().check(&ob).unwrap(), VerifyResult::Unknown);
        // x marked important restores separability
        let ob = Obligation::new("important", f, Scope::new(["p"], ["x"]));
        assert_eq!(verifier().check(&ob).unwrap(), VerifyResult::Neq);
    }

    #[test]
    fn interruption_is_propagated() {
        let interrupt = Interrupt::new();
        interrupt.raise();
        let mut verifier = Verifier::new(EngineConfig::default(), interrupt);
        let ob = Obligation::new("stop", counting(), Scope::default());
        assert_eq!(verifier.check(&ob), Err(Error::Interrupted));
    }

    #[test]
    fn result_names() {
        assert_eq!(VerifyResult::Neq.to_string(), "NEQ");
        let r: VerifyResult = toml::Value::String("TIMEOUT".into()).try_into().unwrap();
        assert_eq!(r, VerifyResult::Timeout);
    }
}
