use super::{SemiLinearSet, Vector};
use crate::{
    config::SlsConfig,
    error::{Error, Result},
    formula::{
        Formula, NameGen, Var, mk_add, mk_and, mk_int, mk_ite, mk_le, mk_neg, mk_not, mk_var,
        mk_vars,
    },
    solver::{Model, SatResult, Smt},
};
use log::{debug, trace};

/// Searches step vectors of `target` whose output projection is not yet
/// covered by an SLS, preferring small witnesses.
///
/// The per-dimension bound and the sum bound checkpoint survive across calls:
/// the uncovered part of `target` only shrinks while the SLS grows.
pub struct AugmentVectorFinder {
    step: Vec<Var>,
    dim: usize,
    target: Formula,
    max_bound: i64,
    bound: i64,
    sum_bound: i64,
}

impl AugmentVectorFinder {
    pub fn new(step: &[Var], dim: usize, target: &Formula, cfg: &SlsConfig) -> Self {
        assert!(dim <= step.len(), "sls dimension exceeds step arity");
        Self {
            step: step.to_vec(),
            dim,
            target: target.clone(),
            max_bound: cfg.finder_max_bound.max(1),
            bound: 1,
            sum_bound: 1,
        }
    }

    #[inline]
    fn out(&self) -> Vec<Formula> {
        mk_vars(&self.step[..self.dim])
    }

    fn vector(&self, model: &Model) -> Vector {
        self.step[..self.dim]
            .iter()
            .map(|v| model.get(v.name()).copied().unwrap_or(0))
            .collect()
    }

    fn box_bound(&self, bound: i64) -> Formula {
        mk_and(self.out().iter().flat_map(|x| {
            [mk_le(&mk_int(-bound), x), mk_le(x, &mk_int(bound))]
        }))
    }

    fn sum_abs_bound(&self, bound: i64) -> Formula {
        let abs = self.out().into_iter().map(|x| {
            mk_ite(&mk_le(&mk_int(0), &x), &x, &mk_neg(&x))
        });
        mk_le(&mk_add(abs), &mk_int(bound))
    }

    pub fn find(&mut self, sls: &SemiLinearSet, smt: &Smt, names: &mut NameGen) -> Result<Option<Vector>> {
        assert_eq!(sls.dim(), self.dim, "sls dimension mismatch");
        let member = sls.member_formula(&self.out(), names);
        let query = mk_and([self.target.clone(), mk_not(&member)]);
        trace!("augment query: {query}");
        if let SatResult::Unsat = smt.check_sat(&query)? {
            return Ok(None);
        }
        while self.bound <= self.max_bound {
            let boxed = mk_and([query.clone(), self.box_bound(self.bound)]);
            let model = match smt.check_sat(&boxed)? {
                SatResult::Sat(m) => m,
                SatResult::Unsat | SatResult::Unknown(_) => {
                    self.bound *= 2;
                    self.sum_bound = 1;
                    continue;
                }
            };
            let limit = self.bound.saturating_mul(self.dim as i64);
            while self.sum_bound < limit {
                let q = mk_and([boxed.clone(), self.sum_abs_bound(self.sum_bound)]);
                if let SatResult::Sat(m) = smt.check_sat(&q)? {
                    let v = self.vector(&m);
                    debug!("augment vector {v:?} within sum bound {}", self.sum_bound);
                    return Ok(Some(v));
                }
                self.sum_bound *= 2;
            }
            let v = self.vector(&model);
            debug!("augment vector {v:?} within bound {}", self.bound);
            return Ok(Some(v));
        }
        Err(Error::SlsUndecidable(format!(
            "no augment vector within bound {}",
            self.max_bound
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmtConfig,
        formula::{mk_eq, mk_ge, mk_or},
        sls::LinearSet,
        solver::Interrupt,
    };

    fn smt() -> Smt {
        Smt::new(SmtConfig::default(), Interrupt::new())
    }

    #[test]
    fn prefers_small_witnesses() {
        let smt = smt();
        let mut names = NameGen::new();
        let w1 = Var::int("w1");
        // w1 ≥ 7 or w1 ≤ -40
        let target = mk_or([
            mk_ge(&mk_var(&w1), &mk_int(7)),
            mk_le(&mk_var(&w1), &mk_int(-40)),
        ]);
        let mut finder = AugmentVectorFinder::new(&[w1], 1, &target, &SlsConfig::default());
        let mut sls = SemiLinearSet::new(1, &mut names);
        let v = finder.find(&sls, &smt, &mut names).unwrap().unwrap();
        assert!(v[0] >= 7 && v[0] <= 8, "{v:?}");
        sls.push(LinearSet::new(v));
        let v = finder.find(&sls, &smt, &mut names).unwrap().unwrap();
        assert!(v[0] >= 7 && v[0] <= 16, "{v:?}");
    }

    #[test]
    fn covered_target_yields_none() {
        let smt = smt();
        let mut names = NameGen::new();
        let w1 = Var::int("w1");
        let w2 = Var::int("w2");
        let target = mk_and([
            mk_eq(&mk_var(&w2), &mk_add([mk_var(&w1), mk_int(1)])),
            mk_ge(&mk_var(&w1), &mk_int(0)),
        ]);
        let mut finder = AugmentVectorFinder::new(&[w1, w2], 1, &target, &SlsConfig::default());
        let mut sls = SemiLinearSet::new(1, &mut names);
        sls.push(LinearSet::with_offsets(vec![0], [vec![1]]));
        assert_eq!(finder.find(&sls, &smt, &mut names).unwrap(), None);
    }

    #[test]
    fn exhausted_ladder_is_undecidable() {
        let smt = smt();
        let mut names = NameGen::new();
        let w1 = Var::int("w1");
        let target = mk_ge(&mk_var(&w1), &mk_int(100));
        let cfg = SlsConfig {
            finder_max_bound: 2,
            ..Default::default()
        };
        let mut finder = AugmentVectorFinder::new(&[w1], 1, &target, &cfg);
        let sls = SemiLinearSet::new(1, &mut names);
        let res = finder.find(&sls, &smt, &mut names);
        assert!(matches!(res, Err(Error::SlsUndecidable(_))), "{res:?}");
    }
}
