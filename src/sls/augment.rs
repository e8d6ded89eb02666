use super::{AugmentVectorFinder, LinearSet, SemiLinearSet, Vector, combination, vec_le, vec_sub};
use crate::{
    config::SlsConfig,
    error::{Error, Result},
    formula::{Domain, Formula, NameGen, Var, mk_exists, mk_var},
    solver::Smt,
    statistic::StarStatistic,
};
use log::{debug, trace};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AugmentState {
    Empty,
    Augmenting,
    Saturated,
    /// terminal failure
    Unknown,
}

enum Rule {
    Merge(usize, usize, LinearSet),
    ShiftDown(usize, Vector),
    OffsetDown(usize, Vector, Vector),
}

/// Grows a semi-linear set until its star covers the output projection of
/// `target`. Every linear set added or rewritten stays inside the
/// projection, so the star of the result equals the star of `target`.
pub struct SlsAugmenter<'a> {
    smt: &'a Smt,
    names: &'a mut NameGen,
    cfg: SlsConfig,
    step: Vec<Var>,
    dim: usize,
    target: Formula,
    finder: AugmentVectorFinder,
    sls: SemiLinearSet,
    state: AugmentState,
    rounds: usize,
    pub statistic: StarStatistic,
}

impl<'a> SlsAugmenter<'a> {
    pub fn new(
        smt: &'a Smt,
        names: &'a mut NameGen,
        cfg: &SlsConfig,
        dim: usize,
        step: &[Var],
        target: &Formula,
    ) -> Self {
        let finder = AugmentVectorFinder::new(step, dim, target, cfg);
        let sls = SemiLinearSet::new(dim, names);
        Self {
            smt,
            names,
            cfg: cfg.clone(),
            step: step.to_vec(),
            dim,
            target: target.clone(),
            finder,
            sls,
            state: AugmentState::Empty,
            rounds: 0,
            statistic: StarStatistic::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> AugmentState {
        self.state
    }

    #[inline]
    pub fn sls(&self) -> &SemiLinearSet {
        &self.sls
    }

    pub fn into_sls(self) -> SemiLinearSet {
        self.sls
    }

    fn fail(&mut self, e: Error) -> Error {
        self.state = AugmentState::Unknown;
        e
    }

    /// Runs augmentation rounds until saturated.
    pub fn run(&mut self) -> Result<&SemiLinearSet> {
        while self.augment()? != AugmentState::Saturated {}
        debug!("saturated {} after {} rounds", self.sls, self.rounds);
        Ok(&self.sls)
    }

    pub fn augment(&mut self) -> Result<AugmentState> {
        match self.state {
            AugmentState::Saturated => return Ok(self.state),
            AugmentState::Unknown => {
                return Err(Error::SlsUndecidable("augmenter already failed".into()));
            }
            _ => (),
        }
        if self.rounds >= self.cfg.augment_limit {
            let e = Error::SlsUndecidable(format!("augment limit {} reached", self.cfg.augment_limit));
            return Err(self.fail(e));
        }
        self.rounds += 1;
        let found = match self.finder.find(&self.sls, self.smt, self.names) {
            Ok(found) => found,
            Err(e) => return Err(self.fail(e)),
        };
        match found {
            None => self.state = AugmentState::Saturated,
            Some(v) => {
                trace!("augment {} with {v:?}", self.sls);
                self.statistic.num_augment += 1;
                self.sls.push(LinearSet::new(v));
                self.state = AugmentState::Augmenting;
                self.saturate()?;
            }
        }
        self.statistic.max_linear_sets = self.statistic.max_linear_sets.max(self.sls.len());
        Ok(self.state)
    }

    /// Applies the first applicable rule until none applies.
    pub fn saturate(&mut self) -> Result<()> {
        let mut steps = 0;
        loop {
            let rule = match self.find_rule() {
                Ok(Some(rule)) => rule,
                Ok(None) => return Ok(()),
                Err(e) => return Err(self.fail(e)),
            };
            steps += 1;
            if steps > self.cfg.saturate_limit {
                let e = Error::SlsUndecidable(format!("saturate limit {} reached", self.cfg.saturate_limit));
                return Err(self.fail(e));
            }
            self.apply(rule);
            let max_offsets = self.cfg.max_offsets(self.dim);
            if self.sls.max_offsets() > max_offsets {
                let e = Error::SlsUndecidable(format!(
                    "linear set exceeds {max_offsets} offsets in dimension {}",
                    self.dim
                ));
                return Err(self.fail(e));
            }
        }
    }

    fn apply(&mut self, rule: Rule) {
        let sets = self.sls.sets_mut();
        match rule {
            Rule::Merge(i, j, merged) => {
                trace!("merge {} and {} into {merged}", sets[i], sets[j]);
                self.statistic.num_merge += 1;
                let (lo, hi) = (i.min(j), i.max(j));
                sets.remove(hi);
                sets[lo] = merged;
            }
            Rule::ShiftDown(i, shift) => {
                trace!("shift down {} to {shift:?}", sets[i]);
                self.statistic.num_shift_down += 1;
                sets[i].set_shift(shift);
            }
            Rule::OffsetDown(i, from, to) => {
                trace!("offset down {} from {from:?} to {to:?}", sets[i]);
                self.statistic.num_offset_down += 1;
                sets[i].remove_offset(&from);
                sets[i].add_offset(to);
            }
        }
    }

    fn find_rule(&mut self) -> Result<Option<Rule>> {
        let n = self.sls.len();
        for i in 0..n {
            for j in 0..n {
                if i == j {
                    continue;
                }
                let (a, b) = (&self.sls.sets()[i], &self.sls.sets()[j]);
                if !vec_le(b.shift(), a.shift()) {
                    continue;
                }
                let mut merged = LinearSet::with_offsets(
                    b.shift().to_vec(),
                    a.offsets().iter().chain(b.offsets().iter()).cloned(),
                );
                merged.add_offset(vec_sub(a.shift(), b.shift()));
                if self.holds_on(&merged)? {
                    return Ok(Some(Rule::Merge(i, j, merged)));
                }
            }
        }
        for i in 0..n {
            let ls = self.sls.sets()[i].clone();
            for o in ls.offsets() {
                if !vec_le(o, ls.shift()) {
                    continue;
                }
                let mut cand = ls.clone();
                cand.set_shift(vec_sub(ls.shift(), o));
                if self.holds_on(&cand)? {
                    return Ok(Some(Rule::ShiftDown(i, cand.shift().to_vec())));
                }
            }
        }
        for i in 0..n {
            let ls = self.sls.sets()[i].clone();
            for o1 in ls.offsets() {
                for o2 in ls.offsets() {
                    if o1 == o2 || !vec_le(o2, o1) {
                        continue;
                    }
                    let to = vec_sub(o1, o2);
                    let mut cand = ls.clone();
                    cand.remove_offset(o1);
                    cand.add_offset(to.clone());
                    if self.holds_on(&cand)? {
                        return Ok(Some(Rule::OffsetDown(i, o1.clone(), to)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Whether every vector of `ls` is the output projection of some step
    /// vector satisfying the target.
    fn holds_on(&mut self, ls: &LinearSet) -> Result<bool> {
        let lambdas: Vec<Formula> = ls
            .offsets()
            .iter()
            .map(|_| mk_var(&self.names.fresh_var("rule", Domain::Nat)))
            .collect();
        let gens: Vec<&[i64]> = ls.offsets().iter().map(|o| o.as_slice()).collect();
        let point = combination(ls.shift(), &gens, &lambdas);
        let inst = self.target.substitute_vars(&self.step[..self.dim], &point);
        let projected = mk_exists(&self.step[self.dim..], &inst);
        Ok(self.smt.is_valid(&projected)?.unwrap_or(false))
    }

    #[cfg(test)]
    pub(crate) fn push_linear_set(&mut self, ls: LinearSet) {
        self.sls.push(ls);
        self.state = AugmentState::Augmenting;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmtConfig,
        formula::{mk_add, mk_and, mk_eq, mk_ge, mk_int, mk_ints, mk_le},
        solver::{Interrupt, SatResult},
    };

    fn smt() -> Smt {
        Smt::new(SmtConfig::default(), Interrupt::new())
    }

    fn covered(smt: &Smt, names: &mut NameGen, sls: &SemiLinearSet, v: i64) -> bool {
        let f = sls.member_formula(&mk_ints(&[v]), names);
        matches!(smt.check_sat(&f).unwrap(), SatResult::Sat(_))
    }

    #[test]
    fn saturation_never_shrinks_coverage() {
        let smt = smt();
        let mut names = NameGen::new();
        let mut outer = NameGen::new();
        let w = Var::int("w");
        let target = mk_ge(&mk_var(&w), &mk_int(0));
        let cfg = SlsConfig::default();
        let mut aug = SlsAugmenter::new(&smt, &mut names, &cfg, 1, &[w], &target);
        aug.push_linear_set(LinearSet::new(vec![3]));
        aug.push_linear_set(LinearSet::new(vec![5]));
        let before: Vec<bool> = (0..8).map(|v| covered(&smt, &mut outer, aug.sls(), v)).collect();
        aug.saturate().unwrap();
        assert_eq!(aug.sls().sets(), &[LinearSet::with_offsets(vec![1], [vec![2]])]);
        for (v, b) in before.iter().enumerate() {
            if *b {
                assert!(covered(&smt, &mut outer, aug.sls(), v as i64), "{v} lost");
            }
        }
        let stat = &aug.statistic;
        assert_eq!((stat.num_merge, stat.num_shift_down), (1, 1));
    }

    #[test]
    fn counter_step_saturates_to_naturals() {
        let smt = smt();
        let mut names = NameGen::new();
        let w1 = Var::int("w1");
        let w2 = Var::int("w2");
        let target = mk_and([
            mk_eq(&mk_var(&w2), &mk_add([mk_var(&w1), mk_int(1)])),
            mk_ge(&mk_var(&w1), &mk_int(0)),
        ]);
        let cfg = SlsConfig::default();
        let mut aug = SlsAugmenter::new(&smt, &mut names, &cfg, 1, &[w1, w2], &target);
        assert_eq!(aug.state(), AugmentState::Empty);
        let sls = aug.run().unwrap().clone();
        assert_eq!(aug.state(), AugmentState::Saturated);
        // the star of the single generator (1) is (0) + {(1)}
        assert_eq!(sls.sets(), &[LinearSet::new(vec![1])]);
        assert!(covered(&smt, &mut NameGen::new(), &sls, 4));
        assert!(!covered(&smt, &mut NameGen::new(), &sls, -1));
    }

    #[test]
    fn unbounded_growth_hits_limit() {
        let smt = smt();
        let mut names = NameGen::new();
        let w = Var::int("w");
        let v = Var::int("v");
        // three isolated points need more than one round
        let target = mk_and([
            mk_eq(&mk_var(&w), &mk_int(2)),
            mk_le(&mk_int(0), &mk_var(&v)),
            mk_le(&mk_var(&v), &mk_var(&w)),
        ]);
        let cfg = SlsConfig {
            augment_limit: 1,
            ..Default::default()
        };
        let mut aug = SlsAugmenter::new(&smt, &mut names, &cfg, 2, &[w, v], &target);
        let res = aug.run();
        assert!(matches!(res, Err(Error::SlsUndecidable(_))));
        assert_eq!(aug.state(), AugmentState::Unknown);
    }

    fn two_points(smt: &Smt, names: &mut NameGen, cfg: &SlsConfig) -> SlsAugmenter<'_> {
        let w = Var::int("w");
        let target = mk_ge(&mk_var(&w), &mk_int(0));
        let mut aug = SlsAugmenter::new(smt, names, cfg, 1, &[w], &target);
        aug.push_linear_set(LinearSet::new(vec![3]));
        aug.push_linear_set(LinearSet::new(vec![5]));
        aug
    }

    #[test]
    fn offset_bound_stops_saturation() {
        let smt = smt();
        let mut names = NameGen::new();
        let cfg = SlsConfig {
            linear_set_factor: 0,
            ..Default::default()
        };
        let mut aug = two_points(&smt, &mut names, &cfg);
        assert!(matches!(aug.saturate(), Err(Error::SlsUndecidable(_))));
        assert_eq!(aug.state(), AugmentState::Unknown);
        assert!(matches!(aug.augment(), Err(Error::SlsUndecidable(_))));
    }

    #[test]
    fn saturate_limit_stops_saturation() {
        let smt = smt();
        let mut names = NameGen::new();
        let cfg = SlsConfig {
            saturate_limit: 0,
            ..Default::default()
        };
        let mut aug = two_points(&smt, &mut names, &cfg);
        assert!(matches!(aug.saturate(), Err(Error::SlsUndecidable(_))));
        assert_eq!(aug.state(), AugmentState::Unknown);
        assert_eq!(aug.statistic.num_saturate_step(), 0);
    }
}
