mod approx;

use crate::{
    config::{SlsConfig, StarConfig},
    error::Result,
    formula::{
        Domain, Formula, Kind, NameGen, Var, mk_add, mk_and, mk_eq, mk_false, mk_implies, mk_int,
        mk_le, mk_not, mk_or, mk_true, mk_var, mk_vars,
    },
    sls::SlsAugmenter,
    solver::Smt,
    statistic::StarStatistic,
};
use log::{debug, info, trace};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

/// One `Iterate` occurrence split for elimination: `outer ∧ (out, _) ∈
/// {step | unstarred ∧ starred}*`.
#[derive(Clone, Debug)]
pub struct StarProblem {
    pub outer: Formula,
    pub out_vars: Vec<Var>,
    pub step_vars: Vec<Var>,
    pub unstarred: Formula,
    pub starred: Option<Formula>,
}

impl StarProblem {
    pub fn new(
        outer: &Formula,
        out_vars: &[Var],
        step_vars: &[Var],
        unstarred: &Formula,
        starred: Option<&Formula>,
    ) -> Self {
        assert!(
            out_vars.len() <= step_vars.len(),
            "iterate has more outputs than step variables"
        );
        Self {
            outer: outer.clone(),
            out_vars: out_vars.to_vec(),
            step_vars: step_vars.to_vec(),
            unstarred: unstarred.clone(),
            starred: starred.cloned(),
        }
    }

    /// Splits the body of an `Iterate` node into its star tagged and plain
    /// conjuncts.
    pub fn from_iterate(outer: &Formula, iterate: &Formula) -> Self {
        let Kind::Iterate(out, step, body) = iterate.kind() else {
            panic!("not an iterate node: {iterate}");
        };
        let (starred, unstarred): (Vec<Formula>, Vec<Formula>) = body
            .decompose_conjunction()
            .into_iter()
            .partition(|c| c.in_star());
        let starred = (!starred.is_empty()).then(|| mk_and(starred));
        Self::new(outer, out, step, &mk_and(unstarred), starred.as_ref())
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.out_vars.len()
    }

    pub fn body(&self) -> Formula {
        match &self.starred {
            Some(s) => mk_and([self.unstarred.clone(), s.clone()]),
            None => self.unstarred.clone(),
        }
    }

    /// Output coordinates of the step vector.
    #[inline]
    pub fn step_out(&self) -> &[Var] {
        &self.step_vars[..self.dim()]
    }
}

impl fmt::Display for StarProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let iterate = Formula::make(
            Kind::Iterate(self.out_vars.clone(), self.step_vars.clone(), self.body()),
            false,
        );
        write!(f, "{} with {iterate}", self.outer)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Elimination {
    /// `outer ∧ iterate` is unsatisfiable.
    Contradiction,
    /// Equivalent to the iterate node.
    Exact,
    /// Implied by the iterate node.
    Approx,
}

#[derive(Clone, Debug)]
pub struct Transformed {
    pub formula: Formula,
    pub kind: Elimination,
}

impl Transformed {
    fn new(formula: Formula, kind: Elimination) -> Self {
        Self { formula, kind }
    }
}

/// Rewrites one LIA* iteration into plain LIA.
pub struct StarTransformer<'a> {
    cfg: StarConfig,
    sls_cfg: SlsConfig,
    smt: &'a Smt,
    names: &'a mut NameGen,
    pub statistic: StarStatistic,
}

impl<'a> StarTransformer<'a> {
    pub fn new(cfg: &StarConfig, sls_cfg: &SlsConfig, smt: &'a Smt, names: &'a mut NameGen) -> Self {
        Self {
            cfg: cfg.clone(),
            sls_cfg: sls_cfg.clone(),
            smt,
            names,
            statistic: StarStatistic::default(),
        }
    }

    /// Proven valid. Unknown answers and recoverable failures count as not
    /// proven; interruption is propagated.
    fn proves(&self, f: &Formula) -> Result<bool> {
        match self.smt.is_valid(f) {
            Ok(v) => Ok(v.unwrap_or(false)),
            Err(e) if e.is_recoverable() => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub fn transform(&mut self, problem: &StarProblem) -> Result<Transformed> {
        self.statistic.num_transform += 1;
        if problem.dim() == 0 {
            return Ok(Transformed::new(mk_true(), Elimination::Exact));
        }
        let p = self.normalize(problem);
        trace!("star problem: {p}");
        if !self.cfg.no_fast_path && self.contradiction(&p)? {
            info!("star eliminated by contradiction");
            self.statistic.num_fast_path += 1;
            return Ok(Transformed::new(mk_false(), Elimination::Contradiction));
        }
        let step_names: BTreeSet<String> = p.step_vars.iter().map(|v| v.name().to_string()).collect();
        let closed = p.body().collect_var_names().is_subset(&step_names);
        let exact = if p.starred.is_some() && closed {
            match self.exact(&p) {
                Ok(f) => Some(f),
                Err(e) if e.is_recoverable() => {
                    debug!("exact star elimination failed: {e}");
                    None
                }
                Err(e) => return Err(e),
            }
        } else {
            None
        };
        let (mut formula, mut kind) = match exact {
            Some(f) => {
                self.statistic.num_exact += 1;
                (f, Elimination::Exact)
            }
            None => {
                self.statistic.num_approx += 1;
                (self.approximate(&p)?, Elimination::Approx)
            }
        };
        if !self.cfg.no_outer_check && !p.outer.is_true() && !formula.is_false() {
            let check = mk_and([p.outer.clone(), formula.clone()]);
            let refuted = match self.smt.is_unsat(&check) {
                Ok(r) => r.unwrap_or(false),
                Err(e) if e.is_recoverable() => false,
                Err(e) => return Err(e),
            };
            if refuted {
                debug!("eliminated star contradicts its outer constraint");
                self.statistic.num_outer_refuted += 1;
                formula = mk_false();
                kind = Elimination::Contradiction;
            }
        }
        info!("star eliminated ({kind:?})");
        Ok(Transformed::new(formula, kind))
    }

    /// Natural variables become integers with explicit guards, and step
    /// variables are renamed apart from the free variables of `outer`.
    fn normalize(&mut self, p: &StarProblem) -> StarProblem {
        let to_int = |f: &Formula| -> (Formula, Vec<Formula>) {
            let mut map = BTreeMap::new();
            let mut guards = Vec::new();
            for v in f.free_vars().values().filter(|v| v.is_nat()) {
                let iv = v.with_domain(Domain::Int);
                guards.push(mk_le(&mk_int(0), &mk_var(&iv)));
                map.insert(v.name().to_string(), mk_var(&iv));
            }
            (f.substitute(&map), guards)
        };
        let (outer, mut outer_guards) = to_int(&p.outer);
        let out_vars: Vec<Var> = p.out_vars.iter().map(|v| v.with_domain(Domain::Int)).collect();
        for (v, iv) in p.out_vars.iter().zip(out_vars.iter()) {
            if v.is_nat() {
                outer_guards.push(mk_le(&mk_int(0), &mk_var(iv)));
            }
        }
        let outer = mk_and(std::iter::once(outer).chain(outer_guards));

        let taken = outer.collect_var_names();
        let mut map = BTreeMap::new();
        let mut step_vars = Vec::new();
        let mut body_guards = Vec::new();
        for v in p.step_vars.iter() {
            let nv = if taken.contains(v.name()) || p.out_vars.iter().any(|o| o.name() == v.name()) {
                self.names.fresh_var(v.name(), Domain::Int)
            } else {
                v.with_domain(Domain::Int)
            };
            map.insert(v.name().to_string(), mk_var(&nv));
            if v.is_nat() {
                body_guards.push(mk_le(&mk_int(0), &mk_var(&nv)));
            }
            step_vars.push(nv);
        }
        let rename = |f: &Formula| {
            let (f, guards) = to_int(&f.substitute(&map));
            mk_and(std::iter::once(f).chain(guards))
        };
        let unstarred = mk_and(std::iter::once(rename(&p.unstarred)).chain(body_guards));
        let starred = p.starred.as_ref().map(rename);
        StarProblem {
            outer,
            out_vars,
            step_vars,
            unstarred,
            starred,
        }
    }

    /// Sufficient conditions for `outer ∧ iterate` being unsatisfiable:
    /// `outer` rejects zero, every single step, and is closed under
    /// splitting a sum.
    fn contradiction(&mut self, p: &StarProblem) -> Result<bool> {
        let g = &p.outer;
        if g.is_true() {
            return Ok(false);
        }
        let zero = vec![mk_int(0); p.dim()];
        if !self.proves(&mk_not(&g.substitute_vars(&p.out_vars, &zero)))? {
            return Ok(false);
        }
        let at_step = g.substitute_vars(&p.out_vars, &mk_vars(p.step_out()));
        if !self.proves(&mk_implies(&p.body(), &mk_not(&at_step)))? {
            return Ok(false);
        }
        let out_names: BTreeSet<&str> = p.out_vars.iter().map(|v| v.name()).collect();
        let copy = |names: &mut NameGen, at: &[Formula]| {
            let mut map: BTreeMap<String, Formula> = g
                .free_vars()
                .values()
                .filter(|v| !out_names.contains(v.name()))
                .map(|v| (v.name().to_string(), mk_var(&names.fresh_var(v.name(), v.domain()))))
                .collect();
            for (v, t) in p.out_vars.iter().zip(at.iter()) {
                map.insert(v.name().to_string(), t.clone());
            }
            g.substitute(&map)
        };
        let x: Vec<Formula> = (0..p.dim())
            .map(|_| mk_var(&self.names.fresh_var("x", Domain::Int)))
            .collect();
        let y: Vec<Formula> = (0..p.dim())
            .map(|_| mk_var(&self.names.fresh_var("y", Domain::Int)))
            .collect();
        let xy: Vec<Formula> = x
            .iter()
            .zip(y.iter())
            .map(|(a, b)| mk_add([a.clone(), b.clone()]))
            .collect();
        let gx = copy(&mut *self.names, &x);
        let gy = copy(&mut *self.names, &y);
        let gxy = copy(&mut *self.names, &xy);
        self.proves(&mk_or([gx, gy, mk_not(&gxy)]))
    }

    fn exact(&mut self, p: &StarProblem) -> Result<Formula> {
        let mut aug = SlsAugmenter::new(
            self.smt,
            self.names,
            &self.sls_cfg,
            p.dim(),
            &p.step_vars,
            &p.body(),
        );
        let res = aug.run().map(|_| ());
        self.statistic += &aug.statistic;
        let sls = aug.into_sls();
        res?;
        let (f, _) = sls.star_formula(&mk_vars(&p.out_vars), self.names);
        debug!("exact elimination via {sls}");
        Ok(f)
    }
}
