use super::{StarProblem, StarTransformer};
use crate::{
    error::Result,
    formula::{Formula, mk_and, mk_eq, mk_implies, mk_int, mk_le, mk_var, mk_vars},
    sls::SlsAugmenter,
};
use log::debug;
use std::collections::BTreeSet;

impl StarTransformer<'_> {
    /// Conjunction of facts every finite sum of steps inherits from a single
    /// step, each proven separately. Unproven facts are omitted.
    pub(super) fn approximate(&mut self, p: &StarProblem) -> Result<Formula> {
        let body = p.body();
        let w = mk_vars(p.step_out());
        let v = mk_vars(&p.out_vars);
        let zero = mk_int(0);
        let mut facts = Vec::new();

        let mut nonneg = vec![false; p.dim()];
        for i in 0..p.dim() {
            if self.proves(&mk_implies(&body, &mk_le(&zero, &w[i])))? {
                nonneg[i] = true;
                facts.push(mk_le(&zero, &v[i]));
            }
        }
        for i in 0..p.dim() {
            for j in i + 1..p.dim() {
                if self.proves(&mk_implies(&body, &mk_eq(&w[i], &w[j])))? {
                    facts.push(mk_eq(&v[i], &v[j]));
                }
            }
        }
        let mut zero_out = vec![false; p.dim()];
        for i in 0..p.dim() {
            if self.proves(&mk_implies(&body, &mk_eq(&w[i], &zero)))? {
                zero_out[i] = true;
                facts.push(mk_eq(&v[i], &zero));
            }
        }
        // a zero total of a non-negative coordinate forces every step's
        // coordinate to zero
        for i in (0..p.dim()).filter(|i| nonneg[*i] && !zero_out[*i]) {
            for j in (0..p.dim()).filter(|j| *j != i && !zero_out[*j]) {
                let step = mk_and([body.clone(), mk_eq(&w[i], &zero)]);
                if self.proves(&mk_implies(&step, &mk_eq(&w[j], &zero)))? {
                    facts.push(mk_implies(&mk_eq(&v[i], &zero), &mk_eq(&v[j], &zero)));
                }
            }
        }
        debug!("over-approximation keeps {} facts", facts.len());

        if !self.cfg.no_approx_sls
            && let Some(reduced) = reduce(p)
        {
            let mut aug = SlsAugmenter::new(
                self.smt,
                self.names,
                &self.sls_cfg,
                p.dim(),
                &p.step_vars,
                &reduced,
            );
            let res = aug.run().map(|_| ());
            self.statistic += &aug.statistic;
            let sls = aug.into_sls();
            match res {
                Ok(()) => {
                    debug!("over-approximation adds {sls}");
                    let (f, _) = sls.star_formula(&v, self.names);
                    facts.push(f);
                }
                Err(e) if e.is_recoverable() => debug!("reduced sls failed: {e}"),
                Err(e) => return Err(e),
            }
        }
        Ok(mk_and(facts))
    }
}

/// Body conjuncts over step variables only that are connected to an output
/// coordinate. Dropping the others only weakens the step relation.
fn reduce(p: &StarProblem) -> Option<Formula> {
    let step: BTreeSet<String> = p.step_vars.iter().map(|v| v.name().to_string()).collect();
    let mut pending: Vec<(Formula, BTreeSet<String>)> = p
        .body()
        .decompose_conjunction()
        .into_iter()
        .map(|c| {
            let vars = c.collect_var_names();
            (c, vars)
        })
        .filter(|(_, vars)| vars.is_subset(&step))
        .collect();
    let mut reach: BTreeSet<String> = p.step_out().iter().map(|v| v.name().to_string()).collect();
    let mut kept = Vec::new();
    loop {
        let (hit, rest): (Vec<_>, Vec<_>) = pending
            .into_iter()
            .partition(|(_, vars)| !vars.is_disjoint(&reach));
        pending = rest;
        if hit.is_empty() {
            break;
        }
        for (c, vars) in hit {
            reach.extend(vars);
            kept.push(c);
        }
    }
    if kept.is_empty() {
        None
    } else {
        Some(mk_and(kept))
    }
}
