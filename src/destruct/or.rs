use super::Destructor;
use crate::{
    error::Result,
    formula::{Formula, Scope, mk_and},
};
use log::trace;
use std::collections::BTreeSet;

/// Expands parameter dependent disjunctions that share a variable with the
/// parameter free part into one case per disjunct.
#[derive(Default)]
pub struct OrDestructor;

impl OrDestructor {
    pub fn new() -> Self {
        Self
    }
}

impl Destructor for OrDestructor {
    fn destruct(&mut self, f: &Formula, scope: &Scope) -> Result<Vec<Formula>> {
        if f.is_separable(scope) {
            return Ok(vec![f.clone()]);
        }
        let lits = f.decompose_conjunction();
        let dependent = |l: &Formula| !l.in_star() && l.mentions_any(&scope.params);
        let free: BTreeSet<String> = lits
            .iter()
            .filter(|l| !dependent(*l))
            .flat_map(|l| l.collect_var_names())
            .filter(|v| !scope.is_important(v))
            .collect();
        let mut choices: Vec<Vec<Formula>> = Vec::with_capacity(lits.len());
        for l in lits {
            if dependent(&l) && l.mentions_any(&free) {
                let clauses = l.decompose_dnf();
                if clauses.len() > 1 {
                    trace!("expanding {l} into {} clauses", clauses.len());
                    choices.push(clauses.into_iter().map(mk_and).collect());
                    continue;
                }
            }
            choices.push(vec![l]);
        }
        let mut cases: Vec<Vec<Formula>> = vec![Vec::new()];
        for choice in choices {
            let mut next = Vec::with_capacity(cases.len() * choice.len());
            for case in cases.iter() {
                for c in choice.iter() {
                    let mut case = case.clone();
                    case.push(c.clone());
                    next.push(case);
                }
            }
            cases = next;
        }
        Ok(cases
            .into_iter()
            .map(mk_and)
            .filter(|c| !c.is_false())
            .collect())
    }
}
