mod ite;
mod or;

pub use ite::{IteBranches, IteDestructor};
pub use or::OrDestructor;

use crate::{
    error::Result,
    formula::{Formula, NameGen, Scope},
    solver::Smt,
};
use log::debug;

/// Splits a formula into disjoint cases whose disjunction is equivalent to it.
pub trait Destructor {
    fn destruct(&mut self, f: &Formula, scope: &Scope) -> Result<Vec<Formula>>;
}

/// Ite destruction followed by disjunction destruction of every case.
pub fn destruct(f: &Formula, scope: &Scope, smt: &Smt, names: &mut NameGen) -> Result<Vec<Formula>> {
    let cases = IteDestructor::new(smt, names).destruct(f, scope)?;
    let mut or = OrDestructor::new();
    let mut res = Vec::new();
    for c in cases.iter() {
        res.extend(or.destruct(c, scope)?);
    }
    debug!("destructed into {} cases", res.len());
    Ok(res)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmtConfig,
        formula::{Kind, Var, mk_and, mk_eq, mk_int, mk_ite, mk_le, mk_or, mk_var},
        solver::Interrupt,
    };

    fn v(n: &str) -> Formula {
        mk_var(&Var::int(n))
    }

    #[test]
    fn pipeline_splits_ite_then_or() {
        let smt = Smt::new(SmtConfig::default(), Interrupt::new());
        let mut names = NameGen::new();
        let scope = Scope::new(["p"], Vec::<String>::new());
        // y = ite(p ≤ 0, 1, 2) ∧ (p = x ∨ p = 3) ∧ x ≤ y
        let f = mk_and([
            mk_eq(&v("y"), &mk_ite(&mk_le(&v("p"), &mk_int(0)), &mk_int(1), &mk_int(2))),
            mk_or([mk_eq(&v("p"), &v("x")), mk_eq(&v("p"), &mk_int(3))]),
            mk_le(&v("x"), &v("y")),
        ]);
        let cases = destruct(&f, &scope, &smt, &mut names).unwrap();
        assert_eq!(cases.len(), 4);
        for c in cases.iter() {
            assert!(!c.contains_ite());
            let lits = c.decompose_conjunction();
            assert_eq!(lits.len(), 4, "{c}");
            assert!(!lits.iter().any(|l| matches!(l.kind(), Kind::Or(_))));
        }
    }
}
