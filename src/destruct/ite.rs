use super::Destructor;
use crate::{
    error::Result,
    formula::{
        Domain, Formula, Kind, NameGen, Scope, Sort, Var, mk_and, mk_implies, mk_ite, mk_not,
        mk_or, mk_var,
    },
    solver::Smt,
};
use log::trace;
use std::{collections::BTreeMap, rc::Rc};

/// Both cases of one placeholder:
/// `e = ite(p ∧ q, a, b)  ⇔  (q ∧ e = ite(p, a, b)) ∨ (¬q ∧ e = b)`.
struct Split {
    var: Var,
    cases: [(Formula, Formula); 2],
}

struct Branch {
    splits: Rc<[Split]>,
    idx: usize,
    env: Formula,
    conds: Vec<Formula>,
}

enum Work {
    Round(Formula),
    Branch(Branch),
}

/// Splits integer `ite` terms whose condition depends on a parameter.
pub struct IteDestructor<'a> {
    smt: &'a Smt,
    names: &'a mut NameGen,
}

impl<'a> IteDestructor<'a> {
    pub fn new(smt: &'a Smt, names: &'a mut NameGen) -> Self {
        Self { smt, names }
    }

    /// Lazily enumerates the cases depth first.
    pub fn branches<'b>(&'b mut self, f: &Formula, scope: &'b Scope) -> IteBranches<'b> {
        IteBranches {
            smt: self.smt,
            names: &mut *self.names,
            scope,
            stack: vec![Work::Round(f.clone())],
        }
    }
}

impl Destructor for IteDestructor<'_> {
    fn destruct(&mut self, f: &Formula, scope: &Scope) -> Result<Vec<Formula>> {
        self.branches(f, scope).collect()
    }
}

pub struct IteBranches<'b> {
    smt: &'b Smt,
    names: &'b mut NameGen,
    scope: &'b Scope,
    stack: Vec<Work>,
}

impl IteBranches<'_> {
    /// Replaces parameter dependent `ite` terms by placeholders. The
    /// dependency closure grows through the condition literals of the
    /// replaced terms until it is stable.
    fn round(&mut self, f: Formula) -> Option<Formula> {
        let mut closure = self.scope.params.clone();
        let mut records: Vec<(Var, Formula, Formula, Formula)> = Vec::new();
        let mut env = f.clone();
        loop {
            let names = &mut *self.names;
            env = env.transform_pre_order(&mut |n: &Formula| {
                if n.in_star() || n.is_iterate() {
                    return Some(n.clone());
                }
                let Kind::Ite(c, a, b) = n.kind() else {
                    return None;
                };
                if !c.mentions_any(&closure) {
                    return None;
                }
                if n.sort() == Sort::Bool {
                    return Some(mk_or([
                        mk_and([c.clone(), a.clone()]),
                        mk_and([mk_not(c), b.clone()]),
                    ]));
                }
                let var = names.fresh_var("ite", Domain::Int);
                records.push((var.clone(), c.clone(), a.clone(), b.clone()));
                Some(mk_var(&var))
            });
            let before = closure.len();
            loop {
                let n = closure.len();
                for (_, c, _, _) in records.iter() {
                    for lit in c.decompose_conjunction() {
                        if lit.mentions_any(&closure) {
                            let vars = lit.collect_var_names();
                            closure.extend(vars.into_iter().filter(|v| !self.scope.is_important(v)));
                        }
                    }
                }
                if closure.len() == n {
                    break;
                }
            }
            if closure.len() == before {
                break;
            }
        }
        if records.is_empty() {
            if env == f {
                return Some(env);
            }
            self.stack.push(Work::Round(env));
            return None;
        }
        let splits: Vec<Split> = records
            .into_iter()
            .map(|(var, c, a, b)| {
                let (q, p): (Vec<Formula>, Vec<Formula>) = c
                    .decompose_conjunction()
                    .into_iter()
                    .partition(|l| l.mentions_any(&closure));
                let q = mk_and(q);
                let then = if p.is_empty() { a } else { mk_ite(&mk_and(p), &a, &b) };
                Split {
                    var,
                    cases: [(q.clone(), then), (mk_not(&q), b)],
                }
            })
            .collect();
        trace!("ite round with {} placeholders", splits.len());
        self.stack.push(Work::Branch(Branch {
            splits: splits.into(),
            idx: 0,
            env,
            conds: Vec::new(),
        }));
        None
    }

    fn branch(&mut self, b: Branch) -> Result<()> {
        if b.idx == b.splits.len() {
            let leaf = mk_and(b.conds.into_iter().chain([b.env]));
            self.stack.push(Work::Round(leaf));
            return Ok(());
        }
        let split = &b.splits[b.idx];
        let mut children = Vec::with_capacity(2);
        for (cond, val) in split.cases.iter() {
            let map = BTreeMap::from([(split.var.name().to_string(), val.clone())]);
            let env = b.env.substitute(&map);
            let mut conds = b.conds.clone();
            if cond.is_opaque() {
                conds.push(cond.clone());
            } else {
                let known = mk_and(
                    env.decompose_conjunction()
                        .into_iter()
                        .filter(|c| !c.is_opaque())
                        .chain(b.conds.iter().filter(|c| !c.is_opaque()).cloned()),
                );
                if self.smt.is_valid(&mk_implies(&known, &mk_not(cond)))? == Some(true) {
                    trace!("impossible case {cond}");
                    continue;
                }
                if self.smt.is_valid(&mk_implies(&known, cond))? != Some(true) {
                    conds.push(cond.clone());
                }
            }
            children.push(Branch {
                splits: b.splits.clone(),
                idx: b.idx + 1,
                env,
                conds,
            });
        }
        self.stack.extend(children.into_iter().rev().map(Work::Branch));
        Ok(())
    }
}

impl Iterator for IteBranches<'_> {
    type Item = Result<Formula>;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(work) = self.stack.pop() {
            match work {
                Work::Round(f) => {
                    if let Some(f) = self.round(f) {
                        return Some(Ok(f));
                    }
                }
                Work::Branch(b) => {
                    if let Err(e) = self.branch(b) {
                        self.stack.clear();
                        return Some(Err(e));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmtConfig,
        formula::{mk_eq, mk_int, mk_le, mk_lt},
        solver::Interrupt,
    };
    use std::collections::BTreeSet;

    fn v(n: &str) -> Formula {
        mk_var(&Var::int(n))
    }

    fn smt() -> Smt {
        Smt::new(SmtConfig::default(), Interrupt::new())
    }

    /// No `ite` outside iteration bodies has a condition over `names`.
    fn no_dependent_ite(f: &Formula, names: &BTreeSet<String>) -> bool {
        if f.in_star() || f.is_iterate() {
            return true;
        }
        if let Kind::Ite(c, ..) = f.kind()
            && c.mentions_any(names)
        {
            return false;
        }
        f.children().into_iter().all(|c| no_dependent_ite(c, names))
    }

    #[test]
    fn mixed_condition_splits_in_two() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        let p = mk_le(&v("x"), &mk_int(3));
        let q = mk_le(&v("k"), &mk_int(2));
        let f = mk_eq(&v("e"), &mk_ite(&mk_and([p.clone(), q.clone()]), &v("a"), &v("b")));
        let cases = IteDestructor::new(&smt, &mut names).destruct(&f, &scope).unwrap();
        assert_eq!(
            cases,
            vec![
                mk_and([q.clone(), mk_eq(&v("e"), &mk_ite(&p, &v("a"), &v("b")))]),
                mk_and([mk_not(&q), mk_eq(&v("e"), &v("b"))]),
            ]
        );
        for c in cases.iter() {
            assert!(no_dependent_ite(c, &scope.params));
        }
    }

    #[test]
    fn closure_pulls_shared_literals() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        // x ≤ 3 shares x with the parameter literal, so both move to the split
        let cond = mk_and([mk_le(&v("x"), &mk_int(3)), mk_le(&v("k"), &v("x"))]);
        let f = mk_eq(&v("e"), &mk_ite(&cond, &v("a"), &v("b")));
        let cases = IteDestructor::new(&smt, &mut names).destruct(&f, &scope).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0], mk_and([cond.clone(), mk_eq(&v("e"), &v("a"))]));
        assert!(cases.iter().all(|c| !c.contains_ite()));
    }

    #[test]
    fn important_variables_stop_the_closure() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], ["x"]);
        let p = mk_le(&v("x"), &mk_int(3));
        let cond = mk_and([p.clone(), mk_le(&v("k"), &v("x"))]);
        let f = mk_eq(&v("e"), &mk_ite(&cond, &v("a"), &v("b")));
        let cases = IteDestructor::new(&smt, &mut names).destruct(&f, &scope).unwrap();
        assert_eq!(cases[0], mk_and([mk_le(&v("k"), &v("x")), mk_eq(&v("e"), &mk_ite(&p, &v("a"), &v("b")))]));
    }

    #[test]
    fn impossible_and_duplicate_cases_are_pruned() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        let q = mk_lt(&v("k"), &mk_int(0));
        // k = 5 rules out k < 0
        let f = mk_and([
            mk_eq(&v("k"), &mk_int(5)),
            mk_eq(&v("e"), &mk_ite(&q, &v("a"), &v("b"))),
        ]);
        let cases = IteDestructor::new(&smt, &mut names).destruct(&f, &scope).unwrap();
        assert_eq!(
            cases,
            vec![mk_and([mk_eq(&v("k"), &mk_int(5)), mk_eq(&v("e"), &v("b"))])]
        );
    }

    #[test]
    fn nested_ites_are_split_in_later_rounds() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        let inner = mk_ite(&mk_le(&v("k"), &mk_int(1)), &mk_int(1), &mk_int(2));
        let outer = mk_ite(&mk_le(&v("k"), &mk_int(5)), &inner, &mk_int(3));
        let f = mk_eq(&v("e"), &outer);
        let cases: Vec<Formula> = IteDestructor::new(&smt, &mut names)
            .branches(&f, &scope)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(cases.len(), 3);
        assert!(cases.iter().all(|c| !c.contains_ite()));
    }

    #[test]
    fn branches_are_lazy() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        let f = mk_and((0..6).map(|i| {
            let e = v(&format!("e{i}"));
            mk_eq(&e, &mk_ite(&mk_le(&v("k"), &mk_int(i)), &mk_int(0), &mk_int(1)))
        }));
        let mut d = IteDestructor::new(&smt, &mut names);
        let mut it = d.branches(&f, &scope);
        let first = it.next().unwrap().unwrap();
        assert!(!first.contains_ite());
        let queried = smt.statistic().num_valid_query;
        // k ≤ 0, 0 < k ≤ 1, ..., k > 5
        assert_eq!(it.count(), 6);
        assert!(smt.statistic().num_valid_query > queried);
    }

    #[test]
    fn star_subterms_stay_untouched() {
        let smt = smt();
        let mut names = NameGen::new();
        let scope = Scope::new(["k"], Vec::<String>::new());
        let star = mk_eq(&v("e"), &mk_ite(&mk_le(&v("k"), &mk_int(0)), &v("a"), &v("b"))).mark_star();
        let cases = IteDestructor::new(&smt, &mut names).destruct(&star, &scope).unwrap();
        assert_eq!(cases, vec![star]);
    }
}
