use super::{Formula, Kind, Scope, Var, mk_and, mk_not, mk_or};
use std::collections::{BTreeMap, BTreeSet};

impl Formula {
    pub fn children(&self) -> Vec<&Formula> {
        match self.kind() {
            Kind::Int(_) | Kind::Bool(_) | Kind::Var(_) => Vec::new(),
            Kind::Add(cs) | Kind::And(cs) | Kind::Or(cs) => cs.iter().collect(),
            Kind::Scale(_, a) | Kind::Not(a) => vec![a],
            Kind::Eq(a, b) | Kind::Le(a, b) | Kind::Lt(a, b) => vec![a, b],
            Kind::Ite(c, t, e) => vec![c, t, e],
            Kind::Iterate(_, _, b) | Kind::Exists(_, b) | Kind::Forall(_, b) => vec![b],
        }
    }

    /// Rebuilds this node with `f` applied to every child. The node is
    /// returned as is when no child changed.
    pub fn map_children(&self, mut f: impl FnMut(&Formula) -> Formula) -> Formula {
        let mut changed = false;
        let mut g = |c: &Formula| {
            let n = f(c);
            changed |= !n.ptr_eq(c);
            n
        };
        let kind = match self.kind() {
            Kind::Int(_) | Kind::Bool(_) | Kind::Var(_) => return self.clone(),
            Kind::Add(cs) => Kind::Add(cs.iter().map(&mut g).collect()),
            Kind::And(cs) => Kind::And(cs.iter().map(&mut g).collect()),
            Kind::Or(cs) => Kind::Or(cs.iter().map(&mut g).collect()),
            Kind::Scale(k, a) => Kind::Scale(*k, g(a)),
            Kind::Not(a) => Kind::Not(g(a)),
            Kind::Eq(a, b) => Kind::Eq(g(a), g(b)),
            Kind::Le(a, b) => Kind::Le(g(a), g(b)),
            Kind::Lt(a, b) => Kind::Lt(g(a), g(b)),
            Kind::Ite(c, t, e) => Kind::Ite(g(c), g(t), g(e)),
            Kind::Iterate(o, s, b) => Kind::Iterate(o.clone(), s.clone(), g(b)),
            Kind::Exists(vs, b) => Kind::Exists(vs.clone(), g(b)),
            Kind::Forall(vs, b) => Kind::Forall(vs.clone(), g(b)),
        };
        if changed {
            Formula::make(kind, self.in_star())
        } else {
            self.clone()
        }
    }

    /// Top-down rewrite. A node replaced by `f` is not visited again.
    pub fn transform_pre_order(&self, f: &mut impl FnMut(&Formula) -> Option<Formula>) -> Formula {
        if let Some(n) = f(self) {
            return n;
        }
        self.map_children(|c| c.transform_pre_order(&mut *f))
    }

    /// Bottom-up rewrite. `f` sees each node after its children were rewritten.
    pub fn transform_post_order(&self, f: &mut impl FnMut(&Formula) -> Option<Formula>) -> Formula {
        let n = self.map_children(|c| c.transform_post_order(&mut *f));
        f(&n).unwrap_or(n)
    }

    pub fn deep_copy(&self) -> Formula {
        let kind = match self.kind() {
            Kind::Add(cs) => Kind::Add(cs.iter().map(|c| c.deep_copy()).collect()),
            Kind::And(cs) => Kind::And(cs.iter().map(|c| c.deep_copy()).collect()),
            Kind::Or(cs) => Kind::Or(cs.iter().map(|c| c.deep_copy()).collect()),
            Kind::Scale(k, a) => Kind::Scale(*k, a.deep_copy()),
            Kind::Not(a) => Kind::Not(a.deep_copy()),
            Kind::Eq(a, b) => Kind::Eq(a.deep_copy(), b.deep_copy()),
            Kind::Le(a, b) => Kind::Le(a.deep_copy(), b.deep_copy()),
            Kind::Lt(a, b) => Kind::Lt(a.deep_copy(), b.deep_copy()),
            Kind::Ite(c, t, e) => Kind::Ite(c.deep_copy(), t.deep_copy(), e.deep_copy()),
            Kind::Iterate(o, s, b) => Kind::Iterate(o.clone(), s.clone(), b.deep_copy()),
            Kind::Exists(vs, b) => Kind::Exists(vs.clone(), b.deep_copy()),
            Kind::Forall(vs, b) => Kind::Forall(vs.clone(), b.deep_copy()),
            k => k.clone(),
        };
        Formula::raw(kind, self.in_star())
    }

    /// Tags the whole subtree as originating in an iteration body.
    pub fn mark_star(&self) -> Formula {
        if self.in_star() {
            return self.clone();
        }
        let kind = match self.kind() {
            Kind::Add(cs) => Kind::Add(cs.iter().map(|c| c.mark_star()).collect()),
            Kind::And(cs) => Kind::And(cs.iter().map(|c| c.mark_star()).collect()),
            Kind::Or(cs) => Kind::Or(cs.iter().map(|c| c.mark_star()).collect()),
            Kind::Scale(k, a) => Kind::Scale(*k, a.mark_star()),
            Kind::Not(a) => Kind::Not(a.mark_star()),
            Kind::Eq(a, b) => Kind::Eq(a.mark_star(), b.mark_star()),
            Kind::Le(a, b) => Kind::Le(a.mark_star(), b.mark_star()),
            Kind::Lt(a, b) => Kind::Lt(a.mark_star(), b.mark_star()),
            Kind::Ite(c, t, e) => Kind::Ite(c.mark_star(), t.mark_star(), e.mark_star()),
            Kind::Iterate(o, s, b) => Kind::Iterate(o.clone(), s.clone(), b.mark_star()),
            Kind::Exists(vs, b) => Kind::Exists(vs.clone(), b.mark_star()),
            Kind::Forall(vs, b) => Kind::Forall(vs.clone(), b.mark_star()),
            k => k.clone(),
        };
        Formula::raw(kind, true)
    }

    fn collect_free(&self, bound: &mut Vec<String>, out: &mut BTreeMap<String, Var>) {
        match self.kind() {
            Kind::Var(v) => {
                if !bound.iter().any(|b| b == v.name()) {
                    out.entry(v.name().to_string()).or_insert_with(|| v.clone());
                }
            }
            Kind::Iterate(o, s, b) => {
                for v in o {
                    if !bound.iter().any(|b| b == v.name()) {
                        out.entry(v.name().to_string()).or_insert_with(|| v.clone());
                    }
                }
                let n = bound.len();
                bound.extend(s.iter().map(|v| v.name().to_string()));
                b.collect_free(bound, out);
                bound.truncate(n);
            }
            Kind::Exists(vs, b) | Kind::Forall(vs, b) => {
                let n = bound.len();
                bound.extend(vs.iter().map(|v| v.name().to_string()));
                b.collect_free(bound, out);
                bound.truncate(n);
            }
            _ => {
                for c in self.children() {
                    c.collect_free(bound, out);
                }
            }
        }
    }

    pub fn free_vars(&self) -> BTreeMap<String, Var> {
        let mut out = BTreeMap::new();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    pub fn collect_var_names(&self) -> BTreeSet<String> {
        self.free_vars().into_keys().collect()
    }

    pub fn mentions_any(&self, names: &BTreeSet<String>) -> bool {
        self.free_vars().keys().any(|n| names.contains(n))
    }

    pub fn contains_iterate(&self) -> bool {
        self.is_iterate() || self.children().iter().any(|c| c.contains_iterate())
    }

    pub fn contains_ite(&self) -> bool {
        self.is_ite() || self.children().iter().any(|c| c.contains_ite())
    }

    /// Truth not statically known before star elimination.
    pub fn is_opaque(&self) -> bool {
        self.in_star() || self.contains_iterate()
    }

    /// Replaces free variables. Binders that would capture a variable of a
    /// replacement are renamed first.
    pub fn substitute(&self, map: &BTreeMap<String, Formula>) -> Formula {
        if map.is_empty() {
            return self.clone();
        }
        match self.kind() {
            Kind::Var(v) => map.get(v.name()).cloned().unwrap_or_else(|| self.clone()),
            Kind::Iterate(out, step, body) => {
                let out: Vec<Var> = out
                    .iter()
                    .map(|v| match map.get(v.name()) {
                        None => v.clone(),
                        Some(r) => r
                            .as_var()
                            .cloned()
                            .expect("iterate output can only be renamed to a variable"),
                    })
                    .collect();
                let (step, body) = substitute_binder(step, body, map);
                Formula::make(Kind::Iterate(out, step, body), self.in_star())
            }
            Kind::Exists(vs, body) => {
                let (vs, body) = substitute_binder(vs, body, map);
                Formula::make(Kind::Exists(vs, body), self.in_star())
            }
            Kind::Forall(vs, body) => {
                let (vs, body) = substitute_binder(vs, body, map);
                Formula::make(Kind::Forall(vs, body), self.in_star())
            }
            _ => self.map_children(|c| c.substitute(map)),
        }
    }

    pub fn substitute_vars(&self, from: &[Var], to: &[Formula]) -> Formula {
        assert_eq!(from.len(), to.len(), "vector arity mismatch");
        let map = from
            .iter()
            .zip(to.iter())
            .map(|(v, t)| (v.name().to_string(), t.clone()))
            .collect();
        self.substitute(&map)
    }

    /// Top level conjuncts. Star conjunctions are kept whole.
    pub fn decompose_conjunction(&self) -> Vec<Formula> {
        let mut out = Vec::new();
        self.push_conjuncts(&mut out);
        out
    }

    fn push_conjuncts(&self, out: &mut Vec<Formula>) {
        match self.kind() {
            Kind::And(cs) if !self.in_star() => {
                for c in cs {
                    c.push_conjuncts(out);
                }
            }
            _ if self.is_true() => (),
            _ => out.push(self.clone()),
        }
    }

    /// Negation normal form over the boolean skeleton. Star subtrees and
    /// atoms are left untouched.
    pub fn nnf(&self) -> Formula {
        self.nnf_pol(true)
    }

    fn nnf_pol(&self, pos: bool) -> Formula {
        if self.in_star() {
            return if pos { self.clone() } else { mk_not(self) };
        }
        match self.kind() {
            Kind::And(cs) if pos => mk_and(cs.iter().map(|c| c.nnf_pol(true))),
            Kind::And(cs) => mk_or(cs.iter().map(|c| c.nnf_pol(false))),
            Kind::Or(cs) if pos => mk_or(cs.iter().map(|c| c.nnf_pol(true))),
            Kind::Or(cs) => mk_and(cs.iter().map(|c| c.nnf_pol(false))),
            Kind::Not(a) => a.nnf_pol(!pos),
            Kind::Le(a, b) if !pos => Formula::make(Kind::Lt(b.clone(), a.clone()), false),
            Kind::Lt(a, b) if !pos => Formula::make(Kind::Le(b.clone(), a.clone()), false),
            _ if pos => self.clone(),
            _ => mk_not(self),
        }
    }

    /// Disjunctive normal form as a list of clauses, each a list of literals.
    pub fn decompose_dnf(&self) -> Vec<Vec<Formula>> {
        self.nnf().dnf_clauses()
    }

    fn dnf_clauses(&self) -> Vec<Vec<Formula>> {
        if self.in_star() {
            return vec![vec![self.clone()]];
        }
        match self.kind() {
            Kind::Bool(true) => vec![vec![]],
            Kind::Bool(false) => vec![],
            Kind::Or(cs) => cs.iter().flat_map(|c| c.dnf_clauses()).collect(),
            Kind::And(cs) => {
                let mut acc: Vec<Vec<Formula>> = vec![vec![]];
                for c in cs {
                    let sub = c.dnf_clauses();
                    let mut next = Vec::with_capacity(acc.len() * sub.len());
                    for a in acc.iter() {
                        for s in sub.iter() {
                            let mut clause = a.clone();
                            clause.extend(s.iter().cloned());
                            next.push(clause);
                        }
                    }
                    acc = next;
                }
                acc
            }
            _ => vec![vec![self.clone()]],
        }
    }

    /// Parameter dependent conjuncts share no variable with parameter free
    /// conjuncts, important variables aside.
    pub fn is_separable(&self, scope: &Scope) -> bool {
        let mut dep = BTreeSet::new();
        let mut free = BTreeSet::new();
        for l in self.decompose_conjunction() {
            let vars = l.collect_var_names();
            if vars.iter().any(|v| scope.is_param(v)) {
                dep.extend(vars);
            } else {
                free.extend(vars);
            }
        }
        dep.intersection(&free).all(|v| scope.is_important(v))
    }
}

fn substitute_binder(
    bound: &[Var],
    body: &Formula,
    map: &BTreeMap<String, Formula>,
) -> (Vec<Var>, Formula) {
    let mut inner = map.clone();
    for v in bound {
        inner.remove(v.name());
    }
    if inner.is_empty() {
        return (bound.to_vec(), body.clone());
    }
    let mut taken: BTreeSet<String> = inner
        .values()
        .flat_map(|r| r.collect_var_names())
        .collect();
    taken.extend(body.collect_var_names());
    let mut vars = Vec::with_capacity(bound.len());
    for v in bound {
        let captured = inner.values().any(|r| r.collect_var_names().contains(v.name()));
        if captured {
            let mut name = format!("{}'", v.name());
            while taken.contains(&name) {
                name.push('\'');
            }
            taken.insert(name.clone());
            let nv = v.renamed(name);
            inner.insert(v.name().to_string(), super::mk_var(&nv));
            vars.push(nv);
        } else {
            vars.push(v.clone());
        }
    }
    (vars, body.substitute(&inner))
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use std::collections::BTreeSet;

    fn v(n: &str) -> Formula {
        mk_var(&Var::int(n))
    }

    #[test]
    fn pre_order_does_not_revisit_replacement() {
        let f = mk_add([v("x"), v("y")]);
        let mut visits = 0;
        let g = f.transform_pre_order(&mut |n| {
            visits += 1;
            match n.as_var() {
                Some(var) if var.name() == "x" => Some(mk_add([v("x"), mk_int(1)])),
                _ => None,
            }
        });
        assert_eq!(g, mk_add([v("x"), mk_int(1), v("y")]));
        assert_eq!(visits, 3);
    }

    #[test]
    fn post_order_sees_rewritten_children() {
        let f = mk_eq(&mk_add([v("x"), mk_int(1)]), &mk_int(3));
        let g = f.transform_post_order(&mut |n| match n.as_var() {
            Some(_) => Some(mk_int(2)),
            None => None,
        });
        assert!(g.is_true());
    }

    #[test]
    fn substitute_avoids_capture() {
        let x = Var::int("x");
        let y = Var::int("y");
        let f = mk_exists(&[x.clone()], &mk_eq(&mk_var(&x), &mk_var(&y)));
        let g = f.substitute_vars(&[y.clone()], &[mk_var(&x)]);
        let Kind::Exists(vs, body) = g.kind() else {
            panic!("expected exists");
        };
        assert_eq!(vs[0].name(), "x'");
        assert_eq!(body, &mk_eq(&v("x'"), &v("x")));
        assert_eq!(g.collect_var_names(), BTreeSet::from(["x".to_string()]));
    }

    #[test]
    fn dnf_distributes() {
        let a = mk_eq(&v("a"), &mk_int(0));
        let b = mk_eq(&v("b"), &mk_int(0));
        let c = mk_eq(&v("c"), &mk_int(0));
        let f = mk_and([mk_or([a.clone(), b.clone()]), c.clone()]);
        assert_eq!(
            f.decompose_dnf(),
            vec![vec![a.clone(), c.clone()], vec![b.clone(), c.clone()]]
        );
        let n = mk_not(&mk_and([a.clone(), mk_le(&v("x"), &mk_int(2))]));
        assert_eq!(
            n.decompose_dnf(),
            vec![vec![mk_not(&a)], vec![mk_lt(&mk_int(2), &v("x"))]]
        );
    }

    #[test]
    fn deep_copy_shares_nothing() {
        let f = mk_and([mk_le(&mk_int(0), &v("x")), mk_eq(&v("x"), &v("y"))]);
        let g = f.deep_copy();
        assert_eq!(f, g);
        assert!(!f.ptr_eq(&g));
        assert!(!f.children()[0].ptr_eq(g.children()[0]));
    }

    #[test]
    fn separability() {
        let scope = Scope::new(["p"], ["k"]);
        let sep = mk_and([mk_eq(&v("x"), &v("p")), mk_le(&v("k"), &v("y"))]);
        assert!(sep.is_separable(&scope));
        let shared = mk_and([mk_eq(&v("x"), &v("p")), mk_le(&mk_int(0), &v("x"))]);
        assert!(!shared.is_separable(&scope));
        let important = mk_and([mk_eq(&v("k"), &v("p")), mk_le(&mk_int(0), &v("k"))]);
        assert!(important.is_separable(&scope));
    }
}
