mod names;
mod parse;
mod transform;

pub use names::{NameGen, Scope};
pub use parse::{ParseError, parse};

use std::{fmt, sync::Arc};

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Domain {
    Int,
    /// non-negative integer
    Nat,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var {
    name: Arc<str>,
    domain: Domain,
}

impl Var {
    pub fn new(name: impl Into<Arc<str>>, domain: Domain) -> Self {
        Self {
            name: name.into(),
            domain,
        }
    }

    #[inline]
    pub fn int(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Domain::Int)
    }

    #[inline]
    pub fn nat(name: impl Into<Arc<str>>) -> Self {
        Self::new(name, Domain::Nat)
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    #[inline]
    pub fn is_nat(&self) -> bool {
        self.domain == Domain::Nat
    }

    pub fn with_domain(&self, domain: Domain) -> Self {
        Self {
            name: self.name.clone(),
            domain,
        }
    }

    pub fn renamed(&self, name: impl Into<Arc<str>>) -> Self {
        Self::new(name, self.domain)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sort {
    Int,
    Bool,
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Kind {
    Int(i64),
    Bool(bool),
    Var(Var),
    Add(Vec<Formula>),
    Scale(i64, Formula),
    Eq(Formula, Formula),
    Le(Formula, Formula),
    Lt(Formula, Formula),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Not(Formula),
    Ite(Formula, Formula, Formula),
    /// `(out, _) ∈ {step | body}*`
    Iterate(Vec<Var>, Vec<Var>, Formula),
    Exists(Vec<Var>, Formula),
    Forall(Vec<Var>, Formula),
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
struct Node {
    kind: Kind,
    in_star: bool,
}

/// Immutable formula tree. Clones share structure.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Formula(Arc<Node>);

impl Formula {
    /// Builds a node. Non-star nodes are locally simplified; star nodes are
    /// opaque and kept as given.
    pub(crate) fn make(kind: Kind, in_star: bool) -> Self {
        if in_star {
            Self::raw(kind, true)
        } else {
            simplify(kind)
        }
    }

    #[inline]
    fn raw(kind: Kind, in_star: bool) -> Self {
        Self(Arc::new(Node { kind, in_star }))
    }

    #[inline]
    pub fn kind(&self) -> &Kind {
        &self.0.kind
    }

    #[inline]
    pub fn in_star(&self) -> bool {
        self.0.in_star
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn sort(&self) -> Sort {
        match self.kind() {
            Kind::Int(_) | Kind::Var(_) | Kind::Add(_) | Kind::Scale(..) => Sort::Int,
            Kind::Ite(_, t, _) => t.sort(),
            _ => Sort::Bool,
        }
    }

    #[inline]
    pub fn is_true(&self) -> bool {
        !self.in_star() && matches!(self.kind(), Kind::Bool(true))
    }

    #[inline]
    pub fn is_false(&self) -> bool {
        !self.in_star() && matches!(self.kind(), Kind::Bool(false))
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self.kind() {
            Kind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            Kind::Int(c) => Some(*c),
            _ => None,
        }
    }

    pub fn is_ite(&self) -> bool {
        matches!(self.kind(), Kind::Ite(..))
    }

    pub fn is_iterate(&self) -> bool {
        matches!(self.kind(), Kind::Iterate(..))
    }
}

#[inline]
pub fn mk_int(c: i64) -> Formula {
    Formula::raw(Kind::Int(c), false)
}

#[inline]
pub fn mk_bool(b: bool) -> Formula {
    Formula::raw(Kind::Bool(b), false)
}

#[inline]
pub fn mk_true() -> Formula {
    mk_bool(true)
}

#[inline]
pub fn mk_false() -> Formula {
    mk_bool(false)
}

#[inline]
pub fn mk_var(v: &Var) -> Formula {
    Formula::raw(Kind::Var(v.clone()), false)
}

pub fn mk_add(terms: impl IntoIterator<Item = Formula>) -> Formula {
    Formula::make(Kind::Add(terms.into_iter().collect()), false)
}

pub fn mk_scale(k: i64, a: &Formula) -> Formula {
    Formula::make(Kind::Scale(k, a.clone()), false)
}

pub fn mk_neg(a: &Formula) -> Formula {
    mk_scale(-1, a)
}

pub fn mk_sub(a: &Formula, b: &Formula) -> Formula {
    mk_add([a.clone(), mk_neg(b)])
}

pub fn mk_eq(a: &Formula, b: &Formula) -> Formula {
    Formula::make(Kind::Eq(a.clone(), b.clone()), false)
}

pub fn mk_le(a: &Formula, b: &Formula) -> Formula {
    Formula::make(Kind::Le(a.clone(), b.clone()), false)
}

pub fn mk_lt(a: &Formula, b: &Formula) -> Formula {
    Formula::make(Kind::Lt(a.clone(), b.clone()), false)
}

pub fn mk_ge(a: &Formula, b: &Formula) -> Formula {
    mk_le(b, a)
}

pub fn mk_gt(a: &Formula, b: &Formula) -> Formula {
    mk_lt(b, a)
}

pub fn mk_and(fs: impl IntoIterator<Item = Formula>) -> Formula {
    Formula::make(Kind::And(fs.into_iter().collect()), false)
}

pub fn mk_or(fs: impl IntoIterator<Item = Formula>) -> Formula {
    Formula::make(Kind::Or(fs.into_iter().collect()), false)
}

pub fn mk_not(a: &Formula) -> Formula {
    Formula::make(Kind::Not(a.clone()), false)
}

pub fn mk_implies(a: &Formula, b: &Formula) -> Formula {
    mk_or([mk_not(a), b.clone()])
}

pub fn mk_iff(a: &Formula, b: &Formula) -> Formula {
    mk_and([mk_implies(a, b), mk_implies(b, a)])
}

pub fn mk_ite(c: &Formula, t: &Formula, e: &Formula) -> Formula {
    assert_eq!(t.sort(), e.sort(), "ite branches must share a sort");
    Formula::make(Kind::Ite(c.clone(), t.clone(), e.clone()), false)
}

pub fn mk_iterate(out: &[Var], step: &[Var], body: &Formula) -> Formula {
    assert!(
        out.len() <= step.len(),
        "iterate has {} outputs but only {} step variables",
        out.len(),
        step.len()
    );
    Formula::make(Kind::Iterate(out.to_vec(), step.to_vec(), body.clone()), false)
}

pub fn mk_exists(vars: &[Var], body: &Formula) -> Formula {
    Formula::make(Kind::Exists(vars.to_vec(), body.clone()), false)
}

pub fn mk_forall(vars: &[Var], body: &Formula) -> Formula {
    Formula::make(Kind::Forall(vars.to_vec(), body.clone()), false)
}

/// `x = y` for two equally long vectors of integer terms.
pub fn mk_vec_eq(x: &[Formula], y: &[Formula]) -> Formula {
    assert_eq!(x.len(), y.len(), "vector arity mismatch");
    mk_and(x.iter().zip(y.iter()).map(|(a, b)| mk_eq(a, b)))
}

pub fn mk_vars(vars: &[Var]) -> Vec<Formula> {
    vars.iter().map(mk_var).collect()
}

pub fn mk_ints(v: &[i64]) -> Vec<Formula> {
    v.iter().map(|c| mk_int(*c)).collect()
}

fn push_flat(out: &mut Vec<Formula>, f: Formula, is_same: impl Fn(&Kind) -> Option<&Vec<Formula>>) {
    if !f.in_star()
        && let Some(cs) = is_same(f.kind())
    {
        for c in cs {
            if !out.contains(c) || c.in_star() {
                out.push(c.clone());
            }
        }
    } else if f.in_star() || !out.contains(&f) {
        out.push(f);
    }
}

fn simplify(kind: Kind) -> Formula {
    match kind {
        Kind::And(cs) => {
            let mut out = Vec::new();
            for c in cs {
                if c.is_false() {
                    return mk_false();
                }
                if c.is_true() {
                    continue;
                }
                push_flat(&mut out, c, |k| match k {
                    Kind::And(cs) => Some(cs),
                    _ => None,
                });
            }
            match out.len() {
                0 => mk_true(),
                1 => out.pop().unwrap(),
                _ => Formula::raw(Kind::And(out), false),
            }
        }
        Kind::Or(cs) => {
            let mut out = Vec::new();
            for c in cs {
                if c.is_true() {
                    return mk_true();
                }
                if c.is_false() {
                    continue;
                }
                push_flat(&mut out, c, |k| match k {
                    Kind::Or(cs) => Some(cs),
                    _ => None,
                });
            }
            match out.len() {
                0 => mk_false(),
                1 => out.pop().unwrap(),
                _ => Formula::raw(Kind::Or(out), false),
            }
        }
        Kind::Not(a) => {
            if a.in_star() {
                return Formula::raw(Kind::Not(a), false);
            }
            match a.kind() {
                Kind::Bool(b) => mk_bool(!b),
                Kind::Not(b) => b.clone(),
                _ => Formula::raw(Kind::Not(a), false),
            }
        }
        Kind::Add(ts) => {
            let mut out = Vec::new();
            let mut c = 0i64;
            let mut fold = |t: &Formula, out: &mut Vec<Formula>| match t.kind() {
                Kind::Int(v) if !t.in_star() => match c.checked_add(*v) {
                    Some(s) => c = s,
                    None => out.push(t.clone()),
                },
                _ => out.push(t.clone()),
            };
            for t in ts {
                match t.kind() {
                    Kind::Add(inner) if !t.in_star() => {
                        for i in inner {
                            fold(i, &mut out);
                        }
                    }
                    _ => fold(&t, &mut out),
                }
            }
            if c != 0 {
                out.push(mk_int(c));
            }
            match out.len() {
                0 => mk_int(0),
                1 => out.pop().unwrap(),
                _ => Formula::raw(Kind::Add(out), false),
            }
        }
        Kind::Scale(k, a) => {
            if k == 0 {
                return mk_int(0);
            }
            if k == 1 {
                return a;
            }
            if a.in_star() {
                return Formula::raw(Kind::Scale(k, a), false);
            }
            match a.kind() {
                Kind::Int(c) => match c.checked_mul(k) {
                    Some(v) => mk_int(v),
                    None => Formula::raw(Kind::Scale(k, a), false),
                },
                Kind::Scale(k2, b) => match k.checked_mul(*k2) {
                    Some(kk) => simplify(Kind::Scale(kk, b.clone())),
                    None => Formula::raw(Kind::Scale(k, a), false),
                },
                _ => Formula::raw(Kind::Scale(k, a), false),
            }
        }
        Kind::Eq(a, b) => match (const_of(&a), const_of(&b)) {
            (Some(x), Some(y)) => mk_bool(x == y),
            _ if a == b && !a.in_star() => mk_true(),
            _ => Formula::raw(Kind::Eq(a, b), false),
        },
        Kind::Le(a, b) => match (const_of(&a), const_of(&b)) {
            (Some(x), Some(y)) => mk_bool(x <= y),
            _ => Formula::raw(Kind::Le(a, b), false),
        },
        Kind::Lt(a, b) => match (const_of(&a), const_of(&b)) {
            (Some(x), Some(y)) => mk_bool(x < y),
            _ => Formula::raw(Kind::Lt(a, b), false),
        },
        Kind::Ite(c, t, e) => {
            if c.is_true() {
                t
            } else if c.is_false() {
                e
            } else if t == e && !t.in_star() {
                t
            } else {
                Formula::raw(Kind::Ite(c, t, e), false)
            }
        }
        Kind::Exists(vs, body) | Kind::Forall(vs, body) if vs.is_empty() => body,
        Kind::Exists(vs, body) => {
            if body.is_true() || body.is_false() {
                body
            } else {
                Formula::raw(Kind::Exists(vs, body), false)
            }
        }
        Kind::Forall(vs, body) => {
            if body.is_true() || body.is_false() {
                body
            } else {
                Formula::raw(Kind::Forall(vs, body), false)
            }
        }
        kind => Formula::raw(kind, false),
    }
}

fn const_of(f: &Formula) -> Option<i64> {
    if f.in_star() { None } else { f.as_int() }
}

impl Formula {
    fn fmt_in(&self, f: &mut fmt::Formatter<'_>, parent_star: bool) -> fmt::Result {
        if self.in_star() && !parent_star {
            write!(f, "(star ")?;
            self.fmt_in(f, true)?;
            return write!(f, ")");
        }
        let star = self.in_star();
        let list = |f: &mut fmt::Formatter<'_>, op: &str, cs: &[&Formula]| -> fmt::Result {
            write!(f, "({op}")?;
            for c in cs {
                write!(f, " ")?;
                c.fmt_in(f, star)?;
            }
            write!(f, ")")
        };
        let vars = |vs: &[Var]| {
            vs.iter()
                .map(|v| v.name().to_string())
                .collect::<Vec<_>>()
                .join(" ")
        };
        match self.kind() {
            Kind::Int(c) => write!(f, "{c}"),
            Kind::Bool(b) => write!(f, "{b}"),
            Kind::Var(v) => write!(f, "{v}"),
            Kind::Add(ts) => list(f, "+", &ts.iter().collect::<Vec<_>>()),
            Kind::Scale(k, a) => {
                write!(f, "(* {k} ")?;
                a.fmt_in(f, star)?;
                write!(f, ")")
            }
            Kind::Eq(a, b) => list(f, "=", &[a, b]),
            Kind::Le(a, b) => list(f, "<=", &[a, b]),
            Kind::Lt(a, b) => list(f, "<", &[a, b]),
            Kind::And(cs) => list(f, "and", &cs.iter().collect::<Vec<_>>()),
            Kind::Or(cs) => list(f, "or", &cs.iter().collect::<Vec<_>>()),
            Kind::Not(a) => list(f, "not", &[a]),
            Kind::Ite(c, t, e) => list(f, "ite", &[c, t, e]),
            Kind::Iterate(out, step, body) => {
                write!(f, "(iterate ({}) ({}) ", vars(out), vars(step))?;
                body.fmt_in(f, star)?;
                write!(f, ")")
            }
            Kind::Exists(vs, body) => {
                write!(f, "(exists ({}) ", vars(vs))?;
                body.fmt_in(f, star)?;
                write!(f, ")")
            }
            Kind::Forall(vs, body) => {
                write!(f, "(forall ({}) ", vars(vs))?;
                body.fmt_in(f, star)?;
                write!(f, ")")
            }
        }
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_in(f, false)
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}
