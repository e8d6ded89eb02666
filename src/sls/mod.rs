mod augment;
mod finder;

pub use augment::{AugmentState, SlsAugmenter};
pub use finder::AugmentVectorFinder;

use crate::formula::{
    Domain, Formula, NameGen, Var, mk_add, mk_and, mk_eq, mk_exists, mk_implies, mk_int, mk_scale,
    mk_var, mk_vec_eq,
};
use std::{collections::BTreeSet, fmt};

pub type Vector = Vec<i64>;

#[inline]
pub fn is_zero(v: &[i64]) -> bool {
    v.iter().all(|c| *c == 0)
}

/// Componentwise `a ≤ b`.
#[inline]
pub fn vec_le(a: &[i64], b: &[i64]) -> bool {
    assert_eq!(a.len(), b.len(), "vector arity mismatch");
    a.iter().zip(b.iter()).all(|(x, y)| x <= y)
}

#[inline]
pub fn vec_sub(a: &[i64], b: &[i64]) -> Vector {
    assert_eq!(a.len(), b.len(), "vector arity mismatch");
    a.iter().zip(b.iter()).map(|(x, y)| x - y).collect()
}

/// `base + Σ coef_j · gens_j` as one term per coordinate.
pub fn combination(base: &[i64], gens: &[&[i64]], coefs: &[Formula]) -> Vec<Formula> {
    assert_eq!(gens.len(), coefs.len(), "vector arity mismatch");
    (0..base.len())
        .map(|i| {
            let mut terms = vec![mk_int(base[i])];
            for (g, c) in gens.iter().zip(coefs.iter()) {
                assert_eq!(g.len(), base.len(), "vector arity mismatch");
                terms.push(mk_scale(g[i], c));
            }
            mk_add(terms)
        })
        .collect()
}

fn fmt_vector(v: &[i64], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "(")?;
    for (i, c) in v.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{c}")?;
    }
    write!(f, ")")
}

/// `{ shift + Σ λⱼ·offsetⱼ : λⱼ ∈ ℕ }`
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct LinearSet {
    shift: Vector,
    offsets: BTreeSet<Vector>,
}

impl LinearSet {
    pub fn new(shift: Vector) -> Self {
        Self {
            shift,
            offsets: BTreeSet::new(),
        }
    }

    pub fn with_offsets(shift: Vector, offsets: impl IntoIterator<Item = Vector>) -> Self {
        let mut ls = Self::new(shift);
        for o in offsets {
            ls.add_offset(o);
        }
        ls
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.shift.len()
    }

    #[inline]
    pub fn shift(&self) -> &[i64] {
        &self.shift
    }

    #[inline]
    pub fn offsets(&self) -> &BTreeSet<Vector> {
        &self.offsets
    }

    pub(crate) fn set_shift(&mut self, shift: Vector) {
        assert_eq!(shift.len(), self.dim(), "vector arity mismatch");
        self.shift = shift;
    }

    /// Zero offsets are never stored.
    pub fn add_offset(&mut self, offset: Vector) -> bool {
        assert_eq!(offset.len(), self.dim(), "vector arity mismatch");
        if is_zero(&offset) {
            return false;
        }
        self.offsets.insert(offset)
    }

    pub fn remove_offset(&mut self, offset: &[i64]) -> bool {
        self.offsets.remove(offset)
    }

    /// `x = shift + Σ λⱼ·offsetⱼ`, `lambdas` in offset order.
    pub fn membership(&self, x: &[Formula], lambdas: &[Formula]) -> Formula {
        assert_eq!(x.len(), self.dim(), "vector arity mismatch");
        let gens: Vec<&[i64]> = self.offsets.iter().map(|o| o.as_slice()).collect();
        mk_vec_eq(x, &combination(&self.shift, &gens, lambdas))
    }

    /// Existentially closed membership of `x`.
    pub fn member_formula(&self, x: &[Formula], names: &mut NameGen) -> Formula {
        let lambdas: Vec<Var> = (0..self.offsets.len())
            .map(|_| names.fresh_var("lambda", Domain::Nat))
            .collect();
        let terms: Vec<Formula> = lambdas.iter().map(mk_var).collect();
        mk_exists(&lambdas, &self.membership(x, &terms))
    }
}

impl fmt::Display for LinearSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_vector(&self.shift, f)?;
        write!(f, " + {{")?;
        for (i, o) in self.offsets.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            fmt_vector(o, f)?;
        }
        write!(f, "}}")
    }
}

/// Finite union of linear sets of one fixed dimension.
#[derive(Clone, Debug)]
pub struct SemiLinearSet {
    id: u64,
    dim: usize,
    sets: Vec<LinearSet>,
}

impl SemiLinearSet {
    pub fn new(dim: usize, names: &mut NameGen) -> Self {
        Self {
            id: names.next_id(),
            dim,
            sets: Vec::new(),
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn sets(&self) -> &[LinearSet] {
        &self.sets
    }

    #[inline]
    pub(crate) fn sets_mut(&mut self) -> &mut Vec<LinearSet> {
        &mut self.sets
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn push(&mut self, ls: LinearSet) {
        assert_eq!(ls.dim(), self.dim, "linear set dimension mismatch");
        self.sets.push(ls);
    }

    pub fn max_offsets(&self) -> usize {
        self.sets.iter().map(|ls| ls.offsets.len()).max().unwrap_or(0)
    }

    /// LIA encoding of `x ∈ SLS*`. Returns the formula together with its
    /// free natural coefficients:
    /// `x = Σᵢ (μᵢ·shiftᵢ + Σⱼ λᵢⱼ·offsetᵢⱼ) ∧ ⋀ᵢ (μᵢ = 0 → Σⱼ λᵢⱼ = 0)`.
    pub fn star_formula(&self, x: &[Formula], names: &mut NameGen) -> (Formula, Vec<Var>) {
        assert_eq!(x.len(), self.dim, "vector arity mismatch");
        let mut coefs = Vec::new();
        let mut sum: Vec<Vec<Formula>> = vec![Vec::new(); self.dim];
        let mut guards = Vec::new();
        for (i, ls) in self.sets.iter().enumerate() {
            let mu = names.fresh_var(&format!("sls{}_mu{i}_", self.id), Domain::Nat);
            let mu_t = mk_var(&mu);
            coefs.push(mu);
            let mut lambdas = Vec::new();
            for (j, o) in ls.offsets.iter().enumerate() {
                let l = names.fresh_var(
                    &format!("sls{}_lambda{i}_{j}_", self.id),
                    Domain::Nat,
                );
                let l_t = mk_var(&l);
                coefs.push(l);
                for (k, s) in sum.iter_mut().enumerate() {
                    s.push(mk_scale(o[k], &l_t));
                }
                lambdas.push(l_t);
            }
            for (k, s) in sum.iter_mut().enumerate() {
                s.push(mk_scale(ls.shift[k], &mu_t));
            }
            if !lambdas.is_empty() {
                guards.push(mk_implies(
                    &mk_eq(&mu_t, &mk_int(0)),
                    &mk_eq(&mk_add(lambdas), &mk_int(0)),
                ));
            }
        }
        let sum: Vec<Formula> = sum.into_iter().map(mk_add).collect();
        let mut conj = vec![mk_vec_eq(x, &sum)];
        conj.extend(guards);
        (mk_and(conj), coefs)
    }

    /// `x ∈ SLS*` with the coefficients existentially closed.
    pub fn member_formula(&self, x: &[Formula], names: &mut NameGen) -> Formula {
        let (f, coefs) = self.star_formula(x, names);
        mk_exists(&coefs, &f)
    }
}

impl fmt::Display for SemiLinearSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sls#{} [", self.id)?;
        for (i, ls) in self.sets.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{ls}")?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::SmtConfig,
        formula::mk_ints,
        solver::{Interrupt, Smt},
    };

    fn smt() -> Smt {
        Smt::new(SmtConfig::default(), Interrupt::new())
    }

    fn member(smt: &Smt, f: &Formula) -> bool {
        smt.check_sat(f).unwrap().is_sat()
    }

    #[test]
    fn zero_offsets_are_dropped() {
        let ls = LinearSet::with_offsets(vec![1, 1], [vec![0, 0], vec![1, 0], vec![1, 0]]);
        assert_eq!(ls.offsets().len(), 1);
        assert_eq!(ls.to_string(), "(1, 1) + {(1, 0)}");
    }

    #[test]
    fn linear_set_membership() {
        let smt = smt();
        let mut names = NameGen::new();
        let ls = LinearSet::with_offsets(vec![2, 0], [vec![1, 1]]);
        assert!(member(&smt, &ls.member_formula(&mk_ints(&[3, 1]), &mut names)));
        assert!(member(&smt, &ls.member_formula(&mk_ints(&[2, 0]), &mut names)));
        assert!(!member(&smt, &ls.member_formula(&mk_ints(&[3, 0]), &mut names)));
        assert!(!member(&smt, &ls.member_formula(&mk_ints(&[1, -1]), &mut names)));
    }

    #[test]
    fn empty_sls_is_zero() {
        let smt = smt();
        let mut names = NameGen::new();
        let sls = SemiLinearSet::new(2, &mut names);
        let (f, coefs) = sls.star_formula(&mk_ints(&[0, 0]), &mut names);
        assert!(coefs.is_empty());
        assert!(member(&smt, &f));
        assert!(!member(&smt, &sls.member_formula(&mk_ints(&[1, 0]), &mut names)));
    }

    #[test]
    fn star_membership_sums_elements() {
        let smt = smt();
        let mut names = NameGen::new();
        let mut sls = SemiLinearSet::new(1, &mut names);
        sls.push(LinearSet::new(vec![3]));
        sls.push(LinearSet::with_offsets(vec![5], [vec![2]]));
        for (v, m) in [(0, true), (3, true), (6, true), (5, true), (8, true), (1, false), (2, false), (4, false)] {
            let f = sls.member_formula(&mk_ints(&[v]), &mut names);
            assert_eq!(member(&smt, &f), m, "{v}");
        }
    }

    #[test]
    fn coefficient_names_are_namespaced() {
        let mut names = NameGen::new();
        let mut a = SemiLinearSet::new(1, &mut names);
        let mut b = SemiLinearSet::new(1, &mut names);
        a.push(LinearSet::new(vec![1]));
        b.push(LinearSet::new(vec![1]));
        let (_, ca) = a.star_formula(&mk_ints(&[0]), &mut names);
        let (_, cb) = b.star_formula(&mk_ints(&[0]), &mut names);
        assert_ne!(ca[0].name(), cb[0].name());
        assert!(ca[0].is_nat());
    }
}
