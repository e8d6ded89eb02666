use liastar::{
    config::{SlsConfig, SmtConfig, StarConfig},
    formula::{
        Formula, NameGen, Var, mk_add, mk_and, mk_eq, mk_exists, mk_ge, mk_iff, mk_implies, mk_int,
        mk_le, mk_lt, mk_var,
    },
    solver::{Interrupt, Smt},
    star::{Elimination, StarProblem, StarTransformer},
};

fn v(n: &str) -> Formula {
    mk_var(&Var::int(n))
}

fn smt() -> Smt {
    Smt::new(SmtConfig::default(), Interrupt::new())
}

fn vars(names: &[&str]) -> Vec<Var> {
    names.iter().map(|n| Var::int(*n)).collect()
}

fn transform(p: &StarProblem, cfg: &StarConfig) -> (liastar::star::Transformed, Smt) {
    let smt = smt();
    let mut names = NameGen::new();
    let res = StarTransformer::new(cfg, &SlsConfig::default(), &smt, &mut names)
        .transform(p)
        .unwrap();
    (res, smt)
}

#[test]
fn unreachable_total_is_refuted() {
    // v1 = 5 while every step contributes zero
    let body = mk_and([mk_eq(&v("w2"), &v("w1")), mk_eq(&v("w1"), &mk_int(0))]).mark_star();
    let p = StarProblem::new(
        &mk_eq(&v("v1"), &mk_int(5)),
        &vars(&["v1"]),
        &vars(&["w1", "w2"]),
        &mk_and([]),
        Some(&body),
    );
    let (res, _) = transform(&p, &StarConfig::default());
    assert!(res.formula.is_false());
    assert_eq!(res.kind, Elimination::Contradiction);
}

#[test]
fn counting_is_exact() {
    let body = mk_and([
        mk_eq(&v("w2"), &mk_add([v("w1"), mk_int(1)])),
        mk_ge(&v("w1"), &mk_int(0)),
    ])
    .mark_star();
    let p = StarProblem::new(
        &mk_and([]),
        &vars(&["v1"]),
        &vars(&["w1", "w2"]),
        &mk_and([]),
        Some(&body),
    );
    let (res, smt) = transform(&p, &StarConfig::default());
    assert_eq!(res.kind, Elimination::Exact);
    let coefs: Vec<Var> = res
        .formula
        .free_vars()
        .into_values()
        .filter(|x| x.name() != "v1")
        .collect();
    let closed = mk_exists(&coefs, &res.formula);
    let expect = mk_ge(&v("v1"), &mk_int(0));
    assert!(smt.check_valid(&mk_iff(&closed, &expect)).unwrap().is_valid());
}

#[test]
fn open_body_is_approximated_deterministically() {
    // w1 ≤ p mentions a variable bound outside the iteration
    let body = mk_and([mk_le(&mk_int(0), &v("w1")), mk_le(&v("w1"), &v("p"))]);
    let p = StarProblem::new(
        &mk_lt(&v("v1"), &v("p")),
        &vars(&["v1"]),
        &vars(&["w1", "w2"]),
        &body,
        None,
    );
    let cfg = StarConfig::default();
    let (a, smt) = transform(&p, &cfg);
    let (b, _) = transform(&p, &cfg);
    assert_eq!(a.kind, Elimination::Approx);
    assert_eq!(a.formula, b.formula);
    let weaker = mk_implies(&a.formula, &mk_le(&mk_int(0), &v("v1")));
    assert!(smt.check_valid(&weaker).unwrap().is_valid());
}

#[test]
fn zero_dimensional_iterate_is_true() {
    let p = StarProblem::new(&mk_and([]), &[], &vars(&["w1"]), &mk_eq(&v("w1"), &mk_int(1)), None);
    let (res, _) = transform(&p, &StarConfig::default());
    assert!(res.formula.is_true());
    assert_eq!(res.kind, Elimination::Exact);
}
