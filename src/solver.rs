use crate::{
    config::SmtConfig,
    error::{Error, Result},
    formula::{Formula, Kind, Var},
    statistic::SmtStatistic,
};
use log::trace;
use std::{
    cell::RefCell,
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};
use z3::{
    Context, Params, Solver,
    ast::{self, Ast, Bool, Int},
};

/// Cooperative cancellation flag shared between a worker and its driver.
#[derive(Clone, Debug, Default)]
pub struct Interrupt(Arc<AtomicBool>);

impl Interrupt {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn check(&self) -> Result<()> {
        if self.is_raised() {
            Err(Error::Interrupted)
        } else {
            Ok(())
        }
    }
}

pub type Model = BTreeMap<String, i64>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SatResult {
    Sat(Model),
    Unsat,
    Unknown(String),
}

impl SatResult {
    #[inline]
    pub fn is_sat(&self) -> bool {
        matches!(self, SatResult::Sat(_))
    }

    #[inline]
    pub fn is_unsat(&self) -> bool {
        matches!(self, SatResult::Unsat)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Validity {
    Valid,
    Invalid,
    Unknown,
}

impl Validity {
    #[inline]
    pub fn is_valid(self) -> bool {
        self == Validity::Valid
    }
}

/// Renders formulas as z3 terms. Free variables must be declared before the
/// formula mentioning them is translated.
pub struct Translator<'ctx> {
    ctx: &'ctx Context,
    vars: BTreeMap<String, Int<'ctx>>,
}

impl<'ctx> Translator<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self {
            ctx,
            vars: BTreeMap::new(),
        }
    }

    pub fn declare(&mut self, v: &Var) -> Int<'ctx> {
        self.vars
            .entry(v.name().to_string())
            .or_insert_with(|| Int::new_const(self.ctx, v.name()))
            .clone()
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<&Int<'ctx>> {
        self.vars.get(name)
    }

    fn int(&self, c: i64) -> Int<'ctx> {
        Int::from_i64(self.ctx, c)
    }

    fn bound(&self, vs: &[Var]) -> (Vec<Int<'ctx>>, Vec<Bool<'ctx>>) {
        let consts: Vec<Int> = vs.iter().map(|v| Int::new_const(self.ctx, v.name())).collect();
        let guards = vs
            .iter()
            .zip(consts.iter())
            .filter(|(v, _)| v.is_nat())
            .map(|(_, c)| c.ge(&self.int(0)))
            .collect();
        (consts, guards)
    }

    pub fn translate_int(&mut self, f: &Formula) -> Int<'ctx> {
        match f.kind() {
            Kind::Int(c) => self.int(*c),
            Kind::Var(v) => match self.vars.get(v.name()) {
                Some(x) => x.clone(),
                None => Int::new_const(self.ctx, v.name()),
            },
            Kind::Add(ts) => {
                let ts: Vec<Int> = ts.iter().map(|t| self.translate_int(t)).collect();
                let refs: Vec<&Int> = ts.iter().collect();
                Int::add(self.ctx, &refs)
            }
            Kind::Scale(k, a) => {
                let a = self.translate_int(a);
                Int::mul(self.ctx, &[&self.int(*k), &a])
            }
            Kind::Ite(c, t, e) => {
                let c = self.translate_bool(c);
                c.ite(&self.translate_int(t), &self.translate_int(e))
            }
            _ => panic!("'{f}' is not an integer term"),
        }
    }

    pub fn translate_bool(&mut self, f: &Formula) -> Bool<'ctx> {
        match f.kind() {
            Kind::Bool(b) => Bool::from_bool(self.ctx, *b),
            Kind::Eq(a, b) => self.translate_int(a)._eq(&self.translate_int(b)),
            Kind::Le(a, b) => self.translate_int(a).le(&self.translate_int(b)),
            Kind::Lt(a, b) => self.translate_int(a).lt(&self.translate_int(b)),
            Kind::And(cs) => {
                let cs: Vec<Bool> = cs.iter().map(|c| self.translate_bool(c)).collect();
                let refs: Vec<&Bool> = cs.iter().collect();
                Bool::and(self.ctx, &refs)
            }
            Kind::Or(cs) => {
                let cs: Vec<Bool> = cs.iter().map(|c| self.translate_bool(c)).collect();
                let refs: Vec<&Bool> = cs.iter().collect();
                Bool::or(self.ctx, &refs)
            }
            Kind::Not(a) => self.translate_bool(a).not(),
            Kind::Ite(c, t, e) => {
                let c = self.translate_bool(c);
                c.ite(&self.translate_bool(t), &self.translate_bool(e))
            }
            Kind::Exists(vs, body) => {
                let (consts, mut guards) = self.bound(vs);
                guards.push(self.translate_bool(body));
                let refs: Vec<&Bool> = guards.iter().collect();
                let body = Bool::and(self.ctx, &refs);
                let bound: Vec<&dyn Ast<'ctx>> = consts.iter().map(|c| c as &dyn Ast<'ctx>).collect();
                ast::exists_const(self.ctx, &bound, &[], &body)
            }
            Kind::Forall(vs, body) => {
                let (consts, guards) = self.bound(vs);
                let refs: Vec<&Bool> = guards.iter().collect();
                let body = Bool::and(self.ctx, &refs).implies(&self.translate_bool(body));
                let bound: Vec<&dyn Ast<'ctx>> = consts.iter().map(|c| c as &dyn Ast<'ctx>).collect();
                ast::forall_const(self.ctx, &bound, &[], &body)
            }
            Kind::Iterate(..) => panic!("iterate must be eliminated before solving: {f}"),
            _ => panic!("'{f}' is not a boolean formula"),
        }
    }
}

/// Bounded satisfiability and validity queries. Every query runs in its own
/// z3 context.
pub struct Smt {
    cfg: SmtConfig,
    interrupt: Interrupt,
    statistic: RefCell<SmtStatistic>,
}

impl Smt {
    pub fn new(cfg: SmtConfig, interrupt: Interrupt) -> Self {
        Self {
            cfg,
            interrupt,
            statistic: RefCell::new(SmtStatistic::default()),
        }
    }

    #[inline]
    pub fn interrupt(&self) -> &Interrupt {
        &self.interrupt
    }

    pub fn statistic(&self) -> SmtStatistic {
        self.statistic.borrow().clone()
    }

    fn solve(&self, f: &Formula, negate: bool) -> Result<SatResult> {
        self.interrupt.check()?;
        let start = Instant::now();
        let mut cfg = z3::Config::new();
        cfg.set_model_generation(true);
        let ctx = Context::new(&cfg);
        let solver = Solver::new(&ctx);
        let mut params = Params::new(&ctx);
        params.set_u32("timeout", u32::try_from(self.cfg.timeout_ms).unwrap_or(u32::MAX));
        solver.set_params(&params);

        let mut tr = Translator::new(&ctx);
        let free = f.free_vars();
        for v in free.values() {
            let x = tr.declare(v);
            if v.is_nat() {
                solver.assert(&x.ge(&Int::from_i64(&ctx, 0)));
            }
        }
        let b = tr.translate_bool(f);
        solver.assert(&if negate { b.not() } else { b });
        let res = match solver.check() {
            z3::SatResult::Sat => {
                let mut model = Model::new();
                if let Some(m) = solver.get_model() {
                    for name in free.keys() {
                        if let Some(val) = tr
                            .get(name)
                            .and_then(|x| m.eval(x, true))
                            .and_then(|v| v.as_i64())
                        {
                            model.insert(name.clone(), val);
                        }
                    }
                }
                SatResult::Sat(model)
            }
            z3::SatResult::Unsat => SatResult::Unsat,
            z3::SatResult::Unknown => {
                SatResult::Unknown(solver.get_reason_unknown().unwrap_or_default())
            }
        };

        let mut statistic = self.statistic.borrow_mut();
        if negate {
            statistic.num_valid_query += 1;
        } else {
            statistic.num_sat_query += 1;
        }
        statistic.query_time += start.elapsed();
        if let SatResult::Unknown(reason) = &res {
            statistic.num_unknown += 1;
            trace!("smt unknown ({reason}) on {f}");
            self.interrupt.check()?;
        }
        Ok(res)
    }

    pub fn check_sat(&self, f: &Formula) -> Result<SatResult> {
        self.solve(f, false)
    }

    /// Valid iff `domains ∧ ¬f` is unsatisfiable.
    pub fn check_valid(&self, f: &Formula) -> Result<Validity> {
        Ok(match self.solve(f, true)? {
            SatResult::Unsat => Validity::Valid,
            SatResult::Sat(_) => Validity::Invalid,
            SatResult::Unknown(_) => Validity::Unknown,
        })
    }

    /// `Some(true)` if valid, `Some(false)` if refuted, `None` when unknown.
    pub fn is_valid(&self, f: &Formula) -> Result<Option<bool>> {
        Ok(match self.check_valid(f)? {
            Validity::Valid => Some(true),
            Validity::Invalid => Some(false),
            Validity::Unknown => None,
        })
    }

    pub fn is_unsat(&self, f: &Formula) -> Result<Option<bool>> {
        Ok(match self.check_sat(f)? {
            SatResult::Unsat => Some(true),
            SatResult::Sat(_) => Some(false),
            SatResult::Unknown(_) => None,
        })
    }
}
