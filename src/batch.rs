use crate::{
    config::EngineConfig,
    error::Error,
    formula::{ParseError, Scope, parse},
    solver::Interrupt,
    tracer::{Tracer, TracerIf},
    verify::{Obligation, Verifier, VerifyResult},
};
use log::{error, info, warn};
use serde::Deserialize;
use std::{
    collections::BTreeSet,
    fs,
    path::Path,
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

#[derive(Deserialize, Debug, Default)]
pub struct ProblemFile {
    #[serde(default, rename = "problem")]
    pub problems: Vec<Problem>,
}

/// One query pair as written in a problem file.
#[derive(Deserialize, Debug, Clone)]
pub struct Problem {
    pub name: String,
    /// counterexample formula in s-expression syntax
    pub formula: String,
    #[serde(default)]
    pub params: Vec<String>,
    #[serde(default)]
    pub important: Vec<String>,
    /// variables ranging over the naturals
    #[serde(default)]
    pub nat: Vec<String>,
    pub expect: Option<VerifyResult>,
}

impl Problem {
    pub fn obligation(&self) -> Result<Obligation, ParseError> {
        let nat: BTreeSet<String> = self.nat.iter().cloned().collect();
        let formula = parse(&self.formula, &nat)?;
        Ok(Obligation::new(
            &self.name,
            formula,
            Scope::new(&self.params, &self.important),
        ))
    }
}

pub fn parse_problems(src: &str) -> anyhow::Result<Vec<Problem>> {
    let file: ProblemFile = toml::from_str(src)?;
    let mut seen = BTreeSet::new();
    for p in file.problems.iter() {
        if !seen.insert(p.name.as_str()) {
            anyhow::bail!("duplicate problem name {}", p.name);
        }
    }
    Ok(file.problems)
}

pub fn load<P: AsRef<Path>>(p: P) -> anyhow::Result<Vec<Problem>> {
    let src = fs::read_to_string(p)?;
    parse_problems(&src)
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub name: String,
    pub result: VerifyResult,
    pub expect: Option<VerifyResult>,
    pub time: Duration,
}

impl Outcome {
    /// No expectation or the expected result.
    pub fn matches(&self) -> bool {
        self.expect.is_none_or(|e| e == self.result)
    }
}

/// Checks problems one after another, each on a worker thread under a wall
/// clock limit.
pub struct Batch {
    cfg: EngineConfig,
    timeout: Duration,
    tracer: Tracer,
}

impl Batch {
    pub fn new(cfg: EngineConfig, timeout: Duration) -> Self {
        Self {
            cfg,
            timeout,
            tracer: Tracer::new(),
        }
    }

    pub fn add_tracer(&mut self, tracer: Box<dyn TracerIf>) {
        self.tracer.add_tracer(tracer);
    }

    pub fn check_one(&self, problem: &Problem) -> VerifyResult {
        let ob = match problem.obligation() {
            Ok(ob) => ob,
            Err(e) => {
                error!("{}: {e}", problem.name);
                return VerifyResult::Unknown;
            }
        };
        let interrupt = Interrupt::new();
        let (tx, rx) = mpsc::channel();
        let cfg = self.cfg.clone();
        let worker_interrupt = interrupt.clone();
        let worker = thread::spawn(move || {
            let mut verifier = Verifier::new(cfg, worker_interrupt);
            let _ = tx.send(verifier.check(&ob));
        });
        let res = match rx.recv_timeout(self.timeout) {
            Ok(Ok(res)) => res,
            Ok(Err(Error::Interrupted)) => VerifyResult::Timeout,
            Ok(Err(e)) => {
                warn!("{}: {e}", problem.name);
                VerifyResult::Unknown
            }
            Err(RecvTimeoutError::Timeout) => {
                interrupt.raise();
                VerifyResult::Timeout
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("worker of {} exited without a result", problem.name);
                VerifyResult::Unknown
            }
        };
        // the worker stops at its next query once interrupted
        let _ = worker.join();
        res
    }

    pub fn run(&mut self, problems: &[Problem]) -> Vec<Outcome> {
        let mut outcomes = Vec::with_capacity(problems.len());
        for p in problems {
            let start = Instant::now();
            let result = self.check_one(p);
            let time = start.elapsed();
            self.tracer.trace_res(&p.name, result);
            let outcome = Outcome {
                name: p.name.clone(),
                result,
                expect: p.expect,
                time,
            };
            if !outcome.matches() {
                warn!("{}: expected {:?}, got {result}", p.name, p.expect);
            }
            outcomes.push(outcome);
        }
        let matched = outcomes.iter().filter(|o| o.matches()).count();
        info!("{matched} of {} results as expected", outcomes.len());
        outcomes
    }
}
