use clap::Parser;
use liastar::{
    batch::{self, Batch},
    config::Config,
    tracer::LogTracer,
};
use log::{error, info};
use std::{env, process::exit};

fn main() -> anyhow::Result<()> {
    if env::var("RUST_LOG").is_err() {
        unsafe { env::set_var("RUST_LOG", "info") };
    }
    env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .format_target(false)
        .init();
    let cfg = Config::parse();
    let _ = ctrlc::set_handler(|| exit(124));
    let mut problems = batch::load(&cfg.problems)?;
    info!("loaded {} problems from {}", problems.len(), cfg.problems.display());
    if let Some(only) = &cfg.only {
        problems.retain(|p| &p.name == only);
        if problems.is_empty() {
            error!("no problem named {only}");
            exit(1);
        }
    }
    let mut batch = Batch::new(cfg.engine.clone(), cfg.pair_timeout());
    batch.add_tracer(Box::new(LogTracer::new("liastar")));
    let outcomes = batch.run(&problems);
    for o in outcomes.iter() {
        println!("{}: {}", o.name, o.result);
    }
    exit(if outcomes.iter().all(|o| o.matches()) { 0 } else { 1 })
}
