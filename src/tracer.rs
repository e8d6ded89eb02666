use crate::verify::VerifyResult;
use log::{info, warn};
use std::{
    ops::Deref,
    sync::mpsc::{self, Receiver, Sender},
};

pub trait TracerIf: Sync + Send {
    /// Trace the result of the obligation `name`.
    fn trace_res(&mut self, _name: &str, _res: VerifyResult) {}
}

/// Sender part of channel tracer
pub struct ChannelTracerSx(Sender<(String, VerifyResult)>);

impl TracerIf for ChannelTracerSx {
    fn trace_res(&mut self, name: &str, res: VerifyResult) {
        let _ = self.0.send((name.to_string(), res));
    }
}

/// Receiver part of channel tracer
pub struct ChannelTracerRx(Receiver<(String, VerifyResult)>);

impl Deref for ChannelTracerRx {
    type Target = Receiver<(String, VerifyResult)>;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Create a channel tracer pair (sender, receiver)
pub fn channel_tracer() -> (ChannelTracerSx, ChannelTracerRx) {
    let (tx, rx) = mpsc::channel();
    (ChannelTracerSx(tx), ChannelTracerRx(rx))
}

#[derive(Default)]
pub struct Tracer {
    tracers: Vec<Box<dyn TracerIf>>,
}

impl Tracer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tracer(&mut self, tracer: Box<dyn TracerIf>) {
        self.tracers.push(tracer);
    }

    pub fn trace_res(&mut self, name: &str, res: VerifyResult) {
        for t in self.tracers.iter_mut() {
            t.trace_res(name, res);
        }
    }
}

pub struct LogTracer {
    name: String,
}

impl LogTracer {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
        }
    }
}

impl TracerIf for LogTracer {
    fn trace_res(&mut self, name: &str, res: VerifyResult) {
        match res {
            VerifyResult::Eq => info!("{} proved {name} equivalent", self.name),
            VerifyResult::Neq => info!("{} found a counterexample for {name}", self.name),
            VerifyResult::Unknown => info!("{} gave up on {name}", self.name),
            VerifyResult::Timeout => warn!("{} timed out on {name}", self.name),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fan_out_to_channel() {
        let (tx, rx) = channel_tracer();
        let mut tracer = Tracer::new();
        tracer.add_tracer(Box::new(LogTracer::new("test")));
        tracer.add_tracer(Box::new(tx));
        tracer.trace_res("q1", VerifyResult::Eq);
        tracer.trace_res("q2", VerifyResult::Timeout);
        let got: Vec<_> = rx.try_iter().collect();
        assert_eq!(
            got,
            vec![
                ("q1".to_string(), VerifyResult::Eq),
                ("q2".to_string(), VerifyResult::Timeout)
            ]
        );
    }
}
