use super::{Domain, Var};
use std::collections::BTreeSet;

/// Fresh name source. Every generated name starts with `$`, which the
/// parser never accepts, so generated names cannot clash with user names.
/// The id follows the last `#`, so two generated names never coincide.
#[derive(Debug, Default)]
pub struct NameGen {
    next: u64,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, base: &str) -> String {
        let n = self.next_id();
        let base = base.trim_start_matches('$');
        let base = base.split('#').next().unwrap_or_default();
        format!("${base}#{n}")
    }

    pub fn fresh_var(&mut self, base: &str, domain: Domain) -> Var {
        Var::new(self.fresh(base), domain)
    }

    #[inline]
    pub fn next_id(&mut self) -> u64 {
        let n = self.next;
        self.next += 1;
        n
    }
}

/// Variable roles of one obligation.
#[derive(Clone, Debug, Default)]
pub struct Scope {
    pub params: BTreeSet<String>,
    pub important: BTreeSet<String>,
}

impl Scope {
    pub fn new<P, I>(params: P, important: I) -> Self
    where
        P: IntoIterator,
        P::Item: ToString,
        I: IntoIterator,
        I::Item: ToString,
    {
        Self {
            params: params.into_iter().map(|p| p.to_string()).collect(),
            important: important.into_iter().map(|i| i.to_string()).collect(),
        }
    }

    #[inline]
    pub fn is_param(&self, name: &str) -> bool {
        self.params.contains(name)
    }

    #[inline]
    pub fn is_important(&self, name: &str) -> bool {
        self.important.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_ending_in_digit_does_not_alias_id() {
        let mut names = NameGen::new();
        let renamed = names.fresh_var("rule1", Domain::Int);
        for _ in 0..9 {
            names.next_id();
        }
        let lambda = names.fresh_var("rule", Domain::Nat);
        assert_eq!(renamed.name(), "$rule1#0");
        assert_eq!(lambda.name(), "$rule#10");
        assert_ne!(renamed.name(), lambda.name());
    }

    #[test]
    fn renaming_a_fresh_name_keeps_one_id() {
        let mut names = NameGen::new();
        let a = names.fresh("w");
        let b = names.fresh(&a);
        assert_eq!(b, "$w#1");
    }
}
