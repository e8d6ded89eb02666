use super::*;
use std::collections::BTreeSet;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unexpected end of input")]
    Eof,
    #[error("unexpected '{0}' at offset {1}")]
    Unexpected(String, usize),
    #[error("unknown operator '{0}'")]
    UnknownOp(String),
    #[error("'{op}' expects {expected} arguments, found {found}")]
    Arity {
        op: String,
        expected: &'static str,
        found: usize,
    },
    #[error("'{0}' is applied to an argument of the wrong sort")]
    Sort(String),
    #[error("multiplication in '{0}' is not linear")]
    Nonlinear(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Open,
    Close,
    Atom(String),
}

fn tokenize(src: &str) -> Vec<(Token, usize)> {
    let mut tokens = Vec::new();
    let mut chars = src.char_indices().peekable();
    while let Some(&(i, c)) = chars.peek() {
        match c {
            '(' => {
                tokens.push((Token::Open, i));
                chars.next();
            }
            ')' => {
                tokens.push((Token::Close, i));
                chars.next();
            }
            ';' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let mut atom = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_whitespace() || c == '(' || c == ')' || c == ';' {
                        break;
                    }
                    atom.push(c);
                    chars.next();
                }
                tokens.push((Token::Atom(atom), i));
            }
        }
    }
    tokens
}

struct Parser<'a> {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    nat: &'a BTreeSet<String>,
}

impl Parser<'_> {
    fn next(&mut self) -> Result<(Token, usize), ParseError> {
        let t = self.tokens.get(self.pos).cloned().ok_or(ParseError::Eof)?;
        self.pos += 1;
        Ok(t)
    }

    fn peek_close(&self) -> bool {
        matches!(self.tokens.get(self.pos), Some((Token::Close, _)))
    }

    fn var(&self, name: &str, at: usize) -> Result<Var, ParseError> {
        let valid = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '\'' | '#'));
        if !valid {
            return Err(ParseError::Unexpected(name.to_string(), at));
        }
        let domain = if self.nat.contains(name) {
            Domain::Nat
        } else {
            Domain::Int
        };
        Ok(Var::new(name, domain))
    }

    fn var_list(&mut self) -> Result<Vec<Var>, ParseError> {
        match self.next()? {
            (Token::Open, _) => (),
            (Token::Close, at) => return Err(ParseError::Unexpected(")".into(), at)),
            (Token::Atom(a), at) => return Err(ParseError::Unexpected(a, at)),
        }
        let mut vars = Vec::new();
        loop {
            match self.next()? {
                (Token::Close, _) => return Ok(vars),
                (Token::Atom(a), at) => vars.push(self.var(&a, at)?),
                (Token::Open, at) => return Err(ParseError::Unexpected("(".into(), at)),
            }
        }
    }

    fn expr(&mut self) -> Result<Formula, ParseError> {
        match self.next()? {
            (Token::Close, at) => Err(ParseError::Unexpected(")".into(), at)),
            (Token::Atom(a), at) => {
                if let Ok(c) = a.parse::<i64>() {
                    return Ok(mk_int(c));
                }
                match a.as_str() {
                    "true" => Ok(mk_true()),
                    "false" => Ok(mk_false()),
                    _ => Ok(mk_var(&self.var(&a, at)?)),
                }
            }
            (Token::Open, _) => {
                let (op, at) = match self.next()? {
                    (Token::Atom(op), at) => (op, at),
                    (Token::Open, at) => return Err(ParseError::Unexpected("(".into(), at)),
                    (Token::Close, at) => return Err(ParseError::Unexpected(")".into(), at)),
                };
                let f = match op.as_str() {
                    "iterate" => {
                        let out = self.var_list()?;
                        let step = self.var_list()?;
                        if out.len() > step.len() {
                            return Err(ParseError::Arity {
                                op: op.clone(),
                                expected: "no more outputs than step variables",
                                found: out.len(),
                            });
                        }
                        let body = self.expr()?;
                        check_sort(&op, &body, Sort::Bool)?;
                        mk_iterate(&out, &step, &body)
                    }
                    "exists" | "forall" => {
                        let vars = self.var_list()?;
                        let body = self.expr()?;
                        check_sort(&op, &body, Sort::Bool)?;
                        if op == "exists" {
                            mk_exists(&vars, &body)
                        } else {
                            mk_forall(&vars, &body)
                        }
                    }
                    _ => {
                        let mut args = Vec::new();
                        while !self.peek_close() {
                            args.push(self.expr()?);
                        }
                        apply(&op, args)?
                    }
                };
                match self.next()? {
                    (Token::Close, _) => Ok(f),
                    (_, p) => Err(ParseError::Unexpected(format!("argument of '{op}'"), p.max(at))),
                }
            }
        }
    }
}

fn check_sort(op: &str, f: &Formula, sort: Sort) -> Result<(), ParseError> {
    if f.sort() == sort {
        Ok(())
    } else {
        Err(ParseError::Sort(op.to_string()))
    }
}

fn arity(op: &str, args: &[Formula], n: usize) -> Result<(), ParseError> {
    if args.len() == n {
        return Ok(());
    }
    let expected = match n {
        1 => "1",
        2 => "2",
        _ => "3",
    };
    Err(ParseError::Arity {
        op: op.to_string(),
        expected,
        found: args.len(),
    })
}

fn apply(op: &str, args: Vec<Formula>) -> Result<Formula, ParseError> {
    let sorts = |s: Sort| args.iter().try_for_each(|a| check_sort(op, a, s));
    Ok(match op {
        "and" | "or" => {
            sorts(Sort::Bool)?;
            if op == "and" { mk_and(args) } else { mk_or(args) }
        }
        "not" => {
            arity(op, &args, 1)?;
            sorts(Sort::Bool)?;
            mk_not(&args[0])
        }
        "star" => {
            arity(op, &args, 1)?;
            args[0].mark_star()
        }
        "=>" => {
            arity(op, &args, 2)?;
            sorts(Sort::Bool)?;
            mk_implies(&args[0], &args[1])
        }
        "=" | "<=" | "<" | ">=" | ">" => {
            arity(op, &args, 2)?;
            sorts(Sort::Int)?;
            let (a, b) = (&args[0], &args[1]);
            match op {
                "=" => mk_eq(a, b),
                "<=" => mk_le(a, b),
                "<" => mk_lt(a, b),
                ">=" => mk_ge(a, b),
                _ => mk_gt(a, b),
            }
        }
        "+" => {
            if args.is_empty() {
                return Err(ParseError::Arity {
                    op: op.to_string(),
                    expected: "at least 1",
                    found: 0,
                });
            }
            sorts(Sort::Int)?;
            mk_add(args)
        }
        "-" => {
            sorts(Sort::Int)?;
            match args.len() {
                1 => mk_neg(&args[0]),
                2 => mk_sub(&args[0], &args[1]),
                found => {
                    return Err(ParseError::Arity {
                        op: op.to_string(),
                        expected: "1 or 2",
                        found,
                    });
                }
            }
        }
        "*" => {
            arity(op, &args, 2)?;
            sorts(Sort::Int)?;
            match (args[0].as_int(), args[1].as_int()) {
                (Some(k), _) => mk_scale(k, &args[1]),
                (None, Some(k)) => mk_scale(k, &args[0]),
                _ => return Err(ParseError::Nonlinear(op.to_string())),
            }
        }
        "ite" => {
            arity(op, &args, 3)?;
            check_sort(op, &args[0], Sort::Bool)?;
            if args[1].sort() != args[2].sort() {
                return Err(ParseError::Sort(op.to_string()));
            }
            mk_ite(&args[0], &args[1], &args[2])
        }
        _ => return Err(ParseError::UnknownOp(op.to_string())),
    })
}

/// Parses the s-expression syntax produced by `Display`. Variables whose
/// names are in `nat` range over the naturals.
pub fn parse(src: &str, nat: &BTreeSet<String>) -> Result<Formula, ParseError> {
    let mut parser = Parser {
        tokens: tokenize(src),
        pos: 0,
        nat,
    };
    let f = parser.expr()?;
    if let Some((t, at)) = parser.tokens.get(parser.pos) {
        let t = match t {
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
            Token::Atom(a) => a.clone(),
        };
        return Err(ParseError::Unexpected(t, *at));
    }
    Ok(f)
}
