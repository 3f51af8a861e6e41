//! Textual grammar format reader/writer (spec §6), a recursive-descent
//! parser in the same combinator style as the teacher's `parse_grammar.rs`,
//! generalized from feature-structure rules to LCFRS+DCP rules and
//! grounded in original `lcfrs.py`'s `read_LCFRS`/`read_lhs`/`read_arg` and
//! `dcp.py`'s term-parsing functions.
//!
//! ```text
//! [<weight>] <Nont>(<arg>;<arg>;…) -> <RhsNont> <RhsNont> …
//! :: <DcpRule>; <DcpRule>; …
//! ```
//! File encoding is iso-8859-1 on read, UTF-8 on write.

use regex::Regex;

use crate::error::{HybridGrammarError, Result};
use crate::grammar::Grammar;
use crate::symbols::{DcpIndex, DcpRule, DcpTerm, DcpTermOrRef, DcpVar, LcfrsElement, LcfrsVar};

type ParseResult<'a, T> = Result<(T, &'a str)>;

/// Initializes a regex once with `lazy_static!`, same helper as the
/// teacher's grammar-file parser.
macro_rules! regex_static {
  ($name:ident, $pattern:expr) => {
    lazy_static! {
      static ref $name: Regex = Regex::new($pattern).unwrap();
    }
  };
}

fn optional_re<'a>(re: &'static Regex, s: &'a str) -> (Option<&'a str>, &'a str) {
  if let Some(m) = re.find(s) {
    if m.start() > 0 {
      return (None, s);
    }
    (Some(m.as_str()), &s[m.end()..])
  } else {
    (None, s)
  }
}

fn needed_re<'a>(re: &'static Regex, s: &'a str) -> ParseResult<'a, &'a str> {
  match optional_re(re, s) {
    (Some(m), rest) => Ok((m, rest)),
    (None, _) => Err(HybridGrammarError::TextFormat(format!(
      "expected to match `{}` at `{}…`",
      re,
      &s[..s.len().min(20)]
    ))),
  }
}

fn optional_char(c: char, s: &str) -> (Option<char>, &str) {
  let mut chars = s.chars();
  match chars.next() {
    Some(c1) if c1 == c => (Some(c), chars.as_str()),
    _ => (None, s),
  }
}

fn needed_char(c: char, s: &str) -> ParseResult<'_, char> {
  match optional_char(c, s) {
    (Some(c), rest) => Ok((c, rest)),
    (None, _) => Err(HybridGrammarError::TextFormat(format!(
      "expected `{}` at `{}…`",
      c,
      &s[..s.len().min(20)]
    ))),
  }
}

fn skip_whitespace(s: &str) -> &str {
  regex_static!(WHITESPACE, r"\s+");
  optional_re(&WHITESPACE, s).1
}

fn parse_name(s: &str) -> ParseResult<'_, &str> {
  regex_static!(NAME, r"[A-Za-z0-9_\-+.']+");
  needed_re(&NAME, s)
}

fn parse_terminal(s: &str) -> ParseResult<'_, &str> {
  regex_static!(TERMINAL, r"[^\s;()<>]+");
  needed_re(&TERMINAL, s)
}

fn parse_int(s: &str) -> ParseResult<'_, i64> {
  regex_static!(INT, r"[0-9]+");
  let (digits, rest) = needed_re(&INT, s)?;
  let n: i64 = digits
    .parse()
    .map_err(|e| HybridGrammarError::TextFormat(format!("bad integer `{}`: {}", digits, e)))?;
  Ok((n, rest))
}

fn parse_weight(s: &str) -> ParseResult<'_, f64> {
  regex_static!(FLOAT, r"[0-9]*\.?[0-9]+([eE][-+]?[0-9]+)?");
  let (_, s) = needed_char('[', s)?;
  let s = skip_whitespace(s);
  let (digits, s) = needed_re(&FLOAT, s)?;
  let w: f64 = digits
    .parse()
    .map_err(|e| HybridGrammarError::TextFormat(format!("bad weight `{}`: {}", digits, e)))?;
  let s = skip_whitespace(s);
  let (_, s) = needed_char(']', s)?;
  Ok((w, s))
}

/// `<i,j>` LCFRS variable; both indices are always present.
fn parse_lcfrs_var(s: &str) -> ParseResult<'_, LcfrsVar> {
  let (_, s) = needed_char('<', s)?;
  let (mem, s) = parse_int(s)?;
  let (_, s) = needed_char(',', s)?;
  let (arg, s) = parse_int(s)?;
  let (_, s) = needed_char('>', s)?;
  Ok((LcfrsVar::new(mem as i32, arg as usize), s))
}

/// `<j>` (LHS attribute) or `<i,j>` (RHS member `i`'s attribute `j`).
fn parse_dcp_var(s: &str) -> ParseResult<'_, DcpVar> {
  let (_, s) = needed_char('<', s)?;
  let (n1, s) = parse_int(s)?;
  if let (Some(_), s) = optional_char(',', s) {
    let (n2, s) = parse_int(s)?;
    let (_, s) = needed_char('>', s)?;
    Ok((DcpVar::new(n1 as i32, n2 as usize), s))
  } else {
    let (_, s) = needed_char('>', s)?;
    Ok((DcpVar::new(-1, n1 as usize), s))
  }
}

fn parse_bracket_index(s: &str) -> ParseResult<'_, usize> {
  let (_, s) = needed_char('[', s)?;
  let (n, s) = parse_int(s)?;
  let (_, s) = needed_char(']', s)?;
  Ok((n as usize, s))
}

fn parse_term(s: &str) -> ParseResult<'_, DcpTermOrRef> {
  if s.starts_with('<') {
    let (v, s) = parse_dcp_var(s)?;
    return Ok((DcpTermOrRef::Var(v), s));
  }
  if s.starts_with('[') {
    let (idx, s) = parse_bracket_index(s)?;
    return if let (Some(_), s) = optional_char('(', s) {
      let (children, s) = parse_term_children(s)?;
      Ok((DcpTermOrRef::Term(DcpTerm::new(DcpIndex::new(idx, None), children)), s))
    } else {
      Ok((DcpTermOrRef::Index(DcpIndex::new(idx, None)), s))
    };
  }
  let (name, s) = parse_name(s)?;
  let (_, s) = needed_char('(', s)?;
  let (children, s) = parse_term_children(s)?;
  Ok((DcpTermOrRef::Term(DcpTerm::new(name, children)), s))
}

fn parse_term_children(s: &str) -> ParseResult<'_, Vec<DcpTermOrRef>> {
  let mut children = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), rest) = optional_char(')', rem) {
      return Ok((children, rest));
    }
    let (term, rest) = parse_term(rem)?;
    children.push(term);
    rem = rest;
  }
}

/// One argument tuple `(arg;arg;…)` of an LCFRS left-hand side.
fn parse_args(s: &str) -> ParseResult<'_, Vec<Vec<LcfrsElement>>> {
  let (_, mut rem) = needed_char('(', s)?;
  let mut args = Vec::new();
  let mut current = Vec::new();
  loop {
    rem = skip_whitespace(rem);
    if let (Some(_), rest) = optional_char(')', rem) {
      args.push(current);
      return Ok((args, rest));
    }
    if let (Some(_), rest) = optional_char(';', rem) {
      args.push(std::mem::take(&mut current));
      rem = rest;
      continue;
    }
    let (elem, rest) = if rem.starts_with('<') {
      let (v, rest) = parse_lcfrs_var(rem)?;
      (LcfrsElement::Var(v), rest)
    } else {
      let (t, rest) = parse_terminal(rem)?;
      (LcfrsElement::Terminal(t.to_string()), rest)
    };
    current.push(elem);
    rem = rest;
  }
}

fn parse_rhs_nonts(s: &str) -> (Vec<String>, &str) {
  let mut rhs_nonts = Vec::new();
  let mut rem = s;
  loop {
    let after_ws = skip_whitespace(rem);
    match parse_name(after_ws) {
      Ok((name, rest)) => {
        rhs_nonts.push(name.to_string());
        rem = rest;
      }
      Err(_) => return (rhs_nonts, after_ws),
    }
  }
}

/// `:: <DcpRule>; <DcpRule>; …`, the DCP rules following an LCFRS rule.
fn parse_dcp_rules(s: &str) -> ParseResult<'_, Vec<DcpRule>> {
  let mut rules = Vec::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    let (lhs, s) = parse_dcp_var(rem)?;
    let s = skip_whitespace(s);
    let (_, mut s) = needed_char('=', s)?;
    let mut rhs = Vec::new();
    loop {
      let after_ws = skip_whitespace(s);
      match parse_term(after_ws) {
        Ok((term, rest)) => {
          rhs.push(term);
          s = rest;
        }
        Err(_) => {
          s = after_ws;
          break;
        }
      }
    }
    rules.push(DcpRule::new(lhs, rhs));
    if let (Some(_), rest) = optional_char(';', s) {
      rem = rest;
    } else {
      return Ok((rules, s));
    }
  }
}

/// Parses one or more rule blocks and assembles them into a `Grammar`.
pub fn read_grammar_str(s: &str) -> Result<Grammar> {
  let mut grammar = Grammar::new();
  let mut rem = s;
  loop {
    rem = skip_whitespace(rem);
    if rem.is_empty() {
      break;
    }
    let (weight, r) = parse_weight(rem)?;
    let r = skip_whitespace(r);
    let (nont, r) = parse_name(r)?;
    let (args, r) = parse_args(r)?;
    let r = skip_whitespace(r);
    regex_static!(ARROW, "->");
    let (_, r) = needed_re(&ARROW, r)?;
    let (rhs_nonts, r) = parse_rhs_nonts(r);
    let after_ws = skip_whitespace(r);
    let (dcp, r) = if let Some(rest) = after_ws.strip_prefix("::") {
      parse_dcp_rules(rest)?
    } else {
      (Vec::new(), after_ws)
    };
    grammar.add_rule(nont, args, rhs_nonts, weight, dcp)?;
    rem = r;
  }
  Ok(grammar)
}

/// Decodes bytes as iso-8859-1 (every byte maps 1:1 to the identically
/// numbered Unicode scalar value) and parses the result.
pub fn read_grammar(bytes: &[u8]) -> Result<Grammar> {
  let text: String = bytes.iter().map(|&b| b as char).collect();
  read_grammar_str(&text)
}

pub fn read_grammar_file(path: impl AsRef<std::path::Path>) -> Result<Grammar> {
  let bytes = std::fs::read(path)?;
  read_grammar(&bytes)
}

/// Writes a grammar in the textual format, UTF-8 encoded.
pub fn write_grammar(grammar: &Grammar) -> String {
  grammar.to_string()
}

pub fn write_grammar_file(path: impl AsRef<std::path::Path>, grammar: &Grammar) -> Result<()> {
  std::fs::write(path, write_grammar(grammar))?;
  Ok(())
}
