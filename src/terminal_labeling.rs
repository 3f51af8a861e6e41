//! Terminal-labeling strategies consumed by the inducer and the parser's
//! input preparation (spec §6 "Terminal-labeling contract"), grounded in
//! the original `grammar/induction/terminal_labeling.py`.

use crate::tree::Token;

/// Maps a token to the terminal label used in the induced grammar. An
/// optional backoff mode swaps to a lower-resolution label for the same
/// token stream.
pub trait TerminalLabeling {
  fn token_label(&self, token: &Token) -> String;

  fn prepare_parser_input(&self, tokens: &[Token]) -> Vec<String> {
    tokens.iter().map(|t| self.token_label(t)).collect()
  }
}

/// Labels by surface form.
pub struct FormTerminals;

impl TerminalLabeling for FormTerminals {
  fn token_label(&self, token: &Token) -> String {
    token.form.clone()
  }
}

/// Labels by part-of-speech / category.
pub struct PosTerminals;

impl TerminalLabeling for PosTerminals {
  fn token_label(&self, token: &Token) -> String {
    token.pos.clone()
  }
}

/// Labels by `form-:-pos`, replacing the form with `unk` when the pair's
/// corpus frequency is below `threshold` (mirrors `FormPosTerminalsUnk`).
pub struct FormPosTerminals {
  counts: std::collections::HashMap<(String, String), usize>,
  threshold: usize,
  unk: String,
}

impl FormPosTerminals {
  pub fn new<'a>(trees: impl IntoIterator<Item = &'a [Token]>, threshold: usize) -> Self {
    let mut counts = std::collections::HashMap::new();
    for tokens in trees {
      for t in tokens {
        *counts
          .entry((t.form.to_lowercase(), t.pos.clone()))
          .or_insert(0) += 1;
      }
    }
    Self {
      counts,
      threshold,
      unk: "UNKNOWN".to_string(),
    }
  }
}

impl TerminalLabeling for FormPosTerminals {
  fn token_label(&self, token: &Token) -> String {
    let form = token.form.to_lowercase();
    let count = self
      .counts
      .get(&(form.clone(), token.pos.clone()))
      .copied()
      .unwrap_or(0);
    let form = if count < self.threshold {
      self.unk.clone()
    } else {
      form
    };
    format!("{}-:-{}", form, token.pos)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn form_and_pos_labeling() {
    let tok = Token::new("Piet", "N");
    assert_eq!(FormTerminals.token_label(&tok), "Piet");
    assert_eq!(PosTerminals.token_label(&tok), "N");
  }

  #[test]
  fn form_pos_unks_below_threshold() {
    let common = vec![Token::new("cat", "N"), Token::new("cat", "N")];
    let labeling = FormPosTerminals::new(std::iter::once(common.as_slice()), 2);
    assert_eq!(labeling.token_label(&Token::new("cat", "N")), "cat-:-N");
    assert_eq!(
      labeling.token_label(&Token::new("dog", "N")),
      "UNKNOWN-:-N"
    );
  }
}
