use std::env;
use std::io;
use std::io::Write;
use std::process;

use hybridgram::{evaluate_derivation, read_grammar_file, ChartParser, Grammar, HybridGrammarError, Result, Token};

fn usage(prog_name: &str) -> String {
  format!(
    r"
Usage: {} FILE [options]

Options:
  -h, --help    Print this message
  -w, --weight  Print the best derivation's weight (defaults to not printing)
  -n, --no-tree Don't print the evaluated hybrid tree (defaults to printing)",
    prog_name
  )
}

fn parse(g: &Grammar, sentence: &str, print_weight: bool, print_tree: bool) -> Result<()> {
  let words: Vec<String> = sentence.split_whitespace().map(str::to_string).collect();
  if words.is_empty() {
    return Ok(());
  }

  let parser = ChartParser::new(g, words.clone());

  if !parser.recognized() {
    println!("no parse");
    return Ok(());
  }

  if print_weight {
    println!("weight: {}", parser.best_weight().unwrap_or(f64::INFINITY));
  }

  let derivation = parser
    .best_derivation()
    .ok_or_else(|| HybridGrammarError::EvaluationFailure("recognized input has no best derivation".into()))?;

  if print_tree {
    let tokens: Vec<Token> = words.iter().map(|w| Token::new(w.clone(), String::new())).collect();
    match evaluate_derivation(g, &derivation, &tokens) {
      Ok(tree) => {
        for node in &tree.top_level {
          println!("{}", node);
        }
        if !tree.disconnected_leaves().is_empty() {
          println!("disconnected: {:?}", tree.disconnected_leaves());
        }
      }
      Err(e) => println!("evaluation failed: {}", e),
    }
  }

  Ok(())
}

fn main() -> Result<()> {
  let opts: Vec<String> = env::args().collect();
  let prog_name = opts[0].clone();

  if opts.len() < 2 {
    println!("{}", usage(&prog_name));
    process::exit(1);
  }

  let mut opts = opts.into_iter().skip(1);
  let filename = opts.next().unwrap();

  let mut print_tree = true;
  let mut print_weight = false;
  for o in opts {
    if o == "-h" || o == "--help" {
      println!("{}", usage(&prog_name));
      process::exit(0);
    } else if o == "-n" || o == "--no-tree" {
      print_tree = false;
    } else if o == "-w" || o == "--weight" {
      print_weight = true;
    }
  }

  let g: Grammar = read_grammar_file(&filename)?;

  let mut input = String::new();
  loop {
    print!("> ");
    io::stdout().flush()?;

    input.clear();
    match io::stdin().read_line(&mut input) {
      Ok(0) => return Ok(()), // ctrl+d
      Ok(_) => parse(&g, input.trim(), print_weight, print_tree)?,
      Err(error) => return Err(error.into()),
    }
  }
}
