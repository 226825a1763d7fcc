//! Interactive shell
//!
//! Reads one command per line. A bare atom is asserted; `valid` and
//! `unsat` query without changing the context; `show` dumps the
//! canonical state; `core` prints the last unsatisfiable core; `reset`
//! starts over.

use anyhow::Result;
use colored::Colorize;
use kanon_core::{Context, Status};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::syntax;

const HELP: &str = "\
commands:
  <atom>           assert an atom (e.g. x = y, f(x) <> z, x in [0, 1])
  assert <atom>    same as a bare atom
  valid <atom>     is the atom entailed?
  unsat <atom>     does the atom contradict the context?
  show             dump the canonical state
  core             print the last unsatisfiable core
  reset            drop all assertions
  help             this text
  quit             leave";

pub fn run(quiet: bool) -> Result<()> {
    if !quiet {
        println!("kanon shell, 'help' for commands");
    }
    let mut editor = DefaultEditor::new()?;
    let mut ctx = Box::new(Context::empty());
    let mut last_core: Vec<String> = Vec::new();

    loop {
        match editor.readline("kanon> ") {
            Ok(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(&line);
                match line.as_str() {
                    "quit" | "exit" => break,
                    "help" => println!("{}", HELP),
                    "show" => print!("{}", ctx.show()),
                    "reset" => {
                        ctx = Box::new(Context::empty());
                        last_core.clear();
                        println!("{}", "reset".green());
                    }
                    "core" => {
                        if last_core.is_empty() {
                            println!("no unsatisfiable core recorded");
                        } else {
                            for a in &last_core {
                                println!("  {}", a);
                            }
                        }
                    }
                    _ => {
                        let (cmd, rest) = split_command(&line);
                        match cmd {
                            "valid" => query(&mut ctx, rest, QueryKind::Valid),
                            "unsat" => query(&mut ctx, rest, QueryKind::Unsat),
                            "assert" => assert_atom(&mut ctx, rest, &mut last_core),
                            _ => assert_atom(&mut ctx, &line, &mut last_core),
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("{} {}", "error:".red().bold(), err);
                break;
            }
        }
    }
    Ok(())
}

enum QueryKind {
    Valid,
    Unsat,
}

fn split_command(line: &str) -> (&str, &str) {
    match line.split_once(char::is_whitespace) {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    }
}

fn assert_atom(ctx: &mut Box<Context>, input: &str, last_core: &mut Vec<String>) {
    let atom = match syntax::parse_atom(input, ctx) {
        Ok(atom) => atom,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return;
        }
    };
    match ctx.add(&atom) {
        Status::Valid(_) => println!("{}", "valid".blue()),
        Status::Ok(next) => {
            *ctx = next;
            println!("{}", "ok".green());
        }
        Status::Inconsistent(j) => {
            *last_core = ctx
                .unsat_core(&j)
                .into_iter()
                .map(|a| a.to_string())
                .collect();
            last_core.push(atom.to_string());
            println!("{}", "unsat".red().bold());
        }
    }
}

fn query(ctx: &mut Box<Context>, input: &str, kind: QueryKind) {
    if input.is_empty() {
        eprintln!("{} missing atom", "error:".red().bold());
        return;
    }
    let atom = match syntax::parse_atom(input, ctx) {
        Ok(atom) => atom,
        Err(err) => {
            eprintln!("{} {}", "error:".red().bold(), err);
            return;
        }
    };
    let answer = match kind {
        QueryKind::Valid => ctx.is_valid(&atom),
        QueryKind::Unsat => ctx.is_inconsistent(&atom),
    };
    if answer {
        println!("{}", "yes".green());
    } else {
        println!("no");
    }
}
