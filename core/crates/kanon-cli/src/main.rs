//! Kanon CLI - assert atoms against the decision procedure
//!
//! `kanon check` reads a script of atoms (one per line, `#` comments),
//! asserts them in order and reports a verdict per atom; `kanon repl`
//! starts an interactive session. Exit codes: 0 ok, 1 syntax error,
//! 2 unsatisfiable input, 3 unknown.

mod repl;
mod syntax;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use kanon_core::{Context, Status};
use serde::Serialize;
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

const EXIT_OK: u8 = 0;
const EXIT_SYNTAX: u8 = 1;
const EXIT_UNSAT: u8 = 2;
#[allow(dead_code)]
const EXIT_UNKNOWN: u8 = 3;

#[derive(Parser)]
#[command(name = "kanon")]
#[command(version)]
#[command(about = "Decision procedure for quantifier-free combined theories")]
struct Cli {
    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human", global = true)]
    format: OutputFormat,

    /// Quiet mode: verdicts only, no banner
    #[arg(short = 'q', long = "quiet", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check a script of atoms (stdin if no file given)
    Check {
        /// Script file
        file: Option<PathBuf>,
    },
    /// Interactive shell
    Repl,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Human,
    Json,
}

#[derive(Serialize)]
struct ReportLine {
    line: usize,
    atom: String,
    verdict: String,
}

#[derive(Serialize)]
struct Report {
    results: Vec<ReportLine>,
    outcome: String,
    unsat_core: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("{} {:#}", "error:".red().bold(), err);
            ExitCode::from(EXIT_SYNTAX)
        }
    }
}

fn run(cli: Cli) -> Result<u8> {
    match cli.command {
        Commands::Check { file } => {
            let source = match &file {
                Some(path) => fs::read_to_string(path)
                    .with_context(|| format!("cannot read {}", path.display()))?,
                None => {
                    let mut buf = String::new();
                    std::io::stdin()
                        .read_to_string(&mut buf)
                        .context("cannot read stdin")?;
                    buf
                }
            };
            check(&source, cli.format, cli.quiet)
        }
        Commands::Repl => {
            repl::run(cli.quiet)?;
            Ok(EXIT_OK)
        }
    }
}

fn check(source: &str, format: OutputFormat, quiet: bool) -> Result<u8> {
    let mut ctx = Box::new(Context::empty());
    let mut results = Vec::new();
    let mut outcome = "sat".to_string();
    let mut core = Vec::new();
    let mut exit = EXIT_OK;

    for (idx, line) in source.lines().enumerate() {
        if syntax::is_blank(line) {
            continue;
        }
        let lineno = idx + 1;
        let atom = match syntax::parse_atom(line, &mut ctx) {
            Ok(atom) => atom,
            Err(err) => {
                if format == OutputFormat::Human {
                    eprintln!("{} line {}: {}", "error:".red().bold(), lineno, err);
                } else {
                    let report = Report {
                        results,
                        outcome: format!("syntax error at line {}: {}", lineno, err),
                        unsat_core: vec![],
                    };
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
                return Ok(EXIT_SYNTAX);
            }
        };
        let (verdict, next) = match ctx.add(&atom) {
            Status::Valid(_) => ("valid".to_string(), None),
            Status::Ok(next) => ("ok".to_string(), Some(next)),
            Status::Inconsistent(j) => {
                core = ctx
                    .unsat_core(&j)
                    .into_iter()
                    .map(|a| a.to_string())
                    .collect();
                core.push(atom.to_string());
                ("unsat".to_string(), None)
            }
        };
        if format == OutputFormat::Human && !quiet {
            let colored_verdict = match verdict.as_str() {
                "valid" => "valid".blue(),
                "ok" => "ok".green(),
                _ => "unsat".red().bold(),
            };
            println!("{:>4}  {}  {}", lineno, colored_verdict, atom);
        }
        let unsat = verdict == "unsat";
        results.push(ReportLine {
            line: lineno,
            atom: atom.to_string(),
            verdict,
        });
        if let Some(next) = next {
            ctx = next;
        }
        if unsat {
            outcome = "unsat".to_string();
            exit = EXIT_UNSAT;
            break;
        }
    }

    match format {
        OutputFormat::Human => {
            if exit == EXIT_UNSAT {
                println!("{}", "unsatisfiable".red().bold());
                if !core.is_empty() {
                    println!("core:");
                    for a in &core {
                        println!("  {}", a);
                    }
                }
            } else if !quiet {
                println!("{}", "ok".green());
            }
        }
        OutputFormat::Json => {
            let report = Report {
                results,
                outcome,
                unsat_core: core,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(exit)
}
