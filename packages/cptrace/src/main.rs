//! cptrace CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use cptrace::analysis::{data_structure_kind, FileAnalysis};
use cptrace::config::{self, ConfigOverrides, TraceConfig};
use cptrace::instrument::instrument;
use cptrace::judge::{load_cases, StressReport, TestResult};
use cptrace::logging::{RunLogEntry, RunLogger};
use cptrace::reconstruct::{EventKind, Trace};
use cptrace::session::{RunReport, Session, Speed};
use cptrace::{analyze_files_parallel, collect_python_files};
use std::path::PathBuf;
use std::process::ExitCode;
use tabled::builder::Builder;

#[derive(Parser, Debug)]
#[command(name = "cptrace")]
#[command(version, about = "Trace loops, conditions and recursion in Python programs")]
struct Cli {
    /// Configuration file (defaults to cptrace.toml or pyproject.toml discovery)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ignore configuration files
    #[arg(long, global = true)]
    no_config: bool,

    /// Append a JSON Lines record of each invocation to this file
    #[arg(long, global = true)]
    log_file: Option<String>,

    /// Show verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a program and show its trace
    Run {
        /// Python source file
        file: PathBuf,

        /// File fed to the program's standard input
        #[arg(long)]
        stdin: Option<PathBuf>,

        /// Emit the run report as JSON
        #[arg(long)]
        json: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,

        /// History entries kept per variable
        #[arg(long)]
        history_cap: Option<usize>,
    },

    /// Check a program against sample cases, or stress it with random inputs
    Test {
        /// Python source file
        file: PathBuf,

        /// TOML file with a [[cases]] array of input/expected pairs
        #[arg(long)]
        cases: Option<PathBuf>,

        /// Run random array inputs, optionally setting how many
        #[arg(long, num_args = 0..=1, default_missing_value = "0")]
        stress: Option<usize>,

        /// Trusted program whose output stress runs are compared against
        #[arg(long)]
        reference: Option<PathBuf>,

        /// Seed for the stress input generator
        #[arg(long)]
        seed: Option<u64>,

        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the instrumented source of a program
    Instrument {
        file: PathBuf,
    },

    /// Estimate complexity and detect variables
    Analyze {
        /// Files or directories to analyze
        #[arg(default_value = ".")]
        paths: Vec<String>,

        /// Exclude paths matching patterns
        #[arg(long, value_delimiter = ',')]
        exclude: Vec<String>,

        /// Emit results as JSON
        #[arg(long)]
        json: bool,
    },
}

fn load_config(cli: &Cli, overrides: &ConfigOverrides) -> Result<TraceConfig> {
    let loaded = if cli.no_config {
        None
    } else {
        config::load_config(cli.config.as_deref()).context("failed to load configuration")?
    };
    let config = loaded.unwrap_or_default().apply(overrides);
    if cli.verbose {
        eprintln!("Configuration: {:?}", config);
    }
    Ok(config)
}

fn open_logger(cli: &Cli) -> Option<RunLogger> {
    let path = cli.log_file.as_deref()?;
    match RunLogger::new(path) {
        Ok(logger) => Some(logger),
        Err(e) => {
            log::warn!("cannot open log file {}: {}", path, e);
            None
        }
    }
}

fn write_log(logger: Option<RunLogger>, entry: &RunLogEntry) {
    if let Some(mut logger) = logger {
        if let Err(e) = logger.log(entry) {
            log::warn!("failed to write {}: {}", logger.log_path(), e);
        }
    }
}

fn read_source(path: &std::path::Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default())
        .format_timestamp(None)
        .try_init()
        .ok();

    let cli = Cli::parse();
    match dispatch(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::from(2)
        }
    }
}

fn dispatch(cli: &Cli) -> Result<ExitCode> {
    match &cli.command {
        Commands::Run {
            file,
            stdin,
            json,
            pretty,
            history_cap,
        } => {
            let overrides = ConfigOverrides {
                history_cap: *history_cap,
                ..ConfigOverrides::default()
            };
            let config = load_config(cli, &overrides)?;
            let source = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
            let input = match stdin {
                Some(path) => {
                    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
                }
                None => String::new(),
            };

            let session = Session::new(config);
            let report = session.run(&source, &input);
            let path = file.to_string_lossy().to_string();
            write_log(open_logger(cli), &RunLogEntry::from_report(&path, &report));

            if *json {
                let text = if *pretty {
                    serde_json::to_string_pretty(&report)?
                } else {
                    serde_json::to_string(&report)?
                };
                println!("{}", text);
            } else {
                print_report(&report, cli.verbose);
            }

            Ok(if report.outcome.error.is_some() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Test {
            file,
            cases,
            stress,
            reference,
            seed,
            json,
        } => {
            if cases.is_none() && stress.is_none() {
                anyhow::bail!("nothing to do: pass --cases, --stress, or both");
            }
            let overrides = ConfigOverrides {
                stress_iterations: stress.filter(|n| *n > 0),
                ..ConfigOverrides::default()
            };
            let config = load_config(cli, &overrides)?;
            let source = read_source(file)?;
            let reference = reference.as_deref().map(read_source).transpose()?;
            let session = Session::new(config);

            let results = match cases {
                Some(path) => {
                    let cases = load_cases(path).with_context(|| format!("cannot load cases from {}", path.display()))?;
                    session.run_tests(&source, &cases)
                }
                None => Vec::new(),
            };
            let stress_report = stress.map(|_| {
                let iterations = session.config().stress_iterations;
                session.stress(&source, reference.as_deref(), iterations, *seed)
            });

            let failures = results.iter().filter(|r| !r.passed()).count()
                + stress_report.as_ref().map_or(0, |report| report.failed);
            let path = file.to_string_lossy().to_string();
            write_log(open_logger(cli), &RunLogEntry::from_tests(&path, session.backend(), failures));

            if *json {
                let value = serde_json::json!({ "cases": results, "stress": stress_report });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_results(&results, cli.verbose);
                if let Some(report) = &stress_report {
                    print_stress(report);
                }
            }

            Ok(if failures > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }

        Commands::Instrument { file } => {
            let source = std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
            let program = instrument(&source).with_context(|| format!("cannot instrument {}", file.display()))?;
            if cli.verbose {
                eprintln!(
                    "{} loop site(s), {} condition site(s)",
                    program.loop_sites, program.condition_sites
                );
            }
            print!("{}", program.source);
            Ok(ExitCode::SUCCESS)
        }

        Commands::Analyze { paths, exclude, json } => {
            let overrides = ConfigOverrides {
                exclude: exclude.clone(),
                ..ConfigOverrides::default()
            };
            let config = load_config(cli, &overrides)?;
            let files = collect_python_files(paths, &config.exclude);
            if cli.verbose {
                eprintln!("Found {} Python files", files.len());
            }
            if files.is_empty() {
                eprintln!("No Python files found");
                return Ok(ExitCode::SUCCESS);
            }

            let results = analyze_files_parallel(&files);
            let failures = results.iter().filter(|r| r.error.is_some()).count();
            let scanned: Vec<String> = results.iter().map(|r| r.file_path.clone()).collect();
            write_log(open_logger(cli), &RunLogEntry::from_analysis(&scanned, failures));

            if *json {
                let analyses: Vec<&FileAnalysis> = results.iter().filter_map(|r| r.analysis.as_ref()).collect();
                println!("{}", serde_json::to_string_pretty(&analyses)?);
            } else {
                for analysis in results.iter().filter_map(|r| r.analysis.as_ref()) {
                    print_analysis(analysis, cli.verbose);
                }
            }
            for result in &results {
                if let Some(error) = &result.error {
                    eprintln!("{} {}: {}", "error:".red().bold(), result.file_path, error);
                }
            }

            Ok(if failures > 0 {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn print_report(report: &RunReport, verbose: bool) {
    print!("{}", report.outcome.stdout);
    if let Some(error) = &report.outcome.error {
        eprintln!("{}", error.red());
    }

    let elapsed = format!("{}ms", report.elapsed_ms);
    let elapsed = match report.speed {
        Speed::Fast => elapsed.green(),
        Speed::Medium => elapsed.yellow(),
        Speed::Slow => elapsed.red(),
    };
    eprintln!("\n{} {} ({})", "time".dimmed(), elapsed, report.backend);

    if !report.outcome.globals.is_empty() {
        eprintln!("\n{}", "Variables".bold());
        for global in &report.outcome.globals {
            let kind = data_structure_kind(&global.name, &global.value)
                .map(|k| format!(" [{}]", k.label()))
                .unwrap_or_default();
            eprintln!("  {} {} = {}{}", global.type_name.dimmed(), global.name.cyan(), global.value, kind);
        }
    }

    match (&report.trace, &report.trace_skipped) {
        (Some(trace), _) => {
            if let Some(error) = &report.trace_error {
                eprintln!("\n{} {}", "trace is partial:".yellow(), error);
            }
            print_trace(trace, verbose);
        }
        (None, Some(reason)) => eprintln!("\n{} {}", "trace skipped:".yellow(), reason),
        (None, None) => {}
    }
}

fn print_trace(trace: &Trace, verbose: bool) {
    for (site, table) in &trace.loops {
        let label = match &table.loop_var {
            Some(var) => format!("{} in {}", var, table.range),
            None => table.range.clone(),
        };
        eprintln!("\n{} {}", format!("Loop #{}", site).bold(), label.dimmed());
        let mut builder = Builder::default();
        builder.push_record(table.columns.iter().cloned());
        for row in &table.rows {
            builder.push_record(table.columns.iter().map(|column| {
                let value = row.values.get(column).cloned().unwrap_or_default();
                match row.exprs.as_ref().and_then(|e| e.get(column)) {
                    Some(expr) if verbose => expr.clone(),
                    _ => value,
                }
            }));
        }
        eprintln!("{}", builder.build());
    }

    for condition in trace.conditions.values() {
        eprintln!(
            "\n{} {}: {}",
            format!("Line {}", condition.line).bold(),
            condition.source.cyan(),
            condition.history.summary()
        );
    }

    if !trace.events.is_empty() {
        eprintln!("\n{} ({} calls)", "Calls".bold(), trace.recursion.len());
        for event in &trace.events {
            let indent = "  ".repeat(event.depth + 1);
            match event.kind {
                EventKind::Enter => eprintln!("{}{} {}({})", indent, "→".green(), event.func, event.detail),
                EventKind::Exit => eprintln!("{}{} {} = {}", indent, "←".blue(), event.func, event.detail),
            }
        }
    }

    if verbose {
        for (name, history) in &trace.history {
            eprintln!("  {} {}", name.cyan(), history.summary());
        }
    }
}

fn print_results(results: &[TestResult], verbose: bool) {
    if results.is_empty() {
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(["case", "status", "time", "expected", "actual"]);
    for result in results {
        let status = if result.passed() {
            "PASS".green().to_string()
        } else {
            "FAIL".red().bold().to_string()
        };
        let shown = |text: &str| {
            if verbose || text.len() <= 40 {
                text.to_string()
            } else {
                format!("{}…", text.chars().take(40).collect::<String>())
            }
        };
        builder.push_record([
            result.name.clone(),
            status,
            format!("{}ms", result.elapsed_ms),
            shown(&result.expected),
            shown(&result.actual),
        ]);
    }
    println!("{}", builder.build());
    let passed = results.iter().filter(|r| r.passed()).count();
    println!("{}/{} passed", passed, results.len());
}

fn print_stress(report: &StressReport) {
    let summary = format!("{} passed, {} failed", report.passed, report.failed);
    let summary = if report.failed == 0 {
        summary.green()
    } else {
        summary.red()
    };
    println!(
        "\n{} {} random inputs (seed {}): {}",
        "stress".bold(),
        report.iterations,
        report.seed,
        summary
    );
    if let Some(failure) = &report.first_failure {
        println!("{}", "first failing input:".yellow());
        println!("{}", failure.input);
        println!("{} {}", "got:".dimmed(), failure.actual);
        if let Some(expected) = &failure.expected {
            println!("{} {}", "expected:".dimmed(), expected);
        }
    }
}

fn print_analysis(analysis: &FileAnalysis, verbose: bool) {
    let report = &analysis.complexity;
    println!(
        "{}: time {} space {} (loop depth {})",
        analysis.path.bold(),
        report.time.yellow(),
        report.space.yellow(),
        report.loop_depth
    );
    for finding in &report.findings {
        println!("  {} {}", format!("line {}:", finding.line).dimmed(), finding.message);
    }
    if !analysis.variables.is_empty() {
        let vars: Vec<String> = analysis
            .variables
            .iter()
            .map(|v| format!("{} {}", v.var_type.icon(), v.name))
            .collect();
        println!("  {} {}", "variables:".dimmed(), vars.join(", "));
    }
    if verbose {
        for cost in &analysis.line_costs {
            println!("  {:>5} | {:>2} | {}", cost.time.to_string(), cost.space.to_string(), cost.line);
        }
    }
}
