// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lumen - bytecode emitter CLI
//!
//! Reads a program as a JSON AST, compiles it and prints the bytecode,
//! source notes, try notes and arena statistics.

mod cli;

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use lumen_engine::ast::Program;
use lumen_engine::{CollectingReporter, CompileOptions, CompiledProgram, Compiler, Diagnostic, LanguageVersion, Script};
use owo_colors::OwoColorize;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cli::{Cli, Commands, CompileArgs, EmitArgs};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    if cli.no_color {
        owo_colors::set_override(false);
    }

    let result = match &cli.command {
        Commands::Emit(args) => run_emit(&cli.compile, args),
        Commands::Options => run_options(&cli.compile),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// `LUMEN_LOG` wins over `-v`
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_env("LUMEN_LOG").unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_options(args: &CompileArgs, filename: Option<&Path>) -> Result<CompileOptions> {
    let mut options = match &args.config {
        Some(path) => CompileOptions::load(path)
            .with_context(|| format!("failed to load options from {}", path.display()))?,
        None => CompileOptions::default(),
    };
    if args.legacy {
        options.version = LanguageVersion::Legacy;
    }
    if args.strict {
        options.strict = true;
    }
    if let Some(line) = args.first_line {
        options.first_line = line;
    }
    if options.filename.is_none() {
        options.filename = filename
            .filter(|p| p.as_os_str() != "-")
            .map(|p| p.display().to_string());
    }
    Ok(options)
}

fn read_program(path: &Path) -> Result<Program> {
    let text = if path.as_os_str() == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text).context("failed to read standard input")?;
        text
    } else {
        std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?
    };
    serde_json::from_str(&text).with_context(|| format!("{} is not a valid AST", path.display()))
}

fn run_emit(compile: &CompileArgs, args: &EmitArgs) -> Result<ExitCode> {
    let options = load_options(compile, Some(&args.file))?;
    let program = read_program(&args.file)?;
    tracing::debug!(statements = program.body.len(), "compiling {}", options.display_filename());

    // Diagnostics are printed below, not logged
    let mut compiler = Compiler::new(options).with_reporter(CollectingReporter::default());
    let outcome = compiler.compile(&program);

    for diagnostic in compiler.diagnostics() {
        print_diagnostic(diagnostic);
    }
    let compiled = match outcome {
        Ok(compiled) => compiled,
        Err(e) => {
            tracing::debug!("compilation failed: {}", e);
            return Ok(ExitCode::FAILURE);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&compiled)?);
    } else {
        print_program(&compiled, args);
    }

    if args.stats {
        println!("{}", "code pool".white().bold());
        println!("{}", compiler.code_pool_stats());
        println!("{}", "temp pool".white().bold());
        println!("{}", compiler.temp_pool_stats());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_options(args: &CompileArgs) -> Result<ExitCode> {
    let options = load_options(args, None)?;
    println!("{}", serde_json::to_string_pretty(&options)?);
    Ok(ExitCode::SUCCESS)
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    if diagnostic.warning {
        eprintln!("{}", diagnostic.yellow());
    } else {
        eprintln!("{}", diagnostic.red().bold());
    }
}

fn print_program(compiled: &CompiledProgram, args: &EmitArgs) {
    print_script("main", &compiled.script, args);
    for function in &compiled.functions {
        let name = function.name.as_deref().unwrap_or("<anonymous>");
        println!();
        print_script(
            &format!("function {} (nargs {}, nvars {})", name, function.nargs, function.nvars),
            &function.script,
            args,
        );
    }
}

fn print_script(title: &str, script: &Script, args: &EmitArgs) {
    println!(
        "{} {}",
        title.bright_cyan().bold(),
        format!("(depth {}, {} bytes)", script.max_stack_depth, script.code.len()).dimmed()
    );
    for line in script.disassemble() {
        println!("{}", line);
    }

    if args.notes {
        println!("{}", "Source notes:".white().bold());
        for note in script.note_listing() {
            println!("{}", note);
        }
    }

    if args.try_notes && !script.try_notes.is_empty() {
        println!("{}", "Exception table:".white().bold());
        println!("{:>8} {:>8} {:>8}", "start".dimmed(), "end".dimmed(), "catch".dimmed());
        for note in &script.try_notes {
            println!("{:8} {:8} {:8}", note.start, note.start + note.length, note.catch_start);
        }
    }
}
