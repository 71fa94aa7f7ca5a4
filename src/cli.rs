// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Command-line interface definitions

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Lumen - bytecode emitter for the Lumen script engine
#[derive(Parser, Debug)]
#[command(name = "lumen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub compile: CompileArgs,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Compile a JSON AST and print the bytecode listing
    Emit(EmitArgs),

    /// Print the effective compile options as JSON
    Options,
}

/// Options shared by every command that compiles
#[derive(Args, Debug, Default)]
pub struct CompileArgs {
    /// Compile options file (JSON)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Target the legacy language version
    #[arg(long, global = true)]
    pub legacy: bool,

    /// Treat duplicate formal parameters as errors
    #[arg(long, global = true)]
    pub strict: bool,

    /// Line number of the first source line
    #[arg(long, global = true)]
    pub first_line: Option<u32>,
}

#[derive(Args, Debug)]
pub struct EmitArgs {
    /// AST file to compile ("-" reads standard input)
    pub file: PathBuf,

    /// Print the source-note stream
    #[arg(short, long)]
    pub notes: bool,

    /// Print the try notes
    #[arg(short, long)]
    pub try_notes: bool,

    /// Print arena pool statistics
    #[arg(short, long)]
    pub stats: bool,

    /// Print the compiled program as JSON instead of a listing
    #[arg(long, conflicts_with_all = ["notes", "try_notes"])]
    pub json: bool,
}
