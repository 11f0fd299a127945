//! # CLI
//!
//! The outer command line of `grepl`, defined with `clap`. The interesting
//! invariant is the schema source: the REPL needs either compiled descriptor
//! sets (`--proto`) or server reflection (`--reflection`), and exactly one of
//! the two.
use std::path::PathBuf;

use clap::{ArgGroup, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "grepl", version, about = "Interactive gRPC client")]
#[command(group(ArgGroup::new("schema").args(["proto", "reflection"]).required(true).multiple(false)))]
pub struct Cli {
    /// Server host to connect to.
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to connect to.
    #[arg(short, long, default_value_t = 50051)]
    pub port: u16,

    /// Compiled descriptor set (.bin/.pb produced by protoc or buf).
    /// Repeatable.
    #[arg(long = "proto", value_name = "FILE")]
    pub proto: Vec<PathBuf>,

    /// Resolve the schema through the server's reflection service.
    #[arg(short, long)]
    pub reflection: bool,

    /// Package selected when the REPL starts.
    #[arg(long)]
    pub package: Option<String>,

    /// Service selected when the REPL starts.
    #[arg(long)]
    pub service: Option<String>,

    /// Metadata header, as key=value. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "KEY=VALUE")]
    pub headers: Vec<String>,

    /// Connect over TLS.
    #[arg(short, long)]
    pub tls: bool,

    /// Suppress the startup banner.
    #[arg(long)]
    pub silent: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the interactive REPL.
    Repl,
}
