//! # Grepl entry point
//!
//! Drives the application lifecycle: parse the command line, connect the
//! channel, pick the descriptor backend (compiled sets or reflection), seed
//! the session from the flags, and hand control to the REPL. Startup
//! failures print to stderr and exit non-zero; everything after the first
//! prompt is the REPL's business.

mod cli;

use anyhow::Context;
use clap::Parser;
use cli::{Cli, Command};
use grepl_core::descriptor::{DescriptorSource, FileSource, ReflectionSource};
use grepl_core::grpc::GrpcClient;
use grepl_core::prompt::LinePrompt;
use grepl_core::reflection::client::ReflectionClient;
use grepl_core::repl::Repl;
use grepl_core::session::Session;
use grepl_core::tonic::transport::{Channel, ClientTlsConfig, Endpoint};
use grepl_core::ui::Ui;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let args = Cli::parse();

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(err) => {
            eprintln!("grepl: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Cli) -> anyhow::Result<u8> {
    let Command::Repl = args.command;

    let scheme = if args.tls { "https" } else { "http" };
    let addr = format!("{scheme}://{}:{}", args.host, args.port);
    let channel = connect(&addr, args.tls).await?;

    let mut source = if args.reflection {
        let client = ReflectionClient::new(channel.clone(), true);
        DescriptorSource::Reflection(ReflectionSource::new(client))
    } else {
        DescriptorSource::Files(FileSource::from_files(&args.proto)?)
    };

    let mut session = Session::new();
    if !args.headers.is_empty() {
        session.add_headers(&args.headers, false)?;
    }
    if args.package.is_some() || args.service.is_some() {
        let services = source.list_services().await?;
        if let Some(package) = &args.package {
            session.use_package(package, &services)?;
        }
        if let Some(service) = &args.service {
            session.use_service(service, &services)?;
        }
    }

    if !args.silent {
        println!("grepl {} — interactive gRPC client", env!("CARGO_PKG_VERSION"));
        println!("connected to {addr}; type a command, or `exit` to quit\n");
    }

    let transport = GrpcClient::new(channel);
    let prompt = LinePrompt::new().context("failed to initialize the line editor")?;
    let mut repl = Repl::new(source, transport, session, prompt, Ui::stdio());
    let code = repl.run().await;
    Ok(u8::try_from(code).unwrap_or(1))
}

async fn connect(addr: &str, tls: bool) -> anyhow::Result<Channel> {
    let mut endpoint =
        Endpoint::new(addr.to_string()).with_context(|| format!("invalid URL '{addr}'"))?;
    if tls {
        endpoint = endpoint
            .tls_config(ClientTlsConfig::new().with_native_roots())
            .context("failed to configure TLS")?;
    }
    endpoint
        .connect()
        .await
        .with_context(|| format!("failed to connect to '{addr}'"))
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}
