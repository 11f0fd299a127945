//! # The REPL loop
//!
//! A line-oriented dispatch table: each input line is tokenized on
//! whitespace and handed to `clap`, so inline flags, `--help` rendering, and
//! unknown-flag diagnostics behave exactly like the outer CLI. Errors raised
//! by a command are written to the error sink and the loop continues; only
//! `exit`/`quit` (or end-of-input at the command prompt) terminate it.

use clap::{Parser, ValueEnum};

use crate::call::{self, CallError, CallOptions};
use crate::descriptor::{DescriptorSource, LookupError, Symbol, fully_qualified};
use crate::fill::{BytesFormat, FillOptions};
use crate::format::{self, ExpandedMessage, Rendered};
use crate::grpc::DynamicTransport;
use crate::prompt::{Prompt, PromptSignal};
use crate::session::{Session, SessionError, package_of};
use crate::ui::Ui;

#[derive(Debug, Parser)]
#[command(name = "grepl", no_binary_name = true, disable_version_flag = true)]
enum ReplCommand {
    /// Select the default package.
    Package { name: String },

    /// Select the default service.
    Service { name: String },

    /// Show package, service, message, rpc or header.
    Show {
        #[arg(value_enum)]
        target: ShowTarget,
    },

    /// Describe the full field tree of a message (or any symbol).
    Desc { symbol: String },

    /// Invoke an RPC, eliciting the request interactively.
    Call {
        /// Include received headers and trailers in the output.
        #[arg(long)]
        enrich: bool,

        /// Emit zero values for scalar fields left empty.
        #[arg(long)]
        emit_defaults: bool,

        /// Ask before descending into every message field.
        #[arg(long)]
        dig_manually: bool,

        /// Decode bytes fields as base64 only.
        #[arg(long, conflicts_with = "bytes_as_quoted_literals")]
        bytes_as_base64: bool,

        /// Decode bytes fields as quoted string literals only.
        #[arg(long)]
        bytes_as_quoted_literals: bool,

        /// Method name, simple or fully-qualified (package.Service.Method).
        method: String,
    },

    /// Add metadata headers (`key=value`), or remove a key (`key`).
    Header {
        /// Treat commas in values literally instead of splitting.
        #[arg(short, long)]
        raw: bool,

        #[arg(required = true, value_name = "KEY[=VALUE]")]
        headers: Vec<String>,
    },

    /// Quit the REPL.
    Exit,

    /// Alias of exit.
    Quit,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ShowTarget {
    Package,
    Service,
    Message,
    Rpc,
    Header,
}

#[derive(Debug, thiserror::Error)]
enum CommandError {
    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Call(#[from] CallError),

    #[error("no service selected; use `service <name>` first")]
    NoServiceSelected,
}

enum Control {
    Continue,
    Exit,
}

/// The interactive session: descriptor source, transport, state, and I/O.
pub struct Repl<T, P> {
    source: DescriptorSource,
    transport: T,
    session: Session,
    prompt: P,
    ui: Ui,
}

impl<T, P> Repl<T, P>
where
    T: DynamicTransport,
    P: Prompt,
{
    pub fn new(
        source: DescriptorSource,
        transport: T,
        session: Session,
        prompt: P,
        ui: Ui,
    ) -> Self {
        Self {
            source,
            transport,
            session,
            prompt,
            ui,
        }
    }

    /// Runs the loop until `exit`, `quit`, or end-of-input. Returns the
    /// process exit code.
    pub async fn run(&mut self) -> i32 {
        loop {
            let label = self.label();
            let line = match self.prompt.input(&label) {
                Ok(line) => line,
                Err(PromptSignal::Interrupt) => continue,
                Err(PromptSignal::Eof) => break,
            };

            let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
            if tokens.is_empty() {
                continue;
            }

            let command = match ReplCommand::try_parse_from(&tokens) {
                Ok(command) => command,
                Err(err) => {
                    use clap::error::ErrorKind;
                    let rendered = err.render().to_string();
                    match err.kind() {
                        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                            self.ui.write(&rendered)
                        }
                        _ => self.ui.ewrite(&rendered),
                    }
                    continue;
                }
            };

            match self.dispatch(command).await {
                Ok(Control::Continue) => {}
                Ok(Control::Exit) => break,
                Err(err) => self.ui.ewrite(&format!("error: {err}")),
            }
        }
        0
    }

    fn label(&self) -> String {
        match self.session.service_full_name() {
            Some(service) => format!("{service}> "),
            None => match self.session.selected_package() {
                Some(package) if !package.is_empty() => format!("{package}> "),
                _ => "> ".to_string(),
            },
        }
    }

    async fn dispatch(&mut self, command: ReplCommand) -> Result<Control, CommandError> {
        match command {
            ReplCommand::Package { name } => {
                let services = self.source.list_services().await?;
                self.session.use_package(&name, &services)?;
            }
            ReplCommand::Service { name } => {
                let services = self.source.list_services().await?;
                self.session.use_service(&name, &services)?;
            }
            ReplCommand::Show { target } => self.show(target).await?,
            ReplCommand::Desc { symbol } => self.desc(&symbol).await?,
            ReplCommand::Header { raw, headers } => self.session.add_headers(&headers, raw)?,
            ReplCommand::Call {
                enrich,
                emit_defaults,
                dig_manually,
                bytes_as_base64,
                bytes_as_quoted_literals,
                method,
            } => {
                let bytes = if bytes_as_base64 {
                    BytesFormat::Base64
                } else if bytes_as_quoted_literals {
                    BytesFormat::QuotedLiterals
                } else {
                    BytesFormat::Auto
                };
                let opts = CallOptions {
                    enrich,
                    fill: FillOptions {
                        emit_defaults,
                        dig_manually,
                        bytes,
                    },
                };
                call::execute(
                    &mut self.source,
                    &mut self.transport,
                    &self.session,
                    &mut self.prompt,
                    &self.ui,
                    &method,
                    opts,
                )
                .await?;
            }
            ReplCommand::Exit | ReplCommand::Quit => return Ok(Control::Exit),
        }
        Ok(Control::Continue)
    }

    async fn show(&mut self, target: ShowTarget) -> Result<(), CommandError> {
        match target {
            ShowTarget::Package => {
                let services = self.source.list_services().await?;
                let mut packages: Vec<String> = Vec::new();
                for service in &services {
                    let package = package_of(service).to_string();
                    if !packages.contains(&package) {
                        packages.push(package);
                    }
                }
                let rows: Vec<Vec<String>> = packages.into_iter().map(|p| vec![p]).collect();
                self.ui.write(&format::table(&["package"], &rows));
            }
            ShowTarget::Service => {
                let services = self.source.list_services().await?;
                let scope: Vec<String> = match self.session.selected_package() {
                    Some(package) => services
                        .iter()
                        .filter(|s| package_of(s) == package)
                        .cloned()
                        .collect(),
                    None => services,
                };
                let mut rows = Vec::new();
                for name in &scope {
                    let symbol = self.source.find_symbol(name).await?;
                    let Some(descriptor) = symbol.service() else {
                        continue;
                    };
                    for method in descriptor.methods() {
                        rows.push(vec![
                            descriptor.name().to_string(),
                            method.name().to_string(),
                            method.input().full_name().to_string(),
                            method.output().full_name().to_string(),
                        ]);
                    }
                }
                self.ui.write(&format::table(
                    &["service", "rpc", "request type", "response type"],
                    &rows,
                ));
            }
            ShowTarget::Message => {
                let messages = self.source.all_messages().await?;
                let rows: Vec<Vec<String>> = messages.into_iter().map(|m| vec![m]).collect();
                self.ui.write(&format::table(&["message"], &rows));
            }
            ShowTarget::Rpc => {
                let service = self
                    .session
                    .service_full_name()
                    .ok_or(CommandError::NoServiceSelected)?;
                let symbol = self.source.find_symbol(&service).await?;
                let Some(descriptor) = symbol.service() else {
                    return Err(LookupError::SymbolNotFound(service).into());
                };
                let rows: Vec<Vec<String>> = descriptor
                    .methods()
                    .map(|m| {
                        vec![
                            m.name().to_string(),
                            m.input().full_name().to_string(),
                            m.output().full_name().to_string(),
                        ]
                    })
                    .collect();
                self.ui
                    .write(&format::table(&["rpc", "request type", "response type"], &rows));
            }
            ShowTarget::Header => {
                let rows: Vec<Vec<String>> = self
                    .session
                    .headers()
                    .iter()
                    .map(|(key, values)| vec![key.clone(), values.join(", ")])
                    .collect();
                self.ui.write(&format::table(&["key", "val"], &rows));
            }
        }
        Ok(())
    }

    async fn desc(&mut self, symbol: &str) -> Result<(), CommandError> {
        let rendered = match self.resolve_symbol(symbol).await? {
            Symbol::Message(descriptor) => Rendered::from(ExpandedMessage(descriptor)),
            Symbol::Service(descriptor) => Rendered::from(descriptor),
            Symbol::Enum(descriptor) => Rendered::from(descriptor),
        };
        self.ui.write(&rendered.to_string());
        Ok(())
    }

    /// Resolves a possibly-simple symbol name: verbatim, then qualified with
    /// the selected package, then as an unambiguous simple message name.
    async fn resolve_symbol(&mut self, name: &str) -> Result<Symbol, CommandError> {
        match self.source.find_symbol(name).await {
            Ok(symbol) => return Ok(symbol),
            Err(LookupError::SymbolNotFound(_)) => {}
            Err(err) => return Err(err.into()),
        }

        if let Some(package) = self.session.selected_package() {
            let qualified = fully_qualified(package, name);
            match self.source.find_symbol(&qualified).await {
                Ok(symbol) => return Ok(symbol),
                Err(LookupError::SymbolNotFound(_)) => {}
                Err(err) => return Err(err.into()),
            }
        }

        let messages = self.source.all_messages().await?;
        let mut matches = messages
            .iter()
            .filter(|m| m.rsplit_once('.').map(|(_, n)| n).unwrap_or(m) == name);
        match (matches.next(), matches.next()) {
            (Some(full), None) => {
                let full = full.clone();
                Ok(self.source.find_symbol(&full).await?)
            }
            _ => Err(LookupError::SymbolNotFound(name.to_string()).into()),
        }
    }
}
