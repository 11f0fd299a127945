//! # Call orchestration
//!
//! Translates a `call` command into a transport invocation: resolves the
//! method, snapshots the session headers, elicits the request message(s)
//! through the [`MessageFiller`], and branches on the method's streaming
//! mode.
//!
//! Bidirectional streaming is the one place with real concurrency: a
//! receiver task drains and prints responses while the sender loop elicits
//! messages. A shared [`CancellationToken`] ties the halves together — an
//! interrupt at the outer prompt cancels the token, the receiver stops
//! reading, and dropping both stream ends tears the RPC down. Cancellation
//! is observed as stream termination, never as an error.

use futures_util::StreamExt;
use prost_reflect::MethodDescriptor;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::descriptor::{DescriptorSource, LookupError};
use crate::fill::{FillError, FillOptions, MessageFiller, StreamItem};
use crate::grpc::{DynamicTransport, ResponseStream, TransportError};
use crate::present::Presenter;
use crate::prompt::Prompt;
use crate::session::{PresentFormat, Session};
use crate::ui::Ui;

#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("no service selected; use `service <name>` or a fully-qualified method name")]
    NoServiceSelected,

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Fill(#[from] FillError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    pub fill: FillOptions,
    /// Force enriched presentation for this call.
    pub enrich: bool,
}

/// Invokes `method`, which is either a simple name resolved against the
/// session's selected service or a fully-qualified `package.Service.Method`.
pub async fn execute<T, P>(
    source: &mut DescriptorSource,
    transport: &mut T,
    session: &Session,
    prompt: &mut P,
    ui: &Ui,
    method: &str,
    opts: CallOptions,
) -> Result<(), CallError>
where
    T: DynamicTransport,
    P: Prompt,
{
    let (service, method_name) = match method.rsplit_once('.') {
        Some((service, name)) => (service.to_string(), name),
        None => {
            let service = session
                .service_full_name()
                .ok_or(CallError::NoServiceSelected)?;
            (service, method)
        }
    };

    let descriptor = source.find_method(&service, method_name).await?;
    let headers = session.headers_for_call();
    let format = if opts.enrich {
        PresentFormat::Enriched
    } else {
        session.present()
    };
    let presenter = Presenter::new(format);
    let mut filler = MessageFiller::new(prompt, opts.fill);
    let input = descriptor.input();

    debug!(
        method = %descriptor.full_name(),
        client_streaming = descriptor.is_client_streaming(),
        server_streaming = descriptor.is_server_streaming(),
        "dispatching call"
    );

    match (
        descriptor.is_client_streaming(),
        descriptor.is_server_streaming(),
    ) {
        (false, false) => {
            let request = filler.fill_unary(&input)?;
            let reply = transport.unary(&descriptor, request, headers).await?;
            ui.write(&presenter.unary(&reply));
        }

        (false, true) => {
            let request = filler.fill_unary(&input)?;
            let reply = transport
                .server_streaming(&descriptor, request, headers)
                .await?;
            if let Some(text) = presenter.stream_headers(&reply.headers) {
                ui.write(&text);
            }
            let mut messages = reply.messages;
            while let Some(item) = messages.next().await {
                match item {
                    Ok(message) => ui.write(&presenter.message(&message)),
                    Err(status) => return Err(TransportError::Status(status).into()),
                }
            }
        }

        (true, false) => {
            // Requests are elicited up front and sent in input order; the
            // server answers once after close-send.
            let mut requests = Vec::new();
            loop {
                match filler.fill_stream_item(&input)? {
                    StreamItem::Message(message) => requests.push(message),
                    StreamItem::End => break,
                    StreamItem::Cancel => return Ok(()),
                }
            }
            let stream = futures_util::stream::iter(requests).boxed();
            let reply = transport
                .client_streaming(&descriptor, stream, headers)
                .await?;
            ui.write(&presenter.unary(&reply));
        }

        (true, true) => {
            bidi(
                transport, &mut filler, &descriptor, headers, presenter, ui,
            )
            .await?;
        }
    }

    Ok(())
}

async fn bidi<T, P>(
    transport: &mut T,
    filler: &mut MessageFiller<'_, P>,
    descriptor: &MethodDescriptor,
    headers: Vec<(String, String)>,
    presenter: Presenter,
    ui: &Ui,
) -> Result<(), CallError>
where
    T: DynamicTransport,
    P: Prompt,
{
    let input = descriptor.input();
    let (tx, rx) = mpsc::channel(16);
    let reply = transport
        .bidi_streaming(descriptor, ReceiverStream::new(rx).boxed(), headers)
        .await?;
    if let Some(text) = presenter.stream_headers(&reply.headers) {
        ui.write(&text);
    }

    let token = CancellationToken::new();
    let receiver = tokio::spawn(drain_responses(
        reply.messages,
        presenter,
        ui.clone(),
        token.clone(),
    ));

    loop {
        match filler.fill_stream_item(&input) {
            Ok(StreamItem::Message(message)) => {
                if tx.send(message).await.is_err() {
                    break;
                }
            }
            Ok(StreamItem::End) => break,
            Ok(StreamItem::Cancel) => {
                token.cancel();
                break;
            }
            Err(err) => {
                token.cancel();
                drop(tx);
                let _ = receiver.await;
                return Err(err.into());
            }
        }
    }

    drop(tx);
    let _ = receiver.await;
    Ok(())
}

async fn drain_responses(
    mut messages: ResponseStream,
    presenter: Presenter,
    ui: Ui,
    token: CancellationToken,
) {
    loop {
        // Responses already delivered are surfaced even when cancellation
        // arrives in the same instant; only a pending read observes it.
        tokio::select! {
            biased;
            item = messages.next() => match item {
                Some(Ok(message)) => ui.write(&presenter.message(&message)),
                Some(Err(status)) => {
                    if !token.is_cancelled() {
                        ui.ewrite(&format!("stream terminated: {status}"));
                    }
                    break;
                }
                None => break,
            },
            _ = token.cancelled() => break,
        }
    }
}
