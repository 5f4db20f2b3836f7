//! # Stdio Runtime
//!
//! Reads one JSON envelope per line, hands each request to its own task and
//! writes every outbound envelope from a single writer task. End of input
//! stops the loop, waits for running handlers and shuts gossip down.

use crate::node::MurmurNode;
use crate::outbox::Outbox;
use crate::protocol::{self, Envelope, Inbound, Payload};
use murmur_network::GossipConfig;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Serve the protocol on stdin/stdout until stdin closes
pub async fn run_stdio(config: GossipConfig) -> anyhow::Result<()> {
    serve(config, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Serve the protocol over any line-oriented reader and writer
pub async fn serve<R, W>(config: GossipConfig, mut input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (outbox, outbound_rx) = Outbox::new();
    let node = Arc::new(MurmurNode::new(config, Arc::new(outbox)));

    let (writer_shutdown_tx, writer_shutdown_rx) = mpsc::channel(1);
    let writer = tokio::spawn(write_loop(output, outbound_rx, writer_shutdown_rx));

    let mut handlers = JoinSet::new();
    // Persists across select! iterations so a cancelled read resumes the line
    let mut buf = Vec::new();
    let mut read_error = None;

    loop {
        tokio::select! {
            read = input.read_until(b'\n', &mut buf) => {
                match read {
                    Ok(0) if buf.is_empty() => break,
                    Ok(_) => {
                        accept_line(&node, &mut handlers, &buf);
                        buf.clear();
                    }
                    Err(e) => {
                        warn!("Failed to read input: {}", e);
                        read_error = Some(e);
                        break;
                    }
                }
            }
            Some(joined) = handlers.join_next(), if !handlers.is_empty() => {
                if let Err(e) = joined {
                    warn!("Request handler failed: {}", e);
                }
            }
        }
    }

    info!("Input closed, shutting down");
    while let Some(joined) = handlers.join_next().await {
        if let Err(e) = joined {
            warn!("Request handler failed: {}", e);
        }
    }
    node.shutdown().await;

    // A closed channel means the writer already stopped; its error surfaces below
    if writer_shutdown_tx.send(()).await.is_err() {
        debug!("Writer stopped before shutdown");
    }
    writer.await??;

    match read_error {
        Some(e) => Err(e.into()),
        None => Ok(()),
    }
}

fn accept_line(node: &Arc<MurmurNode>, handlers: &mut JoinSet<()>, raw: &[u8]) {
    match std::str::from_utf8(raw) {
        Ok(line) => ingest(node, handlers, line.trim()),
        Err(e) => warn!("Skipping line that is not UTF-8: {}", e),
    }
}

fn ingest(node: &Arc<MurmurNode>, handlers: &mut JoinSet<()>, line: &str) {
    if line.is_empty() {
        return;
    }
    debug!("<- {}", line);

    match protocol::decode(line) {
        Err(e) => warn!("Skipping unreadable line: {}", e),
        Ok(Inbound::Malformed {
            src,
            dest,
            msg_id,
            reason,
        }) => {
            warn!(from = %src, "Malformed request: {}", reason);
            if let Err(e) = node.reject(&src, &dest, msg_id, &reason) {
                warn!("Failed to queue error reply: {}", e);
            }
        }
        // Handled inline so every later request sees the node's identity
        Ok(Inbound::Message(envelope)) if matches!(envelope.body.payload, Payload::Init { .. }) => {
            dispatch(node, &envelope);
        }
        Ok(Inbound::Message(envelope)) => {
            let node = node.clone();
            handlers.spawn(async move { dispatch(&node, &envelope) });
        }
    }
}

fn dispatch(node: &MurmurNode, envelope: &Envelope) {
    if let Err(e) = node.handle(envelope) {
        warn!(to = %envelope.src, "Failed to queue reply: {}", e);
    }
}

async fn write_envelope<W>(output: &mut W, envelope: &Envelope) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut line = protocol::encode(envelope)?;
    debug!("-> {}", line);
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}

async fn write_loop<W>(
    mut output: W,
    mut outbound_rx: mpsc::UnboundedReceiver<Envelope>,
    mut shutdown_rx: mpsc::Receiver<()>,
) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
{
    loop {
        tokio::select! {
            envelope = outbound_rx.recv() => match envelope {
                Some(envelope) => write_envelope(&mut output, &envelope).await?,
                None => break,
            },
            _ = shutdown_rx.recv() => {
                while let Ok(envelope) = outbound_rx.try_recv() {
                    write_envelope(&mut output, &envelope).await?;
                }
                break;
            }
        }
    }
    output.shutdown().await?;
    Ok(())
}
