//! Per-connection session worker.
//!
//! Each accepted connection gets one of these. The socket is split: a writer
//! task drains the session's outbound channel into the socket while the read
//! loop interprets the protocol. A connection is in one of three stages
//! (reading for a first JOIN, active, or terminated), and the only state
//! distinguishing them is which session (if any) this worker has registered.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc;

use crate::message::{Action, Message, read_message, write_message};

use super::broadcast::Broadcaster;
use super::registry::{Session, SessionRegistry, SessionSender};

/// Drive one connection from accept to close.
///
/// Never returns an error: every failure mode of a single connection ends in
/// the same termination path and must not propagate past this task.
pub(crate) async fn run_session<S>(
    stream: S,
    conn_id: u64,
    registry: Arc<SessionRegistry>,
    broadcaster: Broadcaster,
) where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (mut reader, writer) = tokio::io::split(stream);
    let (outbound, outbound_rx) = mpsc::unbounded_channel();
    let writer_task = tokio::spawn(drain_outbound(writer, outbound_rx, conn_id));

    let joined = read_loop(&mut reader, conn_id, &outbound, &registry, &broadcaster).await;

    // Terminated. Whether the peer sent LEAVE, closed the stream, or died
    // mid-frame, the session leaves the registry exactly once. The LEAVE goes
    // out while the session is still registered, so the departing peer sees
    // its own echo. Only this worker ever removes its session, so the
    // presence check cannot race another remover.
    if let Some(session) = joined
        && registry.contains(&session)
    {
        broadcaster.broadcast(&Message::leave(session.user()));
        registry.remove(&session);
        tracing::info!(user = %session.user(), users = registry.len(), "user left");
    }

    drop(outbound); // closes the channel; the writer drains and shuts the socket down
    if let Err(e) = writer_task.await {
        tracing::debug!(conn_id, error = %e, "writer task ended abnormally");
    }
}

/// Read messages until the peer leaves, the stream ends, or a read fails.
/// Returns the session this connection registered, if any.
async fn read_loop<S>(
    reader: &mut ReadHalf<S>,
    conn_id: u64,
    outbound: &SessionSender,
    registry: &SessionRegistry,
    broadcaster: &Broadcaster,
) -> Option<Session>
where
    S: AsyncRead,
{
    let mut joined: Option<Session> = None;
    loop {
        let message = match read_message(reader).await {
            Ok(Some(message)) => message,
            Ok(None) => break,
            Err(e) => {
                // Transport and protocol errors alike end only this session.
                tracing::warn!(conn_id, error = %e, "read failed, closing session");
                break;
            }
        };

        match message.action {
            Action::Join => {
                let candidate = Session::new(message.user.clone(), conn_id, outbound.clone());
                if registry.add(candidate.clone()) {
                    joined = Some(candidate);
                    broadcaster.broadcast(&message);
                    tracing::info!(user = %message.user, users = registry.len(), "user joined");
                }
                // Duplicate (user, connection) pair: defined no-op, keep reading.
            }
            Action::Send => broadcaster.broadcast(&message),
            Action::Leave => break,
        }
    }
    joined
}

/// Forward the outbound channel to the socket, then close our direction.
///
/// A write failure stops the drain for this peer only; the session stays
/// registered until its own read loop notices the connection is gone.
async fn drain_outbound<W>(
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    conn_id: u64,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(message) = outbound.recv().await {
        if let Err(e) = write_message(&mut writer, &message).await {
            tracing::warn!(conn_id, error = %e, "failed to write to peer");
            break;
        }
    }
    if let Err(e) = writer.shutdown().await {
        tracing::debug!(conn_id, error = %e, "error shutting down connection");
    }
}
