//! One client login cycle: a receive activity and a send activity sharing a
//! logged-in flag, a bounded handoff queue, and one TCP connection.
//!
//! Logout is a round trip. Requesting it only enqueues a LEAVE; the cycle
//! ends when the server echoes that LEAVE back on the receive path. Flipping
//! the flag locally on request would race the send activity's final write
//! against teardown, so the echo is the sole trigger.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;

use crate::message::{Action, Message, read_message, write_message};

use super::formatter::TranscriptFormatter;

/// Outgoing messages waiting for transmission. Enqueueing backpressures
/// once this many are pending.
const OUTGOING_QUEUE_CAPACITY: usize = 32;

/// Channel on which rendered transcript lines are handed to the owner.
pub type Transcript = mpsc::UnboundedSender<String>;

/// Client-side errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The connection could not be opened.
    #[error("connection failed: {0}")]
    Connect(#[source] io::Error),

    /// The operation needs a live login cycle.
    #[error("not logged in")]
    NotLoggedIn,

    /// A display name is required to log in.
    #[error("display name must not be blank")]
    BlankUser,
}

/// State shared between the two activities of one cycle.
///
/// The flag is checked at each loop head, so a flip is observed at the next
/// iteration, never mid-read; logout therefore takes effect at the next
/// check, which is the intended contract. The gate is a single permit held
/// by the receive activity for its whole lifetime; cleanup must acquire it,
/// and so can never overlap a read on a connection about to be torn down.
struct SessionShared {
    logged_in: AtomicBool,
    gate: Semaphore,
}

/// A live login cycle. All state is created fresh by [`ChatClient::login`]
/// and discarded by [`ChatClient::closed`]; nothing survives across cycles.
pub struct ChatClient {
    user: String,
    shared: Arc<SessionShared>,
    outgoing: mpsc::Sender<Message>,
    receive_activity: JoinHandle<()>,
    send_activity: JoinHandle<(mpsc::Receiver<Message>, OwnedWriteHalf)>,
}

impl ChatClient {
    /// Open a connection, start both activities, and announce the user.
    ///
    /// A connect failure is reported as an inline transcript line and
    /// returned as an error; the flag never becomes true and no activity is
    /// started.
    pub async fn login(
        host: &str,
        port: u16,
        user: impl Into<String>,
        transcript: Transcript,
    ) -> Result<Self, ClientError> {
        let user = user.into();

        let stream = match TcpStream::connect((host, port)).await {
            Ok(stream) => stream,
            Err(e) => {
                transcript
                    .send(TranscriptFormatter::format_connection_failed(&e))
                    .ok();
                return Err(ClientError::Connect(e));
            }
        };

        let (read_half, write_half) = stream.into_split();
        let (outgoing, outgoing_rx) = mpsc::channel(OUTGOING_QUEUE_CAPACITY);
        let shared = Arc::new(SessionShared {
            logged_in: AtomicBool::new(false),
            gate: Semaphore::new(1),
        });

        // Must hold before the receive activity's first loop-head check.
        shared.logged_in.store(true, Ordering::SeqCst);

        let receive_activity = tokio::spawn(receive_loop(
            read_half,
            Arc::clone(&shared),
            user.clone(),
            transcript,
        ));
        let send_activity = tokio::spawn(send_loop(write_half, outgoing_rx, Arc::clone(&shared)));

        outgoing
            .try_send(Message::join(user.as_str()))
            .expect("fresh outgoing queue accepts the login JOIN");

        Ok(Self {
            user,
            shared,
            outgoing,
            receive_activity,
            send_activity,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn is_logged_in(&self) -> bool {
        self.shared.logged_in.load(Ordering::SeqCst)
    }

    /// Queue one chat line for transmission.
    ///
    /// Fails rather than dropping silently when the cycle is already over.
    pub async fn send(&self, content: impl Into<String>) -> Result<(), ClientError> {
        if !self.is_logged_in() {
            return Err(ClientError::NotLoggedIn);
        }
        self.outgoing
            .send(Message::send(self.user.as_str(), content))
            .await
            .map_err(|_| ClientError::NotLoggedIn)
    }

    /// Request logout.
    ///
    /// Only enqueues a LEAVE; closes nothing. The cycle ends when the
    /// receive activity observes the server's echo. A no-op when already
    /// logged out.
    pub async fn logout(&self) {
        if !self.is_logged_in() {
            return;
        }
        self.outgoing
            .send(Message::leave(self.user.as_str()))
            .await
            .ok();
    }

    /// Wait for both activities to stop, then clean up.
    ///
    /// Cleanup acquires the gate before touching anything, so it strictly
    /// follows the receive activity's exit: the queue is cleared and the
    /// connection handles dropped only once no read can be pending on them.
    pub async fn closed(self) {
        let ChatClient {
            shared,
            outgoing,
            receive_activity,
            send_activity,
            ..
        } = self;

        // Closing our end of the queue lets the send activity finish even
        // when no LEAVE will ever be echoed (ungraceful disconnect).
        drop(outgoing);

        let handles = match send_activity.await {
            Ok(handles) => Some(handles),
            Err(e) => {
                tracing::debug!(error = %e, "send activity ended abnormally");
                None
            }
        };

        let _permit = shared
            .gate
            .acquire()
            .await
            .expect("gate semaphore is never closed");

        if let Some((mut pending, write_half)) = handles {
            let mut discarded = 0;
            while pending.try_recv().is_ok() {
                discarded += 1;
            }
            if discarded > 0 {
                tracing::debug!(discarded, "cleared outgoing queue");
            }
            drop(write_half);
        }

        if let Err(e) = receive_activity.await {
            tracing::debug!(error = %e, "receive activity ended abnormally");
        }
    }
}

/// Receive activity: render every broadcast, and end the logged-in state
/// when the server echoes this user's LEAVE.
///
/// End-of-stream and read errors exit the loop with the flag untouched:
/// no valid echo was seen, and pretending otherwise would hide the
/// ungraceful disconnect from the caller.
async fn receive_loop(
    mut read_half: OwnedReadHalf,
    shared: Arc<SessionShared>,
    user: String,
    transcript: Transcript,
) {
    let _permit = shared
        .gate
        .acquire()
        .await
        .expect("gate semaphore is never closed");

    while shared.logged_in.load(Ordering::SeqCst) {
        let message = match read_message(&mut read_half).await {
            Ok(Some(message)) => message,
            Ok(None) => {
                transcript
                    .send(TranscriptFormatter::format_connection_closed())
                    .ok();
                break;
            }
            Err(e) => {
                transcript
                    .send(TranscriptFormatter::format_connection_lost(&e))
                    .ok();
                break;
            }
        };

        transcript
            .send(TranscriptFormatter::format_message(&message))
            .ok();

        if message.action == Action::Leave && message.user == user {
            shared.logged_in.store(false, Ordering::SeqCst);
        }
    }

    // The read side is released before the gate opens, on every exit path.
    drop(read_half);
}

/// Send activity: drain the handoff queue onto the wire. A transmitted
/// LEAVE is this activity's own exit signal; when the receive loop ends the
/// cycle is decided over there.
async fn send_loop(
    mut write_half: OwnedWriteHalf,
    mut outgoing: mpsc::Receiver<Message>,
    shared: Arc<SessionShared>,
) -> (mpsc::Receiver<Message>, OwnedWriteHalf) {
    while shared.logged_in.load(Ordering::SeqCst) {
        let Some(message) = outgoing.recv().await else {
            break; // client handle dropped; nothing further will be queued
        };
        if let Err(e) = write_message(&mut write_half, &message).await {
            tracing::warn!(error = %e, "failed to send message");
            break;
        }
        if message.action == Action::Leave {
            break;
        }
    }
    (outgoing, write_half)
}
