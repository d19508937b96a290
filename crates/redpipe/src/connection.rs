//! The pipelining engine: one writer funnel and one reader loop per
//! connection, correlating replies to commands in FIFO order.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::OnceLock;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use bytes::BytesMut;
use redpipe_resp::ParseOutcome;
use redpipe_resp::Parser;
use redpipe_resp::Value;
use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::io::ReadHalf;
use tokio::io::WriteHalf;
use tokio::net::TcpStream;
use tokio::net::ToSocketAddrs;
use tokio::sync::Mutex;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tracing::debug;
use tracing::error;

use crate::command::Command;
use crate::config::ConnectionConfig;
use crate::config::PushMatcher;
use crate::error::Error;

/// A pipelined connection to a RESP server.
///
/// Commands submitted through any clone of this handle are written to the
/// underlying stream in submission order, each command's bytes contiguous,
/// and may be outstanding simultaneously. Replies are matched back to
/// their [`ReplyHandle`]s strictly first-in-first-out, which is the
/// protocol's ordering contract.
///
/// A protocol or transport failure is terminal: every outstanding handle
/// resolves with a broken-connection error carrying the cause, and every
/// later [`Connection::submit`] fails synchronously with the same error.
#[derive(Clone)]
pub struct Connection {
    submit_tx: mpsc::UnboundedSender<Submission>,
    shared: Arc<Shared>,
    matcher: PushMatcher,
}

/// Resolves to the reply for one submitted command.
///
/// Dropping the handle abandons the command: its bytes may already be on
/// the wire and cannot be retracted, so its reply is parsed and discarded
/// without disturbing the FIFO order of later commands.
pub struct ReplyHandle {
    rx: oneshot::Receiver<Result<Value, Error>>,
    shared: Arc<Shared>,
}

impl fmt::Debug for ReplyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplyHandle").finish_non_exhaustive()
    }
}

impl Future for ReplyHandle {
    type Output = Result<Value, Error>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            // The slot was dropped without resolving: the connection went
            // down before its reply was routed.
            Poll::Ready(Err(_)) => {
                Poll::Ready(Err(self.shared.broken().unwrap_or(Error::Closed)))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// State shared between the connection handles and the two I/O tasks.
struct Shared {
    /// First fatal cause wins; set exactly once
    cause: OnceLock<Arc<Error>>,
    /// Wakes both I/O tasks when the connection turns terminal
    closed: Notify,
    /// Consumer end of the push-notification sink
    push_rx: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl Shared {
    fn fail(&self, cause: Error) -> Arc<Error> {
        let cause = Arc::new(cause);
        let stored = self.cause.get_or_init(move || cause).clone();
        self.closed.notify_waiters();
        stored
    }

    fn broken(&self) -> Option<Error> {
        self.cause.get().map(|cause| Error::broken(cause.clone()))
    }
}

/// One queued command: its wire bytes and the slot its reply resolves.
struct Submission {
    bytes: Bytes,
    slot: Slot,
}

/// The single-assignment destination for one command's eventual reply.
struct Slot {
    tx: oneshot::Sender<Result<Value, Error>>,
    /// Non-zero for subscription commands: the number of acknowledgements
    /// the server will send, one per channel or pattern argument. The
    /// first resolves the slot, the rest go to the push sink.
    expected_acks: usize,
}

impl Connection {
    /// Wrap an established duplex byte stream.
    ///
    /// The stream only needs ordered reads and writes; everything else
    /// (TLS, socket options, name resolution) is the caller's business.
    pub fn new<S>(stream: S, config: ConnectionConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (rd, wr) = tokio::io::split(stream);
        let (submit_tx, submit_rx) = mpsc::unbounded_channel();
        let (slot_tx, slot_rx) = mpsc::unbounded_channel();
        let (push_tx, push_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            cause: OnceLock::new(),
            closed: Notify::new(),
            push_rx: Mutex::new(push_rx),
        });
        let matcher = config.matcher.clone();

        tokio::spawn(write_loop(wr, submit_rx, slot_tx, shared.clone()));
        tokio::spawn(read_loop(rd, slot_rx, push_tx, config, shared.clone()));

        Self {
            submit_tx,
            shared,
            matcher,
        }
    }

    /// Connect over TCP with the default configuration.
    pub async fn connect(addr: impl ToSocketAddrs) -> Result<Self, Error> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::new(stream, ConnectionConfig::default()))
    }

    /// Queue a command for writing and register its reply slot.
    ///
    /// Returns immediately; the returned handle resolves once the
    /// corresponding reply has been parsed. Fails synchronously if the
    /// connection is already broken.
    pub fn submit(&self, command: Command) -> Result<ReplyHandle, Error> {
        if let Some(broken) = self.shared.broken() {
            return Err(broken);
        }

        let subscription = command
            .name()
            .is_some_and(|name| self.matcher.is_subscription_command(name));
        // One ack per channel/pattern argument; a bare UNSUBSCRIBE still
        // gets one for its slot, any extra are absorbed by the reader.
        let expected_acks = if subscription {
            command.args().len().saturating_sub(1).max(1)
        } else {
            0
        };
        let (tx, rx) = oneshot::channel();
        let submission = Submission {
            bytes: command.encode(),
            slot: Slot { tx, expected_acks },
        };

        if self.submit_tx.send(submission).is_err() {
            return Err(self.shared.broken().unwrap_or(Error::Closed));
        }

        Ok(ReplyHandle {
            rx,
            shared: self.shared.clone(),
        })
    }

    /// Receive the next push notification.
    ///
    /// Only meaningful once the connection has entered subscribed mode.
    /// Returns `None` after the connection has shut down and the sink has
    /// been drained.
    pub async fn next_push(&self) -> Option<Value> {
        self.shared.push_rx.lock().await.recv().await
    }

    /// Transition the connection to the terminal broken state.
    ///
    /// Every outstanding reply handle resolves with a broken-connection
    /// error carrying `cause`; subsequent submits fail with the same
    /// error.
    pub fn shutdown(&self, cause: Error) {
        self.shared.fail(cause);
    }

    /// Whether the connection has reached the terminal broken state.
    pub fn is_broken(&self) -> bool {
        self.shared.cause.get().is_some()
    }
}

/// Writer funnel: the only task that touches the write half, so two
/// commands' bytes are never interleaved and slot order always matches
/// write order.
async fn write_loop<S>(
    mut wr: WriteHalf<S>,
    mut submit_rx: mpsc::UnboundedReceiver<Submission>,
    slot_tx: mpsc::UnboundedSender<Slot>,
    shared: Arc<Shared>,
) where
    S: AsyncWrite + Send + 'static,
{
    loop {
        let closed = shared.closed.notified();
        if shared.cause.get().is_some() {
            break;
        }

        let submission = tokio::select! {
            _ = closed => break,
            next = submit_rx.recv() => match next {
                Some(submission) => submission,
                None => {
                    // Every Connection handle is gone; nothing more can be
                    // submitted, tear down so the reader stops too.
                    shared.fail(Error::Closed);
                    break;
                }
            },
        };

        // Register the slot before its bytes can reach the wire, so the
        // reader always finds slot N waiting when reply N parses.
        if slot_tx.send(submission.slot).is_err() {
            break;
        }

        if let Err(e) = wr.write_all(&submission.bytes).await {
            shared.fail(e.into());
            break;
        }
        if let Err(e) = wr.flush().await {
            shared.fail(e.into());
            break;
        }
    }
    // Dropping slot_tx here lets the reader fail whatever is still queued;
    // dropping submit_rx resolves not-yet-written submissions through
    // their abandoned slots.
}

/// Reader: drives the parser over inbound bytes and routes every
/// completed value to the oldest unresolved slot or to the push sink.
async fn read_loop<S>(
    rd: ReadHalf<S>,
    slot_rx: mpsc::UnboundedReceiver<Slot>,
    push_tx: mpsc::UnboundedSender<Value>,
    config: ConnectionConfig,
    shared: Arc<Shared>,
) where
    S: AsyncRead + Send + 'static,
{
    let mut router = Router {
        slot_rx,
        push_tx,
        matcher: config.matcher.clone(),
        subscriptions: 0,
        pending_acks: 0,
    };

    let cause = match drive_reader(rd, &mut router, &config, &shared).await {
        Ok(()) => Error::Closed,
        Err(e) => e,
    };
    if !matches!(cause, Error::Closed) {
        error!("connection failed: {}", cause);
    }

    let cause = shared.fail(cause);
    router.fail_outstanding(cause);
}

async fn drive_reader<S>(
    mut rd: ReadHalf<S>,
    router: &mut Router,
    config: &ConnectionConfig,
    shared: &Shared,
) -> Result<(), Error>
where
    S: AsyncRead + Send + 'static,
{
    let mut parser = Parser::with_limits(config.limits);
    let mut buffer = BytesMut::with_capacity(config.read_buffer_capacity);

    loop {
        loop {
            match parser.parse(&mut buffer) {
                ParseOutcome::Complete(value) => router.route(value)?,
                ParseOutcome::Incomplete => break,
                ParseOutcome::Error(e) => return Err(Error::Protocol(e)),
            }
        }

        let closed = shared.closed.notified();
        if let Some(cause) = shared.cause.get() {
            return Err((**cause).clone());
        }

        let read = async {
            match config.read_timeout {
                Some(limit) => match tokio::time::timeout(limit, rd.read_buf(&mut buffer)).await {
                    Ok(result) => result.map_err(Error::from),
                    Err(_) => Err(Error::Timeout),
                },
                None => rd.read_buf(&mut buffer).await.map_err(Error::from),
            }
        };

        let n = tokio::select! {
            _ = closed => {
                return Err(match shared.cause.get() {
                    Some(cause) => (**cause).clone(),
                    None => Error::Closed,
                });
            }
            result = read => result?,
        };

        if n == 0 {
            return Err(Error::Closed);
        }
    }
}

/// Routing state owned by the reader task: the FIFO queue of outstanding
/// slots, the push sink, and the connection mode.
struct Router {
    slot_rx: mpsc::UnboundedReceiver<Slot>,
    push_tx: mpsc::UnboundedSender<Value>,
    matcher: PushMatcher,
    /// Number of active channel/pattern subscriptions; the connection is
    /// in subscribed mode while this is non-zero.
    subscriptions: u64,
    /// Acknowledgements still owed to the most recent subscription
    /// command after its slot resolved. They must be absorbed before the
    /// next slot is dequeued, or a pipelined command behind a
    /// multi-channel SUBSCRIBE would receive the wrong reply.
    pending_acks: usize,
}

impl Router {
    fn subscribed(&self) -> bool {
        self.subscriptions > 0
    }

    fn route(&mut self, value: Value) -> Result<(), Error> {
        if self.subscribed() && self.matcher.is_push(&value) {
            if self.push_tx.send(value).is_err() {
                debug!("push notification dropped, sink consumer is gone");
            }
            return Ok(());
        }

        if self.pending_acks > 0 && self.matcher.is_subscription_ack(&value) {
            self.pending_acks -= 1;
            self.track_subscriptions(&value);
            if self.push_tx.send(value).is_err() {
                debug!("subscription acknowledgement dropped, sink consumer is gone");
            }
            return Ok(());
        }

        match self.slot_rx.try_recv() {
            Ok(slot) => {
                if slot.expected_acks > 0 && self.matcher.is_subscription_ack(&value) {
                    self.track_subscriptions(&value);
                    self.pending_acks = slot.expected_acks - 1;
                }
                let result = match value {
                    Value::Error(message) => {
                        Err(Error::Server(String::from_utf8_lossy(&message).into_owned()))
                    }
                    value => Ok(value),
                };
                if slot.tx.send(result).is_err() {
                    debug!("reply for an abandoned command discarded");
                }
                Ok(())
            }
            Err(_) => {
                // A bare UNSUBSCRIBE acknowledges every channel it drops,
                // a count not knowable at submit time; acks beyond the
                // slot still drive the mode and surface through the push
                // sink.
                if self.subscribed() && self.matcher.is_subscription_ack(&value) {
                    self.track_subscriptions(&value);
                    let _ = self.push_tx.send(value);
                    Ok(())
                } else {
                    Err(Error::UnexpectedReply)
                }
            }
        }
    }

    fn track_subscriptions(&mut self, value: &Value) {
        if let Some(count) = self.matcher.ack_count(value) {
            self.subscriptions = count.max(0) as u64;
        }
    }

    /// Resolve every outstanding slot with the broken-connection error.
    fn fail_outstanding(&mut self, cause: Arc<Error>) {
        self.slot_rx.close();
        while let Ok(slot) = self.slot_rx.try_recv() {
            if slot.tx.send(Err(Error::broken(cause.clone()))).is_err() {
                debug!("broken-connection error for an abandoned command discarded");
            }
        }
    }
}
