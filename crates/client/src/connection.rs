//! A pooled connection and the transactions multiplexed over it.
//!
//! Every request on a connection is a [`Transaction`] numbered in the order it
//! was issued. Two counters decide whose turn it is: a transaction may write
//! once `write_count` reaches its number and may read once `read_count` does.
//! Closing a phase bumps the matching counter, which hands the turn to the next
//! transaction. With several transactions in flight this gives HTTP/1.1
//! pipelining: request N+1 is written while response N is still being read,
//! and responses are matched to requests purely by order.
//!
//! A phase that is dropped before being closed (an error, a timeout, a
//! cancelled future) leaves the wire in an unknown state, so the connection is
//! marked closed. The counter is still advanced and every waiter woken; they
//! observe the closed flag and fail instead of waiting forever.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use bytes::BytesMut;
use micro_http1::codec::Parser;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{MutexGuard, watch};
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::config::PoolConfig;
use crate::pool::Lease;
use crate::transport::{Activity, BoxedIo, ConnectionKey, Tracked};
use crate::Error;

const READ_CHUNK_SIZE: usize = 8 * 1024;

type Transport = Tracked<BoxedIo>;

pub struct Connection {
    id: u64,
    key: ConnectionKey,
    pipeline_limit: usize,
    reuse_limit: Option<usize>,

    reader: tokio::sync::Mutex<ReadState>,
    writer: tokio::sync::Mutex<WriteHalf<Transport>>,
    activity: Arc<Activity>,

    /// Transactions issued so far; the next one gets this number.
    sequence: AtomicU64,
    write_count: watch::Sender<u64>,
    read_count: watch::Sender<u64>,

    closed: AtomicBool,
    outstanding: AtomicUsize,
    last_used: Mutex<Instant>,
}

/// Read side state, owned by whichever transaction holds the read turn.
struct ReadState {
    io: ReadHalf<Transport>,
    /// Bytes read from the transport and not yet consumed by a response.
    excess: BytesMut,
    parser: Parser,
}

impl Connection {
    pub fn new(id: u64, key: ConnectionKey, io: BoxedIo, config: &PoolConfig) -> Self {
        let activity = Arc::new(Activity::new());
        let (read_half, write_half) = tokio::io::split(Tracked::new(io, Arc::clone(&activity)));

        Self {
            id,
            key,
            pipeline_limit: config.pipeline_limit.max(1),
            reuse_limit: config.reuse_limit,
            reader: tokio::sync::Mutex::new(ReadState {
                io: read_half,
                excess: BytesMut::with_capacity(READ_CHUNK_SIZE),
                parser: Parser::new(),
            }),
            writer: tokio::sync::Mutex::new(write_half),
            activity,
            sequence: AtomicU64::new(0),
            write_count: watch::Sender::new(0),
            read_count: watch::Sender::new(0),
            closed: AtomicBool::new(false),
            outstanding: AtomicUsize::new(0),
            last_used: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn key(&self) -> &ConnectionKey {
        &self.key
    }

    pub fn pipeline_limit(&self) -> usize {
        self.pipeline_limit
    }

    /// Marks the connection unusable and wakes every transaction waiting for
    /// a turn on it.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(id = self.id, key = %self.key, "connection closed");
        }
        self.write_count.send_modify(|_| {});
        self.read_count.send_modify(|_| {});
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Transactions issued and not yet released.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Transactions issued over the connection's lifetime.
    pub fn issued(&self) -> u64 {
        self.sequence.load(Ordering::Acquire)
    }

    /// The reuse limit is used up; no further transactions may be issued.
    pub fn is_exhausted(&self) -> bool {
        self.reuse_limit.is_some_and(|limit| self.issued() >= limit as u64)
    }

    /// Open, under the reuse limit and with room in the pipeline.
    pub fn is_available(&self) -> bool {
        !self.is_closed() && !self.is_exhausted() && self.outstanding() < self.pipeline_limit
    }

    pub fn last_used(&self) -> Instant {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn touch_used(&self) {
        *self.last_used.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    /// When response bytes last arrived.
    pub fn last_activity(&self) -> Instant {
        self.activity.last()
    }

    /// Issues the next transaction. Callers check [`is_available`](Self::is_available)
    /// first; the pool does this under its lock.
    pub(crate) fn issue(self: &Arc<Self>, lease: Option<Lease>) -> Transaction {
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        let sequence = self.sequence.fetch_add(1, Ordering::AcqRel);
        trace!(id = self.id, sequence, "transaction issued");

        Transaction {
            connection: Arc::clone(self),
            sequence,
            write_done: AtomicBool::new(false),
            read_done: AtomicBool::new(false),
            _lease: lease,
        }
    }

    pub(crate) fn release(&self) {
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
        self.touch_used();
    }

    fn advance(counter: &watch::Sender<u64>, past: u64) {
        counter.send_modify(|count| *count = (*count).max(past + 1));
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("issued", &self.issued())
            .field("outstanding", &self.outstanding())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// One request/response exchange on a [`Connection`].
///
/// Dropping a transaction whose phases were not both closed closes the
/// connection.
pub struct Transaction {
    connection: Arc<Connection>,
    sequence: u64,
    write_done: AtomicBool,
    read_done: AtomicBool,
    _lease: Option<Lease>,
}

impl Transaction {
    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// This is the last transaction the reuse limit allows on the connection.
    pub fn is_last_allowed(&self) -> bool {
        self.connection.reuse_limit.is_some_and(|limit| self.sequence + 1 >= limit as u64)
    }

    /// Waits for this transaction's turn to write.
    pub async fn start_write(&self) -> Result<WritePhase<'_>, Error> {
        let connection = &self.connection;
        let mut turn = connection.write_count.subscribe();
        turn.wait_for(|count| *count >= self.sequence || connection.is_closed()).await.map_err(|_| Error::closed())?;
        if connection.is_closed() {
            return Err(Error::closed());
        }

        let writer = connection.writer.lock().await;
        trace!(id = connection.id, sequence = self.sequence, "write turn");
        Ok(WritePhase { transaction: self, writer, closed: false })
    }

    /// Waits for this transaction's turn to read.
    pub async fn start_read(&self) -> Result<ReadPhase<'_>, Error> {
        let connection = &self.connection;
        let mut turn = connection.read_count.subscribe();
        turn.wait_for(|count| *count >= self.sequence || connection.is_closed()).await.map_err(|_| Error::closed())?;
        if connection.is_closed() {
            return Err(Error::closed());
        }

        let state = connection.reader.lock().await;
        trace!(id = connection.id, sequence = self.sequence, "read turn");
        Ok(ReadPhase { transaction: self, state, closed: false })
    }

    pub fn is_complete(&self) -> bool {
        self.write_done.load(Ordering::Acquire) && self.read_done.load(Ordering::Acquire)
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if !self.is_complete() {
            debug!(id = self.connection.id, sequence = self.sequence, "transaction abandoned");
            self.connection.close();
            Connection::advance(&self.connection.write_count, self.sequence);
            Connection::advance(&self.connection.read_count, self.sequence);
        }
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("connection", &self.connection.id)
            .field("sequence", &self.sequence)
            .field("write_done", &self.write_done)
            .field("read_done", &self.read_done)
            .finish_non_exhaustive()
    }
}

/// Exclusive use of the connection's write half.
pub struct WritePhase<'a> {
    transaction: &'a Transaction,
    writer: MutexGuard<'a, WriteHalf<Transport>>,
    closed: bool,
}

impl WritePhase<'_> {
    pub async fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf).await
    }

    pub async fn flush(&mut self) -> io::Result<()> {
        self.writer.flush().await
    }

    /// Ends the write turn; the next transaction may start writing.
    pub fn close_write(mut self) {
        self.closed = true;
        self.transaction.write_done.store(true, Ordering::Release);
        trace!(id = self.transaction.connection.id, sequence = self.transaction.sequence, "close write");
    }
}

impl Drop for WritePhase<'_> {
    fn drop(&mut self) {
        let transaction = self.transaction;
        if !self.closed {
            transaction.connection.close();
        }
        Connection::advance(&transaction.connection.write_count, transaction.sequence);
    }
}

/// Exclusive use of the connection's read half, excess buffer and parser.
pub struct ReadPhase<'a> {
    transaction: &'a Transaction,
    state: MutexGuard<'a, ReadState>,
    closed: bool,
}

impl ReadPhase<'_> {
    /// Reads more bytes from the transport into the excess buffer. `Ok(0)` is
    /// EOF.
    pub async fn read_more(&mut self) -> io::Result<usize> {
        let state = &mut *self.state;
        state.excess.reserve(READ_CHUNK_SIZE);
        let n = state.io.read_buf(&mut state.excess).await?;
        trace!(id = self.transaction.connection.id, n, "read from transport");
        Ok(n)
    }

    /// Pushes bytes back in front of the excess buffer; the next parse sees
    /// them first.
    pub fn unread(&mut self, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        let state = &mut *self.state;
        let mut buffer = BytesMut::with_capacity(bytes.len() + state.excess.len());
        buffer.extend_from_slice(bytes);
        buffer.extend_from_slice(&state.excess);
        state.excess = buffer;
    }

    /// The connection's parser and the bytes it has not consumed yet.
    pub fn parts(&mut self) -> (&mut Parser, &mut BytesMut) {
        let state = &mut *self.state;
        (&mut state.parser, &mut state.excess)
    }

    pub fn excess(&self) -> &[u8] {
        &self.state.excess
    }

    pub fn transaction(&self) -> &Transaction {
        self.transaction
    }

    /// Ends the read turn; the next transaction may start reading.
    pub fn close_read(mut self) {
        self.closed = true;
        self.transaction.read_done.store(true, Ordering::Release);
        trace!(id = self.transaction.connection.id, sequence = self.transaction.sequence, "close read");
    }
}

impl Drop for ReadPhase<'_> {
    fn drop(&mut self) {
        let transaction = self.transaction;
        if !self.closed {
            transaction.connection.close();
        }
        Connection::advance(&transaction.connection.read_count, transaction.sequence);
    }
}
