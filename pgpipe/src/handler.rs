//! Caller facing handler contracts.
//!
//! Every request submitted to a [`RequestExecutor`][crate::RequestExecutor] is
//! bound to one [`Handler`] which receives [`Event`]s in wire order.
use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use std::{
    io,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll},
};
use tokio::{io::AsyncRead, sync::mpsc::{UnboundedReceiver, UnboundedSender}};

use crate::{
    Error,
    common::ByteStr,
    notice::Notice,
    row::ResultBatch,
    transaction::TransactionStatus,
};

/// Events delivered to a request [`Handler`].
///
/// Every request receives exactly one terminal event, `Complete`, `Suspend`,
/// `FunctionResult` or `Error`, with the exception of simple query which
/// receives one `Complete` per statement. Synchronized requests also receive
/// exactly one `Ready`, after their terminal events.
#[derive(Debug)]
pub enum Event {
    /// A statement completed.
    Complete {
        batch: ResultBatch,
        notices: Vec<Notice>,
    },
    /// The row limit was reached, the portal can be resumed.
    Suspend {
        batch: ResultBatch,
        notices: Vec<Notice>,
    },
    /// Result of a function call, `None` for NULL.
    FunctionResult {
        value: Option<Bytes>,
        notices: Vec<Notice>,
    },
    Error {
        error: Error,
        notices: Vec<Notice>,
    },
    /// The backend reached a synchronization point.
    Ready(TransactionStatus),
}

impl Event {
    /// Returns `true` for `Complete`, `Suspend`, `FunctionResult` and `Error`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Event::Ready(_))
    }
}

/// Receiver of request [`Event`]s.
///
/// A handler whose observer is gone should silently drop events, routing
/// continues regardless.
pub trait Handler: Send {
    fn handle(&mut self, event: Event);
}

impl<F> Handler for F
where
    F: FnMut(Event) + Send,
{
    fn handle(&mut self, event: Event) {
        self(event)
    }
}

impl Handler for UnboundedSender<Event> {
    fn handle(&mut self, event: Event) {
        let _ = self.send(event);
    }
}

/// Asynchronous notification raised by `NOTIFY`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// The process ID of the notifying backend process.
    pub process_id: u32,
    pub channel: ByteStr,
    pub payload: ByteStr,
}

/// Receiver of [`Notification`]s, delivered outside of the request queue.
pub trait NotificationHandler: Send {
    fn notification(&mut self, notification: Notification);
}

impl<F> NotificationHandler for F
where
    F: FnMut(Notification) + Send,
{
    fn notification(&mut self, notification: Notification) {
        self(notification)
    }
}

impl NotificationHandler for UnboundedSender<Notification> {
    fn notification(&mut self, notification: Notification) {
        let _ = self.send(notification);
    }
}

/// [`Stream`] of notifications, see [`Connection::notifications`][crate::Connection::notifications].
#[derive(Debug)]
pub struct Notifications {
    pub(crate) recv: UnboundedReceiver<Notification>,
}

impl Stream for Notifications {
    type Item = Notification;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.recv.poll_recv(cx)
    }
}

/// Data source streamed to the backend by `copy_in`.
pub type CopySource = Box<dyn AsyncRead + Send + Unpin>;

/// Destination of the data streamed by `copy_out`.
pub trait CopySink: Send {
    fn write(&mut self, chunk: Bytes) -> io::Result<()>;
}

/// Shared buffer, readable by the caller once the copy completes.
impl CopySink for Arc<Mutex<BytesMut>> {
    fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        let mut buf = self.lock().map_err(|_| io::Error::other("copy buffer poisoned"))?;
        buf.extend_from_slice(&chunk);
        Ok(())
    }
}

impl CopySink for UnboundedSender<Bytes> {
    fn write(&mut self, chunk: Bytes) -> io::Result<()> {
        self.send(chunk).map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "copy receiver dropped"))
    }
}
