use std::{
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::sync::mpsc::UnboundedReceiver;

use super::Job;
use crate::{
    common::verbose,
    connection::Connection,
    executor::RequestExecutor,
    stream::PgStream,
    transport::PgTransport,
};

/// Future owning a [`Connection`], running submissions of its
/// [`Client`][super::Client]s and dispatching responses.
///
/// Resolves when every client is dropped and the queue is drained, or when
/// the connection fails.
pub struct Worker<IO = PgStream> {
    conn: Connection<IO>,
    recv: UnboundedReceiver<Job>,
    closing: bool,
}

impl<IO: PgTransport> Worker<IO> {
    pub(crate) fn new(conn: Connection<IO>, recv: UnboundedReceiver<Job>) -> Self {
        Self { conn, recv, closing: false }
    }
}

impl<IO: PgTransport> Future for Worker<IO> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context) -> Poll<Self::Output> {
        let Worker { conn, recv, closing } = self.get_mut();

        // Collect all submissions upfront, they are pipelined in one flush
        while !*closing {
            match recv.poll_recv(cx) {
                Poll::Ready(Some(job)) => job(&mut *conn as &mut dyn RequestExecutor),
                Poll::Ready(None) => {
                    verbose!(pending = conn.pending(), "all clients dropped");
                    *closing = true;
                },
                Poll::Pending => break,
            }
        }

        loop {
            if *closing && conn.pending() == 0 {
                if let Err(_err) = ready!(conn.poll_terminate(cx)) {
                    #[cfg(feature = "log")]
                    log::error!("terminate error: {_err}");
                }
                return Poll::Ready(());
            }

            match conn.poll_dispatch(cx) {
                Poll::Ready(Ok(())) => {},
                Poll::Ready(Err(_err)) => {
                    #[cfg(feature = "log")]
                    log::error!("connection worker stopped: {_err}");

                    // late submissions fail on the closed connection
                    recv.close();
                    while let Ok(job) = recv.try_recv() {
                        job(&mut *conn as &mut dyn RequestExecutor);
                    }
                    return Poll::Ready(());
                },
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl<IO> std::fmt::Debug for Worker<IO> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("conn", &self.conn)
            .field("closing", &self.closing)
            .finish()
    }
}
