//! Buffered postgres message framing over any tokio io.
use bytes::{Buf, BytesMut};
use std::{
    io,
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};

use crate::{
    Error, Result,
    common::verbose,
    connection::Config,
    io::{poll_read, poll_write_all},
    postgres::{BackendProtocol, FrontendProtocol, ProtocolError, frontend},
    transport::PgTransport,
};

const DEFAULT_BUF_CAPACITY: usize = 1024;

// msgtype + length
const HEADER: usize = 1 + 4;

/// Buffered stream to postgres.
#[derive(Debug)]
pub struct PgStream<S = TcpStream> {
    io: S,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl PgStream<TcpStream> {
    pub async fn connect(config: &Config) -> io::Result<Self> {
        let socket = TcpStream::connect((config.host.as_str(), config.port)).await?;
        socket.set_nodelay(true)?;
        Ok(Self::new(socket))
    }
}

impl<S> PgStream<S> {
    /// Frame messages over an already connected io.
    pub fn new(io: S) -> Self {
        Self {
            io,
            read_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
            write_buf: BytesMut::with_capacity(DEFAULT_BUF_CAPACITY),
        }
    }

    pub fn get_ref(&self) -> &S {
        &self.io
    }

    pub fn into_inner(self) -> S {
        self.io
    }

    /// Split a complete message out of the read buffer.
    ///
    /// Returns the number of bytes still missing otherwise.
    fn try_frame<B: BackendProtocol>(&mut self) -> Result<Result<B, usize>> {
        let Some(mut header) = self.read_buf.get(..HEADER) else {
            return Ok(Err(HEADER - self.read_buf.len()));
        };

        let msgtype = header.get_u8();
        let len = header.get_u32() as usize;

        if len < 4 {
            return Err(ProtocolError::malformed("message length").into());
        }

        if self.read_buf.len() < 1 + len {
            return Ok(Err(1 + len - self.read_buf.len()));
        }

        self.read_buf.advance(HEADER);
        let body = self.read_buf.split_to(len - 4).freeze();

        verbose!(message = crate::postgres::BackendMessage::message_name(msgtype), len, "recv");

        Ok(Ok(B::decode(msgtype, body)?))
    }
}

impl<S> PgTransport for PgStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    fn poll_flush(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        poll_write_all(&mut self.io, &mut self.write_buf, cx)
    }

    fn poll_recv<B: BackendProtocol>(&mut self, cx: &mut Context) -> Poll<Result<B>> {
        // a pending flush must not block reading, the backend may be waiting
        // for us to drain its output
        if !self.write_buf.is_empty() {
            if let Poll::Ready(Err(err)) = self.poll_flush(cx) {
                return Poll::Ready(Err(err.into()));
            }
        }

        loop {
            let missing = match self.try_frame()? {
                Ok(msg) => return Poll::Ready(Ok(msg)),
                Err(missing) => missing,
            };

            let n = ready!(poll_read(&mut self.io, &mut self.read_buf, missing.max(DEFAULT_BUF_CAPACITY), cx)?);
            if n == 0 {
                return Poll::Ready(Err(Error::closed().context("unexpected eof")));
            }
        }
    }

    fn send<F: FrontendProtocol>(&mut self, message: F) {
        frontend::write(message, &mut self.write_buf);
    }

    fn send_startup(&mut self, startup: frontend::Startup) {
        startup.write(&mut self.write_buf);
    }

    fn poll_shutdown(&mut self, cx: &mut Context) -> Poll<io::Result<()>> {
        ready!(self.poll_flush(cx))?;
        Pin::new(&mut self.io).poll_shutdown(cx)
    }
}

#[cfg(test)]
mod test {
    use bytes::BufMut;
    use tokio::io::AsyncWriteExt;

    use super::*;
    use crate::{
        postgres::{BackendMessage, frontend::Sync},
        transaction::TransactionStatus,
        transport::PgTransportExt,
    };

    #[tokio::test]
    async fn frames_split_reads() {
        let (client, mut server) = tokio::io::duplex(64);
        let mut stream = PgStream::new(client);

        let mut frame = BytesMut::new();
        frame.put_u8(b'Z');
        frame.put_u32(5);
        frame.put_u8(b'T');

        let task = tokio::spawn(async move {
            server.write_all(&frame[..3]).await.unwrap();
            tokio::task::yield_now().await;
            server.write_all(&frame[3..]).await.unwrap();
            server
        });

        stream.send(Sync);
        match stream.recv::<BackendMessage>().await.unwrap() {
            BackendMessage::ReadyForQuery(r) => assert_eq!(r.status, TransactionStatus::InTransaction),
            msg => panic!("unexpected {msg:?}"),
        }
        drop(task.await.unwrap());

        let err = stream.recv::<BackendMessage>().await.unwrap_err();
        assert!(err.is_closed());
    }
}
