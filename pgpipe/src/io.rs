//! Poll based io helpers over tokio io traits.
use bytes::{Buf, BufMut, BytesMut};
use std::{
    io::{self, IoSlice},
    pin::Pin,
    task::{Context, Poll, ready},
};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Read into the spare capacity of `buf`, reserving `reserve` bytes first.
///
/// Returns `0` on eof.
pub fn poll_read<R>(reader: &mut R, buf: &mut BytesMut, reserve: usize, cx: &mut Context) -> Poll<io::Result<usize>>
where
    R: AsyncRead + Unpin + ?Sized,
{
    buf.reserve(reserve);

    let n = {
        let dst = buf.chunk_mut();
        // SAFETY: `ReadBuf` never de-initialize bytes and we only advance by `filled`
        let dst = unsafe { dst.as_uninit_slice_mut() };
        let mut read = ReadBuf::uninit(dst);
        let ptr = read.filled().as_ptr();
        ready!(Pin::new(reader).poll_read(cx, &mut read)?);

        // Ensure the pointer does not change from under us
        assert_eq!(ptr, read.filled().as_ptr());
        read.filled().len()
    };

    // SAFETY: This is guaranteed to be the number of initialized (and read)
    // bytes due to the invariants provided by `ReadBuf::filled`.
    unsafe {
        buf.advance_mut(n);
    }

    Poll::Ready(Ok(n))
}

/// Write the whole `buf` then flush `writer`.
pub fn poll_write_all<W>(writer: &mut W, buf: &mut BytesMut, cx: &mut Context) -> Poll<io::Result<()>>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    const MAX_VECTOR_ELEMENTS: usize = 64;

    while buf.has_remaining() {
        let n = if writer.is_write_vectored() {
            let mut slices = [IoSlice::new(&[]); MAX_VECTOR_ELEMENTS];
            let cnt = buf.chunks_vectored(&mut slices);
            ready!(Pin::new(&mut *writer).poll_write_vectored(cx, &slices[..cnt]))?
        } else {
            ready!(Pin::new(&mut *writer).poll_write(cx, buf.chunk())?)
        };
        if n == 0 {
            return Poll::Ready(Err(io::ErrorKind::WriteZero.into()));
        }
        buf.advance(n);
    }

    Pin::new(writer).poll_flush(cx)
}
