//! Pipelines against a scripted backend on an in-memory stream.
use bytes::{Buf, BufMut, Bytes, BytesMut};
use pgpipe::{
    Binding, Client, Collector, Completion, Connection, ErrorKind, Event, Notification, PgStream,
    PortalName, PortalState, RequestExecutor, ServerObjectType, StatementName, TransactionStatus,
};
use std::{
    sync::{Arc, Mutex},
    time::Duration,
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt, DuplexStream},
    sync::mpsc,
};

/// Backend half of the stream.
struct Backend {
    io: DuplexStream,
    buf: BytesMut,
}

impl Backend {
    /// Read one frontend message.
    async fn recv(&mut self) -> (u8, Bytes) {
        loop {
            if self.buf.len() >= 5 {
                let len = u32::from_be_bytes(self.buf[1..5].try_into().unwrap()) as usize;
                if self.buf.len() > len {
                    let mut frame = self.buf.split_to(1 + len).freeze();
                    let msgtype = frame.get_u8();
                    frame.advance(4);
                    return (msgtype, frame);
                }
            }
            let n = self.io.read_buf(&mut self.buf).await.unwrap();
            assert_ne!(n, 0, "frontend closed");
        }
    }

    /// Read messages until and including `msgtype`, returns every message type read.
    async fn recv_until(&mut self, msgtype: u8) -> Vec<u8> {
        let mut seen = vec![];
        loop {
            let (m, _) = self.recv().await;
            seen.push(m);
            if m == msgtype {
                return seen;
            }
        }
    }

    async fn send(&mut self, frames: impl IntoIterator<Item = BytesMut>) {
        for frame in frames {
            self.io.write_all(&frame).await.unwrap();
        }
    }
}

fn setup() -> (Connection<PgStream<DuplexStream>>, Backend) {
    let (client, server) = tokio::io::duplex(64 * 1024);
    let conn = Connection::new(PgStream::new(client));
    (conn, Backend { io: server, buf: BytesMut::new() })
}

// backend frames

fn frame(msgtype: u8, body: impl FnOnce(&mut BytesMut)) -> BytesMut {
    let mut buf = BytesMut::new();
    buf.put_u8(msgtype);
    buf.put_u32(0);
    body(&mut buf);
    let len = (buf.len() - 1) as u32;
    buf[1..5].copy_from_slice(&len.to_be_bytes());
    buf
}

fn nul(buf: &mut BytesMut, s: &str) {
    buf.put_slice(s.as_bytes());
    buf.put_u8(0);
}

fn ready(status: u8) -> BytesMut {
    frame(b'Z', |b| b.put_u8(status))
}

fn complete(tag: &str) -> BytesMut {
    frame(b'C', |b| nul(b, tag))
}

fn fields(names: &[&str]) -> BytesMut {
    frame(b'T', |b| {
        b.put_u16(names.len() as u16);
        for name in names {
            nul(b, name);
            b.put_u32(0);
            b.put_i16(0);
            b.put_u32(23);
            b.put_i16(4);
            b.put_i32(-1);
            b.put_i16(0);
        }
    })
}

fn row(values: &[Option<&str>]) -> BytesMut {
    frame(b'D', |b| {
        b.put_u16(values.len() as u16);
        for value in values {
            match value {
                Some(v) => {
                    b.put_i32(v.len() as i32);
                    b.put_slice(v.as_bytes());
                },
                None => b.put_i32(-1),
            }
        }
    })
}

fn error(code: &str, message: &str) -> BytesMut {
    frame(b'E', |b| {
        b.put_u8(b'S');
        nul(b, "ERROR");
        b.put_u8(b'V');
        nul(b, "ERROR");
        b.put_u8(b'C');
        nul(b, code);
        b.put_u8(b'M');
        nul(b, message);
        b.put_u8(0);
    })
}

fn notice(message: &str) -> BytesMut {
    frame(b'N', |b| {
        b.put_u8(b'V');
        nul(b, "WARNING");
        b.put_u8(b'C');
        nul(b, "01000");
        b.put_u8(b'M');
        nul(b, message);
        b.put_u8(0);
    })
}

fn empty(msgtype: u8) -> BytesMut {
    frame(msgtype, |_| {})
}

fn copy_response(msgtype: u8) -> BytesMut {
    frame(msgtype, |b| {
        b.put_u8(0);
        b.put_u16(1);
        b.put_u16(0);
    })
}

fn copy_data(data: &str) -> BytesMut {
    frame(b'd', |b| b.put_slice(data.as_bytes()))
}

#[tokio::test]
async fn pipelined_queries_in_order() {
    let (mut conn, mut backend) = setup();

    let (first, first_res) = Collector::new(Completion::Ready);
    let (second, second_res) = Collector::new(Completion::Ready);
    conn.query("SELECT 1 AS n", Box::new(first)).unwrap();
    conn.query("INSERT INTO t VALUES (1),(2)", Box::new(second)).unwrap();
    assert_eq!(conn.pending(), 2);
    conn.flush().await.unwrap();

    assert_eq!(backend.recv().await.0, b'Q');
    assert_eq!(backend.recv().await.0, b'Q');
    backend.send([
        fields(&["n"]), row(&[Some("1")]), complete("SELECT 1"), ready(b'I'),
        complete("INSERT 0 2"), ready(b'I'),
    ]).await;

    conn.dispatch_all().await.unwrap();
    assert_eq!(conn.pending(), 0);
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::Idle));

    let first = first_res.await.unwrap();
    let row = first.rows().next().unwrap();
    assert_eq!(row.get_str(0), Some("1"));
    assert_eq!(first.batches[0].fields[0].name, "n");
    assert_eq!(first.status, Some(TransactionStatus::Idle));

    let second = second_res.await.unwrap();
    assert_eq!(second.rows_affected(), 2);
    assert_eq!(second.batches[0].command.as_ref().unwrap(), "INSERT");
}

#[tokio::test]
async fn suspend_and_resume_portal() {
    let (mut conn, mut backend) = setup();
    let portal = PortalName::unnamed();

    let (first, first_res) = Collector::new(Completion::Terminal);
    conn.query_extended("SELECT n FROM t", &portal, &Binding::new(), 1, Box::new(first)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv_until(b'H').await, b"PDBEH");
    backend.send([
        empty(b'1'),
        frame(b't', |b| b.put_u16(0)),
        fields(&["n"]),
        empty(b'2'),
        row(&[Some("\0\0\0\x01")]),
        empty(b's'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let first = first_res.await.unwrap();
    assert!(first.suspended);
    assert_eq!(first.rows().count(), 1);
    assert_eq!(conn.portals().state(&portal), Some(PortalState::Suspended));

    let (second, second_res) = Collector::new(Completion::Terminal);
    conn.resume(&portal, 0, Box::new(second)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv_until(b'S').await, b"ES");
    backend.send([row(&[Some("\0\0\0\x02")]), complete("SELECT 2"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    let second = second_res.await.unwrap();
    assert!(!second.suspended);
    assert_eq!(second.rows().count(), 1);
    assert_eq!(second.rows().next().unwrap().get(0), Some(&[0, 0, 0, 2][..]));
    // the tag counts every row the portal produced, the suspended segment has none
    assert_eq!(second.rows_affected(), 2);
    assert_eq!(first.rows_affected(), 0);
    assert_eq!(first.batches[0].rows_affected, None);
    assert_eq!(conn.portals().state(&portal), Some(PortalState::Closed));
}

#[tokio::test]
async fn fewer_rows_than_limit_exhausts_portal() {
    let (mut conn, mut backend) = setup();
    let portal = PortalName::new("c1");

    let (handler, res) = Collector::new(Completion::Terminal);
    conn.query_extended("SELECT 1", &portal, &Binding::new(), 5, Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    backend.recv_until(b'H').await;
    backend.send([
        empty(b'1'),
        frame(b't', |b| b.put_u16(0)),
        fields(&["n"]),
        empty(b'2'),
        row(&[Some("\0\0\0\x01")]),
        complete("SELECT 1"),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let outcome = res.await.unwrap();
    assert!(!outcome.suspended);
    assert_eq!(outcome.rows().count(), 1);
    assert_eq!(conn.portals().state(&portal), Some(PortalState::Exhausted));

    let (handler, _) = Collector::new(Completion::Terminal);
    let err = conn.resume(&portal, 5, Box::new(handler)).unwrap_err();
    assert!(err.is_submission());
    assert_eq!(conn.pending(), 0);
}

#[tokio::test]
async fn prepare_describes_statement() {
    let (mut conn, mut backend) = setup();
    let statement = StatementName::new("by_id");

    let (handler, res) = Collector::new(Completion::Terminal);
    conn.prepare(&statement, "SELECT a, b FROM t WHERE id = $1 AND name = $2", &[23], Box::new(handler))
        .unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv_until(b'S').await, b"PDS");
    backend.send([
        empty(b'1'),
        frame(b't', |b| {
            b.put_u16(2);
            b.put_u32(23);
            b.put_u32(25);
        }),
        fields(&["a", "b"]),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let outcome = res.await.unwrap();
    let batch = outcome.last_batch().unwrap();
    assert_eq!(batch.command, None);
    assert!(batch.rows.is_empty());
    assert_eq!(batch.param_types, [23, 25]);
    assert_eq!(batch.fields.len(), 2);
    assert_eq!(outcome.status, None);

    let prepared = conn.statements().get(&statement).unwrap();
    assert_eq!(prepared.param_types, [23, 25]);
    assert_eq!(prepared.fields.as_ref().map(Vec::len), Some(2));
}

#[tokio::test]
async fn prepared_portal_lifecycle() {
    let (mut conn, mut backend) = setup();
    let statement = StatementName::new("s1");
    let portal = PortalName::new("c1");

    let (handler, res) = Collector::new(Completion::Terminal);
    conn.prepare(&statement, "SELECT a FROM t", &[], Box::new(handler)).unwrap();
    conn.flush().await.unwrap();
    backend.recv_until(b'S').await;
    backend.send([empty(b'1'), frame(b't', |b| b.put_u16(0)), fields(&["a"]), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();
    res.await.unwrap();

    // fields come from the statement tracker, nothing is described
    let (handler, res) = Collector::new(Completion::Terminal);
    let binding = Binding::new().results(pgpipe::PgFormat::Text);
    conn.execute(&portal, &statement, &binding, 1, Box::new(handler)).unwrap();
    conn.flush().await.unwrap();
    assert_eq!(backend.recv_until(b'H').await, b"BEH");
    backend.send([empty(b'2'), row(&[Some("1")]), empty(b's')]).await;
    conn.dispatch_all().await.unwrap();

    let outcome = res.await.unwrap();
    assert!(outcome.suspended);
    let batch = outcome.last_batch().unwrap();
    assert_eq!(batch.fields[0].name, "a");
    assert_eq!(batch.rows[0].get_str(0), Some("1"));

    let (handler, res) = Collector::new(Completion::Ready);
    conn.query_portal(&portal, 0, Box::new(handler)).unwrap();
    conn.flush().await.unwrap();
    assert_eq!(backend.recv_until(b'S').await, b"DES");
    backend.send([fields(&["a"]), row(&[Some("2")]), complete("SELECT 1"), ready(b'T')]).await;
    conn.dispatch_all().await.unwrap();

    let outcome = res.await.unwrap();
    assert_eq!(outcome.rows().next().unwrap().get_str(0), Some("2"));
    assert_eq!(conn.portals().state(&portal), Some(PortalState::Exhausted));

    let (handler, res) = Collector::new(Completion::Ready);
    conn.finish(&portal, Box::new(handler)).unwrap();
    conn.flush().await.unwrap();
    assert_eq!(backend.recv_until(b'S').await, b"CS");
    backend.send([empty(b'3'), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    assert_eq!(res.await.unwrap().status, Some(TransactionStatus::Idle));
    assert!(conn.portals().state(&portal).is_none_or(|state| !state.is_resumable()));

    let (handler, _) = Collector::new(Completion::Ready);
    let binding = Binding::new()
        .bind("1")
        .bind("2")
        .bind("3")
        .param_format(pgpipe::PgFormat::Text)
        .param_format(pgpipe::PgFormat::Binary);
    let err = conn.execute(&portal, &statement, &binding, 0, Box::new(handler)).unwrap_err();
    assert!(err.is_submission());
}

#[tokio::test]
async fn multi_statement_query() {
    let (mut conn, mut backend) = setup();

    let (tx, mut rx) = mpsc::unbounded_channel();
    conn.query("SELECT 1; SELECT 2", Box::new(tx)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([
        fields(&["a"]), row(&[Some("1")]), complete("SELECT 1"),
        fields(&["b"]), row(&[Some("2")]), complete("SELECT 1"),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let Some(Event::Complete { batch, .. }) = rx.recv().await else { panic!() };
    assert_eq!(batch.rows[0].get_str(0), Some("1"));
    let Some(Event::Complete { batch, .. }) = rx.recv().await else { panic!() };
    assert_eq!(batch.rows[0].get_str(0), Some("2"));
    assert!(matches!(rx.recv().await, Some(Event::Ready(TransactionStatus::Idle))));
    assert!(rx.recv().await.is_none());
}

#[tokio::test]
async fn error_in_transaction_with_notices() {
    let (mut conn, mut backend) = setup();

    let (tx, mut rx) = mpsc::unbounded_channel();
    conn.query("BEGIN; SELECT foo", Box::new(tx)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([
        complete("BEGIN"),
        notice("something odd"),
        error("42703", "column \"foo\" does not exist"),
        ready(b'E'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    assert!(matches!(rx.recv().await, Some(Event::Complete { .. })));
    let Some(Event::Error { error, notices }) = rx.recv().await else { panic!() };
    assert_eq!(error.as_database().unwrap().code, "42703");
    assert_eq!(notices[0].message, "something odd");
    assert!(matches!(rx.recv().await, Some(Event::Ready(TransactionStatus::Failed))));

    let (tx, mut rx) = mpsc::unbounded_channel();
    conn.query("ROLLBACK", Box::new(tx)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([complete("ROLLBACK"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    assert!(matches!(rx.recv().await, Some(Event::Complete { .. })));
    assert!(matches!(rx.recv().await, Some(Event::Ready(TransactionStatus::Idle))));
}

#[tokio::test]
async fn close_nonexistent_is_silent() {
    let (mut conn, mut backend) = setup();

    let (handler, res) = Collector::new(Completion::Ready);
    conn.close(ServerObjectType::Portal, "nonexistent").unwrap();
    conn.query("SELECT 1", Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv_until(b'Q').await, b"CHQ");
    backend.send([empty(b'3'), complete("SELECT 1"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    res.await.unwrap();
}

#[tokio::test]
async fn terminate_fails_queue_in_order() {
    let (mut conn, mut backend) = setup();
    let failed = Arc::new(Mutex::new(vec![]));

    for i in 0..3 {
        let failed = failed.clone();
        let handler = move |event: Event| {
            if let Event::Error { error, .. } = event {
                assert!(error.is_closed());
                failed.lock().unwrap().push(i);
            }
        };
        conn.query("SELECT pg_sleep(10)", Box::new(handler)).unwrap();
    }

    conn.terminate().await.unwrap();
    assert_eq!(*failed.lock().unwrap(), [0, 1, 2]);
    assert_eq!(backend.recv_until(b'X').await, b"QQQX");
    assert!(conn.is_closed());
}

#[tokio::test]
async fn drop_fails_queue_in_order() {
    let (mut conn, mut backend) = setup();
    let failed = Arc::new(Mutex::new(vec![]));

    for i in 0..3 {
        let failed = failed.clone();
        let handler = move |event: Event| {
            if let Event::Error { error, .. } = event {
                assert!(error.is_closed());
                failed.lock().unwrap().push(i);
            }
        };
        conn.query("SELECT pg_sleep(10)", Box::new(handler)).unwrap();
    }
    conn.flush().await.unwrap();
    assert_eq!(backend.recv_until(b'Q').await, b"Q");

    let (handler, res) = Collector::new(Completion::Ready);
    conn.query("SELECT 4", Box::new(handler)).unwrap();

    drop(conn);
    assert_eq!(*failed.lock().unwrap(), [0, 1, 2]);
    assert!(res.await.unwrap_err().is_closed());
}

#[tokio::test]
async fn unsynced_error_aborts_until_sync() {
    let (mut conn, mut backend) = setup();

    let (first, first_res) = Collector::new(Completion::Terminal);
    let (second, second_res) = Collector::new(Completion::Ready);
    let (third, third_res) = Collector::new(Completion::Ready);
    let portal = PortalName::new("p");
    conn.query_extended("SELECT broken", &portal, &Binding::new(), 10, Box::new(first)).unwrap();
    conn.query_extended("SELECT 2", &PortalName::unnamed(), &Binding::new(), 0, Box::new(second)).unwrap();
    conn.query("SELECT 3", Box::new(third)).unwrap();
    conn.flush().await.unwrap();

    backend.recv_until(b'H').await;
    backend.recv_until(b'S').await;
    backend.recv_until(b'Q').await;
    backend.send([
        error("42703", "column \"broken\" does not exist"),
        ready(b'I'),
        complete("SELECT 0"),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let err = first_res.await.unwrap_err();
    assert_eq!(err.as_database().unwrap().code, "42703");

    let err = second_res.await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Aborted(_)));

    // the pipeline recovered at the sync point
    third_res.await.unwrap();
    assert_eq!(conn.portals().state(&portal), None);
}

#[tokio::test]
async fn lazy_execute_error_reaches_next_request() {
    let (mut conn, mut backend) = setup();
    let statement = StatementName::new("s1");

    let (next, next_res) = Collector::new(Completion::Ready);
    conn.lazy_execute(&statement).unwrap();
    conn.query("SELECT 1", Box::new(next)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv_until(b'S').await, b"BES");
    backend.recv_until(b'Q').await;
    backend.send([
        error("26000", "prepared statement \"s1\" does not exist"),
        ready(b'I'),
        complete("SELECT 1"),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let err = next_res.await.unwrap_err();
    assert_eq!(err.as_database().unwrap().code, "26000");
}

#[tokio::test]
async fn lazy_execute_error_held_for_later_submission() {
    let (mut conn, mut backend) = setup();
    let statement = StatementName::new("s1");

    conn.lazy_execute(&statement).unwrap();
    conn.flush().await.unwrap();
    assert_eq!(backend.recv_until(b'S').await, b"BES");
    backend.send([error("26000", "prepared statement \"s1\" does not exist"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();
    assert_eq!(conn.pending(), 0);

    let (next, next_res) = Collector::new(Completion::Ready);
    conn.query("SELECT 1", Box::new(next)).unwrap();
    conn.flush().await.unwrap();
    backend.recv_until(b'Q').await;
    backend.send([complete("SELECT 1"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    let err = next_res.await.unwrap_err();
    assert_eq!(err.as_database().unwrap().code, "26000");

    // delivered once
    let (after, after_res) = Collector::new(Completion::Ready);
    conn.query("SELECT 1", Box::new(after)).unwrap();
    conn.flush().await.unwrap();
    backend.recv_until(b'Q').await;
    backend.send([complete("SELECT 1"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();
    assert_eq!(after_res.await.unwrap().rows_affected(), 1);
}

#[tokio::test]
async fn copy_in_streams_source() {
    let (mut conn, mut backend) = setup();

    let server = tokio::spawn(async move {
        assert_eq!(backend.recv().await.0, b'Q');
        backend.send([copy_response(b'G')]).await;

        let mut data = BytesMut::new();
        loop {
            match backend.recv().await {
                (b'd', chunk) => data.extend_from_slice(&chunk),
                (b'c', _) => break,
                (m, _) => panic!("unexpected message {}", m as char),
            }
        }
        backend.send([complete("COPY 2"), ready(b'I')]).await;
        data
    });

    let (handler, res) = Collector::new(Completion::Ready);
    let source: &'static [u8] = b"1\tfoo\n2\tbar\n";
    conn.copy_in("COPY t FROM STDIN", Box::new(source), Box::new(handler)).unwrap();
    conn.dispatch_all().await.unwrap();

    assert_eq!(res.await.unwrap().rows_affected(), 2);
    assert_eq!(&server.await.unwrap()[..], b"1\tfoo\n2\tbar\n");
}

#[tokio::test]
async fn copy_out_into_sink() {
    let (mut conn, mut backend) = setup();

    let (tx, mut rx) = mpsc::unbounded_channel::<Bytes>();
    let (handler, res) = Collector::new(Completion::Ready);
    conn.copy_out("COPY t TO STDOUT", Box::new(tx), Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv().await.0, b'Q');
    backend.send([
        copy_response(b'H'),
        copy_data("1\tfoo\n"),
        copy_data("2\tbar\n"),
        empty(b'c'),
        complete("COPY 2"),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    assert_eq!(res.await.unwrap().rows_affected(), 2);
    assert_eq!(&rx.recv().await.unwrap()[..], b"1\tfoo\n");
    assert_eq!(&rx.recv().await.unwrap()[..], b"2\tbar\n");
}

#[tokio::test]
async fn copy_out_into_shared_buffer() {
    let (mut conn, mut backend) = setup();

    let sink = Arc::new(Mutex::new(BytesMut::new()));
    let (handler, res) = Collector::new(Completion::Ready);
    conn.copy_out("COPY t TO STDOUT", Box::new(sink.clone()), Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([
        copy_response(b'H'),
        copy_data("1\tfoo\n"),
        copy_data("2\tbar\n"),
        empty(b'c'),
        complete("COPY 2"),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    assert_eq!(res.await.unwrap().rows_affected(), 2);
    assert_eq!(&sink.lock().unwrap()[..], b"1\tfoo\n2\tbar\n");
}

#[tokio::test]
async fn copy_out_without_copy_command() {
    let (mut conn, mut backend) = setup();

    let (handler, res) = Collector::new(Completion::Ready);
    let sink = Arc::new(Mutex::new(BytesMut::new()));
    conn.copy_out("SELECT 1", Box::new(sink.clone()), Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([fields(&["n"]), row(&[Some("1")]), complete("SELECT 1"), ready(b'I')]).await;
    conn.dispatch_all().await.unwrap();

    let err = res.await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Copy(_)));
    assert!(sink.lock().unwrap().is_empty());
}

#[tokio::test]
async fn function_call_result() {
    let (mut conn, mut backend) = setup();

    let (handler, res) = Collector::new(Completion::Terminal);
    conn.call(1598, &Binding::new(), Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    assert_eq!(backend.recv().await.0, b'F');
    backend.send([
        frame(b'V', |b| {
            b.put_i32(4);
            b.put_u32(42);
        }),
        ready(b'I'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    let outcome = res.await.unwrap();
    assert_eq!(outcome.value.as_deref(), Some(&42u32.to_be_bytes()[..]));
}

#[tokio::test]
async fn out_of_band_messages() {
    let (mut conn, mut backend) = setup();

    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    conn.set_notification_handler(tx);

    let (handler, res) = Collector::new(Completion::Ready);
    conn.query("LISTEN jobs", Box::new(handler)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([
        complete("LISTEN"),
        frame(b'A', |b| {
            b.put_u32(7);
            nul(b, "jobs");
            nul(b, "42");
        }),
        frame(b'S', |b| {
            nul(b, "application_name");
            nul(b, "pgpipe");
        }),
        ready(b'T'),
    ]).await;
    conn.dispatch_all().await.unwrap();

    res.await.unwrap();
    let notification = rx.try_recv().unwrap();
    assert_eq!(notification.process_id, 7);
    assert_eq!(notification.channel, "jobs");
    assert_eq!(notification.payload, "42");
    assert_eq!(conn.server_param("application_name"), Some("pgpipe"));
    assert_eq!(conn.transaction_status(), Some(TransactionStatus::InTransaction));
}

#[tokio::test]
async fn desync_fails_every_request() {
    let (mut conn, mut backend) = setup();

    let (first, first_res) = Collector::new(Completion::Ready);
    let (second, second_res) = Collector::new(Completion::Ready);
    conn.query("SELECT 1", Box::new(first)).unwrap();
    conn.query("SELECT 2", Box::new(second)).unwrap();
    conn.flush().await.unwrap();

    backend.recv().await;
    backend.send([empty(b'n')]).await;

    let Err(err) = conn.dispatch_all().await else {
        panic!("desync must be fatal");
    };
    assert!(err.is_closed());
    assert!(conn.is_closed());

    let err = first_res.await.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Protocol(_)));
    assert!(second_res.await.unwrap_err().is_closed());

    let (late, _) = Collector::new(Completion::Ready);
    assert!(conn.query("SELECT 3", Box::new(late)).unwrap_err().is_closed());
}

#[tokio::test]
async fn submission_error_sends_nothing() {
    let (mut conn, _backend) = setup();

    let (handler, _) = Collector::new(Completion::Ready);
    let err = conn
        .query_extended("SELECT 1", &PortalName::unnamed(), &Binding::new(), -1, Box::new(handler))
        .unwrap_err();
    assert!(err.is_submission());
    assert_eq!(conn.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn timeout_keeps_queue_aligned() {
    let (conn, mut backend) = setup();
    let (client, worker) = Client::new(conn);
    let worker = tokio::spawn(worker);

    let slow = client.query("SELECT 1");
    let next = client.query("SELECT 2");

    let err = slow.wait(Duration::from_millis(50)).await.unwrap_err();
    assert!(err.is_timeout());

    backend.recv().await;
    backend.recv().await;
    backend.send([
        complete("SELECT 1"), ready(b'I'),
        complete("SELECT 2"), ready(b'I'),
    ]).await;

    assert_eq!(next.await.unwrap().rows_affected(), 2);

    drop(client);
    worker.await.unwrap();
    assert_eq!(backend.recv().await.0, b'X');
}

#[tokio::test]
async fn client_submission_error() {
    let (conn, _backend) = setup();
    let (client, worker) = Client::new(conn);
    tokio::spawn(worker);

    let err = client.query_extended("SELECT 1", Binding::new(), -5).await.unwrap_err();
    assert!(err.is_submission());
    assert!(!client.is_closed());
}
