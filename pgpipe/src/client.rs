//! Shareable handle to a connection driven by a background worker.
//!
//! ```no_run
//! use pgpipe::{Binding, Client};
//!
//! # async fn app() -> pgpipe::Result<()> {
//! let client = Client::connect_env().await?;
//!
//! let outcome = client.query_extended("SELECT $1::int4 + 1", Binding::new().bind("41"), 0).await?;
//! let row = outcome.rows().next().unwrap();
//! assert_eq!(row.get(0).map(<[u8]>::len), Some(4));
//! # Ok(())
//! # }
//! ```
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedSender};

use crate::{
    Result,
    binding::Binding,
    connection::{Config, Connection},
    executor::RequestExecutor,
    handler::{CopySink, CopySource, Handler},
    postgres::Oid,
    results::{self, Completion, Pending},
    statement::{PortalName, ServerObjectType, StatementName},
    stream::PgStream,
    transport::PgTransport,
};

mod worker;

pub use worker::Worker;

/// A submission run by the worker against its connection.
pub(crate) type Job = Box<dyn FnOnce(&mut dyn RequestExecutor) + Send>;

/// Cloneable handle submitting requests to a [`Worker`].
///
/// Every request returns a [`Pending`], requests of all handles are
/// pipelined on the same connection in submission order.
#[derive(Clone)]
pub struct Client {
    send: UnboundedSender<Job>,
    timeout: Option<Duration>,
}

impl Client {
    /// Create a client and the worker owning `conn`.
    ///
    /// The worker must be polled, e.g. with `tokio::spawn`.
    pub fn new<IO: PgTransport>(conn: Connection<IO>) -> (Client, Worker<IO>) {
        let (send, recv) = mpsc::unbounded_channel();
        (Client { send, timeout: None }, Worker::new(conn, recv))
    }

    /// Connect using url and spawn the worker.
    pub async fn connect(url: &str) -> Result<Client> {
        Self::connect_with(Config::parse(url)?).await
    }

    /// Connect using environment variables and spawn the worker.
    pub async fn connect_env() -> Result<Client> {
        Self::connect_with(Config::from_env()).await
    }

    pub async fn connect_with(config: Config) -> Result<Client> {
        let timeout = config.request_timeout;
        let conn: Connection<PgStream> = Connection::connect_with(config).await?;
        let (client, worker) = Client::new(conn);
        tokio::spawn(worker);
        Ok(client.with_timeout(timeout))
    }

    /// Time to wait for each response, `None` waits forever.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns `true` if the worker stopped.
    pub fn is_closed(&self) -> bool {
        self.send.is_closed()
    }

    /// Submit a request with a collecting handler.
    ///
    /// A submission error completes the returned [`Pending`].
    pub fn submit<F>(&self, completion: Completion, submit: F) -> Pending
    where
        F: FnOnce(&mut dyn RequestExecutor, Box<dyn Handler>) -> Result<()> + Send + 'static,
    {
        let (collector, slot, pending) = results::collector(completion, self.timeout);
        let job: Job = Box::new(move |executor| {
            if let Err(err) = submit(executor, Box::new(collector)) {
                results::send(&slot, Err(err));
            }
        });
        // a stopped worker drops the job, `pending` then resolves as closed
        let _ = self.send.send(job);
        pending
    }

    /// Submit a request without handler.
    fn submit_detached<F>(&self, submit: F)
    where
        F: FnOnce(&mut dyn RequestExecutor) -> Result<()> + Send + 'static,
    {
        let job: Job = Box::new(move |executor| {
            if let Err(_err) = submit(executor) {
                crate::common::warning!("detached submission failed: {_err}");
            }
        });
        let _ = self.send.send(job);
    }

    pub fn query(&self, sql: impl Into<String>) -> Pending {
        let sql = sql.into();
        self.submit(Completion::Ready, move |e, handler| e.query(&sql, handler))
    }

    /// Extended query in the unnamed portal.
    ///
    /// With `max_rows > 0` the outcome may be `suspended`, see
    /// [`resume`][Client::resume].
    pub fn query_extended(&self, sql: impl Into<String>, binding: Binding, max_rows: i32) -> Pending {
        let sql = sql.into();
        self.submit(completion(max_rows), move |e, handler| {
            e.query_extended(&sql, &PortalName::unnamed(), &binding, max_rows, handler)
        })
    }

    /// Prepare a statement, the outcome batch carries its description.
    pub fn prepare(&self, statement: StatementName, sql: impl Into<String>, param_types: Vec<Oid>) -> Pending {
        let sql = sql.into();
        self.submit(Completion::Terminal, move |e, handler| {
            e.prepare(&statement, &sql, &param_types, handler)
        })
    }

    pub fn execute(&self, portal: PortalName, statement: StatementName, binding: Binding, max_rows: i32) -> Pending {
        self.submit(completion(max_rows), move |e, handler| {
            e.execute(&portal, &statement, &binding, max_rows, handler)
        })
    }

    pub fn resume(&self, portal: PortalName, max_rows: i32) -> Pending {
        self.submit(Completion::Terminal, move |e, handler| e.resume(&portal, max_rows, handler))
    }

    pub fn finish(&self, portal: PortalName) -> Pending {
        self.submit(Completion::Ready, move |e, handler| e.finish(&portal, handler))
    }

    pub fn sync(&self) -> Pending {
        self.submit(Completion::Ready, move |e, handler| e.sync(handler))
    }

    pub fn call(&self, function: Oid, binding: Binding) -> Pending {
        self.submit(Completion::Terminal, move |e, handler| e.call(function, &binding, handler))
    }

    pub fn copy_in(&self, sql: impl Into<String>, source: CopySource) -> Pending {
        let sql = sql.into();
        self.submit(Completion::Ready, move |e, handler| e.copy_in(&sql, source, handler))
    }

    pub fn copy_out(&self, sql: impl Into<String>, sink: impl CopySink + 'static) -> Pending {
        let sql = sql.into();
        self.submit(Completion::Ready, move |e, handler| e.copy_out(&sql, Box::new(sink), handler))
    }

    /// Fire and forget close.
    pub fn close(&self, kind: ServerObjectType, name: impl Into<String>) {
        let name = name.into();
        self.submit_detached(move |e| e.close(kind, &name));
    }

    /// See [`RequestExecutor::lazy_execute`].
    pub fn lazy_execute(&self, statement: StatementName) {
        self.submit_detached(move |e| e.lazy_execute(&statement));
    }
}

fn completion(max_rows: i32) -> Completion {
    match max_rows {
        0 => Completion::Ready,
        _ => Completion::Terminal,
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Client")
    }
}
