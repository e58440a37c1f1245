//! Pipelined Postgres request/response correlation engine.
//!
//! Requests are written to the connection immediately and their responses
//! are routed, in order, to the [`Handler`] given at submission.
//!
//! # Examples
//!
//! Single connection:
//!
//! ```no_run
//! use pgpipe::{Collector, Completion, Connection, RequestExecutor};
//!
//! # async fn app() -> pgpipe::Result<()> {
//! let mut conn = Connection::connect_env().await?;
//!
//! let (first, first_res) = Collector::new(Completion::Ready);
//! let (second, second_res) = Collector::new(Completion::Ready);
//! conn.query("CREATE TEMP TABLE foo(id int)", Box::new(first))?;
//! conn.query("INSERT INTO foo VALUES (1),(2)", Box::new(second))?;
//! conn.dispatch_all().await?;
//!
//! first_res.await?;
//! assert_eq!(second_res.await?.rows_affected(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Shared between tasks:
//!
//! ```no_run
//! use pgpipe::Client;
//!
//! # async fn app() -> pgpipe::Result<()> {
//! let client = Client::connect_env().await?;
//!
//! let handles = (0..4).map(|i| {
//!     let client = client.clone();
//!     tokio::spawn(async move { client.query(format!("SELECT {i}")).await })
//! });
//!
//! for h in handles {
//!     h.await?;
//! }
//! # Ok(())
//! # }
//! # mod tokio { pub fn spawn<F>(_: F) -> F { todo!() } }
//! ```

pub mod common;
mod io;
mod ext;

// Protocol
pub mod postgres;
pub mod transport;
pub mod stream;

// Component
mod notice;
mod transaction;
pub mod types;
pub mod row;
mod statement;
mod portal;
mod binding;
mod handler;

// Engine
mod request;
mod correlator;
mod executor;
pub mod results;

// Connection
pub mod connection;
pub mod client;

// Error
pub mod error;

#[doc(inline)]
pub use connection::{Config, Connection};
#[doc(inline)]
pub use client::Client;
#[doc(inline)]
pub use error::{Error, ErrorKind, Result};

pub use binding::Binding;
pub use executor::RequestExecutor;
pub use handler::{CopySink, CopySource, Event, Handler, Notification, NotificationHandler, Notifications};
pub use notice::Notice;
pub use portal::{PortalState, PortalTracker};
pub use postgres::{Oid, PgFormat};
pub use results::{Collector, Completion, Outcome, Pending};
pub use row::{ResultBatch, ResultField, Row};
pub use statement::{PortalName, PreparedStatement, ServerObjectType, StatementName, StatementTracker};
pub use stream::PgStream;
pub use transaction::TransactionStatus;
pub use transport::PgTransport;
