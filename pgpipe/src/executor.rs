//! The [`RequestExecutor`] trait.
use crate::{
    Result,
    binding::Binding,
    handler::{CopySink, CopySource, Handler},
    postgres::Oid,
    statement::{PortalName, ServerObjectType, StatementName},
};

/// Submit pipelined requests.
///
/// Each operation validates its arguments, writes its messages to the send
/// buffer and queues its handler. Nothing is flushed, results arrive when
/// the connection is dispatched. A submission error means nothing was sent
/// and the handler was dropped without events.
///
/// `max_rows` of zero means unlimited, the request is then terminated with
/// `Sync` and receives `Ready`. A positive limit is terminated with `Flush`
/// and the portal may be [`resume`][RequestExecutor::resume]d.
pub trait RequestExecutor {
    /// Simple query, possibly multiple statements.
    fn query(&mut self, sql: &str, handler: Box<dyn Handler>) -> Result<()>;

    /// Parse into the unnamed statement, describe, bind and execute.
    ///
    /// The result columns are not known when `Bind` is written, so a result
    /// format list longer than one but shorter than the columns is sent as
    /// given and Postgres rejects it. [`ResultField::format`] of the reported
    /// fields is still filled forward with the last format.
    ///
    /// [`ResultField::format`]: crate::ResultField::format
    fn query_extended(
        &mut self,
        sql: &str,
        portal: &PortalName,
        binding: &Binding,
        max_rows: i32,
        handler: Box<dyn Handler>,
    ) -> Result<()>;

    /// Describe and execute an already bound portal.
    fn query_portal(&mut self, portal: &PortalName, max_rows: i32, handler: Box<dyn Handler>) -> Result<()>;

    /// Bind a prepared statement and execute.
    fn execute(
        &mut self,
        portal: &PortalName,
        statement: &StatementName,
        binding: &Binding,
        max_rows: i32,
        handler: Box<dyn Handler>,
    ) -> Result<()>;

    /// Parse and describe a statement.
    ///
    /// Oid zero, or a shorter list, leaves parameter types to the backend.
    fn prepare(
        &mut self,
        statement: &StatementName,
        sql: &str,
        param_types: &[Oid],
        handler: Box<dyn Handler>,
    ) -> Result<()>;

    /// Fetch more rows from a suspended portal.
    fn resume(&mut self, portal: &PortalName, max_rows: i32, handler: Box<dyn Handler>) -> Result<()>;

    /// Close a statement or portal, without observer.
    fn close(&mut self, kind: ServerObjectType, name: &str) -> Result<()>;

    /// Close a portal and `Sync`.
    fn finish(&mut self, portal: &PortalName, handler: Box<dyn Handler>) -> Result<()>;

    /// Bare `Sync`.
    fn sync(&mut self, handler: Box<dyn Handler>) -> Result<()>;

    /// Fast-path function call, the result format is the first of
    /// `binding.result_formats`, binary if empty.
    fn call(&mut self, function: Oid, binding: &Binding, handler: Box<dyn Handler>) -> Result<()>;

    /// Bind and execute a prepared statement in the unnamed portal, without
    /// parameters and without observer.
    ///
    /// Errors and notices are reported to the request queued next.
    fn lazy_execute(&mut self, statement: &StatementName) -> Result<()>;

    /// `COPY ... FROM STDIN`, streaming `source`.
    fn copy_in(&mut self, sql: &str, source: CopySource, handler: Box<dyn Handler>) -> Result<()>;

    /// `COPY ... TO STDOUT`, writing into `sink`.
    fn copy_out(&mut self, sql: &str, sink: Box<dyn CopySink>, handler: Box<dyn Handler>) -> Result<()>;
}

impl<E: RequestExecutor + ?Sized> RequestExecutor for &mut E {
    fn query(&mut self, sql: &str, handler: Box<dyn Handler>) -> Result<()> {
        E::query(self, sql, handler)
    }

    fn query_extended(
        &mut self,
        sql: &str,
        portal: &PortalName,
        binding: &Binding,
        max_rows: i32,
        handler: Box<dyn Handler>,
    ) -> Result<()> {
        E::query_extended(self, sql, portal, binding, max_rows, handler)
    }

    fn query_portal(&mut self, portal: &PortalName, max_rows: i32, handler: Box<dyn Handler>) -> Result<()> {
        E::query_portal(self, portal, max_rows, handler)
    }

    fn execute(
        &mut self,
        portal: &PortalName,
        statement: &StatementName,
        binding: &Binding,
        max_rows: i32,
        handler: Box<dyn Handler>,
    ) -> Result<()> {
        E::execute(self, portal, statement, binding, max_rows, handler)
    }

    fn prepare(
        &mut self,
        statement: &StatementName,
        sql: &str,
        param_types: &[Oid],
        handler: Box<dyn Handler>,
    ) -> Result<()> {
        E::prepare(self, statement, sql, param_types, handler)
    }

    fn resume(&mut self, portal: &PortalName, max_rows: i32, handler: Box<dyn Handler>) -> Result<()> {
        E::resume(self, portal, max_rows, handler)
    }

    fn close(&mut self, kind: ServerObjectType, name: &str) -> Result<()> {
        E::close(self, kind, name)
    }

    fn finish(&mut self, portal: &PortalName, handler: Box<dyn Handler>) -> Result<()> {
        E::finish(self, portal, handler)
    }

    fn sync(&mut self, handler: Box<dyn Handler>) -> Result<()> {
        E::sync(self, handler)
    }

    fn call(&mut self, function: Oid, binding: &Binding, handler: Box<dyn Handler>) -> Result<()> {
        E::call(self, function, binding, handler)
    }

    fn lazy_execute(&mut self, statement: &StatementName) -> Result<()> {
        E::lazy_execute(self, statement)
    }

    fn copy_in(&mut self, sql: &str, source: CopySource, handler: Box<dyn Handler>) -> Result<()> {
        E::copy_in(self, sql, source, handler)
    }

    fn copy_out(&mut self, sql: &str, sink: Box<dyn CopySink>, handler: Box<dyn Handler>) -> Result<()> {
        E::copy_out(self, sql, sink, handler)
    }
}
