use std::mem;

use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    correlator::Session,
    handler::Handler,
    portal::PortalState,
    postgres::{BackendMessage, Oid, PgFormat},
    row::{ResultBatch, ResultField, Row, apply_formats},
    statement::{PortalName, StatementName},
};

/// Extended protocol execution of a portal.
///
/// Serves `query_extended`, `query_portal`, `execute` and `resume`, which only
/// differ in the messages written ahead and in their termination.
pub(crate) struct Execute {
    name: &'static str,
    reply: Reply,
    portal: PortalName,
    /// Statement parsed by this request, tracked on describe.
    parsed: Option<StatementName>,
    parse_complete: bool,
    /// Formats requested in `Bind`, `None` when the backend reports them.
    result_formats: Option<Vec<PgFormat>>,
    batch: ResultBatch,
    synced: bool,
    forward_ready: bool,
}

impl Execute {
    pub(crate) fn new(name: &'static str, portal: PortalName, handler: Box<dyn Handler>) -> Self {
        Self {
            name,
            reply: Reply::new(handler),
            portal,
            parsed: None,
            parse_complete: false,
            result_formats: None,
            batch: ResultBatch::default(),
            synced: true,
            forward_ready: true,
        }
    }

    /// `Parse` is written ahead for `statement`.
    pub(crate) fn parsed(mut self, statement: &StatementName) -> Self {
        self.parsed = Some(statement.clone());
        self
    }

    /// Formats requested in `Bind`, applied to fields described by statement.
    pub(crate) fn result_formats(mut self, formats: &[PgFormat]) -> Self {
        self.result_formats = Some(formats.to_vec());
        self
    }

    /// Metadata already known for the executed statement.
    pub(crate) fn described(mut self, param_types: Vec<Oid>, fields: Vec<ResultField>) -> Self {
        self.batch.param_types = param_types;
        self.batch.fields = fields;
        self
    }

    /// Whether `Sync` follows the `Execute`.
    pub(crate) fn synced(mut self, synced: bool) -> Self {
        self.synced = synced;
        self
    }

    /// Whether `ReadyForQuery` is delivered to the handler.
    pub(crate) fn forward_ready(mut self, forward: bool) -> Self {
        self.forward_ready = forward;
        self
    }

    fn terminal(&self) -> Action {
        match self.synced {
            true => Action::Resume,
            false => Action::Complete,
        }
    }
}

impl Request for Execute {
    fn name(&self) -> &'static str {
        self.name
    }

    fn sync_mode(&self) -> SyncMode {
        match self.synced {
            true => SyncMode::Sync,
            false => SyncMode::Unsynced,
        }
    }

    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            ParseComplete(_) => {
                self.parse_complete = true;
                Action::Resume
            },
            ParameterDescription(pd) => {
                if let Some(statement) = &self.parsed {
                    session.statements.describe_params(statement, &pd.oids);
                }
                self.batch.param_types = pd.oids.clone();
                Action::Resume
            },
            RowDescription(rd) => {
                let mut fields = ResultField::parse_all(rd)?;
                if let Some(statement) = &self.parsed {
                    session.statements.describe_fields(statement, &fields);
                }
                if let Some(formats) = &self.result_formats {
                    apply_formats(&mut fields, formats);
                }
                self.batch.fields = fields;
                Action::Resume
            },
            NoData(_) => {
                if let Some(statement) = &self.parsed {
                    session.statements.describe_fields(statement, &[]);
                }
                self.batch.fields.clear();
                Action::Resume
            },
            BindComplete(_) => {
                session.portals.advance(&self.portal, PortalState::Bound);
                Action::Resume
            },
            DataRow(dr) => {
                session.portals.advance(&self.portal, PortalState::Active);
                self.batch.rows.push(Row::decode(dr)?);
                Action::Resume
            },
            CommandComplete(cc) => {
                session.portals.advance(&self.portal, PortalState::Exhausted);
                let mut batch = mem::take(&mut self.batch);
                batch.set_tag(&cc.tag);
                self.reply.complete(batch);
                self.terminal()
            },
            EmptyQueryResponse(_) => {
                session.portals.advance(&self.portal, PortalState::Exhausted);
                self.reply.complete(mem::take(&mut self.batch));
                self.terminal()
            },
            PortalSuspended(_) => {
                session.portals.advance(&self.portal, PortalState::Suspended);
                self.reply.suspend(mem::take(&mut self.batch));
                self.terminal()
            },
            ErrorResponse(e) => {
                if let Some(statement) = &self.parsed {
                    if !self.parse_complete {
                        session.statements.remove(statement);
                    }
                }
                session.portals.advance(&self.portal, PortalState::Closed);
                self.reply.database_error(e)?;
                self.terminal()
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
            ReadyForQuery(r) => {
                if self.forward_ready {
                    self.reply.ready(r.status);
                }
                Action::Complete
            },
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    fn exception(&mut self, error: Error) {
        self.reply.error(error);
    }

    fn reply(&mut self) -> Option<&mut Reply> {
        Some(&mut self.reply)
    }
}

/// Bind and execute a prepared statement in the unnamed portal, without any
/// caller observing the result.
///
/// Errors and notices are passed on to the next request in the queue.
pub(crate) struct LazyExecute {
    portal: PortalName,
}

impl LazyExecute {
    pub(crate) fn new() -> Self {
        Self { portal: PortalName::unnamed() }
    }
}

impl Request for LazyExecute {
    fn name(&self) -> &'static str {
        "lazy_execute"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Sync
    }

    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            BindComplete(_) => {
                session.portals.advance(&self.portal, PortalState::Bound);
                Action::Resume
            },
            DataRow(_) => {
                session.portals.advance(&self.portal, PortalState::Active);
                Action::Resume
            },
            CommandComplete(_) | EmptyQueryResponse(_) => {
                session.portals.advance(&self.portal, PortalState::Exhausted);
                Action::Resume
            },
            PortalSuspended(_) => Action::Resume,
            ErrorResponse(_) => {
                session.portals.advance(&self.portal, PortalState::Closed);
                Action::ResumePassing
            },
            NoticeResponse(_) => Action::ResumePassing,
            ReadyForQuery(_) => Action::Complete,
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    fn exception(&mut self, _error: Error) {
        crate::common::warning!("lazy execute failed: {_error}");
    }

    fn reply(&mut self) -> Option<&mut Reply> {
        None
    }
}
