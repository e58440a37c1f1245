use std::mem;

use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    correlator::Session,
    handler::Handler,
    postgres::BackendMessage,
    row::{ResultBatch, ResultField},
    statement::StatementName,
};

/// `Parse`, `Describe` statement and `Sync`.
///
/// The describe result is delivered as a `Complete` without command, carrying
/// the parameter types and result fields.
pub(crate) struct Prepare {
    reply: Reply,
    statement: StatementName,
    batch: ResultBatch,
}

impl Prepare {
    pub(crate) fn new(statement: StatementName, handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler), statement, batch: ResultBatch::default() }
    }
}

impl Request for Prepare {
    fn name(&self) -> &'static str {
        "prepare"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Sync
    }

    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            ParseComplete(_) => Action::Resume,
            ParameterDescription(pd) => {
                session.statements.describe_params(&self.statement, &pd.oids);
                self.batch.param_types = pd.oids.clone();
                Action::Resume
            },
            RowDescription(rd) => {
                let fields = ResultField::parse_all(rd)?;
                session.statements.describe_fields(&self.statement, &fields);
                self.batch.fields = fields;
                self.reply.complete(mem::take(&mut self.batch));
                Action::Sync
            },
            NoData(_) => {
                session.statements.describe_fields(&self.statement, &[]);
                self.reply.complete(mem::take(&mut self.batch));
                Action::Sync
            },
            ErrorResponse(e) => {
                session.statements.remove(&self.statement);
                self.reply.database_error(e)?;
                Action::Sync
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
            // only reached when aborted by an earlier error
            ReadyForQuery(_) => Action::Complete,
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
