use std::mem;

use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    correlator::Session,
    handler::Handler,
    postgres::BackendMessage,
    row::{ResultBatch, ResultField, Row},
};

/// Simple query protocol, possibly with multiple statements.
///
/// One `Complete` per statement, then `Ready`.
pub(crate) struct SimpleQuery {
    reply: Reply,
    batch: ResultBatch,
}

impl SimpleQuery {
    pub(crate) fn new(handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler), batch: ResultBatch::default() }
    }
}

impl Request for SimpleQuery {
    fn name(&self) -> &'static str {
        "query"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Simple
    }

    fn dispatch(&mut self, msg: &BackendMessage, _: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            RowDescription(rd) => {
                self.batch.fields = ResultField::parse_all(rd)?;
                Action::Resume
            },
            DataRow(dr) => {
                self.batch.rows.push(Row::decode(dr)?);
                Action::Resume
            },
            CommandComplete(cc) => {
                let mut batch = mem::take(&mut self.batch);
                batch.set_tag(&cc.tag);
                self.reply.complete(batch);
                Action::Resume
            },
            EmptyQueryResponse(_) => {
                self.reply.complete(mem::take(&mut self.batch));
                Action::Resume
            },
            ErrorResponse(e) => {
                self.batch = ResultBatch::default();
                self.reply.database_error(e)?;
                Action::Resume
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
            // no source for a COPY FROM STDIN issued as a plain query
            CopyInResponse(_) => Action::CopyFail("COPY FROM STDIN requires copy_in"),
            // COPY TO STDOUT issued as a plain query, data is discarded
            CopyOutResponse(_) | CopyData(_) | CopyDone(_) => Action::Resume,
            ReadyForQuery(r) => {
                self.reply.ready(r.status);
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
