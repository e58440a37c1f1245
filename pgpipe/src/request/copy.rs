use std::{io, mem};

use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    correlator::Session,
    error::CopyNotInitiated,
    handler::{CopySink, CopySource, Handler},
    postgres::BackendMessage,
    row::{ResultBatch, ResultField, Row},
};

/// `COPY ... FROM STDIN` issued as a simple query, fed from a [`CopySource`].
pub(crate) struct CopyIn {
    reply: Reply,
    source: Option<CopySource>,
    batch: ResultBatch,
}

impl CopyIn {
    pub(crate) fn new(source: CopySource, handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler), source: Some(source), batch: ResultBatch::default() }
    }
}

impl Request for CopyIn {
    fn name(&self) -> &'static str {
        "copy_in"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Simple
    }

    fn dispatch(&mut self, msg: &BackendMessage, _: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            CopyInResponse(_) => match self.source.take() {
                Some(source) => Action::CopyIn(source),
                None => Action::CopyFail("copy source already consumed"),
            },
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
                self.reply.database_error(e)?;
                Action::Resume
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
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

/// `COPY ... TO STDOUT` issued as a simple query, drained into a [`CopySink`].
pub(crate) struct CopyOut {
    reply: Reply,
    sink: Box<dyn CopySink>,
    started: bool,
    sink_error: Option<io::Error>,
}

impl CopyOut {
    pub(crate) fn new(sink: Box<dyn CopySink>, handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler), sink, started: false, sink_error: None }
    }
}

impl Request for CopyOut {
    fn name(&self) -> &'static str {
        "copy_out"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Simple
    }

    fn dispatch(&mut self, msg: &BackendMessage, _: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            CopyOutResponse(_) => {
                self.started = true;
                Action::Resume
            },
            CopyData(data) => {
                if self.sink_error.is_none() {
                    if let Err(err) = self.sink.write(data.data.clone()) {
                        self.sink_error = Some(err);
                    }
                }
                Action::Resume
            },
            CopyDone(_) | RowDescription(_) | DataRow(_) | EmptyQueryResponse(_) => Action::Resume,
            CommandComplete(cc) => {
                if !mem::take(&mut self.started) {
                    self.reply.error(CopyNotInitiated.into());
                } else if let Some(err) = self.sink_error.take() {
                    self.reply.error(err.into());
                } else {
                    let mut batch = ResultBatch::default();
                    batch.set_tag(&cc.tag);
                    self.reply.complete(batch);
                }
                Action::Resume
            },
            ErrorResponse(e) => {
                self.started = false;
                self.reply.database_error(e)?;
                Action::Resume
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
            CopyInResponse(_) => Action::CopyFail("COPY FROM STDIN requires copy_in"),
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
