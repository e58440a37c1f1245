//! Protocol handlers bound to submitted requests.
//!
//! Each request writes its messages in the facade and leaves one [`Request`] in
//! the correlator queue, which consumes the backend messages answering it.
use std::mem;

use crate::{
    Error, Result,
    common::warning,
    correlator::Session,
    handler::{CopySource, Event, Handler},
    notice::Notice,
    postgres::{BackendMessage, ErrorResponse, NoticeResponse},
    row::ResultBatch,
    transaction::TransactionStatus,
};

mod query;
mod execute;
mod prepare;
mod close;
mod function;
mod copy;

pub(crate) use query::SimpleQuery;
pub(crate) use execute::{Execute, LazyExecute};
pub(crate) use prepare::Prepare;
pub(crate) use close::{Close, Finish};
pub(crate) use function::FunctionCall;
pub(crate) use copy::{CopyIn, CopyOut};

/// What the correlator does with the queue after a message is dispatched.
pub(crate) enum Action {
    /// Stay at the head.
    Resume,
    /// Stay at the head, diagnostics are also handed to the next request.
    ResumePassing,
    /// Dequeue.
    Complete,
    /// Dequeue and swallow everything up to the next `ReadyForQuery`.
    Sync,
    /// Backend entered copy-in, stream the source.
    CopyIn(CopySource),
    /// Backend entered copy-in but there is nothing to send.
    CopyFail(&'static str),
}

/// How the messages of a request end on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SyncMode {
    /// Extended protocol messages terminated by `Sync`.
    Sync,
    /// Extended protocol messages terminated by `Flush` or nothing.
    Unsynced,
    /// Simple query or function call, the backend synchronizes on its own.
    Simple,
}

/// A queued protocol handler.
pub(crate) trait Request: Send {
    fn name(&self) -> &'static str;

    fn sync_mode(&self) -> SyncMode;

    /// Handle one backend message.
    ///
    /// Returns `Ok(None)` if the message kind cannot be accepted, which
    /// desynchronizes the pipeline.
    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>>;

    /// The request failed outside of its own response stream.
    fn exception(&mut self, error: Error);

    /// Access the caller reply, `None` for internal requests.
    fn reply(&mut self) -> Option<&mut Reply>;
}

/// Event delivery with notice accumulation.
pub(crate) struct Reply {
    handler: Option<Box<dyn Handler>>,
    notices: Vec<Notice>,
    /// Error of a handler-less request ahead in the queue.
    adopted: Option<Notice>,
}

impl Reply {
    pub(crate) fn new(handler: Box<dyn Handler>) -> Self {
        Self { handler: Some(handler), notices: vec![], adopted: None }
    }

    /// Reply of a request without caller handler, events are only logged.
    pub(crate) fn detached() -> Self {
        Self { handler: None, notices: vec![], adopted: None }
    }

    fn emit(&mut self, event: Event) {
        match &mut self.handler {
            Some(handler) => handler.handle(event),
            None => {
                if let Event::Error { error: _error, .. } = &event {
                    warning!("unobserved request error: {_error}");
                }
            },
        }
    }

    fn take_notices(&mut self) -> Vec<Notice> {
        mem::take(&mut self.notices)
    }

    pub(crate) fn notice(&mut self, notice: &NoticeResponse) -> Result<()> {
        let notice = Notice::parse(notice.body.clone())?;
        if self.handler.is_none() {
            warning!("unobserved notice: {notice}");
        }
        self.notices.push(notice);
        Ok(())
    }

    pub(crate) fn complete(&mut self, batch: ResultBatch) {
        if let Some(adopted) = self.adopted.take() {
            return self.error(adopted.into());
        }
        let notices = self.take_notices();
        self.emit(Event::Complete { batch, notices });
    }

    pub(crate) fn suspend(&mut self, batch: ResultBatch) {
        if let Some(adopted) = self.adopted.take() {
            return self.error(adopted.into());
        }
        let notices = self.take_notices();
        self.emit(Event::Suspend { batch, notices });
    }

    pub(crate) fn function_result(&mut self, value: Option<bytes::Bytes>) {
        if let Some(adopted) = self.adopted.take() {
            return self.error(adopted.into());
        }
        let notices = self.take_notices();
        self.emit(Event::FunctionResult { value, notices });
    }

    pub(crate) fn error(&mut self, error: Error) {
        if let Some(adopted) = self.adopted.take() {
            self.notices.push(adopted);
        }
        let notices = self.take_notices();
        self.emit(Event::Error { error, notices });
    }

    pub(crate) fn database_error(&mut self, error: &ErrorResponse) -> Result<()> {
        let notice = Notice::parse(error.body.clone())?;
        self.error(notice.into());
        Ok(())
    }

    pub(crate) fn ready(&mut self, status: TransactionStatus) {
        if let Some(adopted) = self.adopted.take() {
            self.error(adopted.into());
        }
        self.emit(Event::Ready(status));
    }

    /// Take over a diagnostic passed from a request ahead.
    ///
    /// An adopted error replaces the next terminal event of this request.
    pub(crate) fn adopt(&mut self, passed: Passed) {
        match passed {
            Passed::Error(notice) => match self.adopted {
                Some(_) => self.notices.push(notice),
                None => self.adopted = Some(notice),
            },
            Passed::Notice(notice) => self.notices.push(notice),
        }
    }
}

/// Diagnostic of a handler-less request, handed to the next observer.
#[derive(Debug)]
pub(crate) enum Passed {
    Error(Notice),
    Notice(Notice),
}

impl Passed {
    /// Returns `None` for messages that carry no diagnostic.
    pub(crate) fn parse(msg: &BackendMessage) -> Result<Option<Passed>> {
        let passed = match msg {
            BackendMessage::ErrorResponse(e) => Passed::Error(Notice::parse(e.body.clone())?),
            BackendMessage::NoticeResponse(n) => Passed::Notice(Notice::parse(n.body.clone())?),
            _ => return Ok(None),
        };
        Ok(Some(passed))
    }
}

/// Swallow everything up to and including the next `ReadyForQuery`.
pub(crate) struct Drain;

impl Request for Drain {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Sync
    }

    fn dispatch(&mut self, msg: &BackendMessage, _: &mut Session) -> Result<Option<Action>> {
        match msg {
            BackendMessage::ReadyForQuery(_) => Ok(Some(Action::Complete)),
            _ => Ok(Some(Action::Resume)),
        }
    }

    fn exception(&mut self, _: Error) { }

    fn reply(&mut self) -> Option<&mut Reply> {
        None
    }
}
