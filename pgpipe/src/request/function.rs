use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    correlator::Session,
    handler::Handler,
    postgres::BackendMessage,
};

/// `FunctionCall`, the backend answers with a result or an error, then
/// `ReadyForQuery`.
pub(crate) struct FunctionCall {
    reply: Reply,
}

impl FunctionCall {
    pub(crate) fn new(handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler) }
    }
}

impl Request for FunctionCall {
    fn name(&self) -> &'static str {
        "call"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Simple
    }

    fn dispatch(&mut self, msg: &BackendMessage, _: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            FunctionCallResponse(v) => {
                self.reply.function_result(v.value.clone());
                Action::Sync
            },
            ErrorResponse(e) => {
                self.reply.database_error(e)?;
                Action::Sync
            },
            NoticeResponse(n) => {
                self.reply.notice(n)?;
                Action::Resume
            },
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
