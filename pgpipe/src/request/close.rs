use super::{Action, Reply, Request, SyncMode};
use crate::{
    Error, Result,
    common::{ByteStr, warning},
    correlator::Session,
    handler::Handler,
    portal::PortalState,
    postgres::BackendMessage,
    statement::{PortalName, ServerObjectType, StatementName},
};

/// Lazy `Close` without `Sync` and without observer.
pub(crate) struct Close {
    kind: ServerObjectType,
    name: ByteStr,
}

impl Close {
    pub(crate) fn new(kind: ServerObjectType, name: ByteStr) -> Self {
        Self { kind, name }
    }
}

impl Request for Close {
    fn name(&self) -> &'static str {
        "close"
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Unsynced
    }

    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            CloseComplete(_) => {
                let name = String::from(self.name.as_str());
                match self.kind {
                    ServerObjectType::Statement => session.statements.remove(&StatementName::new(name)),
                    ServerObjectType::Portal => session.portals.advance(&PortalName::new(name), PortalState::Closed),
                }
                Action::Complete
            },
            ErrorResponse(_e) => {
                warning!("failed to close {:?} `{}`: {_e:?}", self.kind, self.name);
                Action::Complete
            },
            NoticeResponse(_) => Action::Resume,
            _ => return Ok(None),
        };
        Ok(Some(action))
    }

    fn exception(&mut self, _error: Error) {
        warning!("close {:?} `{}` failed: {_error}", self.kind, self.name);
    }

    fn reply(&mut self) -> Option<&mut Reply> {
        None
    }
}

/// `Close` portal followed by `Sync`, or a bare `Sync` without portal.
pub(crate) struct Finish {
    reply: Reply,
    portal: Option<PortalName>,
}

impl Finish {
    pub(crate) fn new(portal: Option<PortalName>, handler: Box<dyn Handler>) -> Self {
        Self { reply: Reply::new(handler), portal }
    }
}

impl Request for Finish {
    fn name(&self) -> &'static str {
        match self.portal {
            Some(_) => "finish",
            None => "sync",
        }
    }

    fn sync_mode(&self) -> SyncMode {
        SyncMode::Sync
    }

    fn dispatch(&mut self, msg: &BackendMessage, session: &mut Session) -> Result<Option<Action>> {
        use BackendMessage::*;
        let action = match msg {
            CloseComplete(_) if self.portal.is_some() => {
                if let Some(portal) = &self.portal {
                    session.portals.advance(portal, PortalState::Closed);
                }
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
