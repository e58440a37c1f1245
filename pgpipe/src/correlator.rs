//! Correlate backend messages with the requests that caused them.
//!
//! The backend answers requests strictly in submission order, so every
//! inbound message belongs to the head of a FIFO queue. Messages that belong
//! to no request, notifications and parameter status, are consumed before the
//! queue is consulted.
use std::collections::{HashMap, VecDeque};

use crate::{
    Error, Result,
    common::{ByteStr, verbose, warning},
    error::PipelineAborted,
    handler::{CopySource, Notification, NotificationHandler},
    notice::Notice,
    portal::PortalTracker,
    postgres::BackendMessage,
    request::{Action, Drain, Passed, Request, SyncMode},
    statement::StatementTracker,
    transaction::TransactionStatus,
    types::Registry,
};

/// Connection state mutated while dispatching.
#[derive(Debug)]
pub(crate) struct Session {
    pub(crate) portals: PortalTracker,
    pub(crate) statements: StatementTracker,
    /// Last `ReadyForQuery` status.
    pub(crate) status: Option<TransactionStatus>,
    pub(crate) registry: Registry,
    pub(crate) params: HashMap<ByteStr, ByteStr>,
}

impl Session {
    pub(crate) fn new() -> Self {
        Self {
            portals: PortalTracker::default(),
            statements: StatementTracker::default(),
            status: None,
            registry: Registry::new(),
            params: HashMap::new(),
        }
    }
}

/// What the connection must do after a message is dispatched.
pub(crate) enum Step {
    Continue,
    /// Stream the source as `CopyData`, then `CopyDone`.
    CopyIn(CopySource),
    /// Answer copy-in with `CopyFail`.
    CopyFail(&'static str),
    /// The backend is skipping to a `Sync` that was never written.
    SyncRequired,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Continue => f.write_str("Continue"),
            Self::CopyIn(_) => f.write_str("CopyIn"),
            Self::CopyFail(reason) => f.debug_tuple("CopyFail").field(reason).finish(),
            Self::SyncRequired => f.write_str("SyncRequired"),
        }
    }
}

pub(crate) struct Correlator {
    queue: VecDeque<Box<dyn Request>>,
    session: Session,
    notifications: Option<Box<dyn NotificationHandler>>,
    /// Diagnostics passed on while no observing request was queued.
    passed: Vec<Passed>,
}

impl Correlator {
    pub(crate) fn new() -> Self {
        Self {
            queue: VecDeque::new(),
            session: Session::new(),
            notifications: None,
            passed: vec![],
        }
    }

    pub(crate) fn session(&self) -> &Session {
        &self.session
    }

    pub(crate) fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub(crate) fn len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub(crate) fn set_notification_handler(&mut self, handler: Box<dyn NotificationHandler>) {
        self.notifications = Some(handler);
    }

    /// Must be called in the same step the request messages are written.
    pub(crate) fn enqueue(&mut self, mut request: Box<dyn Request>) {
        verbose!(request = request.name(), queued = self.queue.len(), "enqueue");
        if !self.passed.is_empty() {
            if let Some(reply) = request.reply() {
                for passed in self.passed.drain(..) {
                    reply.adopt(passed);
                }
            }
        }
        self.queue.push_back(request);
    }

    /// Route one backend message.
    ///
    /// Any returned error is fatal, the caller must tear down the connection
    /// and [`fail_all`][Correlator::fail_all].
    pub(crate) fn dispatch(&mut self, msg: BackendMessage) -> Result<Step> {
        match &msg {
            BackendMessage::NotificationResponse(n) => {
                let notification = Notification {
                    process_id: n.process_id,
                    channel: n.channel.clone(),
                    payload: n.payload.clone(),
                };
                match &mut self.notifications {
                    Some(handler) => handler.notification(notification),
                    None => {
                        verbose!(channel = %notification.channel, "notification dropped");
                    },
                }
                return Ok(Step::Continue);
            },
            BackendMessage::ParameterStatus(p) => {
                verbose!(name = %p.name, value = %p.value, "parameter status");
                self.session.params.insert(p.name.clone(), p.value.clone());
                return Ok(Step::Continue);
            },
            BackendMessage::ReadyForQuery(r) => {
                self.session.status = Some(r.status);
                if r.status == TransactionStatus::Idle {
                    self.session.portals.end_transaction();
                }
            },
            _ => {},
        }

        let Some(head) = self.queue.front_mut() else {
            return self.dispatch_idle(msg);
        };

        let name = head.name();
        let mode = head.sync_mode();
        let Some(action) = head.dispatch(&msg, &mut self.session)? else {
            return Err(msg.unexpected(name).into());
        };

        verbose!(request = name, message = BackendMessage::message_name(msg.msgtype()), "dispatch");

        match action {
            Action::Resume => {},
            Action::ResumePassing => {
                if let Some(passed) = Passed::parse(&msg)? {
                    match self.queue.iter_mut().skip(1).find_map(|next| next.reply()) {
                        Some(reply) => reply.adopt(passed),
                        None => {
                            verbose!(request = name, "diagnostic held for the next request");
                            self.passed.push(passed);
                        },
                    }
                }
            },
            Action::Complete => {
                self.queue.pop_front();
            },
            Action::Sync => {
                self.queue.pop_front();
                self.queue.push_front(Box::new(Drain));
            },
            Action::CopyIn(source) => return Ok(Step::CopyIn(source)),
            Action::CopyFail(reason) => return Ok(Step::CopyFail(reason)),
        }

        if mode == SyncMode::Unsynced && matches!(msg, BackendMessage::ErrorResponse(_)) {
            return Ok(self.abort_until_sync());
        }

        Ok(Step::Continue)
    }

    fn dispatch_idle(&mut self, msg: BackendMessage) -> Result<Step> {
        match msg {
            BackendMessage::NoticeResponse(n) => {
                let _notice = Notice::parse(n.body)?;
                warning!("notice outside of request: {_notice}");
                Ok(Step::Continue)
            },
            BackendMessage::ErrorResponse(e) => Err(Notice::parse(e.body)?.into()),
            msg => Err(msg.unexpected("idle").into()),
        }
    }

    /// The backend discards every message up to the next `Sync`.
    fn abort_until_sync(&mut self) -> Step {
        while let Some(request) = self.queue.front_mut() {
            request.exception(PipelineAborted.into());
            match request.sync_mode() {
                SyncMode::Sync => return Step::Continue,
                SyncMode::Unsynced | SyncMode::Simple => {
                    verbose!(request = request.name(), "aborted");
                    self.queue.pop_front();
                },
            }
        }
        Step::SyncRequired
    }

    /// Push a drainer for a `Sync` written by the connection itself.
    pub(crate) fn enqueue_sync(&mut self) {
        self.queue.push_back(Box::new(Drain));
    }

    /// Fail every queued request, in order, `cause` goes to the head.
    pub(crate) fn fail_all(&mut self, cause: Error) {
        self.passed.clear();
        let mut cause = Some(cause);
        for mut request in self.queue.drain(..) {
            let error = cause.take().unwrap_or_else(Error::closed);
            request.exception(error);
        }
    }
}
