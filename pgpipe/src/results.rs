//! Collect request events into one awaitable outcome.
use bytes::Bytes;
use std::{
    mem,
    pin::Pin,
    sync::{Arc, Mutex},
    task::{Context, Poll, ready},
    time::Duration,
};
use tokio::{
    sync::oneshot::{self, error::TryRecvError},
    time::Sleep,
};

use crate::{
    Error, Result,
    error::RequestTimeout,
    handler::{Event, Handler},
    notice::Notice,
    row::{ResultBatch, Row},
    transaction::TransactionStatus,
};

/// Everything a request produced.
#[derive(Debug, Default)]
pub struct Outcome {
    /// One batch per completed statement, or the suspended batch.
    pub batches: Vec<ResultBatch>,
    /// The portal was suspended and can be resumed.
    pub suspended: bool,
    /// Result of a function call.
    pub value: Option<Bytes>,
    pub notices: Vec<Notice>,
    /// Status of the `ReadyForQuery` closing the request, if delivered.
    pub status: Option<TransactionStatus>,
}

impl Outcome {
    /// Rows of every batch.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.batches.iter().flat_map(|batch| batch.rows.iter())
    }

    /// Sum of rows affected reported by command tags.
    pub fn rows_affected(&self) -> u64 {
        self.batches.iter().filter_map(|batch| batch.rows_affected).sum()
    }

    /// The last batch.
    pub fn last_batch(&self) -> Option<&ResultBatch> {
        self.batches.last()
    }
}

/// Which event completes an [`Outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The `Ready` event, for synchronized requests.
    Ready,
    /// The first terminal event.
    Terminal,
}

type Sender = oneshot::Sender<Result<Outcome>>;

/// Shared between the collector and the job submitting it, so a submission
/// error can complete the same [`Pending`].
pub(crate) type Slot = Arc<Mutex<Option<Sender>>>;

pub(crate) fn send(slot: &Slot, result: Result<Outcome>) {
    let sender = match slot.lock() {
        Ok(mut sender) => sender.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };
    if let Some(sender) = sender {
        if sender.send(result).is_err() {
            crate::common::verbose!("late response dropped");
        }
    }
}

/// [`Handler`] accumulating events into an [`Outcome`].
pub struct Collector {
    slot: Slot,
    completion: Completion,
    outcome: Outcome,
    error: Option<Error>,
}

impl Collector {
    /// Collector to pass to a [`RequestExecutor`][crate::RequestExecutor] directly.
    pub fn new(completion: Completion) -> (Collector, Pending) {
        let (collector, _, pending) = collector(completion, None);
        (collector, pending)
    }

    fn finish(&mut self) {
        let result = match self.error.take() {
            Some(error) => Err(error),
            None => Ok(mem::take(&mut self.outcome)),
        };
        send(&self.slot, result);
    }
}

impl Handler for Collector {
    fn handle(&mut self, event: Event) {
        let terminal = event.is_terminal();
        match event {
            Event::Complete { batch, notices } => {
                self.outcome.notices.extend(notices);
                self.outcome.batches.push(batch);
            },
            Event::Suspend { batch, notices } => {
                self.outcome.notices.extend(notices);
                self.outcome.batches.push(batch);
                self.outcome.suspended = true;
            },
            Event::FunctionResult { value, notices } => {
                self.outcome.notices.extend(notices);
                self.outcome.value = value;
            },
            Event::Error { error, notices } => {
                self.outcome.notices.extend(notices);
                // the first error of a simple query batch is the cause
                if self.error.is_none() {
                    self.error = Some(error);
                }
            },
            Event::Ready(status) => self.outcome.status = Some(status),
        }

        match (self.completion, terminal) {
            (Completion::Terminal, true) | (Completion::Ready, false) => self.finish(),
            _ => {},
        }
    }
}

impl Drop for Collector {
    fn drop(&mut self) {
        // dropped by a teardown after its error was recorded
        if let Some(error) = self.error.take() {
            send(&self.slot, Err(error));
        }
    }
}

/// Create a collector and the [`Pending`] it completes.
pub(crate) fn collector(completion: Completion, timeout: Option<Duration>) -> (Collector, Slot, Pending) {
    let (send, recv) = oneshot::channel();
    let slot = Arc::new(Mutex::new(Some(send)));
    let collector = Collector {
        slot: slot.clone(),
        completion,
        outcome: Outcome::default(),
        error: None,
    };
    (collector, slot, Pending { recv, timeout, sleep: None })
}

/// The result of a submitted request.
///
/// Giving up waiting, by timeout or by dropping, does not affect the
/// connection, the response is still routed and dropped.
#[derive(Debug)]
pub struct Pending {
    recv: oneshot::Receiver<Result<Outcome>>,
    timeout: Option<Duration>,
    sleep: Option<Pin<Box<Sleep>>>,
}

impl Pending {
    /// Wait at most `timeout`, overriding the client request timeout.
    pub async fn wait(mut self, timeout: Duration) -> Result<Outcome> {
        self.timeout = None;
        match tokio::time::timeout(timeout, self).await {
            Ok(result) => result,
            Err(_) => Err(RequestTimeout.into()),
        }
    }

    /// Returns `None` while the response is outstanding.
    pub fn try_result(&mut self) -> Option<Result<Outcome>> {
        match self.recv.try_recv() {
            Ok(result) => Some(result),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Closed) => Some(Err(Error::closed())),
        }
    }
}

impl Future for Pending {
    type Output = Result<Outcome>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let me = &mut *self;

        if let Poll::Ready(result) = Pin::new(&mut me.recv).poll(cx) {
            return Poll::Ready(result.unwrap_or_else(|_| Err(Error::closed())));
        }

        if let Some(timeout) = me.timeout {
            let sleep = me.sleep.get_or_insert_with(|| Box::pin(tokio::time::sleep(timeout)));
            ready!(sleep.as_mut().poll(cx));
            return Poll::Ready(Err(RequestTimeout.into()));
        }

        Poll::Pending
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{ErrorKind, common::ByteStr};

    fn batch(tag: &'static str) -> ResultBatch {
        let mut batch = ResultBatch::default();
        batch.set_tag(&ByteStr::from_static(tag));
        batch
    }

    #[tokio::test]
    async fn completes_on_ready() {
        let (mut collector, _, pending) = collector(Completion::Ready, None);
        collector.handle(Event::Complete { batch: batch("INSERT 0 2"), notices: vec![] });
        collector.handle(Event::Complete { batch: batch("DELETE 1"), notices: vec![] });
        collector.handle(Event::Ready(TransactionStatus::Idle));

        let outcome = pending.await.unwrap();
        assert_eq!(outcome.batches.len(), 2);
        assert_eq!(outcome.rows_affected(), 3);
        assert_eq!(outcome.status, Some(TransactionStatus::Idle));
    }

    #[tokio::test]
    async fn error_then_ready() {
        let (mut collector, _, pending) = collector(Completion::Ready, None);
        collector.handle(Event::Error { error: Error::closed(), notices: vec![] });
        collector.handle(Event::Ready(TransactionStatus::Failed));
        assert!(pending.await.unwrap_err().is_closed());
    }

    #[tokio::test]
    async fn dropped_collector_closes() {
        let (collector, _, mut pending) = collector(Completion::Terminal, None);
        assert!(pending.try_result().is_none());
        drop(collector);
        assert!(pending.try_result().unwrap().unwrap_err().is_closed());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout() {
        let (_collector, _, pending) = collector(Completion::Terminal, Some(Duration::from_millis(50)));
        let err = pending.await.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Timeout(_)));
    }

    #[tokio::test]
    async fn submission_error_through_slot() {
        let (collector, slot, pending) = collector(Completion::Terminal, None);
        drop(collector);
        send(&slot, Err(Error::closed()));
        assert!(pending.await.unwrap_err().is_closed());
    }
}
