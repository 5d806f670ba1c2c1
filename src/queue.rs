use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use futures::channel::oneshot;
use log::{debug, trace, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    error::{BoxError, DequeueError, EnqueueError},
    item::{Exchange, Item, Resolution},
    registry::ConsumerRegistry,
    request_line::RequestLine,
    wait::{Outcome, race},
};

struct Lines<Req, Resp, E> {
    requests: RequestLine<Req, Resp, E>,
    consumers: ConsumerRegistry<Req, Resp, E>,
}

/// A rendezvous point where producers hand over requests and await a
/// response, and consumers take requests and resolve them.
///
/// Whichever side arrives while the other side has someone waiting is served
/// immediately; otherwise it joins the back of its own line. Waiting happens
/// outside the queue lock and can be bounded by a timeout and a
/// [`CancellationToken`].
///
/// Share a queue between tasks by wrapping it in an [`Arc`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use rendezvous_queue::RendezvousQueue;
///
/// # #[tokio::main]
/// # async fn main() {
/// let queue: Arc<RendezvousQueue<u32, u32>> = Arc::new(RendezvousQueue::new());
///
/// let worker = tokio::spawn({
///     let queue = queue.clone();
///     async move {
///         let item = queue.dequeue().await.unwrap();
///         item.respond(item.request() * 2);
///     }
/// });
///
/// assert_eq!(queue.enqueue(21).await.unwrap(), 42);
/// worker.await.unwrap();
/// # }
/// ```
pub struct RendezvousQueue<Req, Resp, E = BoxError> {
    lines: Mutex<Lines<Req, Resp, E>>,
}

impl<Req, Resp, E> RendezvousQueue<Req, Resp, E> {
    /// Creates a queue whose lines grow without bound.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limits(usize::MAX, usize::MAX)
    }

    /// Creates a queue that refuses new waiters once `max_waiting_requests`
    /// requests or `max_waiting_consumers` consumers are already waiting.
    ///
    /// Limits only apply to callers that would have to wait: a producer that
    /// finds a waiting consumer, or a consumer that finds a waiting request,
    /// is always served.
    #[must_use]
    pub fn with_limits(max_waiting_requests: usize, max_waiting_consumers: usize) -> Self {
        Self {
            lines: Mutex::new(Lines {
                requests: RequestLine::new(max_waiting_requests),
                consumers: ConsumerRegistry::new(max_waiting_consumers),
            }),
        }
    }

    fn lines(&self) -> MutexGuard<'_, Lines<Req, Resp, E>> {
        self.lines.lock().expect("Queue lock poisoned")
    }

    /// Submits `request` and waits until a consumer resolves it.
    ///
    /// # Errors
    ///
    /// Returns [`EnqueueError::Declined`] or [`EnqueueError::Failed`] when the
    /// consumer did not respond, and
    /// [`EnqueueError::TooManyWaitingRequests`] when the request line is full.
    pub async fn enqueue(&self, request: Req) -> Result<Resp, EnqueueError<E>> {
        self.enqueue_with(request, None, None).await
    }

    /// Like [`RendezvousQueue::enqueue`], giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Additionally returns [`EnqueueError::TimedOut`], or
    /// [`EnqueueError::InvalidTimeout`] for a zero `timeout`.
    pub async fn enqueue_timeout(
        &self,
        request: Req,
        timeout: Duration,
    ) -> Result<Resp, EnqueueError<E>> {
        self.enqueue_with(request, Some(timeout), None).await
    }

    /// Like [`RendezvousQueue::enqueue`], giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Additionally returns [`EnqueueError::Cancelled`].
    pub async fn enqueue_cancellable(
        &self,
        request: Req,
        cancel: &CancellationToken,
    ) -> Result<Resp, EnqueueError<E>> {
        self.enqueue_with(request, None, Some(cancel)).await
    }

    /// Submits `request` and waits for its resolution, an optional timeout
    /// and an optional cancellation signal, whichever comes first.
    ///
    /// When the wait ends without a resolution, the request is abandoned: it
    /// is taken out of the request line, and a consumer that already holds it
    /// sees [`Item::abandoned`] fire. Dropping the returned future has the
    /// same effect.
    ///
    /// # Errors
    ///
    /// See [`EnqueueError`].
    pub async fn enqueue_with(
        &self,
        request: Req,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Resp, EnqueueError<E>> {
        if timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(EnqueueError::InvalidTimeout);
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(EnqueueError::Cancelled);
        }

        let (exchange, completion) = Exchange::new(request);
        self.submit(Item::new(exchange.clone()))?;

        let mut pending = PendingRequest {
            queue: self,
            exchange,
            settled: false,
        };

        match race(completion, timeout, cancel).await {
            Outcome::Completed(resolution) => pending.settle(resolution),
            Outcome::TimedOut => {
                trace!("Producer timed out waiting for a response.");
                Err(EnqueueError::TimedOut)
            }
            Outcome::Cancelled => {
                trace!("Producer was cancelled while waiting for a response.");
                Err(EnqueueError::Cancelled)
            }
        }
    }

    fn submit(&self, item: Item<Req, Resp, E>) -> Result<(), EnqueueError<E>> {
        let mut lines = self.lines();
        let mut item = item;

        while let Some(consumer) = lines.consumers.pop_oldest() {
            let consumer_id = consumer.id;
            match consumer.offer(item) {
                Ok(()) => {
                    trace!("Handed request directly to consumer {consumer_id}.");
                    return Ok(());
                }
                Err(refused) => {
                    trace!("Consumer {consumer_id} stopped waiting, trying the next one.");
                    item = refused;
                }
            }
        }

        if lines.requests.is_full() {
            let error = EnqueueError::TooManyWaitingRequests {
                max_allowed: lines.requests.max_len(),
                current_count: lines.requests.len(),
            };
            drop(lines);
            warn!("Refusing request, the request line is full.");
            item.abandon();
            return Err(error);
        }

        trace!("No consumer waiting, queueing request.");
        lines.requests.push(item);
        Ok(())
    }

    fn withdraw(&self, exchange: &Arc<Exchange<Req, Resp, E>>) {
        if exchange.abandon() {
            trace!("Producer gave up on its request.");
        }
        let removed = self.lines().requests.remove(exchange);
        if removed.is_some() {
            trace!("Removed the abandoned request from the request line.");
        }
    }

    /// Waits for a request.
    ///
    /// # Errors
    ///
    /// Returns [`DequeueError::Dismissed`] when
    /// [`RendezvousQueue::dismiss_consumers`] releases the waiting consumer,
    /// and [`DequeueError::TooManyWaitingConsumers`] when the consumer line is
    /// full.
    pub async fn dequeue(&self) -> Result<Item<Req, Resp, E>, DequeueError> {
        self.dequeue_with(None, None).await
    }

    /// Like [`RendezvousQueue::dequeue`], giving up after `timeout`.
    ///
    /// # Errors
    ///
    /// Additionally returns [`DequeueError::TimedOut`], or
    /// [`DequeueError::InvalidTimeout`] for a zero `timeout`.
    pub async fn dequeue_timeout(
        &self,
        timeout: Duration,
    ) -> Result<Item<Req, Resp, E>, DequeueError> {
        self.dequeue_with(Some(timeout), None).await
    }

    /// Like [`RendezvousQueue::dequeue`], giving up when `cancel` fires.
    ///
    /// # Errors
    ///
    /// Additionally returns [`DequeueError::Cancelled`].
    pub async fn dequeue_cancellable(
        &self,
        cancel: &CancellationToken,
    ) -> Result<Item<Req, Resp, E>, DequeueError> {
        self.dequeue_with(None, Some(cancel)).await
    }

    /// Takes the oldest waiting request, or waits for the next one, an
    /// optional timeout and an optional cancellation signal, whichever comes
    /// first.
    ///
    /// A request handed over at the same moment the wait gives up is still
    /// returned, so no request is lost. Dropping the returned future removes
    /// the consumer from the line.
    ///
    /// # Errors
    ///
    /// See [`DequeueError`].
    pub async fn dequeue_with(
        &self,
        timeout: Option<Duration>,
        cancel: Option<&CancellationToken>,
    ) -> Result<Item<Req, Resp, E>, DequeueError> {
        if timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(DequeueError::InvalidTimeout);
        }
        if cancel.is_some_and(CancellationToken::is_cancelled) {
            return Err(DequeueError::Cancelled);
        }

        let (consumer_id, mut slot) = {
            let mut lines = self.lines();
            if let Some(item) = lines.requests.pop_needed() {
                trace!("Took a waiting request.");
                return Ok(item);
            }
            lines.consumers.register()?
        };

        let mut pending = PendingConsumer {
            queue: self,
            id: consumer_id,
            settled: false,
        };

        let failure = match race(&mut slot, timeout, cancel).await {
            Outcome::Completed(Ok(item)) => {
                trace!("Consumer {consumer_id} received a request.");
                pending.settled = true;
                return Ok(item);
            }
            Outcome::Completed(Err(oneshot::Canceled)) => {
                trace!("Consumer {consumer_id} was dismissed.");
                pending.settled = true;
                return Err(DequeueError::Dismissed);
            }
            Outcome::TimedOut => DequeueError::TimedOut,
            Outcome::Cancelled => DequeueError::Cancelled,
        };

        slot.close();
        if let Ok(Some(item)) = slot.try_recv() {
            trace!("Consumer {consumer_id} received a request while giving up, keeping it.");
            pending.settled = true;
            return Ok(item);
        }
        trace!("Consumer {consumer_id} gave up: {failure}.");
        Err(failure)
    }

    /// Fails every waiting request with an error built by `error` and
    /// empties the request line. `error` is called once per waiting request,
    /// so error types that cannot be cloned, like [`BoxError`], work too.
    /// Returns how many requests were failed.
    pub fn abort_requests(&self, mut error: impl FnMut() -> E) -> usize {
        let count = self.resolve_waiting(|item| {
            if item.is_still_needed() {
                item.fail(error())
            } else {
                false
            }
        });
        debug!("Aborted {count} waiting requests.");
        count
    }

    /// Declines every waiting request and empties the request line. Returns
    /// how many requests were declined.
    pub fn decline_requests(&self) -> usize {
        let count = self.resolve_waiting(Item::decline);
        debug!("Declined {count} waiting requests.");
        count
    }

    /// Responds to every waiting request with `response` and empties the
    /// request line. Returns how many requests were answered.
    pub fn respond_requests(&self, response: Resp) -> usize
    where
        Resp: Clone,
    {
        let count = self.resolve_waiting(|item| item.respond(response.clone()));
        debug!("Responded to {count} waiting requests.");
        count
    }

    /// Responds to every waiting request with the default response.
    pub fn respond_requests_default(&self) -> usize
    where
        Resp: Default,
    {
        let count = self.resolve_waiting(Item::respond_default);
        debug!("Responded to {count} waiting requests with the default response.");
        count
    }

    fn resolve_waiting(&self, resolve: impl FnMut(&Item<Req, Resp, E>) -> bool) -> usize {
        let waiting = self.lines().requests.drain();
        waiting.iter().map(resolve).filter(|resolved| *resolved).count()
    }

    /// Releases every waiting consumer with [`DequeueError::Dismissed`].
    /// Returns how many consumers were still waiting; consumers that already
    /// gave up but have not left the line yet are not counted.
    pub fn dismiss_consumers(&self) -> usize {
        let dismissed = self.lines().consumers.drain();
        let count = dismissed
            .iter()
            .filter(|consumer| consumer.is_waiting())
            .count();
        drop(dismissed);
        debug!("Dismissed {count} waiting consumers.");
        count
    }

    /// Number of requests currently waiting for a consumer. Only a snapshot.
    pub fn waiting_requests(&self) -> usize {
        self.lines().requests.len()
    }

    /// Number of consumers currently waiting for a request. Only a snapshot.
    pub fn waiting_consumers(&self) -> usize {
        self.lines().consumers.count()
    }
}

impl<Req, Resp, E> Default for RendezvousQueue<Req, Resp, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Req, Resp, E> fmt::Debug for RendezvousQueue<Req, Resp, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines = self.lines();
        f.debug_struct("RendezvousQueue")
            .field("waiting_requests", &lines.requests.len())
            .field("waiting_consumers", &lines.consumers.count())
            .finish()
    }
}

/// A submitted request whose producer is still waiting. Unless settled, it
/// withdraws the request when dropped.
struct PendingRequest<'queue, Req, Resp, E> {
    queue: &'queue RendezvousQueue<Req, Resp, E>,
    exchange: Arc<Exchange<Req, Resp, E>>,
    settled: bool,
}

impl<Req, Resp, E> PendingRequest<'_, Req, Resp, E> {
    fn settle(
        &mut self,
        resolution: Result<Resolution<E>, oneshot::Canceled>,
    ) -> Result<Resp, EnqueueError<E>> {
        self.settled = true;
        match resolution {
            Ok(Resolution::Responded) => {
                trace!("Producer received a response.");
                self.exchange
                    .take_response()
                    .ok_or(EnqueueError::Declined)
            }
            Ok(Resolution::Failed(error)) => Err(EnqueueError::Failed(error)),
            Ok(Resolution::Declined) | Err(oneshot::Canceled) => Err(EnqueueError::Declined),
        }
    }
}

impl<Req, Resp, E> Drop for PendingRequest<'_, Req, Resp, E> {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.withdraw(&self.exchange);
        }
    }
}

/// A registered consumer that is still waiting. Unless settled, it leaves the
/// consumer line when dropped.
struct PendingConsumer<'queue, Req, Resp, E> {
    queue: &'queue RendezvousQueue<Req, Resp, E>,
    id: u64,
    settled: bool,
}

impl<Req, Resp, E> Drop for PendingConsumer<'_, Req, Resp, E> {
    fn drop(&mut self) {
        if !self.settled {
            self.queue.lines().consumers.unregister(self.id);
        }
    }
}
