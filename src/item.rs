use std::{
    fmt,
    sync::{Arc, Mutex, MutexGuard},
};

use futures::channel::oneshot;
use log::{debug, trace};
use tokio_util::sync::CancellationToken;

use crate::error::BoxError;

/// What the producer of an item learns once the item is resolved. The
/// response itself stays in the item until the producer takes it.
#[derive(Debug)]
pub(crate) enum Resolution<E> {
    Responded,
    Declined,
    Failed(E),
}

struct ItemState<Resp, E> {
    response: Option<Resp>,
    still_needed: bool,
    completion: Option<oneshot::Sender<Resolution<E>>>,
}

/// The state one request shares between its producer, the queue and the
/// consumer that claims it.
///
/// The first resolution takes the completion sender out of the state, so any
/// later resolution attempt finds nothing to send on and has no effect.
pub(crate) struct Exchange<Req, Resp, E> {
    request: Req,
    state: Mutex<ItemState<Resp, E>>,
    abandoned: CancellationToken,
}

impl<Req, Resp, E> Exchange<Req, Resp, E> {
    pub(crate) fn new(request: Req) -> (Arc<Self>, oneshot::Receiver<Resolution<E>>) {
        let (sender, receiver) = oneshot::channel();
        let exchange = Arc::new(Self {
            request,
            state: Mutex::new(ItemState {
                response: None,
                still_needed: true,
                completion: Some(sender),
            }),
            abandoned: CancellationToken::new(),
        });
        (exchange, receiver)
    }

    fn state(&self) -> MutexGuard<'_, ItemState<Resp, E>> {
        self.state.lock().expect("Item lock poisoned")
    }

    fn resolve(&self, response: Option<Resp>, resolution: Resolution<E>) -> bool {
        let mut state = self.state();
        if !state.still_needed {
            return false;
        }
        state.still_needed = false;
        if response.is_some() {
            state.response = response;
        }
        if let Some(completion) = state.completion.take() {
            // The producer may have stopped listening in the meantime.
            let _ = completion.send(resolution);
        }
        true
    }

    /// Marks the item as no longer wanted by its producer.
    ///
    /// Returns whether the item was still pending. The abandon signal is only
    /// raised for items that were still pending.
    pub(crate) fn abandon(&self) -> bool {
        let mut state = self.state();
        let was_needed = std::mem::replace(&mut state.still_needed, false);
        state.response = None;
        state.completion = None;
        drop(state);

        if was_needed {
            trace!("Abandoning a pending item.");
            self.abandoned.cancel();
        }
        was_needed
    }

    pub(crate) fn take_response(&self) -> Option<Resp> {
        self.state().response.take()
    }

    pub(crate) fn is_still_needed(&self) -> bool {
        self.state().still_needed
    }
}

/// One in-flight request, as seen by the consumer that claimed it.
///
/// An item is resolved exactly once, by whichever of [`Item::respond`],
/// [`Item::respond_default`], [`Item::decline`] or [`Item::fail`] is called
/// first. Later calls return `false` and change nothing. Dropping an item that
/// was never resolved declines it, so its producer is never left waiting.
///
/// # Examples
///
/// ```rust
/// use rendezvous_queue::RendezvousQueue;
///
/// # #[tokio::main]
/// # async fn main() {
/// let queue: RendezvousQueue<&str, String> = RendezvousQueue::new();
///
/// let (response, ()) = tokio::join!(queue.enqueue("ping"), async {
///     let item = queue.dequeue().await.unwrap();
///     assert_eq!(*item.request(), "ping");
///     assert!(item.respond("pong".to_string()));
///     assert!(!item.respond("again".to_string()));
/// });
///
/// assert_eq!(response.unwrap(), "pong");
/// # }
/// ```
pub struct Item<Req, Resp, E = BoxError> {
    exchange: Arc<Exchange<Req, Resp, E>>,
}

impl<Req, Resp, E> Item<Req, Resp, E> {
    pub(crate) fn new(exchange: Arc<Exchange<Req, Resp, E>>) -> Self {
        Self { exchange }
    }

    pub(crate) fn shares(&self, exchange: &Arc<Exchange<Req, Resp, E>>) -> bool {
        Arc::ptr_eq(&self.exchange, exchange)
    }

    pub(crate) fn abandon(&self) -> bool {
        self.exchange.abandon()
    }

    /// The request payload supplied by the producer.
    pub fn request(&self) -> &Req {
        &self.exchange.request
    }

    /// Whether the producer is still waiting for this item to be resolved.
    pub fn is_still_needed(&self) -> bool {
        self.exchange.is_still_needed()
    }

    /// Whether the producer gave up on this item before it was resolved.
    pub fn is_abandoned(&self) -> bool {
        self.exchange.abandoned.is_cancelled()
    }

    /// A token that is cancelled when the producer gives up on this item.
    ///
    /// Long-running consumers can race their work against
    /// [`CancellationToken::cancelled`] to stop early.
    pub fn abandoned(&self) -> CancellationToken {
        self.exchange.abandoned.clone()
    }

    /// The stored response, until the producer has taken it.
    pub fn response(&self) -> Option<Resp>
    where
        Resp: Clone,
    {
        self.exchange.state().response.clone()
    }

    /// Resolves the item with `response`. Returns whether this call resolved
    /// the item.
    pub fn respond(&self, response: Resp) -> bool {
        self.exchange.resolve(Some(response), Resolution::Responded)
    }

    /// Resolves the item with the default response.
    pub fn respond_default(&self) -> bool
    where
        Resp: Default,
    {
        self.respond(Resp::default())
    }

    /// Resolves the item without a response. The producer sees
    /// [`EnqueueError::Declined`](crate::EnqueueError::Declined).
    pub fn decline(&self) -> bool {
        self.exchange.resolve(None, Resolution::Declined)
    }

    /// Resolves the item with an error that is handed to the producer as
    /// [`EnqueueError::Failed`](crate::EnqueueError::Failed).
    pub fn fail(&self, error: E) -> bool {
        self.exchange.resolve(None, Resolution::Failed(error))
    }
}

impl<Req, Resp, E> Drop for Item<Req, Resp, E> {
    fn drop(&mut self) {
        if self.decline() {
            debug!("An unresolved item was dropped and has been declined.");
        }
    }
}

impl<Req, Resp, E> fmt::Debug for Item<Req, Resp, E>
where
    Req: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Item")
            .field("request", self.request())
            .field("still_needed", &self.is_still_needed())
            .field("abandoned", &self.is_abandoned())
            .finish()
    }
}
