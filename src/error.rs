use std::{error::Error, fmt};

/// Default error type a consumer attaches with [`Item::fail`].
///
/// [`Item::fail`]: crate::Item::fail
pub type BoxError = Box<dyn Error + Send + Sync + 'static>;

/// Reasons an [`enqueue`](crate::RendezvousQueue::enqueue) call did not
/// produce a response.
#[derive(Debug, Clone, PartialEq)]
pub enum EnqueueError<E> {
    /// A zero timeout was passed. Nothing was queued.
    InvalidTimeout,
    /// The producer's own timeout expired before a consumer resolved the
    /// request.
    TimedOut,
    /// The producer's cancellation signal fired before a consumer resolved
    /// the request.
    Cancelled,
    /// A consumer (or a bulk decline) explicitly declined the request.
    Declined,
    /// A consumer failed the request with this error.
    Failed(E),
    /// No consumer was waiting and the request line is full.
    TooManyWaitingRequests {
        max_allowed: usize,
        current_count: usize,
    },
}

impl<E> EnqueueError<E> {
    /// Whether the error is the producer's own timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, EnqueueError::TimedOut)
    }

    /// Whether the error comes from the producer's own cancellation signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EnqueueError::Cancelled)
    }

    /// The error a consumer attached, if any.
    pub fn into_failure(self) -> Option<E> {
        match self {
            EnqueueError::Failed(error) => Some(error),
            _ => None,
        }
    }
}

impl<E> fmt::Display for EnqueueError<E>
where
    E: fmt::Display,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnqueueError::InvalidTimeout => write!(f, "Timeout must be larger than zero"),
            EnqueueError::TimedOut => write!(f, "Timed out waiting for a response"),
            EnqueueError::Cancelled => write!(f, "Cancelled while waiting for a response"),
            EnqueueError::Declined => write!(f, "The request was declined"),
            EnqueueError::Failed(error) => write!(f, "The request failed: {error}"),
            EnqueueError::TooManyWaitingRequests {
                max_allowed,
                current_count,
            } => write!(
                f,
                "Maximum number of waiting requests exceeded: {current_count} >= {max_allowed}"
            ),
        }
    }
}

impl<E> Error for EnqueueError<E>
where
    E: fmt::Debug + fmt::Display,
{
}

/// Reasons a [`dequeue`](crate::RendezvousQueue::dequeue) call did not
/// produce an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DequeueError {
    /// A zero timeout was passed. Nothing was registered.
    InvalidTimeout,
    /// The consumer's own timeout expired before a request arrived.
    TimedOut,
    /// The consumer's cancellation signal fired before a request arrived.
    Cancelled,
    /// The waiting consumer was released by
    /// [`dismiss_consumers`](crate::RendezvousQueue::dismiss_consumers).
    Dismissed,
    /// No request was waiting and the consumer line is full.
    TooManyWaitingConsumers {
        max_allowed: usize,
        current_count: usize,
    },
}

impl DequeueError {
    pub fn is_timeout(self) -> bool {
        matches!(self, DequeueError::TimedOut)
    }

    pub fn is_cancelled(self) -> bool {
        matches!(self, DequeueError::Cancelled)
    }
}

impl fmt::Display for DequeueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DequeueError::InvalidTimeout => write!(f, "Timeout must be larger than zero"),
            DequeueError::TimedOut => write!(f, "Timed out waiting for a request"),
            DequeueError::Cancelled => write!(f, "Cancelled while waiting for a request"),
            DequeueError::Dismissed => write!(f, "The waiting consumer was dismissed"),
            DequeueError::TooManyWaitingConsumers {
                max_allowed,
                current_count,
            } => write!(
                f,
                "Maximum number of waiting consumers exceeded: {current_count} >= {max_allowed}"
            ),
        }
    }
}

impl Error for DequeueError {}
