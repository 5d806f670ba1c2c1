use std::collections::VecDeque;

use futures::channel::oneshot;
use log::{trace, warn};

use crate::{error::DequeueError, item::Item};

/// A consumer waiting for a request. The slot accepts at most one item.
pub(crate) struct Placeholder<Req, Resp, E> {
    pub(crate) id: u64,
    slot: oneshot::Sender<Item<Req, Resp, E>>,
}

impl<Req, Resp, E> Placeholder<Req, Resp, E> {
    /// Hands `item` to the waiting consumer, or gives it back if the consumer
    /// stopped waiting.
    pub(crate) fn offer(self, item: Item<Req, Resp, E>) -> Result<(), Item<Req, Resp, E>> {
        self.slot.send(item)
    }

    /// Whether the consumer is still listening on its slot.
    pub(crate) fn is_waiting(&self) -> bool {
        !self.slot.is_canceled()
    }
}

/// Consumers waiting for a request, oldest first.
pub(crate) struct ConsumerRegistry<Req, Resp, E> {
    waiting: VecDeque<Placeholder<Req, Resp, E>>,
    next_id: u64,
    max_consumer_count: usize,
}

impl<Req, Resp, E> ConsumerRegistry<Req, Resp, E> {
    pub(crate) fn new(max_consumer_count: usize) -> Self {
        Self {
            waiting: VecDeque::new(),
            next_id: 0,
            max_consumer_count,
        }
    }

    pub(crate) fn register(
        &mut self,
    ) -> Result<(u64, oneshot::Receiver<Item<Req, Resp, E>>), DequeueError> {
        if self.count() >= self.max_consumer_count {
            warn!("Refusing consumer, {} consumers already waiting.", self.count());
            return Err(DequeueError::TooManyWaitingConsumers {
                current_count: self.count(),
                max_allowed: self.max_consumer_count,
            });
        }

        let id = self.next_id;
        self.next_id += 1;
        let (slot, receiver) = oneshot::channel();
        trace!("Registering consumer {id}.");
        self.waiting.push_back(Placeholder { id, slot });
        Ok((id, receiver))
    }

    pub(crate) fn unregister(&mut self, id: u64) -> bool {
        match self.waiting.iter().position(|waiting| waiting.id == id) {
            Some(index) => {
                self.waiting.remove(index);
                trace!("Unregistered consumer {id}.");
                true
            }
            None => false,
        }
    }

    pub(crate) fn pop_oldest(&mut self) -> Option<Placeholder<Req, Resp, E>> {
        self.waiting.pop_front()
    }

    pub(crate) fn drain(&mut self) -> Vec<Placeholder<Req, Resp, E>> {
        self.waiting.drain(..).collect()
    }

    pub(crate) fn count(&self) -> usize {
        self.waiting.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::BoxError, item::Exchange};

    type Registry = ConsumerRegistry<u32, u32, BoxError>;

    fn item(request: u32) -> Item<u32, u32, BoxError> {
        Item::new(Exchange::new(request).0)
    }

    #[test]
    fn test_register_respects_max_consumer_limit_after_unregister() {
        let mut registry = Registry::new(1);

        let (first, _receiver) = registry.register().unwrap();
        assert!(registry.unregister(first));
        assert_eq!(registry.count(), 0);

        let (_second, _receiver) = registry.register().unwrap();
        assert_eq!(
            registry.count(),
            1,
            "Registry should have exactly 1 waiting consumer"
        );

        match registry.register() {
            Ok(_) => panic!("Should have failed - already at max capacity!"),
            Err(DequeueError::TooManyWaitingConsumers {
                current_count,
                max_allowed,
            }) => {
                assert_eq!(current_count, 1, "Error should report current count of 1");
                assert_eq!(max_allowed, 1, "Error should report max allowed of 1");
            }
            Err(e) => panic!("Unexpected error: {e:?}"),
        }
    }

    #[test]
    fn test_oldest_consumer_is_served_first() {
        let mut registry = Registry::new(usize::MAX);
        let (first, mut first_receiver) = registry.register().unwrap();
        let (_second, mut second_receiver) = registry.register().unwrap();

        let oldest = registry.pop_oldest().unwrap();
        assert_eq!(oldest.id, first);
        assert!(oldest.offer(item(7)).is_ok());

        assert_eq!(*first_receiver.try_recv().unwrap().unwrap().request(), 7);
        assert!(second_receiver.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_offer_to_closed_placeholder_returns_item() {
        let mut registry = Registry::new(usize::MAX);
        let (_id, mut receiver) = registry.register().unwrap();
        receiver.close();

        let placeholder = registry.pop_oldest().unwrap();
        let refused = placeholder.offer(item(3)).unwrap_err();
        assert_eq!(*refused.request(), 3);
        assert!(refused.is_still_needed());
    }

    #[test]
    fn test_unregister_unknown_id_is_ignored() {
        let mut registry = Registry::new(usize::MAX);
        let (_id, _receiver) = registry.register().unwrap();
        assert!(!registry.unregister(42));
        assert_eq!(registry.drain().len(), 1);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn test_closed_slot_is_no_longer_waiting() {
        let mut registry = Registry::new(usize::MAX);
        let (_id, mut receiver) = registry.register().unwrap();
        let (_other, _other_receiver) = registry.register().unwrap();
        receiver.close();

        let waiting = registry.drain();
        assert!(!waiting[0].is_waiting());
        assert!(waiting[1].is_waiting());
    }
}
