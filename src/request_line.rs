use std::{collections::VecDeque, sync::Arc};

use log::trace;

use crate::item::{Exchange, Item};

/// Requests waiting for a consumer, oldest first.
///
/// Items whose producer gave up may linger until the next
/// [`RequestLine::pop_needed`] skips over them.
pub(crate) struct RequestLine<Req, Resp, E> {
    items: VecDeque<Item<Req, Resp, E>>,
    max_len: usize,
}

impl<Req, Resp, E> RequestLine<Req, Resp, E> {
    pub(crate) fn new(max_len: usize) -> Self {
        Self {
            items: VecDeque::new(),
            max_len,
        }
    }

    pub(crate) fn max_len(&self) -> usize {
        self.max_len
    }

    pub(crate) fn is_full(&self) -> bool {
        self.items.len() >= self.max_len
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }

    pub(crate) fn push(&mut self, item: Item<Req, Resp, E>) {
        self.items.push_back(item);
    }

    /// Removes and returns the oldest item that is still needed, discarding
    /// abandoned items in front of it.
    pub(crate) fn pop_needed(&mut self) -> Option<Item<Req, Resp, E>> {
        while let Some(item) = self.items.pop_front() {
            if item.is_still_needed() {
                return Some(item);
            }
            trace!("Discarding an abandoned request.");
        }
        None
    }

    pub(crate) fn remove(
        &mut self,
        exchange: &Arc<Exchange<Req, Resp, E>>,
    ) -> Option<Item<Req, Resp, E>> {
        let index = self.items.iter().position(|item| item.shares(exchange))?;
        self.items.remove(index)
    }

    pub(crate) fn drain(&mut self) -> Vec<Item<Req, Resp, E>> {
        self.items.drain(..).collect()
    }
}
