//! # Request/response rendezvous with `rendezvous-queue`
//!
//! This crate provides a queue where one kind of task, the producers, submit
//! requests and await a response, while another kind, the consumers, take
//! pending requests, process them and resolve them.
//!
//! The [`RendezvousQueue`] matches both sides: a producer that finds a waiting
//! consumer hands its request over directly, and a consumer that finds a
//! waiting request takes it immediately. Otherwise the caller joins the back
//! of its own line. Every wait can be bounded by a timeout and a
//! [`CancellationToken`], and is cleaned up when the waiting future is
//! dropped.
//!
//! A consumer receives an [`Item`] and resolves it exactly once, with
//! [`Item::respond`], [`Item::decline`] or [`Item::fail`]. A producer that gave
//! up on its request raises [`Item::abandoned`] so the consumer can stop
//! early.
//!
//! For shutdown, [`RendezvousQueue::abort_requests`],
//! [`RendezvousQueue::decline_requests`],
//! [`RendezvousQueue::respond_requests`] and
//! [`RendezvousQueue::dismiss_consumers`] resolve everybody that is still
//! waiting at once.
//!
//! # Example
//!
//! ```rust
//! use std::{sync::Arc, time::Duration};
//!
//! use rendezvous_queue::{CancellationToken, EnqueueError, RendezvousQueue};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let queue: Arc<RendezvousQueue<String, usize>> = Arc::new(RendezvousQueue::new());
//! let stop = CancellationToken::new();
//!
//! let worker = tokio::spawn({
//!     let queue = queue.clone();
//!     let stop = stop.clone();
//!     async move {
//!         while let Ok(item) = queue.dequeue_cancellable(&stop).await {
//!             item.respond(item.request().len());
//!         }
//!     }
//! });
//!
//! assert_eq!(queue.enqueue("hello".to_string()).await.unwrap(), 5);
//!
//! stop.cancel();
//! worker.await.unwrap();
//!
//! let unanswered = queue
//!     .enqueue_timeout("anyone?".to_string(), Duration::from_millis(10))
//!     .await;
//! assert!(matches!(unanswered, Err(EnqueueError::TimedOut)));
//! # }
//! ```
mod error;
mod item;
mod queue;
mod registry;
mod request_line;
mod wait;

pub use error::{BoxError, DequeueError, EnqueueError};
pub use item::Item;
pub use queue::RendezvousQueue;
pub use tokio_util::sync::CancellationToken;
