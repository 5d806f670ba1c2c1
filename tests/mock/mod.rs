#![allow(dead_code)]

use std::{sync::Arc, time::Duration};

use rendezvous_queue::{EnqueueError, RendezvousQueue};
use tokio::{task::JoinHandle, time::sleep};

pub type Queue = RendezvousQueue<String, String>;

pub fn shared_queue() -> Arc<Queue> {
    Arc::new(Queue::new())
}

pub fn spawn_producer(
    queue: &Arc<Queue>,
    request: &str,
) -> JoinHandle<Result<String, EnqueueError<rendezvous_queue::BoxError>>> {
    let queue = queue.clone();
    let request = request.to_string();
    tokio::spawn(async move { queue.enqueue(request).await })
}

/// Waits until `condition` holds on the queue, polling with short sleeps.
pub async fn wait_until(queue: &Queue, condition: impl Fn(&Queue) -> bool) {
    for _ in 0..100 {
        if condition(queue) {
            return;
        }
        sleep(Duration::from_millis(1)).await;
    }
    panic!("Queue did not reach the expected state: {queue:?}");
}
