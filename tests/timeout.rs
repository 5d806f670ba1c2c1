mod mock;

use std::time::Duration;

use mock::{Queue, shared_queue, wait_until};
use rendezvous_queue::{CancellationToken, DequeueError, EnqueueError};
use tokio::time::{Instant, sleep, timeout};

const SHORT: Duration = Duration::from_millis(10);

#[test_log::test(tokio::test)]
async fn unanswered_request_times_out() {
    let queue = Queue::new();
    let start = Instant::now();

    let result = queue.enqueue_timeout("x".to_string(), SHORT).await;

    assert!(matches!(result, Err(EnqueueError::TimedOut)));
    assert!(start.elapsed() >= SHORT);
    assert!(start.elapsed() < SHORT + Duration::from_millis(500));
    assert_eq!(queue.waiting_requests(), 0);
}

#[test_log::test(tokio::test)]
async fn idle_consumer_times_out() {
    let queue = Queue::new();

    let result = queue.dequeue_timeout(SHORT).await;

    assert!(matches!(result, Err(DequeueError::TimedOut)));
    assert_eq!(queue.waiting_consumers(), 0);
}

#[test_log::test(tokio::test)]
async fn consumer_cancelled_before_any_request() {
    let queue = shared_queue();
    let cancel = CancellationToken::new();

    let consumer = tokio::spawn({
        let queue = queue.clone();
        let cancel = cancel.clone();
        async move { queue.dequeue_cancellable(&cancel).await }
    });
    wait_until(&queue, |queue| queue.waiting_consumers() == 1).await;

    cancel.cancel();

    assert!(matches!(
        consumer.await.unwrap(),
        Err(DequeueError::Cancelled)
    ));
    assert_eq!(queue.waiting_consumers(), 0);
}

#[test_log::test(tokio::test)]
async fn producer_cancelled_while_queued() {
    let queue = shared_queue();
    let cancel = CancellationToken::new();

    let producer = tokio::spawn({
        let queue = queue.clone();
        let cancel = cancel.clone();
        async move {
            queue
                .enqueue_cancellable("never mind".to_string(), &cancel)
                .await
        }
    });
    wait_until(&queue, |queue| queue.waiting_requests() == 1).await;

    cancel.cancel();

    assert!(matches!(
        producer.await.unwrap(),
        Err(EnqueueError::Cancelled)
    ));
    assert_eq!(queue.waiting_requests(), 0);
}

#[test_log::test(tokio::test)]
async fn consumer_sees_abandoned_item() {
    let queue = shared_queue();

    let producer = tokio::spawn({
        let queue = queue.clone();
        async move {
            queue
                .enqueue_timeout("slow".to_string(), Duration::from_millis(30))
                .await
        }
    });

    let item = queue.dequeue().await.unwrap();
    let abandoned = item.abandoned();
    assert!(item.is_still_needed());

    timeout(Duration::from_secs(1), abandoned.cancelled())
        .await
        .expect("The producer should have abandoned the item");

    assert!(item.is_abandoned());
    assert!(!item.is_still_needed());
    assert!(!item.respond("too late".to_string()));
    assert!(matches!(
        producer.await.unwrap(),
        Err(EnqueueError::TimedOut)
    ));
}

#[test_log::test(tokio::test)]
async fn timeout_and_cancellation_together() {
    let queue = Queue::new();
    let cancel = CancellationToken::new();

    let timed_out = queue
        .enqueue_with("first".to_string(), Some(SHORT), Some(&cancel))
        .await;
    assert!(matches!(timed_out, Err(EnqueueError::TimedOut)));

    let canceller = cancel.clone();
    let (cancelled, ()) = tokio::join!(
        queue.dequeue_with(Some(Duration::from_secs(5)), Some(&cancel)),
        async move {
            sleep(SHORT).await;
            canceller.cancel();
        }
    );
    assert!(matches!(cancelled, Err(DequeueError::Cancelled)));
    assert_eq!(queue.waiting_consumers(), 0);
}

#[test_log::test(tokio::test)]
async fn cancelling_one_producer_leaves_others_waiting() {
    let queue = shared_queue();
    let cancel = CancellationToken::new();

    let cancelled = tokio::spawn({
        let queue = queue.clone();
        let cancel = cancel.clone();
        async move { queue.enqueue_cancellable("a".to_string(), &cancel).await }
    });
    wait_until(&queue, |queue| queue.waiting_requests() == 1).await;
    let kept = mock::spawn_producer(&queue, "b");
    wait_until(&queue, |queue| queue.waiting_requests() == 2).await;

    cancel.cancel();
    assert!(matches!(
        cancelled.await.unwrap(),
        Err(EnqueueError::Cancelled)
    ));
    wait_until(&queue, |queue| queue.waiting_requests() == 1).await;

    let item = queue.dequeue().await.unwrap();
    assert_eq!(item.request(), "b");
    item.respond("kept".to_string());
    assert_eq!(kept.await.unwrap().unwrap(), "kept");
}
