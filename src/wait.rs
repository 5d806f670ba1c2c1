use std::time::Duration;

use futures::{
    FutureExt,
    future::{Either, pending},
    pin_mut, select_biased,
};
use futures_timer::Delay;
use tokio_util::sync::CancellationToken;

/// Which of the three raced outcomes finished first.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Completed(T),
    TimedOut,
    Cancelled,
}

/// Waits for `completion`, an optional `timeout` and an optional cancellation
/// signal, whichever comes first.
///
/// A completion that is ready at the same time as one of the others wins. The
/// losing timer is dropped when this returns.
pub(crate) async fn race<F>(
    completion: F,
    timeout: Option<Duration>,
    cancel: Option<&CancellationToken>,
) -> Outcome<F::Output>
where
    F: Future,
{
    let completion = completion.fuse();
    let deadline = match timeout {
        Some(duration) => Either::Left(Delay::new(duration)),
        None => Either::Right(pending::<()>()),
    }
    .fuse();
    let cancelled = match cancel {
        Some(token) => Either::Left(token.cancelled()),
        None => Either::Right(pending::<()>()),
    }
    .fuse();
    pin_mut!(completion, deadline, cancelled);

    select_biased! {
        output = completion => Outcome::Completed(output),
        () = deadline => Outcome::TimedOut,
        () = cancelled => Outcome::Cancelled,
    }
}
