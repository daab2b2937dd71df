use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::error::{PlaybookError, Result};

/// Race `fut` against `cancel`. The future is dropped on cancellation, which
/// aborts in-flight requests and kills `kill_on_drop` subprocesses.
pub async fn cancellable<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(PlaybookError::Cancelled),
        res = fut => res,
    }
}

/// Sleep for `duration` unless the run is cancelled first.
pub async fn sleep(cancel: &CancellationToken, duration: Duration) -> Result<()> {
    cancellable(cancel, async {
        tokio::time::sleep(duration).await;
        Ok(())
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn sleep_completes_without_cancellation() {
        let cancel = CancellationToken::new();
        let start = tokio::time::Instant::now();
        sleep(&cancel, Duration::from_secs(5)).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_sleep_returns_early() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            trigger.cancel();
        });
        let start = tokio::time::Instant::now();
        let err = sleep(&cancel, Duration::from_secs(60)).await.unwrap_err();
        assert!(matches!(err, PlaybookError::Cancelled));
        assert!(start.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test]
    async fn already_cancelled_token_wins() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let res: Result<u32> = cancellable(&cancel, async { Ok(7) }).await;
        assert!(matches!(res, Err(PlaybookError::Cancelled)));
    }
}
