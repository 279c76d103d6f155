//! BackgroundLoop - 周期実行タスクのハンドル
//!
//! `watch` チャネルで停止を伝え、`JoinHandle` で終了を待ちます。

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Shortest period a loop runs at; a zero period means "as often as allowed".
pub const MIN_PERIOD: Duration = Duration::from_millis(10);

/// Background loop handle.
/// - `shutdown_tx` を drop するとループが止まる
/// - `shutdown_and_join()` で終了を待てる
pub struct BackgroundLoop {
    name: &'static str,
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl BackgroundLoop {
    /// `period` ごとに `tick` を実行するループを spawn
    ///
    /// 最初の tick は `period` 経過後。tick が遅れた場合は詰めずに次の周期を待つ。
    /// `period` は `MIN_PERIOD` 未満にはならない。
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let period = period.max(MIN_PERIOD);
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let join = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            tracing::debug!(name, ?period, "background loop started");
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }
                tokio::select! {
                    changed = shutdown_rx.changed() => {
                        // sender が drop された場合も停止
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                    _ = interval.tick() => {}
                }
                tick().await;
            }
            tracing::debug!(name, "background loop stopped");
        });

        Self {
            name,
            shutdown_tx,
            join,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Request shutdown. An in-flight tick runs to completion.
    pub fn request_shutdown(&self) {
        // ignore send error: the loop may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        if let Err(err) = self.join.await {
            tracing::warn!(name = self.name, error = %err, "background loop panicked");
        }
    }
}
