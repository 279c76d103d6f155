//! IdleCloseLoop - 使われていない archive handle を周期的に閉じる
//!
//! 周期は `LoaderConfig::idle_close_period`。閉じた handle は次の read で
//! 透過的に開き直されるので、lookup 側は何も気にしなくてよい。

use std::sync::Arc;
use std::time::Duration;

use crate::app::background::BackgroundLoop;
use crate::app::reload_loop::GenerationHost;
use crate::loader::Loader;

pub struct IdleCloseLoop;

impl IdleCloseLoop {
    /// GenerationHost の current generation を対象にする（入れ替え後も追従）
    pub fn spawn(host: Arc<GenerationHost>) -> BackgroundLoop {
        let period = host.current().config().idle_close_period();
        spawn_with(period, move || host.current())
    }

    /// 単一の Loader を対象にする
    pub fn spawn_for(loader: Arc<Loader>) -> BackgroundLoop {
        let period = loader.config().idle_close_period();
        spawn_with(period, move || Arc::clone(&loader))
    }
}

fn spawn_with<F>(period: Duration, target: F) -> BackgroundLoop
where
    F: Fn() -> Arc<Loader> + Send + 'static,
{
    BackgroundLoop::spawn("idle-close", period, move || {
        let loader = target();
        async move {
            let generation = loader.generation_id();
            match tokio::task::spawn_blocking(move || loader.close_idle_archives(false)).await {
                Ok(0) => {}
                Ok(closed) => tracing::debug!(%generation, closed, "idle archive handles closed"),
                Err(err) => tracing::warn!(%generation, error = %err, "idle close task failed"),
            }
        }
    })
}
