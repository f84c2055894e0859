//! Runtime - local task spawning, timers and graceful shutdown
//!
//! Components are single-threaded (`Rc`/`RefCell`), so background pumps are spawned as
//! local tasks: `tokio::task::spawn_local` natively (inside a `LocalSet`) and
//! `wasm_bindgen_futures::spawn_local` in the browser.

use std::future::Future;
use std::time::Duration;

#[cfg(feature = "native")]
pub fn spawn_local<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    tokio::task::spawn_local(fut);
}

#[cfg(all(feature = "wasm", not(feature = "native")))]
pub fn spawn_local<F>(fut: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(fut);
}

#[cfg(feature = "native")]
pub async fn sleep(duration: Duration) {
    tokio::time::sleep(duration).await;
}

#[cfg(all(feature = "wasm", not(feature = "native")))]
pub async fn sleep(duration: Duration) {
    let ms = duration.as_millis().min(i32::MAX as u128) as i32;
    let promise = js_sys::Promise::new(&mut |resolve, _reject| {
        // Without a window (e.g. a worker) the promise never resolves.
        if let Some(window) = web_sys::window() {
            let _ = window.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms);
        }
    });
    let _ = wasm_bindgen_futures::JsFuture::from(promise).await;
}

/// Run `fut` for at most `duration`. `None` on expiry.
#[cfg(feature = "native")]
pub async fn timeout<F: Future>(duration: Duration, fut: F) -> Option<F::Output> {
    tokio::time::timeout(duration, fut).await.ok()
}

#[cfg(all(feature = "wasm", not(feature = "native")))]
pub async fn timeout<F: Future>(duration: Duration, fut: F) -> Option<F::Output> {
    use futures::future::{select, Either};
    futures::pin_mut!(fut);
    let timer = sleep(duration);
    futures::pin_mut!(timer);
    match select(fut, timer).await {
        Either::Left((value, _)) => Some(value),
        Either::Right(_) => None,
    }
}

#[cfg(feature = "native")]
pub use shutdown::{install_signal_handlers, Shutdown};

#[cfg(feature = "native")]
mod shutdown {
    use std::sync::Arc;
    use tokio::sync::watch;
    use tracing::{info, warn};

    /// Stop request shared between the signal handler and long-running commands.
    #[derive(Clone)]
    pub struct Shutdown {
        requested: Arc<watch::Sender<bool>>,
    }

    impl Default for Shutdown {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Shutdown {
        pub fn new() -> Self {
            let (requested, _) = watch::channel(false);
            Self { requested: Arc::new(requested) }
        }

        /// Idempotent.
        pub fn trigger(&self) {
            self.requested.send_replace(true);
        }

        pub fn is_triggered(&self) -> bool {
            *self.requested.borrow()
        }

        /// Resolves once a stop is requested, immediately if one already was.
        pub async fn wait(&self) {
            let mut requested = self.requested.subscribe();
            while !*requested.borrow_and_update() {
                if requested.changed().await.is_err() {
                    return;
                }
            }
        }
    }

    /// Trigger the returned handle on SIGINT/SIGTERM (Ctrl+C elsewhere).
    pub fn install_signal_handlers() -> Shutdown {
        let shutdown = Shutdown::new();
        let handle = shutdown.clone();
        tokio::spawn(async move {
            if let Some(signal) = next_signal().await {
                info!("{} received, stopping", signal);
                handle.trigger();
            }
        });
        shutdown
    }

    #[cfg(unix)]
    async fn next_signal() -> Option<&'static str> {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::terminate()), signal(SignalKind::interrupt())) {
            (Ok(mut sigterm), Ok(mut sigint)) => tokio::select! {
                _ = sigterm.recv() => Some("SIGTERM"),
                _ = sigint.recv() => Some("SIGINT"),
            },
            _ => {
                warn!("signal handlers unavailable, falling back to Ctrl+C");
                tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl+C")
            }
        }
    }

    #[cfg(not(unix))]
    async fn next_signal() -> Option<&'static str> {
        tokio::signal::ctrl_c().await.ok().map(|_| "Ctrl+C")
    }
}
