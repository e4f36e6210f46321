use std::sync::Weak;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Run `action` every `interval` on a tokio task until `owner` is dropped.
///
/// Must be called from inside a tokio runtime.
pub fn spawn_weak_loop<T: Send + Sync + 'static>(
    owner: Weak<T>,
    interval: Duration,
    mut action: impl FnMut(&T) + Send + 'static,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(interval);

        loop {
            timer.tick().await;

            let Some(strong) = owner.upgrade() else {
                break;
            };
            action(&strong);
        }
    })
}
