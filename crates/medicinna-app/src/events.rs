use kanal::AsyncReceiver;
use medicinna_types::AppEvent;
use tokio_util::sync::CancellationToken;

use crate::orchestrator::Orchestrator;

/// App's main loop: front-end events in, attempt results back
pub async fn event_loop(
    mut orchestrator: Orchestrator,
    ui_to_app_rx: AsyncReceiver<AppEvent>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let completions = orchestrator.completions();

    tracing::info!("[EVENT_LOOP] Starting main loop, waiting for events");
    orchestrator.ready().await;
    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("[EVENT_LOOP] Shutdown requested");
                break Ok(());
            }
            event = ui_to_app_rx.recv() => {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => break Err(anyhow::Error::new(e).context("front-end channel closed")),
                };
                tracing::debug!(
                    "[EVENT_LOOP] EVENT RECEIVED: {:?}",
                    std::mem::discriminant(&event)
                );
                orchestrator.handle(event).await;
            }
            finished = completions.recv() => {
                match finished {
                    Ok(finished) => orchestrator.finish(finished).await,
                    Err(e) => break Err(anyhow::Error::new(e).context("attempt channel closed")),
                }
            }
        }
    };

    orchestrator.shutdown().await;
    result
}
