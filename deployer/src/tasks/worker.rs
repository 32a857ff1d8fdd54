//! Task worker draining the in-process queue

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::tasks::Task;

/// Executes one task; failures are the handler's to log
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, task: Task);
}

/// Run the task worker until shutdown or until every queue handle is dropped
///
/// On shutdown the tasks already queued are still executed.
pub async fn run<H>(
    handler: &H,
    mut receiver: mpsc::UnboundedReceiver<Task>,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    H: TaskHandler + ?Sized,
{
    info!("Task worker starting...");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Task worker shutting down, draining queue...");
                receiver.close();
                while let Some(task) = receiver.recv().await {
                    handler.handle(task).await;
                }
                return;
            }
            task = receiver.recv() => {
                match task {
                    Some(task) => {
                        debug!("Running task: {:?}", task);
                        handler.handle(task).await;
                    }
                    None => {
                        info!("Task queue closed, worker exiting...");
                        return;
                    }
                }
            }
        }
    }
}
