//! A controller that performs no user actions

use crate::control::{ControlError, ControllerContext, ControllerFactory, StatusSender, UserController};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

const INJECTED_ACTIONS_BUFFER: usize = 10;

/// Controller that idles until stopped.
///
/// It follows the full status protocol and reports injected actions as
/// info events, which makes it a stand-in user for exercising an engine
/// without a target server.
pub struct NoopController {
    id: usize,
    user_id: String,
    status: StatusSender,
    rate: Mutex<f64>,
    actions_tx: mpsc::Sender<String>,
    actions_rx: tokio::sync::Mutex<mpsc::Receiver<String>>,
    stop: watch::Sender<bool>,
    stopped: watch::Sender<bool>,
    launched: AtomicBool,
}

impl NoopController {
    pub fn new(ctx: ControllerContext) -> Self {
        let (actions_tx, actions_rx) = mpsc::channel(INJECTED_ACTIONS_BUFFER);
        Self {
            id: ctx.id,
            user_id: format!("noop-user-{}", ctx.id),
            status: ctx.status,
            rate: Mutex::new(1.0),
            actions_tx,
            actions_rx: tokio::sync::Mutex::new(actions_rx),
            stop: watch::channel(false).0,
            stopped: watch::channel(false).0,
            launched: AtomicBool::new(false),
        }
    }

    /// Factory building a `NoopController` per user
    pub fn factory() -> Arc<dyn ControllerFactory> {
        Arc::new(
            |ctx: ControllerContext| -> Result<Arc<dyn UserController>, ControlError> {
                Ok(Arc::new(NoopController::new(ctx)))
            },
        )
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn rate(&self) -> f64 {
        *self.rate.lock()
    }
}

#[async_trait]
impl UserController for NoopController {
    async fn run(&self) {
        let user_id = Some(self.user_id.clone());
        if self.launched.swap(true, Ordering::SeqCst) {
            tracing::warn!(controller_id = self.id, "Controller is already running");
            return;
        }

        let mut stop = self.stop.subscribe();
        let mut actions = self.actions_rx.lock().await;

        if !*stop.borrow_and_update() {
            let _ = self.status.started(user_id.clone()).await;
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    Some(action) = actions.recv() => {
                        let _ = self
                            .status
                            .info(user_id.clone(), format!("action {} performed", action))
                            .await;
                    }
                }
            }
        }

        let _ = self.status.stopped(user_id).await;
        self.stopped.send_replace(true);
    }

    async fn stop(&self) {
        self.stop.send_replace(true);
        if self.launched.load(Ordering::SeqCst) {
            let mut stopped = self.stopped.subscribe();
            let _ = stopped.wait_for(|stopped| *stopped).await;
        }
    }

    fn set_rate(&self, rate: f64) -> Result<(), ControlError> {
        if rate < 0.0 {
            return Err(ControlError::new("rate should be a positive value"));
        }
        *self.rate.lock() = rate;
        Ok(())
    }

    async fn inject_action(&self, action: &str) -> Result<(), ControlError> {
        self.actions_tx
            .try_send(action.to_string())
            .map_err(|_| ControlError::new(format!("action {} could not be queued", action)))
    }
}
