//! Contract between the engine and the user controllers it drives
//!
//! A controller simulates one user. The engine creates it through a
//! [`ControllerFactory`], runs it on its own task and talks back to it only
//! through [`UserController::stop`], [`UserController::set_rate`] and
//! [`UserController::inject_action`]. In the other direction the controller
//! reports through the [`StatusSender`] it received at construction.

use crate::shared::SharedState;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::panic::Location;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

/// Error raised by a controller while performing user actions.
///
/// `origin` records where in the controller the error was created.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ControlError {
    pub message: String,
    pub origin: String,
}

impl ControlError {
    #[track_caller]
    pub fn new(message: impl Into<String>) -> Self {
        let location = Location::caller();
        Self {
            message: message.into(),
            origin: format!("{}:{}", location.file(), location.line()),
        }
    }
}

/// What happened to a user
#[derive(Debug, Clone, PartialEq)]
pub enum UserEvent {
    Started,
    Stopped,
    Done,
    Info(String),
    Error(ControlError),
    Failed(ControlError),
}

impl UserEvent {
    /// Whether the controller is gone after emitting this event
    pub fn is_terminal(&self) -> bool {
        matches!(self, UserEvent::Stopped | UserEvent::Failed(_))
    }
}

/// A status report from a controller
#[derive(Debug, Clone, PartialEq)]
pub struct UserStatus {
    pub controller_id: usize,
    pub user_id: Option<String>,
    pub event: UserEvent,
}

/// Returned when a controller reports after it already stopped or failed
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("status channel of controller {0} is closed")]
pub struct StatusClosed(pub usize);

/// Reporting handle given to each controller.
///
/// Clones share state: once any clone delivers a terminal event
/// (`Stopped` or `Failed`) every further send is rejected.
#[derive(Debug, Clone)]
pub struct StatusSender {
    inner: Arc<SenderInner>,
}

#[derive(Debug)]
struct SenderInner {
    controller_id: usize,
    tx: Mutex<Option<mpsc::Sender<UserStatus>>>,
}

impl StatusSender {
    pub fn new(controller_id: usize, tx: mpsc::Sender<UserStatus>) -> Self {
        Self {
            inner: Arc::new(SenderInner {
                controller_id,
                tx: Mutex::new(Some(tx)),
            }),
        }
    }

    pub fn controller_id(&self) -> usize {
        self.inner.controller_id
    }

    /// Whether a terminal event was delivered or the sender was closed
    pub fn is_closed(&self) -> bool {
        self.inner.tx.lock().is_none()
    }

    /// Drop the channel without reporting anything. Used for controllers
    /// that were built but never started.
    pub fn close(&self) {
        self.inner.tx.lock().take();
    }

    /// Report an event. Blocks while the engine's buffer is full.
    pub async fn send(&self, user_id: Option<String>, event: UserEvent) -> Result<(), StatusClosed> {
        let closed = StatusClosed(self.inner.controller_id);
        let tx = {
            let mut guard = self.inner.tx.lock();
            if event.is_terminal() {
                guard.take()
            } else {
                guard.clone()
            }
        };

        let tx = tx.ok_or(closed)?;
        tx.send(UserStatus {
            controller_id: self.inner.controller_id,
            user_id,
            event,
        })
        .await
        .map_err(|_| closed)
    }

    pub async fn started(&self, user_id: Option<String>) -> Result<(), StatusClosed> {
        self.send(user_id, UserEvent::Started).await
    }

    pub async fn stopped(&self, user_id: Option<String>) -> Result<(), StatusClosed> {
        self.send(user_id, UserEvent::Stopped).await
    }

    pub async fn info(&self, user_id: Option<String>, info: impl Into<String>) -> Result<(), StatusClosed> {
        self.send(user_id, UserEvent::Info(info.into())).await
    }

    pub async fn error(&self, user_id: Option<String>, err: ControlError) -> Result<(), StatusClosed> {
        self.send(user_id, UserEvent::Error(err)).await
    }

    pub async fn failed(&self, user_id: Option<String>, err: ControlError) -> Result<(), StatusClosed> {
        self.send(user_id, UserEvent::Failed(err)).await
    }
}

/// A simulated user
#[async_trait]
pub trait UserController: Send + Sync {
    /// Perform user actions until [`stop`](Self::stop) is called. Returns
    /// once the controller has cleaned up.
    async fn run(&self);

    /// Ask the controller to stop and wait until `run` has wound down
    async fn stop(&self);

    /// Relative pacing of actions. 1.0 is the usual speed, 2.0 half of it.
    fn set_rate(&self, rate: f64) -> Result<(), ControlError>;

    /// Run a named action once at the next opportunity
    async fn inject_action(&self, action: &str) -> Result<(), ControlError> {
        Err(ControlError {
            message: format!("action {} is not supported", action),
            origin: module_path!().to_string(),
        })
    }
}

/// Everything a controller gets at construction
#[derive(Debug, Clone)]
pub struct ControllerContext {
    pub id: usize,
    pub status: StatusSender,
    pub shared: Arc<SharedState>,
}

/// Builds controllers for the engine
pub trait ControllerFactory: Send + Sync {
    fn new_controller(&self, ctx: ControllerContext) -> Result<Arc<dyn UserController>, ControlError>;
}

impl<F> ControllerFactory for F
where
    F: Fn(ControllerContext) -> Result<Arc<dyn UserController>, ControlError> + Send + Sync,
{
    fn new_controller(&self, ctx: ControllerContext) -> Result<Arc<dyn UserController>, ControlError> {
        self(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_error_origin() {
        let err = ControlError::new("login failed");
        assert_eq!(err.to_string(), "login failed");
        assert!(err.origin.contains("control.rs"));
    }

    #[tokio::test]
    async fn test_no_sends_after_terminal_event() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = StatusSender::new(7, tx);
        let clone = sender.clone();

        sender.started(Some("user7".to_string())).await.unwrap();
        clone.stopped(None).await.unwrap();
        assert!(sender.is_closed());
        assert_eq!(sender.info(None, "late").await, Err(StatusClosed(7)));
        assert_eq!(clone.stopped(None).await, Err(StatusClosed(7)));

        let first = rx.recv().await.unwrap();
        assert_eq!(first.controller_id, 7);
        assert_eq!(first.event, UserEvent::Started);
        assert_eq!(rx.recv().await.unwrap().event, UserEvent::Stopped);

        // Both senders gave up their channel handle
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_failed_is_terminal() {
        let (tx, _rx) = mpsc::channel(4);
        let sender = StatusSender::new(1, tx);
        sender.error(None, ControlError::new("transient")).await.unwrap();
        assert!(!sender.is_closed());
        sender.failed(None, ControlError::new("fatal")).await.unwrap();
        assert!(sender.is_closed());
    }
}
