//! The load-test engine

use crate::control::{
    ControlError, ControllerContext, ControllerFactory, StatusSender, UserController, UserEvent,
    UserStatus,
};
use crate::error::{LoadTestError, PartialFailure};
use crate::limits;
use crate::rate::pick_rate;
use crate::shared::SharedState;
use crate::status::{State, Status, StatusCell};
use crate::wait::WaitGroup;
use futures::future::join_all;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use surge_config::{LoadTestConfig, Validatable};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info};

/// Runs a pool of user controllers inside this process.
///
/// Users are added and removed one at a time while the engine is running.
/// Removal always takes the most recently added users first. Controllers
/// report back over a bounded channel drained by a background task, which
/// keeps the published [`Status`] current.
pub struct LoadTester {
    config: LoadTestConfig,
    factory: Arc<dyn ControllerFactory>,
    shared: Arc<SharedState>,
    status: Arc<StatusCell>,
    wg: WaitGroup,
    inner: RwLock<Inner>,
}

struct Inner {
    state: State,
    controllers: Vec<ActiveController>,
    status_tx: Option<mpsc::Sender<UserStatus>>,
    next_id: usize,
}

struct ActiveController {
    id: usize,
    controller: Arc<dyn UserController>,
}

impl LoadTester {
    /// Create an engine. Fails if the configuration is invalid or the
    /// process cannot open enough files for `MaxActiveUsers` users.
    pub fn new(
        config: LoadTestConfig,
        factory: Arc<dyn ControllerFactory>,
    ) -> Result<Self, LoadTestError> {
        config.validate()?;
        limits::check_file_limit(config.users_configuration.max_active_users)?;

        Ok(Self {
            config,
            factory,
            shared: Arc::new(SharedState::new()),
            status: Arc::new(StatusCell::default()),
            wg: WaitGroup::new(),
            inner: RwLock::new(Inner {
                state: State::Stopped,
                controllers: Vec::new(),
                status_tx: None,
                next_id: 0,
            }),
        })
    }

    pub fn config(&self) -> &LoadTestConfig {
        &self.config
    }

    /// State shared by the controllers of this engine
    pub fn shared_state(&self) -> Arc<SharedState> {
        self.shared.clone()
    }

    /// Latest status snapshot
    pub fn status(&self) -> Status {
        Status::clone(&self.status.snapshot())
    }

    /// Start the load-test with `InitialActiveUsers` users.
    ///
    /// Users that fail to start are logged and skipped.
    pub async fn run(&self) -> Result<(), LoadTestError> {
        let mut inner = self.inner.write().await;
        if inner.state != State::Stopped {
            return Err(LoadTestError::NotStopped);
        }

        self.set_state(&mut inner, State::Starting);
        self.status.update(|s| {
            s.num_users_added = 0;
            s.num_users_removed = 0;
            s.num_users_stopped = 0;
            s.num_errors = 0;
            s.start_time = Some(chrono::Utc::now());
        });

        let capacity = self.config.users_configuration.max_active_users.max(1);
        let (tx, rx) = mpsc::channel(capacity);
        inner.status_tx = Some(tx);
        tokio::spawn(handle_status(rx, self.status.clone(), self.wg.clone()));

        let initial_users = self.config.users_configuration.initial_active_users;
        for _ in 0..initial_users {
            if let Err(e) = self.add_user(&mut inner) {
                error!(error = %e, "Failed to add initial user");
            }
        }

        self.set_state(&mut inner, State::Running);
        info!(num_users = inner.controllers.len(), "Load-test started");
        Ok(())
    }

    /// Stop every user and wait until all controllers have exited
    pub async fn stop(&self) -> Result<(), LoadTestError> {
        let mut inner = self.inner.write().await;
        if inner.state != State::Running {
            return Err(LoadTestError::NotRunning);
        }

        self.set_state(&mut inner, State::Stopping);

        let active = inner.controllers.len();
        if let Err(e) = self.remove_users_locked(&mut inner, active).await {
            error!(error = %e, "Failed to remove users while stopping");
        }

        self.wg.wait().await;
        inner.status_tx = None;
        self.status.update(|s| s.num_users = 0);
        self.set_state(&mut inner, State::Stopped);

        info!("Load-test stopped");
        Ok(())
    }

    /// Add `num_users` users, one at a time.
    ///
    /// Returns the number of users added, or how many were added before the
    /// first failure together with that failure.
    pub async fn add_users(&self, num_users: usize) -> Result<usize, PartialFailure> {
        if num_users == 0 {
            return Err(PartialFailure::new(0, LoadTestError::InvalidNumUsers));
        }

        let mut inner = self.inner.write().await;
        if inner.state != State::Running {
            return Err(PartialFailure::new(0, LoadTestError::NotRunning));
        }

        for added in 0..num_users {
            if let Err(e) = self.add_user(&mut inner) {
                return Err(PartialFailure::new(added, e));
            }
        }

        debug!(num_users, "Users added");
        Ok(num_users)
    }

    /// Remove up to `num_users` users, most recently added first.
    ///
    /// Asking for more users than are active removes all of them and fails
    /// with [`LoadTestError::NoUsersLeft`].
    pub async fn remove_users(&self, num_users: usize) -> Result<usize, PartialFailure> {
        if num_users == 0 {
            return Err(PartialFailure::new(0, LoadTestError::InvalidNumUsers));
        }

        let mut inner = self.inner.write().await;
        if inner.state != State::Running {
            return Err(PartialFailure::new(0, LoadTestError::NotRunning));
        }

        let removed = self.remove_users_locked(&mut inner, num_users).await?;
        debug!(num_users = removed, "Users removed");
        Ok(removed)
    }

    /// Forward a named action to every active controller
    pub async fn inject_action(&self, action: &str) -> Result<(), LoadTestError> {
        let inner = self.inner.read().await;
        if inner.state != State::Running {
            return Err(LoadTestError::NotRunning);
        }

        let results = join_all(
            inner
                .controllers
                .iter()
                .map(|active| active.controller.inject_action(action)),
        )
        .await;

        let failures: Vec<ControlError> = results.into_iter().filter_map(Result::err).collect();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(LoadTestError::InjectFailed(failures))
        }
    }

    fn set_state(&self, inner: &mut Inner, state: State) {
        inner.state = state;
        self.status.update(|s| s.state = state);
    }

    fn add_user(&self, inner: &mut Inner) -> Result<(), LoadTestError> {
        if inner.controllers.len() >= self.config.users_configuration.max_active_users {
            return Err(LoadTestError::MaxUsersReached);
        }
        let tx = inner.status_tx.clone().ok_or(LoadTestError::NotRunning)?;

        let id = inner.next_id;
        inner.next_id += 1;

        let status = StatusSender::new(id, tx);
        let controller = self.factory.new_controller(ControllerContext {
            id,
            status: status.clone(),
            shared: self.shared.clone(),
        });
        let controller = match controller {
            Ok(controller) => controller,
            Err(e) => {
                status.close();
                return Err(e.into());
            }
        };

        let rate = pick_rate(&self.config.user_controller_configuration)
            .and_then(|rate| controller.set_rate(rate).map_err(LoadTestError::from));
        if let Err(e) = rate {
            status.close();
            return Err(e);
        }

        self.wg.add(1);
        tokio::spawn({
            let controller = controller.clone();
            async move {
                let outcome = AssertUnwindSafe(controller.run()).catch_unwind().await;
                if status.is_closed() {
                    return;
                }
                // Controllers that return without reporting still count as stopped
                match outcome {
                    Ok(()) => {
                        let _ = status.stopped(None).await;
                    }
                    Err(panic) => {
                        let message = format!("controller panicked: {}", panic_message(&*panic));
                        let _ = status.failed(None, ControlError::new(message)).await;
                    }
                }
            }
        });

        inner.controllers.push(ActiveController { id, controller });
        self.status.update(|s| {
            s.num_users += 1;
            s.num_users_added += 1;
        });
        Ok(())
    }

    async fn remove_users_locked(
        &self,
        inner: &mut Inner,
        num_users: usize,
    ) -> Result<usize, PartialFailure> {
        let active = inner.controllers.len();
        let count = num_users.min(active);

        let removed = inner.controllers.split_off(active - count);
        join_all(removed.iter().rev().map(|active| {
            debug!(controller_id = active.id, "Stopping controller");
            active.controller.stop()
        }))
        .await;

        self.status.update(|s| {
            s.num_users -= count;
            s.num_users_removed += count;
        });

        if num_users > active {
            return Err(PartialFailure::new(count, LoadTestError::NoUsersLeft));
        }
        Ok(count)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

/// Drain controller reports until every sender is gone
async fn handle_status(mut rx: mpsc::Receiver<UserStatus>, status: Arc<StatusCell>, wg: WaitGroup) {
    while let Some(st) = rx.recv().await {
        let controller_id = st.controller_id;
        let user_id = st.user_id.as_deref().unwrap_or_default();

        match st.event {
            UserEvent::Started => debug!(controller_id, user_id, "User started"),
            UserEvent::Stopped => {
                status.update(|s| s.num_users_stopped += 1);
                wg.done();
                debug!(controller_id, user_id, "User stopped");
            }
            UserEvent::Done => info!(controller_id, user_id, "User done"),
            UserEvent::Info(message) => info!(controller_id, user_id, "{}", message),
            UserEvent::Error(err) => {
                status.update(|s| s.num_errors += 1);
                error!(controller_id, user_id, origin = %err.origin, "{}", err);
            }
            UserEvent::Failed(err) => {
                status.update(|s| s.num_users_stopped += 1);
                wg.done();
                error!(controller_id, user_id, origin = %err.origin, "User failed: {}", err);
            }
        }
    }
}
