//! In-process load-test engine
//!
//! A [`LoadTester`] owns a pool of simulated users, each driven by a
//! [`UserController`] on its own task. Users are added and removed while the
//! engine runs, and controller reports are folded into a [`Status`]
//! snapshot that can be read at any time.

pub mod control;
pub mod error;
pub mod limits;
pub mod loadtester;
pub mod noop;
pub mod rate;
pub mod shared;
pub mod status;
pub mod wait;

pub use control::{
    ControlError, ControllerContext, ControllerFactory, StatusClosed, StatusSender,
    UserController, UserEvent, UserStatus,
};
pub use error::{LoadTestError, PartialFailure};
pub use loadtester::LoadTester;
pub use noop::NoopController;
pub use shared::{SharedState, ThreadInfo};
pub use status::{State, Status, StatusCell};
