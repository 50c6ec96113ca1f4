//! Argonav session engine.
//!
//! All keystrokes and backend completions arrive as [`Msg`] values and go
//! through [`Session::update`], which returns the [`Command`]s to run next.
//! The [`Dispatcher`] runs those commands on tokio tasks and posts their
//! results back into the same channel. The session itself never awaits.
//!
//! Pieces:
//! - [`projection`]: filtered, sorted view of the application list with stable selection.
//! - [`modal`]: sync, rollback, terminate, delete and the create/edit wizards.
//! - [`overlay`]: resource detail, events, logs, diff, history and help.
//! - [`dispatch`]: command execution and the single log subscription.

#![forbid(unsafe_code)]

pub mod dispatch;
pub mod input;
pub mod keys;
pub mod modal;
pub mod msg;
pub mod overlay;
pub mod projection;
mod session;

pub use dispatch::{execute, Dispatcher};
pub use keys::Key;
pub use modal::Modal;
pub use msg::{Command, Msg, SyncOutcome};
pub use overlay::Overlay;
pub use projection::{Projection, SortMode};
pub use session::{Focus, Session, SessionOptions, CHROME_ROWS, DEFAULT_LOG_BACKLOG};
