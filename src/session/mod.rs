//! Build sessions
//!
//! A session isolates one build request in its own workspace and drives it
//! through resolution, cache warming, the toolchain run, cache publishing
//! and packaging.

pub mod builder;
pub mod state;
pub mod workspace;

pub use builder::{BuildSession, Builder};
pub use state::{BuildRequest, BuildResult, SessionState};
pub use workspace::{Workspace, WorkspaceLayout};
