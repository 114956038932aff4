//! Running the `claude` CLI as a supervised subprocess
//!
//! Holds everything that knows about the executable itself: which model names
//! it accepts, which permissions it is granted, how its `stream-json` output
//! is shaped, and how its failures are reported.

mod classify;
mod error;
pub mod fragment;
mod invocation;
pub mod model;
mod policy;
mod supervisor;
mod version;

pub use classify::classify_failure;
pub use error::{CliError, TimeoutKind};
pub use invocation::Invocation;
pub use model::{ResolvedModel, UnknownModel};
pub use policy::PermissionPolicy;
pub use supervisor::{SupervisedProcess, Supervisor, SupervisorEvent, SupervisorSettings};
pub use version::probe_version;
