//! Worker runtime: update-build job queue, socket server, realtime channel.
//!
//! The worker owns one [`monitor_sync::Reconciler`] wired to the default
//! collaborators and runs every queued job through it, one at a time.

pub mod dead_letter;
mod error;
pub mod jobs;
pub mod logging;
pub mod paths;
pub mod protocol;
pub mod push;
mod runtime;

pub use dead_letter::DeadLetter;
pub use error::WorkerError;
pub use jobs::{perform, JobFailure, JobOptions, JobSummary};
pub use protocol::{
    request_status, request_stop, request_update_build, send_request, subscribe, WorkerRequest,
    WorkerResponse,
};
pub use push::{PushChannel, PushEvent, PushKind, RealtimeNotifier, SocketBroadcaster};
pub use runtime::{run, start_blocking, WorkerStats};
