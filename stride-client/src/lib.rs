pub mod backend;
pub mod client;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod request;
pub mod retry;

pub use backend::{MembershipBackend, Notifier, RequestBackend};
pub use client::StrideClient;
pub use config::ClientConfig;
pub use error::{FailedOperation, StrideError, StrideResult};
pub use reconciler::{reconcile, ApplyResult, Diff, Reconciler, SyncReport};
pub use request::RequestStateMachine;
pub use retry::RetryPolicy;
