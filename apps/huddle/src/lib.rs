pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod notify;
pub mod poll;
pub mod protocol;
pub mod session;
pub mod subscription;
pub mod telemetry;
pub mod transport;

pub use config::Config;
pub use error::SyncError;
pub use session::SyncSession;

#[cfg(test)]
mod tests;
