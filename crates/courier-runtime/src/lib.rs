//! Courier Runtime - Orchestration layer for the Courier framework.
//!
//! This crate provides:
//! - Layered configuration loading (`courier.toml`, `COURIER_*` variables)
//! - Logging initialization over `tracing-subscriber`
//! - Runtime orchestration (`CourierRuntime`): robot construction, adapter
//!   and dispatch loops, signal-driven shutdown, brain save on exit
//!
//! ```ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> courier_runtime::RuntimeResult<()> {
//!     let runtime = CourierRuntime::new();
//!
//!     let robot = runtime.robot();
//!     robot
//!         .respond("ping", |res| {
//!             Box::pin(async move {
//!                 res.reply(&["pong"]).await?;
//!                 Ok(())
//!             })
//!         })
//!         .unwrap();
//!
//!     runtime.attach_client(my_rtm_client);
//!     runtime.run().await
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigLoader, CourierConfig, LogFormat, LogLevel, LoggingConfig, QueueConfig, load_config};
pub use error::{ConfigError, ConfigResult, RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::CourierRuntime;
