//! Runtime orchestration.
//!
//! The runtime builds a robot from configuration, wires up the adapter and
//! brain, runs the dispatch and connection loops, and tears everything down
//! on a shutdown signal.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::CourierRuntime;
//!
//! #[tokio::main]
//! async fn main() -> courier_runtime::RuntimeResult<()> {
//!     let runtime = CourierRuntime::new();
//!     runtime.attach_client(my_rtm_client);
//!     runtime.run().await
//! }
//! ```

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::signal;
use tracing::{error, info};

use courier_adapter_rtm::RtmAdapter;
use courier_adapter_rtm::client::BoxedClient;
use courier_core::{Adapter, BoxedAdapter, MemoryBrain, Robot};

use crate::config::{ConfigLoader, CourierConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// The main Courier runtime.
///
/// Owns the robot and the adapter task. Scripts register against
/// [`robot`](CourierRuntime::robot) before [`run`](CourierRuntime::run).
pub struct CourierRuntime {
    config: CourierConfig,
    robot: Arc<Robot>,
    adapter: RwLock<Option<Arc<RtmAdapter>>>,
}

impl CourierRuntime {
    /// Creates a runtime with automatic configuration loading.
    ///
    /// Reads `courier.toml` and `COURIER_*` variables; falls back to
    /// defaults when no configuration is found.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("warning: failed to load config ({e}), using defaults");
            CourierConfig::default()
        });
        Self::from_config(config)
    }

    /// Creates a runtime from a loaded configuration.
    ///
    /// Initializes logging and builds the robot; the default brain is an
    /// in-memory store that is immediately loaded.
    pub fn from_config(config: CourierConfig) -> Self {
        logging::init_from_config(&config.logging);

        let mut robot = Robot::new(&config.name)
            .with_drain_interval(config.queue.drain_interval())
            .with_queue_soft_limit(config.queue.soft_limit);
        if let Some(alias) = &config.alias {
            robot = robot.with_alias(alias);
        }
        let robot = Arc::new(robot);
        robot.set_brain(Arc::new(MemoryBrain::loaded()));

        info!(name = %config.name, "runtime configured");
        Self {
            config,
            robot,
            adapter: RwLock::new(None),
        }
    }

    /// The configuration the runtime was built from.
    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    /// The robot, for script and middleware registration.
    pub fn robot(&self) -> Arc<Robot> {
        Arc::clone(&self.robot)
    }

    /// Builds the RTM adapter over `client` and attaches it to the robot.
    pub fn attach_client(&self, client: BoxedClient) {
        let adapter = Arc::new(RtmAdapter::new(client, self.config.adapter.clone()));
        self.robot
            .attach_adapter(Arc::clone(&adapter) as BoxedAdapter);
        *self.adapter.write() = Some(adapter);
    }

    /// Runs until a shutdown signal or until the robot stops on its own
    /// (a terminal adapter close with reconnection off), then tears down:
    /// cancel, final drain, brain save and close.
    pub async fn run(&self) -> RuntimeResult<()> {
        info!(name = %self.config.name, "runtime starting");

        let robot = Arc::clone(&self.robot);
        let dispatch = tokio::spawn(async move { robot.run().await });

        let adapter = self.adapter.read().clone();
        if let Some(adapter) = &adapter {
            tokio::spawn(Arc::clone(adapter).run(Arc::clone(&self.robot)));
        } else {
            info!("no adapter attached, dispatch loop only");
        }

        let cancel = self.robot.cancellation_token();
        tokio::select! {
            _ = shutdown_signal() => info!("shutdown signal received"),
            _ = cancel.cancelled() => info!("robot stopped"),
        }

        self.robot.shutdown();
        if let Some(adapter) = &adapter {
            adapter.close().await;
        }
        dispatch
            .await
            .map_err(|e| RuntimeError::Dispatch(e.to_string()))?;

        let brain = self.robot.brain();
        brain.save().await?;
        brain.close().await?;
        info!("runtime stopped");
        Ok(())
    }
}

impl Default for CourierRuntime {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use std::time::Duration;

    fn quiet_config() -> CourierConfig {
        CourierConfig {
            name: "hubert".to_string(),
            alias: Some("/".to_string()),
            queue: QueueConfig {
                drain_interval_ms: 50,
                soft_limit: 8,
            },
            ..CourierConfig::default()
        }
    }

    #[tokio::test]
    async fn robot_reflects_configuration() {
        let runtime = CourierRuntime::from_config(quiet_config());
        let robot = runtime.robot();
        assert_eq!(robot.name(), "hubert");
        assert_eq!(robot.alias(), Some("/"));
    }

    #[tokio::test]
    async fn run_exits_when_the_robot_is_cancelled() {
        let runtime = CourierRuntime::from_config(quiet_config());
        runtime.robot().shutdown();

        tokio::time::timeout(Duration::from_secs(2), runtime.run())
            .await
            .expect("runtime did not stop")
            .expect("runtime returned an error");
    }
}
