//! Dispatcher: ties the command registry, the monitoring session and the
//! script engine together for one invocation.

use std::ffi::OsString;
use std::sync::Arc;

use tokio::sync::oneshot;

use scriptmux_core::context::AppContext;
use scriptmux_core::engine::ScriptEngine;
use scriptmux_core::invocation::Invocation;
use scriptmux_core::monitoring;
use scriptmux_core::runtime::{EngineConfig, LogLevel};
use scriptmux_core::telemetry::{RuntimeSignal, TelemetrySink};
use scriptmux_monitor::{
    install_panic_relay, MonitoringSession, SessionIdentity, SessionOutcome, SetupError,
    StatsCollector,
};

use crate::error::CliError;
use crate::registry::{CommandRegistry, Resolution};

/// Code reported when the script could not complete normally.
const FAILURE_CODE: i32 = 1;

/// What the command line asked for.
#[derive(Debug)]
pub enum Plan {
    Help(String),
    Run(Box<RunPlan>),
}

/// A validated script invocation, ready to execute.
#[derive(Debug)]
pub struct RunPlan {
    pub invocation: Invocation,
    pub config: EngineConfig,
    pub log_level: LogLevel,
}

pub struct Dispatcher<E> {
    ctx: AppContext,
    registry: CommandRegistry,
    engine: Arc<E>,
}

impl<E: ScriptEngine> Dispatcher<E> {
    pub fn new(ctx: AppContext, registry: CommandRegistry, engine: E) -> Self {
        Self {
            ctx,
            registry,
            engine: Arc::new(engine),
        }
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Validate `argv` and work out stage, log level and engine config.
    ///
    /// Nothing runs here; a `ValidationError` leaves no side effects.
    pub fn plan<I, T>(&self, argv: I) -> Result<Plan, CliError>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match self.registry.resolve(argv)? {
            Resolution::Help(text) => Ok(Plan::Help(text)),
            Resolution::Invoke { invocation, flags } => {
                let stage = flags.stage(self.ctx.env_stage);
                let log_level = flags.log_level();
                let config =
                    EngineConfig::new(stage, self.ctx.paths.clone(), log_level, flags.quiet);

                tracing::debug!(
                    script = %invocation.name(),
                    %stage,
                    %log_level,
                    "Resolved invocation",
                );

                Ok(Plan::Run(Box::new(RunPlan {
                    invocation,
                    config,
                    log_level,
                })))
            }
        }
    }

    /// Run the planned script and return the process exit code.
    ///
    /// Monitoring is attempted first when configured; any setup failure is
    /// logged and the script runs standalone. The engine is stopped on
    /// every path before this returns.
    pub async fn execute(&self, plan: RunPlan) -> i32 {
        let RunPlan {
            mut invocation,
            config,
            ..
        } = plan;

        let session = self.open_session(&invocation).await;

        invocation.rule_config = session
            .as_ref()
            .and_then(|session| session.rule_config().cloned());

        let telemetry: Option<Arc<dyn TelemetrySink>> = session.as_ref().map(|session| {
            let handle = session.handle();
            install_panic_relay(handle.clone());
            Arc::new(handle) as Arc<dyn TelemetrySink>
        });

        let (done_tx, done_rx) = oneshot::channel();
        let engine = Arc::clone(&self.engine);
        let script = invocation.name().to_string();

        tracing::info!(script = %script, monitored = session.is_some(), "Running script");

        let task = tokio::spawn(async move {
            let code = match engine.run(invocation, config, telemetry.clone()).await {
                Ok(code) => code,
                Err(e) => {
                    tracing::error!(script = %script, error = %e, "Script failed");
                    if let Some(sink) = &telemetry {
                        sink.signal(RuntimeSignal::UnhandledRejection(e.to_string()));
                    }
                    FAILURE_CODE
                }
            };
            if done_tx.send(code).is_err() {
                tracing::debug!(script = %script, "Completion no longer awaited");
            }
        });

        let code = match session {
            Some(session) => match session.run(done_rx).await {
                SessionOutcome::Exited(code) => code,
                SessionOutcome::Killed => {
                    task.abort();
                    0
                }
            },
            None => done_rx.await.unwrap_or(FAILURE_CODE),
        };

        self.engine.stop();
        tracing::debug!(code, "Dispatch finished");
        code
    }

    async fn open_session(&self, invocation: &Invocation) -> Option<MonitoringSession> {
        let manifest = &invocation.manifest;

        let resolved = monitoring::resolve(manifest.monitoring.as_ref(), self.ctx.monitoring.as_ref());
        let result = match resolved {
            Ok(None) => return None,
            Ok(Some(config)) => {
                let identity = SessionIdentity::new(manifest.name.clone(), &self.ctx.paths.root_dir);
                let stats = StatsCollector::new(self.ctx.started_at);
                MonitoringSession::connect(config, &identity, stats).await
            }
            Err(e) => Err(SetupError::from(e)),
        };

        match result {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::warn!(
                    script = %manifest.name,
                    error = %e,
                    "Could not initialize monitoring, running without it",
                );
                None
            }
        }
    }
}
