//! Child-process engine.
//!
//! Runs a script's entry point as a child process. The runtime is picked
//! from the file extension (`.sh` via bash, `.py` via python3, `.js` via
//! node, anything else executed directly), the invocation is piped to
//! stdin as JSON, and stdout/stderr are echoed line by line while being
//! reported to the attached [`TelemetrySink`].

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Command;

use super::{EngineError, ScriptEngine};
use crate::invocation::{Invocation, OptionValue};
use crate::manifest::ScriptManifest;
use crate::runtime::EngineConfig;
use crate::telemetry::{RuntimeSignal, TelemetrySink};

/// Lock file created in the script directory when `useLockFile` is set.
pub const LOCK_FILE: &str = "script.lock";

/// Default [`ScriptEngine`]: one child process per run.
#[derive(Debug, Default)]
pub struct SubprocessEngine {
    /// Lock files created by this engine and not yet removed.
    held_locks: Mutex<Vec<PathBuf>>,
}

impl SubprocessEngine {
    pub fn new() -> Self {
        Self::default()
    }

    async fn acquire_lock(&self, manifest: &ScriptManifest) -> Result<PathBuf, EngineError> {
        let path = manifest.directory.join(LOCK_FILE);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(EngineError::Locked {
                    name: manifest.name.clone(),
                    path,
                });
            }
            Err(e) => return Err(e.into()),
        };

        self.locks().push(path.clone());
        file.write_all(std::process::id().to_string().as_bytes()).await?;

        tracing::debug!(script = %manifest.name, lock = %path.display(), "Acquired lock file");
        Ok(path)
    }

    async fn release_lock(&self, path: &Path) {
        self.locks().retain(|held| held != path);
        if let Err(e) = tokio::fs::remove_file(path).await {
            tracing::warn!(lock = %path.display(), error = %e, "Failed to remove lock file");
        }
    }

    fn locks(&self) -> std::sync::MutexGuard<'_, Vec<PathBuf>> {
        self.held_locks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ScriptEngine for SubprocessEngine {
    async fn run(
        &self,
        invocation: Invocation,
        config: EngineConfig,
        telemetry: Option<Arc<dyn TelemetrySink>>,
    ) -> Result<i32, EngineError> {
        let manifest = Arc::clone(&invocation.manifest);
        let main = manifest
            .main
            .as_deref()
            .ok_or_else(|| EngineError::NoEntryPoint(manifest.name.clone()))?;
        let entry = manifest.directory.join(main);

        let lock = if manifest.use_lock_file {
            Some(self.acquire_lock(&manifest).await?)
        } else {
            None
        };

        let result = run_child(&entry, &invocation, &config, telemetry.as_deref()).await;

        if let Some(path) = lock {
            self.release_lock(&path).await;
        }
        result
    }

    fn stop(&self) {
        let held = std::mem::take(&mut *self.locks());
        for path in held {
            match std::fs::remove_file(&path) {
                Ok(()) => tracing::debug!(lock = %path.display(), "Released lock file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(lock = %path.display(), error = %e, "Failed to remove lock file")
                }
            }
        }
    }
}

async fn run_child(
    entry: &Path,
    invocation: &Invocation,
    config: &EngineConfig,
    telemetry: Option<&dyn TelemetrySink>,
) -> Result<i32, EngineError> {
    let manifest = &invocation.manifest;

    let mut cmd = runtime_command(entry);
    cmd.args(command_line(invocation))
        .current_dir(&manifest.directory)
        .envs(environment(config))
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::debug!(script = %manifest.name, entry = %entry.display(), "Spawning script");
    let mut child = cmd.spawn()?;

    let payload = serde_json::to_vec(&stdin_payload(invocation, config)).unwrap_or_default();
    let stdin = child.stdin.take();
    let feed = async move {
        if let Some(mut stdin) = stdin {
            // Scripts are free to ignore stdin and close it early.
            let _ = stdin.write_all(&payload).await;
        }
    };

    let stdout = relay_lines(
        child.stdout.take(),
        (!config.quiet).then(tokio::io::stdout),
        |line| {
            if let Some(sink) = telemetry {
                sink.console(&format!("{line}\n"));
            }
        },
    );
    let stderr = relay_lines(child.stderr.take(), Some(tokio::io::stderr()), |line| {
        if let Some(sink) = telemetry {
            sink.signal(RuntimeSignal::Warning(line.to_string()));
        }
    });

    let (status, (), (), ()) = tokio::join!(child.wait(), feed, stdout, stderr);
    let status = status?;

    match status.code() {
        Some(code) => {
            tracing::debug!(script = %manifest.name, code, "Script exited");
            Ok(code)
        }
        None => {
            let message = format!("script '{}' was terminated by a signal", manifest.name);
            tracing::warn!(script = %manifest.name, "Script terminated by signal");
            if let Some(sink) = telemetry {
                sink.signal(RuntimeSignal::UncaughtException(message));
            }
            Ok(1)
        }
    }
}

/// Pick the interpreter for `entry` from its extension.
fn runtime_command(entry: &Path) -> Command {
    let interpreter = match entry.extension().and_then(OsStr::to_str) {
        Some("sh") => Some("bash"),
        Some("py") => Some("python3"),
        Some("js" | "mjs" | "cjs") => Some("node"),
        _ => None,
    };

    match interpreter {
        Some(program) => {
            let mut cmd = Command::new(program);
            cmd.arg(entry);
            cmd
        }
        None => Command::new(entry),
    }
}

/// Positional values in declared order, then options in declared order.
fn command_line(invocation: &Invocation) -> Vec<String> {
    let mut args: Vec<String> = invocation
        .positional_values()
        .into_iter()
        .map(str::to_string)
        .collect();

    for spec in invocation.manifest.options() {
        let Some(value) = invocation.options.get(&spec.name) else {
            continue;
        };
        let flag = match (spec.long_flag(), spec.short_flag()) {
            (Some(long), _) => format!("--{long}"),
            (None, Some(short)) => format!("-{short}"),
            (None, None) => continue,
        };
        match value {
            OptionValue::Switch(true) => args.push(flag),
            OptionValue::Switch(false) => {}
            OptionValue::Value(v) => {
                args.push(flag);
                args.push(v.clone());
            }
        }
    }

    args
}

fn environment(config: &EngineConfig) -> Vec<(&'static str, String)> {
    let path = |p: &Path| p.to_string_lossy().into_owned();
    vec![
        ("SCRIPTMUX_STAGE", config.stage.to_string()),
        ("SCRIPTMUX_LOG_LEVEL", config.log_level_console.to_string()),
        ("SCRIPTMUX_QUIET", config.quiet.to_string()),
        ("SCRIPTMUX_ROOT_DIR", path(&config.paths.root_dir)),
        ("SCRIPTMUX_SCRIPTS_PATH", path(&config.paths.scripts_path)),
        ("SCRIPTMUX_LOG_DIR", path(&config.paths.log_dir)),
    ]
}

fn stdin_payload(invocation: &Invocation, config: &EngineConfig) -> Value {
    json!({
        "name": invocation.name(),
        "arguments": invocation.arguments,
        "options": invocation.options,
        "ruleConfig": invocation.rule_config,
        "config": config,
    })
}

/// Read `reader` line by line until EOF, echo each line to `echo`, and
/// hand it to `on_line`. Invalid UTF-8 is replaced, never fatal.
async fn relay_lines<R, W, F>(reader: Option<R>, mut echo: Option<W>, mut on_line: F)
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
    F: FnMut(&str),
{
    let Some(reader) = reader else {
        return;
    };
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let raw = buf.strip_suffix(b"\n").unwrap_or(&buf);
                let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
                if let Some(out) = echo.as_mut() {
                    let _ = out.write_all(raw).await;
                    let _ = out.write_all(b"\n").await;
                    let _ = out.flush().await;
                }
                on_line(&String::from_utf8_lossy(raw));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read script output");
                break;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
