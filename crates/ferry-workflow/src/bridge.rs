//! Delegates the structural UI -> API translation to the target runtime.
//!
//! The runtime owns the operation-type registry, so conversion runs in a
//! child process of its own interpreter. Data crosses the process boundary
//! through three uniquely named scratch files, all removed on every exit path.

use crate::{
    ApiGraph, BridgeConfig, CommandRunner, CommandSpec, ConvertError, LocalCommandRunner,
    TargetEnvironment, provision_scratch_dir,
};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Converter module the driver program loads from the driver directory.
pub const CONVERTER_MODULE_FILE: &str = "workflow_converter.py";

const DRIVER_PROGRAM: &str = include_str!("../resources/driver.py");

/// Port for the structural conversion step.
///
/// `Ok(None)` means the bridge declined to produce a graph (non-strict mode);
/// strict implementations return an error instead.
pub trait ConversionBridge: Send + Sync {
    fn convert(&self, ui_graph: &Value) -> Result<Option<ApiGraph>, ConvertError>;
}

/// Scratch files for one bridge run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BridgeFiles {
    pub input: PathBuf,
    pub output: PathBuf,
    pub driver: PathBuf,
}

impl BridgeFiles {
    pub fn allocate(dir: &Path) -> Self {
        let unique = |prefix: &str, extension: &str| {
            dir.join(format!("{prefix}_{}.{extension}", Uuid::new_v4().simple()))
        };
        Self {
            input: unique("workflow_input", "json"),
            output: unique("workflow_output", "json"),
            driver: unique("workflow_runner", "py"),
        }
    }

    pub fn paths(&self) -> [&Path; 3] {
        [&self.input, &self.output, &self.driver]
    }

    fn remove_all(&self) {
        for path in self.paths() {
            if !path.exists() {
                continue;
            }
            if let Err(error) = fs::remove_file(path) {
                warn!(path = %path.display(), error = %error, "failed to remove bridge scratch file");
            }
        }
    }
}

pub struct ExternalBridge<R = LocalCommandRunner> {
    environment: TargetEnvironment,
    config: BridgeConfig,
    runner: R,
}

impl ExternalBridge<LocalCommandRunner> {
    pub fn new(environment: TargetEnvironment, config: BridgeConfig) -> Self {
        Self::with_runner(environment, config, LocalCommandRunner)
    }
}

impl<R: CommandRunner> ExternalBridge<R> {
    pub fn with_runner(environment: TargetEnvironment, config: BridgeConfig, runner: R) -> Self {
        Self {
            environment,
            config,
            runner,
        }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Checks interpreter, install dir and converter module, in that order.
    /// Returns the interpreter path.
    pub fn preflight(&self) -> Result<PathBuf, ConvertError> {
        let interpreter = match &self.environment.interpreter_path {
            Some(path) if path.is_file() => path.clone(),
            Some(path) => {
                return Err(ConvertError::InterpreterNotFound(path.display().to_string()));
            }
            None => {
                return Err(ConvertError::InterpreterNotFound(format!(
                    "no embedded interpreter near '{}'",
                    self.environment.base_dir.display()
                )));
            }
        };

        if !self.environment.install_dir.is_dir() {
            return Err(ConvertError::InstallDirNotFound(
                self.environment.install_dir.clone(),
            ));
        }

        let converter = self.config.driver_dir.join(CONVERTER_MODULE_FILE);
        if !converter.is_file() {
            return Err(ConvertError::DriverProgramMissing(converter));
        }

        Ok(interpreter)
    }

    /// Strict run: every failure is returned.
    pub fn run(&self, ui_graph: &Value) -> Result<ApiGraph, ConvertError> {
        let interpreter = self.preflight()?;
        let scratch = provision_scratch_dir(&self.config.scratch_root)?;
        let scratch = std::path::absolute(&scratch).map_err(|error| {
            ConvertError::io(
                format!("failed to resolve scratch directory '{}'", scratch.display()),
                error,
            )
        })?;

        let files = scopeguard::guard(BridgeFiles::allocate(&scratch), |files| {
            files.remove_all();
        });

        write_file(&files.input, &serde_json::to_vec(ui_graph)?)?;
        write_file(&files.driver, DRIVER_PROGRAM.as_bytes())?;

        let spec = CommandSpec {
            program: interpreter,
            args: vec![
                path_arg(&files.driver),
                path_arg(&files.input),
                path_arg(&files.output),
                path_arg(&self.config.driver_dir),
                path_arg(&self.environment.install_dir),
            ],
            working_dir: Some(self.config.driver_dir.clone()),
            timeout: self.config.timeout,
        };
        info!(
            interpreter = %spec.program.display(),
            install_dir = %self.environment.install_dir.display(),
            "launching external conversion"
        );

        let result = self.runner.run(&spec)?;
        debug!(
            exit_code = result.exit_code,
            duration_ms = result.duration_ms as u64,
            "external conversion exited"
        );

        if result.timed_out {
            return Err(ConvertError::ChildProcessTimedOut {
                timeout_ms: spec.timeout.unwrap_or_default().as_millis(),
                output: result.combined_output(),
            });
        }
        if result.exit_code != 0 {
            return Err(ConvertError::ChildProcessFailed {
                exit_code: result.exit_code,
                output: result.combined_output(),
            });
        }
        if !files.output.is_file() {
            return Err(ConvertError::OutputFileMissing(files.output.clone()));
        }

        let raw = fs::read(&files.output).map_err(|error| {
            ConvertError::io(
                format!("failed to read converter output '{}'", files.output.display()),
                error,
            )
        })?;
        let value: Value = serde_json::from_slice(&raw).map_err(|error| {
            ConvertError::MalformedGraph(format!("converter output is not valid JSON: {error}"))
        })?;
        let graph = ApiGraph::from_value(value)?;
        info!(nodes = graph.len(), "external conversion succeeded");
        Ok(graph)
    }

    /// Non-strict run: failures are logged and reported as no result.
    pub fn try_convert(&self, ui_graph: &Value) -> Option<ApiGraph> {
        match self.run(ui_graph) {
            Ok(graph) => Some(graph),
            Err(failure) => {
                error!(error = %failure, "external conversion failed");
                None
            }
        }
    }
}

impl<R: CommandRunner> ConversionBridge for ExternalBridge<R> {
    fn convert(&self, ui_graph: &Value) -> Result<Option<ApiGraph>, ConvertError> {
        if self.config.strict {
            self.run(ui_graph)
                .inspect_err(|failure| error!(error = %failure, "external conversion failed"))
                .map(Some)
        } else {
            Ok(self.try_convert(ui_graph))
        }
    }
}

fn write_file(path: &Path, contents: &[u8]) -> Result<(), ConvertError> {
    fs::write(path, contents).map_err(|error| {
        ConvertError::io(format!("failed to write '{}'", path.display()), error)
    })
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
