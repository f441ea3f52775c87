//! The out-of-process geospatial toolchain.
//!
//! The pipeline only sees [`ExternalTool`]. [`GdalTool`] drives `ogrinfo` and
//! `ogr2ogr` as child processes; [`MockTool`] replays canned output in tests.

use crate::ingest::IngestError;
use async_trait::async_trait;
use std::fmt::Debug;
use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Captured result of one tool invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    /// `None` when the process was terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ToolOutput {
    pub fn success(stdout: &str) -> Self {
        Self {
            exit_code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stdout: &str, stderr: &str) -> Self {
        Self {
            exit_code: Some(exit_code),
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        }
    }

    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// Standard output followed by standard error, trimmed.
    pub fn combined(&self) -> String {
        let mut combined = self.stdout.trim().to_string();
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            if !combined.is_empty() {
                combined.push('\n');
            }
            combined.push_str(stderr);
        }
        combined
    }
}

/// Destination of a convert run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// Relational destination in the tool's syntax, e.g. `PG:dbname=maps`.
    pub connection: String,
    pub table: String,
    pub target_srs: String,
}

#[async_trait]
pub trait ExternalTool: Debug + Send + Sync {
    /// Summarize the datasource at `path` without modifying it.
    async fn inspect(&self, path: &str) -> Result<ToolOutput, IngestError>;

    /// Load the datasource at `path` into a new table.
    async fn convert(&self, path: &str, options: &ConvertOptions)
        -> Result<ToolOutput, IngestError>;
}

/// GDAL command line tools.
#[derive(Debug, Clone)]
pub struct GdalTool {
    info_program: String,
    convert_program: String,
    timeout: Duration,
}

impl GdalTool {
    pub fn new(
        info_program: impl Into<String>,
        convert_program: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            info_program: info_program.into(),
            convert_program: convert_program.into(),
            timeout,
        }
    }

    pub fn info_args(path: &str) -> Vec<String> {
        [
            "-ro",
            "-so",
            "-al",
            "-oo",
            "FLATTEN_NESTED_ATTRIBUTES=YES",
            path,
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    pub fn convert_args(path: &str, options: &ConvertOptions) -> Vec<String> {
        [
            "-f",
            "PostgreSQL",
            options.connection.as_str(),
            path,
            "-nln",
            options.table.as_str(),
            "-t_srs",
            options.target_srs.as_str(),
            "-oo",
            "FLATTEN_NESTED_ATTRIBUTES=YES",
            "-nlt",
            "PROMOTE_TO_MULTI",
            "-lco",
            "PRECISION=NO",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
}

#[async_trait]
impl ExternalTool for GdalTool {
    async fn inspect(&self, path: &str) -> Result<ToolOutput, IngestError> {
        let mut command = Command::new(&self.info_program);
        command.args(Self::info_args(path));
        run_with_timeout(command, &self.info_program, self.timeout).await
    }

    async fn convert(
        &self,
        path: &str,
        options: &ConvertOptions,
    ) -> Result<ToolOutput, IngestError> {
        let mut command = Command::new(&self.convert_program);
        command
            .args(Self::convert_args(path, options))
            .env("PG_USE_COPY", "YES");
        run_with_timeout(command, &self.convert_program, self.timeout).await
    }
}

/// Run `command` to completion, killing it if it outlives `timeout`.
pub(crate) async fn run_with_timeout(
    mut command: Command,
    tool: &str,
    timeout: Duration,
) -> Result<ToolOutput, IngestError> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = command.spawn().map_err(|source| IngestError::ToolLaunch {
        tool: tool.to_string(),
        source,
    })?;

    // Dropping the wait future on timeout drops the child, which kills it.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| IngestError::ToolTimeout {
            tool: tool.to_string(),
            seconds: timeout.as_secs(),
        })??;

    debug!(tool, exit_code = ?output.status.code(), "External tool finished");
    Ok(ToolOutput {
        exit_code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// One recorded [`MockTool`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolCall {
    Inspect { path: String },
    Convert { path: String, options: ConvertOptions },
}

/// Canned tool output for tests.
#[derive(Debug)]
pub struct MockTool {
    inspect_output: ToolOutput,
    convert_output: ToolOutput,
    calls: Mutex<Vec<ToolCall>>,
}

impl MockTool {
    pub fn new(inspect_output: ToolOutput, convert_output: ToolOutput) -> Self {
        Self {
            inspect_output,
            convert_output,
            calls: Mutex::default(),
        }
    }

    /// Inspect succeeds with `report`; convert succeeds silently.
    pub fn succeeding(report: &str) -> Self {
        Self::new(ToolOutput::success(report), ToolOutput::success(""))
    }

    pub fn calls(&self) -> Vec<ToolCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExternalTool for MockTool {
    async fn inspect(&self, path: &str) -> Result<ToolOutput, IngestError> {
        self.calls.lock().unwrap().push(ToolCall::Inspect {
            path: path.to_string(),
        });
        Ok(self.inspect_output.clone())
    }

    async fn convert(
        &self,
        path: &str,
        options: &ConvertOptions,
    ) -> Result<ToolOutput, IngestError> {
        self.calls.lock().unwrap().push(ToolCall::Convert {
            path: path.to_string(),
            options: options.clone(),
        });
        Ok(self.convert_output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_convert_args_target_table_and_srs() {
        let options = ConvertOptions {
            connection: "PG:dbname=maps".to_string(),
            table: "upld1_data".to_string(),
            target_srs: "EPSG:4326".to_string(),
        };
        let args = GdalTool::convert_args("/vsizip//tmp/a.zip", &options);
        let pos = |flag: &str| args.iter().position(|a| a == flag).unwrap();
        assert_eq!(args[pos("-nln") + 1], "upld1_data");
        assert_eq!(args[pos("-t_srs") + 1], "EPSG:4326");
        assert_eq!(args[pos("-nlt") + 1], "PROMOTE_TO_MULTI");
        assert_eq!(args[2], "PG:dbname=maps");
        assert_eq!(args[3], "/vsizip//tmp/a.zip");
    }

    #[test]
    fn test_combined_output() {
        let output = ToolOutput::failure(1, "out\n", "  err \n");
        assert_eq!(output.combined(), "out\nerr");
        assert!(!output.exited_cleanly());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let tool = GdalTool::new(
            "mapstudio-no-such-info-tool",
            "mapstudio-no-such-convert-tool",
            Duration::from_secs(5),
        );
        let err = tool.inspect("/tmp/x.geojson").await.unwrap_err();
        assert!(matches!(err, IngestError::ToolLaunch { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_hung_tool_times_out() {
        let mut command = Command::new("sleep");
        command.arg("5");
        let err = run_with_timeout(command, "sleep", Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::ToolTimeout { ref tool, .. } if tool == "sleep"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_stdout_is_captured() {
        let mut command = Command::new("echo");
        command.arg("ERROR 1: table already exists");
        let output = run_with_timeout(command, "echo", Duration::from_secs(5))
            .await
            .unwrap();
        assert!(output.exited_cleanly());
        assert_eq!(output.stdout.trim(), "ERROR 1: table already exists");
    }
}
