//! Boundary to the external quantification engine.

use std::io;
use std::path::PathBuf;
use std::process::Stdio;

use raptor_job_queue::{async_trait, TruncationCriteria};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::JobError;

/// Result of one engine invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineRun {
    /// Probability estimate under the truncation criteria used.
    pub probability: f64,
    /// Number of products retained.
    pub products: u64,
    /// Untruncated reference probability, when the engine computes one.
    #[serde(default)]
    pub exact_probability: Option<f64>,
    #[serde(default)]
    pub analysis_seconds: Option<f64>,
    /// Result document stored as the job's output.
    #[serde(default)]
    pub output: Value,
}

/// Something that can quantify a model.
#[async_trait]
pub trait QuantEngine: Send + Sync {
    /// Quantify `request`. `criteria` overrides the engine's truncation
    /// settings; `None` leaves them to the request or the engine defaults.
    async fn quantify(
        &self,
        request: &Value,
        criteria: Option<TruncationCriteria>,
    ) -> Result<EngineRun, JobError>;
}

/// Runs an engine binary per job: request JSON on stdin, [`EngineRun`] JSON
/// on stdout.
#[derive(Debug, Clone)]
pub struct ProcessEngine {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessEngine {
    pub fn new<P: Into<PathBuf>>(program: P, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn command(&self, criteria: Option<TruncationCriteria>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(criteria) = criteria {
            command
                .arg("--limit-order")
                .arg(criteria.limit_order.to_string())
                .arg("--cut-off")
                .arg(criteria.cut_off.to_string());
        }
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl QuantEngine for ProcessEngine {
    async fn quantify(
        &self,
        request: &Value,
        criteria: Option<TruncationCriteria>,
    ) -> Result<EngineRun, JobError> {
        let input = serde_json::to_vec(request)
            .map_err(|e| JobError::InvalidPayload(e.to_string()))?;

        debug!(program = %self.program.display(), ?criteria, "starting engine");
        let mut child = self.command(criteria).spawn()?;
        let stdin = child.stdin.take();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&input).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), io::Error>(())
        };

        // stdout and stderr are drained while stdin is still being written.
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        let output = output?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(JobError::Engine(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status,
                stderr.trim()
            )));
        }
        match fed {
            // The engine may finish without reading all of its input.
            Err(e) if e.kind() != io::ErrorKind::BrokenPipe => return Err(e.into()),
            _ => {}
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| JobError::InvalidEngineOutput(e.to_string()))
    }
}
