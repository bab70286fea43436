// Command Pipeline - spawns the external render command for a claimed job
//
// The queue treats generation as opaque; this adapter is the one place
// that knows the render command's conventions: the flags it takes, the
// stage markers it prints, and the score lines it emits before exiting.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use renderq_core::domain::{JobRecord, OutputRef};
use renderq_core::port::pipeline::{GenerationPipeline, PipelineError, PipelineOutput, ProgressSink};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Hard ceiling on a single generation run
const DEFAULT_RUN_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Stage markers the render command prints on stdout, in pipeline order.
/// Unknown lines pass through silently.
const STAGE_MILESTONES: &[(&str, u8, &str)] = &[
    ("[1/7]", 20, "transcribing lyrics"),
    ("[2/7]", 30, "analyzing audio structure"),
    ("[3/7]", 35, "understanding mood"),
    ("[4/7]", 40, "building visual concept"),
    ("[5/7]", 45, "planning shots"),
    ("[6/7]", 50, "generating visuals"),
    ("[7/7]", 75, "rendering final video"),
    ("PIPELINE COMPLETE", 85, "running quality checks"),
    ("QUALITY_SCORE=", 88, "quality gate check"),
    ("LOOP_SCORE=", 92, "loop validation"),
    ("ENCODING", 95, "encoding for web"),
];

/// GenerationPipeline backed by an external render command.
///
/// Per job: `<program> --audio <path> --out <dir> [--style <style>]`,
/// with the job's numeric params exported as `RENDERQ_*` environment
/// variables. Stdout is streamed line by line; stage markers become
/// milestone progress, `QUALITY_SCORE=`/`LOOP_SCORE=` lines become the
/// scores handed back with the output.
pub struct CommandPipeline {
    program: PathBuf,
    work_dir: PathBuf,
    timeout: Duration,
}

impl CommandPipeline {
    pub fn new(program: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: work_dir.into(),
            timeout: DEFAULT_RUN_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn build_command(&self, job: &JobRecord, output_dir: &Path) -> Result<Command, PipelineError> {
        let input = job.input.as_value();

        let audio_path = input
            .get("audio_path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| PipelineError::InvalidInput("missing audio_path".to_string()))?;

        let mut cmd = Command::new(&self.program);
        cmd.arg("--audio")
            .arg(audio_path)
            .arg("--out")
            .arg(output_dir);

        if let Some(style) = input.get("style").and_then(|v| v.as_str()) {
            cmd.arg("--style").arg(style);
        }

        cmd.env("RENDERQ_MODE", job.mode.as_str());
        if let Some(params) = input.get("params").and_then(|v| v.as_object()) {
            for (key, value) in params {
                if let Some(n) = value.as_f64() {
                    cmd.env(format!("RENDERQ_{}", key.to_uppercase()), n.to_string());
                }
            }
        }

        cmd.stdout(Stdio::piped())
            .stderr(Stdio::null())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        Ok(cmd)
    }
}

/// Parse a `KEY=value` score line, tolerating junk after the number
fn parse_score(line: &str, key: &str) -> Option<f64> {
    line.trim()
        .strip_prefix(key)?
        .split_whitespace()
        .next()?
        .parse()
        .ok()
}

#[async_trait]
impl GenerationPipeline for CommandPipeline {
    async fn generate(
        &self,
        job: &JobRecord,
        progress: &dyn ProgressSink,
    ) -> Result<PipelineOutput, PipelineError> {
        let output_dir = self.work_dir.join(&job.id);
        tokio::fs::create_dir_all(&output_dir)
            .await
            .map_err(|e| PipelineError::Io(e.to_string()))?;

        progress.report(5, "preparing audio").await;
        let mut cmd = self.build_command(job, &output_dir)?;
        progress.report(10, "building visual concept").await;

        progress.report(15, "starting generation pipeline").await;
        let mut child = cmd
            .spawn()
            .map_err(|e| PipelineError::SpawnFailed(e.to_string()))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PipelineError::Io("stdout not captured".to_string()))?;
        let mut lines = BufReader::new(stdout).lines();

        info!(job_id = %job.id, program = %self.program.display(), "Pipeline started");

        let mut quality_score = None;
        let mut loop_score = None;

        let run = async {
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| PipelineError::Io(e.to_string()))?
            {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                debug!(job_id = %job.id, line, "Pipeline output");

                if let Some(score) = parse_score(line, "QUALITY_SCORE=") {
                    quality_score = Some(score);
                }
                if let Some(score) = parse_score(line, "LOOP_SCORE=") {
                    loop_score = Some(score);
                }

                if let Some((_, pct, message)) = STAGE_MILESTONES
                    .iter()
                    .find(|(marker, _, _)| line.contains(marker))
                {
                    progress.report(*pct, message).await;
                }
            }

            child
                .wait()
                .await
                .map_err(|e| PipelineError::Io(e.to_string()))
        };

        let status = match tokio::time::timeout(self.timeout, run).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(job_id = %job.id, timeout_ms = self.timeout.as_millis() as i64, "Pipeline timed out, killing");
                let _ = child.kill().await;
                return Err(PipelineError::Timeout(self.timeout.as_millis() as i64));
            }
        };

        if !status.success() {
            return Err(PipelineError::NonZeroExit(status.code().unwrap_or(-1)));
        }

        info!(
            job_id = %job.id,
            quality_score = ?quality_score,
            loop_score = ?loop_score,
            "Pipeline finished"
        );

        Ok(PipelineOutput {
            output: OutputRef::new(serde_json::json!({
                "output_dir": output_dir.to_string_lossy(),
            })),
            quality_score,
            loop_score,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use renderq_core::domain::InputRef;
    use serde_json::json;
    use std::sync::Mutex;

    struct RecordingSink {
        reports: Mutex<Vec<(u8, String)>>,
    }

    impl RecordingSink {
        fn new() -> Self {
            Self {
                reports: Mutex::new(Vec::new()),
            }
        }

        fn reports(&self) -> Vec<(u8, String)> {
            self.reports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ProgressSink for RecordingSink {
        async fn report(&self, progress: u8, message: &str) {
            self.reports
                .lock()
                .unwrap()
                .push((progress, message.to_string()));
        }
    }

    fn job_with_input(input: serde_json::Value) -> JobRecord {
        JobRecord::new("job-1", 1_000, InputRef::new(input), 10)
    }

    /// Write an executable shell script into dir and return its path
    fn script(dir: &Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("render.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn missing_audio_path_is_rejected_before_spawn() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = CommandPipeline::new("/nonexistent/render", dir.path());
        let sink = RecordingSink::new();

        let err = pipeline
            .generate(&job_with_input(json!({})), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn stage_markers_become_milestones_and_scores_are_captured() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(
            dir.path(),
            concat!(
                "echo '[1/7] whisper pass'\n",
                "echo '[6/7] svd render'\n",
                "echo 'PIPELINE COMPLETE'\n",
                "echo 'QUALITY_SCORE=9.4'\n",
                "echo 'LOOP_SCORE=8.8'\n",
                "echo 'ENCODING h264'",
            ),
        );
        let pipeline = CommandPipeline::new(cmd, dir.path());
        let sink = RecordingSink::new();

        let out = pipeline
            .generate(
                &job_with_input(json!({"audio_path": "track.mp3"})),
                &sink,
            )
            .await
            .unwrap();

        assert_eq!(out.quality_score, Some(9.4));
        assert_eq!(out.loop_score, Some(8.8));
        let dir_str = out.output.as_value()["output_dir"].as_str().unwrap();
        assert!(dir_str.ends_with("job-1"));

        let milestones: Vec<u8> = sink.reports().iter().map(|(p, _)| *p).collect();
        assert_eq!(milestones, vec![5, 10, 15, 20, 50, 85, 88, 92, 95]);
    }

    #[tokio::test]
    async fn nonzero_exit_is_a_pipeline_failure() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "exit 3");
        let pipeline = CommandPipeline::new(cmd, dir.path());

        let err = pipeline
            .generate(
                &job_with_input(json!({"audio_path": "track.mp3"})),
                &RecordingSink::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::NonZeroExit(3)));
    }

    #[tokio::test]
    async fn overrunning_pipeline_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "sleep 30");
        let pipeline =
            CommandPipeline::new(cmd, dir.path()).with_timeout(Duration::from_millis(200));

        let err = pipeline
            .generate(
                &job_with_input(json!({"audio_path": "track.mp3"})),
                &RecordingSink::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Timeout(200)));
    }

    #[tokio::test]
    async fn numeric_params_are_exported_to_the_command_environment() {
        let dir = tempfile::tempdir().unwrap();
        let cmd = script(dir.path(), "echo \"QUALITY_SCORE=$RENDERQ_GRAIN\"");
        let pipeline = CommandPipeline::new(cmd, dir.path());

        let out = pipeline
            .generate(
                &job_with_input(json!({
                    "audio_path": "track.mp3",
                    "params": {"grain": 0.18, "label": "ignored"},
                })),
                &RecordingSink::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.quality_score, Some(0.18));
    }
}
