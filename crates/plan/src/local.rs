//! Single-machine apply engine
//!
//! Writes plan files, then runs one-time and periodic instructions as child
//! processes. Image-only instructions are delegated to an installer runner
//! command (a container CLI by default) with the image reference appended.

use crate::engine::{ApplyEngine, ApplyOptions};
use crate::error::ApplyError;
use crate::types::{File, OneTimeInstruction, Plan};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default argv prefix used to run image-only instructions.
pub const DEFAULT_INSTALLER_RUNNER: &[&str] = &[
    "docker",
    "run",
    "--rm",
    "--privileged",
    "--net=host",
    "--pid=host",
    "-v",
    "/:/host",
];

/// Applies plans by writing files and spawning processes on this host.
#[derive(Debug, Clone)]
pub struct LocalApplyEngine {
    installer_runner: Vec<String>,
}

impl Default for LocalApplyEngine {
    fn default() -> Self {
        Self::new(DEFAULT_INSTALLER_RUNNER.iter().map(|s| (*s).to_string()).collect())
    }
}

impl LocalApplyEngine {
    /// Creates an engine that runs image-only instructions with `installer_runner`.
    pub fn new(installer_runner: Vec<String>) -> Self {
        Self { installer_runner }
    }

    async fn write_file(&self, file: &File, reconcile: bool) -> Result<(), ApplyError> {
        let data = file.decode().map_err(|source| ApplyError::Content {
            path: file.path.clone(),
            source,
        })?;
        let path = PathBuf::from(&file.path);

        if reconcile {
            if let Ok(existing) = tokio::fs::read(&path).await {
                if existing == data {
                    debug!("File {} already up to date", file.path);
                    return Ok(());
                }
            }
        }

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| io_error(parent, source))?;
        }

        info!("Writing file {}", file.path);
        let mut out = tokio::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)
            .await
            .map_err(|source| io_error(&path, source))?;
        out.write_all(&data)
            .await
            .map_err(|source| io_error(&path, source))?;
        out.flush().await.map_err(|source| io_error(&path, source))
    }

    fn argv_for(&self, inst: &OneTimeInstruction) -> Result<Vec<String>, ApplyError> {
        if !inst.command.is_empty() {
            let mut argv = vec![inst.command.clone()];
            argv.extend(inst.args.iter().cloned());
            return Ok(argv);
        }
        if inst.image.is_empty() || self.installer_runner.is_empty() {
            return Err(ApplyError::EmptyInstruction(inst.name.clone()));
        }

        let mut argv = self.installer_runner.clone();
        for kv in &inst.env {
            argv.push("-e".to_string());
            argv.push(kv.clone());
        }
        argv.push(inst.image.clone());
        argv.extend(inst.args.iter().cloned());
        Ok(argv)
    }

    async fn run_once(
        &self,
        inst: &OneTimeInstruction,
        work_dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<Output, ApplyError> {
        let argv = self.argv_for(inst)?;
        let mut cmd = Command::new(&argv[0]);
        cmd.args(&argv[1..])
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for kv in &inst.env {
            if let Some((key, value)) = kv.split_once('=') {
                cmd.env(key, value);
            }
        }

        debug!("Running instruction {}: {:?}", inst.name, argv);
        let child = cmd.spawn().map_err(|source| ApplyError::Spawn {
            name: inst.name.clone(),
            source,
        })?;

        tokio::select! {
            output = child.wait_with_output() => output.map_err(|source| ApplyError::Spawn {
                name: inst.name.clone(),
                source,
            }),
            () = cancel.cancelled() => Err(ApplyError::Cancelled),
        }
    }

    async fn run_with_attempts(
        &self,
        inst: &OneTimeInstruction,
        options: &ApplyOptions,
        attempts: u32,
        cancel: &CancellationToken,
    ) -> Result<String, ApplyError> {
        let attempts = attempts.max(1);
        let mut last_status = String::new();
        let mut last_stderr = String::new();

        for attempt in 1..=attempts {
            let output = self.run_once(inst, &options.work_dir, cancel).await?;
            if output.status.success() {
                info!("Instruction {} succeeded (attempt {}/{})", inst.name, attempt, attempts);
                return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
            }

            last_status = output.status.to_string();
            last_stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            warn!(
                "Instruction {} failed (attempt {}/{}): {}: {}",
                inst.name, attempt, attempts, last_status, last_stderr
            );
        }

        Err(ApplyError::Instruction {
            name: inst.name.clone(),
            attempts,
            status: last_status,
            stderr: last_stderr,
        })
    }
}

#[async_trait::async_trait]
impl ApplyEngine for LocalApplyEngine {
    async fn apply(
        &self,
        plan: &Plan,
        options: &ApplyOptions,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>, ApplyError> {
        tokio::fs::create_dir_all(&options.work_dir)
            .await
            .map_err(|source| io_error(&options.work_dir, source))?;

        for file in &plan.files {
            self.write_file(file, options.reconcile_files).await?;
        }

        let mut outputs = BTreeMap::new();
        if options.run_one_time_instructions {
            for inst in &plan.one_time_instructions {
                let stdout = self
                    .run_with_attempts(inst, options, options.one_time_instruction_attempts, cancel)
                    .await?;
                if inst.save_output {
                    outputs.insert(inst.name.clone(), stdout);
                }
            }
        }

        for periodic in &plan.periodic_instructions {
            let stdout = self
                .run_with_attempts(&periodic.instruction, options, 1, cancel)
                .await?;
            if periodic.instruction.save_output {
                outputs.insert(periodic.instruction.name.clone(), stdout);
            }
        }

        Ok(serde_json::to_vec_pretty(&outputs)?)
    }
}

fn io_error(path: &Path, source: std::io::Error) -> ApplyError {
    ApplyError::Io {
        path: path.to_path_buf(),
        source,
    }
}
