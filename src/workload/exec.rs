//! # Pod Exec
//!
//! Runs commands in the workload container through the Kubernetes exec
//! subresource and captures their output and exit code.

use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams};
use kube::Client;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::debug;

use super::{ExecOutput, WorkloadError};

/// Exec target: one container of one pod
#[derive(Clone)]
pub struct PodExec {
    pods: Api<Pod>,
    pod_name: String,
    container: String,
}

impl std::fmt::Debug for PodExec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PodExec")
            .field("pod_name", &self.pod_name)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl PodExec {
    #[must_use]
    pub fn new(client: Client, namespace: &str, pod_name: &str, container: &str) -> Self {
        Self {
            pods: Api::namespaced(client, namespace),
            pod_name: pod_name.to_string(),
            container: container.to_string(),
        }
    }

    /// Run `command` to completion, feeding `stdin` when given
    ///
    /// A non-zero exit code is not an error; callers inspect [`ExecOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns an error if the exec session cannot be established or its streams fail.
    pub async fn run(
        &self,
        command: Vec<String>,
        stdin: Option<&str>,
    ) -> Result<ExecOutput, WorkloadError> {
        debug!(pod = %self.pod_name, container = %self.container, command = ?command.first(), "exec");
        let params = AttachParams::default()
            .container(self.container.as_str())
            .stdin(stdin.is_some())
            .stdout(true)
            .stderr(true);

        let mut attached = self.pods.exec(&self.pod_name, command, &params).await?;

        if let Some(input) = stdin {
            if let Some(mut writer) = attached.stdin() {
                writer
                    .write_all(input.as_bytes())
                    .await
                    .map_err(|e| WorkloadError::Exec(format!("failed to write stdin: {e}")))?;
                writer
                    .shutdown()
                    .await
                    .map_err(|e| WorkloadError::Exec(format!("failed to close stdin: {e}")))?;
            }
        }

        let stdout_reader = attached.stdout();
        let stderr_reader = attached.stderr();
        let status_future = attached.take_status();

        let read_stdout = async move {
            let mut out = String::new();
            if let Some(mut reader) = stdout_reader {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, std::io::Error>(out)
        };
        let read_stderr = async move {
            let mut out = String::new();
            if let Some(mut reader) = stderr_reader {
                reader.read_to_string(&mut out).await?;
            }
            Ok::<_, std::io::Error>(out)
        };
        let (stdout, stderr) = tokio::try_join!(read_stdout, read_stderr)
            .map_err(|e| WorkloadError::Exec(format!("failed to read output: {e}")))?;

        let status = match status_future {
            Some(future) => future.await,
            None => None,
        };
        attached
            .join()
            .await
            .map_err(|e| WorkloadError::Exec(e.to_string()))?;

        Ok(ExecOutput {
            exit_code: exit_code(status.as_ref()),
            stdout,
            stderr,
        })
    }
}

/// Exit code carried by the exec status frame
///
/// Success has no cause; failures carry an `ExitCode` cause with the code as message.
fn exit_code(status: Option<&Status>) -> i32 {
    let Some(status) = status else {
        return -1;
    };
    if status.status.as_deref() == Some("Success") {
        return 0;
    }
    status
        .details
        .as_ref()
        .and_then(|d| d.causes.as_ref())
        .and_then(|causes| {
            causes
                .iter()
                .find(|c| c.reason.as_deref() == Some("ExitCode"))
                .and_then(|c| c.message.as_deref())
                .and_then(|m| m.parse().ok())
        })
        .unwrap_or(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::{StatusCause, StatusDetails};

    #[test]
    fn test_exit_code_success() {
        let status = Status {
            status: Some("Success".to_string()),
            ..Default::default()
        };
        assert_eq!(exit_code(Some(&status)), 0);
    }

    #[test]
    fn test_exit_code_from_cause() {
        let status = Status {
            status: Some("Failure".to_string()),
            details: Some(StatusDetails {
                causes: Some(vec![StatusCause {
                    reason: Some("ExitCode".to_string()),
                    message: Some("3".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(exit_code(Some(&status)), 3);
    }

    #[test]
    fn test_exit_code_missing_status() {
        assert_eq!(exit_code(None), -1);
    }
}
