//! # Sidecar Workload
//!
//! [`Workload`] for a workload container running next to the operator in
//! the same pod: Pebble over HTTP for the plan, pod exec for commands and files.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tracing::warn;

use super::{
    CheckStatus, ExecOutput, Layer, PebbleClient, PodExec, ServiceStatus, Workload, WorkloadError,
};

/// Exports the assignments read from stdin, then replaces itself with the command
const SERVICE_CONTEXT_SCRIPT: &str = r#"set -a; . /dev/stdin; set +a; exec "$@""#;

fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

fn is_variable_name(key: &str) -> bool {
    !key.is_empty()
        && !key.starts_with(|c: char| c.is_ascii_digit())
        && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Argv and stdin that run `command` with `environment`
///
/// Values travel over stdin so they never appear in the process list.
fn service_context(
    command: &[String],
    environment: &BTreeMap<String, Option<String>>,
) -> (Vec<String>, String) {
    let mut argv = vec![
        "sh".to_string(),
        "-c".to_string(),
        SERVICE_CONTEXT_SCRIPT.to_string(),
        "sh".to_string(),
    ];
    argv.extend(command.iter().cloned());
    let assignments = environment
        .iter()
        .filter(|(key, _)| is_variable_name(key))
        .filter_map(|(key, value)| value.as_ref().map(|v| format!("{key}={}\n", shell_quote(v))))
        .collect();
    (argv, assignments)
}

#[derive(Debug, Clone)]
pub struct SidecarWorkload {
    pebble: PebbleClient,
    exec: PodExec,
}

impl SidecarWorkload {
    #[must_use]
    pub fn new(pebble: PebbleClient, exec: PodExec) -> Self {
        Self { pebble, exec }
    }

    /// Run `command` with the environment the service runs with
    async fn exec_in_service(
        &self,
        command: &[String],
        service: &str,
    ) -> Result<ExecOutput, WorkloadError> {
        let plan = self.pebble.plan().await?;
        let Some(definition) = plan.services.get(service) else {
            return Err(WorkloadError::Exec(format!(
                "service '{service}' is not in the plan"
            )));
        };
        let (argv, assignments) = service_context(command, &definition.environment);
        self.exec.run(argv, Some(assignments.as_str())).await
    }
}

#[async_trait]
impl Workload for SidecarWorkload {
    async fn can_connect(&self) -> bool {
        match self.pebble.system_info().await {
            Ok(()) => true,
            Err(e) => {
                warn!("Pebble API at {} not reachable: {}", self.pebble.base_url(), e);
                false
            }
        }
    }

    async fn add_layer(
        &self,
        label: &str,
        layer: &Layer,
        combine: bool,
    ) -> Result<(), WorkloadError> {
        self.pebble.add_layer(label, layer, combine).await
    }

    async fn plan(&self) -> Result<Layer, WorkloadError> {
        self.pebble.plan().await
    }

    async fn service_status(&self, service: &str) -> Result<Option<ServiceStatus>, WorkloadError> {
        self.pebble.service_status(service).await
    }

    async fn restart(&self, service: &str) -> Result<(), WorkloadError> {
        self.pebble.restart(service).await
    }

    async fn check_status(&self, check: &str) -> Result<Option<CheckStatus>, WorkloadError> {
        self.pebble.check_status(check).await
    }

    async fn exec(
        &self,
        command: &[String],
        service_context: Option<&str>,
    ) -> Result<ExecOutput, WorkloadError> {
        match service_context {
            Some(service) => self.exec_in_service(command, service).await,
            None => self.exec.run(command.to_vec(), None).await,
        }
    }

    async fn pull(&self, path: &str) -> Result<Option<String>, WorkloadError> {
        let output = self
            .exec
            .run(vec!["cat".to_string(), path.to_string()], None)
            .await?;
        Ok(output.success().then_some(output.stdout))
    }

    async fn push(&self, path: &str, content: &str) -> Result<(), WorkloadError> {
        let script = r#"mkdir -p "$(dirname "$1")" && cat > "$1""#;
        let output = self
            .exec
            .run(
                vec![
                    "sh".to_string(),
                    "-c".to_string(),
                    script.to_string(),
                    "sh".to_string(),
                    path.to_string(),
                ],
                Some(content),
            )
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(WorkloadError::Exec(format!(
                "failed to write {path}: {}",
                output.stderr.trim()
            )))
        }
    }

    async fn list_files(&self, dir: &str) -> Result<Vec<String>, WorkloadError> {
        let output = self
            .exec
            .run(vec!["ls".to_string(), "-1".to_string(), dir.to_string()], None)
            .await?;
        if !output.success() {
            return Ok(Vec::new());
        }
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    async fn remove(&self, path: &str) -> Result<(), WorkloadError> {
        let output = self
            .exec
            .run(
                vec!["rm".to_string(), "-f".to_string(), path.to_string()],
                None,
            )
            .await?;
        if output.success() {
            Ok(())
        } else {
            Err(WorkloadError::Exec(format!(
                "failed to remove {path}: {}",
                output.stderr.trim()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_context_keeps_values_off_the_command_line() {
        let command = vec!["msm-admin".to_string(), "create-user".to_string()];
        let environment = BTreeMap::from([
            ("MSM_DB_PASSWORD".to_string(), Some("db-secret".to_string())),
            ("MSM_BASE_PATH".to_string(), None),
            ("MSM_S3_SECRET_KEY".to_string(), Some("it's".to_string())),
        ]);

        let (argv, stdin) = service_context(&command, &environment);

        assert_eq!(&argv[..2], ["sh", "-c"]);
        assert_eq!(&argv[3..], ["sh", "msm-admin", "create-user"]);
        assert!(argv.iter().all(|arg| !arg.contains("db-secret")));
        assert_eq!(
            stdin,
            "MSM_DB_PASSWORD='db-secret'\nMSM_S3_SECRET_KEY='it'\\''s'\n"
        );
    }

    #[test]
    fn test_variable_names() {
        assert!(is_variable_name("MSM_DB_HOST"));
        assert!(!is_variable_name("1ABC"));
        assert!(!is_variable_name("A;B"));
        assert!(!is_variable_name(""));
    }
}
