use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, trace};

use super::{
    ClusterClient, CommandOutput, CommandRunner, Deployment, ExecError, Job, ObjectList, Pod,
};

/// Exit status a shell uses when the program itself is missing
const SHELL_NOT_FOUND: i32 = 127;

/// [`ClusterClient`] and [`CommandRunner`] backed by the `kubectl` binary
#[derive(Debug, Clone)]
pub struct Kubectl {
    binary: String,
    shell: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new("kubectl", "/bin/bash")
    }
}

impl Kubectl {
    pub fn new(binary: impl Into<String>, shell: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            shell: shell.into(),
        }
    }

    async fn exec(&self, program: &str, args: &[String]) -> Result<CommandOutput, ExecError> {
        let rendered = render(program, args);
        debug!("Running {}", rendered);

        let output = Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| ExecError::Spawn {
                command: rendered.clone(),
                message: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        trace!("{} exited with {:?}", rendered, output.status.code());

        if output.status.code() == Some(SHELL_NOT_FOUND) {
            return Err(ExecError::Failed {
                command: rendered,
                stderr: stderr.trim().to_string(),
            });
        }

        if !output.status.success() {
            let stderr = if stderr.trim().is_empty() {
                format!("Exit code {}", output.status.code().unwrap_or(-1))
            } else {
                stderr
            };
            return Err(ExecError::classify(&rendered, &stderr));
        }

        Ok(CommandOutput { stdout, stderr })
    }

    async fn kubectl(&self, args: Vec<String>) -> Result<CommandOutput, ExecError> {
        self.exec(&self.binary, &args).await
    }

    async fn get_json<T: DeserializeOwned>(&self, args: Vec<String>) -> Result<T, ExecError> {
        let command = render(&self.binary, &args);
        let output = self.kubectl(args).await?;
        serde_json::from_str(&output.stdout).map_err(|e| ExecError::Parse {
            command,
            message: e.to_string(),
        })
    }

    /// `Ok(None)` when the object does not exist
    async fn get_optional<T: DeserializeOwned>(
        &self,
        args: Vec<String>,
    ) -> Result<Option<T>, ExecError> {
        match self.get_json(args).await {
            Ok(obj) => Ok(Some(obj)),
            Err(ExecError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

// ============================================================================
// SBIO: Pure argument builders
// ============================================================================

fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// `kubectl apply`; without `wait` the call returns once objects are accepted
pub fn apply_args(reference: &str, wait: bool) -> Vec<String> {
    let mut args = strings(&["apply", "-f", reference]);
    if !wait {
        args.push("--wait=false".to_string());
    }
    args
}

pub fn create_args(reference: &str) -> Vec<String> {
    strings(&["create", "-f", reference])
}

pub fn delete_args(reference: &str, wait: bool) -> Vec<String> {
    let mut args = strings(&["delete", "-f", reference]);
    if !wait {
        args.push("--wait=false".to_string());
    }
    args
}

pub fn delete_namespace_args(namespace: &str) -> Vec<String> {
    strings(&["delete", "namespace", namespace, "--wait=false"])
}

pub fn patch_config_map_args(namespace: &str, name: &str, patch: &serde_json::Value) -> Vec<String> {
    strings(&[
        "patch",
        "configmap",
        name,
        "-n",
        namespace,
        "--type",
        "merge",
        "-p",
        &patch.to_string(),
    ])
}

pub fn get_args(kind: &str, namespace: &str, name: Option<&str>, label: Option<&str>) -> Vec<String> {
    let mut args = strings(&["get", kind]);
    if let Some(name) = name {
        args.push(name.to_string());
    }
    args.extend(strings(&["-n", namespace]));
    if let Some(label) = label {
        args.extend(strings(&["-l", label]));
    }
    args.extend(strings(&["-o", "json"]));
    args
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionInfo {
    git_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VersionReport {
    server_version: Option<VersionInfo>,
}

/// Extract `serverVersion.gitVersion` from `kubectl version -o json`
pub fn parse_server_version(json: &str) -> Result<String, String> {
    let report: VersionReport = serde_json::from_str(json).map_err(|e| e.to_string())?;
    report
        .server_version
        .map(|v| v.git_version)
        .ok_or_else(|| "no serverVersion in output".to_string())
}

// ============================================================================
// Trait implementations
// ============================================================================

#[async_trait]
impl ClusterClient for Kubectl {
    async fn server_version(&self) -> Result<String, ExecError> {
        let args = strings(&["version", "-o", "json"]);
        let command = render(&self.binary, &args);
        let output = self.kubectl(args).await?;
        parse_server_version(&output.stdout).map_err(|message| ExecError::Parse { command, message })
    }

    async fn current_context(&self) -> Result<String, ExecError> {
        let output = self
            .kubectl(strings(&["config", "current-context"]))
            .await?;
        Ok(output.stdout.trim().to_string())
    }

    async fn list_deployments(&self, namespace: &str) -> Result<Vec<Deployment>, ExecError> {
        let list: ObjectList<Deployment> = self
            .get_json(get_args("deployments", namespace, None, None))
            .await?;
        Ok(list.items)
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, ExecError> {
        self.get_optional(get_args("deployment", namespace, Some(name), None))
            .await
    }

    async fn list_pods(&self, namespace: &str, label: &str) -> Result<Vec<Pod>, ExecError> {
        let list: ObjectList<Pod> = self
            .get_json(get_args("pods", namespace, None, Some(label)))
            .await?;
        Ok(list.items)
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, ExecError> {
        match self
            .kubectl(strings(&["get", "namespace", namespace, "-o", "name"]))
            .await
        {
            Ok(_) => Ok(true),
            Err(ExecError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_job(&self, namespace: &str, name: &str) -> Result<Option<Job>, ExecError> {
        self.get_optional(get_args("job", namespace, Some(name), None))
            .await
    }
}

#[async_trait]
impl CommandRunner for Kubectl {
    async fn apply(&self, reference: &str, wait: bool) -> Result<(), ExecError> {
        self.kubectl(apply_args(reference, wait)).await.map(|_| ())
    }

    async fn create(&self, reference: &str) -> Result<(), ExecError> {
        self.kubectl(create_args(reference)).await.map(|_| ())
    }

    async fn delete(&self, reference: &str, wait: bool) -> Result<(), ExecError> {
        self.kubectl(delete_args(reference, wait)).await.map(|_| ())
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), ExecError> {
        self.kubectl(delete_namespace_args(namespace))
            .await
            .map(|_| ())
    }

    async fn patch_config_map(
        &self,
        namespace: &str,
        name: &str,
        patch: &serde_json::Value,
    ) -> Result<(), ExecError> {
        self.kubectl(patch_config_map_args(namespace, name, patch))
            .await
            .map(|_| ())
    }

    async fn run(&self, command: &str) -> Result<CommandOutput, ExecError> {
        self.exec(&self.shell, &strings(&["-c", command])).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_apply_args() {
        assert_eq!(apply_args("keda.yaml", true), vec!["apply", "-f", "keda.yaml"]);
        assert_eq!(
            apply_args("keda.yaml", false),
            vec!["apply", "-f", "keda.yaml", "--wait=false"]
        );
    }

    #[test]
    fn test_create_never_adds_wait() {
        assert_eq!(create_args("bundle.yaml"), vec!["create", "-f", "bundle.yaml"]);
    }

    #[test]
    fn test_delete_args() {
        assert_eq!(
            delete_args("kourier.yaml", false),
            vec!["delete", "-f", "kourier.yaml", "--wait=false"]
        );
        assert_eq!(delete_args("kourier.yaml", true).len(), 3);
    }

    #[test]
    fn test_patch_args() {
        let patch = json!({"data": {"ingress.class": "kourier.ingress.networking.knative.dev"}});
        let args = patch_config_map_args("knative-serving", "config-network", &patch);
        assert_eq!(&args[..4], &["patch", "configmap", "config-network", "-n"]);
        assert_eq!(args[7], "-p");
        assert!(args[8].contains("kourier.ingress.networking.knative.dev"));
    }

    #[test]
    fn test_get_args() {
        assert_eq!(
            get_args("pods", "cert-manager", None, Some("app.kubernetes.io/name=webhook")),
            vec![
                "get",
                "pods",
                "-n",
                "cert-manager",
                "-l",
                "app.kubernetes.io/name=webhook",
                "-o",
                "json"
            ]
        );
        assert_eq!(
            get_args("job", "knative-serving", Some("default-domain"), None),
            vec!["get", "job", "default-domain", "-n", "knative-serving", "-o", "json"]
        );
    }

    #[test]
    fn test_parse_server_version() {
        let json = r#"{
            "clientVersion": {"gitVersion": "v1.22.0"},
            "serverVersion": {"major": "1", "minor": "20", "gitVersion": "v1.20.4+k3s1"}
        }"#;
        assert_eq!(parse_server_version(json).unwrap(), "v1.20.4+k3s1");
        assert!(parse_server_version(r#"{"clientVersion": {"gitVersion": "v1.22.0"}}"#).is_err());
        assert!(parse_server_version("not json").is_err());
    }

    #[test]
    fn test_render() {
        assert_eq!(
            render("kubectl", &apply_args("a.yaml", false)),
            "kubectl apply -f a.yaml --wait=false"
        );
    }

    #[tokio::test]
    async fn test_run_captures_output() {
        let kubectl = Kubectl::new("kubectl", "/bin/sh");
        let output = kubectl.run("echo hello").await.unwrap();
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_classifies_failure() {
        let kubectl = Kubectl::new("kubectl", "/bin/sh");
        let err = kubectl
            .run("echo 'namespaces \"keda\" not found' >&2; exit 1")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_missing_program_in_shell_is_not_not_found() {
        let kubectl = Kubectl::new("kubectl", "/bin/sh");
        let err = kubectl
            .run("ofn-missing-program uninstall -k --all")
            .await
            .unwrap_err();
        assert!(!err.is_not_found());
        assert!(matches!(err, ExecError::Failed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let kubectl = Kubectl::new("/nonexistent/kubectl", "/bin/sh");
        let err = kubectl.apply("x.yaml", false).await.unwrap_err();
        assert!(matches!(err, ExecError::Spawn { .. }));
    }
}
