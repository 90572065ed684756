// Singularity Runner - the container execution adapter
// resolve -> translate -> prepare workspace -> invoke

use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::application::resolver::ImageResolver;
use crate::application::session::Session;
use crate::application::translator::CommandTranslator;
use crate::application::workspace::WorkspaceManager;
use crate::config::RunnerConfig;
use crate::domain::{ExecutionRequest, ExecutionResult, ExecutionState};
use crate::error::{ContainerFailure, Result, RunnerError};
use crate::port::{
    IdProvider, ProcessInvoker, SystemTimeProvider, TimeProvider, UuidProvider,
};
use crate::shell::shell_join;

/// Runs execution requests inside Singularity/Apptainer containers
///
/// Holds only immutable configuration and stateless collaborators, so one
/// runner can serve concurrent executions as long as each uses its own
/// workspace.
#[derive(Clone)]
pub struct SingularityRunner {
    config: Arc<RunnerConfig>,
    invoker: Arc<dyn ProcessInvoker>,
    id_provider: Arc<dyn IdProvider>,
    time_provider: Arc<dyn TimeProvider>,
}

impl SingularityRunner {
    /// Create a runner with production ID and time providers
    ///
    /// # Errors
    /// - UnsupportedPlatform on Windows
    pub fn new(config: RunnerConfig, invoker: Arc<dyn ProcessInvoker>) -> Result<Self> {
        Self::with_providers(
            config,
            invoker,
            Arc::new(UuidProvider),
            Arc::new(SystemTimeProvider),
        )
    }

    /// Create a runner with explicit providers (deterministic tests)
    pub fn with_providers(
        config: RunnerConfig,
        invoker: Arc<dyn ProcessInvoker>,
        id_provider: Arc<dyn IdProvider>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        if cfg!(windows) {
            return Err(RunnerError::UnsupportedPlatform("Windows"));
        }

        Ok(Self {
            config: Arc::new(config),
            invoker,
            id_provider,
            time_provider,
        })
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Local image file for a tag
    pub fn resolve(&self, tag: &str) -> Result<&Path> {
        ImageResolver::new(self.config.images()).resolve(tag)
    }

    /// Start a staging session for one execution
    ///
    /// The image is resolved first, so an unknown tag fails before any path
    /// is allocated.
    pub fn session(&self, name: &str, image: &str) -> Result<Session> {
        self.resolve(image)?;
        let workspace = self.workspaces().allocate(name);
        Ok(Session::new(name, image, workspace))
    }

    /// Translate a request without running it (dry run)
    ///
    /// When the request has no workspace of its own the returned command line
    /// refers to a freshly allocated (not created) workspace path.
    pub fn command_line(&self, request: &ExecutionRequest) -> Result<Vec<String>> {
        request.validate()?;
        let image = self.resolve(&request.image)?;
        let workspace = self.workspaces().locate(request)?;
        CommandTranslator::new(&self.config).build(request, image, &workspace)
    }

    /// Execute a request and wait for the container to exit
    ///
    /// # Errors
    /// - UnknownImage, InvalidRequest, InvalidMount, UnmountedPath before
    ///   anything touches the filesystem
    /// - Workspace if directories cannot be prepared
    /// - Launch if the runtime binary cannot be started
    /// - ContainerExecution if the container exits unsuccessfully
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult> {
        let image = match request.validate().and_then(|_| self.resolve(&request.image)) {
            Ok(image) => image,
            Err(e) => {
                warn!(
                    name = %request.name,
                    tag = %request.image,
                    kind = %e.kind(),
                    error = %e,
                    "Container execution rejected"
                );
                return Err(e);
            }
        };
        let mut state = ExecutionState::Resolved;
        debug!(
            name = %request.name,
            tag = %request.image,
            image = %image.display(),
            "Image resolved"
        );

        let workspaces = self.workspaces();
        let result: Result<ExecutionResult> = async {
            let workspace = workspaces.locate(request)?;
            let argv = CommandTranslator::new(&self.config).build(request, image, &workspace)?;
            advance(&mut state, ExecutionState::Translated);

            debug!(argv = %shell_join(&argv), "Running singularity");
            debug!(command = %shell_join(&request.command()), "Running command");

            workspaces.prepare(request, &workspace)?;

            let started = self.time_provider.now_millis();
            advance(&mut state, ExecutionState::Invoked);
            let output = self.invoker.run(&argv, &workspace).await?;
            let duration_ms = self.time_provider.now_millis() - started;

            if !output.success() {
                return Err(RunnerError::ContainerExecution(Box::new(ContainerFailure {
                    exit_code: output.exit_code,
                    signal: output.signal,
                    argv,
                    command: request.command(),
                    stdout: output.stdout,
                    stderr: output.stderr,
                })));
            }

            let output_files = workspaces.resolve_outputs(&workspace, &request.outputs);
            Ok(ExecutionResult {
                exit_code: output.exit_code.unwrap_or_default(),
                stdout: output.stdout,
                stderr: output.stderr,
                argv,
                workspace,
                output_files,
                duration_ms,
            })
        }
        .await;

        match &result {
            Ok(done) => {
                advance(&mut state, ExecutionState::Completed);
                info!(
                    name = %request.name,
                    workspace = %done.workspace.display(),
                    duration_ms = done.duration_ms,
                    "Container execution completed"
                );
            }
            Err(e) => {
                let from = state;
                advance(&mut state, ExecutionState::Failed);
                warn!(
                    name = %request.name,
                    failed_after = %from,
                    kind = %e.kind(),
                    error = %e,
                    "Container execution failed"
                );
            }
        }
        result
    }

    fn workspaces(&self) -> WorkspaceManager<'_> {
        WorkspaceManager::new(self.config.workspace_root(), self.id_provider.as_ref())
    }
}

fn advance(state: &mut ExecutionState, next: ExecutionState) {
    debug_assert!(
        state.can_transition_to(next),
        "invalid execution transition {} -> {}",
        state,
        next
    );
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ImageMap, Mount, OutputFile};
    use crate::error::ErrorKind;
    use crate::port::process_invoker::mocks::RecordingInvoker;
    use crate::port::{MockProcessInvoker, ProcessOutput, SequentialIdProvider, SteppingTimeProvider};
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tracing_subscriber::fmt::MakeWriter;

    fn config(root: &Path) -> RunnerConfig {
        RunnerConfig::builder(ImageMap::new().with_image("alpine:3.18", "/images/alpine.sif"))
            .executable("singularity")
            .workspace_root(root)
            .build()
            .unwrap()
    }

    fn runner(root: &TempDir, invoker: Arc<dyn ProcessInvoker>) -> SingularityRunner {
        SingularityRunner::with_providers(
            config(root.path()),
            invoker,
            Arc::new(SequentialIdProvider::new()),
            Arc::new(SteppingTimeProvider::new(1_000, 250)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_execute_success() {
        let root = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new_success("hello\n");
        let runner = runner(&root, Arc::new(invoker.clone()));
        let request = ExecutionRequest::new("alpine:3.18", "echo")
            .with_name("greet")
            .with_args(["hello"]);

        let result = runner.execute(&request).await.unwrap();

        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "");
        assert_eq!(
            result.argv,
            vec!["singularity", "exec", "/images/alpine.sif", "echo", "hello"]
        );
        assert_eq!(result.workspace, root.path().join("greet_0"));
        assert!(result.workspace.is_dir());
        assert_eq!(result.duration_ms, 250);

        let calls = invoker.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].argv, result.argv);
        assert_eq!(calls[0].cwd, result.workspace);
    }

    #[tokio::test]
    async fn test_unknown_image_never_invokes() {
        let root = tempfile::tempdir().unwrap();
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_run().times(0);
        let runner = runner(&root, Arc::new(invoker));
        let request = ExecutionRequest::new("ubuntu:22.04", "true");

        let err = runner.execute(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnknownImage);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    /// Shared in-memory sink for captured log output
    #[derive(Clone, Default)]
    struct LogBuffer(Arc<Mutex<Vec<u8>>>);

    impl LogBuffer {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for LogBuffer {
        type Writer = LogBuffer;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    #[tokio::test]
    async fn test_rejected_requests_are_logged() {
        let root = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new_success("");
        let runner = runner(&root, Arc::new(invoker.clone()));
        let logs = LogBuffer::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(logs.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::WARN)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let unknown = runner.execute(&ExecutionRequest::new("ubuntu:22.04", "true")).await;
        let invalid = runner.execute(&ExecutionRequest::new("alpine:3.18", " ")).await;

        assert_eq!(unknown.unwrap_err().kind(), ErrorKind::UnknownImage);
        assert_eq!(invalid.unwrap_err().kind(), ErrorKind::InvalidRequest);
        assert_eq!(invoker.call_count(), 0);

        let logged = logs.contents();
        assert_eq!(logged.matches("Container execution rejected").count(), 2, "{}", logged);
        assert!(logged.contains("kind=unknown_image"), "{}", logged);
        assert!(logged.contains("kind=invalid_request"), "{}", logged);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_container_execution_error() {
        let root = tempfile::tempdir().unwrap();
        let invoker = RecordingInvoker::new_exit(3, "boom\n");
        let runner = runner(&root, Arc::new(invoker.clone()));
        let request = ExecutionRequest::new("alpine:3.18", "false");

        let err = runner.execute(&request).await.unwrap_err();

        let failure = err.container_failure().expect("container failure");
        assert_eq!(failure.exit_code, Some(3));
        assert_eq!(failure.argv, invoker.calls()[0].argv);
        assert_eq!(failure.command, vec!["false"]);
        assert_eq!(failure.stderr, "boom\n");
    }

    #[tokio::test]
    async fn test_signal_termination_is_failure() {
        let root = tempfile::tempdir().unwrap();
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_run().times(1).returning(|_, _| {
            Ok(ProcessOutput {
                exit_code: None,
                signal: Some(9),
                ..Default::default()
            })
        });
        let runner = runner(&root, Arc::new(invoker));

        let err = runner
            .execute(&ExecutionRequest::new("alpine:3.18", "sleep").with_args(["60"]))
            .await
            .unwrap_err();

        let failure = err.container_failure().expect("container failure");
        assert_eq!(failure.exit_code, None);
        assert_eq!(failure.signal, Some(9));
    }

    #[tokio::test]
    async fn test_launch_failure_surfaces() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(&root, Arc::new(RecordingInvoker::new_launch_failure()));

        let err = runner
            .execute(&ExecutionRequest::new("alpine:3.18", "true"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Launch);
    }

    #[tokio::test]
    async fn test_translation_errors_stop_before_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mut invoker = MockProcessInvoker::new();
        invoker.expect_run().times(0);
        let runner = runner(&root, Arc::new(invoker));
        let request = ExecutionRequest::new("alpine:3.18", "cat").with_args(["/etc/shadow"]);

        let err = runner.execute(&request).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::UnmountedPath);
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_outputs_resolved_on_success() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(&root, Arc::new(RecordingInvoker::new_success("")));
        let workspace = root.path().join("caller");
        let request = ExecutionRequest::new("alpine:3.18", "touch")
            .with_workspace(&workspace)
            .with_output(OutputFile::new("out.txt", true));

        let result = runner.execute(&request).await.unwrap();

        assert_eq!(result.workspace, workspace);
        assert_eq!(result.output_files, vec![workspace.join("out.txt")]);
    }

    #[tokio::test]
    async fn test_session_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let input = root.path().join("T1w.nii.gz");
        std::fs::write(&input, b"nifti").unwrap();
        let invoker = RecordingInvoker::new_success("");
        let runner = runner(&root, Arc::new(invoker.clone()));

        let mut session = runner.session("bet brain", "alpine:3.18").unwrap();
        let staged = session.input_file(&input).unwrap();
        let out = session.output_file("brain.nii.gz", true);
        let request = session.request("bet", [staged.as_str(), "brain.nii.gz"]);

        let result = runner.execute(&request).await.unwrap();

        let workspace = root.path().join("bet_brain_0");
        assert_eq!(result.workspace, workspace);
        assert_eq!(result.output_files, vec![out]);
        let mut expected_binds = vec![
            format!("{}:/styx_input/0/T1w.nii.gz:ro", input.display()),
            format!("{}:/styx_output", workspace.display()),
        ];
        expected_binds.sort();
        assert_eq!(
            invoker.calls()[0].argv,
            vec![
                "singularity".to_string(),
                "exec".to_string(),
                "--bind".to_string(),
                expected_binds.join(","),
                "--pwd".to_string(),
                "/styx_output".to_string(),
                "/images/alpine.sif".to_string(),
                "bet".to_string(),
                "/styx_input/0/T1w.nii.gz".to_string(),
                "brain.nii.gz".to_string(),
            ]
        );
    }

    #[test]
    fn test_session_unknown_image() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(&root, Arc::new(RecordingInvoker::new_success("")));

        let err = runner.session("x", "nope:1").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnknownImage);
    }

    #[test]
    fn test_command_line_is_deterministic() {
        let root = tempfile::tempdir().unwrap();
        let runner = runner(&root, Arc::new(RecordingInvoker::new_success("")));
        let request = ExecutionRequest::new("alpine:3.18", "cat")
            .with_workspace("/work/run")
            .with_mount(Mount::read_only("/data/b", "/b"))
            .with_mount(Mount::read_only("/data/a", "/a"))
            .with_args(["/a/x", "/b/y"]);

        let first = runner.command_line(&request).unwrap();
        let second = runner.command_line(&request).unwrap();

        assert_eq!(first, second);
        assert_eq!(first[3], "/data/a:/a:ro,/data/b:/b:ro");
        assert!(!PathBuf::from("/work/run").exists());
    }
}
