//! Text-generation backends for the advisor.
//!
//! The [`TextGenerator`] trait decouples the advisor from the actual model
//! backend. Tests use scripted generators that return canned replies without
//! spawning processes.

use std::env;
use std::fmt;
use std::process::Command;
use std::time::Duration;

use tracing::{debug, info, instrument, warn};

use crate::io::config::AcademyConfig;
use crate::io::process::run_with_deadline;

/// Environment variable carrying the mission summary to the command.
pub const MISSION_CONTEXT_ENV: &str = "ACADEMY_MISSION_CONTEXT";

/// One question for the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Fully rendered prompt text.
    pub prompt: String,
    /// Short mission summary, e.g. `mitm: Mission 2: The Interception`.
    pub mission_context: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// No backend or no credential configured. Expected, not a fault.
    Offline,
    Failed(String),
}

impl fmt::Display for GenerationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationError::Offline => f.write_str("text generation is offline"),
            GenerationError::Failed(message) => write!(f, "text generation failed: {message}"),
        }
    }
}

impl std::error::Error for GenerationError {}

/// Abstraction over text-generation backends.
pub trait TextGenerator: Send + Sync {
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError>;
}

/// Generator that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineGenerator;

impl TextGenerator for OfflineGenerator {
    fn generate(&self, _request: &GenerationRequest) -> Result<String, GenerationError> {
        Err(GenerationError::Offline)
    }
}

/// Generator that pipes the prompt into a configured command.
///
/// The credential is handed to the child in the environment variable named
/// by `api_key_env`; the reply is whatever the command prints on stdout.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    command: Vec<String>,
    api_key: Option<String>,
    api_key_env: String,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandGenerator {
    pub fn new(
        command: Vec<String>,
        api_key: Option<String>,
        api_key_env: impl Into<String>,
        timeout: Duration,
        output_limit_bytes: usize,
    ) -> Self {
        Self {
            command,
            api_key: api_key.filter(|key| !key.trim().is_empty()),
            api_key_env: api_key_env.into(),
            timeout,
            output_limit_bytes,
        }
    }

    /// Build from config, reading the credential from the process environment.
    pub fn from_config(cfg: &AcademyConfig) -> Self {
        let api_key = env::var(&cfg.advisor.api_key_env).ok();
        Self::new(
            cfg.advisor.command.clone(),
            api_key,
            cfg.advisor.api_key_env.clone(),
            cfg.advisor_timeout(),
            cfg.advisor.output_limit_bytes,
        )
    }

    pub fn is_online(&self) -> bool {
        !self.command.is_empty() && self.api_key.is_some()
    }
}

impl TextGenerator for CommandGenerator {
    #[instrument(skip_all, fields(timeout_secs = self.timeout.as_secs()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
        let (Some((program, args)), Some(api_key)) = (self.command.split_first(), &self.api_key)
        else {
            debug!("advisor backend offline");
            return Err(GenerationError::Offline);
        };

        info!(program = %program, "asking advisor backend");
        let mut cmd = Command::new(program);
        cmd.args(args)
            .env(&self.api_key_env, api_key)
            .env(MISSION_CONTEXT_ENV, &request.mission_context);

        let output = run_with_deadline(
            cmd,
            Some(request.prompt.as_bytes()),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| GenerationError::Failed(format!("{err:#}")))?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "advisor backend timed out");
            return Err(GenerationError::Failed(format!(
                "timed out after {:?}",
                self.timeout
            )));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "advisor backend failed");
            return Err(GenerationError::Failed(format!(
                "exited with status {:?}: {}",
                output.status.code(),
                output.stderr_headline()
            )));
        }
        let reply = output.stdout.text().trim().to_string();
        if reply.is_empty() {
            return Err(GenerationError::Failed("empty reply".to_string()));
        }
        debug!(bytes = reply.len(), "advisor backend replied");
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            prompt: "What is a rail fence?".to_string(),
            mission_context: "rail-fence: Mission 3: The Payload".to_string(),
        }
    }

    fn shell(script: &str, api_key: Option<&str>) -> CommandGenerator {
        CommandGenerator::new(
            vec!["sh".to_string(), "-c".to_string(), script.to_string()],
            api_key.map(str::to_string),
            "ACADEMY_TEST_ADVISOR_KEY",
            Duration::from_secs(5),
            4_096,
        )
    }

    #[test]
    fn offline_generator_always_reports_offline() {
        assert_eq!(
            OfflineGenerator.generate(&request()),
            Err(GenerationError::Offline)
        );
    }

    #[test]
    fn missing_command_is_offline() {
        let generator = CommandGenerator::new(
            Vec::new(),
            Some("key".to_string()),
            "ACADEMY_TEST_ADVISOR_KEY",
            Duration::from_secs(1),
            100,
        );
        assert!(!generator.is_online());
        assert_eq!(generator.generate(&request()), Err(GenerationError::Offline));
    }

    #[test]
    fn missing_or_blank_credential_is_offline() {
        assert_eq!(
            shell("echo hi", None).generate(&request()),
            Err(GenerationError::Offline)
        );
        assert_eq!(
            shell("echo hi", Some("  ")).generate(&request()),
            Err(GenerationError::Offline)
        );
    }

    #[test]
    fn from_config_without_credential_env_is_offline() {
        let mut cfg = AcademyConfig::default();
        cfg.advisor.command = vec!["cat".to_string()];
        cfg.advisor.api_key_env = "ACADEMY_TEST_KEY_THAT_IS_NEVER_SET".to_string();
        let generator = CommandGenerator::from_config(&cfg);
        assert_eq!(generator.generate(&request()), Err(GenerationError::Offline));
    }

    #[cfg(unix)]
    #[test]
    fn command_receives_prompt_credential_and_context() {
        let generator = shell(
            "read q; echo \"$ACADEMY_TEST_ADVISOR_KEY|$ACADEMY_MISSION_CONTEXT|$q\"",
            Some("s3cret"),
        );
        let reply = generator.generate(&request()).expect("reply");
        assert_eq!(
            reply,
            "s3cret|rail-fence: Mission 3: The Payload|What is a rail fence?"
        );
    }

    #[cfg(unix)]
    #[test]
    fn non_zero_exit_is_a_failure() {
        let generator = shell("echo 'quota exceeded' >&2; exit 3", Some("key"));
        match generator.generate(&request()) {
            Err(GenerationError::Failed(message)) => assert!(message.contains("quota exceeded")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[test]
    fn empty_reply_is_a_failure() {
        let generator = shell("cat > /dev/null", Some("key"));
        assert_eq!(
            generator.generate(&request()),
            Err(GenerationError::Failed("empty reply".to_string()))
        );
    }
}
