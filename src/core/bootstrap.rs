//! `leadpulse launch`: prepare the project directory, then run the server in
//! the foreground.
//!
//! Steps run strictly in order and each waits for the previous one. Nothing
//! mutates this process's own environment or working directory; children get
//! the project directory as their working directory and an overlay of extra
//! variables on top of the inherited environment.

use crate::config::toml_config::{expand_path, AppConfig, BootstrapConfig};
use crate::core::dotenv::DotenvParser;
use crate::utils::error::{PulseError, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Variables added on top of the inherited environment for every child.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchEnv {
    vars: BTreeMap<String, String>,
}

impl LaunchEnv {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    fn apply(&self, command: &mut Command) {
        command.envs(&self.vars);
    }
}

pub struct Launcher {
    bootstrap: BootstrapConfig,
    business_name: String,
    default_port: u16,
    config_path: Option<PathBuf>,
}

impl Launcher {
    /// `config_path` is handed on to the default `serve` child.
    pub fn new(config: &AppConfig, config_path: Option<&Path>) -> Self {
        // The child runs inside the project directory, so relative paths would break.
        let config_path =
            config_path.map(|p| std::fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()));
        Self {
            bootstrap: config.bootstrap.clone(),
            business_name: config.assistant.business_name.clone(),
            default_port: config.server.port,
            config_path,
        }
    }

    /// Runs every step and returns the server's exit code. The status line
    /// is written to `out` right before the server is spawned.
    pub async fn run<W: Write>(&self, out: &mut W) -> Result<i32> {
        let project_dir = self.project_dir()?;
        tracing::info!("📁 Project directory: {}", project_dir.display());

        self.ensure_environment(&project_dir).await;

        let mut overlay = LaunchEnv::default();
        self.activate_environment(&project_dir, &mut overlay)?;

        self.install_dependencies(&project_dir, &overlay).await?;

        self.load_env_file(&project_dir, &mut overlay)?;

        writeln!(out, "{}", self.status_line(&overlay))?;
        out.flush()?;

        self.launch_server(&project_dir, &overlay).await
    }

    fn project_dir(&self) -> Result<PathBuf> {
        let dir = expand_path(&self.bootstrap.project_dir);
        if !dir.is_dir() {
            return Err(PulseError::bootstrap(
                "project_dir",
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(dir)
    }

    /// Best-effort: any failure here is logged and the launch continues.
    async fn ensure_environment(&self, project_dir: &Path) {
        let env_path = project_dir.join(&self.bootstrap.env_dir);
        if env_path.exists() {
            tracing::debug!("Environment {} already exists", env_path.display());
            return;
        }
        if self.bootstrap.create_env.is_empty() {
            tracing::debug!("No environment create command configured");
            return;
        }

        let mut command = match build_command(&self.bootstrap.create_env, project_dir) {
            Ok(command) => command,
            Err(e) => {
                tracing::warn!("⚠️  Skipping environment creation: {}", e);
                return;
            }
        };

        match command.status().await {
            Ok(status) if status.success() => {
                tracing::info!("✅ Created environment at {}", env_path.display())
            }
            Ok(status) => tracing::warn!(
                "⚠️  `{}` exited with {}; continuing",
                self.bootstrap.create_env.join(" "),
                status
            ),
            Err(e) => tracing::warn!(
                "⚠️  Could not run `{}`: {}; continuing",
                self.bootstrap.create_env.join(" "),
                e
            ),
        }
    }

    fn activate_environment(&self, project_dir: &Path, overlay: &mut LaunchEnv) -> Result<()> {
        let env_path = project_dir.join(&self.bootstrap.env_dir);
        let bin_dir = env_path.join(if cfg!(windows) { "Scripts" } else { "bin" });
        if !bin_dir.is_dir() {
            tracing::debug!("No environment to activate at {}", env_path.display());
            return Ok(());
        }

        let mut paths = vec![bin_dir.clone()];
        if let Some(existing) = std::env::var_os("PATH") {
            paths.extend(std::env::split_paths(&existing));
        }
        let joined = std::env::join_paths(paths)
            .map_err(|e| PulseError::bootstrap("activate", e.to_string()))?;

        overlay.set("PATH", joined.to_string_lossy().into_owned());
        overlay.set("VIRTUAL_ENV", env_path.display().to_string());
        tracing::debug!("Activated environment {}", env_path.display());
        Ok(())
    }

    async fn install_dependencies(&self, project_dir: &Path, overlay: &LaunchEnv) -> Result<()> {
        if self.bootstrap.install.is_empty() {
            tracing::debug!("No install command configured");
            return Ok(());
        }

        let manifest = project_dir.join(&self.bootstrap.manifest);
        if !manifest.is_file() {
            return Err(PulseError::bootstrap(
                "manifest",
                format!("{} not found", manifest.display()),
            ));
        }

        tracing::info!("📦 Installing dependencies from {}", self.bootstrap.manifest);
        let mut command = build_command(&self.bootstrap.install, project_dir)?;
        overlay.apply(&mut command);
        // Routine output is noise; errors still reach stderr.
        command.stdout(Stdio::null()).stderr(Stdio::inherit());

        let status = command
            .status()
            .await
            .map_err(|e| PulseError::bootstrap("install", e.to_string()))?;
        if !status.success() {
            return Err(PulseError::ProcessFailed {
                command: self.bootstrap.install.join(" "),
                code: status.code().unwrap_or(-1),
            });
        }
        Ok(())
    }

    fn load_env_file(&self, project_dir: &Path, overlay: &mut LaunchEnv) -> Result<()> {
        let path = project_dir.join(&self.bootstrap.env_file);
        match DotenvParser::load(&path)? {
            Some(vars) => {
                tracing::debug!("Loaded {} variables from {}", vars.len(), path.display());
                for (key, value) in vars {
                    overlay.set(key, value);
                }
            }
            None => tracing::warn!("⚠️  {} not found, no variables exported", path.display()),
        }
        Ok(())
    }

    pub fn status_line(&self, overlay: &LaunchEnv) -> String {
        let port = overlay
            .get("PORT")
            .map(str::to_string)
            .or_else(|| std::env::var("PORT").ok())
            .and_then(|p| p.trim().parse::<u16>().ok())
            .unwrap_or(self.default_port);
        format!(
            "🚀 {} AI Server starting at http://localhost:{}",
            self.business_name, port
        )
    }

    fn server_command(&self) -> Result<Vec<String>> {
        if !self.bootstrap.server.is_empty() {
            return Ok(self.bootstrap.server.clone());
        }
        let exe = std::env::current_exe()
            .map_err(|e| PulseError::bootstrap("server", e.to_string()))?;
        let mut argv = vec![exe.display().to_string()];
        if let Some(config) = &self.config_path {
            argv.push("--config".to_string());
            argv.push(config.display().to_string());
        }
        argv.push("serve".to_string());
        Ok(argv)
    }

    async fn launch_server(&self, project_dir: &Path, overlay: &LaunchEnv) -> Result<i32> {
        let argv = self.server_command()?;
        let mut command = build_command(&argv, project_dir)?;
        overlay.apply(&mut command);
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        let mut child = command
            .spawn()
            .map_err(|e| PulseError::bootstrap("server", format!("{}: {}", argv[0], e)))?;
        tracing::debug!("Server started: {}", argv.join(" "));

        // Ctrl-C reaches the child too; stay alive until it has shut down.
        let status = tokio::select! {
            status = child.wait() => status?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, waiting for the server to stop");
                child.wait().await?
            }
        };

        let code = status.code().unwrap_or(1);
        if code != 0 {
            tracing::warn!("Server exited with status {}", status);
        }
        Ok(code)
    }
}

fn build_command(argv: &[String], dir: &Path) -> Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| PulseError::config("command cannot be empty"))?;
    let mut command = Command::new(program);
    command.args(args).current_dir(dir);
    Ok(command)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launcher(port: u16) -> Launcher {
        let mut config = AppConfig::default();
        config.server.port = port;
        config.assistant.business_name = "Acme".to_string();
        Launcher::new(&config, None)
    }

    #[test]
    fn test_status_line_prefers_env_file_port() {
        let mut overlay = LaunchEnv::default();
        overlay.set("PORT", "6060");
        assert_eq!(
            launcher(5050).status_line(&overlay),
            "🚀 Acme AI Server starting at http://localhost:6060"
        );
    }

    #[test]
    fn test_default_server_command_runs_serve_with_config() {
        let config = AppConfig::default();
        let launcher = Launcher::new(&config, Some(Path::new("/etc/leadpulse.toml")));
        let argv = launcher.server_command().unwrap();
        assert_eq!(argv.last().map(String::as_str), Some("serve"));
        assert!(argv.contains(&"--config".to_string()));
    }

    #[test]
    fn test_empty_command_is_rejected() {
        assert!(build_command(&[], Path::new(".")).is_err());
    }
}
