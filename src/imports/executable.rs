//! Loader for system tools: resolves `bin:<name>` identifiers against `PATH`.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::loader::{Export, Module, ModuleLoader};
use super::{ImportErrorKind, ImportFailure};

/// Identifier prefix handled by [`ExecutableLoader`].
pub const EXECUTABLE_PREFIX: &str = "bin:";

const DEFAULT_VERSION_TIMEOUT: Duration = Duration::from_secs(2);

static VERSION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+\.\d+(?:\.\d+)?").unwrap());

/// An executable found on disk.
pub struct ExecutableModule {
    identifier: String,
    path: PathBuf,
    version: Option<String>,
}

impl ExecutableModule {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Module for ExecutableModule {
    fn name(&self) -> &str {
        &self.identifier
    }

    fn version(&self) -> Option<String> {
        self.version.clone()
    }

    fn attribute(&self, _name: &str) -> Option<Export> {
        None
    }
}

/// Resolves `bin:<name>` to an executable and probes `<name> --version`.
pub struct ExecutableLoader {
    search_path: Option<Vec<PathBuf>>,
    version_timeout: Duration,
}

impl ExecutableLoader {
    /// Search the process `PATH`.
    pub fn new() -> Self {
        Self {
            search_path: None,
            version_timeout: DEFAULT_VERSION_TIMEOUT,
        }
    }

    /// Search only the given directories.
    pub fn with_search_path(dirs: Vec<PathBuf>) -> Self {
        Self {
            search_path: Some(dirs),
            version_timeout: DEFAULT_VERSION_TIMEOUT,
        }
    }

    pub fn with_version_timeout(mut self, timeout: Duration) -> Self {
        self.version_timeout = timeout;
        self
    }

    fn directories(&self) -> Vec<PathBuf> {
        match &self.search_path {
            Some(dirs) => dirs.clone(),
            None => std::env::var_os("PATH")
                .map(|p| std::env::split_paths(&p).collect())
                .unwrap_or_default(),
        }
    }

    fn find(&self, program: &str) -> Option<PathBuf> {
        if program.contains('/') {
            let path = PathBuf::from(program);
            return is_executable(&path).then_some(path);
        }
        self.directories()
            .into_iter()
            .map(|dir| dir.join(program))
            .find(|candidate| is_executable(candidate))
    }

    /// Run `--version` with a deadline and pull the first dotted version out of the output.
    ///
    /// Both pipes are drained on helper threads while waiting, so a tool that
    /// prints more than a pipe buffer still exits before the deadline.
    fn probe_version(&self, path: &Path) -> Option<String> {
        let mut child = Command::new(path)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .ok()?;
        let stdout = child.stdout.take().map(drain);
        let stderr = child.stderr.take().map(drain);

        let deadline = Instant::now() + self.version_timeout;
        loop {
            match child.try_wait() {
                Ok(Some(_)) => break,
                Ok(None) if Instant::now() < deadline => {
                    std::thread::sleep(Duration::from_millis(10));
                }
                _ => {
                    let _ = child.kill();
                    let _ = child.wait();
                    debug!(path = %path.display(), "Version probe timed out");
                    return None;
                }
            }
        }

        let mut output = String::new();
        for reader in [stdout, stderr].into_iter().flatten() {
            if let Ok(bytes) = reader.join() {
                output.push_str(&String::from_utf8_lossy(&bytes));
            }
        }
        parse_version(&output)
    }
}

/// Read a pipe to the end on its own thread.
fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<Vec<u8>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

impl Default for ExecutableLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleLoader for ExecutableLoader {
    fn load(&self, module: &str) -> std::result::Result<Arc<dyn Module>, ImportFailure> {
        let Some(program) = module.strip_prefix(EXECUTABLE_PREFIX) else {
            return Err(ImportFailure::new(
                ImportErrorKind::ModuleNotFound,
                module,
                None,
                "not an executable identifier",
            ));
        };

        let path = self.find(program).ok_or_else(|| {
            ImportFailure::new(
                ImportErrorKind::ModuleNotFound,
                module,
                None,
                format!("'{}' not found on PATH", program),
            )
        })?;

        let version = self.probe_version(&path);
        debug!(module, path = %path.display(), version = ?version, "Resolved executable");
        Ok(Arc::new(ExecutableModule {
            identifier: module.to_string(),
            path,
            version,
        }))
    }
}

/// First `major.minor[.patch]` sequence in `text`.
pub fn parse_version(text: &str) -> Option<String> {
    VERSION_RE.find(text).map(|m| m.as_str().to_string())
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
