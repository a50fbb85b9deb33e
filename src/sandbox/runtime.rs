//! Interpreter selection and child process construction.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

use crate::config::DEFAULT_CHILD_PATH;

/// How code is handed to an interpreter: `[wrapper...] program [args...] <code>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Runtime {
    program: String,
    args: Vec<String>,
    wrapper: Vec<String>,
    path: String,
}

impl Runtime {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            wrapper: Vec::new(),
            path: DEFAULT_CHILD_PATH.to_string(),
        }
    }

    /// `node --permission -e <code>`: the permission model denies filesystem,
    /// child process and worker access unless granted.
    pub fn javascript() -> Self {
        Self::new("node", vec!["--permission".to_string(), "-e".to_string()])
    }

    /// `sh -c <code>`
    pub fn shell() -> Self {
        Self::new("sh", vec!["-c".to_string()])
    }

    /// Prefix the interpreter with an isolation wrapper such as
    /// `bwrap --unshare-all --ro-bind / / --` or `nsjail ... --`.
    pub fn with_wrapper(mut self, wrapper: Vec<String>) -> Self {
        self.wrapper = wrapper;
        self
    }

    /// `PATH` exposed to the child; nothing else is inherited.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn has_wrapper(&self) -> bool {
        !self.wrapper.is_empty()
    }

    /// Node.js started with its permission model enabled.
    pub fn uses_node_permissions(&self) -> bool {
        let is_node = Path::new(&self.program)
            .file_name()
            .and_then(|name| name.to_str())
            .map_or(false, |name| name == "node" || name == "nodejs");
        is_node
            && self
                .args
                .iter()
                .any(|arg| arg == "--permission" || arg == "--experimental-permission")
    }

    /// Full argv (excluding the code argument).
    pub fn argv(&self) -> Vec<&str> {
        self.wrapper
            .iter()
            .map(String::as_str)
            .chain(std::iter::once(self.program.as_str()))
            .chain(self.args.iter().map(String::as_str))
            .collect()
    }

    /// Build the command for one execution inside `workdir`.
    pub(crate) fn command(&self, code: &str, workdir: &Path) -> Command {
        let argv = self.argv();
        let (program, leading) = match argv.split_first() {
            Some((program, rest)) => (*program, rest),
            None => (self.program.as_str(), &[][..]),
        };

        let mut command = Command::new(program);
        command
            .args(leading)
            .arg(code)
            .current_dir(workdir)
            .env_clear()
            .env("PATH", &self.path)
            .env("HOME", workdir)
            .env("TMPDIR", workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::javascript()
    }
}
