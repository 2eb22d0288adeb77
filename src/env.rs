use std::collections::HashMap;
use std::env as stdenv;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Mutable state of a shell session: variables, current directory and the exit flag.
///
/// `Environment` is a cheap handle; clones share the same state. Parsing reads variables
/// for substitution, builtins read the current directory, assignments and `cd` modify
/// them. Every accessor holds the internal lock only for the duration of the call, so a
/// command blocked on a pipe never blocks another command's access to the environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    state: Arc<RwLock<EnvState>>,
}

#[derive(Debug, Default)]
struct EnvState {
    vars: HashMap<String, String>,
    current_dir: PathBuf,
    should_exit: bool,
}

impl Environment {
    /// Create an environment with no variables rooted at `current_dir`.
    pub fn new(current_dir: impl Into<PathBuf>) -> Self {
        Self {
            state: Arc::new(RwLock::new(EnvState {
                vars: HashMap::new(),
                current_dir: current_dir.into(),
                should_exit: false,
            })),
        }
    }

    /// Capture the current process state into a new `Environment` instance.
    ///
    /// This copies variables from `std::env::vars()` and initializes the current
    /// directory from `std::env::current_dir()`.
    pub fn from_process() -> Self {
        let current_dir = stdenv::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let env = Self::new(current_dir);
        env.write().vars.extend(stdenv::vars());
        env
    }

    /// Get the value of a variable.
    pub fn get_var(&self, key: &str) -> Option<String> {
        self.read().vars.get(key).cloned()
    }

    /// Set or override a variable.
    pub fn set_var(&self, key: impl Into<String>, val: impl Into<String>) {
        self.write().vars.insert(key.into(), val.into());
    }

    /// Snapshot of all variables, e.g. to pass them to a child process.
    pub fn vars(&self) -> HashMap<String, String> {
        self.read().vars.clone()
    }

    pub fn current_dir(&self) -> PathBuf {
        self.read().current_dir.clone()
    }

    pub fn set_current_dir(&self, dir: impl Into<PathBuf>) {
        self.write().current_dir = dir.into();
    }

    /// Resolve a path given by the user: absolute paths are kept as-is, relative ones
    /// are taken relative to the current directory.
    pub fn resolve_path(&self, name: impl AsRef<Path>) -> PathBuf {
        let name = name.as_ref();
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.read().current_dir.join(name)
        }
    }

    /// Ask an interactive loop to terminate after the current line.
    pub fn request_exit(&self) {
        self.write().should_exit = true;
    }

    pub fn should_exit(&self) -> bool {
        self.read().should_exit
    }

    fn read(&self) -> RwLockReadGuard<'_, EnvState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EnvState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use crate::env::Environment;
    use pretty_assertions::assert_eq;
    use std::env as stdenv;
    use std::path::PathBuf;

    #[test]
    fn test_env_set_and_get_var() {
        let env = Environment::new(stdenv::current_dir().unwrap());

        // initially absent, the process environment is not consulted
        assert_eq!(env.get_var("PATH"), None);

        env.set_var("KEY", "VALUE");

        assert_eq!(env.get_var("KEY"), Some("VALUE".to_string()));
    }

    #[test]
    fn test_env_reads_from_process_env() {
        let env = Environment::from_process();
        assert!(env.get_var("PATH").is_some());
        assert_eq!(env.current_dir(), stdenv::current_dir().unwrap());
    }

    #[test]
    fn test_clones_share_state() {
        let env = Environment::new("/");
        let other = env.clone();

        other.set_var("SHARED", "yes");
        other.set_current_dir("/tmp");
        other.request_exit();

        assert_eq!(env.get_var("SHARED").as_deref(), Some("yes"));
        assert_eq!(env.current_dir(), PathBuf::from("/tmp"));
        assert!(env.should_exit());
    }

    #[test]
    fn test_resolve_path() {
        let env = Environment::new("/home/user");
        assert_eq!(env.resolve_path("notes.txt"), PathBuf::from("/home/user/notes.txt"));
        assert_eq!(env.resolve_path("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }
}
