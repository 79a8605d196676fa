//! In-memory host for tests
//!
//! [`MockHost`] answers commands from canned rules and keeps a tiny file
//! tree for the file-transfer seam. Directories can be restricted to one
//! account, so file access only works through a view opened as that
//! account. Enabled by the `mock` feature.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use df_core::error::SessionError;
use df_core::{Credential, HostId};

use crate::known_hosts::KeyPurger;
use crate::transport::{
    base_name, Dialer, ExecEvent, RawOutput, RemoteEntry, RemoteFs, Transport,
};

/// A command as the mock received it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggedCommand {
    pub command: String,
    pub stdin: Option<Vec<u8>>,
}

struct Rule {
    needles: Vec<String>,
    output: Result<RawOutput, SessionError>,
}

#[derive(Default)]
struct MockState {
    dirs: BTreeSet<String>,
    files: BTreeSet<String>,
    /// Directory -> the only account allowed inside it
    owners: BTreeMap<String, String>,
    rules: Vec<Rule>,
    log: Vec<LoggedCommand>,
    failing_renames: BTreeSet<String>,
    closed: bool,
}

impl MockState {
    /// Fail unless `user` may enter `dir`; `None` is the connected account
    fn check(&self, user: Option<&str>, dir: &str) -> Result<(), SessionError> {
        let owner = self
            .owners
            .iter()
            .filter(|(root, _)| dir == root.as_str() || dir.starts_with(&format!("{}/", root)))
            .max_by_key(|(root, _)| root.len())
            .map(|(_, owner)| owner.as_str());
        match owner {
            Some(owner) if Some(owner) != user => Err(SessionError::Transport(format!(
                "SFTP {}: Permission denied",
                dir
            ))),
            _ => Ok(()),
        }
    }
}

/// Shared in-memory host; clones observe the same state
#[derive(Clone)]
pub struct MockHost {
    home: String,
    state: Arc<Mutex<MockState>>,
}

fn parent(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&trimmed[..idx]),
        None => None,
    }
}

/// Account named by `-u` in a wrapped command
fn run_as(command: &str) -> Option<String> {
    let mut words = command.split_whitespace();
    words.find(|w| *w == "-u")?;
    words.next().map(|w| w.trim_matches('\'').to_string())
}

impl MockHost {
    /// Create a host whose connected account lives in `home`
    pub fn new(home: impl Into<String>) -> Self {
        let host = Self {
            home: home.into(),
            state: Arc::new(Mutex::new(MockState::default())),
        };
        host.add_dir(&host.home.clone());
        host
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Answer commands containing every needle with `output`; later rules win
    pub fn respond(&self, needles: &[&str], output: RawOutput) {
        self.push_rule(needles, Ok(output));
    }

    /// Shorthand for a successful command printing `stdout`
    pub fn respond_ok(&self, needles: &[&str], stdout: &str) {
        self.respond(
            needles,
            RawOutput {
                stdout: stdout.as_bytes().to_vec(),
                stderr: Vec::new(),
                exit_status: Some(0),
            },
        );
    }

    /// Fail matching commands with a session error instead of output
    pub fn respond_err(&self, needles: &[&str], err: SessionError) {
        self.push_rule(needles, Err(err));
    }

    fn push_rule(&self, needles: &[&str], output: Result<RawOutput, SessionError>) {
        self.state().rules.push(Rule {
            needles: needles.iter().map(|n| n.to_string()).collect(),
            output,
        });
    }

    /// Create a directory and its parents
    pub fn add_dir(&self, path: &str) {
        let mut state = self.state();
        let mut current = Some(path.trim_end_matches('/').to_string());
        while let Some(dir) = current {
            if dir.is_empty() {
                break;
            }
            current = parent(&dir).map(str::to_string);
            state.dirs.insert(dir);
        }
    }

    /// Create a file and its parent directories
    pub fn add_file(&self, path: &str) {
        if let Some(dir) = parent(path) {
            self.add_dir(dir);
        }
        self.state().files.insert(path.to_string());
    }

    /// Only `account` may read or change anything below `dir`
    pub fn set_owner(&self, dir: &str, account: &str) {
        self.add_dir(dir);
        self.state()
            .owners
            .insert(dir.trim_end_matches('/').to_string(), account.to_string());
    }

    /// Names of the files directly inside `dir`
    pub fn files_in(&self, dir: &str) -> BTreeSet<String> {
        let dir = dir.trim_end_matches('/');
        self.state()
            .files
            .iter()
            .filter(|f| parent(f) == Some(dir))
            .map(|f| base_name(f).to_string())
            .collect()
    }

    /// Make renames of `from` fail
    pub fn fail_rename(&self, from: &str) {
        self.state().failing_renames.insert(from.to_string());
    }

    pub fn commands(&self) -> Vec<LoggedCommand> {
        self.state().log.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn log(&self, command: &str, stdin: Option<&[u8]>) {
        self.state().log.push(LoggedCommand {
            command: command.to_string(),
            stdin: stdin.map(<[u8]>::to_vec),
        });
    }

    fn answer(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput, SessionError> {
        self.log(command, stdin);
        self.state()
            .rules
            .iter()
            .rev()
            .find(|rule| rule.needles.iter().all(|n| command.contains(n.as_str())))
            .map(|rule| rule.output.clone())
            .unwrap_or(Ok(RawOutput {
                exit_status: Some(0),
                ..Default::default()
            }))
    }

    fn view(&self, user: Option<String>) -> Box<dyn RemoteFs> {
        Box::new(MockFs {
            host: self.clone(),
            user,
        })
    }
}

#[async_trait]
impl Transport for MockHost {
    async fn run(&self, command: &str, stdin: Option<&[u8]>) -> Result<RawOutput, SessionError> {
        self.answer(command, stdin)
    }

    async fn spawn(
        &self,
        command: &str,
        stdin: Option<&[u8]>,
        events: mpsc::Sender<ExecEvent>,
    ) -> Result<(), SessionError> {
        let output = self.answer(command, stdin)?;
        tokio::spawn(async move {
            if !output.stderr.is_empty() {
                let _ = events.send(ExecEvent::Stderr(output.stderr)).await;
            }
            if !output.stdout.is_empty() {
                let _ = events.send(ExecEvent::Stdout(output.stdout)).await;
            }
            let _ = events.send(ExecEvent::Exit(output.exit_status)).await;
        });
        Ok(())
    }

    async fn open_fs(&self) -> Result<Box<dyn RemoteFs>, SessionError> {
        Ok(self.view(None))
    }

    async fn open_fs_via(
        &self,
        command: &str,
        stdin: &[u8],
    ) -> Result<Box<dyn RemoteFs>, SessionError> {
        self.log(command, Some(stdin));
        Ok(self.view(run_as(command)))
    }

    async fn close(&self) -> Result<(), SessionError> {
        self.state().closed = true;
        Ok(())
    }
}

/// File access to a [`MockHost`] with one account's permissions
struct MockFs {
    host: MockHost,
    /// `None` for the connected account
    user: Option<String>,
}

impl MockFs {
    fn missing(path: &str) -> SessionError {
        SessionError::Transport(format!("SFTP {}: No such file", path))
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }
}

#[async_trait]
impl RemoteFs for MockFs {
    async fn home_dir(&self) -> Result<String, SessionError> {
        Ok(match &self.user {
            Some(user) => format!("/home/{}", user),
            None => self.host.home.clone(),
        })
    }

    async fn exists(&self, path: &str) -> Result<bool, SessionError> {
        let state = self.host.state();
        state.check(self.user(), parent(path).unwrap_or(path))?;
        Ok(state.dirs.contains(path) || state.files.contains(path))
    }

    async fn is_dir(&self, path: &str) -> Result<bool, SessionError> {
        let path = path.trim_end_matches('/');
        let state = self.host.state();
        state.check(self.user(), parent(path).unwrap_or(path))?;
        Ok(state.dirs.contains(path))
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteEntry>, SessionError> {
        let dir = path.trim_end_matches('/');
        let state = self.host.state();
        state.check(self.user(), dir)?;
        if !state.dirs.contains(dir) {
            return Err(Self::missing(path));
        }
        let dirs = state
            .dirs
            .iter()
            .filter(|d| parent(d) == Some(dir))
            .map(|d| RemoteEntry {
                name: base_name(d).to_string(),
                is_dir: true,
            });
        let files = state
            .files
            .iter()
            .filter(|f| parent(f) == Some(dir))
            .map(|f| RemoteEntry {
                name: base_name(f).to_string(),
                is_dir: false,
            });
        Ok(dirs.chain(files).collect())
    }

    async fn ensure_dir(&self, path: &str) -> Result<(), SessionError> {
        self.host
            .state()
            .check(self.user(), parent(path).unwrap_or(path))?;
        self.host.add_dir(path);
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<(), SessionError> {
        let mut state = self.host.state();
        state.check(self.user(), parent(from).unwrap_or(from))?;
        state.check(self.user(), parent(to).unwrap_or(to))?;
        if state.failing_renames.contains(from) {
            return Err(SessionError::Transport(format!(
                "SFTP {}: Permission denied",
                from
            )));
        }
        if state.files.contains(to) || state.dirs.contains(to) {
            return Err(SessionError::Transport(format!("SFTP {}: Failure", to)));
        }
        if !state.files.remove(from) {
            return Err(Self::missing(from));
        }
        match parent(to) {
            Some(dir) if state.dirs.contains(dir) => {
                state.files.insert(to.to_string());
                Ok(())
            }
            _ => {
                state.files.insert(from.to_string());
                Err(Self::missing(to))
            }
        }
    }
}

/// Dialer handing out a [`MockHost`], with scripted failures
pub struct MockDialer {
    host: MockHost,
    failures: Mutex<VecDeque<SessionError>>,
    dials: AtomicUsize,
}

impl MockDialer {
    pub fn new(host: MockHost) -> Self {
        Self {
            host,
            failures: Mutex::new(VecDeque::new()),
            dials: AtomicUsize::new(0),
        }
    }

    /// Queue an error for the next dial
    pub fn fail_next(&self, err: SessionError) {
        self.failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(err);
    }

    pub fn dial_count(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Dialer for MockDialer {
    async fn dial(
        &self,
        _host: &HostId,
        _credential: &Credential,
    ) -> Result<Box<dyn Transport>, SessionError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        let next = self
            .failures
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(err) => Err(err),
            None => Ok(Box::new(self.host.clone())),
        }
    }
}

/// Key purger that only counts invocations
#[derive(Default)]
pub struct MockPurger {
    purges: AtomicUsize,
}

impl MockPurger {
    pub fn count(&self) -> usize {
        self.purges.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyPurger for MockPurger {
    async fn purge(&self, _host: &HostId) -> anyhow::Result<()> {
        self.purges.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
