//! Per-user session lifecycle (component H, spec.md §4.8).
//!
//! Grounded on the teacher's `session_manager.rs`: a registry of named
//! sessions behind a typed error enum shaped like its `SessionError`
//! (`NotFound`, `AlreadyExists`, `InvalidState`, `Storage`,
//! `InvalidArgument`, plus an `Interpreter` wrapping variant playing the
//! teacher's `Repl(ReplError)` role). TTL expiry and the background reaper
//! are new -- the teacher's sessions live until explicitly destroyed -- and
//! are built with the same "bounded background work reported back through
//! an explicit channel, never silently swallowed" posture the teacher
//! applies to its own resource limits.
//!
//! [`Evaluator`] is confined to one thread (its scope chain, object table,
//! and tree arena are all `Rc`-backed, spec.md §5: "each evaluator is
//! single-writer and must not be shared across concurrent callers"), so a
//! session cannot hand its evaluator to a manager-owned reaper. Instead
//! each session owns a dedicated worker thread that holds the evaluator and
//! answers commands over a channel -- this thread *is* the `Run()`
//! goroutine spec.md describes, firing `OnStart` once at the top and
//! `OnExit` once at the bottom. The manager and reaper only ever touch
//! `Send`-safe metadata and a `Sender<SessionCommand>`.

use std::{
    collections::HashMap,
    fmt,
    rc::Rc,
    sync::{mpsc, Arc, RwLock},
    thread,
    time::SystemTime,
};

use crate::{
    config::EngineConfig,
    error::{EngineError, Flow},
    eval::Evaluator,
    log::StderrLog,
    parser::parse_program,
    tree::serializer::value_to_json,
    value::Json,
};

/// Opaque handle identifying one session, stable for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(pub String);

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub enum SessionError {
    NotFound(SessionToken),
    AlreadyExists(SessionToken),
    InvalidState(String),
    Storage(String),
    InvalidArgument(String),
    Interpreter(EngineError),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(t) => write!(f, "session {t} not found"),
            Self::AlreadyExists(t) => write!(f, "session {t} already exists"),
            Self::InvalidState(m) => write!(f, "invalid session state: {m}"),
            Self::Storage(m) => write!(f, "session storage error: {m}"),
            Self::InvalidArgument(m) => write!(f, "invalid argument: {m}"),
            Self::Interpreter(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for SessionError {}

impl From<EngineError> for SessionError {
    fn from(e: EngineError) -> Self {
        Self::Interpreter(e)
    }
}

/// Created/last-accessed/expires-at timestamps for one session
/// (spec.md §4.8: "records created/last-accessed/expires-at timestamps").
#[derive(Debug, Clone)]
pub struct SessionInfo {
    pub token: SessionToken,
    pub created_at: SystemTime,
    pub last_accessed: SystemTime,
    pub expires_at: SystemTime,
}

enum SessionCommand {
    Execute { file: String, script: String, reply: mpsc::Sender<Result<Json, SessionError>> },
    Shutdown,
}

struct SessionMeta {
    sender: mpsc::Sender<SessionCommand>,
    created_at: SystemTime,
    last_accessed: SystemTime,
    expires_at: SystemTime,
}

struct Inner {
    config: EngineConfig,
    sessions: RwLock<HashMap<SessionToken, SessionMeta>>,
    reaper_stop: mpsc::Sender<()>,
}

/// Registry of active sessions plus the background reaper that expires
/// them. Cheap to clone -- it's a handle around a shared, internally
/// synchronized registry, the same ergonomics as the teacher's
/// `SessionManager` wrapping one shared `RwLock<HashMap<...>>` (spec.md §5:
/// "Session map ... guarded by a reader/writer lock on its owner").
#[derive(Clone)]
pub struct SessionManager(Arc<Inner>);

impl SessionManager {
    pub fn new(config: EngineConfig) -> Self {
        let (reaper_stop_tx, reaper_stop_rx) = mpsc::channel();
        let inner = Arc::new(Inner {
            config,
            sessions: RwLock::new(HashMap::new()),
            reaper_stop: reaper_stop_tx,
        });

        let reaper_inner = Arc::clone(&inner);
        thread::spawn(move || reaper_loop(reaper_inner, reaper_stop_rx));

        Self(inner)
    }

    /// Creates a new session, spawning its dedicated worker thread (the
    /// `Run()` goroutine), registers it, and returns a [`Session`] handle.
    pub fn create_session(&self, token: SessionToken) -> Result<Session, SessionError> {
        let mut sessions = self.0.sessions.write().expect("session map poisoned");
        if sessions.contains_key(&token) {
            return Err(SessionError::AlreadyExists(token));
        }

        let (tx, rx) = mpsc::channel();
        let config = self.0.config.clone();
        let worker_token = token.clone();
        thread::spawn(move || session_worker(worker_token, config, rx));

        let now = SystemTime::now();
        sessions.insert(
            token.clone(),
            SessionMeta {
                sender: tx,
                created_at: now,
                last_accessed: now,
                expires_at: now + self.0.config.session_ttl(),
            },
        );
        drop(sessions);

        Ok(Session { token, manager: self.clone() })
    }

    /// Extends a session's expiry by the configured TTL
    /// (spec.md §4.8: "`GetSession` extends the expiry by the default TTL
    /// on each access").
    pub fn touch(&self, token: &SessionToken) -> Result<(), SessionError> {
        let mut sessions = self.0.sessions.write().expect("session map poisoned");
        let meta = sessions.get_mut(token).ok_or_else(|| SessionError::NotFound(token.clone()))?;
        let now = SystemTime::now();
        meta.last_accessed = now;
        meta.expires_at = now + self.0.config.session_ttl();
        Ok(())
    }

    pub fn info(&self, token: &SessionToken) -> Result<SessionInfo, SessionError> {
        let sessions = self.0.sessions.read().expect("session map poisoned");
        let meta = sessions.get(token).ok_or_else(|| SessionError::NotFound(token.clone()))?;
        Ok(SessionInfo {
            token: token.clone(),
            created_at: meta.created_at,
            last_accessed: meta.last_accessed,
            expires_at: meta.expires_at,
        })
    }

    pub fn list_sessions(&self) -> Vec<SessionToken> {
        self.0.sessions.read().expect("session map poisoned").keys().cloned().collect()
    }

    fn execute(&self, token: &SessionToken, file: &str, script: &str) -> Result<Json, SessionError> {
        let sender = {
            let sessions = self.0.sessions.read().expect("session map poisoned");
            sessions.get(token).ok_or_else(|| SessionError::NotFound(token.clone()))?.sender.clone()
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        sender
            .send(SessionCommand::Execute { file: file.to_string(), script: script.to_string(), reply: reply_tx })
            .map_err(|_| SessionError::InvalidState("session worker has exited".to_string()))?;
        let result = reply_rx.recv().map_err(|_| SessionError::InvalidState("session worker dropped its reply channel".to_string()))?;
        self.touch(token)?;
        result
    }

    /// Ends a session: signals its worker to shut down (running `OnExit`,
    /// closing every named resource, spec.md §4.8 "Session termination")
    /// and removes it from the registry.
    pub fn destroy_session(&self, token: &SessionToken) -> Result<(), SessionError> {
        let mut sessions = self.0.sessions.write().expect("session map poisoned");
        let meta = sessions.remove(token).ok_or_else(|| SessionError::NotFound(token.clone()))?;
        let _ = meta.sender.send(SessionCommand::Shutdown);
        Ok(())
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let _ = self.reaper_stop.send(());
        if let Ok(sessions) = self.sessions.read() {
            for meta in sessions.values() {
                let _ = meta.sender.send(SessionCommand::Shutdown);
            }
        }
    }
}

/// An ergonomic handle to one registered session; cheap to clone and pass
/// around, all methods delegate to the owning [`SessionManager`].
#[derive(Clone)]
pub struct Session {
    token: SessionToken,
    manager: SessionManager,
}

impl Session {
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// Runs `script` in this session's evaluator and returns its final
    /// value projected to neutral JSON (the evaluator's own `Value` never
    /// leaves its owning thread).
    pub fn execute(&self, file: &str, script: &str) -> Result<Json, SessionError> {
        self.manager.execute(&self.token, file, script)
    }

    pub fn touch(&self) -> Result<(), SessionError> {
        self.manager.touch(&self.token)
    }

    pub fn info(&self) -> Result<SessionInfo, SessionError> {
        self.manager.info(&self.token)
    }

    pub fn destroy(self) -> Result<(), SessionError> {
        self.manager.destroy_session(&self.token)
    }
}

fn reaper_loop(inner: Arc<Inner>, stop: mpsc::Receiver<()>) {
    loop {
        match stop.recv_timeout(inner.config.reaper_interval()) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => return,
            Err(mpsc::RecvTimeoutError::Timeout) => {}
        }

        let now = SystemTime::now();
        let mut sessions = inner.sessions.write().expect("session map poisoned");
        let expired: Vec<SessionToken> = sessions
            .iter()
            .filter(|(_, meta)| meta.expires_at <= now)
            .map(|(token, _)| token.clone())
            .collect();
        for token in expired {
            if let Some(meta) = sessions.remove(&token) {
                let _ = meta.sender.send(SessionCommand::Shutdown);
            }
        }
    }
}

/// The body of one session's dedicated thread: owns the `Evaluator`, runs
/// the bootstrap script, fires `OnStart`, then answers commands until told
/// to shut down, at which point it fires `OnExit` and closes every named
/// resource.
fn session_worker(token: SessionToken, config: EngineConfig, commands: mpsc::Receiver<SessionCommand>) {
    let config = Rc::new(config);
    let mut eval = Evaluator::with_log(Rc::clone(&config), Rc::new(StderrLog));

    if let Some(path) = config.bootstrap_script.clone() {
        if let Err(e) = run_script_file(&mut eval, &path) {
            eval.log.log(crate::log::Level::Error, "session", &format!("session {token}: bootstrap script failed: {e}"));
        }
    }

    // The bootstrap script above is where a session registers its
    // `OnStart`/`OnExit` hooks via the `onStart`/`onExit` built-ins; fire
    // whichever one was registered.
    fire_hook(&eval, crate::builtins::session::ON_START_HOOK, &token, "OnStart");

    loop {
        match commands.recv() {
            Ok(SessionCommand::Execute { file, script, reply }) => {
                let result = run_script_str(&mut eval, &file, &script).map_err(SessionError::from);
                let _ = reply.send(result);
            }
            Ok(SessionCommand::Shutdown) | Err(_) => break,
        }
    }

    fire_hook(&eval, crate::builtins::session::ON_EXIT_HOOK, &token, "OnExit");

    for err in eval.objects.close_all() {
        eval.log.log(crate::log::Level::Error, "session", &format!("session {token}: resource close failed: {err}"));
    }

    drop(eval);
}

fn fire_hook(eval: &Evaluator, hook_name: &str, token: &SessionToken, label: &str) {
    let Some(crate::value::Value::Function(func)) = eval.global.get(hook_name) else { return };
    if let Err(flow) = eval.call_function(&func, Vec::new(), &crate::pos::SourcePos::synthetic()) {
        eval.log.log(crate::log::Level::Error, "session", &format!("session {token}: {label} hook failed: {flow}"));
    }
}

fn run_script_file(eval: &mut Evaluator, path: &std::path::Path) -> Result<Json, EngineError> {
    let source = std::fs::read_to_string(path).map_err(|e| EngineError::backend(format!("reading {}: {e}", path.display())))?;
    run_script_str(eval, &path.to_string_lossy(), &source)
}

fn run_script_str(eval: &mut Evaluator, file: &str, source: &str) -> Result<Json, EngineError> {
    let program = parse_program(file, source)?;
    match eval.run(&program) {
        Ok(value) => Ok(value_to_json(&value)),
        Err(Flow::Error(e)) => Err(e),
        Err(Flow::Sentinel(sentinel)) => Err(EngineError::backend(format!("uncaught control-flow signal: {sentinel}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;

    fn config_with_ttl(ttl_secs: u64, reaper_secs: u64) -> EngineConfig {
        let mut cfg = EngineConfig::default();
        cfg.session_ttl_secs = ttl_secs;
        cfg.reaper_interval_secs = reaper_secs;
        cfg
    }

    #[test]
    fn create_then_execute_returns_the_scripts_value() {
        let manager = SessionManager::new(config_with_ttl(3600, 3600));
        let session = manager.create_session(SessionToken("alice".to_string())).unwrap();
        let result = session.execute("test", "add(1, 2)").unwrap();
        assert_eq!(result, Json::Number(3.0));
        session.destroy().unwrap();
    }

    #[test]
    fn creating_a_duplicate_token_is_an_error() {
        let manager = SessionManager::new(config_with_ttl(3600, 3600));
        manager.create_session(SessionToken("bob".to_string())).unwrap();
        let err = manager.create_session(SessionToken("bob".to_string())).unwrap_err();
        assert!(matches!(err, SessionError::AlreadyExists(_)));
    }

    #[test]
    fn executing_against_an_unknown_token_is_not_found() {
        let manager = SessionManager::new(config_with_ttl(3600, 3600));
        let err = manager.execute(&SessionToken("ghost".to_string()), "test", "1").unwrap_err();
        assert!(matches!(err, SessionError::NotFound(_)));
    }

    #[test]
    fn reaper_expires_a_session_past_its_ttl() {
        let manager = SessionManager::new(config_with_ttl(0, 0));
        let session = manager.create_session(SessionToken("ephemeral".to_string())).unwrap();
        let token = session.token().clone();
        // TTL and reaper interval are both zero, so the very next reaper
        // tick collects the session; give it a little slack to run.
        thread::sleep(StdDuration::from_millis(300));
        assert!(matches!(manager.info(&token), Err(SessionError::NotFound(_))));
    }
}
