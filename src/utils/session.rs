//! File-backed session store with a 30-minute idle expiry. Each session is
//! one file under the store directory so state survives a restart.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use log::warn;

use crate::utils::fs;

pub const SESSION_IDLE_TIMEOUT: u64 = 1800; // 30 minutes
pub const DEFAULT_SESSION_DIR: &str = "/tmp/webserv_sessions";
pub const DEFAULT_USER_DIR: &str = "/tmp/webserv_users";

#[derive(Debug, Clone)]
pub struct Session {
    pub username: String,
    pub created_at: u64,
    pub last_accessed: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.last_accessed + SESSION_IDLE_TIMEOUT
    }
}

#[derive(Debug)]
pub struct SessionStore {
    dir: PathBuf,
    sessions: HashMap<String, Session>,
    counter: u64,
    pub last_cleanup: Instant,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !fs::exists(&dir) {
            if let Err(e) = fs::create_dir(&dir, 0o700) {
                warn!("cannot create session dir {}: {}", dir.display(), e);
            }
        }
        let mut store = SessionStore {
            dir,
            sessions: HashMap::new(),
            counter: 0,
            last_cleanup: Instant::now(),
        };
        store.load();
        store.cleanup();
        store
    }

    pub fn create_session(&mut self, username: &str) -> String {
        let id = self.generate_id();
        let now = timestamp();
        let session = Session {
            username: username.to_string(),
            created_at: now,
            last_accessed: now,
        };
        self.persist(&id, &session);
        self.sessions.insert(id.clone(), session);
        id
    }

    /// Resolve a session id to its user, refreshing the idle clock.
    /// Expired sessions are destroyed on sight.
    pub fn lookup(&mut self, id: &str) -> Option<String> {
        let now = timestamp();
        let expired = match self.sessions.get(id) {
            Some(session) => session.is_expired(now),
            None => return None,
        };
        if expired {
            self.destroy(id);
            return None;
        }
        let session = self.sessions.get_mut(id)?;
        session.last_accessed = now;
        let username = session.username.clone();
        let session = session.clone();
        self.persist(id, &session);
        Some(username)
    }

    pub fn destroy(&mut self, id: &str) {
        self.sessions.remove(id);
        let _ = fs::delete_file(&self.dir.join(id));
    }

    pub fn cleanup(&mut self) {
        let now = timestamp();
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.is_expired(now))
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            self.destroy(&id);
        }
        self.last_cleanup = Instant::now();
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn generate_id(&mut self) -> String {
        self.counter += 1;
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let mut x = now.as_nanos() as u64 ^ (self.counter << 48) | 1;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        format!("{:016x}{:08x}", x, now.subsec_nanos())
    }

    fn persist(&self, id: &str, session: &Session) {
        let content = format!(
            "{}\n{}\n{}\n",
            session.username, session.created_at, session.last_accessed
        );
        if let Err(e) = fs::save_file(&self.dir.join(id), content.as_bytes()) {
            warn!("cannot persist session {}: {}", id, e);
        }
    }

    fn load(&mut self) {
        let entries = match fs::list_directory(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return,
        };
        for entry in entries {
            if entry.is_dir {
                continue;
            }
            let path = self.dir.join(&entry.name);
            let Ok(content) = fs::read_file(&path) else { continue };
            let text = String::from_utf8_lossy(&content);
            let mut lines = text.lines();
            let (Some(username), Some(created), Some(accessed)) =
                (lines.next(), lines.next(), lines.next())
            else {
                continue;
            };
            let (Ok(created_at), Ok(last_accessed)) =
                (created.parse::<u64>(), accessed.parse::<u64>())
            else {
                continue;
            };
            self.sessions.insert(
                entry.name,
                Session {
                    username: username.to_string(),
                    created_at,
                    last_accessed,
                },
            );
        }
    }
}

fn timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// File-per-user credential records, one directory next to the sessions.
#[derive(Debug)]
pub struct UserStore {
    dir: PathBuf,
}

impl UserStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if !fs::exists(&dir) {
            if let Err(e) = fs::create_dir(&dir, 0o700) {
                warn!("cannot create user dir {}: {}", dir.display(), e);
            }
        }
        UserStore { dir }
    }

    pub fn user_exists(&self, username: &str) -> bool {
        !username.is_empty() && fs::exists(&self.dir.join(username))
    }

    pub fn register_user(&self, username: &str, password: &str) -> bool {
        if username.is_empty() || username.contains('/') || self.user_exists(username) {
            return false;
        }
        fs::save_file(&self.dir.join(username), password.as_bytes()).is_ok()
    }

    pub fn authenticate_user(&self, username: &str, password: &str) -> bool {
        if !self.user_exists(username) {
            return false;
        }
        match fs::read_file(&self.dir.join(username)) {
            Ok(stored) => stored == password.as_bytes(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_store(tag: &str) -> SessionStore {
        let dir = std::env::temp_dir().join(format!("webserv_sessions_test_{}", tag));
        let _ = std::fs::remove_dir_all(&dir);
        SessionStore::new(dir)
    }

    #[test]
    fn test_create_and_lookup() {
        let mut store = temp_store("create");
        let id = store.create_session("alice");
        assert_eq!(store.lookup(&id).as_deref(), Some("alice"));
        assert_eq!(store.lookup("missing"), None);
    }

    #[test]
    fn test_destroy_removes_session() {
        let mut store = temp_store("destroy");
        let id = store.create_session("bob");
        store.destroy(&id);
        assert_eq!(store.lookup(&id), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_sessions_survive_reload() {
        let dir = std::env::temp_dir().join("webserv_sessions_test_reload");
        let _ = std::fs::remove_dir_all(&dir);

        let id = {
            let mut store = SessionStore::new(&dir);
            store.create_session("carol")
        };

        let mut reloaded = SessionStore::new(&dir);
        assert_eq!(reloaded.lookup(&id).as_deref(), Some("carol"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_expired_session_is_dropped() {
        let mut store = temp_store("expiry");
        let id = store.create_session("dave");
        if let Some(session) = store.sessions.get_mut(&id) {
            session.last_accessed = 0;
        }
        assert_eq!(store.lookup(&id), None);
    }

    #[test]
    fn test_ids_are_unique() {
        let mut store = temp_store("unique");
        let a = store.create_session("u");
        let b = store.create_session("u");
        assert_ne!(a, b);
    }

    #[test]
    fn test_user_register_and_authenticate() {
        let dir = std::env::temp_dir().join("webserv_users_test");
        let _ = std::fs::remove_dir_all(&dir);
        let users = UserStore::new(&dir);

        assert!(!users.user_exists("erin"));
        assert!(users.register_user("erin", "s3cret"));
        assert!(users.user_exists("erin"));
        // second registration for the same name is refused
        assert!(!users.register_user("erin", "other"));

        assert!(users.authenticate_user("erin", "s3cret"));
        assert!(!users.authenticate_user("erin", "wrong"));
        assert!(!users.authenticate_user("ghost", "s3cret"));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
