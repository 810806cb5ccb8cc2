use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use base64::Engine;
use parking_lot::RwLock;
use tracing::debug;

use super::Identity;

/// Name of the authentication ticket cookie.
pub const AUTH_COOKIE: &str = "auth_tkt";

/// Session collaborator. The flows only look identities up, invalidate, and ask
/// for the headers that make the client drop its credential cookie.
pub trait SessionStore: Send + Sync {
    fn cookie_name(&self) -> &str { AUTH_COOKIE }

    fn identity(&self, session_id: &str) -> Option<Identity>;

    /// Returns whether a live session was removed. Unknown ids are not an error.
    fn invalidate(&self, session_id: &str) -> bool;

    fn forget_headers(&self) -> Vec<(String, String)> {
        vec![(
            "Set-Cookie".to_string(),
            format!(
                "{}=deleted; Expires=Thu, 01 Jan 1970 00:00:00 GMT; Max-Age=0; HttpOnly; Secure; SameSite=Lax; Path=/",
                self.cookie_name()
            ),
        )]
    }
}

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub identity: Identity,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

fn gen_id_with<F>(fill: F) -> Result<String>
where
    F: FnOnce(&mut [u8]) -> Result<(), getrandom::Error>,
{
    let mut buf = [0u8; 32];
    fill(&mut buf).map_err(|e| anyhow!("session id generation failed: {e}"))?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(buf))
}

fn gen_id() -> Result<String> { gen_id_with(getrandom::getrandom) }

/// In-process session store keyed by the auth cookie value.
/// Suitable for development and tests; hosts plug their own store in production.
#[derive(Debug)]
pub struct MemorySessionStore {
    pub ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl Default for MemorySessionStore {
    fn default() -> Self { Self::with_ttl(Duration::from_secs(60 * 60)) }
}

impl MemorySessionStore {
    pub fn with_ttl(ttl: Duration) -> Self {
        Self { ttl, sessions: RwLock::new(HashMap::new()) }
    }

    pub fn issue(&self, identity: Identity) -> Result<Session> {
        let now = Instant::now();
        let sess = Session { session_id: gen_id()?, identity, issued_at: now, expires_at: now + self.ttl };
        self.sessions.write().insert(sess.session_id.clone(), sess.clone());
        debug!(target: "auth", user = %sess.identity.user_id, ttl_secs = self.ttl.as_secs(), "session issued");
        Ok(sess)
    }

    pub fn len(&self) -> usize { self.sessions.read().len() }

    pub fn is_empty(&self) -> bool { self.sessions.read().is_empty() }
}

impl SessionStore for MemorySessionStore {
    fn identity(&self, session_id: &str) -> Option<Identity> {
        let now = Instant::now();
        let expired = {
            let map = self.sessions.read();
            match map.get(session_id) {
                Some(s) if s.expires_at > now => return Some(s.identity.clone()),
                Some(_) => true,
                None => false,
            }
        };
        if expired {
            self.invalidate(session_id);
        }
        None
    }

    fn invalidate(&self, session_id: &str) -> bool {
        let Some(sess) = self.sessions.write().remove(session_id) else { return false };
        debug!(target: "auth", user = %sess.identity.user_id, "session invalidated");
        true
    }
}
