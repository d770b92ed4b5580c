//! Session login for the AHA HTTP interface.
//!
//! A session ID is obtained through `login_sid.lua` with an MD5
//! challenge-response and stays valid for 60 minutes after its last use.

use crate::config::Credentials;
use crate::crypto;
use crate::error::{FritzError, Result};
use crate::xml::Tree;
use log::{debug, info, warn};
use parking_lot::RwLock;
use reqwest::{Client, Url};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// The session ID meaning "not logged in".
pub const SENTINEL_SID: &str = "0000000000000000";

/// Idle time after which the appliance drops a session.
pub const SESSION_LIFETIME: Duration = Duration::from_secs(60 * 60);

const LOGIN_PATH: &str = "/login_sid.lua";

/// Current session token and when it was last used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    sid: String,
    renewed_at: Option<Instant>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// An unauthenticated session.
    pub fn new() -> Self {
        Self {
            sid: SENTINEL_SID.to_string(),
            renewed_at: None,
        }
    }

    pub fn sid(&self) -> &str {
        &self.sid
    }

    pub fn is_authenticated(&self) -> bool {
        self.sid != SENTINEL_SID
    }

    /// True if the token can be used at `now` without logging in again.
    pub fn is_valid_at(&self, now: Instant) -> bool {
        match self.renewed_at {
            Some(at) if self.is_authenticated() => now.saturating_duration_since(at) < SESSION_LIFETIME,
            _ => false,
        }
    }

    /// Slide the expiry window forward.
    pub fn renew(&mut self, now: Instant) {
        self.renewed_at = Some(now);
    }

    /// Take over a token issued by the appliance.
    pub fn adopt(&mut self, sid: &str, now: Instant) {
        self.sid = sid.to_string();
        self.renewed_at = Some(now);
    }

    /// Return to the unauthenticated state.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// Contents of a `login_sid.lua` answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub sid: Option<String>,
    pub challenge: Option<String>,
    pub block_time: u32,
}

impl SessionInfo {
    pub fn parse(tree: &Tree) -> Result<Self> {
        let info = tree
            .get("SessionInfo")
            .ok_or_else(|| FritzError::Protocol("response has no SessionInfo".to_string()))?;
        let text = |name: &str| {
            info.get(name)
                .and_then(Tree::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(Self {
            sid: text("SID"),
            challenge: text("Challenge"),
            block_time: text("BlockTime").and_then(|b| b.parse().ok()).unwrap_or(0),
        })
    }

    /// The issued token, unless it is the sentinel.
    pub fn valid_sid(&self) -> Option<&str> {
        self.sid.as_deref().filter(|sid| *sid != SENTINEL_SID)
    }
}

/// Owns the single session of one command client.
pub struct SessionManager {
    http: Client,
    base_url: RwLock<Url>,
    credentials: RwLock<Credentials>,
    session: Mutex<Session>,
}

impl SessionManager {
    pub fn new(http: Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            http,
            base_url: RwLock::new(base_url),
            credentials: RwLock::new(credentials),
            session: Mutex::new(Session::new()),
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Resolve a path against the web interface root.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .read()
            .join(path)
            .map_err(|e| FritzError::Protocol(format!("bad URL {}: {}", path, e)))
    }

    pub fn set_security_port(&self, port: u16) {
        let mut base_url = self.base_url.write();
        let mut url = base_url.clone();
        if url.set_scheme("https").is_err() || url.set_port(Some(port)).is_err() {
            warn!("Cannot switch {} to https:{}", base_url, port);
            return;
        }
        info!("Using secure web endpoint {}", url);
        *base_url = url;
    }

    pub fn set_username(&self, username: &str) {
        self.credentials.write().username = username.to_string();
    }

    /// Snapshot of the current session.
    pub async fn session(&self) -> Session {
        self.session.lock().await.clone()
    }

    /// Return a usable session ID, logging in if the current one is absent or
    /// expired. Concurrent callers wait for a single login.
    pub async fn ensure_session(&self) -> Result<String> {
        let mut session = self.session.lock().await;

        if session.is_valid_at(Instant::now()) {
            session.renew(Instant::now());
            return Ok(session.sid().to_string());
        }

        let mut url = self.endpoint(LOGIN_PATH)?;
        url.set_query(Some(&format!("sid={}", session.sid())));
        let info = self.session_info(&url).await?;

        if let Some(sid) = info.valid_sid() {
            debug!("Session still accepted by the appliance");
            session.adopt(sid, Instant::now());
            return Ok(session.sid().to_string());
        }

        let challenge = info.challenge.ok_or_else(|| {
            FritzError::Authentication("session info contains no challenge".to_string())
        })?;
        let (username, response) = {
            let credentials = self.credentials.read();
            (
                credentials.username.clone(),
                crypto::session_response(&challenge, &credentials.password),
            )
        };

        let mut url = self.endpoint(LOGIN_PATH)?;
        url.set_query(Some(&format!(
            "username={}&response={}",
            urlencoding::encode(&username),
            response
        )));
        let info = self.session_info(&url).await?;

        match info.valid_sid() {
            Some(sid) => {
                info!("Logged in to the web interface");
                session.adopt(sid, Instant::now());
                Ok(session.sid().to_string())
            }
            None => {
                session.clear();
                let reason = if info.block_time > 0 {
                    format!("could not get SID, login blocked for {}s", info.block_time)
                } else {
                    "could not get SID".to_string()
                };
                Err(FritzError::Authentication(reason))
            }
        }
    }

    /// End the session on the appliance.
    pub async fn logout(&self) -> Result<()> {
        let mut session = self.session.lock().await;
        if !session.is_authenticated() {
            return Ok(());
        }
        let mut url = self.endpoint(LOGIN_PATH)?;
        url.set_query(Some(&format!("logout=1&sid={}", session.sid())));
        self.session_info(&url).await?;
        session.clear();
        debug!("Logged out");
        Ok(())
    }

    async fn session_info(&self, url: &Url) -> Result<SessionInfo> {
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FritzError::Transport(format!(
                "error getting session info: {}",
                status
            )));
        }
        let body = response.text().await?;
        SessionInfo::parse(&Tree::parse(&body)?)
    }
}
