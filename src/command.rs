//! AHA HTTP interface client (`webservices/homeautoswitch.lua`).
//!
//! Commands are plain GET requests carrying the session ID, the command name
//! and its parameters. Most commands answer with plain text; a fixed set of
//! list and info commands answer with an XML document.

use crate::config::Credentials;
use crate::error::{FritzError, Result};
use crate::palette::{ColorMatcher, Palette};
use crate::session::SessionManager;
use crate::xml::Tree;
use log::{debug, warn};
use reqwest::{Client, Url};
use std::sync::Arc;

const SERVICE_PATH: &str = "/webservices/homeautoswitch.lua";

pub const GET_DEVICE_LIST_INFOS: &str = "getdevicelistinfos";
pub const GET_COLOR_DEFAULTS: &str = "getcolordefaults";

/// Commands whose body is an XML document.
const DOCUMENT_COMMANDS: &[&str] = &[
    GET_DEVICE_LIST_INFOS,
    "getbasicdevicestats",
    "gettriggerlistinfos",
    "gettemplatelistinfos",
    GET_COLOR_DEFAULTS,
    "getsubscriptionstate",
    "getdeviceinfos",
];

/// Body of a command response.
#[derive(Debug, Clone, PartialEq)]
pub enum CommandResponse {
    Text(String),
    Document(Tree),
}

impl CommandResponse {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CommandResponse::Text(t) => Some(t.as_str()),
            CommandResponse::Document(_) => None,
        }
    }

    pub fn as_document(&self) -> Option<&Tree> {
        match self {
            CommandResponse::Document(tree) => Some(tree),
            CommandResponse::Text(_) => None,
        }
    }

    pub fn into_document(self) -> Option<Tree> {
        match self {
            CommandResponse::Document(tree) => Some(tree),
            CommandResponse::Text(_) => None,
        }
    }
}

/// Derive the web interface root from a TR-064 description URL: same scheme
/// and host, default port.
pub fn web_root(description_url: &Url) -> Url {
    let mut url = description_url.clone();
    if url.set_port(None).is_err() {
        warn!("Cannot reset the port of {}", url);
    }
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    url
}

pub struct CommandClient {
    session: SessionManager,
    colors: Arc<ColorMatcher>,
}

impl CommandClient {
    /// Create a client for the web interface at `base_url`. No request is made
    /// until the first command.
    pub fn new(http: Client, base_url: Url, credentials: Credentials) -> Self {
        Self {
            session: SessionManager::new(http, base_url, credentials),
            colors: Arc::new(ColorMatcher::new()),
        }
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    /// The palette matcher filled by [`get_color_defaults`](Self::get_color_defaults).
    pub fn color_matcher(&self) -> Arc<ColorMatcher> {
        self.colors.clone()
    }

    pub fn set_security_port(&self, port: u16) {
        self.session.set_security_port(port);
    }

    pub fn set_username(&self, username: &str) {
        self.session.set_username(username);
    }

    /// Send a command. Parameters are percent-encoded in the given order.
    pub async fn send(&self, command: &str, params: &[(&str, &str)]) -> Result<CommandResponse> {
        let sid = self.session.ensure_session().await?;
        let url = self.command_url(&sid, command, params)?;

        debug!("Sending command {}", command);
        let response = self.session.http().get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FritzError::Transport(format!(
                "error sending command {}: {}",
                command, status
            )));
        }
        let body = response.text().await?;

        if DOCUMENT_COMMANDS.contains(&command) {
            Ok(CommandResponse::Document(Tree::parse(&body)?))
        } else {
            Ok(CommandResponse::Text(body.trim_end().to_string()))
        }
    }

    /// Current state of all smart home devices.
    pub async fn get_state(&self) -> Result<Tree> {
        self.send_document(GET_DEVICE_LIST_INFOS).await
    }

    /// Load the appliance's color and temperature palette into the matcher.
    /// Fetched once; later calls return without a request.
    pub async fn get_color_defaults(&self) -> Result<()> {
        self.colors
            .load_with(|| async {
                let tree = self.send_document(GET_COLOR_DEFAULTS).await?;
                Ok(Palette::from_color_defaults(&tree))
            })
            .await
    }

    async fn send_document(&self, command: &str) -> Result<Tree> {
        self.send(command, &[])
            .await?
            .into_document()
            .ok_or_else(|| FritzError::Protocol(format!("{} returned no document", command)))
    }

    fn command_url(&self, sid: &str, command: &str, params: &[(&str, &str)]) -> Result<Url> {
        let mut query = format!("sid={}&switchcmd={}", sid, urlencoding::encode(command));
        for (key, value) in params {
            query.push('&');
            query.push_str(key);
            query.push('=');
            query.push_str(&urlencoding::encode(value));
        }
        let mut url = self.session.endpoint(SERVICE_PATH)?;
        url.set_query(Some(&query));
        Ok(url)
    }
}
