//! Connection setup for one FRITZ!Box.
//!
//! Resolves the appliance, initialises the TR-064 client, settles transport
//! security and credentials, and creates the smart home client when the
//! firmware offers it.

use crate::capability::{self, Classification};
use crate::command::{self, CommandClient};
use crate::config::{Config, TlsMode};
use crate::error::{FritzError, Result};
use crate::rpc::{DEVICE_INFO, RpcClient};
use crate::scanner::Scanner;
use crate::value::Value;
use crate::xml::Tree;
use log::{debug, info, warn};
use reqwest::Url;
use std::sync::Arc;

/// Port of the unencrypted TR-064 description.
pub const TR064_PORT: u16 = 49000;

/// Default TR-064 user name.
pub const DEFAULT_USERNAME: &str = "dslf-config";

pub const LAN_CONFIG_SECURITY: &str = "urn:dslforum-org:service:LANConfigSecurity:1";
pub const REMOTE_ACCESS: &str = "urn:dslforum-org:service:X_AVM-DE_RemoteAccess:1";
pub const HOMEAUTO: &str = "urn:dslforum-org:service:X_AVM-DE_Homeauto:1";

/// A smart home device entry and what it should be exposed as.
#[derive(Debug, Clone, PartialEq)]
pub struct SmartHomeDevice {
    pub identifier: String,
    pub name: String,
    pub classification: Classification,
    pub entry: Tree,
}

/// A connected FRITZ!Box.
pub struct Gateway {
    rpc: Arc<RpcClient>,
    command: Option<Arc<CommandClient>>,
    username: String,
}

impl Gateway {
    /// Connect using `config`.
    ///
    /// Without a configured host the network is searched and exactly one
    /// gateway must answer.
    pub async fn connect(config: Config) -> Result<Self> {
        let http = config.http_client()?;

        let description_url = match &config.host {
            Some(host) => description_url(host)?,
            None => {
                info!("Searching devices...");
                Scanner::new()
                    .with_http_client(http.clone())
                    .scan_one()
                    .await?
            }
        };

        let mut credentials = config.credentials.clone();
        let lookup_user = credentials.username.is_empty() && !credentials.password.is_empty();
        if lookup_user {
            credentials.username = DEFAULT_USERNAME.to_string();
        }

        let rpc = Arc::new(RpcClient::init(http.clone(), &description_url, credentials.clone()).await?);
        info!("Device found: {}", rpc.device().display_name);

        match config.tls {
            TlsMode::Off => {}
            TlsMode::Port(port) => rpc.set_security_port(port),
            TlsMode::Auto => {
                match port_from(&rpc, DEVICE_INFO, "GetSecurityPort", "NewSecurityPort").await? {
                    Some(port) => rpc.set_security_port(port),
                    None => warn!("No security port reported, staying on plain HTTP"),
                }
            }
        }

        if credentials.password.is_empty() {
            let results = rpc
                .send(LAN_CONFIG_SECURITY, "X_AVM-DE_GetAnonymousLogin", None)
                .await?;
            let enabled = results
                .as_ref()
                .and_then(|r| r.get("NewX_AVM-DE_AnonymousLoginEnabled"))
                .and_then(Value::as_bool);
            if enabled != Some(true) {
                return Err(FritzError::Authentication(
                    "access without user name and password is not allowed".to_string(),
                ));
            }
        }

        if lookup_user {
            let results = rpc
                .send(LAN_CONFIG_SECURITY, "X_AVM-DE_GetCurrentUser", None)
                .await?;
            let current = results
                .as_ref()
                .and_then(|r| r.get("NewX_AVM-DE_CurrentUsername"))
                .and_then(Value::as_str)
                .filter(|name| !name.is_empty())
                .ok_or_else(|| {
                    FritzError::Authentication("appliance did not report a user name".to_string())
                })?
                .to_string();
            debug!("Adopting user {}", current);
            rpc.set_username(&current);
            credentials.username = current;
        }

        let command = if rpc.has_service(HOMEAUTO) {
            let client = CommandClient::new(http, command::web_root(&description_url), credentials.clone());
            let port = match config.tls {
                TlsMode::Off => None,
                TlsMode::Port(port) => Some(port),
                TlsMode::Auto => port_from(&rpc, REMOTE_ACCESS, "GetInfo", "NewPort").await?,
            };
            if let Some(port) = port {
                client.set_security_port(port);
            }
            Some(Arc::new(client))
        } else {
            debug!("No smart home service");
            None
        };

        Ok(Self {
            rpc,
            command,
            username: credentials.username,
        })
    }

    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }

    /// The smart home client, if the firmware offers the service.
    pub fn command(&self) -> Option<&Arc<CommandClient>> {
        self.command.as_ref()
    }

    /// User name in effect after connecting.
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Current smart home devices with their classification.
    /// Empty without smart home support.
    pub async fn smart_home_devices(&self) -> Result<Vec<SmartHomeDevice>> {
        let Some(command) = &self.command else {
            return Ok(Vec::new());
        };
        let state = command.get_state().await?;
        let Some(entries) = state.path(&["devicelist", "device"]) else {
            return Ok(Vec::new());
        };

        Ok(entries
            .as_list()
            .iter()
            .map(|entry| SmartHomeDevice {
                identifier: entry.attr("identifier").unwrap_or_default().trim().to_string(),
                name: entry
                    .get("name")
                    .and_then(Tree::as_str)
                    .unwrap_or_default()
                    .to_string(),
                classification: capability::classify(entry),
                entry: entry.clone(),
            })
            .collect())
    }
}

/// Description URL of a fixed host. The TR-064 port is used unless `host`
/// names one.
pub fn description_url(host: &str) -> Result<Url> {
    let bad_host = |e: String| FritzError::Protocol(format!("bad host {}: {}", host, e));
    let mut url = Url::parse(&format!("http://{}/tr64desc.xml", host)).map_err(|e| bad_host(e.to_string()))?;
    if url.port().is_none() {
        url.set_port(Some(TR064_PORT))
            .map_err(|_| bad_host("cannot carry a port".to_string()))?;
    }
    Ok(url)
}

/// Read a port number out of an action's results.
async fn port_from(rpc: &RpcClient, service: &str, action: &str, output: &str) -> Result<Option<u16>> {
    let results = rpc.send(service, action, None).await?;
    let port = results
        .as_ref()
        .and_then(|r| r.get(output))
        .and_then(Value::as_i64)
        .and_then(|p| u16::try_from(p).ok())
        .filter(|p| *p != 0);
    Ok(port)
}
