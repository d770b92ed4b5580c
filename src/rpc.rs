//! TR-064 client.
//!
//! Action signatures are not compiled in: the client reads the appliance's
//! root description at [`RpcClient::init`], fetches each service description
//! the first time that service is used, and types every argument and result
//! from the declared state variables.

use crate::catalog::{
    self, ActionDescriptor, DeviceDescriptor, RawService, ServiceDescriptor,
};
use crate::config::Credentials;
use crate::crypto::DigestChallenge;
use crate::error::{FritzError, Result};
use crate::soap::{self, SoapRequest};
use crate::value::{self, DataType, Value};
use crate::xml::Tree;
use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, WWW_AUTHENTICATE};
use reqwest::{Client, StatusCode, Url};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;

pub const DEVICE_INFO: &str = "urn:dslforum-org:service:DeviceInfo:1";

const HTTP_METHOD: &str = "POST";
const SOAP_ACTION_HEADER: &str = "SOAPACTION";

/// Arguments for a call, keyed by argument name.
pub type Arguments = HashMap<String, Value>;

/// Output arguments of a call, keyed by argument name.
pub type Results = HashMap<String, Value>;

type ServiceSlot = Arc<OnceCell<Option<Arc<ServiceDescriptor>>>>;

pub struct RpcClient {
    http: Client,
    credentials: RwLock<Credentials>,
    base_url: RwLock<Url>,
    device: RwLock<DeviceDescriptor>,
    raw_services: Vec<RawService>,
    services: Mutex<HashMap<String, ServiceSlot>>,
    challenge: Mutex<Option<DigestChallenge>>,
}

impl RpcClient {
    /// Fetch the root description at `description_url` and prepare the
    /// catalog. Fails if the device identity or service list is incomplete.
    pub async fn init(http: Client, description_url: &Url, credentials: Credentials) -> Result<Self> {
        let host = description_url
            .host_str()
            .ok_or_else(|| FritzError::Protocol(format!("no host in {}", description_url)))?
            .to_string();

        debug!("Fetching device description from {}", description_url);
        let tree = fetch_document(&http, description_url).await?;
        let (device, raw_services) = catalog::parse_root_description(&tree, &host)?;

        let mut base_url = description_url.clone();
        base_url.set_path("/");
        base_url.set_query(None);
        base_url.set_fragment(None);

        info!(
            "Initialized {} ({}, firmware {}) with {} services",
            device.display_name,
            device.model,
            device.firmware,
            raw_services.len()
        );

        Ok(Self {
            http,
            credentials: RwLock::new(credentials),
            base_url: RwLock::new(base_url),
            device: RwLock::new(device),
            raw_services,
            services: Mutex::new(HashMap::new()),
            challenge: Mutex::new(None),
        })
    }

    /// Returns a snapshot of the device identity.
    pub fn device(&self) -> DeviceDescriptor {
        self.device.read().clone()
    }

    /// Returns the base URL control endpoints are resolved against.
    pub fn base_url(&self) -> Url {
        self.base_url.read().clone()
    }

    /// Checks whether the root description lists a service.
    pub fn has_service(&self, service_type: &str) -> bool {
        self.raw_services.iter().any(|s| s.service_type == service_type)
    }

    /// Service types listed by the root description, sub-devices included.
    pub fn service_types(&self) -> impl Iterator<Item = &str> {
        self.raw_services.iter().map(|s| s.service_type.as_str())
    }

    /// Switch control calls to HTTPS on the given port.
    pub fn set_security_port(&self, port: u16) {
        let mut base_url = self.base_url.write();
        let mut url = base_url.clone();
        if url.set_scheme("https").is_err() || url.set_port(Some(port)).is_err() {
            warn!("Cannot switch {} to https:{}", base_url, port);
            return;
        }
        info!("Using secure endpoint {}", url);
        *base_url = url;
    }

    /// Replace the user name used for digest authentication.
    pub fn set_username(&self, username: &str) {
        self.credentials.write().username = username.to_string();
    }

    /// Re-read the firmware version from the appliance.
    pub async fn refresh_firmware(&self) -> Result<Option<String>> {
        let results = self.send(DEVICE_INFO, "GetInfo", None).await?;
        let firmware = results
            .as_ref()
            .and_then(|r| r.get("NewSoftwareVersion"))
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(fw) = &firmware {
            let mut device = self.device.write();
            if device.firmware != *fw {
                info!("Firmware changed from {} to {}", device.firmware, fw);
                device.firmware = fw.clone();
            }
        }
        Ok(firmware)
    }

    /// Returns the descriptor for a service, fetching its description on first
    /// use. `None` means the firmware does not offer the service.
    pub async fn get_service(&self, service_type: &str) -> Result<Option<Arc<ServiceDescriptor>>> {
        let slot = self
            .services
            .lock()
            .entry(service_type.to_string())
            .or_default()
            .clone();
        let resolved = slot
            .get_or_try_init(|| self.resolve_service(service_type))
            .await?;
        Ok(resolved.clone())
    }

    async fn resolve_service(&self, service_type: &str) -> Result<Option<Arc<ServiceDescriptor>>> {
        let Some(raw) = self.raw_services.iter().find(|s| s.service_type == service_type) else {
            debug!("No such service: {}", service_type);
            return Ok(None);
        };
        let Some(scpd_url) = &raw.scpd_url else {
            debug!("No SCPDURL for service: {}", service_type);
            return Ok(None);
        };
        let Some(control_url) = &raw.control_url else {
            debug!("No controlURL for service: {}", service_type);
            return Ok(None);
        };

        let url = self.resolve(scpd_url)?;
        debug!("Fetching service description {}", url);
        let tree = fetch_document(&self.http, &url).await?;
        let service = catalog::parse_service_description(&tree, service_type, control_url)?;
        debug!(
            "Service {} offers {} actions",
            service_type,
            service.actions.len()
        );
        Ok(Some(Arc::new(service)))
    }

    /// Call an action.
    ///
    /// Returns `Ok(None)` when the service or action is not offered. When
    /// `args` is given, every declared input must be present; undeclared keys
    /// are ignored. Output arguments missing from the response are omitted.
    pub async fn send(
        &self,
        service_type: &str,
        action_name: &str,
        args: Option<&Arguments>,
    ) -> Result<Option<Results>> {
        let Some(service) = self.get_service(service_type).await? else {
            return Ok(None);
        };
        let Some(action) = service.action(action_name) else {
            debug!("No such action: {}", action_name);
            return Ok(None);
        };

        let wire_args = match args {
            Some(args) => encode_arguments(&service, action, args)?,
            None => Vec::new(),
        };

        let url = self.resolve(&service.control_url)?;
        let request = SoapRequest::new(service_type, action_name, &wire_args);
        let response = self.post(&url, &request).await?;

        Ok(Some(decode_results(&service, action, &response)))
    }

    async fn post(&self, url: &Url, request: &SoapRequest) -> Result<Tree> {
        let uri = url.path().to_string();

        // Reuse the last challenge; a stale nonce costs one 401
        let mut authorization = self
            .challenge
            .lock()
            .as_ref()
            .map(|c| self.authorization(c, &uri));
        let mut retried = false;

        loop {
            let mut builder = self
                .http
                .post(url.clone())
                .header(CONTENT_TYPE, soap::CONTENT_TYPE)
                .header(SOAP_ACTION_HEADER, &request.action_header)
                .body(request.body.clone());
            if let Some(auth) = &authorization {
                builder = builder.header(AUTHORIZATION, auth);
            }

            let response = builder.send().await?;
            let status = response.status();

            if status == StatusCode::UNAUTHORIZED {
                if retried {
                    return Err(FritzError::Authentication(format!(
                        "POST {}: credentials rejected",
                        uri
                    )));
                }
                let header = response
                    .headers()
                    .get(WWW_AUTHENTICATE)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        FritzError::Authentication(format!("POST {}: 401 without challenge", uri))
                    })?;
                let challenge = DigestChallenge::parse(header)?;
                debug!("Received digest challenge for realm {}", challenge.realm);
                authorization = Some(self.authorization(&challenge, &uri));
                *self.challenge.lock() = Some(challenge);
                retried = true;
                continue;
            }

            let body = response.text().await?;
            if !status.is_success() {
                if let Some(fault) = soap::parse_fault(&body) {
                    return Err(fault);
                }
                return Err(FritzError::Transport(format!("POST {}: {}", uri, status)));
            }
            return soap::parse_response(&body);
        }
    }

    fn authorization(&self, challenge: &DigestChallenge, uri: &str) -> String {
        let credentials = self.credentials.read();
        challenge.authorization(
            &credentials.username,
            &credentials.password,
            HTTP_METHOD,
            uri,
        )
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        self.base_url
            .read()
            .join(path)
            .map_err(|e| FritzError::Protocol(format!("bad URL {}: {}", path, e)))
    }
}

/// Check and coerce caller arguments against the action's declared inputs.
/// Inputs are emitted in declaration order.
fn encode_arguments(
    service: &ServiceDescriptor,
    action: &ActionDescriptor,
    args: &Arguments,
) -> Result<Vec<(String, String)>> {
    let mut wire = Vec::new();
    for input in action.inputs() {
        let value = args.get(&input.name).ok_or_else(|| FritzError::MissingArgument {
            action: action.name.clone(),
            argument: input.name.clone(),
        })?;
        let data_type = service
            .data_type(&input.related_variable)
            .cloned()
            .unwrap_or_else(|| DataType::Unknown(String::new()));
        wire.push((input.name.clone(), value::to_wire(&input.name, value, &data_type)?));
    }

    for key in args.keys() {
        if !action.inputs().any(|a| a.name == *key) {
            debug!("Dropping undeclared argument {} for {}", key, action.name);
        }
    }
    Ok(wire)
}

/// Pick each declared output out of the response and type it.
fn decode_results(service: &ServiceDescriptor, action: &ActionDescriptor, response: &Tree) -> Results {
    let mut results = Results::new();
    for output in action.outputs() {
        let Some(node) = response.find(&output.name) else {
            continue;
        };
        let data_type = service.data_type(&output.related_variable);
        if data_type.is_none() {
            debug!("No data type for: {}", output.related_variable);
        }
        results.insert(
            output.name.clone(),
            value::coerce_output(node, data_type, &service.data_types),
        );
    }
    results
}

async fn fetch_document(http: &Client, url: &Url) -> Result<Tree> {
    let response = http.get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(FritzError::Transport(format!("GET {}: {}", url.path(), status)));
    }
    let body = response.text().await?;
    Tree::parse(&body)
}
