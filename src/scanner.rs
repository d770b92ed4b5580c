//! SSDP discovery of FRITZ!Box gateways.
//! Sends one M-SEARCH to the UPnP multicast group and keeps the locations of
//! gateways that act as mesh master or standalone box.

use crate::error::{FritzError, Result};
use crate::xml::Tree;
use futures_util::future::join_all;
use log::{debug, info, warn};
use reqwest::{Client, Url};
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use tokio::net::UdpSocket;
use tokio::time::{Duration, Instant};

const SSDP_GROUP: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);
const SSDP_PORT: u16 = 1900;
const MX_SECS: u64 = 5;

/// Search target of TR-064 capable gateways
pub const GATEWAY_SEARCH_TARGET: &str = "urn:dslforum-org:device:InternetGatewayDevice:1";

/// Box roles that make a gateway the authoritative device
const PRIMARY_ROLES: &[&str] = &["mesh_master", "mesh_master_no_trusted", "cable_retail"];

const BOX_INFO_PATH: &str = "/jason_boxinfo.xml";

/// Scanner finds FRITZ!Box gateways on the local network.
///
/// Secondary mesh nodes answer the search too; they are filtered out by their
/// role flags so every gateway is reported once.
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Collection window after the search is sent
    pub timeout: Duration,
    /// Local address to bind to
    pub bind_addr: SocketAddrV4,
    /// SSDP search target (ST)
    pub search_target: String,
    http: Client,
}

impl Default for Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Scanner {
    /// Create a new Scanner with default settings.
    pub fn new() -> Self {
        Self {
            timeout: Duration::from_secs(MX_SECS),
            bind_addr: SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0),
            search_target: GATEWAY_SEARCH_TARGET.to_string(),
            http: Client::new(),
        }
    }

    /// Set the collection window.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the local address to bind to.
    pub fn with_bind_addr(mut self, addr: SocketAddrV4) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the search target.
    pub fn with_search_target<S: Into<String>>(mut self, target: S) -> Self {
        self.search_target = target.into();
        self
    }

    /// Use this HTTP client for box-info requests.
    pub fn with_http_client(mut self, http: Client) -> Self {
        self.http = http;
        self
    }

    /// Search the network and return the description URLs of all primary
    /// gateways. An empty list means nothing was found.
    pub async fn scan(&self) -> Result<Vec<Url>> {
        info!(
            "Starting SSDP search for {} ({}s)...",
            self.search_target,
            self.timeout.as_secs()
        );

        let locations = self.collect_locations().await?;
        debug!("{} candidate location(s)", locations.len());

        let checks = locations.iter().map(|url| self.is_primary(url));
        let results = join_all(checks).await;

        let gateways: Vec<Url> = locations
            .into_iter()
            .zip(results)
            .filter_map(|(url, primary)| match primary {
                Ok(true) => Some(url),
                Ok(false) => {
                    debug!("Skipping secondary node {}", url);
                    None
                }
                Err(e) => {
                    warn!("Skipping {}: {}", url, e);
                    None
                }
            })
            .collect();

        info!("Scan finished. Found {} gateway(s).", gateways.len());
        Ok(gateways)
    }

    /// Like [`scan`](Self::scan), but requires exactly one gateway.
    pub async fn scan_one(&self) -> Result<Url> {
        let mut gateways = self.scan().await?;
        match gateways.len() {
            0 => Err(FritzError::DeviceNotFound("no FRITZ!Box found".to_string())),
            1 => Ok(gateways.remove(0)),
            n => {
                let hosts: Vec<&str> = gateways.iter().filter_map(|u| u.host_str()).collect();
                Err(FritzError::DeviceNotFound(format!(
                    "{} devices found, configure one of: {}",
                    n,
                    hosts.join(", ")
                )))
            }
        }
    }

    /// Send the search and gather distinct locations until the window closes.
    async fn collect_locations(&self) -> Result<Vec<Url>> {
        let socket = self.create_socket()?;
        let request = search_request(&self.search_target);
        let group = SocketAddr::V4(SocketAddrV4::new(SSDP_GROUP, SSDP_PORT));

        socket
            .send_to(request.as_bytes(), group)
            .await
            .map_err(|e| FritzError::Discovery(format!("send: {}", e)))?;
        debug!("Sent M-SEARCH to {}", group);

        self.receive_replies(&socket, Instant::now() + self.timeout).await
    }

    /// Read replies until `deadline`, keeping each matching location once.
    async fn receive_replies(&self, socket: &UdpSocket, deadline: Instant) -> Result<Vec<Url>> {
        let mut locations: Vec<Url> = Vec::new();
        let mut buf = vec![0u8; 4096];

        loop {
            let received = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => break,
                res = socket.recv_from(&mut buf) => res,
            };
            let (len, addr) =
                received.map_err(|e| FritzError::Discovery(format!("receive: {}", e)))?;

            let message = String::from_utf8_lossy(&buf[..len]);
            let Some(location) = parse_reply(&message, &self.search_target) else {
                continue;
            };
            match Url::parse(&location) {
                Ok(url) if !locations.contains(&url) => {
                    debug!("Gateway reply from {}: {}", addr, url);
                    locations.push(url);
                }
                Ok(_) => {}
                Err(e) => warn!("Ignoring bad location {} from {}: {}", location, addr, e),
            }
        }

        Ok(locations)
    }

    /// Create the UDP socket used for one search.
    fn create_socket(&self) -> Result<UdpSocket> {
        let discovery = |e: std::io::Error| FritzError::Discovery(format!("socket: {}", e));

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP)).map_err(discovery)?;
        if let Err(e) = socket.set_reuse_address(true) {
            warn!("Failed to set reuse_address: {}", e);
        }
        socket.set_multicast_ttl_v4(2).map_err(discovery)?;
        socket
            .bind(&SockAddr::from(self.bind_addr))
            .map_err(discovery)?;
        socket.set_nonblocking(true).map_err(discovery)?;

        let std_socket: std::net::UdpSocket = socket.into();
        UdpSocket::from_std(std_socket).map_err(discovery)
    }

    /// Check the role flags in the box-info document.
    async fn is_primary(&self, location: &Url) -> Result<bool> {
        let host = location
            .host_str()
            .ok_or_else(|| FritzError::Protocol(format!("no host in {}", location)))?;
        let url = format!("http://{}{}", host, BOX_INFO_PATH);

        let response = self.http.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(FritzError::Transport(format!(
                "error getting box info: {}",
                response.status()
            )));
        }
        let body = response.text().await?;
        Ok(has_primary_role(&Tree::parse(&body)?))
    }
}

/// Build the M-SEARCH datagram.
fn search_request(search_target: &str) -> String {
    [
        "M-SEARCH * HTTP/1.1".to_string(),
        format!("HOST: {}:{}", SSDP_GROUP, SSDP_PORT),
        "MAN: \"ssdp:discover\"".to_string(),
        format!("MX: {}", MX_SECS),
        format!("ST: {}", search_target),
        String::new(),
        String::new(),
    ]
    .join("\r\n")
}

/// Extract the location from a search reply. Search requests, announcements
/// and replies for other device classes yield `None`.
fn parse_reply(message: &str, search_target: &str) -> Option<String> {
    if message.starts_with("M-SEARCH") || message.starts_with("NOTIFY") {
        return None;
    }

    let mut target_matches = false;
    let mut location = None;
    for line in message.lines() {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.trim().eq_ignore_ascii_case("ST") {
            target_matches = value == search_target;
        } else if name.trim().eq_ignore_ascii_case("LOCATION") && !value.is_empty() {
            location = Some(value.to_string());
        }
    }

    if target_matches { location } else { None }
}

fn has_primary_role(box_info: &Tree) -> bool {
    let Some(flags) = box_info.path(&["j:BoxInfo", "j:Flag"]) else {
        return false;
    };
    flags
        .as_list()
        .iter()
        .filter_map(Tree::as_str)
        .any(|flag| PRIMARY_ROLES.contains(&flag.trim()))
}
