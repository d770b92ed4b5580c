//! In-process HTTP responder standing in for a FRITZ!Box.

#![allow(dead_code)]

use parking_lot::Mutex;
use reqwest::Url;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// One received request.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: String,
    pub path: String,
    pub query: Option<String>,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn query_param(&self, key: &str) -> Option<String> {
        self.query.as_deref()?.split('&').find_map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (k == key).then(|| urlencoding::decode(v).map(|v| v.into_owned()).unwrap_or_default())
        })
    }
}

/// A canned answer.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Reply {
    pub fn ok<B: Into<String>>(body: B) -> Self {
        Self {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/xml".to_string())],
            body: body.into(),
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body<B: Into<String>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }
}

type Handler = Arc<dyn Fn(&Request) -> Reply + Send + Sync>;

pub struct MockServer {
    port: u16,
    requests: Arc<Mutex<Vec<Request>>>,
}

impl MockServer {
    /// Serve every connection with `handler` until the test ends.
    pub async fn start<F>(handler: F) -> Self
    where
        F: Fn(&Request) -> Reply + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let requests = Arc::new(Mutex::new(Vec::new()));
        let handler: Handler = Arc::new(handler);

        let log = requests.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let handler = handler.clone();
                let log = log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, handler, log).await;
                });
            }
        });

        Self { port, requests }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> String {
        format!("127.0.0.1:{}", self.port)
    }

    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://127.0.0.1:{}{}", self.port, path)).unwrap()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }

    /// Number of requests received for `path`.
    pub fn hits(&self, path: &str) -> usize {
        self.requests.lock().iter().filter(|r| r.path == path).count()
    }
}

async fn serve(mut stream: TcpStream, handler: Handler, log: Arc<Mutex<Vec<Request>>>) -> std::io::Result<()> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let target = parts.next().unwrap_or_default().to_string();
    let (path, query) = match target.split_once('?') {
        Some((p, q)) => (p.to_string(), Some(q.to_string())),
        None => (target, None),
    };
    let headers: Vec<(String, String)> = lines
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let length = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    while buf.len() < header_end + length {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    let body = String::from_utf8_lossy(&buf[header_end..]).to_string();

    let request = Request {
        method,
        path,
        query,
        headers,
        body,
    };
    let reply = handler(&request);
    log.lock().push(request);

    let mut out = format!("HTTP/1.1 {} Mock\r\n", reply.status);
    for (name, value) in &reply.headers {
        out.push_str(&format!("{}: {}\r\n", name, value));
    }
    out.push_str(&format!(
        "Content-Length: {}\r\nConnection: close\r\n\r\n",
        reply.body.len()
    ));
    out.push_str(&reply.body);
    stream.write_all(out.as_bytes()).await?;
    stream.shutdown().await
}

pub fn envelope(action: &str, service: &str, inner: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\" \
         s:encodingStyle=\"http://schemas.xmlsoap.org/soap/encoding/\">\
         <s:Body><u:{action}Response xmlns:u=\"{service}\">{inner}</u:{action}Response>\
         </s:Body></s:Envelope>"
    )
}

pub fn fault(code: u32, description: &str) -> String {
    format!(
        "<?xml version=\"1.0\"?>\
         <s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\">\
         <s:Body><s:Fault><faultcode>s:Client</faultcode><faultstring>UPnPError</faultstring>\
         <detail><UPnPError xmlns=\"urn:dslforum-org:control-1-0\">\
         <errorCode>{code}</errorCode><errorDescription>{description}</errorDescription>\
         </UPnPError></detail></s:Fault></s:Body></s:Envelope>"
    )
}

pub const DEVICE_INFO: &str = "urn:dslforum-org:service:DeviceInfo:1";
pub const LAN_CONFIG_SECURITY: &str = "urn:dslforum-org:service:LANConfigSecurity:1";

pub const ROOT_DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:dslforum-org:device-1-0">
<specVersion><major>1</major><minor>0</minor></specVersion>
<systemVersion><HW>226</HW><Major>154</Major><Minor>7</Minor><Patch>57</Patch><Display>154.07.57</Display></systemVersion>
<device>
<deviceType>urn:dslforum-org:device:InternetGatewayDevice:1</deviceType>
<friendlyName>FRITZ!Box 7590</friendlyName>
<manufacturer>AVM</manufacturer>
<modelName>FRITZ!Box 7590</modelName>
<serialNumber>3810D5A1B2C3</serialNumber>
<serviceList>
<service>
<serviceType>urn:dslforum-org:service:DeviceInfo:1</serviceType>
<controlURL>/upnp/control/deviceinfo</controlURL>
<SCPDURL>/deviceinfoSCPD.xml</SCPDURL>
</service>
<service>
<serviceType>urn:dslforum-org:service:LANConfigSecurity:1</serviceType>
<controlURL>/upnp/control/lanconfigsecurity</controlURL>
<SCPDURL>/lanconfigsecuritySCPD.xml</SCPDURL>
</service>
</serviceList>
</device>
</root>"#;

pub const DEVICE_INFO_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
<actionList>
<action>
<name>GetInfo</name>
<argumentList>
<argument><name>NewModelName</name><direction>out</direction><relatedStateVariable>ModelName</relatedStateVariable></argument>
<argument><name>NewSoftwareVersion</name><direction>out</direction><relatedStateVariable>SoftwareVersion</relatedStateVariable></argument>
<argument><name>NewUpTime</name><direction>out</direction><relatedStateVariable>UpTime</relatedStateVariable></argument>
</argumentList>
</action>
<action>
<name>GetSecurityPort</name>
<argumentList>
<argument><name>NewSecurityPort</name><direction>out</direction><relatedStateVariable>SecurityPort</relatedStateVariable></argument>
</argumentList>
</action>
<action>
<name>SetProvisioningCode</name>
<argumentList>
<argument><name>NewProvisioningCode</name><direction>in</direction><relatedStateVariable>ProvisioningCode</relatedStateVariable></argument>
</argumentList>
</action>
</actionList>
<serviceStateTable>
<stateVariable sendEvents="no"><name>ModelName</name><dataType>string</dataType></stateVariable>
<stateVariable sendEvents="no"><name>SoftwareVersion</name><dataType>string</dataType></stateVariable>
<stateVariable sendEvents="no"><name>UpTime</name><dataType>ui4</dataType></stateVariable>
<stateVariable sendEvents="no"><name>SecurityPort</name><dataType>ui2</dataType></stateVariable>
<stateVariable sendEvents="no"><name>ProvisioningCode</name><dataType>string</dataType></stateVariable>
</serviceStateTable>
</scpd>"#;

pub const LAN_CONFIG_SECURITY_SCPD: &str = r#"<?xml version="1.0"?>
<scpd xmlns="urn:dslforum-org:service-1-0">
<actionList>
<action>
<name>X_AVM-DE_GetAnonymousLogin</name>
<argumentList>
<argument><name>NewX_AVM-DE_AnonymousLoginEnabled</name><direction>out</direction><relatedStateVariable>X_AVM-DE_AnonymousLoginEnabled</relatedStateVariable></argument>
</argumentList>
</action>
<action>
<name>X_AVM-DE_GetCurrentUser</name>
<argumentList>
<argument><name>NewX_AVM-DE_CurrentUsername</name><direction>out</direction><relatedStateVariable>X_AVM-DE_CurrentUsername</relatedStateVariable></argument>
<argument><name>NewX_AVM-DE_CurrentUserRights</name><direction>out</direction><relatedStateVariable>X_AVM-DE_CurrentUserRights</relatedStateVariable></argument>
</argumentList>
</action>
</actionList>
<serviceStateTable>
<stateVariable sendEvents="no"><name>X_AVM-DE_AnonymousLoginEnabled</name><dataType>boolean</dataType></stateVariable>
<stateVariable sendEvents="no"><name>X_AVM-DE_CurrentUsername</name><dataType>string</dataType></stateVariable>
<stateVariable sendEvents="no"><name>X_AVM-DE_CurrentUserRights</name><dataType>string</dataType></stateVariable>
</serviceStateTable>
</scpd>"#;

/// Answers the description documents; everything else goes to `control`.
pub fn with_descriptions<F>(control: F) -> impl Fn(&Request) -> Reply + Send + Sync + 'static
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    move |req: &Request| match req.path.as_str() {
        "/tr64desc.xml" => Reply::ok(ROOT_DESCRIPTION),
        "/deviceinfoSCPD.xml" => Reply::ok(DEVICE_INFO_SCPD),
        "/lanconfigsecuritySCPD.xml" => Reply::ok(LAN_CONFIG_SECURITY_SCPD),
        _ => control(req),
    }
}

pub const REALM: &str = "F!Box SOAP-Auth";
pub const NONCE: &str = "0123456789ABCDEF";

pub fn digest_challenge() -> Reply {
    Reply::status(401).with_header(
        "WWW-Authenticate",
        &format!("Digest realm=\"{REALM}\", nonce=\"{NONCE}\", algorithm=MD5, qop=\"auth\""),
    )
}
