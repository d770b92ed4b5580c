//! SOAP envelope construction and response unpacking for TR-064 calls.

use crate::error::{FritzError, Result};
use crate::xml::Tree;
use quick_xml::escape::escape;

const ENVELOPE_NS: &str = "http://schemas.xmlsoap.org/soap/envelope/";
const ENCODING_NS: &str = "http://schemas.xmlsoap.org/soap/encoding/";

pub const CONTENT_TYPE: &str = "text/xml; charset=\"utf-8\"";

/// A serialized request for one action of one service.
#[derive(Debug, Clone)]
pub struct SoapRequest {
    /// Value of the `SOAPACTION` header
    pub action_header: String,
    /// Request body
    pub body: String,
}

impl SoapRequest {
    /// Build the envelope. Arguments are written in the given order with
    /// their wire text escaped.
    pub fn new(service_type: &str, action: &str, args: &[(String, String)]) -> Self {
        let mut body = String::with_capacity(256);
        body.push_str("<?xml version=\"1.0\"?>");
        body.push_str(&format!(
            "<s:Envelope xmlns:s=\"{}\" s:encodingStyle=\"{}\">",
            ENVELOPE_NS, ENCODING_NS
        ));
        body.push_str("<s:Body>");
        body.push_str(&format!(
            "<u:{} xmlns:u=\"{}\">",
            action,
            escape(service_type)
        ));
        for (name, value) in args {
            body.push_str(&format!("<{}>{}</{}>", name, escape(value.as_str()), name));
        }
        body.push_str(&format!("</u:{}>", action));
        body.push_str("</s:Body></s:Envelope>");

        Self {
            action_header: format!("\"{}#{}\"", service_type, action),
            body,
        }
    }
}

/// Extracts a SOAP fault from a failed response body, if it carries one.
pub fn parse_fault(body: &str) -> Option<FritzError> {
    let tree = Tree::parse(body).ok()?;
    let error = tree.find("UPnPError")?;
    let code = error
        .get("errorCode")
        .and_then(Tree::as_str)
        .and_then(|c| c.trim().parse::<u32>().ok())?;
    let description = error
        .get("errorDescription")
        .and_then(Tree::as_str)
        .unwrap_or("")
        .to_string();
    Some(FritzError::ActionFailed { code, description })
}

/// Parses a successful response body.
pub fn parse_response(body: &str) -> Result<Tree> {
    let tree = Tree::parse(body)?;
    if tree.find("s:Body").is_none() && tree.find("Body").is_none() {
        return Err(FritzError::Protocol("response has no SOAP body".to_string()));
    }
    Ok(tree)
}
