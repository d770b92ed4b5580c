//! # fritzlink
//!
//! Asynchronous client for AVM FRITZ!Box routers on the local network:
//! SSDP discovery, the self-describing TR-064 SOAP interface and the AHA
//! smart home HTTP interface.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fritzlink::{Config, Gateway};
//!
//! # async fn run() -> fritzlink::Result<()> {
//! let gateway = Gateway::connect(Config::new().with_credentials("", "secret")).await?;
//! let _info = gateway
//!     .rpc()
//!     .send("urn:dslforum-org:service:DeviceInfo:1", "GetInfo", None)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
#[macro_use]
mod macros;
pub mod capability;
pub mod catalog;
pub mod command;
pub mod config;
pub mod crypto;
pub mod debounce;
pub mod error;
pub mod gateway;
pub mod palette;
pub mod rpc;
pub mod scanner;
pub mod session;
pub mod soap;
pub mod value;
pub mod xml;

pub use command::{CommandClient, CommandResponse};
pub use config::{Config, Credentials, TlsMode};
pub use debounce::Debouncer;
pub use error::{FritzError, Result};
pub use gateway::Gateway;
pub use palette::{ColorMatcher, ColorPoint, Hsv};
pub use rpc::{Arguments, Results, RpcClient};
pub use scanner::Scanner;
pub use value::Value;
pub use xml::Tree;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn version() -> &'static str {
    VERSION
}
