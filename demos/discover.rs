/**
 * Discovery Example
 *
 * Searches the local network for FRITZ!Box gateways, connects to the one
 * found and lists its smart home devices.
 *
 * Set FRITZ_PASSWORD (and optionally FRITZ_USER, FRITZ_HOST) before running:
 *   RUST_LOG=debug FRITZ_PASSWORD=secret cargo run --example discover
 */
use fritzlink::{Config, Gateway, Scanner};
use std::env;

#[tokio::main]
async fn main() {
    env_logger::init();

    println!("--- fritzlink - Discovery ---");

    let scanner = Scanner::new();
    match scanner.scan().await {
        Ok(gateways) if gateways.is_empty() => println!("[INFO] No FRITZ!Box found"),
        Ok(gateways) => {
            for (i, url) in gateways.iter().enumerate() {
                println!("[{}] Found gateway: {}", i + 1, url);
            }
        }
        Err(e) => {
            println!("[ERROR] Scan failed: {}", e);
            return;
        }
    }

    let mut config = Config::new().with_credentials(
        env::var("FRITZ_USER").unwrap_or_default(),
        env::var("FRITZ_PASSWORD").unwrap_or_default(),
    );
    if let Ok(host) = env::var("FRITZ_HOST") {
        config = config.with_host(host);
    }

    let gateway = match Gateway::connect(config).await {
        Ok(gateway) => gateway,
        Err(e) => {
            println!("[ERROR] Connect failed: {}", e);
            return;
        }
    };

    let device = gateway.rpc().device();
    println!(
        "[INFO] Connected to {} ({}, firmware {}) as '{}'",
        device.display_name,
        device.model,
        device.firmware,
        gateway.username()
    );

    match gateway.smart_home_devices().await {
        Ok(devices) => {
            for d in devices {
                let services: Vec<String> = d.classification.services.iter().map(|s| s.to_string()).collect();
                println!("  {:<20} {:<16} {}", d.name, d.identifier, services.join(", "));
            }
        }
        Err(e) => println!("[ERROR] Reading smart home state failed: {}", e),
    }
}
