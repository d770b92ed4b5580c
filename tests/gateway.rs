mod common;

use common::*;
use fritzlink::{Config, FritzError, Gateway, TlsMode};

/// Answers by SOAP action once any digest answer is presented.
fn control(anonymous: bool) -> impl Fn(&Request) -> Reply + Send + Sync + 'static {
    move |req: &Request| {
        let Some(auth) = req.header("Authorization") else {
            return digest_challenge();
        };
        let action = req.header("SOAPACTION").unwrap_or_default().trim_matches('"').to_string();
        match action.split_once('#') {
            Some((DEVICE_INFO, "GetSecurityPort")) => Reply::ok(envelope(
                "GetSecurityPort",
                DEVICE_INFO,
                "<NewSecurityPort>49443</NewSecurityPort>",
            )),
            Some((LAN_CONFIG_SECURITY, "X_AVM-DE_GetAnonymousLogin")) => Reply::ok(envelope(
                "X_AVM-DE_GetAnonymousLogin",
                LAN_CONFIG_SECURITY,
                if anonymous {
                    "<NewX_AVM-DE_AnonymousLoginEnabled>1</NewX_AVM-DE_AnonymousLoginEnabled>"
                } else {
                    "<NewX_AVM-DE_AnonymousLoginEnabled>0</NewX_AVM-DE_AnonymousLoginEnabled>"
                },
            )),
            Some((LAN_CONFIG_SECURITY, "X_AVM-DE_GetCurrentUser"))
                if auth.starts_with("Digest username=\"dslf-config\"") =>
            {
                Reply::ok(envelope(
                    "X_AVM-DE_GetCurrentUser",
                    LAN_CONFIG_SECURITY,
                    "<NewX_AVM-DE_CurrentUsername>fritz1234</NewX_AVM-DE_CurrentUsername>\
                     <NewX_AVM-DE_CurrentUserRights>&lt;rights/&gt;</NewX_AVM-DE_CurrentUserRights>",
                ))
            }
            _ => Reply::status(500).with_body(fault(401, "Invalid Action")),
        }
    }
}

#[tokio::test]
async fn test_password_only_adopts_current_user() {
    let server = MockServer::start(with_descriptions(control(false))).await;
    let config = Config::new()
        .with_host(server.host())
        .with_credentials("", "secret");

    let gateway = Gateway::connect(config).await.unwrap();
    assert_eq!(gateway.username(), "fritz1234");
    assert_eq!(gateway.rpc().device().serial, "3810D5A1B2C3");
    // No smart home service in this description
    assert!(gateway.command().is_none());
    assert!(gateway.smart_home_devices().await.unwrap().is_empty());

    // Later calls authenticate as the adopted user
    gateway.rpc().send(DEVICE_INFO, "GetSecurityPort", None).await.unwrap();
    let last = server.requests().pop().unwrap();
    assert!(last.header("Authorization").unwrap().starts_with("Digest username=\"fritz1234\""));
}

#[tokio::test]
async fn test_anonymous_access_requires_permission() {
    let server = MockServer::start(with_descriptions(control(false))).await;
    let err = Gateway::connect(Config::new().with_host(server.host()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, FritzError::Authentication(_)));

    let server = MockServer::start(with_descriptions(control(true))).await;
    let gateway = Gateway::connect(Config::new().with_host(server.host()))
        .await
        .unwrap();
    assert_eq!(gateway.username(), "");
}

#[tokio::test]
async fn test_fixed_security_port() {
    let server = MockServer::start(with_descriptions(control(false))).await;
    let config = Config::new()
        .with_host(server.host())
        .with_credentials("admin", "secret")
        .with_tls(TlsMode::Port(49443));

    let gateway = Gateway::connect(config).await.unwrap();
    assert_eq!(gateway.rpc().base_url().as_str(), "https://127.0.0.1:49443/");
    assert_eq!(gateway.username(), "admin");
}

#[tokio::test]
async fn test_security_port_from_appliance() {
    let server = MockServer::start(with_descriptions(control(false))).await;
    let config = Config::new()
        .with_host(server.host())
        .with_credentials("admin", "secret")
        .with_tls(TlsMode::Auto);

    let gateway = Gateway::connect(config).await.unwrap();
    assert_eq!(gateway.rpc().base_url().as_str(), "https://127.0.0.1:49443/");
}
