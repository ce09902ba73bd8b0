//! Proxy integration tests
//!
//! Tests that authenticated sessions are forwarded to a plain TCP upstream.

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;

use mtlssh::cert::{new_ca, new_client_from_ca, new_server_from_ca, with_common_name, with_dns_names};
use mtlssh::endpoint::{Client, ClientOption, ServerState};
use mtlssh::proxy::new_proxy_server;
use mtlssh::tlsconf::{self, TrustOption};

const WAIT: Duration = Duration::from_secs(10);

/// Plain TCP echo server on an ephemeral port.
async fn echo_upstream() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut rd, mut wr) = stream.split();
                let _ = tokio::io::copy(&mut rd, &mut wr).await;
            });
        }
    });
    addr
}

/// Test a full round trip through the proxy
#[tokio::test]
async fn test_proxy_forwards_to_upstream() {
    // GIVEN: CA material, an echo upstream and a proxy in front of it
    let ca = new_ca([with_common_name("ca")]).unwrap();
    let server = new_server_from_ca(
        ca.key_pem.as_bytes(),
        ca.cert_pem.as_bytes(),
        [with_common_name("server.name"), with_dns_names(["server.name"])],
    )
    .unwrap();
    let client = new_client_from_ca(
        ca.key_pem.as_bytes(),
        ca.cert_pem.as_bytes(),
        [with_common_name("client.name")],
    )
    .unwrap();

    let upstream = echo_upstream().await;
    let proxy_trust = tlsconf::build([
        TrustOption::ClientCaPem(ca.cert_pem.clone().into_bytes()),
        TrustOption::IdentityPem {
            cert_pem: server.cert_pem.into_bytes(),
            key_pem: server.key_pem.into_bytes(),
        },
        TrustOption::MutualAuthentication,
    ])
    .unwrap();
    let mut proxy = new_proxy_server("127.0.0.1:0", upstream, proxy_trust).unwrap();
    let addr = proxy.start().await.unwrap();

    // WHEN: an authenticated client writes through the proxy
    let client_trust = tlsconf::build([
        TrustOption::RootCaPem(ca.cert_pem.into_bytes()),
        TrustOption::IdentityPem {
            cert_pem: client.cert_pem.into_bytes(),
            key_pem: client.key_pem.into_bytes(),
        },
    ])
    .unwrap();
    let client = Client::new([
        ClientOption::Addr(addr.to_string()),
        ClientOption::Trust(client_trust),
        ClientOption::ServerName("server.name".into()),
    ])
    .unwrap();
    let mut session = client.connect().await.unwrap();
    session.write_all(b"ping").await.unwrap();
    session.flush().await.unwrap();

    // THEN: the upstream echo comes back
    let mut buf = [0u8; 4];
    timeout(WAIT, session.read_exact(&mut buf)).await.unwrap().unwrap();
    assert_eq!(&buf, b"ping");

    drop(session);
    proxy.shutdown().await;
    assert_eq!(proxy.state(), ServerState::Closed);
}
