//! Push channel over a real socket: handshake, greeting and live status events

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use fatura_api_http::rate_limiter::OwnerRateLimiter;
use fatura_api_http::{ApiServer, AppState, ServerConfig};
use fatura_core::application::{
    shutdown_channel, ConnectionRegistry, JobQueue, NotificationDispatcher, OrchestratorConfig,
    OrchestratorDeps, ProcessingOrchestrator, QueueConfig, ShutdownSender,
};
use fatura_core::port::id_provider::UuidProvider;
use fatura_core::port::invoice_repository::mocks::InMemoryInvoiceRepository;
use fatura_core::port::object_store::mocks::InMemoryObjectStore;
use fatura_core::port::package_repository::mocks::InMemoryPackageRepository;
use fatura_core::port::parse_service::mocks::MockParseService;
use fatura_core::port::time_provider::SystemTimeProvider;
use fatura_core::port::{CredentialVerifier, TimeProvider};
use fatura_infra_services::JwtCredentialVerifier;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

const SECRET: &str = "integration-secret";

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

struct RunningServer {
    addr: SocketAddr,
    verifier: Arc<JwtCredentialVerifier>,
    registry: Arc<ConnectionRegistry>,
    shutdown: ShutdownSender,
}

impl RunningServer {
    async fn start() -> Self {
        let clock: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
        let verifier = Arc::new(JwtCredentialVerifier::new(SECRET, clock.clone()));
        let dyn_verifier: Arc<dyn CredentialVerifier> = verifier.clone();
        let registry = Arc::new(ConnectionRegistry::new(dyn_verifier.clone()));
        let dispatcher = Arc::new(NotificationDispatcher::new(registry.clone(), clock.clone()));

        let queue = JobQueue::new(QueueConfig {
            max_retries: 1,
            backoff: Duration::from_millis(10),
        });
        let deps = OrchestratorDeps {
            invoices: Arc::new(InMemoryInvoiceRepository::new()),
            packages: Arc::new(InMemoryPackageRepository::new()),
            store: Arc::new(InMemoryObjectStore::new()),
            parser: Arc::new(MockParseService::new_success()),
            thumbnails: None,
            notifier: dispatcher.clone(),
            time_provider: clock.clone(),
            id_provider: Arc::new(UuidProvider),
        };
        let orchestrator = Arc::new(ProcessingOrchestrator::new(
            deps,
            queue,
            OrchestratorConfig::default(),
        ));

        let state = AppState::new(
            orchestrator,
            dispatcher,
            dyn_verifier,
            OwnerRateLimiter::default(),
            clock,
        );
        let server = ApiServer::new(
            ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                ..ServerConfig::default()
            },
            state,
        );
        let listener = server.bind().await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown, token) = shutdown_channel();
        tokio::spawn(server.serve(listener, token));

        Self {
            addr,
            verifier,
            registry,
            shutdown,
        }
    }

    fn token(&self, owner_id: &str) -> String {
        self.verifier
            .issue(owner_id, Duration::from_secs(3600))
            .unwrap()
    }

    async fn connect(&self, token: &str, user_id: &str) -> Socket {
        let url = format!("ws://{}/ws?token={}&userId={}", self.addr, token, user_id);
        let (socket, _) = connect_async(url.as_str()).await.unwrap();
        socket
    }

    async fn wait_for_connections(&self, expected: usize) {
        for _ in 0..100 {
            if self.registry.connection_count() == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!(
            "expected {} connections, have {}",
            expected,
            self.registry.connection_count()
        );
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown.shutdown();
    }
}

async fn next_json(socket: &mut Socket) -> Value {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for a push message")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn expect_policy_close(mut socket: Socket) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for close")
            .expect("socket ended without a close frame")
            .unwrap();
        if let Message::Close(Some(close)) = frame {
            assert_eq!(u16::from(close.code), 1008);
            return close.reason.to_string();
        }
    }
}

#[tokio::test]
async fn test_handshake_rejections_close_with_policy_violation() {
    let server = RunningServer::start().await;

    let socket = server.connect("not-a-jwt", "user-1").await;
    assert_eq!(
        expect_policy_close(socket).await,
        "Token verification failed"
    );

    let token = server.token("user-1");
    let socket = server.connect(&token, "user-2").await;
    assert_eq!(
        expect_policy_close(socket).await,
        "Token does not belong to the claimed user"
    );

    let url = format!("ws://{}/ws", server.addr);
    let (socket, _) = connect_async(url.as_str()).await.unwrap();
    assert_eq!(expect_policy_close(socket).await, "Missing token or userId");

    assert_eq!(server.registry.connection_count(), 0);
}

#[tokio::test]
async fn test_connected_greeting_then_status_updates() {
    let server = RunningServer::start().await;
    let token = server.token("user-1");

    let mut socket = server.connect(&token, "user-1").await;
    let greeting = next_json(&mut socket).await;
    assert_eq!(greeting["type"], "connected");
    assert_eq!(greeting["userId"], "user-1");
    assert!(greeting["timestamp"].as_str().unwrap().ends_with('Z'));

    socket
        .send(Message::Text(
            json!({"type": "listen_all_invoices"}).to_string(),
        ))
        .await
        .unwrap();

    let form = reqwest::multipart::Form::new().part(
        "invoice",
        reqwest::multipart::Part::bytes(b"%PDF-1.4 push".to_vec())
            .file_name("A.pdf")
            .mime_str("application/pdf")
            .unwrap(),
    );
    let response = reqwest::Client::new()
        .post(format!("http://{}/api/invoice/scan-background", server.addr))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 202);
    let body: Value = response.json().await.unwrap();
    let invoice_id = body["invoiceId"].as_str().unwrap().to_string();

    let mut statuses = Vec::new();
    while statuses.len() < 3 {
        let event = next_json(&mut socket).await;
        assert_eq!(event["type"], "invoice_status_update");
        assert_eq!(event["invoiceId"], invoice_id.as_str());
        assert!(event["packageId"].is_null());
        statuses.push(event["status"].as_str().unwrap().to_string());
    }
    assert_eq!(statuses, vec!["queued", "processing", "processed"]);
}

#[tokio::test]
async fn test_events_fan_out_to_every_connection_of_the_owner() {
    let server = RunningServer::start().await;
    let token = server.token("user-1");

    let mut first = server.connect(&token, "user-1").await;
    let mut second = server.connect(&token, "user-1").await;
    next_json(&mut first).await;
    next_json(&mut second).await;
    server.wait_for_connections(2).await;

    let other_token = server.token("user-2");
    let mut other = server.connect(&other_token, "user-2").await;
    next_json(&mut other).await;

    let form = reqwest::multipart::Form::new().part(
        "invoice",
        reqwest::multipart::Part::bytes(b"%PDF-1.4 fan-out".to_vec()).file_name("B.pdf"),
    );
    reqwest::Client::new()
        .post(format!("http://{}/api/invoice/scan", server.addr))
        .bearer_auth(&token)
        .multipart(form)
        .send()
        .await
        .unwrap();

    assert_eq!(next_json(&mut first).await["status"], "queued");
    assert_eq!(next_json(&mut second).await["status"], "queued");

    let quiet = tokio::time::timeout(Duration::from_millis(200), other.next()).await;
    assert!(quiet.is_err(), "another owner must not receive events");

    first.close(None).await.unwrap();
    server.wait_for_connections(2).await;
}
