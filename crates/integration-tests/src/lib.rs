//! Harness for end-to-end tests: a turnstile server on an ephemeral port in front of a
//! scripted upstream service.

pub mod upstream;

use std::{net::SocketAddr, time::Duration};

use config::{Config, UpstreamConfig};
use server::ServeConfig;
use tokio::{net::TcpListener, time::timeout};
use tokio_util::sync::CancellationToken;
use url::Url;

pub use upstream::MockUpstream;

/// Test client for making HTTP requests to the test server
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Start a request with an arbitrary method.
    pub fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client.request(method, format!("{}{}", self.base_url, path))
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, path).send().await.unwrap()
    }

    /// Send a GET request as the given user, from the given address.
    pub async fn get_as(&self, path: &str, user: &str, ip: &str) -> reqwest::Response {
        self.request(reqwest::Method::GET, path)
            .header("x-user-id", user)
            .header("x-forwarded-for", ip)
            .send()
            .await
            .unwrap()
    }
}

/// Builder for [`TestServer`].
#[derive(Default)]
pub struct TestServerBuilder {
    upstream: Option<Url>,
}

impl TestServerBuilder {
    /// Forward admitted requests to the given upstream.
    pub fn upstream(mut self, upstream: &MockUpstream) -> Self {
        self.upstream = Some(upstream.url());
        self
    }

    /// Start the server with the given TOML configuration.
    pub async fn build(self, config_toml: &str) -> TestServer {
        let mut config: Config = toml::from_str(config_toml).unwrap();
        config.validate().unwrap();

        if let Some(url) = self.upstream {
            config.server.upstream = Some(UpstreamConfig {
                url,
                timeout: Duration::from_secs(5),
                max_body_size: 1024 * 1024,
            });
        }

        TestServer::start(config).await
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    shutdown: CancellationToken,
    handle: Option<tokio::task::JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    /// Create a builder.
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    async fn start(config: Config) -> Self {
        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        drop(listener);

        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown: shutdown.clone(),
        };

        let handle = tokio::spawn(server::serve(serve_config));

        // Wait until the listener accepts connections.
        let mut retries = 100;

        loop {
            let connected = timeout(Duration::from_millis(100), tokio::net::TcpStream::connect(address)).await;

            if matches!(connected, Ok(Ok(_))) {
                break;
            }

            if handle.is_finished() {
                let error = handle.await.unwrap().unwrap_err();
                unreachable!("server failed to start: {error}");
            }

            retries -= 1;
            assert!(retries > 0, "server did not start listening on {address}");

            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        TestServer {
            client: TestClient::new(format!("http://{address}")),
            address,
            shutdown,
            handle: Some(handle),
        }
    }

    /// Base URL of the server.
    pub fn url(&self) -> Url {
        Url::parse(&format!("http://{}", self.address)).unwrap()
    }

    /// Stops the server and waits until it has shut down.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        self.shutdown.cancel();

        match self.handle.take() {
            Some(handle) => handle.await?,
            None => Ok(()),
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
