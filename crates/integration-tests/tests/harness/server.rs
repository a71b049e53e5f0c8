//! The chorus server on an ephemeral port

use std::net::SocketAddr;

use chorus_config::Config;
use chorus_server::Server;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Running server; stops when dropped
pub struct TestServer {
    addr: SocketAddr,
    relay_path: String,
    client: reqwest::Client,
    shutdown: CancellationToken,
}

impl TestServer {
    pub async fn start(config: Config) -> anyhow::Result<Self> {
        let router = Server::new(&config)?.into_router();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let shutdown = CancellationToken::new();
        let stopped = shutdown.clone().cancelled_owned();
        tokio::spawn(async move {
            axum::serve(listener, router).with_graceful_shutdown(stopped).await.ok();
        });

        Ok(Self {
            addr,
            relay_path: config.server.relay_path.trim_end_matches('/').to_owned(),
            client: reqwest::Client::new(),
            shutdown,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.addr)
    }

    /// Base URL a `HttpRelay` should point at
    pub fn relay_url(&self) -> Url {
        Url::parse(&self.url(&self.relay_path)).expect("valid relay URL")
    }

    /// POST a JSON body to the relay's chat route
    pub async fn chat(&self, body: &serde_json::Value) -> reqwest::Result<reqwest::Response> {
        self.client
            .post(self.url(&format!("{}/chat", self.relay_path)))
            .json(body)
            .send()
            .await
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
