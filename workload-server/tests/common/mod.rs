use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use reqwest::header::CONTENT_TYPE;
use tokio::net::TcpListener;
use tokio::sync::Notify;

use workload_server::config::{BootstrapConfig, Config, EnvMsDuration};
use workload_server::server::serve;

pub static DEFAULT_CONFIG: Lazy<Config> = Lazy::new(|| Config {
    address: SocketAddr::from_str("127.0.0.1:0").unwrap(),
    db_host: "localhost".to_string(),
    db_port: 5432,
    db_user: "postgres".to_string(),
    db_password: "abcd".to_string(),
    db_name: "performance_test".to_string(),
    max_pg_connections: 10,
    acquire_timeout_ms: None,
    connection_max_lifetime_secs: 300,
    bootstrap: BootstrapConfig {
        max_attempts: 5,
        retry_interval: EnvMsDuration(Duration::from_millis(500)),
    },
    request_timeout_ms: EnvMsDuration(Duration::from_secs(30)),
    export_prometheus: false,
});

pub struct ServerHandle {
    pub addr: SocketAddr,
    shutdown: Arc<Notify>,
    client: reqwest::Client,
}

impl ServerHandle {
    pub async fn for_config(config: Config) -> ServerHandle {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let notify = Arc::new(Notify::new());
        let shutdown = notify.clone();

        tokio::spawn(async move {
            serve(config, listener, async move { notify.notified().await })
                .await
                .expect("server failed")
        });
        let handle = ServerHandle {
            addr,
            shutdown,
            client: reqwest::Client::new(),
        };
        handle.wait_until_healthy().await;
        handle
    }

    /// The store is bootstrapped before requests are served; poll until that is done.
    async fn wait_until_healthy(&self) {
        for _ in 0..100 {
            if let Ok(res) = self
                .client
                .get(format!("http://{:?}/health", self.addr))
                .send()
                .await
            {
                if res.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        panic!("server never became healthy");
    }

    pub async fn send_process_request<T: Into<reqwest::Body>>(&self, body: T) -> reqwest::Response {
        self.client
            .post(format!("http://{:?}/process", self.addr))
            .body(body)
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
            .expect("failed to send request")
    }

    pub async fn send_health_request(&self) -> reqwest::Response {
        self.client
            .get(format!("http://{:?}/health", self.addr))
            .send()
            .await
            .expect("failed to send request")
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.shutdown.notify_one()
    }
}
