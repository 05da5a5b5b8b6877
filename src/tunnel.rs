//! Public URL discovery through a local ngrok agent.

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// The local agent's inspection API.
pub const NGROK_API_URL: &str = "http://127.0.0.1:4040/api/tunnels";

#[derive(Debug, Deserialize)]
struct TunnelList {
    #[serde(default)]
    tunnels: Vec<Tunnel>,
}

#[derive(Debug, Deserialize)]
struct Tunnel {
    public_url: String,
}

/// List the public URLs of every open tunnel.
pub async fn public_urls(api_url: &str) -> Result<Vec<String>> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(2))
        .user_agent(format!("forward-amd/{}", env!("CARGO_PKG_VERSION")))
        .build()?;

    let list: TunnelList = http_client
        .get(api_url)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;

    Ok(list.tunnels.into_iter().map(|t| t.public_url).collect())
}

/// Pick the tunnel the provider should call back on. `https` wins.
pub fn preferred(urls: &[String]) -> Option<String> {
    urls.iter()
        .find(|u| u.starts_with("https://"))
        .or_else(|| urls.first())
        .cloned()
}

/// Best-effort discovery; `None` when no agent is running.
pub async fn discover(api_url: &str) -> Option<String> {
    match public_urls(api_url).await {
        Ok(urls) => {
            let url = preferred(&urls);
            if let Some(url) = &url {
                info!(public_url = %url, "Discovered ngrok tunnel");
            }
            url
        }
        Err(e) => {
            debug!("No ngrok agent reachable: {}", e);
            None
        }
    }
}
