use std::time::Duration;

use serde::Deserialize;

const IPIFY_URL: &str = "https://api.ipify.org?format=json";

#[derive(Deserialize)]
struct IpifyResponse {
    ip: String,
}

/// This machine's public address as seen by ipify.
pub async fn discover() -> eyre::Result<String> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;
    let response: IpifyResponse = http
        .get(IPIFY_URL)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| {
            eyre::eyre!(
                "could not discover the public IP address: {}\n\
                 Set IP_ADDRESS or \"ip_address\" in the config file instead.",
                vecstack_provisioner::error::format_err_chain(&e)
            )
        })?
        .json()
        .await?;

    tracing::info!(ip = %response.ip, "discovered public IP address");
    Ok(response.ip)
}
