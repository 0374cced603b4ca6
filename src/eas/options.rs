//! OPTIONS version discovery, `spec.md` §4.2.1.

use anyhow::{Context, Result};
use reqwest::Client;

use crate::credentials::AuthContext;
use crate::error::EasError;

const HEADER: &str = "ms-asprotocolversions";

pub async fn discover_protocol_version(client: &Client, auth: &AuthContext) -> Result<String> {
    let response = client
        .request(reqwest::Method::OPTIONS, &auth.base_url)
        .header(reqwest::header::AUTHORIZATION, &auth.authorization_header)
        .send()
        .await
        .context("sending OPTIONS request")?;

    let status = response.status().as_u16();
    if status != 200 {
        return Err(EasError::from_http_status(status)
            .unwrap_or(EasError::Protocol(format!("OPTIONS returned {status}")))
            .into());
    }

    let versions = response
        .headers()
        .get(HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| EasError::Protocol("missing ms-asprotocolversions header".into()))?;

    Ok(pick_version(&versions))
}

/// "if it contains 12.0, adopt 12.0, else 2.5", `spec.md` §4.2.1.
fn pick_version(header_value: &str) -> String {
    if header_value.split(',').any(|v| v.trim() == "12.0") {
        "12.0".to_string()
    } else {
        "2.5".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adopts_12_when_advertised() {
        assert_eq!(pick_version("1.0,2.5,12.0,14.0"), "12.0");
    }

    #[test]
    fn falls_back_to_2_5_otherwise() {
        assert_eq!(pick_version("1.0, 2.5"), "2.5");
    }
}
