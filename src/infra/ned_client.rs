use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::error::{LogalError, Result};
use crate::pipeline::ingestion::redshift::RedshiftResolver;

/// NED ObjectLookup result code for a name that resolved to an object
const RESULT_FOUND: i64 = 3;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct LookupResponse {
    result_code: i64,
    #[serde(default)]
    preferred: Option<Preferred>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Preferred {
    #[serde(default)]
    redshift: Option<RedshiftValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RedshiftValue {
    value: Option<f64>,
}

/// Redshifts from the NASA/IPAC Extragalactic Database object lookup service
pub struct NedClient {
    client: Client,
    url: String,
}

impl NedClient {
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }

    fn lookup(&self, name: &str) -> Result<String> {
        let payload = json!({ "name": { "v": name } }).to_string();
        let response = self.client.post(&self.url).form(&[("json", payload)]).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(LogalError::Lookup {
                name: name.to_string(),
                message: format!("HTTP {}", status),
            });
        }
        Ok(response.text()?)
    }
}

/// Extract the preferred redshift from an ObjectLookup response body
pub fn parse_lookup_response(body: &str) -> Result<Option<f64>> {
    let response: LookupResponse = serde_json::from_str(body)?;
    if response.result_code != RESULT_FOUND {
        return Ok(None);
    }
    Ok(response
        .preferred
        .and_then(|p| p.redshift)
        .and_then(|r| r.value)
        .filter(|z| z.is_finite()))
}

impl RedshiftResolver for NedClient {
    fn name(&self) -> &str {
        "ned"
    }

    fn resolve(&self, name: &str) -> Result<Option<f64>> {
        let body = self.lookup(name)?;
        let z = parse_lookup_response(&body)?;
        debug!("NED: {} -> {:?}", name, z);
        Ok(z)
    }
}
