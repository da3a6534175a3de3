//! HTTP client for the anti-abuse oracle.

use async_trait::async_trait;
use reqwest::{Client, Url};

use relay_core::domain::AbuseRule;
use relay_core::ports::{AbuseOracle, OracleError};

/// Header carrying the relayed caller's IP to the oracle.
pub static FORWARDED_FOR_HEADER: &str = "X-Forwarded-For";

/// Calls `GET {base}/abuse/{handle}` and decodes the rule list.
///
/// No request timeout is set beyond reqwest's defaults; callers never wait on it.
pub struct HttpAbuseOracle {
    client: Client,
    base_url: Url,
    abbreviated: bool,
}

impl HttpAbuseOracle {
    pub fn new(base_url: &str) -> Result<Self, OracleError> {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Result<Self, OracleError> {
        let base_url =
            Url::parse(base_url).map_err(|e| OracleError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(OracleError::InvalidUrl(base_url.to_string()));
        }

        Ok(Self {
            client,
            base_url,
            abbreviated: false,
        })
    }

    /// Ask the oracle for its abbreviated rule set.
    pub fn with_abbreviated(mut self, abbreviated: bool) -> Self {
        self.abbreviated = abbreviated;
        self
    }

    fn abuse_url(&self, handle: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("abuse").push(handle);
        }
        if self.abbreviated {
            url.query_pairs_mut().append_pair("abbreviated", "true");
        }
        url
    }
}

#[async_trait]
impl AbuseOracle for HttpAbuseOracle {
    async fn fetch_rules(
        &self,
        handle: &str,
        client_ip: &str,
    ) -> Result<Vec<AbuseRule>, OracleError> {
        let response = self
            .client
            .get(self.abuse_url(handle))
            .header(FORWARDED_FOR_HEADER, client_ip)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OracleError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        serde_json::from_slice(&body).map_err(|e| OracleError::Malformed(e.to_string()))
    }
}
