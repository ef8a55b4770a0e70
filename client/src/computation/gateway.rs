use super::{
    Address, ComputationNetwork, FinalizedComputation, NetworkError, RequestAddresses,
    SubmitRequest,
};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

#[derive(Deserialize)]
struct AccountResponse {
    data: String,
    #[serde(default)]
    signature: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubmitBody<'a> {
    offset: u64,
    segment_count: u8,
    public_key: String,
    /// Decimal string; JSON numbers cannot carry 128 bits.
    nonce: String,
    addresses: &'a RequestAddresses,
}

#[derive(Deserialize)]
struct SubmitResponse {
    signature: String,
}

/// HTTP gateway in front of the computation network.
#[derive(Clone)]
pub struct GatewayNetwork {
    http_client: reqwest::Client,
    base_url: Url,
}

impl GatewayNetwork {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, NetworkError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http_client,
            base_url: with_trailing_slash(base_url),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn account(&self, address: &Address) -> Result<Option<AccountResponse>, NetworkError> {
        let url = self.base_url.join(&format!("accounts/{address}"))?;
        let response = self.http_client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => Ok(Some(response.json().await?)),
            status => Err(NetworkError::Failed(status)),
        }
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>, NetworkError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|err| NetworkError::UnexpectedResponse(format!("{field} is not hex: {err}")))
}

impl ComputationNetwork for GatewayNetwork {
    async fn account_exists(&self, address: &Address) -> Result<bool, NetworkError> {
        Ok(self.account(address).await?.is_some())
    }

    async fn mxe_public_key(&self, mxe: &Address) -> Result<Option<[u8; 32]>, NetworkError> {
        let Some(account) = self.account(mxe).await? else {
            return Ok(None);
        };
        let data = decode_hex("mxe data", &account.data)?;
        let key: [u8; 32] = data.as_slice().try_into().map_err(|_| {
            NetworkError::UnexpectedResponse(format!("mxe key has {} bytes", data.len()))
        })?;
        Ok(Some(key))
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<String, NetworkError> {
        let url = self.base_url.join("computations")?;
        let body = SubmitBody {
            offset: request.offset,
            segment_count: request.segment_count,
            public_key: hex::encode(request.public_key),
            nonce: request.nonce.to_string(),
            addresses: &request.addresses,
        };
        let response = self.http_client.post(url).json(&body).send().await?;
        match response.status() {
            StatusCode::OK => Ok(response.json::<SubmitResponse>().await?.signature),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NetworkError::SignerDeclined),
            status => Err(NetworkError::Failed(status)),
        }
    }

    async fn poll(&self, computation: &Address) -> Result<Option<FinalizedComputation>, NetworkError> {
        let url = self
            .base_url
            .join(&format!("computations/{computation}/result"))?;
        let response = self.http_client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let account: AccountResponse = response.json().await?;
                let payload = decode_hex("result data", &account.data)?;
                let reference = account.signature.ok_or_else(|| {
                    NetworkError::UnexpectedResponse("result has no signature".to_string())
                })?;
                Ok(Some(FinalizedComputation { payload, reference }))
            }
            status => Err(NetworkError::Failed(status)),
        }
    }
}

/// Network that is never reachable; every spin falls back to a demo outcome.
#[derive(Clone, Copy, Debug, Default)]
pub struct OfflineNetwork;

impl ComputationNetwork for OfflineNetwork {
    async fn account_exists(&self, _address: &Address) -> Result<bool, NetworkError> {
        Err(NetworkError::Offline)
    }

    async fn mxe_public_key(&self, _mxe: &Address) -> Result<Option<[u8; 32]>, NetworkError> {
        Err(NetworkError::Offline)
    }

    async fn submit(&self, _request: &SubmitRequest) -> Result<String, NetworkError> {
        Err(NetworkError::Offline)
    }

    async fn poll(&self, _computation: &Address) -> Result<Option<FinalizedComputation>, NetworkError> {
        Err(NetworkError::Offline)
    }
}

/// Network selected at startup from configuration.
#[derive(Clone)]
pub enum ConfiguredNetwork {
    Gateway(GatewayNetwork),
    Offline(OfflineNetwork),
}

impl ConfiguredNetwork {
    pub fn from_url(gateway_url: Option<&Url>, timeout: Duration) -> Result<Self, NetworkError> {
        match gateway_url {
            Some(url) => Ok(Self::Gateway(GatewayNetwork::new(url.clone(), timeout)?)),
            None => Ok(Self::Offline(OfflineNetwork)),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::Gateway(gateway) => format!("gateway {}", gateway.base_url()),
            Self::Offline(_) => "offline (demo spins only)".to_string(),
        }
    }
}

impl ComputationNetwork for ConfiguredNetwork {
    async fn account_exists(&self, address: &Address) -> Result<bool, NetworkError> {
        match self {
            Self::Gateway(network) => network.account_exists(address).await,
            Self::Offline(network) => network.account_exists(address).await,
        }
    }

    async fn mxe_public_key(&self, mxe: &Address) -> Result<Option<[u8; 32]>, NetworkError> {
        match self {
            Self::Gateway(network) => network.mxe_public_key(mxe).await,
            Self::Offline(network) => network.mxe_public_key(mxe).await,
        }
    }

    async fn submit(&self, request: &SubmitRequest) -> Result<String, NetworkError> {
        match self {
            Self::Gateway(network) => network.submit(request).await,
            Self::Offline(network) => network.submit(request).await,
        }
    }

    async fn poll(&self, computation: &Address) -> Result<Option<FinalizedComputation>, NetworkError> {
        match self {
            Self::Gateway(network) => network.poll(computation).await,
            Self::Offline(network) => network.poll(computation).await,
        }
    }
}
