//! Deployment endpoint resolution.
//!
//! Turns a deployment id, region, and generation settings into the WebSocket
//! URI and HTTP request the transport opens. Generation parameters are passed
//! through as query-string values and never interpreted locally.

use crate::defaults;
use crate::error::{Result, VoxlinkError};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::Request;
use url::Url;

/// Model sampling controls forwarded to the deployment.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub audio_topk: u32,
    pub audio_temperature: f32,
    pub text_topk: u32,
    pub text_temperature: f32,
    pub audio_seed: Option<u64>,
    pub text_seed: Option<u64>,
    pub repetition_penalty: Option<f32>,
    pub repetition_penalty_context: Option<u32>,
    pub pad_mult: Option<f32>,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            audio_topk: defaults::AUDIO_TOPK,
            audio_temperature: defaults::AUDIO_TEMPERATURE,
            text_topk: defaults::TEXT_TOPK,
            text_temperature: defaults::TEXT_TEMPERATURE,
            audio_seed: None,
            text_seed: None,
            repetition_penalty: None,
            repetition_penalty_context: None,
            pad_mult: None,
        }
    }
}

/// A fully resolved connection target.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub deployment_id: String,
    pub region: String,
    /// Bearer credential carried in the Authorization header.
    pub api_key: Option<String>,
    /// Alternative credential carriage as a `token` query parameter.
    pub token: Option<String>,
    /// Skip TLS certificate validation.
    pub insecure: bool,
    pub generation: GenerationParams,
}

impl Endpoint {
    pub fn new(deployment_id: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            region: defaults::DEFAULT_REGION.to_string(),
            api_key: None,
            token: None,
            insecure: false,
            generation: GenerationParams::default(),
        }
    }

    /// The hostname the deployment is served from.
    pub fn host(&self) -> String {
        format!("{}.ifr.{}.scaleway.com", self.deployment_id, self.region)
    }

    /// The full `wss://` URI including generation query parameters.
    pub fn uri(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("wss://{}/api/chat", self.host())).map_err(|e| {
            VoxlinkError::TransportOpen {
                message: format!("invalid endpoint URI: {}", e),
            }
        })?;

        {
            let g = &self.generation;
            let mut query = url.query_pairs_mut();
            query.append_pair("text_temperature", &g.text_temperature.to_string());
            query.append_pair("text_topk", &g.text_topk.to_string());
            query.append_pair("audio_temperature", &g.audio_temperature.to_string());
            query.append_pair("audio_topk", &g.audio_topk.to_string());
            if let Some(seed) = g.text_seed {
                query.append_pair("text_seed", &seed.to_string());
            }
            if let Some(seed) = g.audio_seed {
                query.append_pair("audio_seed", &seed.to_string());
            }
            if let Some(penalty) = g.repetition_penalty {
                query.append_pair("repetition_penalty", &penalty.to_string());
            }
            if let Some(context) = g.repetition_penalty_context {
                query.append_pair("repetition_penalty_context", &context.to_string());
            }
            if let Some(pad_mult) = g.pad_mult {
                query.append_pair("pad_mult", &pad_mult.to_string());
            }
            if let Some(token) = &self.token {
                query.append_pair("token", token);
            }
        }

        Ok(url)
    }

    /// The WebSocket upgrade request, with the bearer credential attached.
    pub fn request(&self) -> Result<Request<()>> {
        let uri = self.uri()?;
        let mut request =
            uri.as_str()
                .into_client_request()
                .map_err(|e| VoxlinkError::TransportOpen {
                    message: format!("failed to build request: {}", e),
                })?;

        if let Some(key) = &self.api_key {
            let value =
                format!("Bearer {}", key)
                    .parse()
                    .map_err(|_| VoxlinkError::TransportOpen {
                        message: "access key contains invalid header characters".to_string(),
                    })?;
            request.headers_mut().insert("Authorization", value);
        }

        Ok(request)
    }
}
