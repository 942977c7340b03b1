//! Room access tokens and room service queries.
//!
//! Tokens are HS256 JWTs carrying a room-join video grant plus an agent
//! dispatch block, so the media server starts the named agent as soon as the
//! participant connects. Credentials come from `ROOMS_API_KEY` and
//! `ROOMS_API_SECRET`. Room listing and participant checks go over the room
//! server's Twirp HTTP API.

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::config::RoomsConfig;

type HmacSha256 = Hmac<Sha256>;

/// Prefix applied to per-user agent names, matching the dispatch metadata the
/// agent worker expects.
pub const AGENT_NAME_PREFIX: &str = "agent-";

pub fn agent_name(user_id: &str) -> String {
    format!("{}{}", AGENT_NAME_PREFIX, user_id)
}

/// Mints signed room access tokens.
pub struct TokenIssuer {
    api_key: String,
    api_secret: String,
    ttl_secs: u64,
}

impl TokenIssuer {
    pub fn from_env(config: &RoomsConfig) -> Result<Self> {
        let api_key = std::env::var("ROOMS_API_KEY")
            .map_err(|_| anyhow::anyhow!("ROOMS_API_KEY environment variable not set"))?;
        let api_secret = std::env::var("ROOMS_API_SECRET")
            .map_err(|_| anyhow::anyhow!("ROOMS_API_SECRET environment variable not set"))?;
        Ok(Self {
            api_key,
            api_secret,
            ttl_secs: config.token_ttl_secs,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(api_key: &str, api_secret: &str) -> Self {
        Self {
            api_key: api_key.to_string(),
            api_secret: api_secret.to_string(),
            ttl_secs: 3600,
        }
    }

    /// Mint a token granting `user_id` entry to `room`, with the user's agent
    /// dispatched into the room on join. `agent` defaults to
    /// `agent-<user_id>` when not overridden.
    pub fn mint(&self, room: &str, user_id: &str, agent: Option<&str>) -> Result<String> {
        let agent = agent
            .map(str::to_string)
            .unwrap_or_else(|| agent_name(user_id));
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": self.api_key,
            "sub": user_id,
            "nbf": now,
            "exp": now + self.ttl_secs as i64,
            "video": {
                "roomJoin": true,
                "room": room,
            },
            "roomConfig": {
                "agents": [{
                    "agentName": agent,
                    "metadata": agent_name(user_id),
                }],
            },
        });
        sign_jwt(&claims, &self.api_secret)
    }

    /// Token-minting wrapped for the room-creation endpoint: success flag
    /// plus token, an empty token on failure.
    pub fn mint_checked(&self, room: &str, user_id: &str, agent: Option<&str>) -> (bool, String) {
        match self.mint(room, user_id, agent) {
            Ok(token) => (true, token),
            Err(e) => {
                tracing::error!(room, user_id, error = %e, "failed to mint room token");
                (false, String::new())
            }
        }
    }
}

fn sign_jwt(claims: &serde_json::Value, secret: &str) -> Result<String> {
    let header = serde_json::json!({"alg": "HS256", "typ": "JWT"});
    let header_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?);
    let claims_b64 = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    let signing_input = format!("{}.{}", header_b64, claims_b64);

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .context("Invalid signing secret")?;
    mac.update(signing_input.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());

    Ok(format!("{}.{}", signing_input, signature))
}

/// Decode a JWT's claims without verifying the signature. Used for
/// inspection, never for trust decisions.
pub fn decode_claims(token: &str) -> Result<serde_json::Value> {
    let claims_b64 = token
        .split('.')
        .nth(1)
        .ok_or_else(|| anyhow::anyhow!("Malformed token"))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(claims_b64)
        .context("Invalid token encoding")?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[derive(Debug, Deserialize)]
struct RoomInfo {
    name: String,
}

#[derive(Debug, Deserialize, Default)]
struct ListRoomsResponse {
    #[serde(default)]
    rooms: Vec<RoomInfo>,
}

#[derive(Debug, Deserialize)]
struct ParticipantInfo {
    identity: String,
}

#[derive(Debug, Deserialize, Default)]
struct ListParticipantsResponse {
    #[serde(default)]
    participants: Vec<ParticipantInfo>,
}

/// Client for the room server's Twirp-style admin API.
pub struct RoomServiceClient {
    host: String,
    client: reqwest::Client,
    issuer: TokenIssuer,
}

impl RoomServiceClient {
    pub fn from_env(config: &RoomsConfig) -> Result<Self> {
        Ok(Self {
            host: config.host.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            issuer: TokenIssuer::from_env(config)?,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(host: &str, issuer: TokenIssuer) -> Self {
        Self {
            host: host.trim_end_matches('/').to_string(),
            client: reqwest::Client::new(),
            issuer,
        }
    }

    /// Admin tokens carry `roomList` and `roomAdmin` grants instead of a
    /// join grant.
    fn admin_token(&self, room: &str) -> Result<String> {
        let now = chrono::Utc::now().timestamp();
        let claims = serde_json::json!({
            "iss": self.issuer.api_key,
            "sub": "parlance-admin",
            "nbf": now,
            "exp": now + self.issuer.ttl_secs as i64,
            "video": {
                "roomList": true,
                "roomAdmin": true,
                "room": room,
            },
        });
        sign_jwt(&claims, &self.issuer.api_secret)
    }

    async fn twirp(
        &self,
        method: &str,
        room: &str,
        body: serde_json::Value,
    ) -> Result<serde_json::Value> {
        let url = format!("{}/twirp/livekit.RoomService/{}", self.host, method);
        let token = self.admin_token(room)?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Room service request failed: {}", method))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Room service error {} on {}: {}", status, method, text);
        }
        Ok(response.json().await?)
    }

    pub async fn room_exists(&self, room: &str) -> Result<bool> {
        let json = self
            .twirp("ListRooms", room, serde_json::json!({"names": [room]}))
            .await?;
        let parsed: ListRoomsResponse = serde_json::from_value(json)?;
        Ok(parsed.rooms.iter().any(|r| r.name == room))
    }

    pub async fn list_participants(&self, room: &str) -> Result<Vec<String>> {
        let json = self
            .twirp("ListParticipants", room, serde_json::json!({"room": room}))
            .await?;
        let parsed: ListParticipantsResponse = serde_json::from_value(json)?;
        Ok(parsed.participants.into_iter().map(|p| p.identity).collect())
    }

    /// Whether the room currently has a participant that is not an agent.
    pub async fn has_human_participant(&self, room: &str) -> Result<(bool, Vec<String>)> {
        let identities = self.list_participants(room).await?;
        let has_human = identities
            .iter()
            .any(|id| !id.starts_with(AGENT_NAME_PREFIX));
        Ok((has_human, identities))
    }
}
