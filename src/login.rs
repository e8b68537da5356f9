//! Identity of a connected player, and the login the proxy presents
//! to backends on the player's behalf.

use crate::{
    crypto::{self, KeyExchangeError, KeyPair},
    protocol::{packet::client, ProtocolVersion},
};
use serde_json::{json, Value};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Lifetime of the identity token the proxy signs.
const TOKEN_LIFETIME_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct LoginData {
    pub username: String,
    pub uuid: Uuid,
    pub xuid: String,
    pub protocol: ProtocolVersion,
    key_pair: KeyPair,
    chain_data: String,
    client_data: String,
}

impl LoginData {
    /// Reads the player's identity from a login request and re-signs it with
    /// a fresh key pair, so backends derive shared secrets against the proxy.
    pub fn from_login(login: &client::Login) -> Result<Self, KeyExchangeError> {
        let chain = crypto::parse_chain(&login.chain_data)?;
        let extra_data = chain
            .iter()
            .find_map(|token| token.claims.get("extraData"))
            .cloned()
            .ok_or(KeyExchangeError::MissingClaim("extraData"))?;

        let username = extra_data
            .get("displayName")
            .and_then(Value::as_str)
            .ok_or(KeyExchangeError::MissingClaim("displayName"))?
            .to_owned();
        let uuid = extra_data
            .get("identity")
            .and_then(Value::as_str)
            .and_then(|identity| Uuid::parse_str(identity).ok())
            .ok_or(KeyExchangeError::MissingClaim("identity"))?;
        let xuid = extra_data
            .get("XUID")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();

        let key_pair = KeyPair::generate();
        let public_key = key_pair.public_key_base64()?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let identity = crypto::sign_token(
            &key_pair,
            &json!({
                "certificateAuthority": true,
                "extraData": extra_data,
                "identityPublicKey": public_key,
                "nbf": now.saturating_sub(60),
                "exp": now + TOKEN_LIFETIME_SECS,
            }),
        )?;
        let chain_data = json!({ "chain": [identity] }).to_string();

        let client_claims = crypto::verify_token(&login.client_data)?.claims;
        let client_data = crypto::sign_token(&key_pair, &client_claims)?;

        Ok(Self {
            username,
            uuid,
            xuid,
            protocol: login.protocol,
            key_pair,
            chain_data,
            client_data,
        })
    }

    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    /// The login sent to every backend this player connects to.
    pub fn backend_login(&self) -> client::Login {
        client::Login {
            protocol: self.protocol,
            chain_data: self.chain_data.clone(),
            client_data: self.client_data.clone(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Builds a self-signed login like a game client in offline mode would.
    pub(crate) fn client_login(username: &str, uuid: Uuid) -> client::Login {
        let key_pair = KeyPair::generate();
        let identity = crypto::sign_token(
            &key_pair,
            &json!({
                "extraData": {
                    "displayName": username,
                    "identity": uuid.to_string(),
                    "XUID": "",
                },
                "identityPublicKey": key_pair.public_key_base64().unwrap(),
            }),
        )
        .unwrap();
        let client_data =
            crypto::sign_token(&key_pair, &json!({ "SkinId": "Standard_Custom" })).unwrap();
        client::Login {
            protocol: ProtocolVersion::MINECRAFT_PE_1_16_20,
            chain_data: json!({ "chain": [identity] }).to_string(),
            client_data,
        }
    }

    #[test]
    fn backend_login_is_signed_by_the_proxy_key() {
        let uuid = Uuid::from_u128(0x1234);
        let login_data = LoginData::from_login(&client_login("Steve", uuid)).unwrap();
        assert_eq!(login_data.username, "Steve");
        assert_eq!(login_data.uuid, uuid);

        let login = login_data.backend_login();
        let identity_key = crypto::identity_public_key(&login.chain_data).unwrap();
        assert_eq!(identity_key, login_data.key_pair().public_key());

        let client_data = crypto::verify_token(&login.client_data).unwrap();
        assert_eq!(client_data.signer, login_data.key_pair().public_key());
        assert_eq!(client_data.claim_str("SkinId").unwrap(), "Standard_Custom");
    }

    #[test]
    fn login_without_identity_is_rejected() {
        let key_pair = KeyPair::generate();
        let link = crypto::sign_token(&key_pair, &json!({ "nbf": 0 })).unwrap();
        let login = client::Login {
            protocol: ProtocolVersion::MINECRAFT_PE_1_16_20,
            chain_data: json!({ "chain": [link] }).to_string(),
            client_data: link.clone(),
        };
        assert!(matches!(
            LoginData::from_login(&login),
            Err(KeyExchangeError::MissingClaim("extraData"))
        ));
    }
}
