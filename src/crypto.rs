//! Key exchange for encrypted Bedrock links.
//!
//! Keys are P-384. Tokens are compact ES384 JWTs whose `x5u` header holds the
//! signer's public key as base64 DER. The shared encryption key is
//! `SHA-256(salt || ECDH secret)`.

use crate::protocol::encryption::EncryptionKey;
use base64::{
    engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD},
    Engine,
};
use p384::{
    ecdsa::{
        signature::{Signer, Verifier},
        Signature, SigningKey, VerifyingKey,
    },
    pkcs8::{DecodePublicKey, EncodePublicKey},
    PublicKey,
};
use rand_core::OsRng;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const ALGORITHM: &str = "ES384";

#[derive(Debug, thiserror::Error)]
pub enum KeyExchangeError {
    #[error("malformed token: {0}")]
    MalformedToken(&'static str),
    #[error("token is missing the '{0}' claim")]
    MissingClaim(&'static str),
    #[error("unsupported token algorithm '{0}'")]
    UnsupportedAlgorithm(String),
    #[error("invalid public key")]
    InvalidKey,
    #[error("token signature does not verify")]
    BadSignature,
    #[error(transparent)]
    Base64(#[from] base64::DecodeError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

type Result<T, E = KeyExchangeError> = std::result::Result<T, E>;

/// A P-384 key pair.
#[derive(Clone)]
pub struct KeyPair {
    signing_key: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::random(&mut OsRng),
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from(self.signing_key.verifying_key())
    }

    /// The public key as base64 DER, as carried in `x5u` headers.
    pub fn public_key_base64(&self) -> Result<String> {
        encode_public_key(&self.public_key())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair").finish_non_exhaustive()
    }
}

pub fn encode_public_key(key: &PublicKey) -> Result<String> {
    let der = key
        .to_public_key_der()
        .map_err(|_| KeyExchangeError::InvalidKey)?;
    Ok(STANDARD.encode(der.as_bytes()))
}

/// Decodes a base64 DER public key.
pub fn decode_public_key(encoded: &str) -> Result<PublicKey> {
    let der = STANDARD.decode(encoded.trim())?;
    PublicKey::from_public_key_der(&der).map_err(|_| KeyExchangeError::InvalidKey)
}

/// Derives the symmetric key both ends of a link compute.
pub fn derive_shared_key(key_pair: &KeyPair, peer: &PublicKey, salt: &[u8]) -> EncryptionKey {
    let secret = p384::ecdh::diffie_hellman(
        key_pair.signing_key.as_nonzero_scalar(),
        peer.as_affine(),
    );
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(secret.raw_secret_bytes());
    EncryptionKey::new(hasher.finalize().into())
}

#[derive(Debug, Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    x5u: String,
}

/// A token whose signature was checked against its own `x5u` key.
#[derive(Debug)]
pub struct VerifiedToken {
    pub signer: PublicKey,
    pub claims: Value,
}

impl VerifiedToken {
    pub fn claim_str(&self, name: &'static str) -> Result<&str> {
        self.claims
            .get(name)
            .and_then(Value::as_str)
            .ok_or(KeyExchangeError::MissingClaim(name))
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(segment.trim_end_matches('='))?)
}

/// Parses a compact token and verifies it was signed by the key in its header.
pub fn verify_token(token: &str) -> Result<VerifiedToken> {
    let mut segments = token.trim().splitn(3, '.');
    let (Some(header), Some(payload), Some(signature)) =
        (segments.next(), segments.next(), segments.next())
    else {
        return Err(KeyExchangeError::MalformedToken("expected three segments"));
    };

    let parsed_header: TokenHeader = serde_json::from_slice(&decode_segment(header)?)?;
    if parsed_header.alg != ALGORITHM {
        return Err(KeyExchangeError::UnsupportedAlgorithm(parsed_header.alg));
    }
    let signer = decode_public_key(&parsed_header.x5u)?;

    let signature = Signature::from_slice(&decode_segment(signature)?)
        .map_err(|_| KeyExchangeError::MalformedToken("bad signature encoding"))?;
    let signing_input = &token.trim()[..header.len() + 1 + payload.len()];
    VerifyingKey::from(&signer)
        .verify(signing_input.as_bytes(), &signature)
        .map_err(|_| KeyExchangeError::BadSignature)?;

    let claims = serde_json::from_slice(&decode_segment(payload)?)?;
    Ok(VerifiedToken { signer, claims })
}

/// Signs `claims` with `key_pair`, advertising its public key in `x5u`.
pub fn sign_token(key_pair: &KeyPair, claims: &Value) -> Result<String> {
    let header = TokenHeader {
        alg: ALGORITHM.to_owned(),
        x5u: key_pair.public_key_base64()?,
    };
    let signing_input = format!(
        "{}.{}",
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(&header)?),
        URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?)
    );
    let signature: Signature = key_pair.signing_key.sign(signing_input.as_bytes());
    Ok(format!(
        "{signing_input}.{}",
        URL_SAFE_NO_PAD.encode(signature.to_bytes())
    ))
}

/// Builds the token a server sends to start encryption.
pub fn create_handshake_token(server_key: &KeyPair, salt: &[u8]) -> Result<String> {
    sign_token(server_key, &serde_json::json!({ "salt": STANDARD.encode(salt) }))
}

/// Extracts the server public key and salt from a handshake token.
pub fn parse_handshake_token(token: &str) -> Result<(PublicKey, Vec<u8>)> {
    let token = verify_token(token)?;
    let salt = STANDARD.decode(token.claim_str("salt")?)?;
    Ok((token.signer, salt))
}

/// Parses the chain of a login request, verifying each link against its own key.
pub fn parse_chain(chain_data: &str) -> Result<Vec<VerifiedToken>> {
    #[derive(Deserialize)]
    struct Chain {
        chain: Vec<String>,
    }

    let chain: Chain = serde_json::from_str(chain_data)?;
    if chain.chain.is_empty() {
        return Err(KeyExchangeError::MalformedToken("empty chain"));
    }
    chain.chain.iter().map(|token| verify_token(token)).collect()
}

/// The key a login chain asks the server to encrypt against:
/// `identityPublicKey` of the last link.
pub fn identity_public_key(chain_data: &str) -> Result<PublicKey> {
    let chain = parse_chain(chain_data)?;
    let last = chain
        .last()
        .ok_or(KeyExchangeError::MalformedToken("empty chain"))?;
    decode_public_key(last.claim_str("identityPublicKey")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_ends_derive_the_same_key() {
        let client = KeyPair::generate();
        let server = KeyPair::generate();
        let salt = b"0123456789abcdef";

        let token = create_handshake_token(&server, salt).unwrap();
        let (server_public, parsed_salt) = parse_handshake_token(&token).unwrap();
        assert_eq!(parsed_salt, salt);

        let client_side = derive_shared_key(&client, &server_public, &parsed_salt);
        let server_side = derive_shared_key(&server, &client.public_key(), salt);
        assert_eq!(client_side, server_side);
    }

    #[test]
    fn public_keys_survive_base64_der() {
        let key_pair = KeyPair::generate();
        let encoded = key_pair.public_key_base64().unwrap();
        assert_eq!(decode_public_key(&encoded).unwrap(), key_pair.public_key());
    }

    #[test]
    fn tampered_claims_fail_verification() {
        let key_pair = KeyPair::generate();
        let token = sign_token(&key_pair, &serde_json::json!({ "salt": "AAAA" })).unwrap();
        let mut parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(br#"{"salt":"BBBB"}"#);
        parts[1] = &forged;
        let forged_token = parts.join(".");
        assert!(matches!(
            verify_token(&forged_token),
            Err(KeyExchangeError::BadSignature)
        ));
    }

    #[test]
    fn garbage_handshake_is_a_structured_error() {
        assert!(matches!(
            parse_handshake_token("not-a-token"),
            Err(KeyExchangeError::MalformedToken(_))
        ));
    }

    #[test]
    fn identity_key_comes_from_the_last_link() {
        let key_pair = KeyPair::generate();
        let identity = KeyPair::generate();
        let link = sign_token(
            &key_pair,
            &serde_json::json!({ "identityPublicKey": identity.public_key_base64().unwrap() }),
        )
        .unwrap();
        let chain = serde_json::json!({ "chain": [link] }).to_string();
        assert_eq!(identity_public_key(&chain).unwrap(), identity.public_key());
    }
}
