//! Ed25519 key pairs and the signed-token format used to authenticate
//! privileged actors.
//!
//! A node's address is the hex encoding of its public key, so any address can
//! be turned back into a verifying key.
//!
//! Keys are Ed25519 rather than a secp256k1-class curve. Nothing outside this
//! module depends on the curve: addresses stay opaque hex strings and tokens
//! name their algorithm in the header.
//!
//! Tokens are compact JWS strings, `header.payload.signature`, each part
//! base64url-encoded without padding. The header is fixed to
//! `{"alg":"EdDSA","typ":"JWT"}` and the signature covers the ASCII bytes of
//! `header.payload`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Signature algorithm named in every token header.
pub const TOKEN_ALGORITHM: &str = "EdDSA";

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid public key")]
    InvalidPublicKey,
    #[error("invalid private key")]
    InvalidPrivateKey,
    #[error("malformed token")]
    MalformedToken,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// A public key for signature verification.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct PublicKey(pub VerifyingKey);

impl PublicKey {
    /// Parse a public key from its address form (64 hex characters).
    pub fn from_address(address: &str) -> Result<Self> {
        let bytes = hex::decode(address).map_err(|_| CryptoError::InvalidPublicKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        VerifyingKey::from_bytes(&arr)
            .map(Self)
            .map_err(|_| CryptoError::InvalidPublicKey)
    }

    /// The address of this key.
    pub fn to_address(&self) -> String {
        hex::encode(self.0.as_bytes())
    }

    /// Get the raw bytes of the public key.
    pub fn as_bytes(&self) -> [u8; 32] {
        self.0.to_bytes()
    }

    /// Verify a detached signature over `message`.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig =
            DalekSignature::from_slice(signature).map_err(|_| CryptoError::InvalidSignature)?;
        self.0
            .verify(message, &sig)
            .map_err(|_| CryptoError::InvalidSignature)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0.as_bytes()[..8]))
    }
}

/// A keypair for signing and verification.
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    pub public_key: PublicKey,
}

impl Keypair {
    /// Generate a new random keypair.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            public_key: PublicKey(verifying_key),
        }
    }

    /// Create a keypair from a private key (32 bytes).
    pub fn from_private_key(bytes: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(bytes);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            public_key: PublicKey(verifying_key),
        }
    }

    /// Create a keypair from a hex-encoded private key.
    pub fn from_private_hex(private_key: &str) -> Result<Self> {
        let bytes = hex::decode(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self::from_private_key(&arr))
    }

    /// Get the private key bytes.
    pub fn private_key(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key())
    }

    /// The node address (hex public key).
    pub fn address(&self) -> String {
        self.public_key.to_address()
    }

    /// Produce a detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> [u8; 64] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish()
    }
}

/// Generate a key pair as `(private_hex, public_hex)`; the public half is
/// the node address.
pub fn generate_keypair() -> (String, String) {
    let keypair = Keypair::generate();
    (keypair.private_key_hex(), keypair.address())
}

#[derive(Serialize, Deserialize)]
struct TokenHeader {
    alg: String,
    typ: String,
}

/// Signs payloads into self-describing tokens.
#[derive(Clone, Debug)]
pub struct SigningAuthority {
    keypair: Keypair,
}

impl SigningAuthority {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair }
    }

    pub fn from_private_hex(private_key: &str) -> Result<Self> {
        Ok(Self::new(Keypair::from_private_hex(private_key)?))
    }

    pub fn address(&self) -> String {
        self.keypair.address()
    }

    pub fn public_key(&self) -> PublicKey {
        self.keypair.public_key
    }

    /// Sign `payload`, binding it to this authority's private key.
    pub fn sign<T: Serialize>(&self, payload: &T) -> Result<String> {
        let header = TokenHeader {
            alg: TOKEN_ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };
        let header = serde_json::to_vec(&header).map_err(|_| CryptoError::MalformedToken)?;
        let payload = serde_json::to_vec(payload).map_err(|_| CryptoError::MalformedToken)?;

        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(payload)
        );
        let signature = self.keypair.sign(signing_input.as_bytes());
        Ok(format!(
            "{}.{}",
            signing_input,
            URL_SAFE_NO_PAD.encode(signature)
        ))
    }

    /// Recover the payload of `token` if its signature validates against
    /// `public_key`.
    ///
    /// Tampering, a wrong key and malformed tokens all yield
    /// [`CryptoError::InvalidSignature`].
    pub fn verify<T: DeserializeOwned>(token: &str, public_key: &PublicKey) -> Result<T> {
        let (signing_input, signature) = token
            .rsplit_once('.')
            .ok_or(CryptoError::InvalidSignature)?;
        let (header, payload) = signing_input
            .split_once('.')
            .ok_or(CryptoError::InvalidSignature)?;

        let header: TokenHeader = decode_part(header).map_err(|_| CryptoError::InvalidSignature)?;
        if header.alg != TOKEN_ALGORITHM {
            return Err(CryptoError::InvalidSignature);
        }

        let signature = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| CryptoError::InvalidSignature)?;
        public_key.verify(signing_input.as_bytes(), &signature)?;

        decode_part(payload).map_err(|_| CryptoError::InvalidSignature)
    }

    /// Verify against the key behind a node address.
    pub fn verify_for_address<T: DeserializeOwned>(token: &str, address: &str) -> Result<T> {
        let public_key = PublicKey::from_address(address).map_err(|_| CryptoError::InvalidSignature)?;
        Self::verify(token, &public_key)
    }

    /// Read the payload without checking the signature.
    ///
    /// Only useful to learn which key a token claims to be signed by; the
    /// result must not be trusted before [`SigningAuthority::verify`].
    pub fn claims_unverified<T: DeserializeOwned>(token: &str) -> Result<T> {
        let mut parts = token.split('.');
        let (Some(_), Some(payload), Some(_), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(CryptoError::MalformedToken);
        };
        decode_part(payload)
    }
}

fn decode_part<T: DeserializeOwned>(part: &str) -> Result<T> {
    let bytes = URL_SAFE_NO_PAD
        .decode(part)
        .map_err(|_| CryptoError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| CryptoError::MalformedToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn test_keypair_generation() {
        let kp = Keypair::generate();
        assert_eq!(kp.address().len(), 64);
    }

    #[test]
    fn test_address_roundtrip() {
        let kp = Keypair::generate();
        let public_key = PublicKey::from_address(&kp.address()).unwrap();
        assert_eq!(public_key, kp.public_key);
    }

    #[test]
    fn test_invalid_address_rejected() {
        assert!(matches!(
            PublicKey::from_address("not-hex"),
            Err(CryptoError::InvalidPublicKey)
        ));
        assert!(matches!(
            PublicKey::from_address("abcd"),
            Err(CryptoError::InvalidPublicKey)
        ));
    }

    #[test]
    fn test_keypair_from_private_key() {
        let (private_key, public_key) = generate_keypair();
        let kp = Keypair::from_private_hex(&private_key).unwrap();
        assert_eq!(kp.address(), public_key);
    }

    #[test]
    fn test_sign_and_verify() {
        let authority = SigningAuthority::new(Keypair::generate());
        let payload = json!({"user_id": 123, "username": "john_doe"});
        let token = authority.sign(&payload).unwrap();

        let decoded: Value = SigningAuthority::verify(&token, &authority.public_key()).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_token_has_three_parts() {
        let authority = SigningAuthority::new(Keypair::generate());
        let token = authority.sign(&json!({"a": 1})).unwrap();
        assert_eq!(token.split('.').count(), 3);
    }

    #[test]
    fn test_invalid_signature() {
        let authority = SigningAuthority::new(Keypair::generate());
        let other = Keypair::generate();
        let token = authority.sign(&json!({"user_id": 123})).unwrap();

        assert!(matches!(
            SigningAuthority::verify::<Value>(&token, &other.public_key),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let authority = SigningAuthority::new(Keypair::generate());
        let token = authority.sign(&json!({"amount": 1})).unwrap();
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload = URL_SAFE_NO_PAD.encode(br#"{"amount":1000}"#);
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            SigningAuthority::verify::<Value>(&forged, &authority.public_key()),
            Err(CryptoError::InvalidSignature)
        ));
    }

    #[test]
    fn test_malformed_token_rejected() {
        let kp = Keypair::generate();
        for token in ["", "abc", "a.b", "a.b.c", "..."] {
            assert!(matches!(
                SigningAuthority::verify::<Value>(token, &kp.public_key),
                Err(CryptoError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn test_verify_for_address() {
        let authority = SigningAuthority::new(Keypair::generate());
        let token = authority.sign(&json!("hello")).unwrap();
        let decoded: String =
            SigningAuthority::verify_for_address(&token, &authority.address()).unwrap();
        assert_eq!(decoded, "hello");
    }

    #[test]
    fn test_claims_unverified() {
        let authority = SigningAuthority::new(Keypair::generate());
        let token = authority.sign(&json!({"node_id": "n1"})).unwrap();
        let claims: Value = SigningAuthority::claims_unverified(&token).unwrap();
        assert_eq!(claims["node_id"], "n1");
        assert!(SigningAuthority::claims_unverified::<Value>("a.b").is_err());
    }
}
