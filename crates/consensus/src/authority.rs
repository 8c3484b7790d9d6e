//! Trust authorities: who may finalize blocks without being voted for.
//!
//! An authority node announces itself with its address plus an authority
//! proof. Two variants exist:
//! - [`AddressAuthority`]: the proof is the address itself. Any node can
//!   forge it; it only exists for closed test networks.
//! - [`SignedAuthority`]: the proof is a token over the address signed by the
//!   key behind that address.

use peerchain_core::{CryptoError, SigningAuthority};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while producing authority proofs.
#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("node is not a trusted authority")]
    NotTrusted,

    #[error("no signing key for node {0}")]
    MissingKey(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

pub type Result<T> = std::result::Result<T, AuthorityError>;

/// Produces and checks authority proofs.
pub trait SystemAuthority: Send + Sync {
    /// Proof that `node_id` is an authority.
    fn get_proof(&self, node_id: &str) -> Result<String>;

    /// Check a proof presented for `node_id`.
    fn verify_proof(&self, node_id: &str, proof: &str) -> bool;

    /// Whether the local node was started as an authority.
    fn is_trusted(&self) -> bool;
}

/// Address-as-proof authority.
#[derive(Debug, Clone, Default)]
pub struct AddressAuthority {
    trusted: bool,
}

impl AddressAuthority {
    pub fn new(trusted: bool) -> Self {
        Self { trusted }
    }
}

impl SystemAuthority for AddressAuthority {
    fn get_proof(&self, node_id: &str) -> Result<String> {
        Ok(node_id.to_string())
    }

    fn verify_proof(&self, node_id: &str, proof: &str) -> bool {
        node_id == proof
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }
}

/// Claim carried inside a signed authority proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorityClaim {
    pub node_id: String,
}

/// Signature-backed authority.
#[derive(Debug, Clone)]
pub struct SignedAuthority {
    signer: Option<SigningAuthority>,
    trusted: bool,
}

impl SignedAuthority {
    /// An authority able to prove its own address.
    pub fn new(signer: SigningAuthority, trusted: bool) -> Self {
        Self {
            signer: Some(signer),
            trusted,
        }
    }

    /// A verifier that holds no key and can only check proofs.
    pub fn verifier() -> Self {
        Self {
            signer: None,
            trusted: false,
        }
    }
}

impl SystemAuthority for SignedAuthority {
    fn get_proof(&self, node_id: &str) -> Result<String> {
        if !self.trusted {
            return Err(AuthorityError::NotTrusted);
        }
        let signer = self
            .signer
            .as_ref()
            .filter(|signer| signer.address() == node_id)
            .ok_or_else(|| AuthorityError::MissingKey(node_id.to_string()))?;
        let claim = AuthorityClaim {
            node_id: node_id.to_string(),
        };
        Ok(signer.sign(&claim)?)
    }

    fn verify_proof(&self, node_id: &str, proof: &str) -> bool {
        SigningAuthority::verify_for_address::<AuthorityClaim>(proof, node_id)
            .map(|claim| claim.node_id == node_id)
            .unwrap_or(false)
    }

    fn is_trusted(&self) -> bool {
        self.trusted
    }
}
