// 6.2: signature check. the trader signs the raw fingerprint bytes as an
// EIP-191 personal message. the recovered signer must equal the trader.

use crate::error::CollaboratorError;
use crate::types::{Address, Fingerprint};
use async_trait::async_trait;
use ethers::types::Signature;
use ethers::utils::hash_message;
use std::str::FromStr;
use tracing::debug;

#[async_trait]
pub trait SignatureVerifier: Send + Sync {
    /// True when `signature` over the fingerprint was produced by `trader`
    async fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &str,
        trader: Address,
    ) -> Result<bool, CollaboratorError>;
}

/// secp256k1 recovery, no network calls
#[derive(Debug, Default, Clone, Copy)]
pub struct EcdsaVerifier;

impl EcdsaVerifier {
    pub fn recover(fingerprint: &Fingerprint, signature: &str) -> Option<Address> {
        let signature = Signature::from_str(signature).ok()?;
        let digest = hash_message(fingerprint.as_bytes());
        signature.recover(digest).ok()
    }
}

#[async_trait]
impl SignatureVerifier for EcdsaVerifier {
    async fn verify(
        &self,
        fingerprint: &Fingerprint,
        signature: &str,
        trader: Address,
    ) -> Result<bool, CollaboratorError> {
        match Self::recover(fingerprint, signature) {
            Some(signer) if signer == trader => Ok(true),
            Some(signer) => {
                debug!(id = %fingerprint, ?signer, ?trader, "signer mismatch");
                Ok(false)
            }
            None => {
                debug!(id = %fingerprint, "unparseable signature");
                Ok(false)
            }
        }
    }
}
