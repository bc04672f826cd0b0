use std::collections::HashMap;

use async_trait::async_trait;
use solana_sdk::{
    pubkey::Pubkey,
    signature::Keypair,
    signer::Signer,
};

use crate::error::Error;

/// The injected signing capability. The transaction manager never holds key
/// material itself; it asks the keystore to sign marshalled message bytes
/// under the fee payer account.
#[async_trait]
pub trait SimpleKeystore: Send + Sync {
    async fn sign(&self, account: &Pubkey, data: &[u8]) -> Result<[u8; 64], Error>;

    async fn accounts(&self) -> Result<Vec<Pubkey>, Error>;

    /// Cheap existence probe used by the enqueue path to reject transactions
    /// whose fee payer the keystore cannot sign for.
    async fn has_account(&self, account: &Pubkey) -> Result<bool, Error>;
}

/// Keystore over a set of locally held keypairs.
pub struct InMemoryKeystore {
    keys: HashMap<Pubkey, Keypair>,
}

impl InMemoryKeystore {
    pub fn new(keypairs: Vec<Keypair>) -> Self {
        let keys = keypairs.into_iter().map(|k| (k.pubkey(), k)).collect();
        Self { keys }
    }

    /// Parse a keypair from a JSON byte-array string, the format produced by
    /// `solana-keygen` and commonly passed through environment variables.
    pub fn parse_keypair(keypair_str: &str) -> Result<Keypair, Error> {
        let bytes: Vec<u8> = serde_json::from_str(keypair_str)
            .map_err(|e| Error::Keystore(format!("Failed to parse keypair JSON array: {}", e)))?;
        Keypair::try_from(bytes.as_slice())
            .map_err(|e| Error::Keystore(format!("Failed to create keypair from bytes: {}", e)))
    }
}

#[async_trait]
impl SimpleKeystore for InMemoryKeystore {
    async fn sign(&self, account: &Pubkey, data: &[u8]) -> Result<[u8; 64], Error> {
        let keypair = self
            .keys
            .get(account)
            .ok_or_else(|| Error::Keystore(format!("no key for account {}", account)))?;
        let signature = keypair.sign_message(data);
        let mut raw = [0u8; 64];
        raw.copy_from_slice(signature.as_ref());
        Ok(raw)
    }

    async fn accounts(&self) -> Result<Vec<Pubkey>, Error> {
        Ok(self.keys.keys().copied().collect())
    }

    async fn has_account(&self, account: &Pubkey) -> Result<bool, Error> {
        Ok(self.keys.contains_key(account))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_and_lookup() {
        let keypair = Keypair::new();
        let pubkey = keypair.pubkey();
        let other = Pubkey::new_unique();
        let ks = InMemoryKeystore::new(vec![keypair]);

        assert!(ks.has_account(&pubkey).await.unwrap());
        assert!(!ks.has_account(&other).await.unwrap());
        assert_eq!(ks.accounts().await.unwrap(), vec![pubkey]);

        let sig_a = ks.sign(&pubkey, b"payload").await.unwrap();
        let sig_b = ks.sign(&pubkey, b"payload").await.unwrap();
        // ed25519 signing is deterministic for a fixed key and message
        assert_eq!(sig_a, sig_b);

        assert!(ks.sign(&other, b"payload").await.is_err());
    }

    #[test]
    fn test_parse_keypair_rejects_garbage() {
        assert!(InMemoryKeystore::parse_keypair("not json").is_err());
        assert!(InMemoryKeystore::parse_keypair("[1,2,3]").is_err());
    }
}
