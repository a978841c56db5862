//! Address Registry
//!
//! Assigns each user one deposit address per chain. Derivation is
//! deterministic from the user id and the chain's address scheme, so
//! re-provisioning a user always lands on the same address and chains
//! sharing a scheme share the address.
//!
//! # WARNING: dev derivation only
//!
//! Addresses and key material are hash-derived stand-ins. A production
//! deployment replaces this derivation with an HD wallet or KMS without
//! touching the callers.

use serde_json::json;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;

use crate::error::{CustodiaError, Result};
use crate::logging::log_security_event;
use crate::storage::traits::{CoreStore, StorageError};
use crate::types::address::WalletAddress;
use crate::types::chain::ChainType;
use crate::types::money::UserId;

/// Signing material for a user's deposit addresses.
///
/// Opaque so the hex never lands in logs by accident; the transfer
/// dependency reads it through [`as_str`].
///
/// [`as_str`]: KeyMaterial::as_str
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial(String);

impl KeyMaterial {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyMaterial(redacted)")
    }
}

/// Address registry
pub struct AddressRegistry {
    /// Backing store
    store: Arc<dyn CoreStore>,
}

impl AddressRegistry {
    /// Create a new address registry
    pub fn new(store: Arc<dyn CoreStore>) -> Self {
        Self { store }
    }

    /// Derive the deposit address for a user on a chain
    ///
    /// Pure function of user id and address scheme. Chains sharing a
    /// scheme get the same address.
    pub fn derive_address(&self, user: UserId, chain: ChainType) -> String {
        let tag = chain.address_scheme().derivation_tag();
        let digest = sha256_hex(format!("custodia:addr:{}:{}", tag, user));
        format!("0x{}", &digest[..40])
    }

    /// Derive the signing material for a user's addresses
    pub fn key_material(&self, user: UserId) -> KeyMaterial {
        KeyMaterial(sha256_hex(format!("custodia:key:{}", user)))
    }

    /// Get the user's deposit address for a chain, assigning one if absent
    pub async fn get_or_create_address(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> Result<WalletAddress> {
        if let Some(existing) = self.store.address_for(user, chain).await? {
            return Ok(existing);
        }

        let address = WalletAddress::new(user, chain, self.derive_address(user, chain));
        match self.store.insert_address(&address).await {
            Ok(()) => {
                log_security_event(
                    "deposit_address_assigned",
                    true,
                    json!({
                        "user_id": user,
                        "chain": chain.to_string(),
                        "address": address.address,
                    }),
                    None,
                );
                Ok(address)
            }
            // Raced a concurrent provisioner; both derive the same address,
            // so the stored row is the answer.
            Err(StorageError::Duplicate(_)) => self
                .store
                .address_for(user, chain)
                .await?
                .ok_or_else(|| {
                    CustodiaError::not_found(format!("address for {}/{}", user, chain))
                }),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up the assigned address without creating one
    pub async fn address_for(
        &self,
        user: UserId,
        chain: ChainType,
    ) -> Result<Option<WalletAddress>> {
        Ok(self.store.address_for(user, chain).await?)
    }

    /// All addresses assigned to a user
    pub async fn addresses(&self, user: UserId) -> Result<Vec<WalletAddress>> {
        Ok(self.store.addresses_for_user(user).await?)
    }

    /// Record that a deposit arrived at the user's address
    pub async fn mark_used(&self, user: UserId, chain: ChainType) -> Result<()> {
        Ok(self.store.mark_address_used(user, chain).await?)
    }

    /// Check an external address against the chain's format
    pub fn validate_address(&self, address: &str, chain: ChainType) -> bool {
        chain.address_scheme().matches(address)
    }
}

fn sha256_hex(input: impl AsRef<[u8]>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_ref());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn registry() -> AddressRegistry {
        AddressRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_derivation_deterministic() {
        let registry = registry();
        let user = UserId::new();

        let a = registry.derive_address(user, ChainType::Erc20);
        let b = registry.derive_address(user, ChainType::Erc20);
        assert_eq!(a, b);

        // Shared EVM scheme: both chains land on the same address.
        let c = registry.derive_address(user, ChainType::Bep20);
        assert_eq!(a, c);

        let other = registry.derive_address(UserId::new(), ChainType::Erc20);
        assert_ne!(a, other);
    }

    #[test]
    fn test_derived_address_is_well_formed() {
        let registry = registry();
        let address = registry.derive_address(UserId::new(), ChainType::Erc20);
        assert!(registry.validate_address(&address, ChainType::Erc20));
    }

    #[test]
    fn test_key_material_redacted_in_debug() {
        let registry = registry();
        let key = registry.key_material(UserId::new());
        assert_eq!(key.as_str().len(), 64);
        assert!(!format!("{:?}", key).contains(key.as_str()));
    }

    #[tokio::test]
    async fn test_get_or_create_idempotent() {
        let registry = registry();
        let user = UserId::new();

        let first = registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();
        let second = registry
            .get_or_create_address(user, ChainType::Erc20)
            .await
            .unwrap();

        assert_eq!(first.address, second.address);
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(registry.addresses(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_used_stamps_address() {
        let registry = registry();
        let user = UserId::new();

        registry
            .get_or_create_address(user, ChainType::Bep20)
            .await
            .unwrap();
        registry.mark_used(user, ChainType::Bep20).await.unwrap();

        let address = registry
            .address_for(user, ChainType::Bep20)
            .await
            .unwrap()
            .unwrap();
        assert!(address.last_used_at.is_some());
    }
}
