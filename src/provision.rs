//! User Provisioning
//!
//! One call brings a user to the platform baseline: a wallet per
//! supported currency and a deposit address per supported chain.
//! Safe to repeat; everything underneath is get-or-create.

use serde_json::json;
use std::sync::Arc;

use crate::error::Result;
use crate::logging::log_security_event;
use crate::registry::AddressRegistry;
use crate::types::address::WalletAddress;
use crate::types::chain::ChainType;
use crate::types::money::{Currency, UserId};
use crate::types::wallet::Wallet;
use crate::wallet::WalletService;

/// Everything a freshly provisioned user holds
#[derive(Debug, Clone)]
pub struct ProvisionReport {
    pub wallets: Vec<Wallet>,
    pub addresses: Vec<WalletAddress>,
}

/// User provisioner
pub struct Provisioner {
    /// Wallet service
    wallets: Arc<WalletService>,

    /// Address registry
    registry: Arc<AddressRegistry>,
}

impl Provisioner {
    /// Create a new provisioner
    pub fn new(wallets: Arc<WalletService>, registry: Arc<AddressRegistry>) -> Self {
        Self { wallets, registry }
    }

    /// Ensure the user has every wallet and deposit address
    pub async fn provision_user(&self, user: UserId) -> Result<ProvisionReport> {
        let mut wallets = Vec::with_capacity(Currency::ALL.len());
        for currency in Currency::ALL {
            wallets.push(self.wallets.get_or_create(user, currency).await?);
        }

        let mut addresses = Vec::with_capacity(ChainType::ALL.len());
        for chain in ChainType::ALL {
            addresses.push(self.registry.get_or_create_address(user, chain).await?);
        }

        log_security_event(
            "user_provisioned",
            true,
            json!({
                "user_id": user,
                "wallets": wallets.len(),
                "addresses": addresses.len(),
            }),
            None,
        );

        Ok(ProvisionReport { wallets, addresses })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CustodiaConfig;
    use crate::storage::memory::MemoryStore;
    use rust_decimal::Decimal;

    fn provisioner() -> Provisioner {
        let store = Arc::new(MemoryStore::new());
        let config = Arc::new(CustodiaConfig::default());
        Provisioner::new(
            Arc::new(WalletService::new(store.clone(), config)),
            Arc::new(AddressRegistry::new(store)),
        )
    }

    #[tokio::test]
    async fn test_provision_covers_every_currency_and_chain() {
        let provisioner = provisioner();
        let user = UserId::new();

        let report = provisioner.provision_user(user).await.unwrap();
        assert_eq!(report.wallets.len(), Currency::ALL.len());
        assert_eq!(report.addresses.len(), ChainType::ALL.len());
        assert!(report.wallets.iter().all(|w| w.balance == Decimal::ZERO));
        assert!(report.wallets.iter().all(|w| w.can_transact()));
    }

    #[tokio::test]
    async fn test_provision_idempotent() {
        let provisioner = provisioner();
        let user = UserId::new();

        let first = provisioner.provision_user(user).await.unwrap();
        let second = provisioner.provision_user(user).await.unwrap();

        assert_eq!(first.wallets.len(), second.wallets.len());
        for (a, b) in first.addresses.iter().zip(second.addresses.iter()) {
            assert_eq!(a.address, b.address);
            assert_eq!(a.created_at, b.created_at);
        }
    }
}
