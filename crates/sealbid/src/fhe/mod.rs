//! encryption gateway for bid amounts
//!
//! the gateway is initialized lazily and exactly once. initialization asks
//! the network for its public encryption key and picks a strategy:
//!
//! - key fetch succeeds: [`RealEncryptor`], input sealed to the network key and
//!   bound to (chain, contract, user)
//! - key fetch fails, mock allowed: [`MockEncryptor`], logged at warn
//! - key fetch fails, mock disallowed: `Error::Initialization`, nothing cached
//!
//! every [`EncryptedBid`] carries the [`EncryptionMode`] that produced it, so
//! downstream code can tell real ciphertext from placeholder bytes.

pub mod mock;
pub mod real;

use std::sync::Arc;

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{info, warn};

use crate::crypto::keccak256;
use crate::types::{to_hex_prefixed, Address, Wei};
use crate::{Error, Result};

pub use mock::MockEncryptor;
pub use real::{open_sealed_input, RealEncryptor, FHE_LIB_ADDRESS, PUBKEY_CALLDATA};

/// which strategy produced a ciphertext
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncryptionMode {
    Real,
    Mock,
}

impl EncryptionMode {
    pub fn is_mock(&self) -> bool {
        matches!(self, EncryptionMode::Mock)
    }
}

/// encrypted bid amount plus its input proof
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBid {
    pub mode: EncryptionMode,
    /// real: the 32-byte input handle. mock: mask ‖ masked amount
    #[serde(with = "hex_bytes")]
    pub encrypted_amount: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub proof: Vec<u8>,
}

impl EncryptedBid {
    /// 32-byte handle recorded on the ledger
    pub fn handle(&self) -> [u8; 32] {
        match (self.mode, <[u8; 32]>::try_from(self.encrypted_amount.as_slice())) {
            (EncryptionMode::Real, Ok(handle)) => handle,
            _ => keccak256(&[&self.encrypted_amount]),
        }
    }

    pub fn encrypted_amount_hex(&self) -> String {
        to_hex_prefixed(&self.encrypted_amount)
    }

    pub fn proof_hex(&self) -> String {
        to_hex_prefixed(&self.proof)
    }
}

mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&crate::types::to_hex_prefixed(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        crate::types::parse_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// read-only chain access used by the key fetch
#[async_trait]
pub trait NetworkProvider: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// execute a read-only call against `to`, returning raw return data
    async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>>;
}

/// encryption strategy
pub trait Encryptor: Send + Sync {
    fn mode(&self) -> EncryptionMode;

    /// chain the inputs are bound to, if known
    fn chain_id(&self) -> Option<u64>;

    fn encrypt(&self, amount: &Wei, contract: &Address, user: &Address) -> Result<EncryptedBid>;
}

/// lazily-initialized encryption client
pub struct FheGateway {
    provider: Option<Arc<dyn NetworkProvider>>,
    allow_mock: bool,
    encryptor: OnceCell<Box<dyn Encryptor>>,
}

impl FheGateway {
    pub fn new(provider: Option<Arc<dyn NetworkProvider>>, allow_mock: bool) -> Self {
        Self {
            provider,
            allow_mock,
            encryptor: OnceCell::new(),
        }
    }

    /// gateway without a network, always mock
    pub fn offline() -> Self {
        Self::new(None, true)
    }

    pub fn allow_mock(&self) -> bool {
        self.allow_mock
    }

    /// whether initialization has completed
    pub fn is_ready(&self) -> bool {
        self.encryptor.initialized()
    }

    /// selected strategy, `None` before initialization
    pub fn mode(&self) -> Option<EncryptionMode> {
        self.encryptor.get().map(|e| e.mode())
    }

    /// chain id learned during initialization, `None` in mock mode or before init
    pub fn chain_id(&self) -> Option<u64> {
        self.encryptor.get().and_then(|e| e.chain_id())
    }

    /// fetch the network key if that has not happened yet
    ///
    /// concurrent callers share one in-flight fetch.
    pub async fn init(&self) -> Result<EncryptionMode> {
        Ok(self.encryptor().await?.mode())
    }

    async fn encryptor(&self) -> Result<&dyn Encryptor> {
        let encryptor = self
            .encryptor
            .get_or_try_init(|| async {
                match self.fetch_network_key().await {
                    Ok(real) => {
                        info!("fhe gateway ready on chain {}", real.chain_id().unwrap_or_default());
                        Ok(Box::new(real) as Box<dyn Encryptor>)
                    }
                    Err(e) if self.allow_mock => {
                        warn!("fhe network unavailable, falling back to mock encryption: {}", e);
                        Ok(Box::new(MockEncryptor) as Box<dyn Encryptor>)
                    }
                    Err(e) => Err(Error::Initialization(e.to_string())),
                }
            })
            .await?;
        Ok(encryptor.as_ref())
    }

    async fn fetch_network_key(&self) -> Result<RealEncryptor> {
        let provider = self
            .provider
            .as_ref()
            .ok_or_else(|| Error::Initialization("no network provider configured".into()))?;

        let chain_id = provider.chain_id().await?;
        let raw = provider.call(&FHE_LIB_ADDRESS, &PUBKEY_CALLDATA).await?;
        let network_key = real::decode_network_key(&raw)?;
        Ok(RealEncryptor::new(chain_id, network_key))
    }

    /// encrypt a whole-token amount for submission to `contract` by `user`
    ///
    /// bounds are inclusive. amounts are scaled to wei, truncating digits
    /// beyond 18 decimals.
    pub async fn encrypt_bid_amount(
        &self,
        amount: Decimal,
        min_budget: Decimal,
        max_budget: Decimal,
        contract: &Address,
        user: &Address,
    ) -> Result<EncryptedBid> {
        if amount < min_budget || amount > max_budget {
            return Err(Error::OutOfRange {
                amount: amount.to_string(),
                min: min_budget.to_string(),
                max: max_budget.to_string(),
            });
        }
        let wei = Wei::from_decimal(amount)?;

        let encryptor = self.encryptor().await?;
        match encryptor.encrypt(&wei, contract, user) {
            Ok(bid) => Ok(bid),
            Err(e) if self.allow_mock && !encryptor.mode().is_mock() => {
                warn!("encryption failed, using mock ciphertext: {}", e);
                MockEncryptor.encrypt(&wei, contract, user)
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::str::FromStr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use x25519_dalek::{PublicKey, StaticSecret};

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn contract() -> Address {
        Address([0xc0; 20])
    }

    fn user() -> Address {
        Address([0x0e; 20])
    }

    /// provider serving a fixed network key, counting key fetches
    struct FixedProvider {
        key: PublicKey,
        chain_id: u64,
        key_fetches: AtomicUsize,
        fail: bool,
    }

    impl FixedProvider {
        fn new(key: PublicKey) -> Self {
            Self {
                key,
                chain_id: 11155111,
                key_fetches: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(PublicKey::from([9u8; 32]))
            }
        }
    }

    #[async_trait]
    impl NetworkProvider for FixedProvider {
        async fn chain_id(&self) -> Result<u64> {
            self.key_fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Network("connection refused".into()));
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(self.chain_id)
        }

        async fn call(&self, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
            assert_eq!(*to, FHE_LIB_ADDRESS);
            assert_eq!(data, PUBKEY_CALLDATA.as_slice());
            Ok(real::encode_abi_bytes(self.key.as_bytes()))
        }
    }

    #[tokio::test]
    async fn test_range_is_inclusive() {
        let gateway = FheGateway::offline();
        let (min, max) = (dec("0.1"), dec("1.0"));

        assert!(gateway.encrypt_bid_amount(dec("0.1"), min, max, &contract(), &user()).await.is_ok());
        assert!(gateway.encrypt_bid_amount(dec("1.0"), min, max, &contract(), &user()).await.is_ok());

        let below = gateway.encrypt_bid_amount(dec("0.09"), min, max, &contract(), &user()).await;
        assert!(matches!(below, Err(Error::OutOfRange { .. })));
        let above = gateway.encrypt_bid_amount(dec("1.01"), min, max, &contract(), &user()).await;
        assert!(matches!(above, Err(Error::OutOfRange { .. })));
    }

    #[tokio::test]
    async fn test_out_of_range_skips_key_fetch() {
        let provider = Arc::new(FixedProvider::failing());
        let gateway = FheGateway::new(Some(provider.clone()), true);

        let result = gateway
            .encrypt_bid_amount(dec("5"), dec("0.1"), dec("1.0"), &contract(), &user())
            .await;
        assert!(matches!(result, Err(Error::OutOfRange { .. })));
        assert!(!gateway.is_ready());
        assert_eq!(provider.key_fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_fallback_without_provider() {
        let gateway = FheGateway::offline();
        assert_eq!(gateway.mode(), None);

        let bid = gateway
            .encrypt_bid_amount(dec("0.5"), dec("0.1"), dec("1.0"), &contract(), &user())
            .await
            .unwrap();
        assert_eq!(bid.mode, EncryptionMode::Mock);
        assert_eq!(bid.encrypted_amount.len(), 64);
        assert_eq!(bid.proof.len(), 96);
        assert_eq!(gateway.mode(), Some(EncryptionMode::Mock));
        assert_eq!(gateway.chain_id(), None);
    }

    #[tokio::test]
    async fn test_fallback_on_network_failure() {
        let gateway = FheGateway::new(Some(Arc::new(FixedProvider::failing())), true);
        let bid = gateway
            .encrypt_bid_amount(dec("0.5"), dec("0.1"), dec("1.0"), &contract(), &user())
            .await
            .unwrap();
        assert!(bid.mode.is_mock());
    }

    /// node answering the key call with an absurd abi offset
    struct GarbledKeyProvider;

    #[async_trait]
    impl NetworkProvider for GarbledKeyProvider {
        async fn chain_id(&self) -> Result<u64> {
            Ok(11155111)
        }

        async fn call(&self, _: &Address, _: &[u8]) -> Result<Vec<u8>> {
            let mut data = vec![0u8; 96];
            data[24..32].copy_from_slice(&u64::MAX.to_be_bytes());
            Ok(data)
        }
    }

    #[tokio::test]
    async fn test_fallback_on_garbled_key() {
        let gateway = FheGateway::new(Some(Arc::new(GarbledKeyProvider)), true);
        let bid = gateway
            .encrypt_bid_amount(dec("0.5"), dec("0.1"), dec("1.0"), &contract(), &user())
            .await
            .unwrap();
        assert_eq!(bid.mode, EncryptionMode::Mock);

        let strict = FheGateway::new(Some(Arc::new(GarbledKeyProvider)), false);
        assert!(matches!(strict.init().await, Err(Error::Initialization(_))));
    }

    fn unmask(bid: &EncryptedBid) -> Wei {
        let mut value = [0u8; 32];
        for (i, byte) in value.iter_mut().enumerate() {
            *byte = bid.encrypted_amount[i] ^ bid.encrypted_amount[32 + i];
        }
        Wei::from_be_bytes(&value)
    }

    const MIN_WEI: u64 = 100_000_000_000_000_000;
    const MAX_WEI: u64 = 1_000_000_000_000_000_000;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_fallback_accepts_every_in_range_amount(
            wei in prop_oneof![Just(MIN_WEI), Just(MAX_WEI), MIN_WEI..=MAX_WEI],
            refusing in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()
                .unwrap();
            let gateway = if refusing {
                FheGateway::new(Some(Arc::new(FixedProvider::failing())), true)
            } else {
                FheGateway::offline()
            };
            let amount = Decimal::from_i128_with_scale(wei as i128, 18);

            let bid = rt.block_on(gateway.encrypt_bid_amount(
                amount,
                dec("0.1"),
                dec("1.0"),
                &contract(),
                &user(),
            ));
            let bid = bid.unwrap();
            prop_assert_eq!(bid.mode, EncryptionMode::Mock);
            prop_assert_eq!(unmask(&bid), Wei::from_u128(wei as u128));
        }
    }

    #[tokio::test]
    async fn test_mock_disallowed_is_retryable_error() {
        let provider = Arc::new(FixedProvider::failing());
        let gateway = FheGateway::new(Some(provider.clone()), false);

        let first = gateway.init().await;
        assert!(matches!(first, Err(Error::Initialization(_))));
        assert!(!gateway.is_ready());

        // failure is not cached, so the fetch runs again
        let second = gateway.init().await;
        assert!(matches!(second, Err(Error::Initialization(_))));
        assert_eq!(provider.key_fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_single_flight_init() {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let provider = Arc::new(FixedProvider::new(PublicKey::from(&secret)));
        let gateway = Arc::new(FheGateway::new(Some(provider.clone()), false));

        let mut handles = Vec::new();
        for _ in 0..16 {
            let gateway = gateway.clone();
            handles.push(tokio::spawn(async move { gateway.init().await }));
        }
        for handle in handles {
            assert_eq!(handle.await.unwrap().unwrap(), EncryptionMode::Real);
        }

        assert_eq!(provider.key_fetches.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.chain_id(), Some(11155111));
    }

    #[tokio::test]
    async fn test_real_mode_binds_input() {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let provider = Arc::new(FixedProvider::new(PublicKey::from(&secret)));
        let gateway = FheGateway::new(Some(provider), false);

        let bid = gateway
            .encrypt_bid_amount(dec("0.5"), dec("0.1"), dec("1.0"), &contract(), &user())
            .await
            .unwrap();
        assert_eq!(bid.mode, EncryptionMode::Real);
        assert_eq!(bid.handle().as_slice(), bid.encrypted_amount.as_slice());

        let (handle, amount) =
            open_sealed_input(&secret, &bid.proof, 11155111, &contract(), &user()).unwrap();
        assert_eq!(handle, bid.handle());
        assert_eq!(amount, Wei::parse_ether("0.5").unwrap());

        let other = Address([0xdd; 20]);
        assert!(open_sealed_input(&secret, &bid.proof, 11155111, &other, &user()).is_err());
        assert!(open_sealed_input(&secret, &bid.proof, 11155111, &contract(), &other).is_err());
        assert!(open_sealed_input(&secret, &bid.proof, 1, &contract(), &user()).is_err());
    }

    #[test]
    fn test_encrypted_bid_json() {
        let bid = EncryptedBid {
            mode: EncryptionMode::Mock,
            encrypted_amount: vec![0xab; 64],
            proof: vec![0x01; 96],
        };
        let json = serde_json::to_value(&bid).unwrap();
        assert_eq!(json["mode"], "mock");
        assert_eq!(json["encrypted_amount"], format!("0x{}", "ab".repeat(64)));

        let back: EncryptedBid = serde_json::from_value(json).unwrap();
        assert_eq!(back, bid);
        assert_eq!(back.handle(), keccak256(&[&[0xab; 64]]));
    }
}
