//! Address derivation against published BIP39/BIP44/BIP49/BIP84 vectors,
//! exercised through the wallet manager.

mod util;

use ironkey_core::core::derivation::{derive_address, PathDescriptor};
use ironkey_core::{ChainParams, ChainType, Network, SegWit, WalletError, WalletOptions};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use tempfile::TempDir;
use util::{manager, ABANDON, PASSWORD};

fn import(params: ChainParams) -> String {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    wm.import_mnemonic(ABANDON, PASSWORD, &params, WalletOptions::default())
        .unwrap()
        .address
}

#[test]
fn test_bitcoin_address_kinds() {
    assert_eq!(import(ChainParams::new(ChainType::Bitcoin)), "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
    assert_eq!(
        import(
            ChainParams::new(ChainType::Bitcoin)
                .with_seg_wit(SegWit::P2wpkh)
                .with_path("m/49'/0'/0'/0/0")
        ),
        "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf"
    );
    assert_eq!(
        import(
            ChainParams::new(ChainType::Bitcoin)
                .with_seg_wit(SegWit::Segwit)
                .with_path("m/84'/0'/0'/0/0")
        ),
        "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu"
    );
}

#[test]
fn test_segwit_defaults_follow_address_type() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    let nested = wm
        .import_mnemonic(
            ABANDON,
            PASSWORD,
            &ChainParams::new(ChainType::Bitcoin).with_seg_wit(SegWit::P2wpkh),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(nested.path.as_deref(), Some("m/49'/0'/0'/0/0"));
    assert_eq!(nested.address, "37VucYSaXLCAsxYyAPfbSi9eh4iEcbShgf");

    let native = wm
        .import_mnemonic(
            ABANDON,
            PASSWORD,
            &ChainParams::new(ChainType::Bitcoin).with_seg_wit(SegWit::Segwit),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(native.path.as_deref(), Some("m/84'/0'/0'/0/0"));
    assert_eq!(native.address, "bc1qcr8te4kr609gcawutmrza0j4xv80jy8z306fyu");
}

#[test]
fn test_bitcoin_cash_testnet_uses_coin_type_one() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    let desc = wm
        .import_mnemonic(
            ABANDON,
            PASSWORD,
            &ChainParams::new(ChainType::BitcoinCash).with_network(Network::Testnet),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(desc.path.as_deref(), Some("m/44'/1'/0'/0/0"));
    assert!(desc.address.starts_with('q'));
}

#[test]
fn test_bitcoin_testnet_uses_coin_type_one() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    let desc = wm
        .import_mnemonic(
            ABANDON,
            PASSWORD,
            &ChainParams::new(ChainType::Bitcoin).with_network(Network::Testnet),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(desc.path.as_deref(), Some("m/44'/1'/0'/0/0"));
    assert_eq!(desc.address, "mkpZhYtJu2r87Js3pDiWJDmPte2NRZ8bJV");
}

#[test]
fn test_ethereum_and_tron_vectors() {
    assert_eq!(import(ChainParams::new(ChainType::Ethereum)), "0x9858EfFD232B4033E47d90003D41EC34EcaEda94");
    assert_eq!(
        import(ChainParams::new(ChainType::Ethereum).with_path("m/44'/60'/0'/0/1")).to_lowercase(),
        "0x6fac4d18c912343bf86fa7049364dd4e424ab9c0"
    );
    assert_eq!(import(ChainParams::new(ChainType::Tron)), "TUEZSdKsoDHQMeZwihtdoBiN46zxhGWYdH");
}

#[test]
fn test_private_key_wallet_addresses() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    let eth = wm
        .import_private_key(&"46".repeat(32), PASSWORD, &ChainParams::new(ChainType::Ethereum), WalletOptions::default())
        .unwrap();
    assert_eq!(eth.address, "0x9d8A62f656a8d1615C1294fd71e9CFb3E4855A4F");
    assert!(eth.path.is_none());

    let trx = wm
        .import_private_key(&"46".repeat(32), PASSWORD, &ChainParams::new(ChainType::Tron), WalletOptions::default())
        .unwrap();
    assert_eq!(trx.address, "TQLCsShbQNXMTVCjprY64qZmEA4rBarpQp");

    let bch = wm
        .import_private_key(
            "L2hfzPyVC1jWH7n2QLTe7tVTb6btg9smp5UVzhEBxLYaSFF7sCZB",
            PASSWORD,
            &ChainParams::new(ChainType::BitcoinCash),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(bch.address, "qrnvl24e5kd6rpls53wmpvtfcgdmfrcfkv8fhnq9kr");

    let btc = wm
        .import_private_key(
            "L4p2b9VAf8k5aUahF1JCJUzZkgNEAqLfq8DDdQiyAprQAKSbu8hf",
            PASSWORD,
            &ChainParams::new(ChainType::Bitcoin),
            WalletOptions::default(),
        )
        .unwrap();
    assert_eq!(btc.address, "1LqBGSKuX5yYUonjxT5qGfpUsXKYYWeabA");
}

#[test]
fn test_external_addresses_follow_account() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    let desc = wm
        .import_mnemonic(ABANDON, PASSWORD, &ChainParams::new(ChainType::Bitcoin), WalletOptions::default())
        .unwrap();

    let next = desc.external_address.expect("bitcoin HD wallets expose the next receiving address");
    assert_eq!(next.address, "1Ak8PffB2meyfYnbXZR9EGfLfFZVpzJvQP");
    assert_eq!(wm.calc_external_address(&desc.id, 1).unwrap(), next);
}

#[test]
fn test_invalid_paths_rejected() {
    let dir = TempDir::new().unwrap();
    let wm = manager(dir.path());
    for path in ["m/44'/0'/0'/0", "44'/0'/0'/0/0", "m/44/0/0/0/0", "m/44'/0'/0'/0/x"] {
        let err = wm
            .import_mnemonic(
                ABANDON,
                PASSWORD,
                &ChainParams::new(ChainType::Bitcoin).with_path(path),
                WalletOptions::default(),
            )
            .unwrap_err();
        assert!(matches!(err, WalletError::ValidationError(_)), "{} accepted", path);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn prop_derivation_is_deterministic(seed in proptest::collection::vec(any::<u8>(), 16..64), index in 0u32..1000) {
        for chain in [ChainType::Bitcoin, ChainType::BitcoinCash, ChainType::Ethereum, ChainType::Tron] {
            let params = ChainParams::new(chain);
            let path = PathDescriptor::default_for(chain, Network::Mainnet, SegWit::None).external(index);
            let a = derive_address(&seed, &path, &params).unwrap();
            let b = derive_address(&seed, &path, &params).unwrap();
            prop_assert_eq!(a, b);
        }
    }
}
