pub mod hash;
pub mod kdf;
pub mod keystore_crypto;
pub mod signature_utils;

pub use self::kdf::{KDFAlgorithm, KdfParams, KeyDerivation};
pub use self::keystore_crypto::EncryptedSecret;
