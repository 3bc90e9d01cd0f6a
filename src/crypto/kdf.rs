use anyhow::Result;
use pbkdf2::pbkdf2_hmac;
use scrypt::Params;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroizing;

/// Length of the derived credential: 32 bytes cipher key followed by 32 bytes MAC key.
pub const CREDENTIAL_LEN: usize = 64;

/// Upper bounds on work factors. Keystore files are untrusted input and a
/// single one must not be able to stall a scan.
pub const MAX_PBKDF2_ITERATIONS: u32 = 10_000_000;
pub const MAX_SCRYPT_LOG_N: u32 = 20;
pub const MAX_SCRYPT_R: u32 = 32;
pub const MAX_SCRYPT_P: u32 = 16;
/// scrypt needs 128 * N * r bytes; keep it under 1 GiB.
pub const MAX_SCRYPT_MEMORY: u64 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "lowercase")]
pub enum KDFAlgorithm {
    PBKDF2 { iterations: u32 },
    Scrypt { n: u32, r: u32, p: u32 },
}

impl KDFAlgorithm {
    /// Reject costs that are malformed or above the work-factor caps.
    pub fn validate(&self) -> Result<()> {
        match *self {
            KDFAlgorithm::PBKDF2 { iterations } => {
                if iterations == 0 || iterations > MAX_PBKDF2_ITERATIONS {
                    anyhow::bail!("pbkdf2 iterations out of range: {}", iterations);
                }
            }
            KDFAlgorithm::Scrypt { n, r, p } => {
                if !n.is_power_of_two() || n < 2 || r == 0 || p == 0 {
                    anyhow::bail!("invalid scrypt parameters");
                }
                let memory = 128 * u64::from(n) * u64::from(r);
                if n.trailing_zeros() > MAX_SCRYPT_LOG_N || r > MAX_SCRYPT_R || p > MAX_SCRYPT_P || memory > MAX_SCRYPT_MEMORY {
                    anyhow::bail!("scrypt cost too high: n={} r={} p={}", n, r, p);
                }
            }
        }
        Ok(())
    }
}

impl Default for KDFAlgorithm {
    fn default() -> Self {
        // Mobile-friendly scrypt cost; N must be a power of 2.
        KDFAlgorithm::Scrypt { n: 1 << 14, r: 8, p: 1 }
    }
}

/// Parameters persisted next to a ciphertext so the key can be re-derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KdfParams {
    Scrypt(ScryptParams),
    Pbkdf2(Pbkdf2Params),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScryptParams {
    pub n: u32,
    pub r: u32,
    pub p: u32,
    pub dklen: u32,
    pub salt: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pbkdf2Params {
    pub c: u32,
    pub prf: String,
    pub dklen: u32,
    pub salt: String,
}

impl KdfParams {
    /// Fresh parameters for `algorithm` with a random salt.
    pub fn generate(algorithm: KDFAlgorithm) -> Self {
        let salt = hex::encode(KeyDerivation::generate_salt(32));
        match algorithm {
            KDFAlgorithm::PBKDF2 { iterations } => KdfParams::Pbkdf2(Pbkdf2Params {
                c: iterations,
                prf: "hmac-sha256".to_string(),
                dklen: CREDENTIAL_LEN as u32,
                salt,
            }),
            KDFAlgorithm::Scrypt { n, r, p } => KdfParams::Scrypt(ScryptParams {
                n,
                r,
                p,
                dklen: CREDENTIAL_LEN as u32,
                salt,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KdfParams::Scrypt(_) => "scrypt",
            KdfParams::Pbkdf2(_) => "pbkdf2",
        }
    }

    pub fn algorithm(&self) -> KDFAlgorithm {
        match self {
            KdfParams::Scrypt(p) => KDFAlgorithm::Scrypt { n: p.n, r: p.r, p: p.p },
            KdfParams::Pbkdf2(p) => KDFAlgorithm::PBKDF2 { iterations: p.c },
        }
    }

    fn salt_hex(&self) -> &str {
        match self {
            KdfParams::Scrypt(p) => &p.salt,
            KdfParams::Pbkdf2(p) => &p.salt,
        }
    }

    fn dklen(&self) -> u32 {
        match self {
            KdfParams::Scrypt(p) => p.dklen,
            KdfParams::Pbkdf2(p) => p.dklen,
        }
    }

    /// Reject parameter sets that could not have been produced by this crate.
    pub fn validate(&self) -> Result<()> {
        if self.dklen() as usize != CREDENTIAL_LEN {
            anyhow::bail!("kdf dklen must be {}", CREDENTIAL_LEN);
        }
        if self.salt_hex().is_empty() {
            anyhow::bail!("kdf salt is empty");
        }
        if let KdfParams::Pbkdf2(p) = self {
            if p.prf != "hmac-sha256" {
                anyhow::bail!("unsupported pbkdf2 prf: {}", p.prf);
            }
        }
        self.algorithm().validate()
    }

    /// Run the configured KDF over `password`.
    pub fn derive(&self, password: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        self.validate()?;
        let salt = hex::decode(self.salt_hex())
            .map_err(|e| anyhow::anyhow!("kdf salt is not hex: {}", e))?;
        KeyDerivation::new(self.algorithm()).derive_key(password, &salt, CREDENTIAL_LEN)
    }
}

pub struct KeyDerivation {
    algorithm: KDFAlgorithm,
}

impl KeyDerivation {
    pub fn new(algorithm: KDFAlgorithm) -> Self {
        Self { algorithm }
    }

    pub fn pbkdf2(iterations: u32) -> Self {
        Self::new(KDFAlgorithm::PBKDF2 { iterations })
    }

    pub fn scrypt(n: u32, r: u32, p: u32) -> Self {
        Self::new(KDFAlgorithm::Scrypt { n, r, p })
    }

    pub fn derive_key(
        &self,
        password: &[u8],
        salt: &[u8],
        key_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("Deriving key with length {} bytes", key_length);

        match &self.algorithm {
            KDFAlgorithm::PBKDF2 { iterations } => {
                self.derive_pbkdf2(password, salt, *iterations, key_length)
            }
            KDFAlgorithm::Scrypt { n, r, p } => {
                self.derive_scrypt(password, salt, *n, *r, *p, key_length)
            }
        }
    }

    fn derive_pbkdf2(
        &self,
        password: &[u8],
        salt: &[u8],
        iterations: u32,
        key_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("Using PBKDF2 with {} iterations", iterations);

        let mut key = Zeroizing::new(vec![0u8; key_length]);
        pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut key);
        Ok(key)
    }

    fn derive_scrypt(
        &self,
        password: &[u8],
        salt: &[u8],
        n: u32,
        r: u32,
        p: u32,
        key_length: usize,
    ) -> Result<Zeroizing<Vec<u8>>> {
        debug!("Using Scrypt with parameters N={}, r={}, p={}", n, r, p);

        if !n.is_power_of_two() {
            anyhow::bail!("Scrypt N must be a power of two, got {}", n);
        }
        let params = Params::new(n.trailing_zeros() as u8, r, p, key_length)
            .map_err(|e| anyhow::anyhow!("Invalid Scrypt parameters: {}", e))?;

        let mut key = Zeroizing::new(vec![0u8; key_length]);
        scrypt::scrypt(password, salt, &params, &mut key)
            .map_err(|e| anyhow::anyhow!("Scrypt derivation failed: {}", e))?;
        Ok(key)
    }

    pub fn generate_salt(length: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut salt = vec![0u8; length];
        rand::rngs::OsRng.fill_bytes(&mut salt);
        salt
    }
}
