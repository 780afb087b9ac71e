use crate::internal::curve::{CurveBN, Params};
use crate::internal::errors::PreErrors;

use std::sync::Arc;

use aead::{Aead, KeyInit, Payload};
use blake2::{Blake2b, Digest};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use hkdf::Hkdf;
use openssl::bn::{BigNum, BigNumContext};
use openssl::ec::{EcGroupRef, EcPoint};
use sha2::Sha256;
use sha3::Keccak256;

pub const DEM_KEYSIZE: usize = 32;
pub const DEM_NONCE_SIZE: usize = 12;
const DEM_TAG_SIZE: usize = 16;
pub const DEM_MIN_SIZE: usize = DEM_NONCE_SIZE + DEM_TAG_SIZE;
const CUSTOMIZATION_STRING_LENGTH: usize = 64;
const CUSTOMIZATION_STRING_PAD: u8 = 0x00;

/// Incremental hash with a fixed-length customization prefix.
pub trait Hash {
    fn new(customization_string: &[u8]) -> Self;
    fn update(&mut self, data: &[u8]);
    fn finalize(self) -> Vec<u8>;
}

// Customization strings are crate constants; anything longer than the block
// is truncated rather than rejected.
fn padded_customization(customization_string: &[u8]) -> Vec<u8> {
    debug_assert!(customization_string.len() <= CUSTOMIZATION_STRING_LENGTH);
    let mut padded = customization_string.to_vec();
    padded.resize(CUSTOMIZATION_STRING_LENGTH, CUSTOMIZATION_STRING_PAD);
    padded
}

pub struct Blake2bHash {
    digest: Blake2b,
}

impl Hash for Blake2bHash {
    fn new(customization_string: &[u8]) -> Self {
        let mut digest = Blake2b::new();
        digest.update(padded_customization(customization_string));
        Self { digest }
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finalize(self) -> Vec<u8> {
        self.digest.finalize().to_vec()
    }
}

/// Two domain-separated Keccak256 lanes concatenated, giving a 512 bit
/// digest so the reduction modulo the group order is close to uniform.
pub struct ExtendedKeccak {
    upper: Keccak256,
    lower: Keccak256,
}

impl Hash for ExtendedKeccak {
    fn new(customization_string: &[u8]) -> Self {
        let customization = padded_customization(customization_string);
        let mut upper = Keccak256::new();
        upper.update([0x00u8]);
        upper.update(&customization);
        let mut lower = Keccak256::new();
        lower.update([0x01u8]);
        lower.update(&customization);

        Self { upper, lower }
    }

    fn update(&mut self, data: &[u8]) {
        self.upper.update(data);
        self.lower.update(data);
    }

    fn finalize(self) -> Vec<u8> {
        let mut digest = self.upper.finalize().to_vec();
        digest.extend_from_slice(&self.lower.finalize());
        digest
    }
}

pub struct SHA256Hash {
    digest: Sha256,
}

impl Hash for SHA256Hash {
    fn new(customization_string: &[u8]) -> Self {
        let mut digest = Sha256::new();
        digest.update(padded_customization(customization_string));
        Self { digest }
    }

    fn update(&mut self, data: &[u8]) {
        self.digest.update(data);
    }

    fn finalize(self) -> Vec<u8> {
        self.digest.finalize().to_vec()
    }
}

/// Plain Keccak256, used for identifiers (addresses, policy codes, capsule ids).
pub fn keccak_digest(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(&Keccak256::digest(data));
    out
}

pub fn hash_to_curve_blake(bytes: &[u8], params: &Arc<Params>) -> Result<CurveBN, PreErrors> {
    hash_to_curvebn::<Blake2bHash>(bytes, params, None)
}

/// Maps `bytes` to a non-zero scalar: `(H(bytes) mod (q - 1)) + 1`.
pub fn hash_to_curvebn<H>(
    bytes: &[u8],
    params: &Arc<Params>,
    customization_string: Option<&[u8]>,
) -> Result<CurveBN, PreErrors>
where
    H: Hash,
{
    let mut customization = b"hash_to_curvebn".to_vec();
    if let Some(c) = customization_string {
        customization.extend_from_slice(c);
    }
    let mut hash = H::new(&customization);
    hash.update(bytes);
    let digest_bn = BigNum::from_slice(&hash.finalize())?;

    let mut ctx = BigNumContext::new()?;
    let one = BigNum::from_u32(1)?;
    let mut order_minus_one = BigNum::new()?;
    order_minus_one.checked_sub(params.order(), &one)?;

    let mut modulo = BigNum::new()?;
    modulo.nnmod(&digest_bn, &order_minus_one, &mut ctx)?;
    let mut scalar = BigNum::new()?;
    scalar.checked_add(&modulo, &one)?;

    CurveBN::from_big_num(&scalar, params)
}

/// HKDF over BLAKE2b, producing a DEM key.
pub fn kdf(base_key: &[u8], salt: Option<&[u8]>, info: Option<&[u8]>) -> Result<Vec<u8>, PreErrors> {
    let default_salt = [0u8; DEM_KEYSIZE / 8];
    let salt = salt.unwrap_or(&default_salt);
    let info = info.unwrap_or(b"");
    let mut key = vec![0u8; DEM_KEYSIZE];
    Hkdf::<Blake2b>::new(Some(salt), base_key)
        .expand(info, &mut key)
        .map_err(|_| PreErrors::DerivationError)?;
    Ok(key)
}

/// ChaCha20-Poly1305 with a random nonce prepended to the output.
pub fn dem_encrypt(key: &[u8], plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>, PreErrors> {
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| PreErrors::EncryptionError)?;

    let mut nonce_bytes = [0u8; DEM_NONCE_SIZE];
    getrandom::getrandom(&mut nonce_bytes).map_err(|_| PreErrors::EncryptionError)?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let sealed = cipher
        .encrypt(
            nonce,
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| PreErrors::EncryptionError)?;

    let mut ciphertext = nonce_bytes.to_vec();
    ciphertext.extend_from_slice(&sealed);
    Ok(ciphertext)
}

pub fn dem_decrypt(key: &[u8], ciphertext: &[u8], aad: &[u8]) -> Result<Vec<u8>, PreErrors> {
    if ciphertext.len() < DEM_MIN_SIZE {
        return Err(PreErrors::DecryptionError);
    }
    let cipher = ChaCha20Poly1305::new_from_slice(key).map_err(|_| PreErrors::DecryptionError)?;
    let nonce = Nonce::from_slice(&ciphertext[..DEM_NONCE_SIZE]);

    cipher
        .decrypt(
            nonce,
            Payload {
                msg: &ciphertext[DEM_NONCE_SIZE..],
                aad,
            },
        )
        .map_err(|_| PreErrors::DecryptionError)
}

/// Try-and-increment hash to a curve point. Not constant time; only ever fed
/// public data (the generator, when deriving `U`).
pub fn unsafe_hash_to_point<H>(
    data: &[u8],
    label: &[u8],
    group: &EcGroupRef,
    ctx: &mut BigNumContext,
) -> Result<EcPoint, PreErrors>
where
    H: Hash,
{
    let mut to_hash = (label.len() as u64).to_be_bytes().to_vec();
    to_hash.extend_from_slice(label);
    to_hash.extend_from_slice(&(data.len() as u64).to_be_bytes());
    to_hash.extend_from_slice(data);

    let curve_key_size_bytes = ((group.degree() + 7) / 8) as usize;

    for i in 0..u32::MAX {
        let mut hash = H::new(b"");
        hash.update(&to_hash);
        hash.update(&i.to_be_bytes());
        let digest = hash.finalize();

        let prefix = if digest[0] & 1 == 0 { 0x02 } else { 0x03 };
        let mut compressed_point = vec![prefix];
        compressed_point.extend_from_slice(&digest[1..=curve_key_size_bytes]);

        if let Ok(point) = EcPoint::from_bytes(group, &compressed_point, ctx) {
            return Ok(point);
        }
    }

    Err(PreErrors::HashToPointError)
}
