use crate::internal::curve::{CurveBN, CurvePoint, Params};
use crate::internal::errors::PreErrors;
use crate::internal::schemes::{Hash, SHA256Hash};

use std::fmt;
use std::sync::Arc;

use openssl::ec::EcKey;
use openssl::ecdsa::EcdsaSig;
use openssl::pkey::Private;

/// An encryption key pair. The private half is never printed.
#[derive(Clone)]
pub struct KeyPair {
    pk: CurvePoint,
    sk: CurveBN,
}

impl KeyPair {
    pub fn new(params: &Arc<Params>) -> Result<Self, PreErrors> {
        let key = EcKey::generate(params.group())?;
        Ok(KeyPair {
            pk: CurvePoint::from_ec_point(key.public_key(), params)?,
            sk: CurveBN::from_big_num(key.private_key(), params)?,
        })
    }

    /// Rebuilds a pair from its private scalar; the public point is recomputed.
    pub fn from_bytes(sk: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        let sk = CurveBN::from_bytes(sk, params)?;
        Ok(KeyPair {
            pk: CurvePoint::mul_gen(&sk, params),
            sk,
        })
    }

    pub fn public_key(&self) -> &CurvePoint {
        &self.pk
    }

    pub fn private_key(&self) -> &CurveBN {
        &self.sk
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KeyPair").field("pk", &self.pk).finish()
    }
}

/// ECDSA signature, encoded as `r || s`.
#[derive(Clone, PartialEq, Debug)]
pub struct Signature {
    r: CurveBN,
    s: CurveBN,
}

impl Signature {
    fn from_ecdsa_sig(sig: &EcdsaSig, params: &Arc<Params>) -> Result<Self, PreErrors> {
        Ok(Signature {
            r: CurveBN::from_big_num(sig.r(), params)?,
            s: CurveBN::from_big_num(sig.s(), params)?,
        })
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let (r, s) = bytes.split_at(bytes.len() / 2);
        Ok(Signature {
            r: CurveBN::from_bytes(r, params)?,
            s: CurveBN::from_bytes(s, params)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.r.to_bytes();
        bytes.extend_from_slice(&self.s.to_bytes());
        bytes
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        2 * params.group_order_size_in_bytes()
    }

    /// Any malformed key or signature simply fails verification.
    pub fn verify(&self, data: &[u8], verifying_pk: &CurvePoint) -> bool {
        let digest = sha2_digest(data);
        let verify = || -> Result<bool, openssl::error::ErrorStack> {
            let key = EcKey::from_public_key(verifying_pk.params().group(), verifying_pk.point())?;
            let sig = EcdsaSig::from_private_components(self.r.bn().to_owned()?, self.s.bn().to_owned()?)?;
            sig.verify(&digest, &key)
        };
        verify().unwrap_or(false)
    }
}

fn sha2_digest(data: &[u8]) -> Vec<u8> {
    let mut hash = SHA256Hash::new(b"");
    hash.update(data);
    hash.finalize()
}

/// A signing key ("stamp").
pub struct Signer {
    key: EcKey<Private>,
    pk: CurvePoint,
    params: Arc<Params>,
}

impl Signer {
    pub fn new(params: &Arc<Params>) -> Result<Self, PreErrors> {
        let key = EcKey::generate(params.group())?;
        let pk = CurvePoint::from_ec_point(key.public_key(), params)?;
        Ok(Signer {
            key,
            pk,
            params: Arc::clone(params),
        })
    }

    pub fn sign(&self, data: &[u8]) -> Result<Signature, PreErrors> {
        let sig = EcdsaSig::sign(&sha2_digest(data), &self.key)?;
        Signature::from_ecdsa_sig(&sig, &self.params)
    }

    pub fn verifying_key(&self) -> &CurvePoint {
        &self.pk
    }

    pub fn params(&self) -> &Arc<Params> {
        &self.params
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Signer").field("pk", &self.pk).finish()
    }
}
