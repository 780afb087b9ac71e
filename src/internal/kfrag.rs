use crate::internal::curve::{CurveBN, CurvePoint, Params};
use crate::internal::errors::PreErrors;
use crate::internal::keys::Signature;
use crate::internal::utils::to_hex;

use std::fmt;
use std::sync::Arc;

pub const KFRAG_ID_LENGTH: usize = 32;

/// Explicit identity of a KFrag; the share index is derived from it.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KFragId([u8; KFRAG_ID_LENGTH]);

impl KFragId {
    pub const LENGTH: usize = KFRAG_ID_LENGTH;

    pub fn random() -> Result<Self, PreErrors> {
        let mut id = [0u8; KFRAG_ID_LENGTH];
        getrandom::getrandom(&mut id).map_err(|_| PreErrors::DerivationError)?;
        Ok(KFragId(id))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreErrors> {
        if bytes.len() != KFRAG_ID_LENGTH {
            return Err(PreErrors::InvalidBytes);
        }
        let mut id = [0u8; KFRAG_ID_LENGTH];
        id.copy_from_slice(bytes);
        Ok(KFragId(id))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for KFragId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&to_hex(&self.0))
    }
}

impl fmt::Debug for KFragId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "KFragId({})", &to_hex(&self.0)[..16])
    }
}

/// The keys a KFrag or CFrag is checked against: Alice's encryption key,
/// Bob's encryption key and Alice's verifying key.
#[derive(Clone, PartialEq, Debug)]
pub struct CorrectnessKeys {
    pub delegating: CurvePoint,
    pub receiving: CurvePoint,
    pub verifying: CurvePoint,
}

impl CorrectnessKeys {
    pub fn new(delegating: &CurvePoint, receiving: &CurvePoint, verifying: &CurvePoint) -> Self {
        CorrectnessKeys {
            delegating: delegating.clone(),
            receiving: receiving.clone(),
            verifying: verifying.clone(),
        }
    }
}

pub(crate) fn proxy_signature_message(
    id: &KFragId,
    commitment: &CurvePoint,
    precursor: &CurvePoint,
    keys: &CorrectnessKeys,
) -> Vec<u8> {
    let mut msg = id.as_bytes().to_vec();
    msg.extend_from_slice(&commitment.to_bytes());
    msg.extend_from_slice(&precursor.to_bytes());
    msg.extend_from_slice(&keys.delegating.to_bytes());
    msg.extend_from_slice(&keys.receiving.to_bytes());
    msg
}

pub(crate) fn receiver_signature_message(
    id: &KFragId,
    commitment: &CurvePoint,
    precursor: &CurvePoint,
    keys: &CorrectnessKeys,
) -> Vec<u8> {
    let mut msg = id.as_bytes().to_vec();
    msg.extend_from_slice(&keys.delegating.to_bytes());
    msg.extend_from_slice(&keys.receiving.to_bytes());
    msg.extend_from_slice(&commitment.to_bytes());
    msg.extend_from_slice(&precursor.to_bytes());
    msg
}

/// One share of a re-encryption key, held by exactly one proxy.
#[derive(Clone, PartialEq)]
pub struct KFrag {
    id: KFragId,
    re_key_share: CurveBN,
    commitment: CurvePoint,
    precursor: CurvePoint,
    signature_for_proxy: Signature,
    signature_for_receiver: Signature,
}

impl KFrag {
    pub(crate) fn new(
        id: KFragId,
        re_key_share: CurveBN,
        commitment: CurvePoint,
        precursor: CurvePoint,
        signature_for_proxy: Signature,
        signature_for_receiver: Signature,
    ) -> Self {
        KFrag {
            id,
            re_key_share,
            commitment,
            precursor,
            signature_for_proxy,
            signature_for_receiver,
        }
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let bn_size = CurveBN::expected_bytes_length(params);
        let point_size = CurvePoint::expected_bytes_length(params);
        let signature_size = Signature::expected_bytes_length(params);

        let (id, rest) = bytes.split_at(KFRAG_ID_LENGTH);
        let (re_key_share, rest) = rest.split_at(bn_size);
        let (commitment, rest) = rest.split_at(point_size);
        let (precursor, rest) = rest.split_at(point_size);
        let (signature_for_proxy, signature_for_receiver) = rest.split_at(signature_size);

        Ok(KFrag {
            id: KFragId::from_bytes(id)?,
            re_key_share: CurveBN::from_bytes(re_key_share, params)?,
            commitment: CurvePoint::from_bytes(commitment, params)?,
            precursor: CurvePoint::from_bytes(precursor, params)?,
            signature_for_proxy: Signature::from_bytes(signature_for_proxy, params)?,
            signature_for_receiver: Signature::from_bytes(signature_for_receiver, params)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.id.as_bytes().to_vec();
        bytes.extend_from_slice(&self.re_key_share.to_bytes());
        bytes.extend_from_slice(&self.commitment.to_bytes());
        bytes.extend_from_slice(&self.precursor.to_bytes());
        bytes.extend_from_slice(&self.signature_for_proxy.to_bytes());
        bytes.extend_from_slice(&self.signature_for_receiver.to_bytes());
        bytes
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        KFRAG_ID_LENGTH
            + CurveBN::expected_bytes_length(params)
            + 2 * CurvePoint::expected_bytes_length(params)
            + 2 * Signature::expected_bytes_length(params)
    }

    /// Checks the commitment `U * rk` and the delegator's signature for proxies.
    pub fn verify(&self, keys: &CorrectnessKeys) -> bool {
        let params = self.commitment.params();
        if &CurvePoint::u_point(params) * &self.re_key_share != self.commitment {
            return false;
        }
        let msg = proxy_signature_message(&self.id, &self.commitment, &self.precursor, keys);
        self.signature_for_proxy.verify(&msg, &keys.verifying)
    }

    pub fn id(&self) -> KFragId {
        self.id
    }

    pub fn re_key_share(&self) -> &CurveBN {
        &self.re_key_share
    }

    pub fn commitment(&self) -> &CurvePoint {
        &self.commitment
    }

    pub fn precursor(&self) -> &CurvePoint {
        &self.precursor
    }

    pub fn signature_for_receiver(&self) -> &Signature {
        &self.signature_for_receiver
    }
}

impl fmt::Debug for KFrag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("KFrag")
            .field("id", &self.id)
            .field("commitment", &self.commitment)
            .field("precursor", &self.precursor)
            .finish()
    }
}
