use crate::internal::schemes::keccak_digest;
use crate::internal::utils::to_hex;
use crate::pre::{Capsule, CurvePoint, PreErrors};

use std::fmt;

macro_rules! fixed_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name([u8; $len]);

        impl $name {
            pub const LENGTH: usize = $len;

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, PreErrors> {
                if bytes.len() != $len {
                    return Err(PreErrors::InvalidBytes);
                }
                let mut id = [0u8; $len];
                id.copy_from_slice(bytes);
                Ok($name(id))
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str(&to_hex(&self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), &to_hex(&self.0)[..12])
            }
        }
    };
}

fixed_id!(
    /// Hashed resource access code: the policy identifier.
    Hrac,
    32
);
fixed_id!(
    /// Canonical address of a proxy's verifying key.
    ProxyId,
    20
);
fixed_id!(
    /// Canonical address of a requester's (delegatee's) verifying key.
    RequesterId,
    20
);
fixed_id!(CapsuleId, 32);

// keccak256(x || y)[12..]
fn canonical_address(verifying_key: &CurvePoint) -> [u8; 20] {
    let digest = keccak_digest(&verifying_key.to_affine_bytes());
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

impl Hrac {
    pub fn derive(delegator: &CurvePoint, delegatee: &CurvePoint, label: &[u8]) -> Self {
        let mut to_hash = delegator.to_bytes();
        to_hash.extend_from_slice(&delegatee.to_bytes());
        to_hash.extend_from_slice(label);
        Hrac(keccak_digest(&to_hash))
    }
}

impl ProxyId {
    pub fn from_verifying_key(verifying_key: &CurvePoint) -> Self {
        ProxyId(canonical_address(verifying_key))
    }
}

impl RequesterId {
    pub fn from_verifying_key(verifying_key: &CurvePoint) -> Self {
        RequesterId(canonical_address(verifying_key))
    }
}

impl CapsuleId {
    pub fn of(capsule: &Capsule) -> Self {
        CapsuleId(capsule.digest())
    }
}
