use crate::internal::curve::{CurveBN, CurvePoint, Params};
use crate::internal::errors::PreErrors;
use crate::internal::keys::Signature;
use crate::internal::kfrag::{receiver_signature_message, CorrectnessKeys, KFrag, KFragId, KFRAG_ID_LENGTH};
use crate::internal::schemes::{hash_to_curve_blake, hash_to_curvebn, keccak_digest, Blake2bHash, ExtendedKeccak};
use crate::internal::utils::to_hex;

use std::fmt;
use std::sync::Arc;

const PROOF_NONCE_CUSTOMIZATION: &[u8] = b"cfrag_proof_nonce";

/// The KEM half of a ciphertext: `(E, V, s)` with `g^s = V + h * E`.
#[derive(Clone, PartialEq)]
pub struct Capsule {
    e_point: CurvePoint,
    v_point: CurvePoint,
    sign: CurveBN,
}

impl Capsule {
    pub(crate) fn new(e_point: CurvePoint, v_point: CurvePoint, sign: CurveBN) -> Self {
        Capsule {
            e_point,
            v_point,
            sign,
        }
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let point_size = CurvePoint::expected_bytes_length(params);
        let (e, rest) = bytes.split_at(point_size);
        let (v, s) = rest.split_at(point_size);

        Ok(Capsule {
            e_point: CurvePoint::from_bytes(e, params)?,
            v_point: CurvePoint::from_bytes(v, params)?,
            sign: CurveBN::from_bytes(s, params)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.e_point.to_bytes();
        bytes.extend_from_slice(&self.v_point.to_bytes());
        bytes.extend_from_slice(&self.sign.to_bytes());
        bytes
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        CurveBN::expected_bytes_length(params) + 2 * CurvePoint::expected_bytes_length(params)
    }

    pub(crate) fn challenge(e: &CurvePoint, v: &CurvePoint) -> Result<CurveBN, PreErrors> {
        let mut to_hash = e.to_bytes();
        to_hash.extend_from_slice(&v.to_bytes());
        hash_to_curve_blake(&to_hash, e.params())
    }

    pub fn verify(&self) -> bool {
        let params = self.e_point.params();
        match Self::challenge(&self.e_point, &self.v_point) {
            Ok(h) => CurvePoint::mul_gen(&self.sign, params) == &self.v_point + &(&self.e_point * &h),
            Err(_) => false,
        }
    }

    /// Keccak256 of the canonical encoding.
    pub fn digest(&self) -> [u8; 32] {
        keccak_digest(&self.to_bytes())
    }

    pub fn e(&self) -> &CurvePoint {
        &self.e_point
    }

    pub fn v(&self) -> &CurvePoint {
        &self.v_point
    }

    pub fn sign(&self) -> &CurveBN {
        &self.sign
    }

    pub fn params(&self) -> &Arc<Params> {
        self.e_point.params()
    }
}

impl fmt::Debug for Capsule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Capsule({})", &to_hex(&self.digest())[..16])
    }
}

/// Proof that `e_i`, `v_i` and the KFrag commitment share one exponent.
#[derive(Clone, PartialEq, Debug)]
pub struct CorrectnessProof {
    e2: CurvePoint,
    v2: CurvePoint,
    u1: CurvePoint,
    u2: CurvePoint,
    z3: CurveBN,
    kfrag_signature: Signature,
}

impl CorrectnessProof {
    fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        let point_size = CurvePoint::expected_bytes_length(params);
        let bn_size = CurveBN::expected_bytes_length(params);
        let (e2, rest) = bytes.split_at(point_size);
        let (v2, rest) = rest.split_at(point_size);
        let (u1, rest) = rest.split_at(point_size);
        let (u2, rest) = rest.split_at(point_size);
        let (z3, kfrag_signature) = rest.split_at(bn_size);

        Ok(CorrectnessProof {
            e2: CurvePoint::from_bytes(e2, params)?,
            v2: CurvePoint::from_bytes(v2, params)?,
            u1: CurvePoint::from_bytes(u1, params)?,
            u2: CurvePoint::from_bytes(u2, params)?,
            z3: CurveBN::from_bytes(z3, params)?,
            kfrag_signature: Signature::from_bytes(kfrag_signature, params)?,
        })
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.e2.to_bytes();
        bytes.extend_from_slice(&self.v2.to_bytes());
        bytes.extend_from_slice(&self.u1.to_bytes());
        bytes.extend_from_slice(&self.u2.to_bytes());
        bytes.extend_from_slice(&self.z3.to_bytes());
        bytes.extend_from_slice(&self.kfrag_signature.to_bytes());
        bytes
    }

    fn expected_bytes_length(params: &Arc<Params>) -> usize {
        4 * CurvePoint::expected_bytes_length(params)
            + CurveBN::expected_bytes_length(params)
            + Signature::expected_bytes_length(params)
    }
}

// h = H(E, E1, E2, V, V1, V2, U, U1, U2)
fn proof_challenge(points: [&CurvePoint; 9], params: &Arc<Params>) -> Result<CurveBN, PreErrors> {
    let mut to_hash = Vec::new();
    for point in points.iter() {
        to_hash.extend_from_slice(&point.to_bytes());
    }
    hash_to_curvebn::<ExtendedKeccak>(&to_hash, params, None)
}

/// A capsule fragment: one proxy's re-encryption of a capsule.
#[derive(Clone, PartialEq)]
pub struct CFrag {
    e_i_point: CurvePoint,
    v_i_point: CurvePoint,
    kfrag_id: KFragId,
    precursor: CurvePoint,
    proof: CorrectnessProof,
}

impl CFrag {
    /// Re-encrypts `capsule` under `kfrag` and proves it. The proof nonce is
    /// derived from the share and the capsule, so the output is deterministic.
    pub(crate) fn new(kfrag: &KFrag, capsule: &Capsule) -> Result<Self, PreErrors> {
        if !capsule.verify() {
            return Err(PreErrors::InvalidCapsule);
        }
        let params = capsule.params();
        let rk = kfrag.re_key_share();

        let e_1 = capsule.e() * rk;
        let v_1 = capsule.v() * rk;

        let mut nonce_seed = rk.to_bytes();
        nonce_seed.extend_from_slice(&capsule.to_bytes());
        nonce_seed.extend_from_slice(&e_1.to_bytes());
        let t = hash_to_curvebn::<Blake2bHash>(&nonce_seed, params, Some(PROOF_NONCE_CUSTOMIZATION))?;

        let u = CurvePoint::u_point(params);
        let u_1 = kfrag.commitment();
        let e_2 = capsule.e() * &t;
        let v_2 = capsule.v() * &t;
        let u_2 = &u * &t;

        let h = proof_challenge(
            [capsule.e(), &e_1, &e_2, capsule.v(), &v_1, &v_2, &u, u_1, &u_2],
            params,
        )?;
        let z_3 = &t + &(&h * rk);

        Ok(CFrag {
            e_i_point: e_1,
            v_i_point: v_1,
            kfrag_id: kfrag.id(),
            precursor: kfrag.precursor().clone(),
            proof: CorrectnessProof {
                e2: e_2,
                v2: v_2,
                u1: u_1.clone(),
                u2: u_2,
                z3: z_3,
                kfrag_signature: kfrag.signature_for_receiver().clone(),
            },
        })
    }

    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let point_size = CurvePoint::expected_bytes_length(params);
        let (e_i, rest) = bytes.split_at(point_size);
        let (v_i, rest) = rest.split_at(point_size);
        let (kfrag_id, rest) = rest.split_at(KFRAG_ID_LENGTH);
        let (precursor, proof) = rest.split_at(point_size);

        Ok(CFrag {
            e_i_point: CurvePoint::from_bytes(e_i, params)?,
            v_i_point: CurvePoint::from_bytes(v_i, params)?,
            kfrag_id: KFragId::from_bytes(kfrag_id)?,
            precursor: CurvePoint::from_bytes(precursor, params)?,
            proof: CorrectnessProof::from_bytes(proof, params)?,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.e_i_point.to_bytes();
        bytes.extend_from_slice(&self.v_i_point.to_bytes());
        bytes.extend_from_slice(self.kfrag_id.as_bytes());
        bytes.extend_from_slice(&self.precursor.to_bytes());
        bytes.extend_from_slice(&self.proof.to_bytes());
        bytes
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        3 * CurvePoint::expected_bytes_length(params)
            + KFRAG_ID_LENGTH
            + CorrectnessProof::expected_bytes_length(params)
    }

    /// Checks the delegator's signature over the KFrag this fragment came
    /// from, then the three discrete-log equalities of the proof.
    ///
    /// `Ok(false)` means the fragment is wrong; `Err` means the capsule is.
    pub fn verify_correctness(&self, capsule: &Capsule, keys: &CorrectnessKeys) -> Result<bool, PreErrors> {
        if !capsule.verify() {
            return Err(PreErrors::InvalidCapsule);
        }
        let params = capsule.params();
        let proof = &self.proof;

        let msg = receiver_signature_message(&self.kfrag_id, &proof.u1, &self.precursor, keys);
        if !proof.kfrag_signature.verify(&msg, &keys.verifying) {
            return Ok(false);
        }

        let (e, v) = (capsule.e(), capsule.v());
        let u = CurvePoint::u_point(params);
        let h = proof_challenge(
            [e, &self.e_i_point, &proof.e2, v, &self.v_i_point, &proof.v2, &u, &proof.u1, &proof.u2],
            params,
        )?;

        let z_3 = &proof.z3;
        Ok(e * z_3 == &proof.e2 + &(&self.e_i_point * &h)
            && v * z_3 == &proof.v2 + &(&self.v_i_point * &h)
            && &u * z_3 == &proof.u2 + &(&proof.u1 * &h))
    }

    pub fn kfrag_id(&self) -> KFragId {
        self.kfrag_id
    }

    pub fn precursor(&self) -> &CurvePoint {
        &self.precursor
    }

    pub fn e_i_point(&self) -> &CurvePoint {
        &self.e_i_point
    }

    pub fn v_i_point(&self) -> &CurvePoint {
        &self.v_i_point
    }
}

impl fmt::Debug for CFrag {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CFrag")
            .field("kfrag_id", &self.kfrag_id)
            .field("e_i", &self.e_i_point)
            .field("v_i", &self.v_i_point)
            .finish()
    }
}

/// A capsule together with enough distinct, consistent fragments to open it.
#[derive(Clone, Debug)]
pub struct ActivatedCapsule {
    capsule: Capsule,
    cfrags: Vec<CFrag>,
}

impl ActivatedCapsule {
    pub(crate) fn new(capsule: Capsule, cfrags: Vec<CFrag>) -> Self {
        ActivatedCapsule { capsule, cfrags }
    }

    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    pub fn cfrags(&self) -> &[CFrag] {
        &self.cfrags
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::internal::keys::Signer;
    use crate::pre::{encrypt, generate_keypair, new_standard_params, reencrypt, split_rekey};

    #[test]
    fn capsule_bytes_and_tampering() {
        let params = new_standard_params().unwrap();
        let alice = generate_keypair(&params).unwrap();
        let (capsule, _) = encrypt(alice.public_key(), b"data").unwrap();
        assert!(capsule.verify());

        let bytes = capsule.to_bytes();
        assert_eq!(bytes.len(), 98);
        assert_eq!(Capsule::from_bytes(&bytes, &params).unwrap(), capsule);

        let forged = Capsule::new(capsule.v().clone(), capsule.e().clone(), capsule.sign().clone());
        assert!(!forged.verify());
    }

    #[test]
    fn cfrag_correctness() {
        let params = new_standard_params().unwrap();
        let alice = generate_keypair(&params).unwrap();
        let bob = generate_keypair(&params).unwrap();
        let signer = Signer::new(&params).unwrap();
        let keys = CorrectnessKeys::new(alice.public_key(), bob.public_key(), signer.verifying_key());

        let (capsule, _) = encrypt(alice.public_key(), b"data").unwrap();
        let (other_capsule, _) = encrypt(alice.public_key(), b"data").unwrap();
        let kfrags = split_rekey(&alice, bob.public_key(), 2, 3, &signer).unwrap();

        let cfrag = reencrypt(&kfrags[0], &capsule).unwrap();
        assert_eq!(cfrag.kfrag_id(), kfrags[0].id());
        assert_eq!(cfrag.verify_correctness(&capsule, &keys), Ok(true));
        assert_eq!(cfrag.verify_correctness(&other_capsule, &keys), Ok(false));

        let mallory = Signer::new(&params).unwrap();
        let wrong = CorrectnessKeys::new(alice.public_key(), bob.public_key(), mallory.verifying_key());
        assert_eq!(cfrag.verify_correctness(&capsule, &wrong), Ok(false));

        let bytes = cfrag.to_bytes();
        assert_eq!(bytes.len(), CFrag::expected_bytes_length(&params));
        let decoded = CFrag::from_bytes(&bytes, &params).unwrap();
        assert_eq!(decoded, cfrag);
        assert_eq!(decoded.verify_correctness(&capsule, &keys), Ok(true));
    }
}
