pub use crate::internal::capsule::{ActivatedCapsule, CFrag, Capsule};
pub use crate::internal::curve::{CurveBN, CurvePoint, Params};
pub use crate::internal::errors::PreErrors;
pub use crate::internal::keys::{KeyPair, Signature, Signer};
pub use crate::internal::kfrag::{CorrectnessKeys, KFrag, KFragId};

use crate::internal::kfrag::{proxy_signature_message, receiver_signature_message};
use crate::internal::schemes::{dem_decrypt, dem_encrypt, hash_to_curve_blake, kdf};
use crate::internal::utils::{lambda_coeff, new_constant_sorrow, poly_eval};

use std::collections::HashSet;
use std::sync::Arc;

use openssl::nid::Nid;

/// Creates the standard parameters needed to operate with this crate, i.e.
/// the SECP256K1 curve.
pub fn new_standard_params() -> Result<Arc<Params>, PreErrors> {
    Ok(Arc::new(Params::new(Nid::SECP256K1)?))
}

pub fn generate_keypair(params: &Arc<Params>) -> Result<KeyPair, PreErrors> {
    KeyPair::new(params)
}

/// Encapsulates a fresh key for `recipient_pk` and encrypts `plaintext`
/// under it, binding the capsule as associated data.
///
/// Returns the capsule and the ciphertext.
pub fn encrypt(recipient_pk: &CurvePoint, plaintext: &[u8]) -> Result<(Capsule, Vec<u8>), PreErrors> {
    let (key, capsule) = encapsulate(recipient_pk)?;
    let ciphertext = dem_encrypt(&key, plaintext, &capsule.to_bytes())?;
    Ok((capsule, ciphertext))
}

/// Opens a capsule with the private key it was created for.
pub fn decrypt(capsule: &Capsule, ciphertext: &[u8], private_key: &CurveBN) -> Result<Vec<u8>, PreErrors> {
    if !capsule.verify() {
        return Err(PreErrors::InvalidCapsule);
    }
    let shared_key = &(capsule.e() + capsule.v()) * private_key;
    let key = kdf(&shared_key.to_bytes(), None, None)?;
    dem_decrypt(&key, ciphertext, &capsule.to_bytes())
}

/// A single, unsplit re-encryption key from `delegating` to `receiving_pk`.
pub fn rekey(delegating: &KeyPair, receiving_pk: &CurvePoint, signer: &Signer) -> Result<KFrag, PreErrors> {
    let mut kfrags = split_rekey(delegating, receiving_pk, 1, 1, signer)?;
    kfrags.pop().ok_or(PreErrors::InvalidThreshold(1, 1))
}

/// Creates a re-encryption key from the delegating key pair to the receiving
/// public key, and splits it into `n` KFrags with Shamir's Secret Sharing so
/// that any `threshold` of them suffice.
///
/// Note: the name of this function in the paper is ReKeyGen.
pub fn split_rekey(
    delegating: &KeyPair,
    receiving_pk: &CurvePoint,
    threshold: usize,
    n: usize,
    signer: &Signer,
) -> Result<Vec<KFrag>, PreErrors> {
    if threshold == 0 || threshold > n {
        return Err(PreErrors::InvalidThreshold(threshold, n));
    }
    let params = delegating.public_key().params();
    if !params.same_curve(receiving_pk.params()) || !params.same_curve(signer.params()) {
        return Err(PreErrors::KeysParametersNotEq);
    }

    // Ephemeral DH with Bob; only he can recompute `dh` and hence `d` and the
    // share indices.
    let precursor = KeyPair::new(params)?;
    let dh_point = receiving_pk * precursor.private_key();
    let transcript = dh_transcript(precursor.public_key(), receiving_pk, &dh_point);
    let d = non_interactive_d(&transcript, params)?;

    let mut coefficients = Vec::with_capacity(threshold);
    coefficients.push(delegating.private_key() / &d);
    for _ in 1..threshold {
        coefficients.push(CurveBN::random(params)?);
    }

    let keys = CorrectnessKeys::new(delegating.public_key(), receiving_pk, signer.verifying_key());
    let u = CurvePoint::u_point(params);
    let mut ids = HashSet::with_capacity(n);
    let mut kfrags = Vec::with_capacity(n);
    while kfrags.len() < n {
        let id = KFragId::random()?;
        if !ids.insert(id) {
            continue;
        }
        let share_index = share_index(&transcript, &id, params)?;
        let rk = poly_eval(&coefficients, &share_index);
        let commitment = &u * &rk;

        let signature_for_receiver = signer.sign(&receiver_signature_message(
            &id,
            &commitment,
            precursor.public_key(),
            &keys,
        ))?;
        let signature_for_proxy = signer.sign(&proxy_signature_message(
            &id,
            &commitment,
            precursor.public_key(),
            &keys,
        ))?;

        kfrags.push(KFrag::new(
            id,
            rk,
            commitment,
            precursor.public_key().clone(),
            signature_for_proxy,
            signature_for_receiver,
        ));
    }

    Ok(kfrags)
}

/// Performs the re-encryption operation of proxies and produces a capsule
/// fragment with its correctness proof. Deterministic in its inputs.
pub fn reencrypt(kfrag: &KFrag, capsule: &Capsule) -> Result<CFrag, PreErrors> {
    CFrag::new(kfrag, capsule)
}

/// Validates a set of fragments for `capsule` and activates it.
///
/// Duplicates are rejected before the count is checked, so a set padded with
/// repeats never passes for a larger one.
pub fn combine(capsule: &Capsule, cfrags: &[CFrag], threshold: usize) -> Result<ActivatedCapsule, PreErrors> {
    let mut seen = HashSet::with_capacity(cfrags.len());
    for cfrag in cfrags {
        if !seen.insert(cfrag.kfrag_id()) {
            return Err(PreErrors::DuplicateFragment(cfrag.kfrag_id()));
        }
    }
    if threshold == 0 {
        return Err(PreErrors::InvalidThreshold(0, cfrags.len()));
    }
    if cfrags.len() < threshold {
        return Err(PreErrors::InsufficientFragments(threshold, cfrags.len()));
    }
    let precursor = cfrags[0].precursor();
    if cfrags.iter().any(|cfrag| cfrag.precursor() != precursor) {
        return Err(PreErrors::InvalidFragment("fragments come from different re-keys"));
    }
    if !capsule.verify() {
        return Err(PreErrors::InvalidCapsule);
    }
    Ok(ActivatedCapsule::new(capsule.clone(), cfrags.to_vec()))
}

/// Bob's side: interpolates the fragments of an activated capsule and opens it.
pub fn decrypt_reencrypted(
    activated: &ActivatedCapsule,
    ciphertext: &[u8],
    receiving: &KeyPair,
    delegating_pk: &CurvePoint,
) -> Result<Vec<u8>, PreErrors> {
    let capsule = activated.capsule();
    let cfrags = activated.cfrags();
    let params = capsule.params();
    let precursor = match cfrags.first() {
        Some(cfrag) => cfrag.precursor(),
        None => return Err(PreErrors::InsufficientFragments(1, 0)),
    };

    let dh_point = precursor * receiving.private_key();
    let transcript = dh_transcript(precursor, receiving.public_key(), &dh_point);

    let xs = cfrags
        .iter()
        .map(|cfrag| share_index(&transcript, &cfrag.kfrag_id(), params))
        .collect::<Result<Vec<_>, _>>()?;

    let mut e_prime: Option<CurvePoint> = None;
    let mut v_prime: Option<CurvePoint> = None;
    for (cfrag, x) in cfrags.iter().zip(xs.iter()) {
        let lambda = lambda_coeff(x, &xs);
        let e_i = cfrag.e_i_point() * &lambda;
        let v_i = cfrag.v_i_point() * &lambda;
        e_prime = Some(match e_prime {
            Some(acc) => &acc + &e_i,
            None => e_i,
        });
        v_prime = Some(match v_prime {
            Some(acc) => &acc + &v_i,
            None => v_i,
        });
    }
    let (e_prime, v_prime) = match (e_prime, v_prime) {
        (Some(e), Some(v)) => (e, v),
        _ => return Err(PreErrors::InsufficientFragments(1, 0)),
    };

    let d = non_interactive_d(&transcript, params)?;
    let h = Capsule::challenge(capsule.e(), capsule.v())?;

    // pk_A * (s / d) == h * E' + V'
    if delegating_pk * &(capsule.sign() / &d) != &(&e_prime * &h) + &v_prime {
        return Err(PreErrors::DecryptionError);
    }

    let shared_key = &(&e_prime + &v_prime) * &d;
    let key = kdf(&shared_key.to_bytes(), None, None)?;
    dem_decrypt(&key, ciphertext, &capsule.to_bytes())
}

fn encapsulate(recipient_pk: &CurvePoint) -> Result<(Vec<u8>, Capsule), PreErrors> {
    let params = recipient_pk.params();

    let r = CurveBN::random(params)?;
    let u = CurveBN::random(params)?;
    let e = CurvePoint::mul_gen(&r, params);
    let v = CurvePoint::mul_gen(&u, params);

    let h = Capsule::challenge(&e, &v)?;
    let s = &u + &(&r * &h);

    let shared_key = recipient_pk * &(&r + &u);
    let key = kdf(&shared_key.to_bytes(), None, None)?;

    Ok((key, Capsule::new(e, v, s)))
}

fn dh_transcript(precursor: &CurvePoint, receiving_pk: &CurvePoint, dh_point: &CurvePoint) -> Vec<u8> {
    let mut transcript = precursor.to_bytes();
    transcript.extend_from_slice(&receiving_pk.to_bytes());
    transcript.extend_from_slice(&dh_point.to_bytes());
    transcript
}

// Secret value 'd' allows to make Umbral non-interactive
fn non_interactive_d(transcript: &[u8], params: &Arc<Params>) -> Result<CurveBN, PreErrors> {
    let mut to_hash = transcript.to_vec();
    to_hash.extend_from_slice(&new_constant_sorrow("NON_INTERACTIVE"));
    hash_to_curve_blake(&to_hash, params)
}

fn share_index(transcript: &[u8], id: &KFragId, params: &Arc<Params>) -> Result<CurveBN, PreErrors> {
    let mut to_hash = transcript.to_vec();
    to_hash.extend_from_slice(&new_constant_sorrow("X_COORDINATE"));
    to_hash.extend_from_slice(id.as_bytes());
    hash_to_curve_blake(&to_hash, params)
}
