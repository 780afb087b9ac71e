use crate::policy::errors::PolicyErrors;
use crate::policy::ids::Hrac;
use crate::policy::proxy::{Proxy, Revocation};
use crate::policy::treasure_map::{PolicyRecord, TreasureMap};
use crate::pre::{split_rekey, CorrectnessKeys, CurvePoint, KeyPair, PreErrors, Signer};

use std::sync::Arc;

use log::info;

#[derive(Clone, Debug)]
pub struct EnactedPolicy {
    pub record: PolicyRecord,
    pub treasure_map: TreasureMap,
}

impl EnactedPolicy {
    pub fn hrac(&self) -> Hrac {
        self.record.hrac
    }

    /// One signed revocation per proxy in the treasure map.
    pub fn revocations(&self, stamp: &Signer) -> Result<Vec<Revocation>, PreErrors> {
        self.treasure_map
            .destinations()
            .iter()
            .map(|(proxy_id, _)| Revocation::new(self.record.hrac, *proxy_id, stamp))
            .collect()
    }
}

/// Alice's side of granting a policy: split a re-key for the delegatee
/// across `proxies`, install one KFrag on each and sign the treasure map.
///
/// Publishing the result is left to the caller.
pub fn enact_policy(
    delegator: &KeyPair,
    stamp: &Signer,
    delegatee_key: &CurvePoint,
    delegatee_verifying_key: &CurvePoint,
    label: &[u8],
    threshold: usize,
    proxies: &[Arc<Proxy>],
) -> Result<EnactedPolicy, PolicyErrors> {
    let shares = proxies.len();
    let hrac = Hrac::derive(stamp.verifying_key(), delegatee_verifying_key, label);
    let kfrags = split_rekey(delegator, delegatee_key, threshold, shares, stamp)?;
    let keys = CorrectnessKeys::new(delegator.public_key(), delegatee_key, stamp.verifying_key());

    let mut destinations = Vec::with_capacity(shares);
    for (proxy, kfrag) in proxies.iter().zip(kfrags) {
        destinations.push((proxy.id(), kfrag.id()));
        proxy.install_kfrag(hrac, label, delegatee_verifying_key, kfrag, &keys)?;
    }

    let treasure_map = TreasureMap::new(hrac, destinations, stamp)?;
    info!("Enacted {}-of-{} policy {}", threshold, shares, hrac);

    Ok(EnactedPolicy {
        record: PolicyRecord {
            hrac,
            label: label.to_vec(),
            threshold,
            shares,
            delegating_key: delegator.public_key().clone(),
            verifying_key: stamp.verifying_key().clone(),
        },
        treasure_map,
    })
}
