use crate::policy::errors::PolicyErrors;
use crate::policy::ids::{Hrac, ProxyId};
use crate::pre::{CurvePoint, KFragId, PreErrors, Signature, Signer};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use log::debug;

/// What a delegatee needs to know about a policy besides its treasure map.
#[derive(Clone, Debug, PartialEq)]
pub struct PolicyRecord {
    pub hrac: Hrac,
    pub label: Vec<u8>,
    pub threshold: usize,
    pub shares: usize,
    /// Alice's encryption key, the one capsules are created for.
    pub delegating_key: CurvePoint,
    /// Alice's stamp, which signs KFrags and the treasure map.
    pub verifying_key: CurvePoint,
}

/// Ordered assignment of KFrags to proxies for one policy, signed by Alice.
#[derive(Clone, Debug, PartialEq)]
pub struct TreasureMap {
    hrac: Hrac,
    destinations: Vec<(ProxyId, KFragId)>,
    signature: Signature,
}

impl TreasureMap {
    pub fn new(hrac: Hrac, destinations: Vec<(ProxyId, KFragId)>, stamp: &Signer) -> Result<Self, PreErrors> {
        let signature = stamp.sign(&Self::message(&hrac, &destinations))?;
        Ok(TreasureMap {
            hrac,
            destinations,
            signature,
        })
    }

    fn message(hrac: &Hrac, destinations: &[(ProxyId, KFragId)]) -> Vec<u8> {
        let mut msg = hrac.as_bytes().to_vec();
        msg.extend_from_slice(&(destinations.len() as u32).to_be_bytes());
        for (proxy_id, kfrag_id) in destinations {
            msg.extend_from_slice(proxy_id.as_bytes());
            msg.extend_from_slice(kfrag_id.as_bytes());
        }
        msg
    }

    pub fn verify(&self, verifying_key: &CurvePoint) -> bool {
        self.signature
            .verify(&Self::message(&self.hrac, &self.destinations), verifying_key)
    }

    /// Signature, length and uniqueness checks against the policy it claims to serve.
    pub fn validate(&self, record: &PolicyRecord) -> Result<(), PolicyErrors> {
        if self.hrac != record.hrac {
            return Err(PolicyErrors::InvalidTreasureMap("hrac does not match the policy"));
        }
        if self.destinations.len() != record.shares {
            return Err(PolicyErrors::InvalidTreasureMap("length differs from the policy's shares"));
        }
        let proxies: HashSet<_> = self.destinations.iter().map(|(p, _)| p).collect();
        let kfrags: HashSet<_> = self.destinations.iter().map(|(_, k)| k).collect();
        if proxies.len() != self.destinations.len() || kfrags.len() != self.destinations.len() {
            return Err(PolicyErrors::InvalidTreasureMap("repeated proxy or kfrag"));
        }
        if !self.verify(&record.verifying_key) {
            return Err(PolicyErrors::InvalidSignature);
        }
        Ok(())
    }

    pub fn hrac(&self) -> Hrac {
        self.hrac
    }

    pub fn destinations(&self) -> &[(ProxyId, KFragId)] {
        &self.destinations
    }

    pub fn kfrag_for(&self, proxy_id: &ProxyId) -> Option<KFragId> {
        self.destinations
            .iter()
            .find(|(p, _)| p == proxy_id)
            .map(|(_, k)| *k)
    }

    pub fn len(&self) -> usize {
        self.destinations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.destinations.is_empty()
    }
}

pub trait TreasureMapSource {
    fn resolve(&self, hrac: &Hrac) -> Result<TreasureMap, PolicyErrors>;
}

pub trait PolicySource {
    fn policy(&self, hrac: &Hrac) -> Result<PolicyRecord, PolicyErrors>;
}

impl<T: TreasureMapSource + ?Sized> TreasureMapSource for Arc<T> {
    fn resolve(&self, hrac: &Hrac) -> Result<TreasureMap, PolicyErrors> {
        (**self).resolve(hrac)
    }
}

impl<T: PolicySource + ?Sized> PolicySource for Arc<T> {
    fn policy(&self, hrac: &Hrac) -> Result<PolicyRecord, PolicyErrors> {
        (**self).policy(hrac)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PublishOutcome {
    Stored,
    AlreadyKnown,
}

/// In-process policy and treasure map store.
#[derive(Default)]
pub struct PolicyDirectory {
    entries: RwLock<HashMap<Hrac, (PolicyRecord, TreasureMap)>>,
}

impl PolicyDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, record: PolicyRecord, map: TreasureMap) -> Result<PublishOutcome, PolicyErrors> {
        map.validate(&record)?;

        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some((known_record, known_map)) = entries.get(&record.hrac) {
            if known_record == &record && known_map == &map {
                return Ok(PublishOutcome::AlreadyKnown);
            }
            return Err(PolicyErrors::InvalidTreasureMap("a different map is stored under this hrac"));
        }
        debug!("Stored treasure map for {} ({} destinations)", record.hrac, map.len());
        entries.insert(record.hrac, (record, map));
        Ok(PublishOutcome::Stored)
    }
}

impl TreasureMapSource for PolicyDirectory {
    fn resolve(&self, hrac: &Hrac) -> Result<TreasureMap, PolicyErrors> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(hrac)
            .map(|(_, map)| map.clone())
            .ok_or(PolicyErrors::UnknownPolicy(*hrac))
    }
}

impl PolicySource for PolicyDirectory {
    fn policy(&self, hrac: &Hrac) -> Result<PolicyRecord, PolicyErrors> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .get(hrac)
            .map(|(record, _)| record.clone())
            .ok_or(PolicyErrors::UnknownPolicy(*hrac))
    }
}
