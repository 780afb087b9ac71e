use crate::policy::errors::PolicyErrors;
use crate::policy::ids::{CapsuleId, Hrac, ProxyId, RequesterId};
use crate::policy::work_order::WorkOrder;
use crate::pre::{reencrypt, CFrag, CorrectnessKeys, CurvePoint, KFrag, Params, PreErrors, Signature, Signer};

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{debug, info};

/// A delegator's signed instruction to drop one policy's KFrag from one proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct Revocation {
    hrac: Hrac,
    proxy_id: ProxyId,
    signature: Signature,
}

impl Revocation {
    pub fn new(hrac: Hrac, proxy_id: ProxyId, stamp: &Signer) -> Result<Self, PreErrors> {
        let signature = stamp.sign(&Self::message(&hrac, &proxy_id))?;
        Ok(Revocation {
            hrac,
            proxy_id,
            signature,
        })
    }

    fn message(hrac: &Hrac, proxy_id: &ProxyId) -> Vec<u8> {
        let mut msg = b"REVOKE".to_vec();
        msg.extend_from_slice(hrac.as_bytes());
        msg.extend_from_slice(proxy_id.as_bytes());
        msg
    }

    pub fn hrac(&self) -> Hrac {
        self.hrac
    }

    pub fn proxy_id(&self) -> ProxyId {
        self.proxy_id
    }
}

struct Arrangement {
    kfrag: KFrag,
    keys: CorrectnessKeys,
}

type CacheKey = (RequesterId, CapsuleId, Hrac);

#[derive(Default)]
struct ProxyState {
    arrangements: HashMap<Hrac, Arrangement>,
    // receipt order
    served: Vec<WorkOrder>,
    cache: HashMap<CacheKey, (Vec<u8>, CFrag)>,
}

/// The proxy side of the protocol: holds one KFrag per policy and answers
/// work orders with CFrags.
pub struct Proxy {
    id: ProxyId,
    stamp: Signer,
    params: Arc<Params>,
    state: Mutex<ProxyState>,
}

impl Proxy {
    pub fn new(params: &Arc<Params>) -> Result<Self, PreErrors> {
        let stamp = Signer::new(params)?;
        Ok(Proxy {
            id: ProxyId::from_verifying_key(stamp.verifying_key()),
            stamp,
            params: Arc::clone(params),
            state: Mutex::new(ProxyState::default()),
        })
    }

    fn state(&self) -> MutexGuard<ProxyState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> ProxyId {
        self.id
    }

    pub fn verifying_key(&self) -> &CurvePoint {
        self.stamp.verifying_key()
    }

    /// Accepts a KFrag for `hrac` after checking it was issued by the
    /// delegator named in `keys` and that `hrac` is derived from that
    /// delegator's verifying key, `delegatee_verifying_key` and `label`.
    /// Installing the same KFrag twice is a no-op.
    pub fn install_kfrag(
        &self,
        hrac: Hrac,
        label: &[u8],
        delegatee_verifying_key: &CurvePoint,
        kfrag: KFrag,
        keys: &CorrectnessKeys,
    ) -> Result<(), PolicyErrors> {
        if !kfrag.verify(keys) {
            return Err(PolicyErrors::InvalidSignature);
        }
        if Hrac::derive(&keys.verifying, delegatee_verifying_key, label) != hrac {
            return Err(PolicyErrors::PolicyMismatch("policy id was not issued by this delegator"));
        }

        let mut state = self.state();
        match state.arrangements.entry(hrac) {
            Entry::Occupied(existing) => {
                let existing = existing.get();
                if existing.keys.verifying != keys.verifying {
                    return Err(PolicyErrors::PolicyMismatch("policy belongs to another delegator"));
                }
                if existing.kfrag != kfrag {
                    return Err(PolicyErrors::PolicyMismatch("another kfrag is installed for this policy"));
                }
                Ok(())
            }
            Entry::Vacant(slot) => {
                info!("Proxy {} installed kfrag {} for policy {}", self.id, kfrag.id(), hrac);
                slot.insert(Arrangement {
                    kfrag,
                    keys: keys.clone(),
                });
                Ok(())
            }
        }
    }

    pub fn revoke(&self, revocation: &Revocation) -> Result<(), PolicyErrors> {
        if revocation.proxy_id != self.id {
            return Err(PolicyErrors::UnknownProxy(revocation.proxy_id));
        }
        let mut state = self.state();
        let verifying = match state.arrangements.get(&revocation.hrac) {
            Some(arrangement) => arrangement.keys.verifying.clone(),
            None => return Err(PolicyErrors::PolicyMismatch("no arrangement for this policy")),
        };
        let msg = Revocation::message(&revocation.hrac, &revocation.proxy_id);
        if !revocation.signature.verify(&msg, &verifying) {
            return Err(PolicyErrors::InvalidSignature);
        }

        state.arrangements.remove(&revocation.hrac);
        state.cache.retain(|(_, _, hrac), _| *hrac != revocation.hrac);
        info!("Proxy {} revoked policy {}", self.id, revocation.hrac);
        Ok(())
    }

    /// Validates and answers a work order.
    ///
    /// The answer for a given (requester, capsule, policy) is computed once; a
    /// byte-identical resubmission is answered from cache and not logged again.
    pub fn receive(&self, work_order: &WorkOrder) -> Result<CFrag, PolicyErrors> {
        if !work_order.verify() {
            return Err(PolicyErrors::InvalidSignature);
        }
        if work_order.proxy_id() != self.id {
            return Err(PolicyErrors::UnknownProxy(work_order.proxy_id()));
        }

        let key = (work_order.requester_id(), work_order.capsule_id(), work_order.hrac());
        let order_bytes = work_order.to_bytes();

        let kfrag = {
            let mut state = self.state();
            let kfrag = match state.arrangements.get(&work_order.hrac()) {
                Some(arrangement) => arrangement.kfrag.clone(),
                None => return Err(PolicyErrors::PolicyMismatch("no kfrag held for this policy")),
            };
            if kfrag.id() != work_order.kfrag_id() {
                return Err(PolicyErrors::PolicyMismatch("kfrag id does not match the policy"));
            }
            let cached = state
                .cache
                .get(&key)
                .map(|(bytes, cfrag)| (*bytes == order_bytes, cfrag.clone()));
            if let Some((identical, cfrag)) = cached {
                if !identical {
                    state.served.push(work_order.clone());
                }
                debug!("Proxy {} answered {:?} from cache", self.id, work_order);
                return Ok(cfrag);
            }
            kfrag
        };

        let cfrag = reencrypt(&kfrag, work_order.capsule())?;

        let mut state = self.state();
        // A concurrent identical request may have won the race; keep its answer.
        let cfrag = match state.cache.entry(key) {
            Entry::Occupied(entry) => entry.get().1.clone(),
            Entry::Vacant(slot) => slot.insert((order_bytes, cfrag)).1.clone(),
        };
        state.served.push(work_order.clone());
        info!(
            "Proxy {} re-encrypted capsule {} for {}",
            self.id,
            work_order.capsule_id(),
            work_order.requester_id()
        );
        Ok(cfrag)
    }

    /// Wire entry point: a serialized work order in, a serialized CFrag out.
    pub fn receive_bytes(&self, bytes: &[u8]) -> Result<Vec<u8>, PolicyErrors> {
        let work_order = WorkOrder::from_bytes(bytes, &self.params)?;
        Ok(self.receive(&work_order)?.to_bytes())
    }

    /// The orders served for `requester`, in the order they were received.
    /// The iterator owns a snapshot and can be cloned to restart it.
    pub fn work_orders(&self, requester: &RequesterId) -> impl Iterator<Item = WorkOrder> + Clone {
        let served: Vec<WorkOrder> = self
            .state()
            .served
            .iter()
            .filter(|order| order.requester_id() == *requester)
            .cloned()
            .collect();
        served.into_iter()
    }

    pub fn holds_policy(&self, hrac: &Hrac) -> bool {
        self.state().arrangements.contains_key(hrac)
    }
}
