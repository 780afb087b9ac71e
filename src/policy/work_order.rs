use crate::policy::errors::PolicyErrors;
use crate::policy::ids::{CapsuleId, Hrac, ProxyId, RequesterId};
use crate::pre::{CFrag, Capsule, CurvePoint, KFragId, Params, PreErrors, Signature, Signer};

use std::fmt;
use std::sync::Arc;

/// Local lifecycle of a work order. Never part of its wire form.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkOrderState {
    Created,
    Submitted,
    Saved,
    Failed,
}

impl WorkOrderState {
    fn can_become(self, next: WorkOrderState) -> bool {
        use WorkOrderState::*;
        matches!((self, next), (Created, Submitted) | (Submitted, Saved) | (Submitted, Failed))
    }
}

/// A delegatee's signed request that one proxy re-encrypt one capsule.
#[derive(Clone)]
pub struct WorkOrder {
    hrac: Hrac,
    proxy_id: ProxyId,
    kfrag_id: KFragId,
    requester_key: CurvePoint,
    capsule: Capsule,
    signature: Signature,
    state: WorkOrderState,
}

impl WorkOrder {
    pub fn new(
        hrac: Hrac,
        proxy_id: ProxyId,
        kfrag_id: KFragId,
        capsule: &Capsule,
        stamp: &Signer,
    ) -> Result<Self, PreErrors> {
        let requester_key = stamp.verifying_key().clone();
        let msg = Self::message(
            &hrac,
            &RequesterId::from_verifying_key(&requester_key),
            &CapsuleId::of(capsule),
            &proxy_id,
            &kfrag_id,
        );
        Ok(WorkOrder {
            hrac,
            proxy_id,
            kfrag_id,
            requester_key,
            capsule: capsule.clone(),
            signature: stamp.sign(&msg)?,
            state: WorkOrderState::Created,
        })
    }

    fn message(
        hrac: &Hrac,
        requester: &RequesterId,
        capsule: &CapsuleId,
        proxy: &ProxyId,
        kfrag: &KFragId,
    ) -> Vec<u8> {
        let mut msg = hrac.as_bytes().to_vec();
        msg.extend_from_slice(requester.as_bytes());
        msg.extend_from_slice(capsule.as_bytes());
        msg.extend_from_slice(proxy.as_bytes());
        msg.extend_from_slice(kfrag.as_bytes());
        msg
    }

    /// True if the signature was made by the key the order carries.
    pub fn verify(&self) -> bool {
        let msg = Self::message(
            &self.hrac,
            &self.requester_id(),
            &self.capsule_id(),
            &self.proxy_id,
            &self.kfrag_id,
        );
        self.signature.verify(&msg, &self.requester_key)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bytes = self.hrac.as_bytes().to_vec();
        bytes.extend_from_slice(self.proxy_id.as_bytes());
        bytes.extend_from_slice(self.kfrag_id.as_bytes());
        bytes.extend_from_slice(&self.requester_key.to_bytes());
        bytes.extend_from_slice(&self.capsule.to_bytes());
        bytes.extend_from_slice(&self.signature.to_bytes());
        bytes
    }

    /// Decodes a received order; its state starts over at `Created`.
    pub fn from_bytes(bytes: &[u8], params: &Arc<Params>) -> Result<Self, PreErrors> {
        if bytes.len() != Self::expected_bytes_length(params) {
            return Err(PreErrors::InvalidBytes);
        }
        let (hrac, rest) = bytes.split_at(Hrac::LENGTH);
        let (proxy_id, rest) = rest.split_at(ProxyId::LENGTH);
        let (kfrag_id, rest) = rest.split_at(KFragId::LENGTH);
        let (requester_key, rest) = rest.split_at(CurvePoint::expected_bytes_length(params));
        let (capsule, signature) = rest.split_at(Capsule::expected_bytes_length(params));

        Ok(WorkOrder {
            hrac: Hrac::from_bytes(hrac)?,
            proxy_id: ProxyId::from_bytes(proxy_id)?,
            kfrag_id: KFragId::from_bytes(kfrag_id)?,
            requester_key: CurvePoint::from_bytes(requester_key, params)?,
            capsule: Capsule::from_bytes(capsule, params)?,
            signature: Signature::from_bytes(signature, params)?,
            state: WorkOrderState::Created,
        })
    }

    pub fn expected_bytes_length(params: &Arc<Params>) -> usize {
        Hrac::LENGTH
            + ProxyId::LENGTH
            + KFragId::LENGTH
            + CurvePoint::expected_bytes_length(params)
            + Capsule::expected_bytes_length(params)
            + Signature::expected_bytes_length(params)
    }

    pub(crate) fn advance(&mut self, next: WorkOrderState) -> Result<(), PolicyErrors> {
        if !self.state.can_become(next) {
            return Err(PolicyErrors::InvalidTransition(self.state, next));
        }
        self.state = next;
        Ok(())
    }

    pub fn hrac(&self) -> Hrac {
        self.hrac
    }

    pub fn proxy_id(&self) -> ProxyId {
        self.proxy_id
    }

    pub fn kfrag_id(&self) -> KFragId {
        self.kfrag_id
    }

    pub fn requester_key(&self) -> &CurvePoint {
        &self.requester_key
    }

    pub fn requester_id(&self) -> RequesterId {
        RequesterId::from_verifying_key(&self.requester_key)
    }

    pub fn capsule(&self) -> &Capsule {
        &self.capsule
    }

    pub fn capsule_id(&self) -> CapsuleId {
        CapsuleId::of(&self.capsule)
    }

    pub fn state(&self) -> WorkOrderState {
        self.state
    }
}

impl PartialEq for WorkOrder {
    fn eq(&self, other: &WorkOrder) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl fmt::Debug for WorkOrder {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("WorkOrder")
            .field("hrac", &self.hrac)
            .field("proxy_id", &self.proxy_id)
            .field("kfrag_id", &self.kfrag_id)
            .field("capsule", &self.capsule)
            .field("state", &self.state)
            .finish()
    }
}

/// A work order that completed a verified round trip, with what it produced.
#[derive(Clone, Debug)]
pub struct SavedWorkOrder {
    work_order: WorkOrder,
    cfrag: CFrag,
}

impl SavedWorkOrder {
    pub(crate) fn new(work_order: WorkOrder, cfrag: CFrag) -> Self {
        SavedWorkOrder { work_order, cfrag }
    }

    pub fn work_order(&self) -> &WorkOrder {
        &self.work_order
    }

    pub fn cfrag(&self) -> &CFrag {
        &self.cfrag
    }

    pub fn proxy_id(&self) -> ProxyId {
        self.work_order.proxy_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pre::{encrypt, generate_keypair, new_standard_params};

    #[test]
    fn signed_and_canonical() {
        let params = new_standard_params().unwrap();
        let alice = generate_keypair(&params).unwrap();
        let bob = Signer::new(&params).unwrap();
        let proxy = Signer::new(&params).unwrap();
        let (capsule, _) = encrypt(alice.public_key(), b"data").unwrap();

        let hrac = Hrac::from_bytes(&[7u8; 32]).unwrap();
        let proxy_id = ProxyId::from_verifying_key(proxy.verifying_key());
        let order = WorkOrder::new(hrac, proxy_id, KFragId::random().unwrap(), &capsule, &bob).unwrap();
        assert!(order.verify());
        assert_eq!(order.requester_id(), RequesterId::from_verifying_key(bob.verifying_key()));

        let bytes = order.to_bytes();
        assert_eq!(bytes.len(), WorkOrder::expected_bytes_length(&params));
        let decoded = WorkOrder::from_bytes(&bytes, &params).unwrap();
        assert_eq!(decoded, order);
        assert!(decoded.verify());
        assert_eq!(decoded.to_bytes(), bytes);

        // retargeting the order breaks the signature
        let mut retargeted = bytes.clone();
        retargeted[Hrac::LENGTH] ^= 0xff;
        assert!(!WorkOrder::from_bytes(&retargeted, &params).unwrap().verify());
    }

    #[test]
    fn lifecycle() {
        let params = new_standard_params().unwrap();
        let alice = generate_keypair(&params).unwrap();
        let bob = Signer::new(&params).unwrap();
        let (capsule, _) = encrypt(alice.public_key(), b"data").unwrap();
        let proxy_id = ProxyId::from_bytes(&[1u8; 20]).unwrap();
        let hrac = Hrac::from_bytes(&[2u8; 32]).unwrap();
        let mut order = WorkOrder::new(hrac, proxy_id, KFragId::random().unwrap(), &capsule, &bob).unwrap();

        assert_eq!(order.state(), WorkOrderState::Created);
        assert_eq!(
            order.advance(WorkOrderState::Saved),
            Err(PolicyErrors::InvalidTransition(WorkOrderState::Created, WorkOrderState::Saved))
        );
        order.advance(WorkOrderState::Submitted).unwrap();
        order.advance(WorkOrderState::Failed).unwrap();
        assert!(order.advance(WorkOrderState::Submitted).is_err());
    }
}
