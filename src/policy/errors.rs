use crate::policy::ids::{Hrac, ProxyId};
use crate::policy::work_order::WorkOrderState;
use crate::pre::PreErrors;

use quick_error::quick_error;

quick_error! {
    #[derive(Debug, Clone, PartialEq)]
    pub enum PolicyErrors {
        Pre(err: PreErrors) {
            from()
            display("Crypto error: {}", err)
            source(err)
        }
        UnknownPolicy(hrac: Hrac) {
            display("Policy {} has not been followed", hrac)
        }
        UnknownProxy(id: ProxyId) {
            display("Proxy {} is not part of the policy", id)
        }
        PolicyMismatch(reason: &'static str) {
            display("Policy mismatch: {}", reason)
        }
        InvalidSignature {
            display("Signature verification failed")
        }
        InvalidTreasureMap(reason: &'static str) {
            display("Invalid treasure map: {}", reason)
        }
        InvalidTransition(from: WorkOrderState, to: WorkOrderState) {
            display("Work order cannot go from {:?} to {:?}", from, to)
        }
        Delivery(proxy: ProxyId, reason: String) {
            display("Delivery to {} failed: {}", proxy, reason)
        }
    }
}
