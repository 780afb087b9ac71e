use crate::policy::errors::PolicyErrors;
use crate::policy::ids::ProxyId;
use crate::policy::proxy::Proxy;
use crate::policy::work_order::WorkOrder;
use crate::pre::{CFrag, CurvePoint, Params};

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

/// How the delegatee reaches a proxy.
#[derive(Clone, Debug, PartialEq)]
pub struct ProxyHandle {
    pub id: ProxyId,
    pub verifying_key: CurvePoint,
}

/// Delivery of work orders. Implementations decide transport, timeouts and
/// retries; anything that is not a CFrag comes back as an error.
pub trait NetworkClient: Sync {
    fn resolve(&self, proxy_id: &ProxyId) -> Result<ProxyHandle, PolicyErrors>;
    fn send(&self, proxy_id: &ProxyId, work_order: &WorkOrder) -> Result<CFrag, PolicyErrors>;
}

/// Routes serialized work orders to proxies living in the same process.
pub struct InMemoryNetwork {
    params: Arc<Params>,
    proxies: HashMap<ProxyId, Arc<Proxy>>,
    offline: RwLock<HashSet<ProxyId>>,
}

impl InMemoryNetwork {
    pub fn new<I>(params: &Arc<Params>, proxies: I) -> Self
    where
        I: IntoIterator<Item = Arc<Proxy>>,
    {
        InMemoryNetwork {
            params: Arc::clone(params),
            proxies: proxies.into_iter().map(|p| (p.id(), p)).collect(),
            offline: RwLock::new(HashSet::new()),
        }
    }

    pub fn take_offline(&self, proxy_id: &ProxyId) {
        self.offline
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(*proxy_id);
    }

    pub fn bring_online(&self, proxy_id: &ProxyId) {
        self.offline
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(proxy_id);
    }

    fn is_offline(&self, proxy_id: &ProxyId) -> bool {
        self.offline
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(proxy_id)
    }
}

impl NetworkClient for InMemoryNetwork {
    fn resolve(&self, proxy_id: &ProxyId) -> Result<ProxyHandle, PolicyErrors> {
        match self.proxies.get(proxy_id) {
            Some(proxy) => Ok(ProxyHandle {
                id: proxy.id(),
                verifying_key: proxy.verifying_key().clone(),
            }),
            None => Err(PolicyErrors::UnknownProxy(*proxy_id)),
        }
    }

    fn send(&self, proxy_id: &ProxyId, work_order: &WorkOrder) -> Result<CFrag, PolicyErrors> {
        let delivery = |reason: String| PolicyErrors::Delivery(*proxy_id, reason);

        if self.is_offline(proxy_id) {
            return Err(delivery("proxy is offline".to_string()));
        }
        let proxy = self
            .proxies
            .get(proxy_id)
            .ok_or_else(|| delivery("no route to proxy".to_string()))?;

        let response = proxy
            .receive_bytes(&work_order.to_bytes())
            .map_err(|err| delivery(err.to_string()))?;
        CFrag::from_bytes(&response, &self.params).map_err(|err| delivery(err.to_string()))
    }
}
