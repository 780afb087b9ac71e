use crate::policy::config::LedgerConfig;
use crate::policy::errors::PolicyErrors;
use crate::policy::ids::{CapsuleId, Hrac, ProxyId};
use crate::policy::network::NetworkClient;
use crate::policy::treasure_map::{PolicyRecord, PolicySource, TreasureMap, TreasureMapSource};
use crate::policy::work_order::{SavedWorkOrder, WorkOrder, WorkOrderState};
use crate::pre::{combine, decrypt_reencrypted, CFrag, Capsule, CorrectnessKeys, CurvePoint, KeyPair, PreErrors, Signer};

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread;

use log::{debug, warn};

struct FollowedPolicy {
    record: PolicyRecord,
    map: TreasureMap,
}

// One capsule shared by several policies is tracked per policy: the same
// proxy holds a different kfrag under each.
type SlotKey = (CapsuleId, Hrac);

#[derive(Default)]
struct LedgerState {
    policies: HashMap<Hrac, FollowedPolicy>,
    tried: HashMap<SlotKey, HashSet<ProxyId>>,
    saved: HashMap<SlotKey, BTreeMap<ProxyId, SavedWorkOrder>>,
    by_proxy: HashMap<ProxyId, Vec<SlotKey>>,
}

/// Outcome of a batch submission. Failures are reported, never raised.
#[derive(Debug, Default)]
pub struct SubmissionReport {
    pub saved: BTreeMap<ProxyId, CFrag>,
    pub failed: BTreeMap<ProxyId, PolicyErrors>,
}

/// Bob's record of which proxies he knows for each policy and which of them
/// already re-encrypted each capsule.
///
/// At most one saved work order exists per (capsule, policy, proxy); the check
/// and the insert happen under one lock.
pub struct WorkOrderLedger<D> {
    stamp: Signer,
    receiving_key: CurvePoint,
    directory: D,
    config: LedgerConfig,
    state: Mutex<LedgerState>,
}

impl<D> WorkOrderLedger<D>
where
    D: TreasureMapSource + PolicySource,
{
    /// `stamp` signs work orders; `receiving_key` is the key the policy
    /// re-encrypts towards.
    pub fn new(stamp: Signer, receiving_key: CurvePoint, directory: D) -> Self {
        Self::with_config(stamp, receiving_key, directory, LedgerConfig::default())
    }

    pub fn with_config(stamp: Signer, receiving_key: CurvePoint, directory: D, config: LedgerConfig) -> Self {
        WorkOrderLedger {
            stamp,
            receiving_key,
            directory,
            config,
            state: Mutex::new(LedgerState::default()),
        }
    }

    fn state(&self) -> MutexGuard<LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the policy and its treasure map and learns the proxies in it.
    /// Returns how many proxies are known for the policy.
    pub fn follow_treasure_map(&self, hrac: &Hrac) -> Result<usize, PolicyErrors> {
        let record = self.directory.policy(hrac)?;
        let map = self.directory.resolve(hrac)?;
        map.validate(&record)?;

        let mut state = self.state();
        let followed = state
            .policies
            .entry(*hrac)
            .or_insert(FollowedPolicy { record, map });
        Ok(followed.map.len())
    }

    pub fn known_proxies(&self, hrac: &Hrac) -> Result<Vec<ProxyId>, PolicyErrors> {
        let state = self.state();
        let followed = state.policies.get(hrac).ok_or(PolicyErrors::UnknownPolicy(*hrac))?;
        Ok(followed.map.destinations().iter().map(|(p, _)| *p).collect())
    }

    fn policy_record(&self, hrac: &Hrac) -> Result<PolicyRecord, PolicyErrors> {
        let state = self.state();
        state
            .policies
            .get(hrac)
            .map(|followed| followed.record.clone())
            .ok_or(PolicyErrors::UnknownPolicy(*hrac))
    }

    // The order must name a proxy of the followed map and the kfrag the map
    // assigns to it.
    fn destination_record(&self, work_order: &WorkOrder) -> Result<PolicyRecord, PolicyErrors> {
        let hrac = work_order.hrac();
        let proxy_id = work_order.proxy_id();
        let state = self.state();
        let followed = state.policies.get(&hrac).ok_or(PolicyErrors::UnknownPolicy(hrac))?;
        if followed.map.kfrag_for(&proxy_id) != Some(work_order.kfrag_id()) {
            return Err(PolicyErrors::UnknownProxy(proxy_id));
        }
        Ok(followed.record.clone())
    }

    /// Work orders for `capsule` against proxies of the policy that have not
    /// yet returned a saved CFrag for it. Proxies never tried for this capsule
    /// come first, then treasure map order.
    ///
    /// Without `count` the configured default applies, by default `n - saved`.
    pub fn generate_work_orders(
        &self,
        hrac: &Hrac,
        capsule: &Capsule,
        count: Option<usize>,
    ) -> Result<BTreeMap<ProxyId, WorkOrder>, PolicyErrors> {
        let capsule_id = CapsuleId::of(capsule);
        let slot = (capsule_id, *hrac);

        let selected = {
            let mut state = self.state();
            let followed = state.policies.get(hrac).ok_or(PolicyErrors::UnknownPolicy(*hrac))?;
            let saved = state.saved.get(&slot);
            let tried = state.tried.get(&slot);

            let saved_for_policy = saved.map_or(0, BTreeMap::len);
            let mut candidates: Vec<_> = followed
                .map
                .destinations()
                .iter()
                .filter(|(proxy_id, _)| saved.map_or(true, |orders| !orders.contains_key(proxy_id)))
                .copied()
                .collect();
            candidates.sort_by_key(|(proxy_id, _)| tried.map_or(false, |t| t.contains(proxy_id)));

            let wanted = count.unwrap_or_else(|| {
                self.config.default_order_count.remaining(
                    followed.record.threshold,
                    followed.record.shares,
                    saved_for_policy,
                )
            });
            candidates.truncate(wanted);

            let tried = state.tried.entry(slot).or_default();
            tried.extend(candidates.iter().map(|(proxy_id, _)| *proxy_id));
            candidates
        };

        let mut orders = BTreeMap::new();
        for (proxy_id, kfrag_id) in selected {
            let order = WorkOrder::new(*hrac, proxy_id, kfrag_id, capsule, &self.stamp)?;
            orders.insert(proxy_id, order);
        }
        debug!("Generated {} work orders for capsule {}", orders.len(), capsule_id);
        Ok(orders)
    }

    /// Sends one order and saves it if the proxy's answer checks out.
    /// On error the order is dropped and the proxy stays eligible.
    pub fn submit<C>(&self, client: &C, mut work_order: WorkOrder) -> Result<CFrag, PolicyErrors>
    where
        C: NetworkClient + ?Sized,
    {
        work_order.advance(WorkOrderState::Submitted)?;
        match self.deliver(client, &work_order) {
            Ok(cfrag) => {
                work_order.advance(WorkOrderState::Saved)?;
                self.save(work_order, cfrag.clone());
                Ok(cfrag)
            }
            Err(err) => {
                work_order.advance(WorkOrderState::Failed)?;
                warn!(
                    "Work order for capsule {} to proxy {} failed: {}",
                    work_order.capsule_id(),
                    work_order.proxy_id(),
                    err
                );
                Err(err)
            }
        }
    }

    fn deliver<C>(&self, client: &C, work_order: &WorkOrder) -> Result<CFrag, PolicyErrors>
    where
        C: NetworkClient + ?Sized,
    {
        let record = self.destination_record(work_order)?;
        let proxy_id = work_order.proxy_id();
        let handle = client.resolve(&proxy_id)?;
        if handle.id != proxy_id {
            return Err(PolicyErrors::UnknownProxy(proxy_id));
        }

        let cfrag = client.send(&proxy_id, work_order)?;
        if cfrag.kfrag_id() != work_order.kfrag_id() {
            return Err(PreErrors::InvalidFragment("answer is for another kfrag").into());
        }
        if self.config.verify_cfrags {
            let keys = CorrectnessKeys::new(&record.delegating_key, &self.receiving_key, &record.verifying_key);
            if !cfrag.verify_correctness(work_order.capsule(), &keys)? {
                return Err(PreErrors::InvalidFragment("correctness proof does not verify").into());
            }
        }
        Ok(cfrag)
    }

    fn save(&self, work_order: WorkOrder, cfrag: CFrag) {
        let capsule_id = work_order.capsule_id();
        let slot = (capsule_id, work_order.hrac());
        let proxy_id = work_order.proxy_id();

        let mut guard = self.state();
        let state = &mut *guard;
        match state.saved.entry(slot).or_default().entry(proxy_id) {
            Entry::Occupied(_) => {
                debug!("Redundant CFrag from {} for capsule {} ignored", proxy_id, capsule_id);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(SavedWorkOrder::new(work_order, cfrag));
                state.by_proxy.entry(proxy_id).or_default().push(slot);
            }
        }
    }

    /// Submits every order on its own thread. Earlier successes are kept
    /// whatever happens to the others.
    pub fn submit_all<C>(&self, client: &C, orders: BTreeMap<ProxyId, WorkOrder>) -> SubmissionReport
    where
        C: NetworkClient + ?Sized,
        D: Sync,
    {
        let results: Vec<(ProxyId, Result<CFrag, PolicyErrors>)> = thread::scope(|s| {
            let handles: Vec<_> = orders
                .into_iter()
                .map(|(proxy_id, order)| (proxy_id, s.spawn(move || self.submit(client, order))))
                .collect();
            handles
                .into_iter()
                .map(|(proxy_id, handle)| {
                    let result = handle
                        .join()
                        .unwrap_or_else(|_| Err(PolicyErrors::Delivery(proxy_id, "submission panicked".to_string())));
                    (proxy_id, result)
                })
                .collect()
        });

        let mut report = SubmissionReport::default();
        for (proxy_id, result) in results {
            match result {
                Ok(cfrag) => {
                    report.saved.insert(proxy_id, cfrag);
                }
                Err(err) => {
                    report.failed.insert(proxy_id, err);
                }
            }
        }
        report
    }

    /// Saved orders for `capsule` under the policy `hrac`, one per proxy.
    pub fn by_capsule(&self, hrac: &Hrac, capsule: &Capsule) -> BTreeMap<ProxyId, SavedWorkOrder> {
        self.state()
            .saved
            .get(&(CapsuleId::of(capsule), *hrac))
            .cloned()
            .unwrap_or_default()
    }

    pub fn by_proxy(&self, proxy_id: &ProxyId) -> Vec<SavedWorkOrder> {
        let state = self.state();
        let slots = match state.by_proxy.get(proxy_id) {
            Some(slots) => slots,
            None => return Vec::new(),
        };
        slots
            .iter()
            .filter_map(|slot| state.saved.get(slot)?.get(proxy_id).cloned())
            .collect()
    }

    /// Total number of saved work orders.
    pub fn len(&self) -> usize {
        self.state().saved.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combines the saved CFrags for `capsule` under `hrac` and decrypts.
    /// Fails with `InsufficientFragments` while fewer than m are saved.
    pub fn combine_and_decrypt(
        &self,
        hrac: &Hrac,
        capsule: &Capsule,
        ciphertext: &[u8],
        receiving: &KeyPair,
    ) -> Result<Vec<u8>, PolicyErrors> {
        let record = self.policy_record(hrac)?;
        let cfrags: Vec<CFrag> = self
            .by_capsule(hrac, capsule)
            .values()
            .map(|saved| saved.cfrag().clone())
            .collect();

        let activated = combine(capsule, &cfrags, record.threshold)?;
        Ok(decrypt_reencrypted(&activated, ciphertext, receiving, &record.delegating_key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::config::DefaultOrderCount;
    use crate::policy::enact::enact_policy;
    use crate::policy::ids::RequesterId;
    use crate::policy::network::{InMemoryNetwork, ProxyHandle};
    use crate::policy::proxy::Proxy;
    use crate::policy::treasure_map::PolicyDirectory;
    use crate::pre::{encrypt, generate_keypair, new_standard_params, Params};
    use std::sync::Arc;

    struct World {
        params: Arc<Params>,
        alice: KeyPair,
        alice_stamp: Signer,
        bob: KeyPair,
        bob_verifying_key: CurvePoint,
        directory: Arc<PolicyDirectory>,
        proxies: Vec<Arc<Proxy>>,
        network: InMemoryNetwork,
        hrac: Hrac,
        ledger: WorkOrderLedger<Arc<PolicyDirectory>>,
    }

    fn _world(m: usize, n: usize, config: LedgerConfig) -> World {
        let params = new_standard_params().unwrap();
        let alice = generate_keypair(&params).unwrap();
        let alice_stamp = Signer::new(&params).unwrap();
        let bob = generate_keypair(&params).unwrap();
        let bob_stamp = Signer::new(&params).unwrap();
        let proxies: Vec<Arc<Proxy>> = (0..n).map(|_| Arc::new(Proxy::new(&params).unwrap())).collect();

        let policy = enact_policy(
            &alice,
            &alice_stamp,
            bob.public_key(),
            bob_stamp.verifying_key(),
            b"this is the label",
            m,
            &proxies,
        )
        .unwrap();
        let directory = Arc::new(PolicyDirectory::new());
        directory.publish(policy.record.clone(), policy.treasure_map.clone()).unwrap();

        let network = InMemoryNetwork::new(&params, proxies.iter().cloned());
        let bob_verifying_key = bob_stamp.verifying_key().clone();
        let ledger =
            WorkOrderLedger::with_config(bob_stamp, bob.public_key().clone(), Arc::clone(&directory), config);
        World {
            params,
            alice,
            alice_stamp,
            bob,
            bob_verifying_key,
            directory,
            proxies,
            network,
            hrac: policy.hrac(),
            ledger,
        }
    }

    #[test]
    fn follow_map_is_idempotent() {
        let w = _world(2, 4, LedgerConfig::default());
        assert_eq!(
            w.ledger.known_proxies(&w.hrac).unwrap_err(),
            PolicyErrors::UnknownPolicy(w.hrac)
        );

        assert_eq!(w.ledger.follow_treasure_map(&w.hrac).unwrap(), 4);
        let known = w.ledger.known_proxies(&w.hrac).unwrap();
        assert_eq!(w.ledger.follow_treasure_map(&w.hrac).unwrap(), 4);
        assert_eq!(w.ledger.known_proxies(&w.hrac).unwrap(), known);

        let expected: Vec<ProxyId> = w.proxies.iter().map(|p| p.id()).collect();
        assert_eq!(known, expected);

        let unknown = Hrac::from_bytes(&[0u8; 32]).unwrap();
        assert_eq!(
            w.ledger.follow_treasure_map(&unknown).unwrap_err(),
            PolicyErrors::UnknownPolicy(unknown)
        );
    }

    #[test]
    fn bob_handles_frags() {
        let w = _world(3, 5, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, ciphertext) = encrypt(w.alice.public_key(), b"Welcome to the flippering.").unwrap();
        assert!(w.ledger.by_capsule(&w.hrac, &capsule).is_empty());

        // one order, nothing saved until the round trip completes
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(1)).unwrap();
        assert_eq!(orders.len(), 1);
        assert!(w.ledger.is_empty());
        let (first_proxy, order) = orders.into_iter().next().unwrap();
        assert_eq!(order.state(), WorkOrderState::Created);
        let cfrag = w.ledger.submit(&w.network, order).unwrap();

        let saved = w.ledger.by_capsule(&w.hrac, &capsule);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[&first_proxy].cfrag(), &cfrag);
        assert_eq!(saved[&first_proxy].work_order().state(), WorkOrderState::Saved);

        // the next order goes to a different proxy
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(1)).unwrap();
        let second_proxy = *orders.keys().next().unwrap();
        assert_ne!(second_proxy, first_proxy);

        // the default tops up to n
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(orders.len() + w.ledger.by_capsule(&w.hrac, &capsule).len(), 5);
        assert!(!orders.contains_key(&first_proxy));

        // the proxy kept an audit trail of what it served to Bob
        let bob_id = RequesterId::from_verifying_key(orders.values().next().unwrap().requester_key());
        let served_by_first: Vec<WorkOrder> = w
            .proxies
            .iter()
            .find(|p| p.id() == first_proxy)
            .unwrap()
            .work_orders(&bob_id)
            .collect();
        assert_eq!(served_by_first.len(), 1);
        assert_eq!(served_by_first[0].capsule_id(), CapsuleId::of(&capsule));

        assert_eq!(
            w.ledger.combine_and_decrypt(&w.hrac, &capsule, &ciphertext, &w.bob).unwrap_err(),
            PolicyErrors::Pre(PreErrors::InsufficientFragments(3, 1))
        );

        let report = w.ledger.submit_all(&w.network, orders);
        assert_eq!(report.saved.len(), 4);
        assert!(report.failed.is_empty());
        assert_eq!(w.ledger.len(), 5);
        assert_eq!(w.ledger.by_proxy(&first_proxy).len(), 1);

        let cleartext = w.ledger.combine_and_decrypt(&w.hrac, &capsule, &ciphertext, &w.bob).unwrap();
        assert_eq!(cleartext, b"Welcome to the flippering.".to_vec());
    }

    #[test]
    fn exhaustion_default_is_n_minus_saved() {
        let w = _world(8, 10, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, _) = encrypt(w.alice.public_key(), b"data").unwrap();

        let order = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(1)).unwrap();
        for (_, order) in order {
            w.ledger.submit(&w.network, order).unwrap();
        }
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(orders.len(), 9);
    }

    #[test]
    fn threshold_default_is_configurable() {
        let config = LedgerConfig {
            default_order_count: DefaultOrderCount::Threshold,
            ..LedgerConfig::default()
        };
        let w = _world(3, 5, config);
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, ciphertext) = encrypt(w.alice.public_key(), b"just enough").unwrap();

        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(orders.len(), 3);
        let report = w.ledger.submit_all(&w.network, orders);
        assert_eq!(report.saved.len(), 3);
        assert!(w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap().is_empty());
        assert_eq!(
            w.ledger.combine_and_decrypt(&w.hrac, &capsule, &ciphertext, &w.bob).unwrap(),
            b"just enough".to_vec()
        );
    }

    #[test]
    fn saved_at_most_once_per_proxy() {
        let w = _world(2, 3, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, _) = encrypt(w.alice.public_key(), b"data").unwrap();

        // two rounds generated before anything is saved target the same proxies
        let first = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        let second = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(first.keys().collect::<Vec<_>>(), second.keys().collect::<Vec<_>>());

        // both batches race on the same (capsule, proxy) slots
        let (first, second) = thread::scope(|s| {
            let first = s.spawn(|| w.ledger.submit_all(&w.network, first));
            let second = s.spawn(|| w.ledger.submit_all(&w.network, second));
            (first.join().unwrap(), second.join().unwrap())
        });
        assert_eq!(first.saved.len(), 3);
        assert_eq!(second.saved.len(), 3);

        let saved = w.ledger.by_capsule(&w.hrac, &capsule);
        assert_eq!(saved.len(), 3);
        assert_eq!(w.ledger.len(), 3);
        for proxy in &w.proxies {
            assert_eq!(w.ledger.by_proxy(&proxy.id()).len(), 1);
        }
        assert!(w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap().is_empty());
    }

    #[test]
    fn policies_sharing_a_capsule_are_tracked_apart() {
        let w = _world(2, 2, LedgerConfig::default());
        let second = enact_policy(
            &w.alice,
            &w.alice_stamp,
            w.bob.public_key(),
            &w.bob_verifying_key,
            b"another label",
            2,
            &w.proxies,
        )
        .unwrap();
        w.directory
            .publish(second.record.clone(), second.treasure_map.clone())
            .unwrap();
        let other = second.hrac();

        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        w.ledger.follow_treasure_map(&other).unwrap();
        let (capsule, ciphertext) = encrypt(w.alice.public_key(), b"shared capsule").unwrap();

        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(w.ledger.submit_all(&w.network, orders).saved.len(), 2);

        // the same proxies still owe a CFrag under the other policy's kfrags
        let orders = w.ledger.generate_work_orders(&other, &capsule, None).unwrap();
        assert_eq!(orders.len(), 2);
        for (proxy_id, order) in &orders {
            assert_eq!(second.treasure_map.kfrag_for(proxy_id), Some(order.kfrag_id()));
        }
        assert_eq!(w.ledger.submit_all(&w.network, orders).saved.len(), 2);

        assert_eq!(w.ledger.len(), 4);
        assert_eq!(w.ledger.by_capsule(&w.hrac, &capsule).len(), 2);
        assert_eq!(w.ledger.by_capsule(&other, &capsule).len(), 2);
        for proxy in &w.proxies {
            assert_eq!(w.ledger.by_proxy(&proxy.id()).len(), 2);
        }
        for hrac in &[w.hrac, other] {
            assert!(w.ledger.generate_work_orders(hrac, &capsule, None).unwrap().is_empty());
            assert_eq!(
                w.ledger.combine_and_decrypt(hrac, &capsule, &ciphertext, &w.bob).unwrap(),
                b"shared capsule".to_vec()
            );
        }
    }

    #[test]
    fn orders_outside_the_map_are_refused() {
        let w = _world(2, 3, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, _) = encrypt(w.alice.public_key(), b"data").unwrap();
        let bob_stamp = Signer::new(&w.params).unwrap();

        // reachable on the network, absent from the treasure map
        let stranger = Arc::new(Proxy::new(&w.params).unwrap());
        let reachable = w.proxies.iter().cloned().chain(Some(Arc::clone(&stranger)));
        let network = InMemoryNetwork::new(&w.params, reachable);
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(1)).unwrap();
        let kfrag_id = orders.values().next().unwrap().kfrag_id();
        let order = WorkOrder::new(w.hrac, stranger.id(), kfrag_id, &capsule, &bob_stamp).unwrap();
        assert_eq!(
            w.ledger.submit(&network, order).unwrap_err(),
            PolicyErrors::UnknownProxy(stranger.id())
        );

        // a mapped proxy asked for a kfrag the map gives to someone else
        let (first, second) = (w.proxies[0].id(), w.proxies[1].id());
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        let wrong_kfrag = orders[&second].kfrag_id();
        let order = WorkOrder::new(w.hrac, first, wrong_kfrag, &capsule, &bob_stamp).unwrap();
        assert_eq!(
            w.ledger.submit(&network, order).unwrap_err(),
            PolicyErrors::UnknownProxy(first)
        );
        assert!(w.ledger.is_empty());
    }

    #[test]
    fn offline_proxies_are_absorbed_and_retried() {
        let w = _world(2, 4, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, ciphertext) = encrypt(w.alice.public_key(), b"patience").unwrap();

        let down = w.proxies[0].id();
        w.network.take_offline(&down);
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        let report = w.ledger.submit_all(&w.network, orders);
        assert_eq!(report.saved.len(), 3);
        assert_eq!(report.failed.len(), 1);
        match &report.failed[&down] {
            PolicyErrors::Delivery(id, _) => assert_eq!(*id, down),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(!w.ledger.by_capsule(&w.hrac, &capsule).contains_key(&down));
        assert!(w.ledger.by_proxy(&down).is_empty());

        // the failed proxy is the only one left to ask
        w.network.bring_online(&down);
        let retry = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(retry.keys().copied().collect::<Vec<_>>(), vec![down]);
        let report = w.ledger.submit_all(&w.network, retry);
        assert_eq!(report.saved.len(), 1);

        assert_eq!(
            w.ledger.combine_and_decrypt(&w.hrac, &capsule, &ciphertext, &w.bob).unwrap(),
            b"patience".to_vec()
        );
    }

    #[test]
    fn never_tried_proxies_come_first() {
        let w = _world(2, 4, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, _) = encrypt(w.alice.public_key(), b"data").unwrap();

        let first = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(2)).unwrap();
        let second = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(2)).unwrap();
        assert!(first.keys().all(|p| !second.contains_key(p)));
    }

    struct LyingNetwork<'a> {
        inner: &'a InMemoryNetwork,
        impostor: &'a Proxy,
        params: Arc<Params>,
    }

    impl<'a> NetworkClient for LyingNetwork<'a> {
        fn resolve(&self, proxy_id: &ProxyId) -> Result<ProxyHandle, PolicyErrors> {
            self.inner.resolve(proxy_id)
        }

        // answers every order with a CFrag for the wrong capsule
        fn send(&self, _proxy_id: &ProxyId, work_order: &WorkOrder) -> Result<CFrag, PolicyErrors> {
            let alice = generate_keypair(&self.params)?;
            let (other, _) = encrypt(alice.public_key(), b"other")?;
            let stamp = Signer::new(&self.params)?;
            let rerouted = WorkOrder::new(
                work_order.hrac(),
                self.impostor.id(),
                work_order.kfrag_id(),
                &other,
                &stamp,
            )?;
            self.impostor.receive(&rerouted)
        }
    }

    #[test]
    fn unverifiable_answers_are_not_saved() {
        let w = _world(1, 1, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, ciphertext) = encrypt(w.alice.public_key(), b"xyz").unwrap();

        let liar = LyingNetwork {
            inner: &w.network,
            impostor: &w.proxies[0],
            params: Arc::clone(&w.params),
        };
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        let report = w.ledger.submit_all(&liar, orders);
        assert_eq!(
            report.failed.values().next(),
            Some(&PolicyErrors::Pre(PreErrors::InvalidFragment("correctness proof does not verify")))
        );
        assert!(w.ledger.is_empty());

        // 1-of-1 through the honest network
        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, None).unwrap();
        assert_eq!(orders.len(), 1);
        for (_, order) in orders {
            w.ledger.submit(&w.network, order).unwrap();
        }
        assert_eq!(
            w.ledger.combine_and_decrypt(&w.hrac, &capsule, &ciphertext, &w.bob).unwrap(),
            b"xyz".to_vec()
        );
    }

    #[test]
    fn resubmitting_a_saved_order_is_rejected() {
        let w = _world(2, 3, LedgerConfig::default());
        w.ledger.follow_treasure_map(&w.hrac).unwrap();
        let (capsule, _) = encrypt(w.alice.public_key(), b"data").unwrap();

        let orders = w.ledger.generate_work_orders(&w.hrac, &capsule, Some(1)).unwrap();
        let (_, order) = orders.into_iter().next().unwrap();
        let mut submitted = order.clone();
        submitted.advance(WorkOrderState::Submitted).unwrap();
        assert_eq!(
            w.ledger.submit(&w.network, submitted).unwrap_err(),
            PolicyErrors::InvalidTransition(WorkOrderState::Submitted, WorkOrderState::Submitted)
        );
        assert!(w.ledger.submit(&w.network, order).is_ok());
    }
}
