//! Work-order orchestration on top of the re-encryption engine: policies
//! granted by a delegator, proxies holding one key fragment each, and the
//! delegatee's ledger of which proxy already answered for which capsule.

pub mod config;
pub mod enact;
pub mod errors;
pub mod ids;
pub mod ledger;
pub mod network;
pub mod proxy;
pub mod treasure_map;
pub mod work_order;

pub use self::config::{DefaultOrderCount, LedgerConfig};
pub use self::enact::{enact_policy, EnactedPolicy};
pub use self::errors::PolicyErrors;
pub use self::ids::{CapsuleId, Hrac, ProxyId, RequesterId};
pub use self::ledger::{SubmissionReport, WorkOrderLedger};
pub use self::network::{InMemoryNetwork, NetworkClient, ProxyHandle};
pub use self::proxy::{Proxy, Revocation};
pub use self::treasure_map::{PolicyDirectory, PolicyRecord, PolicySource, PublishOutcome, TreasureMap, TreasureMapSource};
pub use self::work_order::{SavedWorkOrder, WorkOrder, WorkOrderState};
