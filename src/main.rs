use umbral_workorders::policy::*;
use umbral_workorders::pre::*;

use std::sync::Arc;

fn main() -> Result<(), PolicyErrors> {
    let params = new_standard_params()?;

    let alice = generate_keypair(&params)?;
    let alice_stamp = Signer::new(&params)?;
    let bob = generate_keypair(&params)?;
    let bob_stamp = Signer::new(&params)?;

    let threshold = 3;
    let nodes_number = 5;
    let mut proxies = Vec::with_capacity(nodes_number);
    for _ in 0..nodes_number {
        proxies.push(Arc::new(Proxy::new(&params)?));
    }

    let policy = enact_policy(
        &alice,
        &alice_stamp,
        bob.public_key(),
        bob_stamp.verifying_key(),
        b"Hello, umbral!",
        threshold,
        &proxies,
    )?;
    let directory = Arc::new(PolicyDirectory::new());
    directory.publish(policy.record.clone(), policy.treasure_map.clone())?;

    let plaintext = b"Hello, umbral!".to_vec();
    let (capsule, ciphertext) = encrypt(alice.public_key(), &plaintext)?;

    let network = InMemoryNetwork::new(&params, proxies.iter().cloned());
    let ledger = WorkOrderLedger::new(bob_stamp, bob.public_key().clone(), Arc::clone(&directory));
    ledger.follow_treasure_map(&policy.hrac())?;

    let orders = ledger.generate_work_orders(&policy.hrac(), &capsule, None)?;
    let report = ledger.submit_all(&network, orders);
    println!("saved {} CFrags, {} failures", report.saved.len(), report.failed.len());

    let plaintext_bob = ledger.combine_and_decrypt(&policy.hrac(), &capsule, &ciphertext, &bob)?;
    assert_eq!(plaintext, plaintext_bob);
    println!("{:?}", String::from_utf8_lossy(&plaintext_bob));
    Ok(())
}
