//! Property tests for the live connection set

use proptest::prelude::*;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use switchboard::hub::{ClientId, CloseReason, Connection, Hub, HubError, SendPolicy};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
enum Op {
    Join(u8),
    Leave(u8),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![(0u8..6).prop_map(Op::Join), (0u8..6).prop_map(Op::Leave)]
}

fn client(n: u8) -> ClientId {
    ClientId::parse(&format!("client-{}", n)).unwrap()
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// The live set is exactly the ids joined and not yet left
    #[test]
    fn live_set_matches_model(ops in proptest::collection::vec(op(), 0..40)) {
        runtime().block_on(async {
            let hub = Hub::new(SendPolicy::default());
            let mut held: BTreeMap<u8, (Arc<Connection>, mpsc::Receiver<String>)> = BTreeMap::new();
            let mut model: BTreeSet<u8> = BTreeSet::new();

            for op in ops {
                match op {
                    Op::Join(n) => {
                        let result = hub.join(client(n), None).await;
                        if model.contains(&n) {
                            prop_assert!(matches!(result, Err(HubError::DuplicateIdentifier(_))));
                        } else {
                            let joined = result.map_err(|e| TestCaseError::fail(e.to_string()))?;
                            held.insert(n, joined);
                            model.insert(n);
                        }
                    }
                    Op::Leave(n) => {
                        // Leaving twice, or leaving a stale handle, must be harmless
                        if let Some((conn, _)) = held.get(&n) {
                            let removed = hub.leave(conn, CloseReason::Peer).await;
                            prop_assert_eq!(removed, model.remove(&n));
                        }
                    }
                }
            }

            let live: Vec<ClientId> = hub.registry().client_ids().await;
            let expected: Vec<ClientId> = model.iter().map(|n| client(*n)).collect();
            prop_assert_eq!(live, expected);
            Ok::<(), TestCaseError>(())
        })?;
    }

    /// Every connection live when a broadcast starts gets it, except the
    /// excluded one
    #[test]
    fn broadcast_reaches_all_but_excluded(count in 1u8..8, excluded in 0u8..8) {
        runtime().block_on(async {
            let hub = Hub::new(SendPolicy::default());
            let mut joined = Vec::new();
            for n in 0..count {
                joined.push(hub.join(client(n), None).await.unwrap());
            }

            let exclude = joined.get(excluded as usize).map(|(c, _)| Arc::clone(c));
            let delivered = hub.broadcast("ping", exclude.as_deref()).await;
            let expected = if exclude.is_some() { count - 1 } else { count };
            prop_assert_eq!(delivered, expected as usize);

            for (n, (_, rx)) in joined.iter_mut().enumerate() {
                let got = rx.try_recv().ok();
                if n == excluded as usize {
                    prop_assert_eq!(got, None);
                } else {
                    prop_assert_eq!(got.as_deref(), Some("ping"));
                }
            }
            Ok::<(), TestCaseError>(())
        })?;
    }
}
