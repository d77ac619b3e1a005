//! 会话不变量：任意附着/断开交错下至多一个活跃会话

mod common;

use alvr_usb_core::{AttachOutcome, DetachOutcome, SessionConfig};
use common::{full_config, harness, quest};
use proptest::prelude::*;
use std::sync::{Arc, Barrier};
use std::thread;

#[derive(Debug, Clone)]
enum Op {
    Attach(usize),
    Detach(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..3usize).prop_map(Op::Attach),
        (0..3usize).prop_map(Op::Detach),
    ]
}

const SERIALS: [&str; 3] = ["A", "B", "C"];

proptest! {
    #[test]
    fn prop_at_most_one_session(ops in prop::collection::vec(op(), 1..40)) {
        let h = harness(full_config());
        let mut model: Option<usize> = None;
        let mut activations = 0usize;
        let mut teardowns = 0usize;

        for op in ops {
            match op {
                Op::Attach(i) => {
                    let outcome = h.sessions.handle_attach(quest(SERIALS[i]));
                    match model {
                        None => {
                            prop_assert!(
                                matches!(outcome, AttachOutcome::Activated { .. }),
                                "expected activation, got {:?}",
                                outcome
                            );
                            model = Some(i);
                            activations += 1;
                        },
                        Some(active) if active == i => {
                            prop_assert!(
                                matches!(outcome, AttachOutcome::AlreadyActive { .. }),
                                "expected idempotent admit, got {:?}",
                                outcome
                            );
                        },
                        Some(active) => {
                            prop_assert_eq!(
                                outcome,
                                AttachOutcome::Conflict { active_serial: SERIALS[active].to_string() }
                            );
                        },
                    }
                },
                Op::Detach(i) => {
                    let outcome = h.sessions.handle_detach(SERIALS[i]);
                    if model == Some(i) {
                        prop_assert_eq!(outcome, DetachOutcome::TornDown { serial: SERIALS[i].to_string() });
                        model = None;
                        teardowns += 1;
                    } else {
                        prop_assert!(matches!(outcome, DetachOutcome::Ignored { .. }), "expected Ignored, got {:?}", outcome);
                    }
                },
            }

            prop_assert_eq!(
                h.sessions.active_serial(),
                model.map(|i| SERIALS[i].to_string())
            );
        }

        // 副作用与状态转换一一对应
        prop_assert_eq!(h.backend.forward_count(), activations * 2);
        prop_assert_eq!(h.launcher.launch_count(), activations);
        prop_assert_eq!(h.launcher.hook_commands().len(), activations + teardowns);
    }
}

#[test]
fn test_concurrent_attaches_admit_exactly_one() {
    let h = harness(SessionConfig::default());
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8)
        .map(|i| {
            let sessions = Arc::clone(&h.sessions);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                sessions.handle_attach(quest(&format!("DEV{}", i)))
            })
        })
        .collect();

    let outcomes: Vec<_> = workers.into_iter().map(|w| w.join().unwrap()).collect();

    let activated = outcomes
        .iter()
        .filter(|o| matches!(o, AttachOutcome::Activated { .. }))
        .count();
    let conflicts = outcomes
        .iter()
        .filter(|o| matches!(o, AttachOutcome::Conflict { .. }))
        .count();
    assert_eq!(activated, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(h.backend.forward_count(), 2);
}
