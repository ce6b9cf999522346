//! Protocol and manager property tests: exhaustive and generated inputs
//! checked against the conversation invariants.
//!
//! Tests verify:
//! - `final` replies freeze the state machine idempotently
//! - validation accepts conforming replies and rejects each documented violation
//! - error replies always validate
//! - `can_continue` boundaries on turn count and last finish
//! - running summary recomputation happens only on window multiples
//! - the canonical scenarios A–E

use serde_json::{json, Value};

use conversation::{
    create_error_reply, extract_final_result, next_state, parse_agent_reply, validate_agent_reply,
    AgentReply, ConversationManager, FinishStatus, Phase, ReplyError, Role, Turn,
    DEFAULT_FINAL_MARKER,
};

const SPEAKERS: [Role; 2] = [Role::Executor, Role::Reviewer];

fn turn(role: Role, phase: Phase, finish: FinishStatus, message: &str) -> Turn {
    Turn::new(role, "mock", AgentReply::new(phase, message, finish))
}

/// Small deterministic generator so property inputs vary without a
/// randomness dependency.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn pick<T: Copy>(&mut self, items: &[T]) -> T {
        items[(self.next() as usize) % items.len()]
    }
}

// ── Property: final freezes the state machine ──────────────────────

#[test]
fn prop_final_is_idempotent_for_every_phase_and_speaker() {
    for phase in Phase::ALL {
        for speaker in Role::ALL {
            let reply = AgentReply::new(phase, "done", FinishStatus::Final);
            let once = next_state(&reply, speaker);
            assert_eq!(once, (phase, speaker));

            let again = AgentReply::new(once.0, "done", FinishStatus::Final);
            assert_eq!(next_state(&again, once.1), once);
        }
    }
}

#[test]
fn prop_manager_rejects_progress_after_final() {
    let mut rng = Lcg(7);
    for _ in 0..50 {
        let mut mgr = ConversationManager::new(20, 4).unwrap();
        let warmup = (rng.next() % 6) as usize;
        for _ in 0..warmup {
            let speaker = mgr.current_speaker();
            let phase = mgr.current_phase();
            let finish = rng.pick(&[FinishStatus::None, FinishStatus::Handoff]);
            mgr.add_turn(turn(speaker, phase, finish, "work"));
        }
        let speaker = mgr.current_speaker();
        let phase = mgr.current_phase();
        mgr.add_turn(turn(speaker, phase, FinishStatus::Final, "FINAL: ok"));

        assert!(!mgr.can_continue());
        assert_eq!(mgr.current_phase(), phase);
        assert_eq!(mgr.current_speaker(), speaker);
    }
}

// ── Property: non-final speakers alternate only between two roles ──

#[test]
fn prop_random_walks_stay_in_executor_reviewer() {
    let mut rng = Lcg(42);
    let mut mgr = ConversationManager::new(500, 10).unwrap();
    for _ in 0..400 {
        let speaker = mgr.current_speaker();
        assert!(SPEAKERS.contains(&speaker));
        let phase = mgr.current_phase();
        let finish = rng.pick(&[FinishStatus::None, FinishStatus::Handoff]);
        mgr.add_turn(turn(speaker, phase, finish, "step"));
    }
    assert_eq!(mgr.transcript().len(), 400);
}

// ── Property: validation ───────────────────────────────────────────

#[test]
fn prop_conforming_replies_always_validate() {
    let mut rng = Lcg(3);
    for _ in 0..200 {
        let phase = rng.pick(&Phase::ALL);
        let finish = rng.pick(&FinishStatus::ALL);
        let len = (rng.next() % 501) as usize;
        let mut raw = json!({
            "phase": phase.as_str(),
            "message": "m".repeat(len),
            "finish": finish.as_str(),
        });
        if rng.next() % 2 == 0 {
            raw["critiques"] = Value::String("c".repeat((rng.next() % 201) as usize));
        }
        if rng.next() % 2 == 0 {
            raw["tool_calls"] = json!([{"name": "fs_list", "args": {"path": "."}}]);
        }
        let reply = validate_agent_reply(&raw).unwrap();
        assert_eq!(reply.phase, phase);
        assert_eq!(reply.finish, finish);
    }
}

#[test]
fn prop_each_documented_violation_is_a_schema_error() {
    let base = json!({"phase": "implement", "message": "m", "finish": "none"});
    let mutations: Vec<Box<dyn Fn(&mut Value)>> = vec![
        Box::new(|v| {
            v.as_object_mut().unwrap().remove("phase");
        }),
        Box::new(|v| v["phase"] = json!("deploy")),
        Box::new(|v| {
            v.as_object_mut().unwrap().remove("finish");
        }),
        Box::new(|v| v["finish"] = json!("maybe")),
        Box::new(|v| {
            v.as_object_mut().unwrap().remove("message");
        }),
        Box::new(|v| v["message"] = json!(12)),
        Box::new(|v| v["message"] = json!("x".repeat(501))),
        Box::new(|v| v["critiques"] = json!("y".repeat(201))),
        Box::new(|v| v["tool_calls"] = json!([{"name": "fs_read"}])),
        Box::new(|v| v["tool_calls"] = json!([{"args": {}}])),
        Box::new(|v| v["tool_calls"] = json!([{"name": "a", "args": {}, "extra": 1}])),
        Box::new(|v| v["extra"] = json!(true)),
    ];
    for (idx, mutate) in mutations.iter().enumerate() {
        let mut raw = base.clone();
        mutate(&mut raw);
        assert!(
            matches!(validate_agent_reply(&raw), Err(ReplyError::Schema { .. })),
            "mutation {idx} accepted: {raw}"
        );
    }
}

#[test]
fn prop_error_replies_always_validate() {
    let mut rng = Lcg(11);
    for _ in 0..100 {
        let len = (rng.next() % 2000) as usize;
        let text: String = (0..len).map(|i| if i % 7 == 0 { '决' } else { 'e' }).collect();
        let phase = if rng.next() % 4 == 0 {
            None
        } else {
            Some(rng.pick(&Phase::ALL))
        };
        let reply = create_error_reply(&text, phase);
        let raw = serde_json::to_value(&reply).unwrap();
        let validated = validate_agent_reply(&raw).unwrap();
        assert_eq!(validated.finish, FinishStatus::Handoff);
        assert_eq!(validated.phase, phase.unwrap_or(Phase::Analysis));
    }
}

// ── Property: can_continue boundaries ──────────────────────────────

#[test]
fn prop_can_continue_matches_definition() {
    for max_turns in 1..=6 {
        for last_finish in FinishStatus::ALL {
            let mut mgr = ConversationManager::new(max_turns, 2).unwrap();
            for n in 1..=max_turns {
                let finish = if n == max_turns - 1 || n == max_turns {
                    last_finish
                } else {
                    FinishStatus::Handoff
                };
                mgr.add_turn(turn(Role::Executor, Phase::Implement, finish, "m"));
                let expected = n < max_turns && finish != FinishStatus::Final;
                assert_eq!(
                    mgr.can_continue(),
                    expected,
                    "max_turns={max_turns} n={n} finish={finish}"
                );
                if finish == FinishStatus::Final {
                    break;
                }
            }
        }
    }
}

// ── Property: summary cadence ──────────────────────────────────────

#[test]
fn prop_summary_recomputed_exactly_on_window_multiples() {
    for window in 1..=5 {
        let mut mgr = ConversationManager::new(40, window).unwrap();
        for n in 1..=30 {
            let before = mgr.summary_refreshes();
            mgr.add_turn(turn(Role::Reviewer, Phase::Review, FinishStatus::None, "must fix"));
            let refreshed = mgr.summary_refreshes() > before;
            assert_eq!(refreshed, n % window == 0, "window={window} n={n}");
        }
    }
}

// ── Scenarios ──────────────────────────────────────────────────────

#[test]
fn test_scenario_a_analysis_handoff() {
    let mut mgr = ConversationManager::new(5, 2).unwrap();
    assert_eq!(mgr.current_phase(), Phase::Analysis);
    assert_eq!(mgr.current_speaker(), Role::Executor);

    mgr.add_turn(turn(Role::Executor, Phase::Analysis, FinishStatus::Handoff, "ok"));
    assert_eq!(mgr.current_phase(), Phase::Proposal);
    assert_eq!(mgr.current_speaker(), Role::Executor);
}

#[test]
fn test_scenario_b_executor_proposal_without_handoff() {
    let mut mgr = ConversationManager::new(5, 2).unwrap();
    mgr.add_turn(turn(Role::Executor, Phase::Analysis, FinishStatus::Handoff, "ok"));
    mgr.add_turn(turn(Role::Executor, Phase::Proposal, FinishStatus::None, "go"));
    assert_eq!(mgr.current_phase(), Phase::Implement);
    assert_eq!(mgr.current_speaker(), Role::Executor);
}

#[test]
fn test_scenario_c_turn_cap_with_handoff() {
    let mut mgr = ConversationManager::new(5, 2).unwrap();
    for n in 1..=5 {
        let speaker = mgr.current_speaker();
        let phase = mgr.current_phase();
        mgr.add_turn(turn(speaker, phase, FinishStatus::Handoff, &format!("turn {n}")));
    }
    assert_eq!(mgr.transcript().last().unwrap().reply.finish, FinishStatus::Handoff);
    assert!(!mgr.can_continue());
    assert_eq!(
        extract_final_result(mgr.transcript(), DEFAULT_FINAL_MARKER).as_deref(),
        Some("turn 5")
    );
}

#[test]
fn test_scenario_d_overlong_message_rejected() {
    let raw = json!({"phase": "analysis", "message": "x".repeat(501), "finish": "handoff"});
    assert!(matches!(
        validate_agent_reply(&raw),
        Err(ReplyError::Schema { .. })
    ));
}

#[test]
fn test_scenario_e_fenced_reply_extraction() {
    let raw = "prefix ```json\n{\"phase\":\"review\",\"message\":\"done\",\"finish\":\"final\"}\n``` suffix";
    let reply = parse_agent_reply(raw).unwrap();
    assert_eq!(
        reply,
        AgentReply::new(Phase::Review, "done", FinishStatus::Final)
    );
    assert!(reply.tool_calls.is_empty());
}
