//! Performance benchmarks for the hot paths of the overlay

use server::chat::ProfanityFilter;
use shared::codec::{decode_frame, encode_frame, encode_message, join_messages};
use shared::condition::{
    evaluate, ChainCursors, Comparison, Condition, ConditionEvent, Effect, PlayerView, Trigger,
};
use shared::AvatarState;
use std::time::Instant;

const SIGNING_KEY: &[u8] = b"bench-key";
const CLIENT_KEY: &[u8] = b"0123456789abcdef";

fn conditions(count: u32) -> Vec<Condition> {
    (0..count)
        .map(|i| Condition {
            id: format!("c{}", i),
            map_id: None,
            bounds: None,
            trigger: Trigger::Var {
                ids: vec![i],
                op: Comparison::Ge,
                value: 5,
            },
            requires: Vec::new(),
            effect: Effect::Tag {
                tag: format!("t{}", i),
            },
            time_trial: false,
        })
        .collect()
}

/// Benchmarks frame authentication and command splitting
#[test]
fn benchmark_frame_decoding() {
    let payload = join_messages(&[
        encode_message("m", &["12", "40"]),
        encode_message("f", &["2"]),
        encode_message("sv", &["7", "100"]),
    ]);
    let iterations = 50_000u32;
    let frames: Vec<Vec<u8>> = (1..=iterations)
        .map(|counter| encode_frame(SIGNING_KEY, CLIENT_KEY, counter, &payload))
        .collect();

    let mut last_counter = 0;
    let start = Instant::now();
    for frame in &frames {
        let commands = decode_frame(frame, SIGNING_KEY, CLIENT_KEY, &mut last_counter).unwrap();
        assert_eq!(commands.len(), 3);
    }

    let duration = start.elapsed();
    println!(
        "Frame decoding: {} frames in {:?} ({:.2} μs/frame)",
        iterations,
        duration,
        duration.as_micros() as f64 / iterations as f64
    );

    assert_eq!(last_counter, iterations);
    // Should complete in under 2s for 50k frames
    assert!(duration.as_millis() < 2000);
}

/// Benchmarks condition evaluation against a large rule set
#[test]
fn benchmark_condition_evaluation() {
    let rules = conditions(500);
    let mut avatar = AvatarState::new();
    let mut cursors = ChainCursors::new();

    let iterations = 10_000u32;
    let start = Instant::now();
    let mut fired = 0;
    for i in 0..iterations {
        let id = i % 500;
        let value = (i % 10) as i32;
        avatar.vars.insert(id, value);
        let view = PlayerView::of(&avatar);
        fired += evaluate(
            ConditionEvent::VarChanged { id, value },
            &view,
            &rules,
            &mut cursors,
        )
        .len();
    }

    let duration = start.elapsed();
    println!(
        "Condition evaluation: {} events over {} rules in {:?}",
        iterations,
        rules.len(),
        duration
    );

    assert!(fired > 0);
    assert!(duration.as_millis() < 5000);
}

/// Stress test for chat masking with a realistic word list
#[test]
fn stress_test_profanity_masking() {
    let words: Vec<String> = (0..200).map(|i| format!("bad{}", i)).collect();
    let filter = ProfanityFilter::new(&words);
    let line = "hello there bad17 and BAD150 again, nothing else to see here";

    let iterations = 20_000;
    let start = Instant::now();
    for _ in 0..iterations {
        let masked = filter.mask(line);
        assert!(!masked.contains("bad17"));
    }

    let duration = start.elapsed();
    println!("Profanity masking: {} lines in {:?}", iterations, duration);
    assert!(duration.as_millis() < 5000);
}
