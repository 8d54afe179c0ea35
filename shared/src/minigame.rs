//! Minigame scoring over the same event stream the condition engine sees
//!
//! A minigame watches one variable. Whenever it reports a value, and the
//! optional gating switch holds, that value is a score candidate. The
//! server persists it only if it beats the stored best.

use serde::{Deserialize, Serialize};

use crate::condition::{ConditionEvent, PlayerView};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Minigame {
    pub id: String,
    pub map_id: u32,
    pub var_id: u32,
    /// Switch that must be on for a score to count
    #[serde(default)]
    pub switch_id: Option<u32>,
    /// Scores below this are ignored
    #[serde(default)]
    pub min_score: i32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreCandidate {
    pub minigame_id: String,
    pub score: i32,
}

/// Collects score candidates produced by one event
pub fn score_candidates<'m>(
    event: ConditionEvent<'_>,
    view: &PlayerView<'_>,
    minigames: impl IntoIterator<Item = &'m Minigame>,
) -> Vec<ScoreCandidate> {
    let ConditionEvent::VarChanged { id, value } = event else {
        return Vec::new();
    };

    minigames
        .into_iter()
        .filter(|game| game.var_id == id && value >= game.min_score)
        .filter(|game| {
            game.switch_id
                .map_or(true, |switch| view.switches.get(&switch) == Some(&true))
        })
        .map(|game| ScoreCandidate {
            minigame_id: game.id.clone(),
            score: value,
        })
        .collect()
}

/// Higher score wins
pub fn improves(candidate: i32, best: Option<i32>) -> bool {
    best.map_or(true, |best| candidate > best)
}
