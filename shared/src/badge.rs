//! Badge requirements and the per-player projection
//!
//! Badges are configuration. A [`PlayerBadge`] is computed on request from
//! the player's persisted progress plus the set of badges already recorded
//! as unlocked; once recorded, an unlock sticks even if progress changes.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BadgeRequirement {
    Tag {
        tag: String,
    },
    /// `count` of the listed tags, or all of them when absent
    Tags {
        tags: Vec<String>,
        #[serde(default)]
        count: Option<usize>,
    },
    Exp {
        exp: u32,
    },
    Completion {
        percent: u8,
    },
    /// A time-trial record at or under `seconds`
    TimeTrial {
        condition_id: String,
        seconds: i32,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Badge {
    pub id: String,
    pub requirement: BadgeRequirement,
    #[serde(default)]
    pub map_id: Option<u32>,
    /// Not listed until unlocked
    #[serde(default)]
    pub hidden: bool,
}

/// Persisted progress a projection is computed from
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlayerProgress {
    pub tags: HashSet<String>,
    pub exp: u32,
    pub completion_percent: u8,
    pub time_trials: HashMap<String, i32>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerBadge {
    pub id: String,
    pub unlocked: bool,
    /// Requirement met now but not recorded before
    pub new_unlock: bool,
    pub progress: u32,
    pub goal: u32,
}

impl BadgeRequirement {
    /// `(progress, goal)`; the requirement holds when progress reaches goal
    pub fn progress(&self, player: &PlayerProgress) -> (u32, u32) {
        match self {
            BadgeRequirement::Tag { tag } => (player.tags.contains(tag) as u32, 1),
            BadgeRequirement::Tags { tags, count } => {
                let have = tags.iter().filter(|t| player.tags.contains(*t)).count() as u32;
                let goal = count.unwrap_or(tags.len()).min(tags.len()) as u32;
                (have.min(goal), goal)
            }
            BadgeRequirement::Exp { exp } => (player.exp.min(*exp), *exp),
            BadgeRequirement::Completion { percent } => (
                u32::from(player.completion_percent.min(*percent)),
                u32::from(*percent),
            ),
            BadgeRequirement::TimeTrial {
                condition_id,
                seconds,
            } => {
                let met = player
                    .time_trials
                    .get(condition_id)
                    .map_or(false, |best| best <= seconds);
                (met as u32, 1)
            }
        }
    }

    pub fn is_met(&self, player: &PlayerProgress) -> bool {
        let (progress, goal) = self.progress(player);
        progress >= goal
    }
}

/// Projects every badge for one player
///
/// Hidden badges that are still locked are left out.
pub fn project(
    badges: &[Badge],
    player: &PlayerProgress,
    recorded: &HashSet<String>,
) -> Vec<PlayerBadge> {
    badges
        .iter()
        .filter_map(|badge| {
            let (progress, goal) = badge.requirement.progress(player);
            let met = progress >= goal;
            let was_recorded = recorded.contains(&badge.id);
            let unlocked = met || was_recorded;
            if badge.hidden && !unlocked {
                return None;
            }
            Some(PlayerBadge {
                id: badge.id.clone(),
                unlocked,
                new_unlock: met && !was_recorded,
                progress,
                goal,
            })
        })
        .collect()
}

/// Percentage of `total` maps covered by `visited`, rounded down
pub fn completion_percent(visited: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    ((visited.min(total) * 100) / total) as u8
}
