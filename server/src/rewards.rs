//! Applying condition-engine and minigame results
//!
//! Outcomes come back from the pure engine; this is where they meet the
//! store. Persistence failures are logged and skipped so a broken store
//! never takes the room task down with it.

use log::{error, info};
use shared::condition::{evaluate, ConditionEvent, Outcome, PlayerView};
use shared::minigame::{score_candidates, ScoreCandidate};

use crate::room::RoomActor;
use crate::room_client::RoomClient;
use crate::store::Store;

impl RoomActor {
    /// Runs one event through the conditions and minigames of this room
    pub(crate) fn evaluate(&self, client: &mut RoomClient, event: ConditionEvent<'_>) {
        let view = PlayerView::of(&client.avatar);
        let outcomes = evaluate(event, &view, &self.conditions, &mut client.cursors);
        let scores = score_candidates(event, &view, &self.minigames);
        if outcomes.is_empty() && scores.is_empty() {
            return;
        }
        apply_rewards(self.hub.store.as_ref(), client, outcomes, scores);
    }
}

/// Persists outcomes and tells the client about anything new
pub fn apply_rewards(
    store: &dyn Store,
    client: &RoomClient,
    outcomes: Vec<Outcome>,
    scores: Vec<ScoreCandidate>,
) {
    let uuid = client.uuid();

    for outcome in outcomes {
        match outcome {
            Outcome::Probe { kind, id, priority } => {
                client.send(kind.command(), &[id.to_string(), (priority as u8).to_string()]);
            }
            Outcome::UnlockTag { tag } => match store.write_tag(uuid, &tag) {
                Ok(true) => {
                    info!("{} unlocked tag {}", uuid, tag);
                    client.send("tu", &[tag]);
                }
                Ok(false) => {}
                Err(e) => error!("Failed to write tag {} for {}: {}", tag, uuid, e),
            },
            Outcome::TimeTrial {
                condition_id,
                seconds,
            } => match store.record_time_trial(uuid, &condition_id, seconds) {
                Ok(true) => {
                    info!("{} set time trial {} to {}s", uuid, condition_id, seconds);
                    client.send("tt", &[condition_id, seconds.to_string()]);
                }
                Ok(false) => {}
                Err(e) => error!("Failed to record time trial for {}: {}", uuid, e),
            },
        }
    }

    for candidate in scores {
        match store.record_minigame_score(uuid, &candidate.minigame_id, candidate.score) {
            Ok(true) => {
                client.send(
                    "mg",
                    &[candidate.minigame_id, candidate.score.to_string()],
                );
            }
            Ok(false) => {}
            Err(e) => error!("Failed to record minigame score for {}: {}", uuid, e),
        }
    }
}
