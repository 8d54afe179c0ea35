//! Condition engine
//!
//! Maps switch, variable, coordinate, picture and breadcrumb events onto
//! configured [`Condition`]s. Evaluation is a pure function of the event, the
//! player's cached state and the applicable conditions; the only state it
//! threads through is the per-condition chain cursor, which the caller owns.
//!
//! A trigger with one id fires when that id reports a matching value. A
//! trigger with several ids is a chain: only the next id in order advances
//! the cursor, and completing the chain fires like a single id would.
//! Companion requirements are checked against the cache before firing; a
//! requirement whose value is not cached yet turns into an immediate probe
//! instead.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

use crate::avatar::{AvatarState, Breadcrumbs};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Switch,
    Var,
}

impl ValueKind {
    /// Wire name of the matching sync command
    pub fn command(self) -> &'static str {
        match self {
            ValueKind::Switch => "ss",
            ValueKind::Var => "sv",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Comparison {
    pub fn test(self, value: i32, target: i32) -> bool {
        match self {
            Comparison::Eq => value == target,
            Comparison::Ne => value != target,
            Comparison::Gt => value > target,
            Comparison::Ge => value >= target,
            Comparison::Lt => value < target,
            Comparison::Le => value <= target,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_eq() -> Comparison {
    Comparison::Eq
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// One id, or an ordered chain of ids, reaching `value`
    Switch {
        ids: Vec<u32>,
        #[serde(default = "default_true")]
        value: bool,
    },
    /// One id, or an ordered chain of ids, comparing against `value`
    Var {
        ids: Vec<u32>,
        #[serde(default = "default_eq")]
        op: Comparison,
        value: i32,
    },
    Picture {
        names: Vec<String>,
    },
    PreviousMap {
        map_id: u32,
    },
    /// Fires on position changes alone; pair it with bounds
    Coords,
}

impl Trigger {
    fn chain_len(&self) -> usize {
        match self {
            Trigger::Switch { ids, .. } | Trigger::Var { ids, .. } => ids.len(),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Requirement {
    Switch {
        id: u32,
        #[serde(default = "default_true")]
        value: bool,
    },
    Var {
        id: u32,
        #[serde(default = "default_eq")]
        op: Comparison,
        value: i32,
    },
}

impl Requirement {
    fn key(&self) -> (ValueKind, u32) {
        match self {
            Requirement::Switch { id, .. } => (ValueKind::Switch, *id),
            Requirement::Var { id, .. } => (ValueKind::Var, *id),
        }
    }

    /// `None` while the value is not cached
    fn check(&self, view: &PlayerView) -> Option<bool> {
        match self {
            Requirement::Switch { id, value } => view.switches.get(id).map(|v| v == value),
            Requirement::Var { id, op, value } => view.vars.get(id).map(|v| op.test(*v, *value)),
        }
    }
}

/// Inclusive tile rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordBounds {
    pub x1: u16,
    pub y1: u16,
    pub x2: u16,
    pub y2: u16,
}

impl CoordBounds {
    pub fn contains(&self, x: u16, y: u16) -> bool {
        (self.x1..=self.x2).contains(&x) && (self.y1..=self.y2).contains(&y)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    /// Persist an unlock tag
    Tag { tag: String },
    /// Ask the client for another value, nothing else
    Probe { kind: ValueKind, id: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    /// `None` applies on every map
    #[serde(default)]
    pub map_id: Option<u32>,
    #[serde(default)]
    pub bounds: Option<CoordBounds>,
    pub trigger: Trigger,
    #[serde(default)]
    pub requires: Vec<Requirement>,
    pub effect: Effect,
    /// The trigger variable holds elapsed seconds; it fires below `value`
    #[serde(default)]
    pub time_trial: bool,
}

impl Condition {
    pub fn applies_to(&self, map_id: u32) -> bool {
        self.map_id.map_or(true, |m| m == map_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionEvent<'a> {
    SwitchChanged { id: u32, value: bool },
    VarChanged { id: u32, value: i32 },
    CoordsChanged,
    Teleported,
    PictureShown { name: &'a str },
    PreviousMapChanged { map_id: u32 },
    Generic,
}

/// How urgently the client should report a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncPriority {
    /// Report the current value right away
    Immediate = 1,
    /// Report on the next natural change
    NextChange = 2,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Probe {
        kind: ValueKind,
        id: u32,
        priority: SyncPriority,
    },
    UnlockTag {
        tag: String,
    },
    TimeTrial {
        condition_id: String,
        seconds: i32,
    },
}

/// Read-only slice of a player's room state the engine needs
#[derive(Debug, Clone, Copy)]
pub struct PlayerView<'a> {
    pub x: u16,
    pub y: u16,
    pub switches: &'a HashMap<u32, bool>,
    pub vars: &'a HashMap<u32, i32>,
    pub breadcrumbs: Breadcrumbs,
}

impl<'a> PlayerView<'a> {
    pub fn of(avatar: &'a AvatarState) -> Self {
        Self {
            x: avatar.x,
            y: avatar.y,
            switches: &avatar.switches,
            vars: &avatar.vars,
            breadcrumbs: avatar.breadcrumbs,
        }
    }
}

/// How far each chained condition has progressed, keyed by condition id
///
/// A cursor equal to the chain length means the chain completed but its
/// requirements were not met yet; it resets once the condition fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainCursors {
    cursors: HashMap<String, usize>,
}

impl ChainCursors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn position(&self, condition_id: &str) -> usize {
        self.cursors.get(condition_id).copied().unwrap_or(0)
    }

    fn advance(&mut self, condition_id: &str, ids: &[u32], id: u32, matched: bool) -> bool {
        let cursor = self.cursors.entry(condition_id.to_string()).or_insert(0);
        if !matched || *cursor >= ids.len() || ids[*cursor] != id {
            return false;
        }
        *cursor += 1;
        *cursor == ids.len()
    }

    fn complete(&self, condition_id: &str, len: usize) -> bool {
        len > 0 && self.position(condition_id) == len
    }

    fn reset(&mut self, condition_id: &str) {
        self.cursors.remove(condition_id);
    }
}

/// Evaluates one event against the applicable conditions
pub fn evaluate<'c>(
    event: ConditionEvent<'_>,
    view: &PlayerView<'_>,
    conditions: impl IntoIterator<Item = &'c Condition>,
    cursors: &mut ChainCursors,
) -> Vec<Outcome> {
    let mut outcomes = Vec::new();
    let mut probed: HashSet<(ValueKind, u32)> = HashSet::new();

    for condition in conditions {
        if !triggered(condition, event, view, cursors) {
            continue;
        }

        let mut satisfied = true;
        for requirement in &condition.requires {
            match requirement.check(view) {
                Some(true) => {}
                Some(false) => satisfied = false,
                None => {
                    satisfied = false;
                    let (kind, id) = requirement.key();
                    if probed.insert((kind, id)) {
                        outcomes.push(Outcome::Probe {
                            kind,
                            id,
                            priority: SyncPriority::Immediate,
                        });
                    }
                }
            }
        }
        if !satisfied {
            continue;
        }

        if let Some(bounds) = condition.bounds {
            if !bounds.contains(view.x, view.y) {
                continue;
            }
        }

        if condition.trigger.chain_len() > 1 {
            cursors.reset(&condition.id);
        }

        if condition.time_trial {
            if let Some(seconds) = trial_seconds(condition, event, view) {
                outcomes.push(Outcome::TimeTrial {
                    condition_id: condition.id.clone(),
                    seconds,
                });
            }
            continue;
        }

        match &condition.effect {
            Effect::Tag { tag } => outcomes.push(Outcome::UnlockTag { tag: tag.clone() }),
            Effect::Probe { kind, id } => {
                if probed.insert((*kind, *id)) {
                    outcomes.push(Outcome::Probe {
                        kind: *kind,
                        id: *id,
                        priority: SyncPriority::Immediate,
                    });
                }
            }
        }
    }

    outcomes
}

/// Probes a freshly joined player should answer on the next natural change
pub fn initial_probes<'c>(conditions: impl IntoIterator<Item = &'c Condition>) -> Vec<Outcome> {
    let mut seen: HashSet<(ValueKind, u32)> = HashSet::new();
    let mut outcomes = Vec::new();
    let mut push = |kind: ValueKind, id: u32, outcomes: &mut Vec<Outcome>| {
        if seen.insert((kind, id)) {
            outcomes.push(Outcome::Probe {
                kind,
                id,
                priority: SyncPriority::NextChange,
            });
        }
    };

    for condition in conditions {
        match &condition.trigger {
            Trigger::Switch { ids, .. } => {
                for id in ids {
                    push(ValueKind::Switch, *id, &mut outcomes);
                }
            }
            Trigger::Var { ids, .. } => {
                for id in ids {
                    push(ValueKind::Var, *id, &mut outcomes);
                }
            }
            _ => {}
        }
        for requirement in &condition.requires {
            let (kind, id) = requirement.key();
            push(kind, id, &mut outcomes);
        }
    }

    outcomes
}

fn triggered(
    condition: &Condition,
    event: ConditionEvent<'_>,
    view: &PlayerView<'_>,
    cursors: &mut ChainCursors,
) -> bool {
    let fired = match (&condition.trigger, event) {
        (Trigger::Switch { ids, value: expected }, ConditionEvent::SwitchChanged { id, value })
            if ids.contains(&id) =>
        {
            let matched = value == *expected;
            if ids.len() == 1 {
                matched
            } else {
                cursors.advance(&condition.id, ids, id, matched)
            }
        }
        (Trigger::Var { ids, op, value: target }, ConditionEvent::VarChanged { id, value })
            if ids.contains(&id) =>
        {
            let matched = var_matches(condition.time_trial, *op, value, *target);
            if ids.len() == 1 {
                matched
            } else {
                cursors.advance(&condition.id, ids, id, matched)
            }
        }
        (Trigger::Picture { names }, ConditionEvent::PictureShown { name }) => {
            names.iter().any(|n| n == name)
        }
        (Trigger::PreviousMap { map_id }, ConditionEvent::PreviousMapChanged { map_id: m }) => {
            *map_id == m
        }
        (
            Trigger::Coords,
            ConditionEvent::CoordsChanged | ConditionEvent::Teleported | ConditionEvent::Generic,
        ) => true,
        _ => false,
    };
    if fired {
        return true;
    }

    // A requirement value arriving late re-checks a trigger that already holds
    requirement_event(condition, event) && trigger_holds(condition, view, cursors)
}

fn requirement_event(condition: &Condition, event: ConditionEvent<'_>) -> bool {
    let key = match event {
        ConditionEvent::SwitchChanged { id, .. } => (ValueKind::Switch, id),
        ConditionEvent::VarChanged { id, .. } => (ValueKind::Var, id),
        _ => return false,
    };
    condition.requires.iter().any(|r| r.key() == key)
}

fn trigger_holds(condition: &Condition, view: &PlayerView<'_>, cursors: &ChainCursors) -> bool {
    match &condition.trigger {
        Trigger::Switch { ids, value } if ids.len() == 1 => {
            view.switches.get(&ids[0]) == Some(value)
        }
        Trigger::Var { ids, op, value } if ids.len() == 1 => view
            .vars
            .get(&ids[0])
            .map_or(false, |v| var_matches(condition.time_trial, *op, *v, *value)),
        Trigger::Switch { ids, .. } | Trigger::Var { ids, .. } => {
            cursors.complete(&condition.id, ids.len())
        }
        Trigger::PreviousMap { map_id } => view.breadcrumbs.previous == Some(*map_id),
        Trigger::Coords => true,
        Trigger::Picture { .. } => false,
    }
}

fn var_matches(time_trial: bool, op: Comparison, value: i32, target: i32) -> bool {
    if time_trial {
        value < target
    } else {
        op.test(value, target)
    }
}

fn trial_seconds(
    condition: &Condition,
    event: ConditionEvent<'_>,
    view: &PlayerView<'_>,
) -> Option<i32> {
    let Trigger::Var { ids, .. } = &condition.trigger else {
        return None;
    };
    let last = *ids.last()?;
    match event {
        ConditionEvent::VarChanged { id, value } if id == last => Some(value),
        _ => view.vars.get(&last).copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_condition(id: &str, trigger: Trigger) -> Condition {
        Condition {
            id: id.to_string(),
            map_id: Some(1),
            bounds: None,
            trigger,
            requires: Vec::new(),
            effect: Effect::Tag {
                tag: format!("{}_tag", id),
            },
            time_trial: false,
        }
    }

    fn switch_event(id: u32, value: bool) -> ConditionEvent<'static> {
        ConditionEvent::SwitchChanged { id, value }
    }

    /// Caches a switch and evaluates its change, like the room does
    fn flip(
        avatar: &mut AvatarState,
        conditions: &[Condition],
        cursors: &mut ChainCursors,
        id: u32,
        value: bool,
    ) -> Vec<Outcome> {
        avatar.cache_switch(id, value);
        evaluate(switch_event(id, value), &PlayerView::of(avatar), conditions, cursors)
    }

    fn unlocks(outcomes: &[Outcome]) -> Vec<String> {
        outcomes
            .iter()
            .filter_map(|o| match o {
                Outcome::UnlockTag { tag } => Some(tag.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_switch_fires_on_match() {
        let conditions = vec![tag_condition(
            "bell",
            Trigger::Switch {
                ids: vec![5],
                value: true,
            },
        )];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        assert!(unlocks(&flip(&mut avatar, &conditions, &mut cursors, 5, false)).is_empty());
        assert_eq!(
            unlocks(&flip(&mut avatar, &conditions, &mut cursors, 5, true)),
            vec!["bell_tag".to_string()]
        );
        assert!(unlocks(&flip(&mut avatar, &conditions, &mut cursors, 6, true)).is_empty());
    }

    #[test]
    fn test_switch_chain_fires_once_after_last_id() {
        let conditions = vec![tag_condition(
            "chain",
            Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true,
            },
        )];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        assert!(flip(&mut avatar, &conditions, &mut cursors, 10, true).is_empty());
        assert_eq!(cursors.position("chain"), 1);
        assert!(flip(&mut avatar, &conditions, &mut cursors, 11, true).is_empty());
        assert_eq!(cursors.position("chain"), 2);
        let outcomes = flip(&mut avatar, &conditions, &mut cursors, 12, true);
        assert_eq!(unlocks(&outcomes), vec!["chain_tag".to_string()]);
        assert_eq!(cursors.position("chain"), 0);
    }

    #[test]
    fn test_switch_chain_out_of_order_does_not_fire() {
        let conditions = vec![tag_condition(
            "chain",
            Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true,
            },
        )];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        assert!(flip(&mut avatar, &conditions, &mut cursors, 10, true).is_empty());
        assert!(flip(&mut avatar, &conditions, &mut cursors, 12, true).is_empty());
        assert_eq!(cursors.position("chain"), 1);
    }

    #[test]
    fn test_gated_chain_ignores_later_reports() {
        let mut condition = tag_condition(
            "gated",
            Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true,
            },
        );
        condition.bounds = Some(CoordBounds {
            x1: 5,
            y1: 5,
            x2: 5,
            y2: 5,
        });
        let conditions = vec![condition];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        for id in [10, 11, 12] {
            assert!(flip(&mut avatar, &conditions, &mut cursors, id, true).is_empty());
        }
        assert_eq!(cursors.position("gated"), 3);

        avatar.place_at(5, 5);
        assert!(flip(&mut avatar, &conditions, &mut cursors, 10, false).is_empty());
        assert!(flip(&mut avatar, &conditions, &mut cursors, 11, true).is_empty());
        assert_eq!(cursors.position("gated"), 3);
    }

    #[test]
    fn test_var_threshold_and_equality() {
        let conditions = vec![
            tag_condition(
                "exact",
                Trigger::Var {
                    ids: vec![3],
                    op: Comparison::Eq,
                    value: 7,
                },
            ),
            tag_condition(
                "many",
                Trigger::Var {
                    ids: vec![4],
                    op: Comparison::Ge,
                    value: 100,
                },
            ),
        ];
        let avatar = AvatarState::new();
        let view = PlayerView::of(&avatar);
        let mut cursors = ChainCursors::new();

        let hit = |id, value, cursors: &mut ChainCursors| {
            unlocks(&evaluate(
                ConditionEvent::VarChanged { id, value },
                &view,
                &conditions,
                cursors,
            ))
        };

        assert!(hit(3, 6, &mut cursors).is_empty());
        assert_eq!(hit(3, 7, &mut cursors), vec!["exact_tag".to_string()]);
        assert!(hit(4, 99, &mut cursors).is_empty());
        assert_eq!(hit(4, 150, &mut cursors), vec!["many_tag".to_string()]);
    }

    #[test]
    fn test_time_trial_reports_seconds_below_threshold() {
        let mut condition = tag_condition(
            "race",
            Trigger::Var {
                ids: vec![20],
                op: Comparison::Eq,
                value: 3600,
            },
        );
        condition.time_trial = true;
        let conditions = vec![condition];
        let avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        let outcomes = evaluate(
            ConditionEvent::VarChanged { id: 20, value: 95 },
            &PlayerView::of(&avatar),
            &conditions,
            &mut cursors,
        );
        assert_eq!(
            outcomes,
            vec![Outcome::TimeTrial {
                condition_id: "race".to_string(),
                seconds: 95
            }]
        );

        let too_slow = evaluate(
            ConditionEvent::VarChanged { id: 20, value: 4000 },
            &PlayerView::of(&avatar),
            &conditions,
            &mut cursors,
        );
        assert!(too_slow.is_empty());
    }

    #[test]
    fn test_missing_requirement_probes_then_fires() {
        let mut condition = tag_condition(
            "gated",
            Trigger::Var {
                ids: vec![1],
                op: Comparison::Eq,
                value: 2,
            },
        );
        condition.requires = vec![Requirement::Switch { id: 9, value: true }];
        let conditions = vec![condition];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        avatar.cache_var(1, 2);
        let outcomes = evaluate(
            ConditionEvent::VarChanged { id: 1, value: 2 },
            &PlayerView::of(&avatar),
            &conditions,
            &mut cursors,
        );
        assert_eq!(
            outcomes,
            vec![Outcome::Probe {
                kind: ValueKind::Switch,
                id: 9,
                priority: SyncPriority::Immediate
            }]
        );

        // The probed value arrives and the held trigger is re-checked
        let outcomes = flip(&mut avatar, &conditions, &mut cursors, 9, true);
        assert_eq!(unlocks(&outcomes), vec!["gated_tag".to_string()]);
    }

    #[test]
    fn test_failed_requirement_blocks() {
        let mut condition = tag_condition(
            "gated",
            Trigger::Switch {
                ids: vec![1],
                value: true,
            },
        );
        condition.requires = vec![Requirement::Var {
            id: 2,
            op: Comparison::Gt,
            value: 10,
        }];
        let conditions = vec![condition];
        let mut avatar = AvatarState::new();
        avatar.cache_var(2, 10);
        let mut cursors = ChainCursors::new();

        assert!(flip(&mut avatar, &conditions, &mut cursors, 1, true).is_empty());
    }

    #[test]
    fn test_bounds_gate_resolution() {
        let mut condition = tag_condition("corner", Trigger::Coords);
        condition.bounds = Some(CoordBounds {
            x1: 10,
            y1: 10,
            x2: 12,
            y2: 12,
        });
        let conditions = vec![condition];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        avatar.step_to(5, 5);
        let outside = evaluate(
            ConditionEvent::CoordsChanged,
            &PlayerView::of(&avatar),
            &conditions,
            &mut cursors,
        );
        assert!(outside.is_empty());

        avatar.place_at(11, 12);
        let inside = evaluate(
            ConditionEvent::Teleported,
            &PlayerView::of(&avatar),
            &conditions,
            &mut cursors,
        );
        assert_eq!(unlocks(&inside), vec!["corner_tag".to_string()]);
    }

    #[test]
    fn test_probe_effect() {
        let mut condition = tag_condition(
            "ask",
            Trigger::Switch {
                ids: vec![1],
                value: true,
            },
        );
        condition.effect = Effect::Probe {
            kind: ValueKind::Var,
            id: 44,
        };
        let conditions = vec![condition];
        let mut avatar = AvatarState::new();
        let mut cursors = ChainCursors::new();

        let outcomes = flip(&mut avatar, &conditions, &mut cursors, 1, true);
        assert_eq!(
            outcomes,
            vec![Outcome::Probe {
                kind: ValueKind::Var,
                id: 44,
                priority: SyncPriority::Immediate
            }]
        );
    }

    #[test]
    fn test_picture_and_previous_map_triggers() {
        let conditions = vec![
            tag_condition(
                "poster",
                Trigger::Picture {
                    names: vec!["poster_a".to_string()],
                },
            ),
            tag_condition("came_from", Trigger::PreviousMap { map_id: 42 }),
        ];
        let avatar = AvatarState::new();
        let view = PlayerView::of(&avatar);
        let mut cursors = ChainCursors::new();

        let pic = evaluate(
            ConditionEvent::PictureShown { name: "poster_a" },
            &view,
            &conditions,
            &mut cursors,
        );
        assert_eq!(unlocks(&pic), vec!["poster_tag".to_string()]);

        let map = evaluate(
            ConditionEvent::PreviousMapChanged { map_id: 42 },
            &view,
            &conditions,
            &mut cursors,
        );
        assert_eq!(unlocks(&map), vec!["came_from_tag".to_string()]);
    }

    #[test]
    fn test_applies_to_map_scope() {
        let mut global = tag_condition("g", Trigger::Coords);
        global.map_id = None;
        let local = tag_condition("l", Trigger::Coords);

        assert!(global.applies_to(1));
        assert!(global.applies_to(77));
        assert!(local.applies_to(1));
        assert!(!local.applies_to(2));
    }

    #[test]
    fn test_initial_probes_deduplicated() {
        let mut a = tag_condition(
            "a",
            Trigger::Switch {
                ids: vec![1, 2],
                value: true,
            },
        );
        a.requires = vec![Requirement::Var {
            id: 3,
            op: Comparison::Eq,
            value: 1,
        }];
        let b = tag_condition(
            "b",
            Trigger::Switch {
                ids: vec![2],
                value: false,
            },
        );

        let probes = initial_probes(&[a, b]);
        assert_eq!(probes.len(), 3);
        assert!(probes.iter().all(|p| matches!(
            p,
            Outcome::Probe {
                priority: SyncPriority::NextChange,
                ..
            }
        )));
    }

    #[test]
    fn test_condition_json_shape() {
        let json = r#"{
            "id": "c1",
            "map_id": 3,
            "trigger": {"type": "switch", "ids": [10, 11, 12]},
            "requires": [{"type": "var", "id": 4, "op": "ge", "value": 2}],
            "effect": {"type": "tag", "tag": "x"}
        }"#;

        let condition: Condition = serde_json::from_str(json).unwrap();
        assert_eq!(
            condition.trigger,
            Trigger::Switch {
                ids: vec![10, 11, 12],
                value: true
            }
        );
        assert!(!condition.time_trial);
        assert_eq!(condition.requires.len(), 1);
    }
}
