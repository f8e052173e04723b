//! Semantic invariants of a campaign snapshot.

use std::collections::HashSet;

use crate::core::campaign::CampaignState;

/// Check campaign invariants:
/// - `progress <= mission count`
/// - ordinals match list positions, ids are unique
/// - a mission is locked iff `ordinal > progress`
/// - the current mission (if any) exists and is unlocked
pub fn validate_invariants(state: &CampaignState) -> Vec<String> {
    let mut errors = Vec::new();

    if state.progress > state.missions.len() {
        errors.push(format!(
            "progress {} exceeds mission count {}",
            state.progress,
            state.missions.len()
        ));
    }

    let mut seen = HashSet::new();
    for (index, mission) in state.missions.iter().enumerate() {
        if !seen.insert(mission.id) {
            errors.push(format!("duplicate mission id '{}'", mission.id));
        }
        if mission.ordinal != index {
            errors.push(format!(
                "{}: ordinal {} does not match position {}",
                mission.id, mission.ordinal, index
            ));
        }
        let expected_locked = mission.ordinal > state.progress;
        if mission.locked != expected_locked {
            errors.push(format!(
                "{}: locked={} but progress {} implies locked={}",
                mission.id, mission.locked, state.progress, expected_locked
            ));
        }
    }

    if let Some(current) = state.current {
        match state.mission(current) {
            None => errors.push(format!("current mission '{}' is not registered", current)),
            Some(mission) if mission.locked => {
                errors.push(format!("current mission '{}' is locked", current));
            }
            Some(_) => {}
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::campaign::{Campaign, CampaignProgress};
    use crate::core::registry::mission_registry;

    #[test]
    fn fresh_campaign_is_valid() {
        let campaign = Campaign::new(mission_registry(), CampaignProgress::default());
        assert!(validate_invariants(&campaign.snapshot()).is_empty());
    }

    #[test]
    fn reports_drifted_locks_and_locked_current() {
        let campaign = Campaign::new(mission_registry(), CampaignProgress::default());
        let mut state = (*campaign.snapshot()).clone();
        state.missions[2].locked = false;
        state.current = Some(state.missions[1].id);

        let errors = validate_invariants(&state);
        assert!(errors.iter().any(|err| err.contains("implies locked=true")));
        assert!(errors.iter().any(|err| err.contains("is locked")));
    }
}
