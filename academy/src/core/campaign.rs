//! Campaign-owned state transitions.
//!
//! The campaign holds its state behind an `Arc` and never mutates a published
//! snapshot: every transition derives a new [`CampaignState`] from the latest
//! one and swaps it in. Readers keep whatever snapshot they took.

use std::sync::Arc;

use serde::Serialize;

use crate::core::registry::MissionDef;
use crate::core::types::{MissionId, MissionStatus};

/// Durable part of the campaign (agent identity and unlock progress).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CampaignProgress {
    pub agent_name: String,
    /// Ordinal of the highest unlocked mission. Equals the mission count once
    /// the whole campaign is finished.
    pub progress: usize,
}

/// Read-only mission view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Mission {
    pub id: MissionId,
    pub title: String,
    pub description: String,
    pub ordinal: usize,
    pub status: MissionStatus,
    /// Derived from progress: `ordinal > progress`.
    pub locked: bool,
}

/// Immutable campaign snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignState {
    pub agent_name: String,
    pub progress: usize,
    pub missions: Vec<Mission>,
    pub current: Option<MissionId>,
    /// Incremented whenever the current mission is set or cleared.
    pub mission_epoch: u64,
}

impl CampaignState {
    pub fn mission(&self, id: MissionId) -> Option<&Mission> {
        self.missions.iter().find(|m| m.id == id)
    }

    pub fn current_mission(&self) -> Option<&Mission> {
        self.current.and_then(|id| self.mission(id))
    }

    pub fn is_registered(&self) -> bool {
        !self.agent_name.is_empty()
    }

    pub fn is_finished(&self) -> bool {
        self.progress >= self.missions.len()
    }

    pub fn progress_record(&self) -> CampaignProgress {
        CampaignProgress {
            agent_name: self.agent_name.clone(),
            progress: self.progress,
        }
    }
}

/// Summary of what a transition changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CampaignUpdate {
    /// The transition was accepted (false for no-ops on locked/unknown ids).
    pub applied: bool,
    /// The current mission was set, replaced or cleared.
    pub current_changed: bool,
    pub progress_advanced: bool,
    /// The mission went from not-completed to completed.
    pub newly_completed: bool,
    pub identity_changed: bool,
}

impl CampaignUpdate {
    /// Whether the durable progress record needs to be written.
    pub fn needs_persist(&self) -> bool {
        self.progress_advanced || self.identity_changed
    }
}

/// Campaign state machine.
#[derive(Debug, Clone)]
pub struct Campaign {
    state: Arc<CampaignState>,
}

impl Campaign {
    /// Build the campaign from a registry and loaded progress.
    ///
    /// Progress beyond the mission count is clamped. Missions below the
    /// loaded progress start out completed.
    pub fn new(registry: &[MissionDef], loaded: CampaignProgress) -> Self {
        let progress = loaded.progress.min(registry.len());
        let missions = registry
            .iter()
            .enumerate()
            .map(|(ordinal, def)| Mission {
                id: def.id,
                title: def.title.to_string(),
                description: def.description.to_string(),
                ordinal,
                status: if ordinal < progress {
                    MissionStatus::Completed
                } else {
                    MissionStatus::Pending
                },
                locked: ordinal > progress,
            })
            .collect();
        Self {
            state: Arc::new(CampaignState {
                agent_name: loaded.agent_name,
                progress,
                missions,
                current: None,
                mission_epoch: 0,
            }),
        }
    }

    /// Current snapshot. Cheap to clone and safe to hold across transitions.
    pub fn snapshot(&self) -> Arc<CampaignState> {
        Arc::clone(&self.state)
    }

    pub fn register_agent(&mut self, name: &str) -> Result<CampaignUpdate, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("agent name must not be empty".to_string());
        }
        let identity_changed = self.state.agent_name != name;
        let mut next = (*self.state).clone();
        next.agent_name = name.to_string();
        self.state = Arc::new(next);
        Ok(CampaignUpdate {
            applied: true,
            identity_changed,
            ..CampaignUpdate::default()
        })
    }

    /// Engage a mission. Locked or unknown missions are ignored.
    pub fn start_mission(&mut self, id: MissionId) -> CampaignUpdate {
        let Some(target) = self.state.mission(id) else {
            return CampaignUpdate::default();
        };
        if target.locked {
            return CampaignUpdate::default();
        }

        let mut next = (*self.state).clone();
        let previous = next.current.replace(id);
        if let Some(prev_id) = previous.filter(|prev| *prev != id) {
            release_mission(&mut next, prev_id);
        }
        if let Some(mission) = next.missions.iter_mut().find(|m| m.id == id)
            && mission.status != MissionStatus::Completed
        {
            mission.status = MissionStatus::Active;
        }
        next.mission_epoch += 1;
        self.state = Arc::new(next);

        CampaignUpdate {
            applied: true,
            current_changed: true,
            ..CampaignUpdate::default()
        }
    }

    /// Return to the campaign map. Always succeeds.
    pub fn exit_mission(&mut self) -> CampaignUpdate {
        let Some(current) = self.state.current else {
            return CampaignUpdate {
                applied: true,
                ..CampaignUpdate::default()
            };
        };
        let mut next = (*self.state).clone();
        next.current = None;
        release_mission(&mut next, current);
        next.mission_epoch += 1;
        self.state = Arc::new(next);
        CampaignUpdate {
            applied: true,
            current_changed: true,
            ..CampaignUpdate::default()
        }
    }

    /// Mark a mission completed and advance progress when it was the frontier.
    ///
    /// Progress moves by exactly one, and only if the mission's ordinal equals
    /// the progress value of the latest snapshot. Re-completing a mission
    /// does not re-mark it but still evaluates the frontier rule.
    pub fn complete_mission(&mut self, id: MissionId) -> CampaignUpdate {
        let latest = Arc::clone(&self.state);
        let Some(target) = latest.mission(id) else {
            return CampaignUpdate::default();
        };
        let newly_completed = target.status != MissionStatus::Completed;
        let progress_advanced = target.ordinal == latest.progress;

        let mut next = (*latest).clone();
        if let Some(mission) = next.missions.iter_mut().find(|m| m.id == id) {
            mission.status = MissionStatus::Completed;
        }
        if progress_advanced {
            next.progress += 1;
            derive_locks(&mut next);
        }
        self.state = Arc::new(next);

        CampaignUpdate {
            applied: true,
            progress_advanced,
            newly_completed,
            ..CampaignUpdate::default()
        }
    }

    /// Record a failed attempt. Only an active mission can fail.
    pub fn fail_mission(&mut self, id: MissionId) -> CampaignUpdate {
        self.set_status_if(id, MissionStatus::Active, MissionStatus::Failed)
    }

    /// A failed mission is being retried.
    pub fn reactivate_mission(&mut self, id: MissionId) -> CampaignUpdate {
        self.set_status_if(id, MissionStatus::Failed, MissionStatus::Active)
    }

    fn set_status_if(
        &mut self,
        id: MissionId,
        from: MissionStatus,
        to: MissionStatus,
    ) -> CampaignUpdate {
        match self.state.mission(id) {
            Some(mission) if mission.status == from => {}
            _ => return CampaignUpdate::default(),
        }
        let mut next = (*self.state).clone();
        if let Some(mission) = next.missions.iter_mut().find(|m| m.id == id) {
            mission.status = to;
        }
        self.state = Arc::new(next);
        CampaignUpdate {
            applied: true,
            ..CampaignUpdate::default()
        }
    }
}

/// Drop an engaged-but-unfinished mission back to pending.
fn release_mission(state: &mut CampaignState, id: MissionId) {
    if let Some(mission) = state.missions.iter_mut().find(|m| m.id == id)
        && matches!(mission.status, MissionStatus::Active | MissionStatus::Failed)
    {
        mission.status = MissionStatus::Pending;
    }
}

fn derive_locks(state: &mut CampaignState) {
    let progress = state.progress;
    for mission in &mut state.missions {
        mission.locked = mission.ordinal > progress;
    }
}
