//! Campaign progress persistence on top of a [`KeyValueStore`].

use anyhow::Result;
use tracing::{debug, warn};

use super::store::KeyValueStore;
use crate::core::campaign::CampaignProgress;

pub const AGENT_NAME_KEY: &str = "cipher_agent_name";
pub const PROGRESS_KEY: &str = "cipher_ticket_progress";

/// Load agent identity and progress. Absent keys yield `""` and `0`.
///
/// Progress that does not parse as a decimal integer is treated as `0`.
pub fn load_progress(store: &impl KeyValueStore) -> Result<CampaignProgress> {
    let agent_name = store.get(AGENT_NAME_KEY)?.unwrap_or_default();
    let progress = match store.get(PROGRESS_KEY)? {
        None => 0,
        Some(raw) => raw.trim().parse::<usize>().unwrap_or_else(|_| {
            warn!(value = %raw, "unparseable progress value, starting from 0");
            0
        }),
    };
    debug!(agent = %agent_name, progress, "loaded campaign progress");
    Ok(CampaignProgress {
        agent_name,
        progress,
    })
}

/// Persist agent identity and progress.
pub fn save_progress(store: &mut impl KeyValueStore, record: &CampaignProgress) -> Result<()> {
    debug!(agent = %record.agent_name, progress = record.progress, "saving campaign progress");
    store.set(AGENT_NAME_KEY, &record.agent_name)?;
    store.set(PROGRESS_KEY, &record.progress.to_string())?;
    Ok(())
}
