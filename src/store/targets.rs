use anyhow::{anyhow, bail, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{
    models::{
        target::{default_prompt, is_default_prompt_for},
        MonitorTarget, SLOT_COUNT,
    },
    settings::JsonStore,
};

/// `monitor_apps.json` as the settings page writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MonitorAppsDocument {
    #[serde(default)]
    apps: Vec<StoredSlot>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
struct StoredSlot {
    id: i64,
    /// Written for readers of the file; recomputed on load.
    status: bool,
    name: String,
    exe_path: String,
    prompt: String,
}

impl From<&MonitorTarget> for StoredSlot {
    fn from(target: &MonitorTarget) -> Self {
        Self {
            id: i64::from(target.id),
            status: target.is_enabled(),
            name: target.name.clone(),
            exe_path: target.exe_path.clone(),
            prompt: target.prompt.clone(),
        }
    }
}

/// The fixed set of monitor slots.
///
/// Always yields exactly [`SLOT_COUNT`] targets in slot order, whatever is on
/// disk: missing slots are empty, out-of-range and duplicate ids are dropped
/// (first one wins).
pub struct TargetRegistry {
    store: JsonStore<MonitorAppsDocument>,
}

impl TargetRegistry {
    pub fn open(path: PathBuf) -> Self {
        Self {
            store: JsonStore::open(path),
        }
    }

    /// Cached view.
    pub fn load(&self) -> Vec<MonitorTarget> {
        normalize(&self.store.snapshot())
    }

    /// Re-read from disk; the settings surface may have changed the file.
    pub fn reload(&self) -> Vec<MonitorTarget> {
        normalize(&self.store.reload())
    }

    /// Snapshot of the live slots, in slot order.
    pub fn enabled_targets(&self) -> Vec<MonitorTarget> {
        self.reload()
            .into_iter()
            .filter(MonitorTarget::is_enabled)
            .collect()
    }

    pub fn save(&self, targets: &[MonitorTarget]) -> Result<()> {
        let document = MonitorAppsDocument {
            apps: targets.iter().map(StoredSlot::from).collect(),
        };
        let normalized = normalize(&document);
        self.store.replace(MonitorAppsDocument {
            apps: normalized.iter().map(StoredSlot::from).collect(),
        })
    }

    /// Edit one slot. An empty prompt gets the default for `name`; on a
    /// rename, a prompt still equal to the old name's default follows the new
    /// name. Anything the user wrote is kept as is.
    pub fn update_slot(
        &self,
        id: u8,
        name: &str,
        exe_path: &str,
        prompt: &str,
    ) -> Result<MonitorTarget> {
        if id == 0 || usize::from(id) > SLOT_COUNT {
            bail!("slot id {id} out of range 1..={SLOT_COUNT}");
        }
        let index = usize::from(id) - 1;

        let mut updated = None;
        self.store.update(|document| {
            let mut targets = normalize(document);
            let previous = &targets[index];

            let renamed = previous.name != name.trim();
            let prompt = if name.trim().is_empty() {
                prompt.to_string()
            } else if prompt.trim().is_empty()
                || (renamed && is_default_prompt_for(prompt, &previous.name))
            {
                default_prompt(name)
            } else {
                prompt.to_string()
            };

            let target = MonitorTarget::new(id, name, exe_path, &prompt);
            targets[index] = target.clone();
            document.apps = targets.iter().map(StoredSlot::from).collect();
            updated = Some(target);
        })?;

        updated.ok_or_else(|| anyhow!("slot {id} was not updated"))
    }
}

fn normalize(document: &MonitorAppsDocument) -> Vec<MonitorTarget> {
    let mut slots: Vec<Option<MonitorTarget>> = vec![None; SLOT_COUNT];

    for stored in &document.apps {
        let Ok(id) = u8::try_from(stored.id) else {
            continue;
        };
        if id == 0 || usize::from(id) > SLOT_COUNT {
            continue;
        }
        let slot = &mut slots[usize::from(id) - 1];
        if slot.is_none() {
            *slot = Some(MonitorTarget::new(
                id,
                &stored.name,
                &stored.exe_path,
                &stored.prompt,
            ));
        }
    }

    slots
        .into_iter()
        .zip(1u8..)
        .map(|(slot, id)| slot.unwrap_or_else(|| MonitorTarget::empty(id)))
        .collect()
}
