//! Monitor target data model.
//!
//! A target is one of a fixed number of slots the user fills with an
//! application to watch. Slots are never added or removed, only emptied.

/// Number of slots the registry always holds.
pub const SLOT_COUNT: usize = 4;

const FALLBACK_NAME: &str = "unnamed-app";
const INVALID_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorTarget {
    /// Slot id, `1..=SLOT_COUNT`.
    pub id: u8,
    pub name: String,
    pub exe_path: String,
    pub prompt: String,
}

impl MonitorTarget {
    pub fn new(id: u8, name: &str, exe_path: &str, prompt: &str) -> Self {
        Self {
            id,
            name: name.trim().to_string(),
            exe_path: exe_path.trim().to_string(),
            prompt: prompt.trim().to_string(),
        }
    }

    pub fn empty(id: u8) -> Self {
        Self::new(id, "", "", "")
    }

    /// Derived, never stored independently: a slot is live once it has both
    /// a name and an executable.
    pub fn is_enabled(&self) -> bool {
        !self.name.is_empty() && !self.exe_path.is_empty()
    }

    /// Text sent alongside this target's screenshot.
    pub fn analysis_prompt(&self) -> String {
        if self.prompt.is_empty() {
            default_prompt(&self.name)
        } else {
            self.prompt.clone()
        }
    }

    /// Directory and file stem for this target's captures.
    pub fn file_stem(&self) -> String {
        sanitize_name(&self.name)
    }
}

/// The prompt a slot gets when the user has not written one.
pub fn default_prompt(app_name: &str) -> String {
    let app_name = app_name.trim();
    if app_name.is_empty() {
        "This is an application window. Describe what the user is doing in the screenshot."
            .to_string()
    } else {
        format!(
            "This is the \"{app_name}\" application. Describe what the user is doing in the screenshot."
        )
    }
}

/// Whether `prompt` is still the one generated for `app_name`, so renaming
/// the slot may replace it.
pub fn is_default_prompt_for(prompt: &str, app_name: &str) -> bool {
    let prompt = prompt.trim();
    prompt.is_empty() || prompt == default_prompt(app_name)
}

/// Make a display name safe to use as a path component.
pub fn sanitize_name(raw_name: &str) -> String {
    let cleaned: String = raw_name
        .chars()
        .map(|c| if INVALID_NAME_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        cleaned.to_string()
    }
}
