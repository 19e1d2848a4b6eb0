//! Host personalities: the persona prompt and prebuilt voice the remote host speaks with.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prebuilt voices offered by the live service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoiceName {
    Puck,
    Charon,
    Kore,
    Fenrir,
    Zephyr,
}

impl VoiceName {
    pub const ALL: [VoiceName; 5] = [
        VoiceName::Puck,
        VoiceName::Charon,
        VoiceName::Kore,
        VoiceName::Fenrir,
        VoiceName::Zephyr,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Puck => "Puck",
            Self::Charon => "Charon",
            Self::Kore => "Kore",
            Self::Fenrir => "Fenrir",
            Self::Zephyr => "Zephyr",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for VoiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trivia host persona.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostPersonality {
    pub id: String,
    pub name: String,
    pub description: String,
    pub voice_name: VoiceName,
    pub prompt: String,
    #[serde(default)]
    pub is_custom: bool,
}

impl HostPersonality {
    /// Build a user-defined host. Ids are `custom-<uuid>` so they never collide with presets.
    pub fn custom(
        name: impl Into<String>,
        description: impl Into<String>,
        voice_name: VoiceName,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: format!("custom-{}", uuid::Uuid::new_v4()),
            name: name.into(),
            description: description.into(),
            voice_name,
            prompt: prompt.into(),
            is_custom: true,
        }
    }
}

fn preset(id: &str, name: &str, description: &str, voice_name: VoiceName, prompt: &str) -> HostPersonality {
    HostPersonality {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        voice_name,
        prompt: prompt.to_string(),
        is_custom: false,
    }
}

/// The built-in hosts.
pub fn preset_hosts() -> Vec<HostPersonality> {
    vec![
        preset(
            "professor",
            "Professor Sterling",
            "A formal, highly educated scholar who values precision and academic rigor.",
            VoiceName::Puck,
            "You are Professor Sterling, a formal and highly knowledgeable academic hosting a trivia session. \
             You use sophisticated vocabulary, speak with intellectual authority, and occasionally share a \
             \"fascinating footnote\" about the facts. You are encouraging but remain strictly professional.",
        ),
        preset(
            "comedian",
            "Buster Guffaw",
            "A witty, slightly sarcastic comedian who loves puns and lighthearted ribbing.",
            VoiceName::Charon,
            "You are Buster Guffaw, a witty and sarcastic comedian hosting a trivia show. You love making jokes \
             about the questions, using puns, and gently teasing the user if they take too long or get a simple \
             one wrong. Your goal is to keep the mood hilarious and self-deprecating.",
        ),
        preset(
            "enthusiast",
            "Joy Ryder",
            "The ultimate cheerleader! High energy, incredibly positive, and genuinely excited about every fact.",
            VoiceName::Kore,
            "You are Joy Ryder, an incredibly high-energy and enthusiastic host. You believe every bit of trivia \
             is the most exciting thing in the world! You use lots of exclamation points in your speech, cheer \
             loudly for the user, and maintain a 10/10 energy level at all times.",
        ),
        preset(
            "librarian",
            "Ms. Penelope",
            "A kind, gentle, and incredibly knowledgeable grandmotherly figure.",
            VoiceName::Zephyr,
            "You are Ms. Penelope, a warm, wise, and gentle librarian. You believe every trivia question is a \
             beautiful opportunity to learn. You are patient, kind, and give gentle hints if the user seems \
             stuck. Your tone is soothing and nurturing.",
        ),
    ]
}

/// Look up a preset (or one of `extra`) by id.
pub fn find_host(id: &str, extra: &[HostPersonality]) -> Option<HostPersonality> {
    preset_hosts()
        .into_iter()
        .chain(extra.iter().cloned())
        .find(|h| h.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_have_distinct_ids() {
        let hosts = preset_hosts();
        assert_eq!(hosts.len(), 4);
        let mut ids: Vec<_> = hosts.iter().map(|h| h.id.as_str()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 4);
        assert!(hosts.iter().all(|h| !h.is_custom));
    }

    #[test]
    fn custom_host_gets_prefixed_id() {
        let host = HostPersonality::custom("Captain Quiz", "A pirate", VoiceName::Fenrir, "Arr.");
        assert!(host.id.starts_with("custom-"));
        assert!(host.is_custom);
        assert_eq!(find_host(&host.id, &[host.clone()]), Some(host));
    }

    #[test]
    fn voice_names_round_trip_through_labels() {
        assert_eq!(VoiceName::parse("zephyr"), Some(VoiceName::Zephyr));
        assert_eq!(VoiceName::Charon.to_string(), "Charon");
        assert!(find_host("librarian", &[]).is_some());
        assert!(find_host("nobody", &[]).is_none());
    }
}
