use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scopes requested during consent.
pub const GOOGLE_SCOPES: &[&str] = &[
    "openid",
    "email",
    "profile",
    "https://mail.google.com/",
    "https://www.googleapis.com/auth/gmail.readonly",
    "https://www.googleapis.com/auth/gmail.send",
    "https://www.googleapis.com/auth/gmail.modify",
    "https://www.googleapis.com/auth/calendar",
    "https://www.googleapis.com/auth/drive",
    "https://www.googleapis.com/auth/documents",
    "https://www.googleapis.com/auth/spreadsheets",
    "https://www.googleapis.com/auth/meetings",
];

/// Workspace products an organization can switch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GoogleModule {
    Gmail,
    Calendar,
    Drive,
    Docs,
    Sheets,
    Meet,
    Voice,
}

impl GoogleModule {
    pub const ALL: &'static [GoogleModule] = &[
        GoogleModule::Gmail,
        GoogleModule::Calendar,
        GoogleModule::Drive,
        GoogleModule::Docs,
        GoogleModule::Sheets,
        GoogleModule::Meet,
        GoogleModule::Voice,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GoogleModule::Gmail => "Gmail",
            GoogleModule::Calendar => "Calendar",
            GoogleModule::Drive => "Drive",
            GoogleModule::Docs => "Docs",
            GoogleModule::Sheets => "Sheets",
            GoogleModule::Meet => "Meet",
            GoogleModule::Voice => "Voice",
        }
    }

    /// Switch column in `google_workspace_configs`.
    pub(crate) fn column(&self) -> &'static str {
        match self {
            GoogleModule::Gmail => "gmail_enabled",
            GoogleModule::Calendar => "calendar_enabled",
            GoogleModule::Drive => "drive_enabled",
            GoogleModule::Docs => "docs_enabled",
            GoogleModule::Sheets => "sheets_enabled",
            GoogleModule::Meet => "meet_enabled",
            GoogleModule::Voice => "voice_enabled",
        }
    }

    /// Any one of these scopes unlocks the module. Voice has none: toggle only.
    pub fn unlocking_scopes(&self) -> &'static [&'static str] {
        match self {
            GoogleModule::Gmail => &[
                "https://mail.google.com/",
                "https://www.googleapis.com/auth/gmail.readonly",
                "https://www.googleapis.com/auth/gmail.send",
                "https://www.googleapis.com/auth/gmail.modify",
            ],
            GoogleModule::Calendar => &["https://www.googleapis.com/auth/calendar"],
            GoogleModule::Drive => &["https://www.googleapis.com/auth/drive"],
            GoogleModule::Docs => &["https://www.googleapis.com/auth/documents"],
            GoogleModule::Sheets => &["https://www.googleapis.com/auth/spreadsheets"],
            GoogleModule::Meet => &["https://www.googleapis.com/auth/meetings"],
            GoogleModule::Voice => &[],
        }
    }
}

impl fmt::Display for GoogleModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GoogleModule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        GoogleModule::ALL
            .iter()
            .copied()
            .find(|m| m.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown module: {s}"))
    }
}

/// Modules unlocked by a space-delimited granted scope string.
pub fn modules_for_scopes(granted: &str) -> Vec<GoogleModule> {
    let granted: Vec<&str> = granted.split_whitespace().collect();
    GoogleModule::ALL
        .iter()
        .copied()
        .filter(|m| m.unlocking_scopes().iter().any(|s| granted.contains(s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_gmail_scope_unlocks_gmail() {
        let mods = modules_for_scopes("openid https://www.googleapis.com/auth/gmail.send");
        assert_eq!(mods, vec![GoogleModule::Gmail]);
    }

    #[test]
    fn full_grant_unlocks_everything_but_voice() {
        let mods = modules_for_scopes(&GOOGLE_SCOPES.join(" "));
        assert_eq!(mods.len(), GoogleModule::ALL.len() - 1);
        assert!(!mods.contains(&GoogleModule::Voice));
    }

    #[test]
    fn module_names_parse_case_insensitively() {
        assert_eq!("calendar".parse::<GoogleModule>(), Ok(GoogleModule::Calendar));
        assert_eq!("Voice".parse::<GoogleModule>(), Ok(GoogleModule::Voice));
        assert!("Chat".parse::<GoogleModule>().is_err());
    }
}
