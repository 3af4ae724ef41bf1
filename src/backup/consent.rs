//! Asking the user before the first manual backup.

use super::types::CloudProvider;
use async_trait::async_trait;

/// What the consent dialog should tell the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRequest {
    pub provider: Option<CloudProvider>,
    pub title: String,
    pub body: String,
}

impl ConsentRequest {
    pub fn for_provider(provider: Option<CloudProvider>) -> Self {
        let (service, drive) = match provider {
            Some(p) => (p.display_name(), p.drive_name()),
            None => ("Device", "device storage"),
        };
        Self {
            provider,
            title: format!("Enable {} Backup", service),
            body: format!(
                "Luminar needs access to {} to securely back up your data.\n\n\
                 Your backup includes tasks, goals, projects, journal entries, theme, \
                 daily quote and profile settings.\n\n\
                 Your data will be:\n\
                 \u{2022} Encrypted and private\n\
                 \u{2022} Automatically synced across devices\n\
                 \u{2022} Available for restore anytime",
                drive
            ),
        }
    }
}

/// Blocking confirmation shown to the user
#[async_trait]
pub trait ConsentPrompt: Send + Sync {
    /// Resolve to `true` if the user agreed
    async fn confirm(&self, request: &ConsentRequest) -> bool;
}

/// Answers every request the same way without showing anything
#[derive(Debug, Clone, Copy)]
pub struct AutoConsent(pub bool);

#[async_trait]
impl ConsentPrompt for AutoConsent {
    async fn confirm(&self, _request: &ConsentRequest) -> bool {
        self.0
    }
}
