//! Notification configuration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Configuration for outcome messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Base URL of the participant portal.
    #[serde(default = "default_portal_url")]
    pub portal_url: String,

    /// Per-evaluation links to the participants' submission page.
    #[serde(default)]
    pub links: BTreeMap<String, String>,
}

fn default_portal_url() -> String {
    "https://www.synapse.org".to_string()
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            portal_url: default_portal_url(),
            links: BTreeMap::new(),
        }
    }
}

impl NotificationConfig {
    /// Link shown to participants for an evaluation.
    pub fn link_for(&self, evaluation_id: &str) -> String {
        match self.links.get(evaluation_id) {
            Some(link) => link.clone(),
            None => format!(
                "{}/evaluations/{}",
                self.portal_url.trim_end_matches('/'),
                evaluation_id
            ),
        }
    }

    pub fn with_link(mut self, evaluation_id: impl Into<String>, link: impl Into<String>) -> Self {
        self.links.insert(evaluation_id.into(), link.into());
        self
    }
}
