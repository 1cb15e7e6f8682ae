use serde::{Deserialize, Serialize};

use super::catalog::CatalogEntry;
use super::identity::Role;

/// Allow-list applied to the merged model listing for non-admin callers.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelFilterConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub models: Vec<String>,
}

impl ModelFilterConfig {
    pub fn applies_to(&self, role: Role) -> bool {
        self.enabled && !role.is_admin()
    }

    pub fn allows(&self, id: &str) -> bool {
        self.models.iter().any(|allowed| allowed == id)
    }

    pub fn apply<'a>(&self, role: Role, entries: &'a [CatalogEntry]) -> Vec<&'a CatalogEntry> {
        if !self.applies_to(role) {
            return entries.iter().collect();
        }
        entries.iter().filter(|entry| self.allows(&entry.id)).collect()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;

    use super::*;

    fn entries() -> Vec<CatalogEntry> {
        ["gpt-4", "llama-3", "mistral"]
            .iter()
            .enumerate()
            .map(|(backend_id, id)| CatalogEntry {
                id: id.to_string(),
                backend_id,
                attributes: Map::new(),
            })
            .collect()
    }

    fn filter(enabled: bool) -> ModelFilterConfig {
        ModelFilterConfig {
            enabled,
            models: vec!["llama-3".to_string(), "not-served".to_string()],
        }
    }

    #[test]
    fn users_see_only_allowed_models() {
        let entries = entries();
        let kept: Vec<&str> = filter(true)
            .apply(Role::User, &entries)
            .into_iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(kept, vec!["llama-3"]);
    }

    #[test]
    fn admins_always_see_everything() {
        let entries = entries();
        assert_eq!(filter(true).apply(Role::Admin, &entries).len(), 3);
    }

    #[test]
    fn disabled_filter_is_a_no_op() {
        let entries = entries();
        assert_eq!(filter(false).apply(Role::User, &entries).len(), 3);
        assert!(!filter(false).applies_to(Role::Pending));
    }
}
