//! Persona picker view model and avatar lookup.

use crate::api::Persona;
use crate::dialog::Confirm;
use std::path::{Path, PathBuf};

const DEFAULT_AVATAR: &str = "default";
const DISCOVERY_MAX_INDEX: usize = 100;
const DISCOVERY_MAX_MISSES: usize = 3;

/// What a click on a persona card means.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersonaAction {
    /// Open a new chat with this persona (by name).
    Select(String),
    /// Delete mode: a confirmation for this persona id is now pending.
    RequestDelete(i64),
}

/// Picker state: delete-mode toggle and the pending delete confirmation.
#[derive(Debug, Default)]
pub struct PersonaRegistry {
    delete_mode: bool,
    confirm: Confirm<i64>,
}

impl PersonaRegistry {
    pub fn delete_mode(&self) -> bool {
        self.delete_mode
    }

    pub fn toggle_delete_mode(&mut self) {
        self.delete_mode = !self.delete_mode;
        if !self.delete_mode {
            self.confirm.cancel();
        }
    }

    pub fn click(&mut self, persona: &Persona) -> PersonaAction {
        if self.delete_mode {
            self.confirm.request(persona.id);
            PersonaAction::RequestDelete(persona.id)
        } else {
            PersonaAction::Select(persona.name.clone())
        }
    }

    pub fn pending_delete(&self) -> Option<i64> {
        self.confirm.pending().copied()
    }

    /// Accept the pending delete and leave delete mode.
    pub fn confirm_delete(&mut self) -> Option<i64> {
        let id = self.confirm.confirm();
        if id.is_some() {
            self.delete_mode = false;
        }
        id
    }

    pub fn cancel_delete(&mut self) {
        self.confirm.cancel();
    }
}

/// Find a persona by id in a list.
pub fn find_by_id(personas: &[Persona], id: i64) -> Option<&Persona> {
    personas.iter().find(|p| p.id == id)
}

/// Resolves avatar images under a directory of `<name>.png` files.
#[derive(Debug, Clone)]
pub struct AvatarResolver {
    dir: PathBuf,
}

impl AvatarResolver {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn image(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.png", name))
    }

    pub fn default_avatar(&self) -> PathBuf {
        self.image(DEFAULT_AVATAR)
    }

    /// Preferred image: the persona's avatar id, else its lowercased name.
    pub fn candidate(&self, persona: &Persona) -> PathBuf {
        let name = persona
            .avatar
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(String::from)
            .unwrap_or_else(|| persona.name.trim().to_lowercase());
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return self.default_avatar();
        }
        self.image(&name)
    }

    /// Candidate when the file exists, otherwise the default image.
    pub fn resolve(&self, persona: &Persona) -> PathBuf {
        let candidate = self.candidate(persona);
        if candidate.is_file() {
            candidate
        } else {
            self.default_avatar()
        }
    }

    /// Avatar ids offered when creating a persona: `Avatar_1`, `Avatar_2`, ... as long as the
    /// files exist, tolerating a few gaps. Falls back to `["default"]`.
    pub fn discover(&self) -> Vec<String> {
        let mut found = Vec::new();
        let mut misses = 0;
        for index in 1..=DISCOVERY_MAX_INDEX {
            if misses >= DISCOVERY_MAX_MISSES {
                break;
            }
            let name = format!("Avatar_{}", index);
            if self.image(&name).is_file() {
                found.push(name);
                misses = 0;
            } else {
                misses += 1;
            }
        }
        log::debug!("discovered {} avatars in {}", found.len(), self.dir.display());
        if found.is_empty() {
            vec![DEFAULT_AVATAR.to_string()]
        } else {
            found
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn persona(id: i64, name: &str, avatar: Option<&str>) -> Persona {
        serde_json::from_value(serde_json::json!({
            "id": id,
            "name": name,
            "avatar": avatar,
        }))
        .unwrap()
    }

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("twin-avatars-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn click_selects_or_requests_delete() {
        let mut r = PersonaRegistry::default();
        let maria = persona(4, "maria", None);
        assert_eq!(r.click(&maria), PersonaAction::Select("maria".to_string()));
        assert!(r.pending_delete().is_none());

        r.toggle_delete_mode();
        assert_eq!(r.click(&maria), PersonaAction::RequestDelete(4));
        assert_eq!(r.pending_delete(), Some(4));
        assert_eq!(r.confirm_delete(), Some(4));
        assert!(!r.delete_mode());
    }

    #[test]
    fn leaving_delete_mode_drops_pending() {
        let mut r = PersonaRegistry::default();
        r.toggle_delete_mode();
        r.click(&persona(1, "ana", None));
        r.toggle_delete_mode();
        assert!(r.pending_delete().is_none());
    }

    #[test]
    fn avatar_resolution_falls_back() {
        let dir = temp_dir();
        std::fs::write(dir.join("rafael.png"), b"png").unwrap();
        std::fs::write(dir.join("Avatar_2.png"), b"png").unwrap();
        let resolver = AvatarResolver::new(&dir);

        assert_eq!(resolver.resolve(&persona(1, "Rafael", None)), dir.join("rafael.png"));
        assert_eq!(
            resolver.resolve(&persona(2, "Maria", Some("Avatar_2"))),
            dir.join("Avatar_2.png")
        );
        assert_eq!(resolver.resolve(&persona(3, "Ana", None)), dir.join("default.png"));
        assert_eq!(
            resolver.candidate(&persona(4, "../etc", None)),
            dir.join("default.png")
        );
    }

    #[test]
    fn discovery_tolerates_gaps() {
        let dir = temp_dir();
        for name in ["Avatar_1", "Avatar_3", "Avatar_7"] {
            std::fs::write(dir.join(format!("{}.png", name)), b"png").unwrap();
        }
        let resolver = AvatarResolver::new(&dir);
        assert_eq!(resolver.discover(), vec!["Avatar_1", "Avatar_3"]);

        let empty = AvatarResolver::new(temp_dir());
        assert_eq!(empty.discover(), vec!["default"]);
    }
}
