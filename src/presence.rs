use crate::types::call::UserId;
use dashmap::DashSet;
use log::debug;

/// Presence lookup provided by the user directory.
pub trait Presence: Send + Sync {
    fn is_online(&self, user: &UserId) -> bool;
}

/// Online-user set, replaced wholesale whenever the relay pushes a new list.
#[derive(Debug, Default)]
pub struct PresenceList {
    online: DashSet<UserId>,
}

impl PresenceList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn replace(&self, users: impl IntoIterator<Item = UserId>) {
        self.online.clear();
        for user in users {
            self.online.insert(user);
        }
        debug!("Presence list updated: {} users online", self.online.len());
    }

    pub fn set_online(&self, user: UserId) {
        self.online.insert(user);
    }

    pub fn len(&self) -> usize {
        self.online.len()
    }

    pub fn is_empty(&self) -> bool {
        self.online.is_empty()
    }
}

impl Presence for PresenceList {
    fn is_online(&self, user: &UserId) -> bool {
        self.online.contains(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_drops_previous_entries() {
        let presence = PresenceList::new();
        presence.set_online(UserId::new("alice"));
        presence.replace(vec![UserId::new("bob"), UserId::new("carol")]);

        assert!(!presence.is_online(&UserId::new("alice")));
        assert!(presence.is_online(&UserId::new("bob")));
        assert_eq!(presence.len(), 2);
    }
}
