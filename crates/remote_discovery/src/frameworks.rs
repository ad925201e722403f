//! Liveness of the remote frameworks heard on the multicast group.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::packet::Access;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameworkState {
    Alive,
    Suspect,
}

impl std::fmt::Display for FrameworkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Alive => write!(f, "Alive"),
            Self::Suspect => write!(f, "Suspect"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrameworkEntry {
    pub framework_uid: String,
    pub address: String,
    pub access: Access,
    pub state: FrameworkState,
    pub last_seen: Instant,
    pub suspect_since: Option<Instant>,
}

impl FrameworkEntry {
    fn new(framework_uid: &str, address: &str, access: &Access, now: Instant) -> Self {
        Self {
            framework_uid: framework_uid.to_string(),
            address: address.to_string(),
            access: access.clone(),
            state: FrameworkState::Alive,
            last_seen: now,
            suspect_since: None,
        }
    }

    fn mark_alive(&mut self, now: Instant) {
        self.state = FrameworkState::Alive;
        self.last_seen = now;
        self.suspect_since = None;
    }
}

#[derive(Default)]
pub struct FrameworkDirectory {
    frameworks: HashMap<String, FrameworkEntry>,
}

impl FrameworkDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a packet from a framework. Returns true if it is new.
    pub fn upsert(&mut self, framework_uid: &str, address: &str, access: &Access) -> bool {
        self.upsert_at(framework_uid, address, access, Instant::now())
    }

    fn upsert_at(
        &mut self,
        framework_uid: &str,
        address: &str,
        access: &Access,
        now: Instant,
    ) -> bool {
        if let Some(entry) = self.frameworks.get_mut(framework_uid) {
            entry.address = address.to_string();
            entry.access = access.clone();
            entry.mark_alive(now);
            return false;
        }
        self.frameworks.insert(
            framework_uid.to_string(),
            FrameworkEntry::new(framework_uid, address, access, now),
        );
        true
    }

    pub fn get(&self, framework_uid: &str) -> Option<&FrameworkEntry> {
        self.frameworks.get(framework_uid)
    }

    pub fn remove(&mut self, framework_uid: &str) -> Option<FrameworkEntry> {
        self.frameworks.remove(framework_uid)
    }

    pub fn all(&self) -> Vec<&FrameworkEntry> {
        self.frameworks.values().collect()
    }

    pub fn len(&self) -> usize {
        self.frameworks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frameworks.is_empty()
    }

    /// Alive -> Suspect after `timeout` of silence, Suspect -> lost after
    /// another `timeout`. Lost frameworks are removed and returned.
    pub fn tick(&mut self, timeout: Duration) -> Vec<String> {
        self.tick_at(Instant::now(), timeout)
    }

    fn tick_at(&mut self, now: Instant, timeout: Duration) -> Vec<String> {
        let mut lost = Vec::new();
        for entry in self.frameworks.values_mut() {
            match (entry.state, entry.suspect_since) {
                (FrameworkState::Alive, _) => {
                    if now.saturating_duration_since(entry.last_seen) > timeout {
                        entry.state = FrameworkState::Suspect;
                        entry.suspect_since = Some(now);
                    }
                }
                (FrameworkState::Suspect, Some(since)) => {
                    if now.saturating_duration_since(since) > timeout {
                        lost.push(entry.framework_uid.clone());
                    }
                }
                (FrameworkState::Suspect, None) => entry.suspect_since = Some(now),
            }
        }
        for uid in &lost {
            self.frameworks.remove(uid);
        }
        lost
    }
}
