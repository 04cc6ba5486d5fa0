//! In-memory admin presence roster.

use std::{collections::HashMap, str::FromStr, sync::RwLock};

use {
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Away,
    Offline,
}

impl FromStr for PresenceStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(Self::Online),
            "away" => Ok(Self::Away),
            "offline" => Ok(Self::Offline),
            other => Err(Error::invalid_input(format!("unknown presence status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminPresence {
    pub admin_id: String,
    pub admin_name: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct PresenceRoster {
    admins: RwLock<HashMap<String, AdminPresence>>,
}

impl PresenceRoster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `status` for an admin. An empty name keeps the previous one.
    pub fn update(&self, admin_id: &str, admin_name: &str, status: PresenceStatus) -> AdminPresence {
        let mut admins = self.admins.write().unwrap_or_else(|e| e.into_inner());
        let admin_name = match admin_name.trim() {
            "" => admins
                .get(admin_id)
                .map(|p| p.admin_name.clone())
                .unwrap_or_else(|| admin_id.to_string()),
            name => name.to_string(),
        };
        let presence = AdminPresence {
            admin_id: admin_id.to_string(),
            admin_name,
            status,
            last_seen: Utc::now(),
        };
        admins.insert(admin_id.to_string(), presence.clone());
        presence
    }

    /// Admins currently marked online, by name.
    pub fn online(&self) -> Vec<AdminPresence> {
        let mut online: Vec<_> = self
            .admins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|p| p.status == PresenceStatus::Online)
            .cloned()
            .collect();
        online.sort_by(|a, b| a.admin_name.cmp(&b.admin_name));
        online
    }

    pub fn any_online(&self) -> bool {
        self.admins
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .any(|p| p.status == PresenceStatus::Online)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn only_online_admins_are_listed() {
        let roster = PresenceRoster::new();
        assert!(!roster.any_online());

        roster.update("a2", "Ilyasa", PresenceStatus::Online);
        roster.update("a1", "Angga", PresenceStatus::Online);
        roster.update("a3", "Kantor", PresenceStatus::Away);

        let names: Vec<_> = roster.online().into_iter().map(|p| p.admin_name).collect();
        assert_eq!(names, ["Angga", "Ilyasa"]);

        roster.update("a1", "", PresenceStatus::Offline);
        roster.update("a2", "", PresenceStatus::Offline);
        assert!(!roster.any_online());
    }

    #[test]
    fn blank_name_keeps_previous() {
        let roster = PresenceRoster::new();
        roster.update("a1", "Angga", PresenceStatus::Online);
        let p = roster.update("a1", " ", PresenceStatus::Away);
        assert_eq!(p.admin_name, "Angga");
    }

    #[test]
    fn parses_status_case_insensitively() {
        assert_eq!("Online".parse::<PresenceStatus>().unwrap(), PresenceStatus::Online);
        assert!("busy".parse::<PresenceStatus>().is_err());
    }
}
