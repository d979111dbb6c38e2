// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Scope Model
//!
//! Route → scope-group table, per-app grants and per-app users.
//!
//! Routes are matched by longest prefix. `BASIC` is implicitly granted to
//! every app; holding `ALL` bypasses the per-route check entirely.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::exapp::AppId;

/// Prefix of the gateway's own ExApp-facing API.
pub const API_V1_PREFIX: &str = "/apps/app_api/api/v1";

const OCS_PREFIXES: [&str; 2] = ["/ocs/v1.php", "/ocs/v2.php"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeGroup(pub u32);

impl ScopeGroup {
    pub const BASIC: ScopeGroup = ScopeGroup(1);
    pub const SYSTEM: ScopeGroup = ScopeGroup(2);
    pub const DAV: ScopeGroup = ScopeGroup(3);
    pub const USER_INFO: ScopeGroup = ScopeGroup(10);
    pub const USER_STATUS: ScopeGroup = ScopeGroup(11);
    pub const NOTIFICATIONS: ScopeGroup = ScopeGroup(12);
    pub const WEATHER_STATUS: ScopeGroup = ScopeGroup(13);
    pub const FILE_SHARING: ScopeGroup = ScopeGroup(14);
    pub const ALL: ScopeGroup = ScopeGroup(9999);

    pub fn is_basic(self) -> bool {
        self == Self::BASIC
    }

    pub fn is_all(self) -> bool {
        self == Self::ALL
    }

    /// Well-known groups by their upper-case name.
    pub fn from_name(name: &str) -> Option<ScopeGroup> {
        match name {
            "BASIC" => Some(Self::BASIC),
            "SYSTEM" => Some(Self::SYSTEM),
            "DAV" => Some(Self::DAV),
            "USER_INFO" => Some(Self::USER_INFO),
            "USER_STATUS" => Some(Self::USER_STATUS),
            "NOTIFICATIONS" => Some(Self::NOTIFICATIONS),
            "WEATHER_STATUS" => Some(Self::WEATHER_STATUS),
            "FILE_SHARING" => Some(Self::FILE_SHARING),
            "ALL" => Some(Self::ALL),
            _ => None,
        }
    }
}

impl fmt::Display for ScopeGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One row of the route table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiScope {
    pub api_route: String,
    pub scope_group: ScopeGroup,
    pub name: String,
    /// Requests on this route must carry a user known to the app.
    pub user_check: bool,
}

impl ApiScope {
    pub fn new(api_route: impl Into<String>, scope_group: ScopeGroup, name: &str, user_check: bool) -> Self {
        Self {
            api_route: api_route.into(),
            scope_group,
            name: name.to_string(),
            user_check,
        }
    }
}

/// Route table seeded at startup.
pub fn default_api_scopes() -> Vec<ApiScope> {
    let v1 = |suffix: &str| format!("{}{}", API_V1_PREFIX, suffix);
    vec![
        ApiScope::new(v1("/files/actions/menu"), ScopeGroup::BASIC, "BASIC", false),
        ApiScope::new(v1("/log"), ScopeGroup::BASIC, "BASIC", false),
        ApiScope::new(v1("/ex-app/config"), ScopeGroup::BASIC, "BASIC", false),
        ApiScope::new(v1("/ex-app/preference"), ScopeGroup::BASIC, "BASIC", true),
        ApiScope::new("/apps/app_api/ex-app/status", ScopeGroup::BASIC, "BASIC", false),
        ApiScope::new(v1("/users"), ScopeGroup::SYSTEM, "SYSTEM", true),
        ApiScope::new(v1("/ex-app/all"), ScopeGroup::SYSTEM, "SYSTEM", true),
        ApiScope::new("/cloud/capabilities", ScopeGroup::BASIC, "BASIC", false),
        ApiScope::new("/cloud/apps", ScopeGroup::SYSTEM, "SYSTEM", true),
        ApiScope::new("/apps/provisioning_api/api/", ScopeGroup::SYSTEM, "SYSTEM", true),
        ApiScope::new("/cloud/users", ScopeGroup::USER_INFO, "USER_INFO", true),
        ApiScope::new("/cloud/groups", ScopeGroup::USER_INFO, "USER_INFO", true),
        ApiScope::new("/apps/user_status/api/", ScopeGroup::USER_STATUS, "USER_STATUS", true),
        ApiScope::new("/apps/notifications/api/", ScopeGroup::NOTIFICATIONS, "NOTIFICATIONS", true),
        ApiScope::new("/apps/weather_status/api/", ScopeGroup::WEATHER_STATUS, "WEATHER_STATUS", true),
        ApiScope::new("/apps/files_sharing/api/", ScopeGroup::FILE_SHARING, "FILE_SHARING", true),
        ApiScope::new("/dav/", ScopeGroup::DAV, "DAV", true),
    ]
}

/// Strip the OCS entry-point prefix so `/ocs/v2.php/cloud/apps` matches `/cloud/apps`.
pub fn sanitize_route(path: &str) -> &str {
    OCS_PREFIXES
        .iter()
        .find_map(|prefix| path.strip_prefix(prefix))
        .unwrap_or(path)
}

/// In-memory view of the route table.
#[derive(Debug, Clone, Default)]
pub struct ScopeTable {
    entries: Vec<ApiScope>,
}

impl ScopeTable {
    pub fn new(mut entries: Vec<ApiScope>) -> Self {
        // longest prefix first so the first hit wins
        entries.sort_by(|a, b| b.api_route.len().cmp(&a.api_route.len()));
        Self { entries }
    }

    pub fn resolve(&self, path: &str) -> Option<&ApiScope> {
        let route = sanitize_route(path);
        self.entries.iter().find(|s| route.starts_with(&s.api_route))
    }

    pub fn entries(&self) -> &[ApiScope] {
        &self.entries
    }

    /// Display names for a set of groups, unknown groups omitted.
    pub fn names_for(&self, groups: &[ScopeGroup]) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .filter(|s| groups.contains(&s.scope_group))
            .map(|s| s.name.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }
}

/// Grant of a scope group to an app.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExAppScope {
    pub app_id: AppId,
    pub scope_group: ScopeGroup,
}

/// A user the app may act for. An empty `user_id` is the system context.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExAppUser {
    pub app_id: AppId,
    pub user_id: String,
}

impl ExAppUser {
    pub fn system(app_id: AppId) -> Self {
        Self { app_id, user_id: String::new() }
    }

    pub fn is_system(&self) -> bool {
        self.user_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn well_known_names_resolve() {
        assert_eq!(ScopeGroup::from_name("SYSTEM"), Some(ScopeGroup::SYSTEM));
        assert_eq!(ScopeGroup::from_name("ALL"), Some(ScopeGroup::ALL));
        assert_eq!(ScopeGroup::from_name("system"), None);
    }

    #[test]
    fn longest_prefix_wins() {
        let table = ScopeTable::new(vec![
            ApiScope::new("/apps/", ScopeGroup::SYSTEM, "SYSTEM", true),
            ApiScope::new("/apps/notifications/api/", ScopeGroup::NOTIFICATIONS, "NOTIFICATIONS", true),
        ]);
        let hit = table.resolve("/apps/notifications/api/v2/push").unwrap();
        assert_eq!(hit.scope_group, ScopeGroup::NOTIFICATIONS);
        assert_eq!(table.resolve("/apps/other").unwrap().scope_group, ScopeGroup::SYSTEM);
        assert!(table.resolve("/elsewhere").is_none());
    }

    #[test]
    fn ocs_prefix_is_stripped() {
        assert_eq!(sanitize_route("/ocs/v2.php/cloud/apps"), "/cloud/apps");
        assert_eq!(sanitize_route("/ocs/v1.php/cloud/users/bob"), "/cloud/users/bob");
        assert_eq!(sanitize_route("/cloud/apps"), "/cloud/apps");

        let table = ScopeTable::new(default_api_scopes());
        assert_eq!(table.resolve("/ocs/v2.php/cloud/apps").unwrap().scope_group, ScopeGroup::SYSTEM);
    }

    #[test]
    fn default_table_maps_known_routes() {
        let table = ScopeTable::new(default_api_scopes());
        assert_eq!(table.resolve("/apps/app_api/api/v1/log").unwrap().scope_group, ScopeGroup::BASIC);
        assert_eq!(table.resolve("/dav/files/alice/x.txt").unwrap().scope_group, ScopeGroup::DAV);
        assert_eq!(table.resolve("/cloud/capabilities").unwrap().scope_group, ScopeGroup::BASIC);
        assert_eq!(
            table.names_for(&[ScopeGroup::SYSTEM, ScopeGroup::DAV]),
            vec!["DAV".to_string(), "SYSTEM".to_string()]
        );
    }

    #[test]
    fn system_user_is_empty_id() {
        let user = ExAppUser::system(AppId::new("a"));
        assert!(user.is_system());
    }
}
