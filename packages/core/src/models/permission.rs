//! Permission records and list utilities
//!
//! A block's permission list holds at most one record per `(type, id)` key.
//! Both utilities here return a new list and leave the input untouched.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionType {
    Workspace,
    User,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionRole {
    Manager,
    Editor,
    Commentator,
    Viewer,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(rename = "type")]
    pub permission_type: PermissionType,

    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    pub role: PermissionRole,
}

impl Permission {
    pub fn workspace(role: PermissionRole) -> Self {
        Self {
            permission_type: PermissionType::Workspace,
            id: None,
            role,
        }
    }

    pub fn user(id: impl Into<String>, role: PermissionRole) -> Self {
        Self {
            permission_type: PermissionType::User,
            id: Some(id.into()),
            role,
        }
    }

    /// Uniqueness key within a permission list
    pub fn key(&self) -> (PermissionType, Option<&str>) {
        (self.permission_type, self.id.as_deref())
    }

    fn same_key(&self, other: &Permission) -> bool {
        self.key() == other.key()
    }
}

/// Replace any entry sharing `permission`'s key, appending the new record last
pub fn upsert_permission(permissions: &[Permission], permission: Permission) -> Vec<Permission> {
    let mut next: Vec<Permission> = permissions
        .iter()
        .filter(|existing| !existing.same_key(&permission))
        .cloned()
        .collect();
    next.push(permission);
    next
}

/// Drop every entry sharing `permission`'s key (the role is ignored)
pub fn remove_permission(permissions: &[Permission], permission: &Permission) -> Vec<Permission> {
    permissions
        .iter()
        .filter(|existing| !existing.same_key(permission))
        .cloned()
        .collect()
}

/// Permission list after the workspace access toggle of the story settings.
///
/// `Some(role)` shares the story with the workspace at `role`; `None` makes it
/// private. Either way the acting user stays a manager so they cannot lock
/// themselves out.
pub fn workspace_access_permissions(
    permissions: &[Permission],
    role: Option<PermissionRole>,
    user_id: &str,
) -> Vec<Permission> {
    let shared = match role {
        Some(role) => upsert_permission(permissions, Permission::workspace(role)),
        None => remove_permission(
            permissions,
            &Permission::workspace(PermissionRole::Manager),
        ),
    };
    upsert_permission(&shared, Permission::user(user_id, PermissionRole::Manager))
}

/// Workspace members may only comment
pub fn is_read_only(permissions: &[Permission]) -> bool {
    permissions.iter().any(|permission| {
        permission.permission_type == PermissionType::Workspace
            && permission.role == PermissionRole::Commentator
    })
}

/// Not shared with the workspace at all
pub fn is_private(permissions: &[Permission]) -> bool {
    !permissions
        .iter()
        .any(|permission| permission.permission_type == PermissionType::Workspace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn assert_unique_keys(permissions: &[Permission]) {
        let mut seen = HashSet::new();
        for permission in permissions {
            assert!(
                seen.insert(permission.key()),
                "duplicate key {:?} in {:?}",
                permission.key(),
                permissions
            );
        }
    }

    #[test]
    fn test_upsert_replaces_matching_key() {
        let list = vec![
            Permission::workspace(PermissionRole::Manager),
            Permission::user("u1", PermissionRole::Manager),
        ];

        let next = upsert_permission(&list, Permission::workspace(PermissionRole::Commentator));

        assert_eq!(
            next,
            vec![
                Permission::user("u1", PermissionRole::Manager),
                Permission::workspace(PermissionRole::Commentator),
            ]
        );
        // input untouched
        assert_eq!(list[0].role, PermissionRole::Manager);
    }

    #[test]
    fn test_upsert_distinguishes_user_ids() {
        let list = vec![Permission::user("u1", PermissionRole::Manager)];
        let next = upsert_permission(&list, Permission::user("u2", PermissionRole::Viewer));
        assert_eq!(next.len(), 2);
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let list = vec![
            Permission::user("u1", PermissionRole::Editor),
            Permission::workspace(PermissionRole::Manager),
        ];
        let permission = Permission::user("u1", PermissionRole::Manager);

        let once = upsert_permission(&list, permission.clone());
        let twice = upsert_permission(&once, permission);

        assert_eq!(once, twice);
    }

    #[test]
    fn test_remove_ignores_role() {
        let list = vec![
            Permission::workspace(PermissionRole::Commentator),
            Permission::user("u1", PermissionRole::Manager),
        ];

        let next = remove_permission(&list, &Permission::workspace(PermissionRole::Manager));

        assert_eq!(next, vec![Permission::user("u1", PermissionRole::Manager)]);
    }

    #[test]
    fn test_keys_stay_unique_across_mixed_sequences() {
        let candidates = [
            Permission::workspace(PermissionRole::Manager),
            Permission::workspace(PermissionRole::Commentator),
            Permission::user("u1", PermissionRole::Manager),
            Permission::user("u1", PermissionRole::Viewer),
            Permission::user("u2", PermissionRole::Editor),
        ];

        let mut list = Vec::new();
        // deterministic pseudo-random walk over upserts and removes
        let mut state: u32 = 17;
        for _ in 0..500 {
            state = state.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let candidate = &candidates[(state >> 16) as usize % candidates.len()];
            list = if (state >> 8) % 3 == 0 {
                remove_permission(&list, candidate)
            } else {
                upsert_permission(&list, candidate.clone())
            };
            assert_unique_keys(&list);
        }
    }

    #[test]
    fn test_workspace_access_share_and_private() {
        let list = vec![Permission::workspace(PermissionRole::Manager)];

        let read_only =
            workspace_access_permissions(&list, Some(PermissionRole::Commentator), "u1");
        assert!(is_read_only(&read_only));
        assert!(!is_private(&read_only));
        assert!(read_only.contains(&Permission::user("u1", PermissionRole::Manager)));

        let private = workspace_access_permissions(&read_only, None, "u1");
        assert!(is_private(&private));
        assert_eq!(private, vec![Permission::user("u1", PermissionRole::Manager)]);
    }

    #[test]
    fn test_permission_wire_shape() {
        let value = serde_json::to_value(Permission::workspace(PermissionRole::Manager)).unwrap();
        assert_eq!(value, serde_json::json!({"type": "workspace", "role": "manager"}));
    }
}
