use serde::{Deserialize, Serialize};

/// A single capability bit. Roles store the OR of their permissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(i64);

impl Permission {
    pub const FOLLOW: Permission = Permission(1);
    pub const COMMENT: Permission = Permission(2);
    pub const WRITE: Permission = Permission(4);
    pub const MODERATE: Permission = Permission(8);
    pub const ADMIN: Permission = Permission(16);

    pub const ALL: [Permission; 5] = [
        Self::FOLLOW,
        Self::COMMENT,
        Self::WRITE,
        Self::MODERATE,
        Self::ADMIN,
    ];

    pub const fn bits(self) -> i64 {
        self.0
    }

    pub fn name(self) -> &'static str {
        match self.0 {
            1 => "follow",
            2 => "comment",
            4 => "write",
            8 => "moderate",
            16 => "admin",
            _ => "unknown",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

pub fn has_permission(mask: i64, perm: Permission) -> bool {
    mask & perm.0 == perm.0
}

pub fn add_permission(mask: i64, perm: Permission) -> i64 {
    mask | perm.0
}

pub fn remove_permission(mask: i64, perm: Permission) -> i64 {
    mask & !perm.0
}

/// Mask with every permission cleared.
pub const fn reset_permissions() -> i64 {
    0
}

/// Names of the permissions set in `mask`, in bit order.
pub fn permission_names(mask: i64) -> Vec<&'static str> {
    Permission::ALL
        .iter()
        .filter(|p| has_permission(mask, **p))
        .map(|p| p.name())
        .collect()
}

// -- Seeded roles --

pub const DEFAULT_ROLE: &str = "User";
pub const ADMIN_ROLE: &str = "Administrator";

pub struct RoleSeed {
    pub name: &'static str,
    pub permissions: &'static [Permission],
}

impl RoleSeed {
    pub fn mask(&self) -> i64 {
        self.permissions
            .iter()
            .fold(reset_permissions(), |mask, perm| add_permission(mask, *perm))
    }

    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ROLE
    }
}

/// The fixed role table written by `deploy`.
pub const ROLE_SEEDS: &[RoleSeed] = &[
    RoleSeed {
        name: "User",
        permissions: &[Permission::FOLLOW, Permission::COMMENT, Permission::WRITE],
    },
    RoleSeed {
        name: "Moderator",
        permissions: &[
            Permission::FOLLOW,
            Permission::COMMENT,
            Permission::WRITE,
            Permission::MODERATE,
        ],
    },
    RoleSeed {
        name: "Administrator",
        permissions: &[
            Permission::FOLLOW,
            Permission::COMMENT,
            Permission::WRITE,
            Permission::MODERATE,
            Permission::ADMIN,
        ],
    },
];
