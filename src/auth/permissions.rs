use once_cell::sync::Lazy;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewLineup,

    ManageSongs,
    ManageLeaders,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Role {
    Member,
    Admin,
}

static MEMBER_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewLineup);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(MEMBER_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageSongs);
    permissions.insert(Permission::ManageLeaders);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Member => &MEMBER_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Member => "member",
            Role::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
