use anyhow::Error;
use once_cell::sync::Lazy;
use rocket::serde::Serialize;
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    ViewEnrollments,
    ReviewApplications,
    ViewActivityLog,

    ManageCourses,
    ManageChecklist,
    DeleteCatalogRecords,

    RegisterUsers,
    EditUserCredentials,
    EditUserRoles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Role {
    Registrar,
    Admin,
}

static REGISTRAR_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.insert(Permission::ViewEnrollments);
    permissions.insert(Permission::ReviewApplications);
    permissions.insert(Permission::ViewActivityLog);

    permissions
});

static ADMIN_PERMISSIONS: Lazy<HashSet<Permission>> = Lazy::new(|| {
    let mut permissions = HashSet::new();

    permissions.extend(REGISTRAR_PERMISSIONS.iter().copied());

    permissions.insert(Permission::ManageCourses);
    permissions.insert(Permission::ManageChecklist);
    permissions.insert(Permission::DeleteCatalogRecords);
    permissions.insert(Permission::RegisterUsers);
    permissions.insert(Permission::EditUserCredentials);
    permissions.insert(Permission::EditUserRoles);

    permissions
});

impl Role {
    pub fn permissions(&self) -> &'static HashSet<Permission> {
        match self {
            Role::Registrar => &REGISTRAR_PERMISSIONS,
            Role::Admin => &ADMIN_PERMISSIONS,
        }
    }

    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions().contains(&permission)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Role::Registrar => "registrar",
            Role::Admin => "admin",
        }
    }

    pub fn from_str(s: &str) -> Result<Self, Error> {
        match s {
            "registrar" => Ok(Role::Registrar),
            "admin" => Ok(Role::Admin),
            _ => Err(Error::msg(format!("Unknown role: {}", s))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Registrar => write!(f, "registrar"),
            Role::Admin => write!(f, "admin"),
        }
    }
}
