use crate::models::pet::Pet;

/// The authenticated caller, passed explicitly to every lifecycle operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub roles: Vec<String>,
}

impl Identity {
    pub fn new(
        user_id: impl Into<String>,
        roles: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            roles: roles.into_iter().map(Into::into).collect(),
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// Capability decision over a pet and a caller. Must not mutate state.
pub trait AuthorizationOracle: Send + Sync {
    fn is_owner_or_admin(&self, pet: &Pet, identity: &Identity) -> bool;
}

/// Owners may act on their own pets; holders of the admin role on any pet.
#[derive(Debug, Clone)]
pub struct RoleAuthorization {
    admin_role: String,
}

impl RoleAuthorization {
    pub fn new(admin_role: impl Into<String>) -> Self {
        Self {
            admin_role: admin_role.into(),
        }
    }
}

impl AuthorizationOracle for RoleAuthorization {
    fn is_owner_or_admin(&self, pet: &Pet, identity: &Identity) -> bool {
        identity.has_role(&self.admin_role) || pet.owner_id == identity.user_id
    }
}
