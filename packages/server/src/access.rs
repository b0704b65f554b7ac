use std::fmt;
use std::str::FromStr;

use sea_orm::sea_query::Expr;
use sea_orm::*;
use serde::{Deserialize, Serialize};

use crate::entity::{file_asset, user};
use crate::error::AppError;

/// The seeded primary administrator. This account can never be disabled.
pub const BOOTSTRAP_ADMIN_ID: i32 = 1;

/// Account role. Stored as a string column on `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    SubAdmin,
    Merchant,
    Customer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::SubAdmin => "sub_admin",
            Self::Merchant => "merchant",
            Self::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "sub_admin" => Ok(Self::SubAdmin),
            "merchant" => Ok(Self::Merchant),
            "customer" => Ok(Self::Customer),
            _ => Err(format!(
                "Invalid role '{s}'. Must be one of: admin, sub_admin, merchant, customer"
            )),
        }
    }
}

/// Account status. Stored as a string column on `user`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            _ => Err(format!(
                "Invalid status '{s}'. Must be 'active' or 'disabled'"
            )),
        }
    }
}

/// Parse a role value coming from the database.
///
/// An unparseable value means the row was written outside the application,
/// so it surfaces as an internal error rather than a validation one.
pub fn role_from_db(value: &str) -> Result<Role, AppError> {
    value.parse().map_err(AppError::Internal)
}

/// An authenticated account, loaded fresh from the database per request.
#[derive(Debug, Clone)]
pub struct Principal {
    pub id: i32,
    pub username: String,
    pub role: Role,
}

impl Principal {
    /// Upload and own-file lifecycle operations.
    pub fn require_customer(&self) -> Result<(), AppError> {
        match self.role {
            Role::Customer => Ok(()),
            _ => Err(AppError::PermissionDenied),
        }
    }

    /// Triage and download operations on received files.
    pub fn require_merchant(&self) -> Result<(), AppError> {
        match self.role {
            Role::Merchant => Ok(()),
            _ => Err(AppError::PermissionDenied),
        }
    }

    /// Full-visibility file listing and the download ledger.
    pub fn require_admin(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin => Ok(()),
            _ => Err(AppError::PermissionDenied),
        }
    }

    /// User administration and the operation log.
    pub fn require_admin_tier(&self) -> Result<(), AppError> {
        match self.role {
            Role::Admin | Role::SubAdmin => Ok(()),
            _ => Err(AppError::PermissionDenied),
        }
    }

    /// Row filter limiting `file_asset` queries to what this principal may
    /// see. `None` means unrestricted. Sub-admins have no file visibility.
    pub fn asset_visibility(&self) -> Result<Option<Condition>, AppError> {
        match self.role {
            Role::Admin => Ok(None),
            Role::Merchant => Ok(Some(
                Condition::all().add(file_asset::Column::MerchantId.eq(self.id)),
            )),
            Role::Customer => Ok(Some(
                Condition::all().add(file_asset::Column::OwnerId.eq(self.id)),
            )),
            Role::SubAdmin => Err(AppError::PermissionDenied),
        }
    }

    /// Accounts visible to this principal in user listings.
    ///
    /// Admins see everyone. Sub-admins see merchants, customers and their
    /// own account. `None` means unrestricted.
    pub fn user_visibility(&self) -> Result<Option<Condition>, AppError> {
        match self.role {
            Role::Admin => Ok(None),
            Role::SubAdmin => Ok(Some(
                Condition::any()
                    .add(
                        user::Column::Role
                            .is_in([Role::Merchant.as_str(), Role::Customer.as_str()]),
                    )
                    .add(user::Column::Id.eq(self.id)),
            )),
            _ => Err(AppError::PermissionDenied),
        }
    }

    /// User listing query with visibility applied and the fixed ordering:
    /// the caller's own account first, then by role rank, then newest first.
    pub fn visible_users_query(&self) -> Result<Select<user::Entity>, AppError> {
        let mut select = user::Entity::find();
        if let Some(cond) = self.user_visibility()? {
            select = select.filter(cond);
        }

        let self_first = Expr::cust(format!("CASE WHEN id = {} THEN 0 ELSE 1 END", self.id));
        Ok(select
            .order_by(self_first, Order::Asc)
            .order_by(role_rank(), Order::Asc)
            .order_by(user::Column::CreatedAt, Order::Desc))
    }

    /// Roles this principal may create or administer.
    pub fn can_administer(&self, target_role: Role) -> bool {
        match self.role {
            Role::Admin => true,
            Role::SubAdmin => matches!(target_role, Role::Merchant | Role::Customer),
            _ => false,
        }
    }

    /// Check that this principal may change `target`'s account status.
    pub fn check_status_change(&self, target: &user::Model) -> Result<(), AppError> {
        self.require_admin_tier()?;
        if target.id == BOOTSTRAP_ADMIN_ID {
            return Err(AppError::Validation(
                "The primary administrator account cannot be modified".into(),
            ));
        }
        if !self.can_administer(role_from_db(&target.role)?) {
            return Err(AppError::PermissionDenied);
        }
        Ok(())
    }

    /// Check that this principal may reset `target`'s password.
    ///
    /// Sub-admins may always reset their own password through this path.
    pub fn check_password_reset(&self, target: &user::Model) -> Result<(), AppError> {
        self.require_admin_tier()?;
        if target.id == self.id {
            return Ok(());
        }
        if !self.can_administer(role_from_db(&target.role)?) {
            return Err(AppError::PermissionDenied);
        }
        Ok(())
    }
}

/// Sort rank for user listings: admins first, customers last.
fn role_rank() -> sea_orm::sea_query::SimpleExpr {
    Expr::cust(
        "CASE role WHEN 'admin' THEN 0 WHEN 'sub_admin' THEN 1 WHEN 'merchant' THEN 2 ELSE 3 END",
    )
}
