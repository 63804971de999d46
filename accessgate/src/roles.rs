//! Owner and admin roles.
//!
//! [`AccessControl`] holds two single-holder roles. Each reassignment is one
//! `&mut self` call that replaces the holder in place, so there is never a
//! moment where two admins (or none) are authorized.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// The two ledger roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages admin assignment, proceeds, and ledger parameters.
    Owner,
    /// Issues credentials on the admin-mediated path.
    Admin,
}

/// A completed role reassignment, recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChange {
    /// The reassigned role.
    pub role: Role,
    /// Holder before the call.
    pub previous: Address,
    /// Holder after the call.
    pub new: Address,
}

/// Owner and admin role holders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessControl {
    owner: Address,
    admin: Address,
}

impl AccessControl {
    /// Creates role state with explicit holders.
    #[must_use]
    pub const fn new(owner: Address, admin: Address) -> Self {
        Self { owner, admin }
    }

    /// Role state where the owner also starts as admin.
    #[must_use]
    pub const fn owned_by(owner: Address) -> Self {
        Self::new(owner, owner)
    }

    /// Current owner.
    #[must_use]
    pub const fn owner(&self) -> Address {
        self.owner
    }

    /// Current admin.
    #[must_use]
    pub const fn admin(&self) -> Address {
        self.admin
    }

    /// Fails with [`LedgerError::NotOwner`] unless `caller` is the owner.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`].
    pub fn ensure_owner(&self, caller: Address) -> Result<(), LedgerError> {
        if caller == self.owner {
            Ok(())
        } else {
            Err(LedgerError::NotOwner(caller))
        }
    }

    /// Fails with [`LedgerError::NotAdmin`] unless `caller` is the admin.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotAdmin`].
    pub fn ensure_admin(&self, caller: Address) -> Result<(), LedgerError> {
        if caller == self.admin {
            Ok(())
        } else {
            Err(LedgerError::NotAdmin(caller))
        }
    }

    /// Replaces the admin. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] for any other caller and
    /// [`LedgerError::InvalidRecipient`] for the zero address.
    pub fn set_admin(
        &mut self,
        caller: Address,
        new_admin: Address,
    ) -> Result<RoleChange, LedgerError> {
        self.ensure_owner(caller)?;
        if new_admin.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        let previous = std::mem::replace(&mut self.admin, new_admin);
        Ok(RoleChange {
            role: Role::Admin,
            previous,
            new: new_admin,
        })
    }

    /// Hands ownership to `new_owner`. Owner only.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::NotOwner`] for any other caller and
    /// [`LedgerError::InvalidRecipient`] for the zero address.
    pub fn transfer_ownership(
        &mut self,
        caller: Address,
        new_owner: Address,
    ) -> Result<RoleChange, LedgerError> {
        self.ensure_owner(caller)?;
        if new_owner.is_zero() {
            return Err(LedgerError::InvalidRecipient);
        }
        let previous = std::mem::replace(&mut self.owner, new_owner);
        Ok(RoleChange {
            role: Role::Owner,
            previous,
            new: new_owner,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: Address = Address::repeat_byte(0x01);
    const ADMIN: Address = Address::repeat_byte(0x02);
    const OTHER: Address = Address::repeat_byte(0x03);

    #[test]
    fn set_admin_swaps_holder() {
        let mut roles = AccessControl::new(OWNER, ADMIN);
        let change = roles.set_admin(OWNER, OTHER).unwrap();
        assert_eq!(change.previous, ADMIN);
        assert_eq!(change.new, OTHER);
        assert_eq!(roles.ensure_admin(ADMIN), Err(LedgerError::NotAdmin(ADMIN)));
        assert!(roles.ensure_admin(OTHER).is_ok());
    }

    #[test]
    fn only_owner_reassigns() {
        let mut roles = AccessControl::new(OWNER, ADMIN);
        assert_eq!(roles.set_admin(ADMIN, OTHER), Err(LedgerError::NotOwner(ADMIN)));
        assert_eq!(
            roles.transfer_ownership(OTHER, OTHER),
            Err(LedgerError::NotOwner(OTHER))
        );
        assert_eq!(roles.admin(), ADMIN);
    }

    #[test]
    fn roles_are_independent() {
        let mut roles = AccessControl::owned_by(OWNER);
        roles.transfer_ownership(OWNER, OTHER).unwrap();
        assert_eq!(roles.owner(), OTHER);
        assert_eq!(roles.admin(), OWNER);
        assert_eq!(
            roles.set_admin(OTHER, Address::ZERO),
            Err(LedgerError::InvalidRecipient)
        );
    }
}
