//! Centralized moderation permission rules.
//!
//! Every role-hierarchy decision (who may promote, demote, ban, unban or
//! delete whom) goes through [`permits`], so the rules live in one place
//! instead of being re-derived in each handler.

use crate::models::Role;

/// Moderation actions subject to role-hierarchy rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModAction {
    Promote,
    Demote,
    Ban,
    Unban,
    Delete,
}

/// Whether `actor` may apply `action` to an account with role `target`.
///
/// Promote, demote and delete are super admin operations and never touch
/// another super admin. Super admins can ban anyone below them while
/// admins can only ban regular users. Unban carries no hierarchy check at
/// all: any staff member can lift a ban.
pub fn permits(actor: Role, target: Role, action: ModAction) -> bool {
    match action {
        ModAction::Promote | ModAction::Demote | ModAction::Delete => {
            actor == Role::SuperAdmin && target != Role::SuperAdmin
        }
        ModAction::Ban => match actor {
            Role::SuperAdmin => target != Role::SuperAdmin,
            Role::Admin => target == Role::User,
            Role::User => false,
        },
        ModAction::Unban => actor.is_staff(),
    }
}
