use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;

/// Owner-or-read-only access policy. Reads never call this; every write to
/// an owned entity (profile, comment) must. `owner_id` is whichever column
/// records the entity's owner.
pub fn check_ownership(actor: &CurrentUser, owner_id: &str) -> AppResult<()> {
    if actor.id == owner_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You do not have permission to modify this resource".into(),
        ))
    }
}
