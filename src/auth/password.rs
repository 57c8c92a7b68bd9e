use crate::error::{AppError, AppResult};

const MIN_PASSWORD_LEN: usize = 8;

pub fn hash_password(password: &str) -> AppResult<String> {
    bcrypt::hash(password, bcrypt::DEFAULT_COST)
        .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
}

pub fn verify_password(password: &str, hash: &str) -> bool {
    bcrypt::verify(password, hash).unwrap_or(false)
}

/// Basic shape check; full address validation belongs to the mail system.
pub fn validate_email(email: &str) -> AppResult<()> {
    let email = email.trim();
    if email.is_empty() {
        return Err(AppError::Validation("Email is required".into()));
    }
    let (local, domain) = email
        .split_once('@')
        .ok_or_else(|| AppError::Validation("Invalid email address".into()))?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') {
        return Err(AppError::Validation("Invalid email address".into()));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> AppResult<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}
