use crate::{
    error::AppError,
    models::{CreateUserInput, UserDto, Validate},
    password::PasswordEncoder,
    repository::UserStore,
};

/// provision_user
///
/// The only way a user comes into existence: validate, hash, insert. Shared by the
/// `createUser` mutation and startup seeding so both store the same hash format.
pub async fn provision_user(
    store: &dyn UserStore,
    passwords: &PasswordEncoder,
    input: CreateUserInput,
) -> Result<UserDto, AppError> {
    input.validate()?;

    let username = input.username.trim().to_string();
    let hash = passwords
        .hash_blocking(input.password)
        .await
        .map_err(|e| AppError::Internal(e.to_string()))?;

    let record = store.insert_user(&username, &hash, input.role).await?;
    tracing::info!(user = %record.username, role = %record.role, "user provisioned");
    Ok(record.into())
}

pub async fn find_user(store: &dyn UserStore, id: i64) -> Result<UserDto, AppError> {
    store
        .find_user_by_id(id)
        .await?
        .map(UserDto::from)
        .ok_or_else(|| AppError::not_found("User", id))
}
