use crate::{
    authentication::cryptography::hash_password,
    database::{
        error::DomainError,
        schema::{Id, User, UserProfile, UserRegistration},
        store::RecipeStore,
    },
};

const MAX_NAME_LENGTH: usize = 150;
const MAX_EMAIL_LENGTH: usize = 254;

fn check_field(field: &'static str, value: &str, max_length: usize) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::required(field));
    }
    if value.chars().count() > max_length {
        return Err(DomainError::invalid_field(
            field,
            &format!("Ensure this field has no more than {max_length} characters"),
        ));
    }
    Ok(())
}

/// Registers a user, storing an argon2 hash of the password.
pub async fn register_user<S>(store: &S, registration: UserRegistration) -> Result<User, DomainError>
where
    S: RecipeStore + ?Sized,
{
    check_field("email", &registration.email, MAX_EMAIL_LENGTH)?;
    if !registration.email.contains('@') {
        return Err(DomainError::invalid_field("email", "Enter a valid email address"));
    }
    check_field("username", &registration.username, MAX_NAME_LENGTH)?;
    if !registration
        .username
        .chars()
        .all(|c| c.is_alphanumeric() || "@.+-_".contains(c))
    {
        return Err(DomainError::invalid_field(
            "username",
            "Username may contain only letters, digits and @/./+/-/_",
        ));
    }
    check_field("first_name", &registration.first_name, MAX_NAME_LENGTH)?;
    check_field("last_name", &registration.last_name, MAX_NAME_LENGTH)?;
    check_field("password", &registration.password, MAX_NAME_LENGTH)?;

    let registration = UserRegistration {
        email: registration.email.to_lowercase(),
        password: hash_password(&registration.password)?,
        ..registration
    };

    let user = store
        .create_user(&registration)
        .await?
        .ok_or(DomainError::UserConflict)?;
    log::debug!("Registered user {} ({})", user.username, user.id);

    Ok(user)
}

/// The user as seen by `viewer`; anonymous viewers are never subscribed.
pub async fn get_user_profile<S>(
    store: &S,
    id: Id,
    viewer: Option<Id>,
) -> Result<UserProfile, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let user = store.get_user(id).await?.ok_or(DomainError::UserNotFound)?;

    let is_subscribed = match viewer {
        Some(viewer) => store.subscription_exists(viewer, id).await?,
        None => false,
    };

    Ok(UserProfile {
        user,
        is_subscribed,
    })
}
