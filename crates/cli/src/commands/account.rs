//! Sign-in, sign-up and profile commands.

use secrecy::SecretString;
use storefront_client::{ClientError, Storefront};
use storefront_core::{Email, ProfileUpdate, UserRole};

use crate::output;

pub async fn login(
    storefront: &Storefront,
    email: &Email,
    password: String,
) -> Result<(), ClientError> {
    let user = storefront
        .session()
        .login(email, &SecretString::from(password))
        .await?;
    output::message(&format!("Logged in as {} ({})", user.username, user.role));
    Ok(())
}

pub async fn signup(
    storefront: &Storefront,
    email: &Email,
    username: &str,
    password: String,
    role: UserRole,
) -> Result<(), ClientError> {
    let user = storefront
        .session()
        .signup(email, username, &SecretString::from(password), role)
        .await?;
    output::message(&format!("Welcome, {}! You are signed in.", user.username));
    Ok(())
}

pub async fn logout(storefront: &Storefront) {
    storefront.logout().await;
    output::message("Logged out.");
}

pub fn whoami(storefront: &Storefront) -> Result<(), ClientError> {
    let user = storefront
        .session()
        .current_user()
        .ok_or(ClientError::NotAuthenticated)?;
    output::user(&user);
    Ok(())
}

pub async fn update_profile(
    storefront: &Storefront,
    username: Option<String>,
    email: Option<Email>,
) -> Result<(), ClientError> {
    let update = ProfileUpdate { username, email };
    if update.is_empty() {
        return Err(ClientError::InvalidInput(
            "pass --username and/or --email".to_string(),
        ));
    }
    let user = storefront.session().update_profile(&update).await?;
    output::message("Profile updated.");
    output::user(&user);
    Ok(())
}

pub async fn change_password(
    storefront: &Storefront,
    current: String,
    new_password: String,
    confirm: Option<String>,
) -> Result<(), ClientError> {
    let confirmation = SecretString::from(confirm.unwrap_or_else(|| new_password.clone()));
    storefront
        .session()
        .change_password(
            &SecretString::from(current),
            &SecretString::from(new_password),
            &confirmation,
        )
        .await?;
    output::message("Password updated.");
    Ok(())
}
