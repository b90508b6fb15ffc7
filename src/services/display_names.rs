//! Cosmetic user names with a fallback label.

use tracing::warn;

use crate::gateway::IdentityDirectory;

/// Label used when the directory cannot name a user
pub fn fallback_name(user_id: i64) -> String {
    format!("User{user_id}")
}

/// Display name of a user; lookup failures degrade to `User{id}`
pub async fn display_name_or_fallback(directory: &dyn IdentityDirectory, user_id: i64) -> String {
    match directory.display_name(user_id).await {
        Ok(name) if !name.trim().is_empty() => name,
        Ok(_) => fallback_name(user_id),
        Err(err) => {
            warn!(user_id, error = %err, "Display name lookup failed, using fallback label");
            fallback_name(user_id)
        }
    }
}

/// Same as [`display_name_or_fallback`] for an optional user
pub async fn optional_display_name(
    directory: &dyn IdentityDirectory,
    user_id: Option<i64>,
    none_label: &str,
) -> String {
    match user_id {
        Some(id) => display_name_or_fallback(directory, id).await,
        None => none_label.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::InMemoryDirectory;

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let directory = InMemoryDirectory::new();
        directory.add_user(1, "Ana");
        directory.add_user(2, "Ben");
        directory.make_name_unavailable(2);

        assert_eq!(display_name_or_fallback(&directory, 1).await, "Ana");
        assert_eq!(display_name_or_fallback(&directory, 2).await, "User2");
        assert_eq!(display_name_or_fallback(&directory, 3).await, "User3");
        assert_eq!(optional_display_name(&directory, None, "None").await, "None");
    }
}
