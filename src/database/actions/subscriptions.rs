use crate::database::{
    error::DomainError,
    schema::{Id, SubscriptionView, User},
    store::RecipeStore,
};

async fn subscription_view<S>(
    store: &S,
    author: User,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionView, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipes = store.author_recipes(author.id, recipes_limit).await?;
    let recipes_count = store.count_author_recipes(author.id).await?;

    Ok(SubscriptionView {
        author,
        is_subscribed: true,
        recipes,
        recipes_count,
    })
}

pub async fn subscribe<S>(
    store: &S,
    user_id: Id,
    author_id: Id,
    recipes_limit: Option<usize>,
) -> Result<SubscriptionView, DomainError>
where
    S: RecipeStore + ?Sized,
{
    if user_id == author_id {
        return Err(DomainError::SelfFollowRejected);
    }

    let author = store
        .get_user(author_id)
        .await?
        .ok_or(DomainError::UserNotFound)?;

    if store.subscription_exists(user_id, author_id).await? {
        return Err(DomainError::SubscriptionConflict);
    }
    if !store.create_subscription(user_id, author_id).await? {
        return Err(DomainError::SubscriptionConflict);
    }
    log::debug!("User {user_id} subscribed to {author_id}");

    subscription_view(store, author, recipes_limit).await
}

pub async fn unsubscribe<S>(store: &S, user_id: Id, author_id: Id) -> Result<(), DomainError>
where
    S: RecipeStore + ?Sized,
{
    store
        .get_user(author_id)
        .await?
        .ok_or(DomainError::UserNotFound)?;

    if !store.delete_subscription(user_id, author_id).await? {
        return Err(DomainError::SubscriptionNotFound);
    }
    log::debug!("User {user_id} unsubscribed from {author_id}");

    Ok(())
}

/// Followed authors ordered by username, each with at most `recipes_limit`
/// of their newest recipes.
pub async fn list_subscriptions<S>(
    store: &S,
    user_id: Id,
    recipes_limit: Option<usize>,
) -> Result<Vec<SubscriptionView>, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let authors = store.subscribed_authors(user_id).await?;

    let mut views = Vec::with_capacity(authors.len());
    for author in authors {
        views.push(subscription_view(store, author, recipes_limit).await?);
    }

    Ok(views)
}
