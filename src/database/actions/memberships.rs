use crate::database::{
    error::DomainError,
    schema::{Id, MembershipAction, MembershipKind, MembershipRecord, RecipeShort},
    store::RecipeStore,
};

pub async fn toggle_membership<S>(
    store: &S,
    kind: MembershipKind,
    action: MembershipAction,
    user_id: Id,
    recipe_id: Id,
) -> Result<MembershipRecord, DomainError>
where
    S: RecipeStore + ?Sized,
{
    match action {
        MembershipAction::Add => add_membership(store, kind, user_id, recipe_id).await,
        MembershipAction::Remove => remove_membership(store, kind, user_id, recipe_id).await,
    }
}

/// Adding an existing membership is a conflict, never a no-op.
pub async fn add_membership<S>(
    store: &S,
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
) -> Result<MembershipRecord, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or(DomainError::RecipeNotFound)?;

    if store.membership_exists(kind, user_id, recipe_id).await? {
        return Err(DomainError::MembershipConflict(kind));
    }
    // The unique constraint catches a concurrent add between check and insert
    if !store.create_membership(kind, user_id, recipe_id).await? {
        return Err(DomainError::MembershipConflict(kind));
    }
    log::debug!("User {user_id} added recipe {recipe_id} to {}", kind.label());

    Ok(MembershipRecord {
        kind,
        user_id,
        recipe: RecipeShort::from(&recipe),
    })
}

pub async fn remove_membership<S>(
    store: &S,
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
) -> Result<MembershipRecord, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipe = store
        .get_recipe(recipe_id)
        .await?
        .ok_or(DomainError::RecipeNotFound)?;

    if !store.delete_membership(kind, user_id, recipe_id).await? {
        return Err(DomainError::MembershipNotFound(kind));
    }
    log::debug!("User {user_id} removed recipe {recipe_id} from {}", kind.label());

    Ok(MembershipRecord {
        kind,
        user_id,
        recipe: RecipeShort::from(&recipe),
    })
}
