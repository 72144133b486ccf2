use redis::aio::MultiplexedConnection;

use crate::{
    cache::cache::{cached_or_fetch, ReferenceKey},
    database::{
        error::DomainError,
        schema::{Id, Ingredient, Tag},
        store::ReferenceStore,
    },
};

pub async fn search_ingredients<S>(store: &S, name: &str) -> Result<Vec<Ingredient>, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    store.search_ingredients(name.trim()).await
}

pub async fn get_ingredient<S>(store: &S, id: Id) -> Result<Ingredient, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    store
        .get_ingredient(id)
        .await?
        .ok_or_else(|| DomainError::unknown("ingredients", &format!("No ingredient with id {id}")))
}

pub async fn list_tags<S>(store: &S) -> Result<Vec<Tag>, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    store.list_tags().await
}

pub async fn get_tag<S>(store: &S, id: Id) -> Result<Tag, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    store
        .get_tag(id)
        .await?
        .ok_or_else(|| DomainError::unknown("tags", &format!("No tag with id {id}")))
}

// Cached variants, stale once the reference cache is invalidated

pub async fn list_tags_cached<S>(
    store: &S,
    cache: &mut MultiplexedConnection,
) -> Result<Vec<Tag>, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    cached_or_fetch(&ReferenceKey::Tags, cache, || list_tags(store)).await
}

pub async fn get_tag_cached<S>(
    store: &S,
    cache: &mut MultiplexedConnection,
    id: Id,
) -> Result<Tag, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    cached_or_fetch(&ReferenceKey::Tag(id), cache, || get_tag(store, id)).await
}

pub async fn search_ingredients_cached<S>(
    store: &S,
    cache: &mut MultiplexedConnection,
    name: &str,
) -> Result<Vec<Ingredient>, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    let key = ReferenceKey::ingredient_search(name);
    cached_or_fetch(&key, cache, || search_ingredients(store, name)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::memory::MemoryStore;

    #[tokio::test]
    async fn search_is_case_insensitive_and_sorted() {
        let store = MemoryStore::new();
        store.add_ingredient("Sugar", "g").await;
        store.add_ingredient("brown sugar", "g").await;
        store.add_ingredient("Salt", "g").await;

        let found = search_ingredients(&store, " SUG ").await.unwrap();

        let names: Vec<&str> = found.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["Sugar", "brown sugar"]);
        assert!(search_ingredients(&store, "pepper").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_reference_rows_are_unknown() {
        let store = MemoryStore::new();
        let tag = store.add_tag("Breakfast", "breakfast").await;
        let salt = store.add_ingredient("Salt", "g").await;

        assert_eq!(get_tag(&store, tag.id).await.unwrap(), tag);
        assert_eq!(get_ingredient(&store, salt.id).await.unwrap(), salt);
        assert_eq!(list_tags(&store).await.unwrap(), vec![tag]);

        assert_eq!(get_tag(&store, 999).await.unwrap_err().field(), Some("tags"));
        assert!(get_ingredient(&store, 999)
            .await
            .unwrap_err()
            .is_referential());
    }

    #[tokio::test]
    async fn existence_checks_follow_the_catalog() {
        let store = MemoryStore::new();
        let tag = store.add_tag("Lunch", "lunch").await;
        let milk = store.add_ingredient("Milk", "ml").await;

        assert!(store.tag_exists(tag.id).await.unwrap());
        assert!(!store.tag_exists(milk.id).await.unwrap());
        assert!(store.ingredient_exists(milk.id).await.unwrap());
        assert!(!store.ingredient_exists(tag.id).await.unwrap());
    }
}
