use serde_json::Value;

use crate::database::{
    actions::users::get_user_profile,
    error::DomainError,
    form::Form,
    schema::{
        Id, MembershipKind, PreparedRecipe, Recipe, RecipeDetail, RecipeFields, RecipeFilter,
    },
    store::RecipeStore,
    validation::validate_and_prepare,
};

/// Validates a raw recipe payload and creates a recipe authored by
/// `author_id`, or updates `existing`. Any author in the payload is ignored.
pub async fn submit_recipe<S>(
    store: &S,
    payload: Value,
    author_id: Id,
    existing: Option<Id>,
) -> Result<Recipe, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let existing = match existing {
        Some(id) => Some(store.get_recipe(id).await?.ok_or(DomainError::RecipeNotFound)?),
        None => None,
    };

    let form = Form::from_value(payload)?;
    let fields = form.recipe_fields(existing.is_none())?;
    let prepared =
        validate_and_prepare(form.get("ingredients"), form.get("tags"), store).await?;

    match existing {
        Some(recipe) => update_recipe(store, &recipe, &fields, &prepared).await,
        None => create_recipe(store, author_id, &fields, &prepared).await,
    }
}

pub async fn create_recipe<S>(
    store: &S,
    author_id: Id,
    fields: &RecipeFields,
    prepared: &PreparedRecipe,
) -> Result<Recipe, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipe = store.create_recipe(author_id, fields, prepared).await?;
    log::debug!(
        "Created recipe {} by {author_id} with {} ingredients",
        recipe.id,
        prepared.ingredients.len()
    );

    Ok(recipe)
}

pub async fn update_recipe<S>(
    store: &S,
    recipe: &Recipe,
    fields: &RecipeFields,
    prepared: &PreparedRecipe,
) -> Result<Recipe, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipe = store.update_recipe(recipe.id, fields, prepared).await?;
    log::debug!("Updated recipe {}", recipe.id);

    Ok(recipe)
}

pub async fn delete_recipe<S>(store: &S, id: Id) -> Result<(), DomainError>
where
    S: RecipeStore + ?Sized,
{
    if !store.delete_recipe(id).await? {
        return Err(DomainError::RecipeNotFound);
    }
    log::debug!("Deleted recipe {id}");

    Ok(())
}

pub async fn get_recipe_detail<S>(
    store: &S,
    id: Id,
    viewer: Option<Id>,
) -> Result<RecipeDetail, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipe = store
        .get_recipe(id)
        .await?
        .ok_or(DomainError::RecipeNotFound)?;

    describe_recipe(store, recipe, viewer).await
}

/// Recipes matching `filter`, newest first, with the flags computed for `viewer`.
pub async fn list_recipes<S>(
    store: &S,
    filter: &RecipeFilter,
    viewer: Option<Id>,
) -> Result<Vec<RecipeDetail>, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let recipes = store.list_recipes(filter).await?;

    let mut details = Vec::with_capacity(recipes.len());
    for recipe in recipes {
        details.push(describe_recipe(store, recipe, viewer).await?);
    }

    Ok(details)
}

async fn describe_recipe<S>(
    store: &S,
    recipe: Recipe,
    viewer: Option<Id>,
) -> Result<RecipeDetail, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let author = get_user_profile(store, recipe.author_id, viewer).await?;
    let tags = store.recipe_tags(recipe.id).await?;
    let ingredients = store.recipe_ingredients(recipe.id).await?;

    let (is_favorited, is_in_shopping_cart) = match viewer {
        Some(user) => (
            store
                .membership_exists(MembershipKind::Favorite, user, recipe.id)
                .await?,
            store
                .membership_exists(MembershipKind::ShoppingCart, user, recipe.id)
                .await?,
        ),
        None => (false, false),
    };

    Ok(RecipeDetail {
        recipe,
        author,
        tags,
        ingredients,
        is_favorited,
        is_in_shopping_cart,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::database::{
        actions::memberships::toggle_membership,
        memory::MemoryStore,
        schema::{Ingredient, MembershipAction, Tag, User},
    };

    struct Fixture {
        store: MemoryStore,
        author: User,
        reader: User,
        salt: Ingredient,
        milk: Ingredient,
        eggs: Ingredient,
        breakfast: Tag,
        dinner: Tag,
        lunch: Tag,
    }

    async fn fixture() -> Fixture {
        let store = MemoryStore::new();

        Fixture {
            author: store.add_user("author").await,
            reader: store.add_user("reader").await,
            salt: store.add_ingredient("Salt", "g").await,
            milk: store.add_ingredient("Milk", "ml").await,
            eggs: store.add_ingredient("Eggs", "pcs").await,
            breakfast: store.add_tag("Breakfast", "breakfast").await,
            dinner: store.add_tag("Dinner", "dinner").await,
            lunch: store.add_tag("Lunch", "lunch").await,
            store,
        }
    }

    fn omelette(f: &Fixture) -> Value {
        json!({
            "name": "Omelette",
            "text": "Whisk and fry",
            "cooking_time": 10,
            "image": "recipes/images/omelette.png",
            "author": f.reader.id,
            "ingredients": [
                { "id": f.eggs.id, "amount": 3 },
                { "id": f.milk.id, "amount": "50" },
            ],
            "tags": [f.breakfast.id],
        })
    }

    #[tokio::test]
    async fn create_uses_acting_author_and_writes_everything() {
        let f = fixture().await;

        let recipe = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();
        assert_eq!(recipe.author_id, f.author.id);

        let detail = get_recipe_detail(&f.store, recipe.id, None).await.unwrap();
        assert_eq!(detail.tags, vec![f.breakfast.clone()]);
        let amounts: Vec<(Id, i32)> = detail
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect();
        assert_eq!(amounts, vec![(f.eggs.id, 3), (f.milk.id, 50)]);
        assert_eq!(detail.author.user.id, f.author.id);
    }

    #[tokio::test]
    async fn invalid_payload_writes_nothing() {
        let f = fixture().await;
        let mut payload = omelette(&f);
        payload["ingredients"] = json!([{ "id": f.eggs.id, "amount": 0 }]);

        let error = submit_recipe(&f.store, payload, f.author.id, None)
            .await
            .unwrap_err();

        assert!(matches!(error, DomainError::InvalidAmount { .. }));
        assert!(f
            .store
            .list_recipes(&RecipeFilter::default())
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn image_is_required_on_create() {
        let f = fixture().await;
        let mut payload = omelette(&f);
        payload.as_object_mut().unwrap().remove("image");

        let error = submit_recipe(&f.store, payload, f.author.id, None)
            .await
            .unwrap_err();

        assert_eq!(error, DomainError::required("image"));
    }

    #[tokio::test]
    async fn update_fully_replaces_tags_and_ingredients() {
        let f = fixture().await;
        let recipe = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();

        let update = json!({
            "name": "Salted omelette",
            "text": "Whisk, salt and fry",
            "cooking_time": "12",
            "ingredients": [
                { "id": f.salt.id, "amount": 2 },
                { "id": f.eggs.id, "amount": 4 },
            ],
            "tags": [f.dinner.id, f.lunch.id],
        });
        let updated = submit_recipe(&f.store, update, f.author.id, Some(recipe.id))
            .await
            .unwrap();

        assert_eq!(updated.id, recipe.id);
        assert_eq!(updated.name, "Salted omelette");
        assert_eq!(updated.cooking_time, 12);
        assert_eq!(updated.pub_date, recipe.pub_date);
        assert_eq!(updated.image, "recipes/images/omelette.png");

        let detail = get_recipe_detail(&f.store, recipe.id, None).await.unwrap();
        assert_eq!(detail.tags, vec![f.dinner.clone(), f.lunch.clone()]);
        let amounts: Vec<(Id, i32)> = detail
            .ingredients
            .iter()
            .map(|i| (i.id, i.amount))
            .collect();
        assert_eq!(amounts, vec![(f.salt.id, 2), (f.eggs.id, 4)]);
        assert_eq!(f.store.amount_row_count(recipe.id).await, 2);
    }

    #[tokio::test]
    async fn update_replaces_image_when_supplied() {
        let f = fixture().await;
        let recipe = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();

        let mut payload = omelette(&f);
        payload["image"] = json!("recipes/images/new.png");
        let updated = submit_recipe(&f.store, payload, f.author.id, Some(recipe.id))
            .await
            .unwrap();

        assert_eq!(updated.image, "recipes/images/new.png");
    }

    #[tokio::test]
    async fn update_of_missing_recipe_is_not_found() {
        let f = fixture().await;

        let error = submit_recipe(&f.store, omelette(&f), f.author.id, Some(777))
            .await
            .unwrap_err();

        assert_eq!(error, DomainError::RecipeNotFound);
    }

    #[tokio::test]
    async fn detail_flags_follow_the_viewer() {
        let f = fixture().await;
        let recipe = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();
        toggle_membership(
            &f.store,
            MembershipKind::ShoppingCart,
            MembershipAction::Add,
            f.reader.id,
            recipe.id,
        )
        .await
        .unwrap();

        let detail = get_recipe_detail(&f.store, recipe.id, Some(f.reader.id))
            .await
            .unwrap();
        assert!(detail.is_in_shopping_cart);
        assert!(!detail.is_favorited);

        let anonymous = get_recipe_detail(&f.store, recipe.id, None).await.unwrap();
        assert!(!anonymous.is_in_shopping_cart);
    }

    #[tokio::test]
    async fn listing_filters_by_author_tags_and_membership() {
        let f = fixture().await;
        let omelette = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();
        let soup = submit_recipe(
            &f.store,
            json!({
                "name": "Soup",
                "text": "Boil",
                "cooking_time": 60,
                "image": "recipes/images/soup.png",
                "ingredients": [{ "id": f.salt.id, "amount": 5 }],
                "tags": [f.dinner.id],
            }),
            f.reader.id,
            None,
        )
        .await
        .unwrap();
        toggle_membership(
            &f.store,
            MembershipKind::Favorite,
            MembershipAction::Add,
            f.reader.id,
            omelette.id,
        )
        .await
        .unwrap();

        let ids = |details: Vec<RecipeDetail>| -> Vec<Id> {
            details.iter().map(|d| d.recipe.id).collect()
        };

        let all = list_recipes(&f.store, &RecipeFilter::default(), None)
            .await
            .unwrap();
        assert_eq!(ids(all), vec![soup.id, omelette.id]);

        let by_author = RecipeFilter {
            author: Some(f.author.id),
            ..Default::default()
        };
        assert_eq!(
            ids(list_recipes(&f.store, &by_author, None).await.unwrap()),
            vec![omelette.id]
        );

        let by_tags = RecipeFilter {
            tags: vec![String::from("dinner"), String::from("lunch")],
            ..Default::default()
        };
        assert_eq!(
            ids(list_recipes(&f.store, &by_tags, None).await.unwrap()),
            vec![soup.id]
        );

        let favorites = RecipeFilter {
            favorited_by: Some(f.reader.id),
            ..Default::default()
        };
        let favorites = list_recipes(&f.store, &favorites, Some(f.reader.id))
            .await
            .unwrap();
        assert!(favorites[0].is_favorited);
        assert_eq!(ids(favorites), vec![omelette.id]);

        toggle_membership(
            &f.store,
            MembershipKind::ShoppingCart,
            MembershipAction::Add,
            f.reader.id,
            soup.id,
        )
        .await
        .unwrap();

        let cart = RecipeFilter {
            in_cart_of: Some(f.reader.id),
            ..Default::default()
        };
        let cart = list_recipes(&f.store, &cart, Some(f.reader.id))
            .await
            .unwrap();
        assert!(cart.iter().all(|d| d.is_in_shopping_cart));
        assert_eq!(ids(cart), vec![soup.id]);

        let other_cart = RecipeFilter {
            in_cart_of: Some(f.author.id),
            ..Default::default()
        };
        assert!(list_recipes(&f.store, &other_cart, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn delete_removes_recipe() {
        let f = fixture().await;
        let recipe = submit_recipe(&f.store, omelette(&f), f.author.id, None)
            .await
            .unwrap();

        delete_recipe(&f.store, recipe.id).await.unwrap();

        assert_eq!(
            get_recipe_detail(&f.store, recipe.id, None).await.unwrap_err(),
            DomainError::RecipeNotFound
        );
        assert_eq!(
            delete_recipe(&f.store, recipe.id).await.unwrap_err(),
            DomainError::RecipeNotFound
        );
        assert_eq!(f.store.amount_row_count(recipe.id).await, 0);
    }
}
