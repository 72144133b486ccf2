use crate::{
    constants::SHOPPING_LIST_FILENAME,
    database::{
        error::DomainError,
        schema::{Id, LineItem},
        shopping_list::{build_shopping_list, render_shopping_list},
        store::RecipeStore,
    },
};

pub async fn shopping_list_for<S>(store: &S, user_id: Id) -> Result<Vec<LineItem>, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let rows = store.cart_ingredient_rows(user_id).await?;
    let items = build_shopping_list(rows);
    log::trace!("> Shopping list of {user_id}: {} items", items.len());

    Ok(items)
}

/// Numbered plain text export of the user's shopping list.
pub async fn export_shopping_list<S>(store: &S, user_id: Id) -> Result<String, DomainError>
where
    S: RecipeStore + ?Sized,
{
    let items = shopping_list_for(store, user_id).await?;

    Ok(render_shopping_list(&items))
}

/// `Content-Disposition` header value for the exported list.
pub fn content_disposition() -> String {
    format!("attachment; filename=\"{SHOPPING_LIST_FILENAME}\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::{
        actions::memberships::add_membership,
        memory::MemoryStore,
        schema::{IngredientEntry, MembershipKind, PreparedRecipe, RecipeFields},
    };

    fn fields(name: &str) -> RecipeFields {
        RecipeFields {
            name: name.to_string(),
            text: String::from("Cook it"),
            cooking_time: 15,
            image: Some(format!("recipes/images/{name}.png")),
        }
    }

    #[tokio::test]
    async fn carted_recipes_are_aggregated_by_name() {
        let store = MemoryStore::new();
        let user = store.add_user("shopper").await;
        let salt = store.add_ingredient("Salt", "g").await;
        let milk = store.add_ingredient("Milk", "ml").await;
        let tag = store.add_tag("Dinner", "dinner").await;

        let a = store
            .create_recipe(
                user.id,
                &fields("a"),
                &PreparedRecipe {
                    ingredients: vec![IngredientEntry { ingredient_id: salt.id, amount: 5 }],
                    tags: vec![tag.clone()],
                },
            )
            .await
            .unwrap();
        let b = store
            .create_recipe(
                user.id,
                &fields("b"),
                &PreparedRecipe {
                    ingredients: vec![
                        IngredientEntry { ingredient_id: milk.id, amount: 200 },
                        IngredientEntry { ingredient_id: salt.id, amount: 7 },
                    ],
                    tags: vec![tag.clone()],
                },
            )
            .await
            .unwrap();
        let c = store
            .create_recipe(
                user.id,
                &fields("c"),
                &PreparedRecipe {
                    ingredients: vec![IngredientEntry { ingredient_id: milk.id, amount: 1000 }],
                    tags: vec![tag],
                },
            )
            .await
            .unwrap();

        assert!(shopping_list_for(&store, user.id).await.unwrap().is_empty());

        add_membership(&store, MembershipKind::ShoppingCart, user.id, a.id)
            .await
            .unwrap();
        add_membership(&store, MembershipKind::ShoppingCart, user.id, b.id)
            .await
            .unwrap();
        // favorites never reach the shopping list
        add_membership(&store, MembershipKind::Favorite, user.id, c.id)
            .await
            .unwrap();

        let items = shopping_list_for(&store, user.id).await.unwrap();
        assert_eq!(
            items,
            vec![
                LineItem {
                    ingredient_name: String::from("Salt"),
                    measurement_unit: String::from("g"),
                    total_amount: 12,
                },
                LineItem {
                    ingredient_name: String::from("Milk"),
                    measurement_unit: String::from("ml"),
                    total_amount: 200,
                },
            ]
        );
        assert_eq!(
            export_shopping_list(&store, user.id).await.unwrap(),
            "1. Salt (g) - 12\n2. Milk (ml) - 200\n"
        );
    }

    #[test]
    fn export_is_served_as_attachment() {
        assert_eq!(
            content_disposition(),
            "attachment; filename=\"shopping_list.txt\""
        );
    }

    #[tokio::test]
    async fn same_name_different_records_are_merged() {
        let store = MemoryStore::new();
        let user = store.add_user("shopper").await;
        let first = store.add_ingredient("Salt", "g").await;
        let second = store.add_ingredient("Salt", "kg").await;
        let tag = store.add_tag("Dinner", "dinner").await;

        let recipe = store
            .create_recipe(
                user.id,
                &fields("salty"),
                &PreparedRecipe {
                    ingredients: vec![
                        IngredientEntry { ingredient_id: first.id, amount: 5 },
                        IngredientEntry { ingredient_id: second.id, amount: 1 },
                    ],
                    tags: vec![tag],
                },
            )
            .await
            .unwrap();
        add_membership(&store, MembershipKind::ShoppingCart, user.id, recipe.id)
            .await
            .unwrap();

        let items = shopping_list_for(&store, user.id).await.unwrap();

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].measurement_unit, "g");
        assert_eq!(items[0].total_amount, 6);
    }
}
