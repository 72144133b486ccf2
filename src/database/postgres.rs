use std::collections::HashSet;

use async_trait::async_trait;
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use super::{
    error::{DomainError, QueryError},
    schema::{
        CartRow, Id, Ingredient, IngredientEntry, MembershipKind, NewIngredient, NewTag,
        PreparedRecipe, Recipe, RecipeFields, RecipeFilter, RecipeIngredient, RecipeShort, Tag,
        User, UserRegistration,
    },
    store::{RecipeStore, ReferenceStore},
};

/*
Expected tables

users               (id, email UNIQUE, username UNIQUE, first_name, last_name, password)
ingredients         (id, name, measurement_unit, UNIQUE (name, measurement_unit))
tags                (id, name UNIQUE, color, slug UNIQUE)
recipes             (id, author_id, name, text, cooking_time, image, pub_date DEFAULT now())
recipe_tags         (id, recipe_id, tag_id, UNIQUE (recipe_id, tag_id))
ingredient_amounts  (id, recipe_id, ingredient_id, amount, UNIQUE (recipe_id, ingredient_id))
favorites           (id, user_id, recipe_id, UNIQUE (user_id, recipe_id))
shopping_cart       (id, user_id, recipe_id, UNIQUE (user_id, recipe_id))
subscriptions       (id, user_id, author_id, UNIQUE (user_id, author_id), CHECK (user_id <> author_id))
*/

#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

/// `LIMIT` bind for an optional row cap. `NULL` means no limit, which also
/// covers caps too large for a bigint.
fn sql_limit(limit: Option<usize>) -> Option<i64> {
    limit.and_then(|limit| i64::try_from(limit).ok())
}

async fn update_recipe_fields(
    conn: &mut PgConnection,
    recipe_id: Id,
    fields: &RecipeFields,
) -> Result<Option<Recipe>, DomainError> {
    let recipe: Option<Recipe> = sqlx::query_as(
        "
        UPDATE recipes
        SET name = $1, text = $2, cooking_time = $3, image = COALESCE($4, image)
        WHERE id = $5
        RETURNING *
    ",
    )
    .bind(&fields.name)
    .bind(&fields.text)
    .bind(fields.cooking_time)
    .bind(fields.image.as_deref())
    .bind(recipe_id)
    .fetch_optional(&mut *conn)
    .await
    .map_err(QueryError::from)?;

    Ok(recipe)
}

async fn replace_tags(
    conn: &mut PgConnection,
    recipe_id: Id,
    tags: &[Tag],
) -> Result<(), DomainError> {
    let current: Vec<(Id,)> = sqlx::query_as("SELECT tag_id FROM recipe_tags WHERE recipe_id = $1")
        .bind(recipe_id)
        .fetch_all(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    let current: HashSet<Id> = current.into_iter().map(|row| row.0).collect();
    let wanted: HashSet<Id> = tags.iter().map(|tag| tag.id).collect();

    let removed: Vec<Id> = current.difference(&wanted).copied().collect();
    let added: Vec<Id> = tags
        .iter()
        .map(|tag| tag.id)
        .filter(|id| !current.contains(id))
        .collect();

    if !removed.is_empty() {
        sqlx::query("DELETE FROM recipe_tags WHERE recipe_id = $1 AND tag_id = ANY($2)")
            .bind(recipe_id)
            .bind(&removed)
            .execute(&mut *conn)
            .await
            .map_err(QueryError::from)?;
    }

    if !added.is_empty() {
        sqlx::query(
            "INSERT INTO recipe_tags (recipe_id, tag_id) SELECT $1, UNNEST($2::int4[])",
        )
        .bind(recipe_id)
        .bind(&added)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;
    }

    log::trace!(
        "> Recipe {recipe_id} tags: -{} +{}",
        removed.len(),
        added.len()
    );

    Ok(())
}

async fn replace_ingredient_amounts(
    conn: &mut PgConnection,
    recipe_id: Id,
    ingredients: &[IngredientEntry],
) -> Result<(), DomainError> {
    sqlx::query("DELETE FROM ingredient_amounts WHERE recipe_id = $1")
        .bind(recipe_id)
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    if ingredients.is_empty() {
        return Ok(());
    }

    let mut builder: QueryBuilder<Postgres> =
        QueryBuilder::new("INSERT INTO ingredient_amounts (recipe_id, ingredient_id, amount) ");
    builder.push_values(ingredients, |mut row, entry| {
        row.push_bind(recipe_id)
            .push_bind(entry.ingredient_id)
            .push_bind(entry.amount);
    });

    builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(QueryError::from)?;

    Ok(())
}

#[async_trait]
impl ReferenceStore for PgStore {
    async fn ingredient_exists(&self, id: Id) -> Result<bool, DomainError> {
        let row: (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM ingredients WHERE id = $1)")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn tag_exists(&self, id: Id) -> Result<bool, DomainError> {
        let row: (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM tags WHERE id = $1)")
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, DomainError> {
        let tag: Option<Tag> = sqlx::query_as("SELECT * FROM tags WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(tag)
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, DomainError> {
        let ingredient: Option<Ingredient> =
            sqlx::query_as("SELECT * FROM ingredients WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(ingredient)
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError> {
        let tags: Vec<Tag> = sqlx::query_as("SELECT * FROM tags ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(tags)
    }

    async fn search_ingredients(&self, name: &str) -> Result<Vec<Ingredient>, DomainError> {
        let rows: Vec<Ingredient> =
            sqlx::query_as("SELECT * FROM ingredients WHERE name ILIKE $1 ORDER BY name")
                .bind(format!("%{name}%"))
                .fetch_all(&self.pool)
                .await
                .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "INSERT INTO ingredients (name, measurement_unit) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(&ingredient.name)
        .bind(&ingredient.measurement_unit)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn insert_tag(&self, tag: &NewTag) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "INSERT INTO tags (name, color, slug) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(&tag.name)
        .bind(tag.color.as_deref())
        .bind(&tag.slug)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl RecipeStore for PgStore {
    async fn create_recipe(
        &self,
        author_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;

        let recipe: Recipe = sqlx::query_as(
            "
            INSERT INTO recipes (author_id, name, text, cooking_time, image)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
        ",
        )
        .bind(author_id)
        .bind(&fields.name)
        .bind(&fields.text)
        .bind(fields.cooking_time)
        .bind(fields.image.as_deref().unwrap_or_default())
        .fetch_one(&mut *tx)
        .await
        .map_err(QueryError::from)?;

        replace_tags(&mut *tx, recipe.id, &prepared.tags).await?;
        replace_ingredient_amounts(&mut *tx, recipe.id, &prepared.ingredients).await?;

        tx.commit().await.map_err(QueryError::from)?;

        Ok(recipe)
    }

    async fn update_recipe(
        &self,
        recipe_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;

        // Dropping the transaction rolls it back
        let recipe = update_recipe_fields(&mut *tx, recipe_id, fields)
            .await?
            .ok_or(DomainError::RecipeNotFound)?;

        replace_tags(&mut *tx, recipe_id, &prepared.tags).await?;
        replace_ingredient_amounts(&mut *tx, recipe_id, &prepared.ingredients).await?;

        tx.commit().await.map_err(QueryError::from)?;

        Ok(recipe)
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, DomainError> {
        let row: Option<Recipe> = sqlx::query_as("SELECT * FROM recipes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, DomainError> {
        let mut tx = self.pool.begin().await.map_err(QueryError::from)?;

        for table in [
            "recipe_tags",
            "ingredient_amounts",
            MembershipKind::Favorite.table(),
            MembershipKind::ShoppingCart.table(),
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE recipe_id = $1"))
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(QueryError::from)?;
        }

        let result = sqlx::query("DELETE FROM recipes WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(QueryError::from)?;

        tx.commit().await.map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, DomainError> {
        let tags: Vec<Tag> = sqlx::query_as(
            "
            SELECT t.*
            FROM recipe_tags rt
            INNER JOIN tags t ON t.id = rt.tag_id
            WHERE rt.recipe_id = $1
            ORDER BY rt.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(tags)
    }

    async fn recipe_ingredients(
        &self,
        recipe_id: Id,
    ) -> Result<Vec<RecipeIngredient>, DomainError> {
        let rows: Vec<RecipeIngredient> = sqlx::query_as(
            "
            SELECT i.id AS id, i.name AS name, i.measurement_unit AS measurement_unit, ia.amount AS amount
            FROM ingredient_amounts ia
            INNER JOIN ingredients i ON i.id = ia.ingredient_id
            WHERE ia.recipe_id = $1
            ORDER BY ia.id
        ",
        )
        .bind(recipe_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, DomainError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new("SELECT r.* FROM recipes r WHERE TRUE");

        if let Some(author) = filter.author {
            builder.push(" AND r.author_id = ").push_bind(author);
        }
        if !filter.tags.is_empty() {
            builder
                .push(
                    " AND EXISTS (SELECT 1 FROM recipe_tags rt INNER JOIN tags t ON t.id = rt.tag_id WHERE rt.recipe_id = r.id AND t.slug = ANY(",
                )
                .push_bind(filter.tags.clone())
                .push("))");
        }
        for (kind, user) in [
            (MembershipKind::Favorite, filter.favorited_by),
            (MembershipKind::ShoppingCart, filter.in_cart_of),
        ] {
            if let Some(user) = user {
                builder
                    .push(format!(
                        " AND EXISTS (SELECT 1 FROM {} m WHERE m.recipe_id = r.id AND m.user_id = ",
                        kind.table()
                    ))
                    .push_bind(user)
                    .push(")");
            }
        }
        builder.push(" ORDER BY r.pub_date DESC, r.id DESC");

        let rows: Vec<Recipe> = builder
            .build_query_as::<Recipe>()
            .fetch_all(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<RecipeShort>, DomainError> {
        let rows: Vec<RecipeShort> = sqlx::query_as(
            "
            SELECT id, name, image, cooking_time
            FROM recipes
            WHERE author_id = $1
            ORDER BY pub_date DESC, id DESC
            LIMIT $2
        ",
        )
        .bind(author_id)
        .bind(sql_limit(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, DomainError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM recipes WHERE author_id = $1")
            .bind(author_id)
            .fetch_one(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn membership_exists(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        let row: (bool,) = sqlx::query_as(&format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE user_id = $1 AND recipe_id = $2)",
            kind.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn create_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(&format!(
            "INSERT INTO {} (user_id, recipe_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            kind.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = $1 AND recipe_id = $2",
            kind.table()
        ))
        .bind(user_id)
        .bind(recipe_id)
        .execute(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn cart_ingredient_rows(&self, user_id: Id) -> Result<Vec<CartRow>, DomainError> {
        let rows: Vec<CartRow> = sqlx::query_as(
            "
            SELECT i.name AS ingredient_name, i.measurement_unit AS measurement_unit, ia.amount AS amount
            FROM shopping_cart sc
            INNER JOIN ingredient_amounts ia ON ia.recipe_id = sc.recipe_id
            INNER JOIN ingredients i ON i.id = ia.ingredient_id
            WHERE sc.user_id = $1
            ORDER BY sc.id, ia.id
        ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn subscription_exists(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        let row: (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM subscriptions WHERE user_id = $1 AND author_id = $2)",
        )
        .bind(user_id)
        .bind(author_id)
        .fetch_one(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row.0)
    }

    async fn create_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        let result = sqlx::query(
            "INSERT INTO subscriptions (user_id, author_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(user_id)
        .bind(author_id)
        .execute(&self.pool)
        .await;

        match result {
            Ok(result) => Ok(result.rows_affected() > 0),
            Err(e) if QueryError::is_constraint_violation(&e) => {
                Err(DomainError::SelfFollowRejected)
            }
            Err(e) => Err(QueryError::from(e).into()),
        }
    }

    async fn delete_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM subscriptions WHERE user_id = $1 AND author_id = $2")
            .bind(user_id)
            .bind(author_id)
            .execute(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(result.rows_affected() > 0)
    }

    async fn subscribed_authors(&self, user_id: Id) -> Result<Vec<User>, DomainError> {
        let rows: Vec<User> = sqlx::query_as(
            "
            SELECT u.*
            FROM subscriptions s
            INNER JOIN users u ON u.id = s.author_id
            WHERE s.user_id = $1
            ORDER BY u.username
        ",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(rows)
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, DomainError> {
        let row: Option<User> = sqlx::query_as("SELECT * FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(QueryError::from)?;

        Ok(row)
    }

    async fn create_user(
        &self,
        registration: &UserRegistration,
    ) -> Result<Option<User>, DomainError> {
        let row: Option<User> = sqlx::query_as(
            "
            INSERT INTO users (email, username, first_name, last_name, password)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING RETURNING *;
        ",
        )
        .bind(&registration.email)
        .bind(&registration.username)
        .bind(&registration.first_name)
        .bind(&registration.last_name)
        .bind(&registration.password)
        .fetch_optional(&self.pool)
        .await
        .map_err(QueryError::from)?;

        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_limits_mean_no_limit() {
        assert_eq!(sql_limit(Some(3)), Some(3));
        assert_eq!(sql_limit(None), None);
        assert_eq!(sql_limit(Some(usize::MAX)), None);
    }
}
