use async_trait::async_trait;

use super::{
    error::DomainError,
    schema::{
        CartRow, Id, Ingredient, MembershipKind, NewIngredient, NewTag, PreparedRecipe, Recipe,
        RecipeFields, RecipeFilter, RecipeIngredient, RecipeShort, Tag, User, UserRegistration,
    },
};

/// Read-mostly catalog of ingredients and tags.
#[async_trait]
pub trait ReferenceStore: Send + Sync {
    async fn ingredient_exists(&self, id: Id) -> Result<bool, DomainError>;

    async fn tag_exists(&self, id: Id) -> Result<bool, DomainError>;

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, DomainError>;

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, DomainError>;

    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError>;

    /// Case-insensitive substring match on the name, ordered by name.
    async fn search_ingredients(&self, name: &str) -> Result<Vec<Ingredient>, DomainError>;

    /// Returns false when an ingredient with the same name and unit exists.
    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<bool, DomainError>;

    /// Returns false when a tag with the same name or slug exists.
    async fn insert_tag(&self, tag: &NewTag) -> Result<bool, DomainError>;
}

#[async_trait]
pub trait RecipeStore: ReferenceStore {
    // Recipes

    /// Writes the recipe row, its tag links and ingredient amounts in one transaction.
    async fn create_recipe(
        &self,
        author_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError>;

    /// Replaces tags by set difference, recreates ingredient amounts and
    /// overwrites scalar fields in one transaction. The image is kept when
    /// `fields.image` is `None`.
    async fn update_recipe(
        &self,
        recipe_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError>;

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, DomainError>;

    /// Returns false when no recipe was deleted.
    async fn delete_recipe(&self, id: Id) -> Result<bool, DomainError>;

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, DomainError>;

    async fn recipe_ingredients(&self, recipe_id: Id)
        -> Result<Vec<RecipeIngredient>, DomainError>;

    /// Newest first.
    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, DomainError>;

    /// Newest first, at most `limit` rows when given.
    async fn author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<RecipeShort>, DomainError>;

    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, DomainError>;

    // Memberships

    async fn membership_exists(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError>;

    /// Returns false when the pair already existed.
    async fn create_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError>;

    /// Returns false when there was nothing to delete.
    async fn delete_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError>;

    /// Ingredient rows of every carted recipe, ordered by cart entry and
    /// then by ingredient amount row.
    async fn cart_ingredient_rows(&self, user_id: Id) -> Result<Vec<CartRow>, DomainError>;

    // Subscriptions

    async fn subscription_exists(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError>;

    /// Returns false when the pair already existed.
    async fn create_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError>;

    async fn delete_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError>;

    /// Authors followed by `user_id`, ordered by username.
    async fn subscribed_authors(&self, user_id: Id) -> Result<Vec<User>, DomainError>;

    // Users

    async fn get_user(&self, id: Id) -> Result<Option<User>, DomainError>;

    /// `registration.password` is expected to be hashed already. Returns
    /// `None` when the email or username is taken.
    async fn create_user(
        &self,
        registration: &UserRegistration,
    ) -> Result<Option<User>, DomainError>;
}
