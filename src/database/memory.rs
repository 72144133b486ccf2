use std::collections::HashSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{
    error::DomainError,
    schema::{
        CartRow, Id, Ingredient, IngredientEntry, MembershipKind, NewIngredient, NewTag,
        PreparedRecipe, Recipe, RecipeFields, RecipeFilter, RecipeIngredient, RecipeShort, Tag,
        User, UserRegistration,
    },
    store::{RecipeStore, ReferenceStore},
};

#[derive(Debug, Clone)]
struct AmountRow {
    id: Id,
    recipe_id: Id,
    entry: IngredientEntry,
}

#[derive(Debug, Clone, Copy)]
struct MembershipRow {
    id: Id,
    kind: MembershipKind,
    user_id: Id,
    recipe_id: Id,
}

#[derive(Default)]
struct MemoryState {
    next_id: Id,
    users: Vec<User>,
    ingredients: Vec<Ingredient>,
    tags: Vec<Tag>,
    recipes: Vec<Recipe>,
    recipe_tags: Vec<(Id, Id)>,
    amounts: Vec<AmountRow>,
    memberships: Vec<MembershipRow>,
    subscriptions: Vec<(Id, Id)>,
}

impl MemoryState {
    fn next_id(&mut self) -> Id {
        self.next_id += 1;
        self.next_id
    }

    fn replace_tags(&mut self, recipe_id: Id, tags: &[Tag]) {
        let wanted: HashSet<Id> = tags.iter().map(|tag| tag.id).collect();
        self.recipe_tags
            .retain(|(recipe, tag)| *recipe != recipe_id || wanted.contains(tag));

        for tag in tags {
            if !self.recipe_tags.contains(&(recipe_id, tag.id)) {
                self.recipe_tags.push((recipe_id, tag.id));
            }
        }
    }

    fn replace_ingredient_amounts(&mut self, recipe_id: Id, ingredients: &[IngredientEntry]) {
        self.amounts.retain(|row| row.recipe_id != recipe_id);

        for entry in ingredients {
            let id = self.next_id();
            self.amounts.push(AmountRow {
                id,
                recipe_id,
                entry: *entry,
            });
        }
    }

    fn is_member(&self, kind: MembershipKind, user_id: Id, recipe_id: Id) -> bool {
        self.memberships
            .iter()
            .any(|m| m.kind == kind && m.user_id == user_id && m.recipe_id == recipe_id)
    }
}

/// In-memory store used as a fixture. Every operation runs under one lock,
/// which makes create and update atomic.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
    #[cfg(test)]
    stale_checks: std::sync::atomic::AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a user directly, bypassing registration.
    pub async fn add_user(&self, username: &str) -> User {
        let mut state = self.state.write().await;
        let user = User {
            id: state.next_id(),
            email: format!("{username}@example.com"),
            username: username.to_string(),
            first_name: username.to_string(),
            last_name: username.to_string(),
            password: String::new(),
        };
        state.users.push(user.clone());
        user
    }

    pub async fn add_ingredient(&self, name: &str, measurement_unit: &str) -> Ingredient {
        let mut state = self.state.write().await;
        let ingredient = Ingredient {
            id: state.next_id(),
            name: name.to_string(),
            measurement_unit: measurement_unit.to_string(),
        };
        state.ingredients.push(ingredient.clone());
        ingredient
    }

    pub async fn add_tag(&self, name: &str, slug: &str) -> Tag {
        let mut state = self.state.write().await;
        let tag = Tag {
            id: state.next_id(),
            name: name.to_string(),
            color: Some(String::from("#E26C2D")),
            slug: slug.to_string(),
        };
        state.tags.push(tag.clone());
        tag
    }

    /// Makes membership and subscription existence checks answer false, as
    /// when another request inserts the pair between check and insert.
    #[cfg(test)]
    pub fn stale_pair_checks(&self) {
        self.stale_checks
            .store(true, std::sync::atomic::Ordering::SeqCst);
    }

    #[cfg(test)]
    fn pair_checks_are_stale(&self) -> bool {
        self.stale_checks
            .load(std::sync::atomic::Ordering::SeqCst)
    }

    #[cfg(not(test))]
    fn pair_checks_are_stale(&self) -> bool {
        false
    }

    pub async fn amount_row_count(&self, recipe_id: Id) -> usize {
        let state = self.state.read().await;
        state
            .amounts
            .iter()
            .filter(|row| row.recipe_id == recipe_id)
            .count()
    }
}

#[async_trait]
impl ReferenceStore for MemoryStore {
    async fn ingredient_exists(&self, id: Id) -> Result<bool, DomainError> {
        let state = self.state.read().await;
        Ok(state.ingredients.iter().any(|i| i.id == id))
    }

    async fn tag_exists(&self, id: Id) -> Result<bool, DomainError> {
        let state = self.state.read().await;
        Ok(state.tags.iter().any(|t| t.id == id))
    }

    async fn get_tag(&self, id: Id) -> Result<Option<Tag>, DomainError> {
        let state = self.state.read().await;
        Ok(state.tags.iter().find(|t| t.id == id).cloned())
    }

    async fn get_ingredient(&self, id: Id) -> Result<Option<Ingredient>, DomainError> {
        let state = self.state.read().await;
        Ok(state.ingredients.iter().find(|i| i.id == id).cloned())
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, DomainError> {
        let state = self.state.read().await;
        Ok(state.tags.clone())
    }

    async fn search_ingredients(&self, name: &str) -> Result<Vec<Ingredient>, DomainError> {
        let state = self.state.read().await;
        let needle = name.to_lowercase();

        let mut rows: Vec<Ingredient> = state
            .ingredients
            .iter()
            .filter(|i| i.name.to_lowercase().contains(&needle))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));

        Ok(rows)
    }

    async fn insert_ingredient(&self, ingredient: &NewIngredient) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        if state.ingredients.iter().any(|i| {
            i.name == ingredient.name && i.measurement_unit == ingredient.measurement_unit
        }) {
            return Ok(false);
        }

        let id = state.next_id();
        state.ingredients.push(Ingredient {
            id,
            name: ingredient.name.to_owned(),
            measurement_unit: ingredient.measurement_unit.to_owned(),
        });

        Ok(true)
    }

    async fn insert_tag(&self, tag: &NewTag) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        if state
            .tags
            .iter()
            .any(|t| t.name == tag.name || t.slug == tag.slug)
        {
            return Ok(false);
        }

        let id = state.next_id();
        state.tags.push(Tag {
            id,
            name: tag.name.to_owned(),
            color: tag.color.to_owned(),
            slug: tag.slug.to_owned(),
        });

        Ok(true)
    }
}

#[async_trait]
impl RecipeStore for MemoryStore {
    async fn create_recipe(
        &self,
        author_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError> {
        let mut state = self.state.write().await;

        let recipe = Recipe {
            id: state.next_id(),
            author_id,
            name: fields.name.to_owned(),
            text: fields.text.to_owned(),
            cooking_time: fields.cooking_time,
            image: fields.image.to_owned().unwrap_or_default(),
            pub_date: Utc::now(),
        };
        state.recipes.push(recipe.clone());
        state.replace_tags(recipe.id, &prepared.tags);
        state.replace_ingredient_amounts(recipe.id, &prepared.ingredients);

        Ok(recipe)
    }

    async fn update_recipe(
        &self,
        recipe_id: Id,
        fields: &RecipeFields,
        prepared: &PreparedRecipe,
    ) -> Result<Recipe, DomainError> {
        let mut state = self.state.write().await;

        let recipe = state
            .recipes
            .iter_mut()
            .find(|r| r.id == recipe_id)
            .ok_or(DomainError::RecipeNotFound)?;

        recipe.name = fields.name.to_owned();
        recipe.text = fields.text.to_owned();
        recipe.cooking_time = fields.cooking_time;
        if let Some(image) = &fields.image {
            recipe.image = image.to_owned();
        }
        let recipe = recipe.clone();

        state.replace_tags(recipe_id, &prepared.tags);
        state.replace_ingredient_amounts(recipe_id, &prepared.ingredients);

        Ok(recipe)
    }

    async fn get_recipe(&self, id: Id) -> Result<Option<Recipe>, DomainError> {
        let state = self.state.read().await;
        Ok(state.recipes.iter().find(|r| r.id == id).cloned())
    }

    async fn delete_recipe(&self, id: Id) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        let before = state.recipes.len();

        state.recipes.retain(|r| r.id != id);
        state.recipe_tags.retain(|(recipe, _)| *recipe != id);
        state.amounts.retain(|row| row.recipe_id != id);
        state.memberships.retain(|m| m.recipe_id != id);

        Ok(state.recipes.len() < before)
    }

    async fn recipe_tags(&self, recipe_id: Id) -> Result<Vec<Tag>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .recipe_tags
            .iter()
            .filter(|(recipe, _)| *recipe == recipe_id)
            .filter_map(|(_, tag)| state.tags.iter().find(|t| t.id == *tag).cloned())
            .collect())
    }

    async fn recipe_ingredients(
        &self,
        recipe_id: Id,
    ) -> Result<Vec<RecipeIngredient>, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .amounts
            .iter()
            .filter(|row| row.recipe_id == recipe_id)
            .filter_map(|row| {
                state
                    .ingredients
                    .iter()
                    .find(|i| i.id == row.entry.ingredient_id)
                    .map(|i| RecipeIngredient {
                        id: i.id,
                        name: i.name.to_owned(),
                        measurement_unit: i.measurement_unit.to_owned(),
                        amount: row.entry.amount,
                    })
            })
            .collect())
    }

    async fn list_recipes(&self, filter: &RecipeFilter) -> Result<Vec<Recipe>, DomainError> {
        let state = self.state.read().await;

        let mut rows: Vec<Recipe> = state
            .recipes
            .iter()
            .filter(|r| filter.author.map_or(true, |author| r.author_id == author))
            .filter(|r| {
                filter.tags.is_empty()
                    || state.recipe_tags.iter().any(|(recipe, tag)| {
                        *recipe == r.id
                            && state
                                .tags
                                .iter()
                                .any(|t| t.id == *tag && filter.tags.contains(&t.slug))
                    })
            })
            .filter(|r| {
                filter.favorited_by.map_or(true, |user| {
                    state.is_member(MembershipKind::Favorite, user, r.id)
                })
            })
            .filter(|r| {
                filter.in_cart_of.map_or(true, |user| {
                    state.is_member(MembershipKind::ShoppingCart, user, r.id)
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.pub_date, b.id).cmp(&(a.pub_date, a.id)));

        Ok(rows)
    }

    async fn author_recipes(
        &self,
        author_id: Id,
        limit: Option<usize>,
    ) -> Result<Vec<RecipeShort>, DomainError> {
        let rows = self
            .list_recipes(&RecipeFilter {
                author: Some(author_id),
                ..Default::default()
            })
            .await?;

        Ok(rows
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(RecipeShort::from)
            .collect())
    }

    async fn count_author_recipes(&self, author_id: Id) -> Result<i64, DomainError> {
        let state = self.state.read().await;
        Ok(state
            .recipes
            .iter()
            .filter(|r| r.author_id == author_id)
            .count() as i64)
    }

    async fn membership_exists(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        if self.pair_checks_are_stale() {
            return Ok(false);
        }
        let state = self.state.read().await;
        Ok(state.is_member(kind, user_id, recipe_id))
    }

    async fn create_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        if state.is_member(kind, user_id, recipe_id) {
            return Ok(false);
        }

        let id = state.next_id();
        state.memberships.push(MembershipRow {
            id,
            kind,
            user_id,
            recipe_id,
        });

        Ok(true)
    }

    async fn delete_membership(
        &self,
        kind: MembershipKind,
        user_id: Id,
        recipe_id: Id,
    ) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        let before = state.memberships.len();

        state
            .memberships
            .retain(|m| !(m.kind == kind && m.user_id == user_id && m.recipe_id == recipe_id));

        Ok(state.memberships.len() < before)
    }

    async fn cart_ingredient_rows(&self, user_id: Id) -> Result<Vec<CartRow>, DomainError> {
        let state = self.state.read().await;

        let mut cart: Vec<&MembershipRow> = state
            .memberships
            .iter()
            .filter(|m| m.kind == MembershipKind::ShoppingCart && m.user_id == user_id)
            .collect();
        cart.sort_by_key(|m| m.id);

        let mut rows = vec![];
        for membership in cart {
            let mut amounts: Vec<&AmountRow> = state
                .amounts
                .iter()
                .filter(|row| row.recipe_id == membership.recipe_id)
                .collect();
            amounts.sort_by_key(|row| row.id);

            for row in amounts {
                if let Some(ingredient) = state
                    .ingredients
                    .iter()
                    .find(|i| i.id == row.entry.ingredient_id)
                {
                    rows.push(CartRow {
                        ingredient_name: ingredient.name.to_owned(),
                        measurement_unit: ingredient.measurement_unit.to_owned(),
                        amount: row.entry.amount,
                    });
                }
            }
        }

        Ok(rows)
    }

    async fn subscription_exists(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        if self.pair_checks_are_stale() {
            return Ok(false);
        }
        let state = self.state.read().await;
        Ok(state.subscriptions.contains(&(user_id, author_id)))
    }

    async fn create_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        if user_id == author_id {
            return Err(DomainError::SelfFollowRejected);
        }

        let mut state = self.state.write().await;
        if state.subscriptions.contains(&(user_id, author_id)) {
            return Ok(false);
        }
        state.subscriptions.push((user_id, author_id));

        Ok(true)
    }

    async fn delete_subscription(&self, user_id: Id, author_id: Id) -> Result<bool, DomainError> {
        let mut state = self.state.write().await;
        let before = state.subscriptions.len();

        state
            .subscriptions
            .retain(|pair| *pair != (user_id, author_id));

        Ok(state.subscriptions.len() < before)
    }

    async fn subscribed_authors(&self, user_id: Id) -> Result<Vec<User>, DomainError> {
        let state = self.state.read().await;

        let mut authors: Vec<User> = state
            .subscriptions
            .iter()
            .filter(|(user, _)| *user == user_id)
            .filter_map(|(_, author)| state.users.iter().find(|u| u.id == *author).cloned())
            .collect();
        authors.sort_by(|a, b| a.username.cmp(&b.username));

        Ok(authors)
    }

    async fn get_user(&self, id: Id) -> Result<Option<User>, DomainError> {
        let state = self.state.read().await;
        Ok(state.users.iter().find(|u| u.id == id).cloned())
    }

    async fn create_user(
        &self,
        registration: &UserRegistration,
    ) -> Result<Option<User>, DomainError> {
        let mut state = self.state.write().await;
        if state
            .users
            .iter()
            .any(|u| u.email == registration.email || u.username == registration.username)
        {
            return Ok(None);
        }

        let user = User {
            id: state.next_id(),
            email: registration.email.to_owned(),
            username: registration.username.to_owned(),
            first_name: registration.first_name.to_owned(),
            last_name: registration.last_name.to_owned(),
            password: registration.password.to_owned(),
        };
        state.users.push(user.clone());

        Ok(Some(user))
    }
}
