use std::collections::HashSet;

use serde_json::Value;

use super::{
    error::DomainError,
    form::{parse_integer, require_list},
    schema::{Id, IngredientEntry, PreparedRecipe, Tag},
    store::ReferenceStore,
};
use crate::constants::{MAX_INGREDIENT_AMOUNT, MIN_INGREDIENT_AMOUNT};

fn parse_id(value: Option<&Value>) -> Option<Id> {
    value
        .and_then(parse_integer)
        .and_then(|id| Id::try_from(id).ok())
}

/// Validates the submitted ingredient and tag lists against the reference
/// store. Ingredients are checked first, then tags; the first violation is
/// returned and nothing is written.
pub async fn validate_and_prepare<R>(
    raw_ingredients: Option<&Value>,
    raw_tags: Option<&Value>,
    reference: &R,
) -> Result<PreparedRecipe, DomainError>
where
    R: ReferenceStore + ?Sized,
{
    let raw_ingredients = require_list("ingredients", raw_ingredients)?;
    let raw_tags = require_list("tags", raw_tags)?;

    let ingredients = validate_ingredients(raw_ingredients, reference).await?;
    let tags = validate_tags(raw_tags, reference).await?;

    Ok(PreparedRecipe { ingredients, tags })
}

async fn validate_ingredients<R>(
    raw: &[Value],
    reference: &R,
) -> Result<Vec<IngredientEntry>, DomainError>
where
    R: ReferenceStore + ?Sized,
{
    let mut seen: HashSet<Id> = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());

    for item in raw {
        let amount = match item.get("amount") {
            Some(amount) if !amount.is_null() => amount,
            _ => return Err(DomainError::required("amount")),
        };
        let amount = parse_integer(amount)
            .ok_or_else(|| DomainError::invalid_amount("Amount must be a number"))?;
        if amount < MIN_INGREDIENT_AMOUNT {
            return Err(DomainError::invalid_amount(
                "Ingredient amount must be greater than zero",
            ));
        }
        if amount > MAX_INGREDIENT_AMOUNT {
            return Err(DomainError::invalid_amount(&format!(
                "Ingredient amount must not exceed {MAX_INGREDIENT_AMOUNT}"
            )));
        }

        let exists = match parse_id(item.get("id")) {
            Some(id) => reference.ingredient_exists(id).await?.then_some(id),
            None => None,
        };
        let id = exists.ok_or_else(|| {
            DomainError::unknown("ingredients_id", "Ingredient does not exist")
        })?;
        if !seen.insert(id) {
            return Err(DomainError::duplicate(
                "ingredients_id",
                "Ingredient must not repeat within a recipe",
            ));
        }

        entries.push(IngredientEntry {
            ingredient_id: id,
            amount: amount as i32,
        });
    }

    Ok(entries)
}

async fn validate_tags<R>(raw: &[Value], reference: &R) -> Result<Vec<Tag>, DomainError>
where
    R: ReferenceStore + ?Sized,
{
    let mut tags: Vec<Tag> = Vec::with_capacity(raw.len());

    for item in raw {
        let id = parse_id(Some(item));
        if let Some(id) = id {
            if tags.iter().any(|tag| tag.id == id) {
                return Err(DomainError::duplicate(
                    "tags",
                    "Tag must not repeat within a recipe",
                ));
            }
        }

        let tag = match id {
            Some(id) => reference.get_tag(id).await?,
            None => None,
        };
        match tag {
            Some(tag) => tags.push(tag),
            None => return Err(DomainError::unknown("tags", "Tag does not exist")),
        }
    }

    Ok(tags)
}
