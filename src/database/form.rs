use std::collections::HashMap;

use serde_json::Value;

use super::{error::DomainError, schema::RecipeFields};
use crate::constants::{MAX_COOKING_TIME, MAX_RECIPE_NAME_LENGTH, MIN_COOKING_TIME};

pub type FormData = HashMap<String, Value>;

/// Integer from a JSON number or a string of ASCII digits. Anything else,
/// including floats, signs and whitespace, is rejected.
pub fn parse_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
            s.parse().ok()
        }
        _ => None,
    }
}

/// A present, non-null, non-empty list.
pub fn require_list<'a>(
    key: &'static str,
    value: Option<&'a Value>,
) -> Result<&'a [Value], DomainError> {
    match value {
        Some(Value::Array(list)) if list.is_empty() => Err(DomainError::RequiredFieldMissing {
            field: key,
            info: String::from("At least one entry is required"),
        }),
        Some(Value::Array(list)) => Ok(list),
        Some(Value::Null) | None => Err(DomainError::required(key)),
        Some(_) => Err(DomainError::invalid_field(key, "Expected a list of items")),
    }
}

/// Raw recipe submission as received by the handling layer.
pub struct Form {
    inner: FormData,
}

impl Form {
    pub fn from_data(data: FormData) -> Self {
        Self { inner: data }
    }

    pub fn from_value(value: Value) -> Result<Self, DomainError> {
        match value {
            Value::Object(map) => Ok(Self::from_data(map.into_iter().collect())),
            _ => Err(DomainError::invalid_field(
                "non_field_errors",
                "Expected an object",
            )),
        }
    }

    /// Present and not null.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.inner.get(key).filter(|value| !value.is_null())
    }

    pub fn get_str(&self, key: &'static str) -> Result<String, DomainError> {
        match self.get(key) {
            Some(value) => match value.as_str() {
                Some(v) if !v.trim().is_empty() => Ok(v.to_string()),
                Some(_) => Err(DomainError::invalid_field(key, "This field may not be blank")),
                None => Err(DomainError::invalid_field(key, "Not a valid string")),
            },
            None => Err(DomainError::required(key)),
        }
    }

    pub fn get_number(&self, key: &'static str) -> Result<i64, DomainError> {
        match self.get(key) {
            Some(value) => parse_integer(value)
                .ok_or_else(|| DomainError::invalid_field(key, "A valid integer is required")),
            None => Err(DomainError::required(key)),
        }
    }

    pub fn get_list(&self, key: &'static str) -> Result<&[Value], DomainError> {
        require_list(key, self.get(key))
    }

    /// Scalar recipe fields. The image is mandatory only when `require_image` is set.
    pub fn recipe_fields(&self, require_image: bool) -> Result<RecipeFields, DomainError> {
        let name = self.get_str("name")?;
        if name.chars().count() > MAX_RECIPE_NAME_LENGTH {
            return Err(DomainError::invalid_field(
                "name",
                &format!("Ensure this field has no more than {MAX_RECIPE_NAME_LENGTH} characters"),
            ));
        }

        let text = self.get_str("text")?;

        let cooking_time = self.get_number("cooking_time")?;
        if !(MIN_COOKING_TIME..=MAX_COOKING_TIME).contains(&cooking_time) {
            return Err(DomainError::invalid_field(
                "cooking_time",
                &format!(
                    "Cooking time must be between {MIN_COOKING_TIME} and {MAX_COOKING_TIME} minutes"
                ),
            ));
        }

        let image = match self.get("image") {
            Some(_) => Some(self.get_str("image")?),
            None if require_image => return Err(DomainError::required("image")),
            None => None,
        };

        Ok(RecipeFields {
            name,
            text,
            cooking_time: cooking_time as i32,
            image,
        })
    }
}
