use std::{fs::File, io::Read, path::Path};

use redis::aio::MultiplexedConnection;
use serde::{de::DeserializeOwned, Serialize};

use crate::{
    cache::cache::invalidate_reference_cache,
    constants::{INGREDIENTS_CSV, TAGS_CSV},
    database::{
        error::DomainError,
        schema::{NewIngredient, NewTag},
        store::ReferenceStore,
    },
};

/// Rows inserted by a seeding run. Rows that already existed are not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub ingredients: usize,
    pub tags: usize,
}

impl SeedReport {
    pub fn is_empty(&self) -> bool {
        self.ingredients == 0 && self.tags == 0
    }
}

/// Malformed input is reported as an invalid field named after `source`.
fn read_rows<T: DeserializeOwned, R: Read>(
    source: &'static str,
    reader: R,
) -> Result<Vec<T>, DomainError> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|e| DomainError::invalid_field(source, &format!("Malformed csv: {e}")))
}

/// Parses `name,measurement_unit` rows.
pub fn read_ingredients_csv<R: Read>(reader: R) -> Result<Vec<NewIngredient>, DomainError> {
    read_rows(INGREDIENTS_CSV, reader)
}

/// Parses `name,color,slug` rows. An empty color is stored as null.
pub fn read_tags_csv<R: Read>(reader: R) -> Result<Vec<NewTag>, DomainError> {
    read_rows(TAGS_CSV, reader)
}

fn open(dir: &Path, name: &str) -> Result<File, DomainError> {
    let path = dir.join(name);
    File::open(&path).map_err(|e| DomainError::Persistence {
        info: format!("Failed to open {}: {e}", path.display()),
    })
}

/// Loads `ingredients.csv` and `tags.csv` from `dir` into the store.
pub async fn seed_reference_data<S>(store: &S, dir: &Path) -> Result<SeedReport, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    let ingredients = read_ingredients_csv(open(dir, INGREDIENTS_CSV)?)?;
    let tags = read_tags_csv(open(dir, TAGS_CSV)?)?;

    let mut report = SeedReport::default();
    for ingredient in &ingredients {
        if store.insert_ingredient(ingredient).await? {
            report.ingredients += 1;
        }
    }
    for tag in &tags {
        if store.insert_tag(tag).await? {
            report.tags += 1;
        }
    }

    log::info!(
        "Seeded {} of {} ingredients and {} of {} tags from {}",
        report.ingredients,
        ingredients.len(),
        report.tags,
        tags.len(),
        dir.display()
    );

    Ok(report)
}

/// Seeds and drops cached reference lookups when anything was inserted.
pub async fn seed_and_invalidate<S>(
    store: &S,
    dir: &Path,
    cache: &mut MultiplexedConnection,
) -> Result<SeedReport, DomainError>
where
    S: ReferenceStore + ?Sized,
{
    let report = seed_reference_data(store, dir).await?;
    if !report.is_empty() {
        invalidate_reference_cache(cache).await?;
    }

    Ok(report)
}
