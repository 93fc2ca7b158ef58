// src/recipe/parser.rs

//! Recipe file parsing

use crate::error::{Error, Result};
use crate::recipe::Recipe;
use crate::recipe::format::RecipeFile;
use std::path::Path;

/// Parse a recipe from a TOML string
pub fn parse_recipe(content: &str) -> Result<RecipeFile> {
    toml::from_str(content).map_err(|e| Error::ParseError(format!("Invalid recipe: {}", e)))
}

/// Parse a recipe from a file
pub fn parse_recipe_file(path: &Path) -> Result<RecipeFile> {
    let content = std::fs::read_to_string(path)?;
    parse_recipe(&content)
        .map_err(|e| Error::ParseError(format!("{}: {}", path.display(), e)))
}

/// Parse, validate and convert a recipe file
///
/// Returns the recipe together with any validation warnings.
pub fn load_recipe(path: &Path) -> Result<(Recipe, Vec<String>)> {
    let file = parse_recipe_file(path)?;
    let warnings = validate_recipe(&file)?;
    Ok((file.into_recipe(path.parent()), warnings))
}

/// Validate a recipe for completeness and correctness
pub fn validate_recipe(file: &RecipeFile) -> Result<Vec<String>> {
    let mut warnings = Vec::new();
    let recipe = &file.recipe;
    let invalid = |reason: String| Error::InvalidRecipe {
        name: recipe.name.clone(),
        reason,
    };

    if recipe.name.is_empty() {
        return Err(invalid("recipe name cannot be empty".to_string()));
    }
    if recipe
        .name
        .chars()
        .any(|c| c.is_whitespace() || c == '/' || c == '=')
    {
        return Err(invalid(format!("invalid characters in name '{}'", recipe.name)));
    }

    if recipe.url.is_some() && recipe.path.is_some() {
        return Err(invalid("url and path are mutually exclusive".to_string()));
    }

    if let Some(url) = &recipe.url {
        if url.contains("{version}") && recipe.version.is_none() {
            return Err(invalid("url uses {version} but no version is set".to_string()));
        }
        let rendered = url.replace("{version}", recipe.version.as_deref().unwrap_or_default());
        url::Url::parse(&rendered).map_err(|e| invalid(format!("bad url '{}': {}", rendered, e)))?;
    }

    for lib in &recipe.generated_libraries {
        if lib.is_empty() || lib.contains('/') {
            return Err(invalid(format!("artifact '{}' must be a plain file name", lib)));
        }
    }

    if recipe.generated_libraries.is_empty() && file.build.kind() != "header-only" {
        warnings.push(format!(
            "{}: no generated_libraries declared; nothing will be aggregated",
            recipe.name
        ));
    }

    if recipe.depends.contains(&recipe.name) {
        warnings.push(format!("{}: recipe depends on itself", recipe.name));
    }

    Ok(warnings)
}
