//! Collaborators the classification core depends on.
//!
//! Implementations return `anyhow::Result`; [`Services`] attaches context
//! and converts failures into [`ClassificationError::UpstreamResolution`].
//! Recipe loads and engine evaluations are issued through the shared
//! [`Limiter`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde_json::Value;

use crate::error::{ClassificationError, Result};
use crate::expr::{Expr, Geometry, Image};
use crate::recipe::{ImageRecipeRef, RecipeDocument};
use crate::runtime::{Limiter, RuntimeConfig};

/// Produces images for the input recipes of a classification
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn image(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Image>;

    async fn bands(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Vec<String>>;

    async fn geometry(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Geometry>;
}

/// Looks up stored recipes by id
#[async_trait]
pub trait RecipeLoader: Send + Sync {
    async fn load_recipe(&self, id: &str) -> anyhow::Result<Value>;
}

/// The remote engine. Evaluating an expression is the only network I/O
/// the core performs.
#[async_trait]
pub trait ComputeEngine: Send + Sync {
    async fn evaluate(&self, expr: &Expr) -> anyhow::Result<Value>;
}

/// Everything a classification session needs from the outside world.
/// Cloning is cheap; clones share one limiter.
#[derive(Clone)]
pub struct Services {
    images: Arc<dyn ImageSource>,
    recipes: Arc<dyn RecipeLoader>,
    engine: Arc<dyn ComputeEngine>,
    limiter: Arc<Limiter>,
    config: RuntimeConfig,
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("limiter", &self.limiter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Services {
    pub fn new(
        images: Arc<dyn ImageSource>,
        recipes: Arc<dyn RecipeLoader>,
        engine: Arc<dyn ComputeEngine>,
        config: RuntimeConfig,
    ) -> Result<Self> {
        let limiter = Arc::new(Limiter::new(config.limiter.clone())?);
        Ok(Self {
            images,
            recipes,
            engine,
            limiter,
            config,
        })
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn limiter(&self) -> &Limiter {
        &self.limiter
    }

    pub async fn image(&self, recipe: &ImageRecipeRef) -> Result<Image> {
        self.images
            .image(recipe)
            .await
            .map_err(|e| ClassificationError::upstream(format!("image of recipe {}", recipe.id), e))
    }

    pub async fn bands(&self, recipe: &ImageRecipeRef) -> Result<Vec<String>> {
        self.images
            .bands(recipe)
            .await
            .map_err(|e| ClassificationError::upstream(format!("bands of recipe {}", recipe.id), e))
    }

    pub async fn geometry(&self, recipe: &ImageRecipeRef) -> Result<Geometry> {
        self.images
            .geometry(recipe)
            .await
            .map_err(|e| ClassificationError::upstream(format!("geometry of recipe {}", recipe.id), e))
    }

    pub async fn load_recipe(&self, id: &str) -> Result<RecipeDocument> {
        debug!("Loading recipe {}", id);
        let document = self
            .limiter
            .run(self.recipes.load_recipe(id))
            .await
            .map_err(|e| ClassificationError::upstream(format!("recipe {}", id), e))?;
        RecipeDocument::from_value(document)
    }

    pub async fn evaluate(&self, expr: &Expr) -> Result<Value> {
        let what = expr.function().unwrap_or("expression");
        debug!("Evaluating {}", what);
        self.limiter
            .run(self.engine.evaluate(expr))
            .await
            .map_err(|e| ClassificationError::upstream(format!("evaluation of {}", what), e))
    }
}
