//! In-memory collaborators for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use env_logger::{Builder, Env};
use serde_json::{json, Value};
use terraclass::{
    ClassificationRecipe, ComputeEngine, Expr, Geometry, Image, ImageRecipeRef, ImageSource,
    RecipeLoader, RuntimeConfig, Services,
};

pub const LANDSAT_BANDS: [&str; 6] = ["blue", "green", "red", "nir", "swir1", "swir2"];

pub fn init() {
    let _ = Builder::from_env(Env::default().default_filter_or("warn"))
        .is_test(true)
        .try_init();
}

/// Serves every recipe id as an asset of the same name
#[derive(Default)]
pub struct MockImageSource {
    bands: HashMap<String, Vec<String>>,
    failing: Vec<String>,
}

impl MockImageSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_image(mut self, id: &str, bands: &[&str]) -> Self {
        self.bands
            .insert(id.to_string(), bands.iter().map(|b| b.to_string()).collect());
        self
    }

    pub fn failing(mut self, id: &str) -> Self {
        self.failing.push(id.to_string());
        self
    }

    fn lookup(&self, recipe: &ImageRecipeRef) -> anyhow::Result<&Vec<String>> {
        if self.failing.contains(&recipe.id) {
            return Err(anyhow!("image {} unavailable", recipe.id));
        }
        self.bands
            .get(&recipe.id)
            .ok_or_else(|| anyhow!("no image {}", recipe.id))
    }
}

#[async_trait]
impl ImageSource for MockImageSource {
    async fn image(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Image> {
        let bands: Vec<&str> = self.lookup(recipe)?.iter().map(String::as_str).collect();
        Ok(Image::asset(&recipe.id, &bands))
    }

    async fn bands(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Vec<String>> {
        Ok(self.lookup(recipe)?.clone())
    }

    async fn geometry(&self, recipe: &ImageRecipeRef) -> anyhow::Result<Geometry> {
        Ok(self.image(recipe).await?.geometry())
    }
}

#[derive(Default)]
pub struct MockRecipeLoader {
    recipes: HashMap<String, Value>,
    loads: Mutex<Vec<String>>,
}

impl MockRecipeLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_recipe(mut self, id: &str, model: Value) -> Self {
        self.recipes.insert(
            id.to_string(),
            json!({"id": id, "type": "CLASSIFICATION", "model": model}),
        );
        self
    }

    pub fn with_document(mut self, id: &str, document: Value) -> Self {
        self.recipes.insert(id.to_string(), document);
        self
    }

    pub fn loads(&self) -> Vec<String> {
        self.loads.lock().unwrap().clone()
    }
}

#[async_trait]
impl RecipeLoader for MockRecipeLoader {
    async fn load_recipe(&self, id: &str) -> anyhow::Result<Value> {
        self.loads.lock().unwrap().push(id.to_string());
        self.recipes
            .get(id)
            .cloned()
            .ok_or_else(|| anyhow!("recipe {} not found", id))
    }
}

/// Answers classifier explanations and min/max statistics, counting every
/// evaluation by function name
pub struct MockEngine {
    classes: Vec<Value>,
    statistics: Value,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockEngine {
    pub fn new(classes: Vec<Value>) -> Self {
        Self {
            classes,
            statistics: json!({}),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_statistics(mut self, statistics: Value) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn calls(&self, function: &str) -> usize {
        self.calls.lock().unwrap().get(function).copied().unwrap_or(0)
    }
}

#[async_trait]
impl ComputeEngine for MockEngine {
    async fn evaluate(&self, expr: &Expr) -> anyhow::Result<Value> {
        let function = expr.function().unwrap_or_default().to_string();
        *self.calls.lock().unwrap().entry(function.clone()).or_insert(0) += 1;
        match function.as_str() {
            "Classifier.explain" => Ok(json!({"classes": self.classes})),
            "Image.reduceRegion" => Ok(self.statistics.clone()),
            other => Err(anyhow!("cannot evaluate {}", other)),
        }
    }
}

pub struct Harness {
    pub images: Arc<MockImageSource>,
    pub recipes: Arc<MockRecipeLoader>,
    pub engine: Arc<MockEngine>,
    pub services: Services,
}

pub fn harness(images: MockImageSource, recipes: MockRecipeLoader, engine: MockEngine) -> Harness {
    init();
    let images = Arc::new(images);
    let recipes = Arc::new(recipes);
    let engine = Arc::new(engine);
    let services = Services::new(
        images.clone(),
        recipes.clone(),
        engine.clone(),
        RuntimeConfig::default(),
    )
    .unwrap();
    Harness {
        images,
        recipes,
        engine,
        services,
    }
}

pub fn legend(values: &[i64]) -> Value {
    json!({
        "entries": values
            .iter()
            .map(|value| json!({"value": value, "color": format!("#{:06X}", value * 1000)}))
            .collect::<Vec<_>>()
    })
}

/// A classification model over one Landsat input with ndvi computed from
/// the red and nir bands
pub fn model(classifier: Value, legend_values: &[i64], data_sets: Value) -> Value {
    model_over("landsat", classifier, legend_values, data_sets)
}

pub fn model_over(image_id: &str, classifier: Value, legend_values: &[i64], data_sets: Value) -> Value {
    json!({
        "inputImagery": {"images": [{
            "type": "RECIPE_REF",
            "id": image_id,
            "bandSetSpecs": [{"type": "IMAGE_BANDS", "included": ["blue", "green", "ndvi"]}]
        }]},
        "legend": legend(legend_values),
        "trainingData": {"dataSets": data_sets},
        "classifier": classifier
    })
}

pub fn recipe(model: Value) -> ClassificationRecipe {
    ClassificationRecipe::from_json(&model.to_string()).unwrap()
}

pub fn points(points: &[(f64, f64, i64)]) -> Value {
    json!({
        "type": "COLLECTED",
        "referenceData": points
            .iter()
            .map(|(x, y, class)| json!({"x": x, "y": y, "class": class}))
            .collect::<Vec<_>>()
    })
}

/// Ids of every asset loaded somewhere in `expr`
pub fn loaded_assets(expr: &Expr) -> Vec<String> {
    expr.find_invocations("Image.load")
        .into_iter()
        .filter_map(|e| e.argument("id").and_then(Expr::as_constant))
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect()
}

pub mod pixel;
