use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::classifier::ClassifierConfig;
use crate::covariates::{AuxiliaryKind, BandSetSpec};
use crate::error::{ClassificationError, Result};
use crate::training::TrainingDataSource;

const CLASSIFICATION_TYPE: &str = "CLASSIFICATION";

/// A stored recipe as returned by the recipe loader
#[derive(Debug, Clone, Deserialize)]
pub struct RecipeDocument {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub model: Value,
}

impl RecipeDocument {
    pub fn from_value(value: Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }

    /// Interprets the document as a classification recipe
    pub fn into_classification(self) -> Result<ClassificationRecipe> {
        if let Some(kind) = self.kind.as_deref().filter(|k| *k != CLASSIFICATION_TYPE) {
            return Err(ClassificationError::config(format!(
                "Recipe {} is a {} recipe, not a classification",
                self.id.as_deref().unwrap_or("<unnamed>"),
                kind
            )));
        }
        let recipe: ClassificationRecipe = serde_json::from_value(self.model)?;
        recipe.validate()?;
        Ok(recipe)
    }
}

/// Reference to an input image recipe, plus how to derive covariates from it.
/// Everything other than the id and band sets is passed to the image source
/// untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecipeRef {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    pub id: String,
    #[serde(default)]
    pub band_set_specs: Vec<BandSetSpec>,
    #[serde(flatten)]
    pub options: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegendEntry {
    pub value: i64,
    pub color: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Ordered class legend. Values are unique.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Legend {
    pub entries: Vec<LegendEntry>,
}

impl Legend {
    pub fn new(entries: Vec<LegendEntry>) -> Self {
        Self { entries }
    }

    pub fn validate(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(ClassificationError::config("Legend must have at least one entry"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.entries.iter().find(|e| !seen.insert(e.value)) {
            return Err(ClassificationError::config(format!(
                "Legend value {} appears more than once",
                duplicate.value
            )));
        }
        Ok(())
    }

    pub fn values(&self) -> impl Iterator<Item = i64> + '_ {
        self.entries.iter().map(|e| e.value)
    }

    pub fn contains(&self, value: i64) -> bool {
        self.entries.iter().any(|e| e.value == value)
    }

    /// Entries sorted ascending by value
    pub fn sorted(&self) -> Vec<&LegendEntry> {
        let mut sorted: Vec<&LegendEntry> = self.entries.iter().collect();
        sorted.sort_by_key(|e| e.value);
        sorted
    }

    pub fn min(&self) -> Option<i64> {
        self.values().min()
    }

    pub fn max(&self) -> Option<i64> {
        self.values().max()
    }

    /// Palette in ascending value order
    pub fn palette(&self) -> Vec<String> {
        self.sorted().into_iter().map(|e| e.color.clone()).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputImagery {
    #[serde(default)]
    pub images: Vec<ImageRecipeRef>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingData {
    #[serde(default)]
    pub data_sets: Vec<TrainingDataSource>,
}

/// Everything needed to classify: inputs, legend, training data and classifier.
/// Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationRecipe {
    #[serde(default)]
    pub input_imagery: InputImagery,
    pub legend: Legend,
    #[serde(default)]
    pub training_data: TrainingData,
    #[serde(default)]
    pub auxiliary_imagery: Vec<AuxiliaryKind>,
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub scale: Option<f64>,
}

impl ClassificationRecipe {
    /// Parses either a full recipe document (`{"model": ...}`) or a bare model
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        if value.get("model").is_some() {
            return RecipeDocument::from_value(value)?.into_classification();
        }
        let recipe: ClassificationRecipe = serde_json::from_value(value)?;
        recipe.validate()?;
        Ok(recipe)
    }

    pub fn validate(&self) -> Result<()> {
        self.legend.validate()
    }

    pub fn images(&self) -> &[ImageRecipeRef] {
        &self.input_imagery.images
    }

    pub fn training_sources(&self) -> &[TrainingDataSource] {
        &self.training_data.data_sets
    }
}
