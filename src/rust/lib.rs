//! Supervised classification of remotely sensed imagery, expressed as a
//! declarative computation graph for a remote engine.
//!
//! A [`ClassificationRecipe`] names the input imagery, a class legend,
//! training data sources and a classifier. A [`Classification`] session turns
//! it into a classified image with `class`, `regression` and probability
//! bands. The remote engine, the image source and the recipe store are
//! supplied through [`Services`].
//!
//! # Basic Usage
//!
//! ```rust
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use terraclass::{output_bands, vis_params, ClassificationRecipe};
//!
//! let recipe = ClassificationRecipe::from_json(r##"{
//!     "inputImagery": {"images": []},
//!     "legend": {"entries": [
//!         {"value": 1, "color": "#00FF00"},
//!         {"value": 2, "color": "#0000FF"}
//!     ]},
//!     "classifier": {"type": "RANDOM_FOREST", "numberOfTrees": "50"}
//! }"##)?;
//!
//! let bands = output_bands(recipe.classifier.classifier_type(), &recipe.legend);
//! assert_eq!(bands, ["class", "regression", "class_probability", "probability_1", "probability_2"]);
//!
//! let params = vis_params(&["class"], &recipe.legend)?;
//! assert_eq!((params.min, params.max), (1, 2));
//! # Ok(())
//! # }
//! ```
//!
//! # Sessions
//!
//! ```rust,no_run
//! # async fn run(services: terraclass::Services, recipe: terraclass::ClassificationRecipe) -> terraclass::Result<()> {
//! use terraclass::Classification;
//!
//! let classification = Classification::new(recipe, services)
//!     .with_selection(["class", "class_probability"]);
//! let image = classification.image().await?;
//! println!("{}", serde_json::to_string(image.expr()).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod classification;
pub mod classifier;
pub mod covariates;
mod error;
pub mod expr;
pub mod normalize;
pub mod outputs;
pub mod recipe;
mod runtime;
pub mod services;
pub mod training;

pub use classification::Classification;
pub use classifier::{
    to_float, to_int, Classifier, ClassifierBuilder, ClassifierConfig, ClassifierInfo,
    ClassifierModel, ClassifierType, OutputMode,
};
pub use covariates::{add_covariates, supported_indexes, AuxiliaryKind, BandSetSpec, PairwiseOperation};
pub use error::{ClassificationError, Result};
pub use expr::{Expr, Feature, FeatureCollection, Geometry, Image};
pub use outputs::{output_bands, vis_params, OutputBand, OutputBandEngine, OutputRequest, VisParams};
pub use recipe::{ClassificationRecipe, ImageRecipeRef, Legend, LegendEntry, RecipeDocument};
pub use runtime::{Limiter, LimiterConfig, RuntimeConfig};
pub use services::{ComputeEngine, ImageSource, RecipeLoader, Services};
pub use training::{
    RecipeTrainingData, ReferencePoint, TrainingDataAssembler, TrainingDataSource,
    TrainingFeatureSet,
};

pub fn init_logger() {
    env_logger::init();
}
