//! A classification session over one recipe.
//!
//! Nothing is cached between calls: every method rebuilds the expressions it
//! needs and issues its own round trips.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use log::info;

use crate::classifier::ClassifierConfig;
use crate::covariates::add_covariates;
use crate::error::{ClassificationError, Result};
use crate::expr::{FeatureCollection, Geometry, Image};
use crate::outputs::{output_bands, vis_params, OutputBandEngine, OutputRequest, VisParams};
use crate::recipe::{ClassificationRecipe, ImageRecipeRef, RecipeDocument};
use crate::services::Services;
use crate::training::{RecipeTrainingData, TrainingDataAssembler, TrainingFeatureSet};

#[derive(Debug, Clone)]
pub struct Classification {
    recipe: Arc<ClassificationRecipe>,
    id: Option<String>,
    selection: Vec<String>,
    services: Services,
    /// Ids of the recipes whose training data led to this session
    lineage: Vec<String>,
}

impl Classification {
    pub fn new(recipe: ClassificationRecipe, services: Services) -> Self {
        Self {
            recipe: Arc::new(recipe),
            id: None,
            selection: Vec::new(),
            services,
            lineage: Vec::new(),
        }
    }

    pub fn from_document(document: RecipeDocument, services: Services) -> Result<Self> {
        let id = document.id.clone();
        let mut classification = Self::new(document.into_classification()?, services);
        classification.id = id;
        Ok(classification)
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the output bands produced by [`Classification::image`]
    pub fn with_selection<S: Into<String>>(mut self, bands: impl IntoIterator<Item = S>) -> Self {
        self.selection = bands.into_iter().map(Into::into).collect();
        self
    }

    pub fn recipe(&self) -> &ClassificationRecipe {
        &self.recipe
    }

    pub fn selection(&self) -> &[String] {
        &self.selection
    }

    fn normalize_scale(&self) -> f64 {
        self.recipe.scale.unwrap_or(self.services.config().normalize_scale)
    }

    fn sample_scale(&self) -> f64 {
        self.recipe.scale.unwrap_or(self.services.config().sample_scale)
    }

    fn classifier_config(&self) -> &ClassifierConfig {
        &self.recipe.classifier
    }

    fn output_engine(&self) -> OutputBandEngine<'_> {
        OutputBandEngine::new(self.classifier_config(), &self.recipe.legend, &self.services)
    }

    fn single_input(&self) -> Result<&ImageRecipeRef> {
        match self.recipe.images() {
            [image] => Ok(image),
            [] => Err(ClassificationError::config("Recipe has no input imagery")),
            _ => Err(ClassificationError::config(
                "Recipe contains more than one input image, cannot classify it",
            )),
        }
    }

    /// Every input image with its covariates, concatenated and normalized
    /// when the classifier needs it. Input images are fetched concurrently.
    pub async fn image_to_classify(&self) -> Result<Image> {
        let auxiliary = &self.recipe.auxiliary_imagery;
        let images = try_join_all(self.recipe.images().iter().map(|input| async move {
            let image = self.services.image(input).await?;
            Ok::<_, ClassificationError>(add_covariates(&image, &input.band_set_specs, auxiliary))
        }))
        .await?;
        self.output_engine()
            .prepare(&Image::cat(images), self.normalize_scale())
            .await
    }

    /// Training data sampled against the image to classify. `band_order`
    /// defaults to that image's bands.
    pub async fn training_data(&self, band_order: Option<Vec<String>>) -> Result<TrainingFeatureSet> {
        let image = self.image_to_classify().await?;
        self.training_data_for(&image, band_order).await
    }

    async fn training_data_for(
        &self,
        image: &Image,
        band_order: Option<Vec<String>>,
    ) -> Result<TrainingFeatureSet> {
        TrainingDataAssembler::new(self.recipe.training_sources(), self.sample_scale())
            .assemble(image, band_order, self)
            .await
    }

    /// The classified image with the selected output bands
    pub async fn image(&self) -> Result<Image> {
        let request = OutputRequest::parse(&self.selection, &self.recipe.legend)?;
        let image = self.image_to_classify().await?;
        let training = self.training_data_for(&image, None).await?;
        info!(
            "Classifying {} bands with {} into {:?}",
            image.band_names().len(),
            self.classifier_config().classifier_type(),
            request.band_names()
        );
        self.output_engine().compute(&image, &training, &request).await
    }

    /// Every output band this recipe can produce
    pub async fn bands(&self) -> Result<Vec<String>> {
        Ok(output_bands(
            self.classifier_config().classifier_type(),
            &self.recipe.legend,
        ))
    }

    pub async fn vis_params(&self) -> Result<VisParams> {
        vis_params(&self.selection, &self.recipe.legend)
    }

    /// Footprint of the first input image
    pub async fn geometry(&self) -> Result<Geometry> {
        let first = self
            .recipe
            .images()
            .first()
            .ok_or_else(|| ClassificationError::config("Recipe has no input imagery"))?;
        self.services.geometry(first).await
    }

    /// Classifies an externally supplied image with previously assembled
    /// training data. Only valid for recipes with a single input image,
    /// whose covariates are added to `image`, replacing same-named bands.
    pub async fn classify_image<S: AsRef<str>>(
        &self,
        image: &Image,
        bands: &[S],
        training: &TrainingFeatureSet,
    ) -> Result<Image> {
        let input = self.single_input()?;
        let request = OutputRequest::parse(bands, &self.recipe.legend)?;
        let covariates = add_covariates(image, &input.band_set_specs, &self.recipe.auxiliary_imagery);
        let image = self
            .output_engine()
            .prepare(&image.add_bands(&covariates, true), self.normalize_scale())
            .await?;
        self.output_engine().compute(&image, training, &request).await
    }

    fn referenced_training_data(&self, recipe_id: &str) -> BoxFuture<'static, Result<FeatureCollection>> {
        let services = self.services.clone();
        let mut lineage = self.lineage.clone();
        lineage.extend(self.id.clone());
        let recipe_id = recipe_id.to_string();
        async move {
            if lineage.contains(&recipe_id) {
                return Err(ClassificationError::config(format!(
                    "Circular training data reference: {} -> {}",
                    lineage.join(" -> "),
                    recipe_id
                )));
            }
            let document = services.load_recipe(&recipe_id).await?;
            let mut referenced = Classification::from_document(document, services)?.with_id(recipe_id.as_str());
            referenced.lineage = lineage;
            let training = referenced.training_data(None).await?;
            Ok(training.collection())
        }
        .boxed()
    }
}

#[async_trait]
impl RecipeTrainingData for Classification {
    async fn recipe_training_data(&self, recipe_id: &str) -> Result<FeatureCollection> {
        self.referenced_training_data(recipe_id)
            .await
            .map_err(|e| ClassificationError::upstream(format!("training data of recipe {}", recipe_id), e))
    }
}
