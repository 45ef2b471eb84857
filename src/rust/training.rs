//! Training Data Assembler.
//!
//! Training samples come from two kinds of source: other classification
//! recipes, whose own training data is pulled in whole, and reference points
//! collected directly, which are sampled against the image being classified.
//! Recipe-derived segments always precede the sampled reference points.

use std::collections::BTreeMap;
use std::convert::TryFrom;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::classifier::CLASS_PROPERTY;
use crate::error::Result;
use crate::expr::{Expr, Feature, FeatureCollection, Geometry, Image};

const RECIPE_SOURCE: &str = "RECIPE";
const DIRECT_SOURCE: &str = "DIRECT";

/// Property carrying the band order on an assembled collection
pub const BAND_ORDER_PROPERTY: &str = "band_order";

/// A labeled location, in the recipe's coordinate reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub x: f64,
    pub y: f64,
    pub class: i64,
}

impl ReferencePoint {
    pub fn new(x: f64, y: f64, class: i64) -> Self {
        Self { x, y, class }
    }

    fn to_feature(&self) -> Feature {
        let mut properties = BTreeMap::new();
        properties.insert(CLASS_PROPERTY.to_string(), Expr::from(self.class));
        Feature::new(&Geometry::point(self.x, self.y), properties)
    }
}

/// Where training samples come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawDataSet", into = "RawDataSet")]
pub enum TrainingDataSource {
    /// Delegates to another classification recipe's training data
    Recipe { recipe_id: String },
    /// Reference points carried inline. `kind` is the stored source type
    /// (collected, uploaded, ...), kept for round-tripping.
    Direct { kind: String, points: Vec<ReferencePoint> },
}

impl TrainingDataSource {
    pub fn recipe(recipe_id: impl Into<String>) -> Self {
        Self::Recipe { recipe_id: recipe_id.into() }
    }

    pub fn direct(points: Vec<ReferencePoint>) -> Self {
        Self::Direct {
            kind: DIRECT_SOURCE.to_string(),
            points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDataSet {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    recipe: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    reference_data: Vec<ReferencePoint>,
}

impl TryFrom<RawDataSet> for TrainingDataSource {
    type Error = String;

    fn try_from(raw: RawDataSet) -> std::result::Result<Self, Self::Error> {
        if raw.kind == RECIPE_SOURCE {
            return raw
                .recipe
                .map(|recipe_id| TrainingDataSource::Recipe { recipe_id })
                .ok_or_else(|| "RECIPE training data must name a recipe".to_string());
        }
        Ok(TrainingDataSource::Direct {
            kind: raw.kind,
            points: raw.reference_data,
        })
    }
}

impl From<TrainingDataSource> for RawDataSet {
    fn from(source: TrainingDataSource) -> Self {
        match source {
            TrainingDataSource::Recipe { recipe_id } => RawDataSet {
                kind: RECIPE_SOURCE.to_string(),
                recipe: Some(recipe_id),
                reference_data: Vec::new(),
            },
            TrainingDataSource::Direct { kind, points } => RawDataSet {
                kind,
                recipe: None,
                reference_data: points,
            },
        }
    }
}

/// Labeled samples, in segment order, plus the band order they were
/// sampled with. A classifier trained on this set must be applied to
/// exactly these bands.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingFeatureSet {
    segments: Vec<FeatureCollection>,
    band_order: Vec<String>,
}

impl TrainingFeatureSet {
    pub fn new(segments: Vec<FeatureCollection>, band_order: Vec<String>) -> Self {
        Self { segments, band_order }
    }

    /// Constituent collections: one per RECIPE source in declaration
    /// order, then the sampled reference points
    pub fn segments(&self) -> &[FeatureCollection] {
        &self.segments
    }

    pub fn band_order(&self) -> &[String] {
        &self.band_order
    }

    /// The merged, flattened collection tagged with its band order
    pub fn collection(&self) -> FeatureCollection {
        FeatureCollection::merge(self.segments.clone())
            .set(BAND_ORDER_PROPERTY, Expr::strings(&self.band_order))
    }
}

/// Resolves the training data of another classification recipe
#[async_trait]
pub trait RecipeTrainingData: Send + Sync {
    async fn recipe_training_data(&self, recipe_id: &str) -> Result<FeatureCollection>;
}

/// Merges RECIPE and DIRECT training sources into one feature set
#[derive(Debug, Clone)]
pub struct TrainingDataAssembler<'a> {
    sources: &'a [TrainingDataSource],
    sample_scale: f64,
}

impl<'a> TrainingDataAssembler<'a> {
    pub fn new(sources: &'a [TrainingDataSource], sample_scale: f64) -> Self {
        Self { sources, sample_scale }
    }

    fn recipe_ids(&self) -> Vec<&'a str> {
        self.sources
            .iter()
            .filter_map(|source| match source {
                TrainingDataSource::Recipe { recipe_id } => Some(recipe_id.as_str()),
                TrainingDataSource::Direct { .. } => None,
            })
            .collect()
    }

    fn reference_points(&self) -> Vec<&'a ReferencePoint> {
        self.sources
            .iter()
            .flat_map(|source| match source {
                TrainingDataSource::Direct { points, .. } => points.as_slice(),
                TrainingDataSource::Recipe { .. } => &[][..],
            })
            .collect()
    }

    /// Every DIRECT reference point as one collection of point features
    pub fn reference_collection(&self) -> FeatureCollection {
        FeatureCollection::from_features(
            self.reference_points()
                .into_iter()
                .map(ReferencePoint::to_feature)
                .collect(),
        )
    }

    /// Samples `image` at the reference points that fall inside its footprint
    pub fn sample_reference_points(&self, image: &Image) -> FeatureCollection {
        image.sample_regions(
            &self.reference_collection().filter_bounds(&image.geometry()),
            &[CLASS_PROPERTY],
            self.sample_scale,
        )
    }

    /// Resolves every RECIPE source. All must succeed; results keep
    /// declaration order.
    pub async fn resolve_recipes<R>(&self, resolver: &R) -> Result<Vec<FeatureCollection>>
    where
        R: RecipeTrainingData + ?Sized,
    {
        let ids = self.recipe_ids();
        debug!("Resolving training data of {} referenced recipes", ids.len());
        try_join_all(ids.into_iter().map(|id| resolver.recipe_training_data(id))).await
    }

    /// Assembles the training set for `image`. The band order defaults to
    /// the image's own bands.
    pub async fn assemble<R>(
        &self,
        image: &Image,
        band_order: Option<Vec<String>>,
        resolver: &R,
    ) -> Result<TrainingFeatureSet>
    where
        R: RecipeTrainingData + ?Sized,
    {
        let mut segments = self.resolve_recipes(resolver).await?;
        let recipe_segments = segments.len();
        segments.push(self.sample_reference_points(image));

        let band_order = band_order.unwrap_or_else(|| image.band_names().to_vec());
        info!(
            "Assembled training data from {} recipes and {} reference points over {} bands",
            recipe_segments,
            self.reference_points().len(),
            band_order.len()
        );
        Ok(TrainingFeatureSet::new(segments, band_order))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ClassificationError;
    use serde_json::json;
    use std::sync::Mutex;

    struct Resolver {
        calls: Mutex<Vec<String>>,
        failing: Option<&'static str>,
    }

    impl Resolver {
        fn new(failing: Option<&'static str>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failing,
            }
        }
    }

    #[async_trait]
    impl RecipeTrainingData for Resolver {
        async fn recipe_training_data(&self, recipe_id: &str) -> Result<FeatureCollection> {
            self.calls.lock().unwrap().push(recipe_id.to_string());
            if self.failing == Some(recipe_id) {
                return Err(ClassificationError::upstream(
                    format!("recipe {}", recipe_id),
                    anyhow::anyhow!("not found"),
                ));
            }
            Ok(FeatureCollection::from_expr(Expr::invoke(
                "Collection.loadTable",
                [("tableId", recipe_id.into())],
            )))
        }
    }

    fn table_id(collection: &FeatureCollection) -> Option<&str> {
        collection
            .expr()
            .argument("tableId")
            .and_then(Expr::as_constant)
            .and_then(|v| v.as_str())
    }

    fn sources() -> Vec<TrainingDataSource> {
        serde_json::from_value(json!([
            {"type": "COLLECTED", "referenceData": [{"x": 1.0, "y": 2.0, "class": 1}]},
            {"type": "RECIPE", "recipe": "r1"},
            {"type": "CSV_UPLOAD", "referenceData": [{"x": 3.0, "y": 4.0, "class": 2}]},
            {"type": "RECIPE", "recipe": "r2"}
        ]))
        .unwrap()
    }

    #[test]
    fn test_parse_sources() {
        let sources = sources();
        assert_eq!(sources[1], TrainingDataSource::recipe("r1"));
        match &sources[2] {
            TrainingDataSource::Direct { kind, points } => {
                assert_eq!(kind, "CSV_UPLOAD");
                assert_eq!(points, &[ReferencePoint::new(3.0, 4.0, 2)]);
            }
            other => panic!("unexpected source {:?}", other),
        }
        let err = serde_json::from_value::<TrainingDataSource>(json!({"type": "RECIPE"}));
        assert!(err.is_err());
    }

    #[test]
    fn test_reference_points_become_class_features() {
        let sources = sources();
        let assembler = TrainingDataAssembler::new(&sources, 1.0);
        let collection = assembler.reference_collection();
        let features = collection.expr().find_invocations("Feature");
        assert_eq!(features.len(), 2);
        assert_eq!(
            features[1].argument("metadata"),
            Some(&Expr::Dictionary(
                [("class".to_string(), Expr::from(2i64))].into_iter().collect()
            ))
        );
    }

    #[tokio::test]
    async fn test_recipe_segments_precede_sampled_points() {
        let sources = sources();
        let image = Image::asset("img", &["red", "nir"]);
        let resolver = Resolver::new(None);
        let training = TrainingDataAssembler::new(&sources, 1.0)
            .assemble(&image, None, &resolver)
            .await
            .unwrap();

        let segments = training.segments();
        assert_eq!(segments.len(), 3);
        assert_eq!(table_id(&segments[0]), Some("r1"));
        assert_eq!(table_id(&segments[1]), Some("r2"));
        assert_eq!(segments[2].expr().function(), Some("Image.sampleRegions"));
        assert!(!segments[2].expr().find_invocations("Collection.filterBounds").is_empty());
        assert_eq!(training.band_order(), ["red", "nir"]);
    }

    #[tokio::test]
    async fn test_explicit_band_order() {
        let image = Image::asset("img", &["red", "nir"]);
        let training = TrainingDataAssembler::new(&[], 1.0)
            .assemble(&image, Some(vec!["nir".to_string()]), &Resolver::new(None))
            .await
            .unwrap();
        assert_eq!(training.band_order(), ["nir"]);
        let collection = training.collection();
        assert_eq!(
            collection.expr().argument("value"),
            Some(&Expr::strings(&["nir"]))
        );
    }

    #[tokio::test]
    async fn test_one_failing_recipe_fails_assembly() {
        let sources = sources();
        let image = Image::asset("img", &["red"]);
        let err = TrainingDataAssembler::new(&sources, 1.0)
            .assemble(&image, None, &Resolver::new(Some("r2")))
            .await
            .unwrap_err();
        assert!(matches!(err, ClassificationError::UpstreamResolution { .. }));
    }

    #[tokio::test]
    async fn test_no_sources_is_valid() {
        let image = Image::asset("img", &["red"]);
        let training = TrainingDataAssembler::new(&[], 1.0)
            .assemble(&image, None, &Resolver::new(None))
            .await
            .unwrap();
        assert_eq!(training.segments().len(), 1);
    }
}
