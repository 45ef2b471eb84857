//! Builds the feature image a classifier consumes from raw input imagery.

mod auxiliary;
pub mod indexes;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::expr::Image;

pub use auxiliary::{AuxiliaryKind, WATER_TRANSITIONS};
pub use indexes::{calculate_index, supported_indexes};

/// Algebraic combination applied to a pair of bands `(b1, b2)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PairwiseOperation {
    Ratio,
    NormalizedDifference,
    Difference,
    Distance,
    Angle,
}

impl PairwiseOperation {
    pub fn formula(&self) -> &'static str {
        match self {
            Self::Ratio => "b1 / b2",
            Self::NormalizedDifference => "(b1 - b2) / (b1 + b2)",
            Self::Difference => "b1 - b2",
            Self::Distance => "atan2(b1, b2) / PI",
            Self::Angle => "hypot(b1, b2)",
        }
    }

    /// Suffix appended to combined band names
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Ratio => "_ratio",
            Self::NormalizedDifference => "_normalized_difference",
            Self::Difference => "_difference",
            Self::Distance => "_distance",
            Self::Angle => "_angle",
        }
    }
}

/// How one group of covariate bands is derived from the input image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BandSetSpec {
    /// Input bands taken verbatim. Included names that are not bands of the
    /// input are computed as indexes from the remaining bands.
    ImageBands { included: Vec<String> },
    #[serde(alias = "PAIR_WISE_EXPRESSION")]
    PairwiseExpression {
        included: Vec<String>,
        operation: PairwiseOperation,
    },
    Indexes { included: Vec<String> },
}

impl BandSetSpec {
    fn bands(&self, image: &Image) -> Image {
        match self {
            Self::ImageBands { included } => {
                let derived: Vec<String> = included
                    .iter()
                    .filter(|name| !image.has_band(name))
                    .cloned()
                    .collect();
                let indexes = calculate_indexes(&image.select_excluding(included), &derived);
                image.select_existing(included).add_bands(&indexes, false)
            }
            Self::PairwiseExpression { included, operation } => image
                .select_existing(included)
                .combine_pairwise(operation.formula(), operation.suffix()),
            Self::Indexes { included } => calculate_indexes(image, included),
        }
    }
}

fn calculate_indexes(image: &Image, names: &[String]) -> Image {
    Image::cat(names.iter().map(|name| calculate_index(image, name)))
}

/// Builds the feature image: one band group per spec, in declaration order,
/// followed by the auxiliary layers. A pixel masked in every input band
/// stays masked in every output band.
pub fn add_covariates(image: &Image, specs: &[BandSetSpec], auxiliary: &[AuxiliaryKind]) -> Image {
    let groups: Vec<Image> = specs.iter().map(|spec| spec.bands(image)).collect();
    let covariates = Image::cat(groups).add_bands(&auxiliary::auxiliary_image(auxiliary), false);
    debug!(
        "Built {} covariate bands from {} band sets and {} auxiliary layers",
        covariates.band_names().len(),
        specs.len(),
        auxiliary.len()
    );
    covariates.update_mask(&image.mask().reduce_max())
}
