//! Output Band Engine.
//!
//! Turns a trained model into the requested output bands: discrete `class`,
//! continuous `regression`, per-class `probability_<value>` and
//! `class_probability`, the probability assigned to the predicted class.

use std::fmt;
use std::str::FromStr;

use log::{debug, info};
use serde::Serialize;
use serde_json::Value;

use crate::classifier::{to_int, Classifier, ClassifierConfig, ClassifierType, OutputMode};
use crate::error::{ClassificationError, Result};
use crate::expr::Image;
use crate::normalize::normalize;
use crate::recipe::Legend;
use crate::services::Services;
use crate::training::TrainingFeatureSet;

pub const CLASS_BAND: &str = "class";
pub const REGRESSION_BAND: &str = "regression";
pub const CLASS_PROBABILITY_BAND: &str = "class_probability";
pub const PROBABILITY_PREFIX: &str = "probability_";

/// Palette for percentage bands, from no confidence to full confidence
pub const PROBABILITY_PALETTE: [&str; 9] = [
    "#000000", "#480000", "#710101", "#BA0000", "#FF0000", "#FFA500", "#FFFF00", "#79C900",
    "#006400",
];

fn probability_band(value: i64) -> String {
    format!("{}{}", PROBABILITY_PREFIX, value)
}

/// A single output band name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputBand {
    Class,
    Regression,
    ClassProbability,
    Probability(i64),
}

impl FromStr for OutputBand {
    type Err = ClassificationError;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            CLASS_BAND => Ok(Self::Class),
            REGRESSION_BAND => Ok(Self::Regression),
            CLASS_PROBABILITY_BAND => Ok(Self::ClassProbability),
            _ => name
                .strip_prefix(PROBABILITY_PREFIX)
                .and_then(|value| value.parse().ok())
                .filter(|value| probability_band(*value) == name)
                .map(Self::Probability)
                .ok_or_else(|| ClassificationError::config(format!("Unknown output band '{}'", name))),
        }
    }
}

impl fmt::Display for OutputBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class => f.write_str(CLASS_BAND),
            Self::Regression => f.write_str(REGRESSION_BAND),
            Self::ClassProbability => f.write_str(CLASS_PROBABILITY_BAND),
            Self::Probability(value) => write!(f, "{}{}", PROBABILITY_PREFIX, value),
        }
    }
}

/// A validated set of requested output bands
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutputRequest {
    pub class: bool,
    pub regression: bool,
    pub class_probability: bool,
    /// Requested probability bands, in request order
    pub probabilities: Vec<i64>,
}

impl OutputRequest {
    /// Parses requested band names. Every `probability_<value>` must name
    /// a legend value.
    pub fn parse<S: AsRef<str>>(names: &[S], legend: &Legend) -> Result<Self> {
        let mut request = Self::default();
        for name in names {
            match name.as_ref().parse::<OutputBand>()? {
                OutputBand::Class => request.class = true,
                OutputBand::Regression => request.regression = true,
                OutputBand::ClassProbability => request.class_probability = true,
                OutputBand::Probability(value) => {
                    if !legend.contains(value) {
                        return Err(ClassificationError::config(format!(
                            "Band {} does not match any legend value",
                            probability_band(value)
                        )));
                    }
                    if !request.probabilities.contains(&value) {
                        request.probabilities.push(value);
                    }
                }
            }
        }
        Ok(request)
    }

    pub fn is_empty(&self) -> bool {
        !self.class && !self.regression && !self.class_probability && self.probabilities.is_empty()
    }

    /// Band names in assembly order
    pub fn band_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        if self.class {
            names.push(CLASS_BAND.to_string());
        }
        if self.class_probability {
            names.push(CLASS_PROBABILITY_BAND.to_string());
        }
        if self.regression {
            names.push(REGRESSION_BAND.to_string());
        }
        names.extend(self.probabilities.iter().copied().map(probability_band));
        names
    }
}

/// Every band a configuration can produce: `class`, then `regression` and
/// the probability bands when the family supports them.
pub fn output_bands(classifier_type: ClassifierType, legend: &Legend) -> Vec<String> {
    let mut bands = vec![CLASS_BAND.to_string()];
    if classifier_type.supports_regression() {
        bands.push(REGRESSION_BAND.to_string());
    }
    if classifier_type.supports_probability() {
        bands.push(CLASS_PROBABILITY_BAND.to_string());
        bands.extend(legend.sorted().into_iter().map(|entry| probability_band(entry.value)));
    }
    bands
}

/// Display parameters for one band of a classified image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VisParams {
    pub bands: String,
    pub min: i64,
    pub max: i64,
    pub palette: Vec<String>,
}

/// Picks visualization parameters for the first recognized category among
/// `selection`, in precedence class, regression, class_probability,
/// probability bands.
pub fn vis_params<S: AsRef<str>>(selection: &[S], legend: &Legend) -> Result<VisParams> {
    let names: Vec<&str> = selection.iter().map(|s| s.as_ref()).collect();
    let selected = |band: &str| names.contains(&band);
    let legend_params = |band: &str| -> Result<VisParams> {
        match (legend.min(), legend.max()) {
            (Some(min), Some(max)) => Ok(VisParams {
                bands: band.to_string(),
                min,
                max,
                palette: legend.palette(),
            }),
            _ => Err(ClassificationError::config("Legend must have at least one entry")),
        }
    };
    let probability_params = |band: &str| VisParams {
        bands: band.to_string(),
        min: 0,
        max: 100,
        palette: PROBABILITY_PALETTE.iter().map(|c| c.to_string()).collect(),
    };

    if selected(CLASS_BAND) {
        legend_params(CLASS_BAND)
    } else if selected(REGRESSION_BAND) {
        legend_params(REGRESSION_BAND)
    } else if selected(CLASS_PROBABILITY_BAND) {
        Ok(probability_params(CLASS_PROBABILITY_BAND))
    } else if let Some(band) = names.iter().find(|band| band.starts_with(PROBABILITY_PREFIX)) {
        Ok(probability_params(band))
    } else {
        Err(ClassificationError::config(format!(
            "Expected selected bands to contain class, regression, class_probability or probability_*: {:?}",
            names
        )))
    }
}

/// Computes output bands for one classifier configuration and legend.
///
/// A model is tied to its output mode, so each mode needed by a request
/// trains its own classifier. The per-class probability stack is computed
/// at most once per [`OutputBandEngine::compute`] call.
#[derive(Debug, Clone, Copy)]
pub struct OutputBandEngine<'a> {
    config: &'a ClassifierConfig,
    legend: &'a Legend,
    services: &'a Services,
}

impl<'a> OutputBandEngine<'a> {
    pub fn new(config: &'a ClassifierConfig, legend: &'a Legend, services: &'a Services) -> Self {
        Self {
            config,
            legend,
            services,
        }
    }

    /// Normalizes `image` when the classifier family works on scaled inputs
    pub async fn prepare(&self, image: &Image, scale: f64) -> Result<Image> {
        if self.config.classifier_type().needs_normalization() {
            normalize(image, self.services, scale).await
        } else {
            Ok(image.clone())
        }
    }

    pub async fn compute(
        &self,
        image: &Image,
        training: &TrainingFeatureSet,
        request: &OutputRequest,
    ) -> Result<Image> {
        let mut bands = Vec::new();
        let mut probabilities = None;

        if request.class || request.class_probability {
            let classification = self.classification(image, training)?;
            if request.class {
                bands.push(classification.clone());
            }
            if request.class_probability {
                let stack = self.probabilities(image, training).await?;
                bands.push(self.class_probability(&classification, &stack));
                probabilities = Some(stack);
            }
        }
        if request.regression {
            bands.push(self.regression(image, training)?);
        }
        if !request.probabilities.is_empty() {
            let stack = match probabilities {
                Some(stack) => stack,
                None => self.probabilities(image, training).await?,
            };
            let names: Vec<String> = request.probabilities.iter().copied().map(probability_band).collect();
            bands.push(stack.select(&names)?);
        }

        let output = Image::cat(bands);
        debug!("Computed output bands {:?}", output.band_names());
        Ok(output)
    }

    fn classifier(&self, training: &TrainingFeatureSet, mode: OutputMode) -> Result<Classifier> {
        Classifier::builder()
            .with_config(self.config)
            .with_training_data(training)
            .with_output_mode(mode)
            .build()
    }

    /// Discrete classes as an unsigned 8-bit `class` band
    pub fn classification(&self, image: &Image, training: &TrainingFeatureSet) -> Result<Image> {
        let classifier = self.classifier(training, OutputMode::Classification)?;
        Ok(classifier.apply(image)?.to_uint8().rename([CLASS_BAND]))
    }

    pub fn regression(&self, image: &Image, training: &TrainingFeatureSet) -> Result<Image> {
        let classifier = self.classifier(training, OutputMode::Regression)?;
        Ok(classifier.apply(image)?.to_float().rename([REGRESSION_BAND]))
    }

    /// One `probability_<value>` band per legend entry, in legend order,
    /// holding percentages. Legend values the model never learned get a
    /// constant zero band. Resolving the learned classes costs one engine
    /// round trip.
    pub async fn probabilities(&self, image: &Image, training: &TrainingFeatureSet) -> Result<Image> {
        let classifier = self.classifier(training, OutputMode::Multiprobability)?;
        let percentages = classifier.apply(image)?.multiply(100.0).to_uint8();
        let classes = self.resolved_classes(&classifier).await?;

        let geometry = image.geometry();
        let bands = self.legend.values().map(|value| {
            let name = probability_band(value);
            match classes.iter().position(|c| *c == value) {
                Some(index) => percentages.array_get(index, &name),
                None => {
                    info!("Class {} was not learned, filling {} with zero", value, name);
                    Image::constant(0.0).clip(&geometry).rename([name])
                }
            }
        });
        Ok(Image::cat(bands.collect::<Vec<_>>()))
    }

    /// Per pixel, the probability of the class that was predicted
    pub fn class_probability(&self, classification: &Image, probabilities: &Image) -> Image {
        let indicators = Image::cat(
            self.legend
                .values()
                .map(|value| classification.equals(value).rename([probability_band(value)]))
                .collect::<Vec<_>>(),
        );
        probabilities
            .multiply(&indicators)
            .reduce_max()
            .rename([CLASS_PROBABILITY_BAND])
    }

    async fn resolved_classes(&self, classifier: &Classifier) -> Result<Vec<i64>> {
        let explanation = self.services.evaluate(&classifier.explain()).await?;
        let classes = explanation
            .get("classes")
            .and_then(Value::as_array)
            .ok_or_else(|| ClassificationError::Engine(format!("Classifier explanation has no classes: {}", explanation)))?;
        classes
            .iter()
            .map(|class| {
                to_int(class).ok_or_else(|| ClassificationError::Engine(format!("Class {} is not a number", class)))
            })
            .collect()
    }
}
