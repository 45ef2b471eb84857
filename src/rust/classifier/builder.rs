use log::info;

use super::classifier::{Classifier, OutputMode};
use super::config::{ClassifierConfig, ClassifierModel};
use crate::error::{ClassificationError, Result};
use crate::expr::Expr;
use crate::training::TrainingFeatureSet;

/// Name of the feature property holding the class label
pub const CLASS_PROPERTY: &str = "class";

/// A builder for constructing a Classifier with a fluent interface.
#[derive(Default, Debug)]
pub struct ClassifierBuilder {
    config: Option<ClassifierConfig>,
    training_data: Option<TrainingFeatureSet>,
    output_mode: OutputMode,
}

impl ClassifierBuilder {
    /// Creates a new empty ClassifierBuilder instance in CLASSIFICATION mode
    ///
    /// # Example
    /// ```
    /// use terraclass::ClassifierBuilder;
    ///
    /// let builder = ClassifierBuilder::new();
    /// ```
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the classifier family and its parameters
    pub fn with_config(mut self, config: &ClassifierConfig) -> Self {
        self.config = Some(config.clone());
        self
    }

    /// Sets the labeled samples to train on. Ignored by pre-trained
    /// decision trees.
    pub fn with_training_data(mut self, training_data: &TrainingFeatureSet) -> Self {
        self.training_data = Some(training_data.clone());
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    /// Builds the classifier expression
    ///
    /// # Returns
    /// * `Result<Classifier, ClassificationError>` - The classifier, or a
    ///   configuration error if:
    ///   - No configuration was set
    ///   - A trainable family has no training data
    ///   - A pre-trained decision tree is asked for anything but CLASSIFICATION
    ///   - The decision tree payload is malformed
    ///
    /// # Example
    /// ```
    /// # fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// use terraclass::{Classifier, ClassifierConfig, OutputMode, TrainingFeatureSet};
    ///
    /// let config: ClassifierConfig = serde_json::from_str(r#"{"type": "CART", "maxNodes": "8"}"#)?;
    /// let training = TrainingFeatureSet::new(Vec::new(), vec!["red".into(), "nir".into()]);
    /// let classifier = Classifier::builder()
    ///     .with_config(&config)
    ///     .with_training_data(&training)
    ///     .with_output_mode(OutputMode::Regression)
    ///     .build()?;
    /// assert_eq!(classifier.output_mode(), OutputMode::Regression);
    /// # Ok(())
    /// # }
    /// ```
    pub fn build(self) -> Result<Classifier> {
        let config = self
            .config
            .ok_or_else(|| ClassificationError::config("Classifier configuration must be set"))?;
        let classifier_type = config.classifier_type();

        match config.build()? {
            ClassifierModel::Trainable(untrained) => {
                let training = self.training_data.ok_or_else(|| {
                    ClassificationError::config(format!(
                        "{} classifier needs training data",
                        classifier_type
                    ))
                })?;
                let band_order = training.band_order().to_vec();
                let trained = Expr::invoke(
                    "Classifier.train",
                    [
                        ("classifier", untrained),
                        ("features", training.collection().expr().clone()),
                        ("classProperty", CLASS_PROPERTY.into()),
                        ("inputProperties", Expr::strings(&band_order)),
                    ],
                );
                let expr = Expr::invoke(
                    "Classifier.setOutputMode",
                    [
                        ("classifier", trained),
                        ("outputMode", self.output_mode.as_str().into()),
                    ],
                );
                info!(
                    "Built {} classifier in {} mode over {} bands",
                    classifier_type,
                    self.output_mode,
                    band_order.len()
                );
                Ok(Classifier {
                    expr,
                    output_mode: self.output_mode,
                    band_order: Some(band_order),
                    classifier_type,
                })
            }
            ClassifierModel::PreTrained(expr) => {
                if self.output_mode != OutputMode::Classification {
                    return Err(ClassificationError::config(format!(
                        "A pre-trained decision tree only supports CLASSIFICATION output, not {}",
                        self.output_mode
                    )));
                }
                info!("Using pre-trained {} classifier", classifier_type);
                Ok(Classifier {
                    expr,
                    output_mode: self.output_mode,
                    band_order: None,
                    classifier_type,
                })
            }
        }
    }
}
