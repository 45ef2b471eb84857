mod builder;
#[allow(clippy::module_inception)]
mod classifier;
mod config;
mod utils;

pub use builder::{ClassifierBuilder, CLASS_PROPERTY};
pub use classifier::{Classifier, OutputMode};
pub use config::{
    CartParams, ClassifierConfig, ClassifierModel, ClassifierType, DecisionTreeParams,
    GradientTreeBoostParams, KernelType, MinimumDistanceParams, NaiveBayesParams,
    RandomForestParams, SvmParams, SvmType,
};
pub use utils::{to_float, to_int};

/// Information about a built classifier
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierInfo {
    pub classifier_type: ClassifierType,
    pub output_mode: OutputMode,
    /// Bands the classifier was trained against; `None` when pre-trained
    pub band_order: Option<Vec<String>>,
    pub pre_trained: bool,
}
