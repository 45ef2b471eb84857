use std::fmt;

use serde::Serialize;

use super::config::ClassifierType;
use crate::error::Result;
use crate::expr::{Expr, Image};

/// What a classifier emits per pixel. A model is tied to its output mode;
/// running the same family in another mode means training it again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutputMode {
    #[default]
    Classification,
    Regression,
    Multiprobability,
}

impl OutputMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "CLASSIFICATION",
            Self::Regression => "REGRESSION",
            Self::Multiprobability => "MULTIPROBABILITY",
        }
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trained (or pre-trained) classifier expression.
///
/// # Thread Safety
///
/// The classifier only holds plain data and is `Send + Sync`; it can be
/// shared across tasks with `Arc`.
#[derive(Debug, Clone, PartialEq)]
pub struct Classifier {
    pub(crate) expr: Expr,
    pub(crate) output_mode: OutputMode,
    pub(crate) band_order: Option<Vec<String>>,
    pub(crate) classifier_type: ClassifierType,
}

// Compile-time verification of thread-safety
const _: () = {
    fn assert_send_sync<T: Send + Sync>() {}
    fn verify_thread_safety() {
        assert_send_sync::<Classifier>();
    }
};

impl Classifier {
    /// Creates a new ClassifierBuilder for fluent construction
    pub fn builder() -> super::builder::ClassifierBuilder {
        super::builder::ClassifierBuilder::new()
    }

    /// Returns information about the classifier's current state
    pub fn info(&self) -> super::ClassifierInfo {
        super::ClassifierInfo {
            classifier_type: self.classifier_type,
            output_mode: self.output_mode,
            band_order: self.band_order.clone(),
            pre_trained: self.band_order.is_none(),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn output_mode(&self) -> OutputMode {
        self.output_mode
    }

    /// Band names the classifier was trained against, if it was trained here
    pub fn band_order(&self) -> Option<&[String]> {
        self.band_order.as_deref()
    }

    /// Classifies `image`, producing a single `classification` band.
    ///
    /// A classifier trained on a feature set is applied to exactly the
    /// bands it was trained on, in training order. An image lacking any of
    /// them is a configuration error.
    pub fn apply(&self, image: &Image) -> Result<Image> {
        let input = match &self.band_order {
            Some(bands) => image.select(bands)?,
            None => image.clone(),
        };
        Ok(input.classify(&self.expr))
    }

    /// Resolved model metadata; its `classes` entry lists the class values
    /// the model actually learned.
    pub fn explain(&self) -> Expr {
        Expr::invoke("Classifier.explain", [("classifier", self.expr.clone())])
    }
}
