use std::fmt;

use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::utils::{to_float, to_int};
use crate::error::{ClassificationError, Result};
use crate::expr::Expr;

/// Classifier configuration as stored in a recipe, tagged by `type`.
///
/// Numeric parameters are kept as raw JSON and coerced with
/// [`to_int`]/[`to_float`] when the classifier is built, so a malformed
/// number becomes an unset parameter rather than an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClassifierConfig {
    RandomForest(RandomForestParams),
    GradientTreeBoost(GradientTreeBoostParams),
    Cart(CartParams),
    NaiveBayes(NaiveBayesParams),
    Svm(SvmParams),
    MinimumDistance(MinimumDistanceParams),
    DecisionTree(DecisionTreeParams),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RandomForestParams {
    pub number_of_trees: Option<Value>,
    pub variables_per_split: Option<Value>,
    pub min_leaf_population: Option<Value>,
    pub bag_fraction: Option<Value>,
    pub max_nodes: Option<Value>,
    pub seed: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GradientTreeBoostParams {
    pub number_of_trees: Option<Value>,
    pub shrinkage: Option<Value>,
    pub sampling_rate: Option<Value>,
    pub max_nodes: Option<Value>,
    pub loss: Option<String>,
    pub seed: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CartParams {
    pub min_leaf_population: Option<Value>,
    pub max_nodes: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NaiveBayesParams {
    pub lambda: Option<Value>,
}

/// SVM types with dedicated parameters. Other names still reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SvmType {
    CSvc,
    NuSvc,
    OneClass,
    EpsilonSvr,
    NuSvr,
}

impl SvmType {
    const ALL: [SvmType; 5] = [Self::CSvc, Self::NuSvc, Self::OneClass, Self::EpsilonSvr, Self::NuSvr];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CSvc => "C_SVC",
            Self::NuSvc => "NU_SVC",
            Self::OneClass => "ONE_CLASS",
            Self::EpsilonSvr => "EPSILON_SVR",
            Self::NuSvr => "NU_SVR",
        }
    }
}

/// Kernels whose parameters are gated. Other names still reach the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelType {
    Linear,
    Poly,
    Rbf,
    Sigmoid,
}

impl KernelType {
    const ALL: [KernelType; 4] = [Self::Linear, Self::Poly, Self::Rbf, Self::Sigmoid];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "LINEAR",
            Self::Poly => "POLY",
            Self::Rbf => "RBF",
            Self::Sigmoid => "SIGMOID",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SvmParams {
    pub decision_procedure: Option<String>,
    pub svm_type: Option<String>,
    pub kernel_type: Option<String>,
    pub shrinking: Option<Value>,
    pub degree: Option<Value>,
    pub gamma: Option<Value>,
    pub coef0: Option<Value>,
    pub cost: Option<Value>,
    pub nu: Option<Value>,
    pub one_class: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MinimumDistanceParams {
    pub metric: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DecisionTreeParams {
    /// A JSON array of tree strings, or a single tree string
    pub decision_tree: Option<String>,
}

/// The classifier family, without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassifierType {
    RandomForest,
    GradientTreeBoost,
    Cart,
    NaiveBayes,
    Svm,
    MinimumDistance,
    DecisionTree,
}

impl ClassifierType {
    pub fn supports_regression(&self) -> bool {
        matches!(self, Self::RandomForest | Self::GradientTreeBoost | Self::Cart)
    }

    pub fn supports_probability(&self) -> bool {
        matches!(
            self,
            Self::RandomForest | Self::GradientTreeBoost | Self::Cart | Self::Svm | Self::NaiveBayes
        )
    }

    /// Families that expect every input band scaled to [0, 1]
    pub fn needs_normalization(&self) -> bool {
        matches!(self, Self::GradientTreeBoost | Self::MinimumDistance | Self::Svm)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RandomForest => "RANDOM_FOREST",
            Self::GradientTreeBoost => "GRADIENT_TREE_BOOST",
            Self::Cart => "CART",
            Self::NaiveBayes => "NAIVE_BAYES",
            Self::Svm => "SVM",
            Self::MinimumDistance => "MINIMUM_DISTANCE",
            Self::DecisionTree => "DECISION_TREE",
        }
    }
}

impl fmt::Display for ClassifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classifier ready to be trained, or one that was trained elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassifierModel {
    Trainable(Expr),
    PreTrained(Expr),
}

fn int_arg(value: &Option<Value>) -> Expr {
    value.as_ref().and_then(to_int).map(Expr::from).unwrap_or_else(Expr::null)
}

fn float_arg(value: &Option<Value>) -> Expr {
    value.as_ref().and_then(to_float).map(Expr::from).unwrap_or_else(Expr::null)
}

fn string_arg(value: &Option<String>) -> Expr {
    value.as_deref().map(Expr::from).unwrap_or_else(Expr::null)
}

fn raw_arg(value: &Option<Value>) -> Expr {
    value.clone().map(Expr::Constant).unwrap_or_else(Expr::null)
}

impl ClassifierConfig {
    pub fn classifier_type(&self) -> ClassifierType {
        match self {
            Self::RandomForest(_) => ClassifierType::RandomForest,
            Self::GradientTreeBoost(_) => ClassifierType::GradientTreeBoost,
            Self::Cart(_) => ClassifierType::Cart,
            Self::NaiveBayes(_) => ClassifierType::NaiveBayes,
            Self::Svm(_) => ClassifierType::Svm,
            Self::MinimumDistance(_) => ClassifierType::MinimumDistance,
            Self::DecisionTree(_) => ClassifierType::DecisionTree,
        }
    }

    /// Builds the untrained (or pre-trained) classifier expression
    pub fn build(&self) -> Result<ClassifierModel> {
        debug!("Building {} classifier", self.classifier_type());
        let expr = match self {
            Self::RandomForest(p) => Expr::invoke(
                "Classifier.smileRandomForest",
                [
                    ("numberOfTrees", int_arg(&p.number_of_trees)),
                    ("variablesPerSplit", int_arg(&p.variables_per_split)),
                    ("minLeafPopulation", int_arg(&p.min_leaf_population)),
                    ("bagFraction", float_arg(&p.bag_fraction)),
                    ("maxNodes", int_arg(&p.max_nodes)),
                    ("seed", int_arg(&p.seed)),
                ],
            ),
            Self::GradientTreeBoost(p) => Expr::invoke(
                "Classifier.smileGradientTreeBoost",
                [
                    ("numberOfTrees", int_arg(&p.number_of_trees)),
                    ("shrinkage", float_arg(&p.shrinkage)),
                    ("samplingRate", float_arg(&p.sampling_rate)),
                    ("maxNodes", int_arg(&p.max_nodes)),
                    ("loss", string_arg(&p.loss)),
                    ("seed", int_arg(&p.seed)),
                ],
            ),
            Self::Cart(p) => Expr::invoke(
                "Classifier.smileCart",
                [
                    ("minLeafPopulation", int_arg(&p.min_leaf_population)),
                    ("maxNodes", int_arg(&p.max_nodes)),
                ],
            ),
            Self::NaiveBayes(p) => Expr::invoke(
                "Classifier.smileNaiveBayes",
                [("lambda", float_arg(&p.lambda))],
            ),
            Self::Svm(p) => Self::svm(p),
            Self::MinimumDistance(p) => Expr::invoke(
                "Classifier.minimumDistance",
                [("metric", string_arg(&p.metric))],
            ),
            Self::DecisionTree(p) => return Self::decision_tree(p.decision_tree.as_deref()),
        };
        Ok(ClassifierModel::Trainable(expr))
    }

    /// Kernel and SVM-type specific parameters are only passed when they
    /// apply; otherwise they are explicitly null.
    fn svm(p: &SvmParams) -> Expr {
        let kernel = p.kernel_type.as_deref().and_then(KernelType::from_name);
        let svm_type = p.svm_type.as_deref().and_then(SvmType::from_name);
        let when = |applies: bool, arg: Expr| if applies { arg } else { Expr::null() };
        Expr::invoke(
            "Classifier.libsvm",
            [
                ("decisionProcedure", string_arg(&p.decision_procedure)),
                ("svmType", string_arg(&p.svm_type)),
                ("kernelType", string_arg(&p.kernel_type)),
                ("shrinking", raw_arg(&p.shrinking)),
                ("degree", when(kernel == Some(KernelType::Poly), int_arg(&p.degree))),
                (
                    "gamma",
                    when(
                        matches!(
                            kernel,
                            Some(KernelType::Poly | KernelType::Rbf | KernelType::Sigmoid)
                        ),
                        float_arg(&p.gamma),
                    ),
                ),
                (
                    "coef0",
                    when(
                        matches!(kernel, Some(KernelType::Poly | KernelType::Sigmoid)),
                        float_arg(&p.coef0),
                    ),
                ),
                ("cost", when(svm_type == Some(SvmType::CSvc), float_arg(&p.cost))),
                ("nu", when(svm_type == Some(SvmType::NuSvc), float_arg(&p.nu))),
                ("oneClass", when(svm_type == Some(SvmType::OneClass), int_arg(&p.one_class))),
            ],
        )
    }

    /// A JSON array becomes a tree ensemble; a JSON string or anything that
    /// is not JSON at all is taken as a single tree.
    fn decision_tree(raw: Option<&str>) -> Result<ClassifierModel> {
        let raw = raw.filter(|raw| !raw.trim().is_empty()).ok_or_else(|| {
            ClassificationError::config("Decision tree classifier needs a decisionTree payload")
        })?;
        let expr = match serde_json::from_str::<Value>(raw) {
            Ok(Value::Array(trees)) => Expr::invoke(
                "Classifier.decisionTreeEnsemble",
                [("treeStrings", Expr::Constant(Value::Array(trees)))],
            ),
            Ok(Value::String(tree)) => {
                Expr::invoke("Classifier.decisionTree", [("treeString", tree.into())])
            }
            Err(_) => Expr::invoke("Classifier.decisionTree", [("treeString", raw.into())]),
            Ok(_) => {
                return Err(ClassificationError::config(
                    "Decision tree must be a JSON array of decision trees or a single decision tree string",
                ))
            }
        };
        Ok(ClassifierModel::PreTrained(expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(value: Value) -> ClassifierConfig {
        serde_json::from_value(value).unwrap()
    }

    fn trainable(config: &ClassifierConfig) -> Expr {
        match config.build().unwrap() {
            ClassifierModel::Trainable(expr) => expr,
            other => panic!("expected trainable classifier, got {:?}", other),
        }
    }

    fn arg(expr: &Expr, name: &str) -> Value {
        expr.argument(name).and_then(Expr::as_constant).cloned().unwrap()
    }

    #[test]
    fn test_random_forest_coercion() {
        let expr = trainable(&config(json!({
            "type": "RANDOM_FOREST",
            "numberOfTrees": "25",
            "bagFraction": "0.5",
            "seed": "abc",
            "maxNodes": 10.7
        })));
        assert_eq!(expr.function(), Some("Classifier.smileRandomForest"));
        assert_eq!(arg(&expr, "numberOfTrees"), json!(25));
        assert_eq!(arg(&expr, "bagFraction"), json!(0.5));
        assert_eq!(arg(&expr, "maxNodes"), json!(10));
        assert_eq!(arg(&expr, "seed"), Value::Null);
        assert_eq!(arg(&expr, "variablesPerSplit"), Value::Null);
    }

    #[test]
    fn test_svm_linear_has_no_kernel_parameters() {
        let expr = trainable(&config(json!({
            "type": "SVM",
            "svmType": "C_SVC",
            "kernelType": "LINEAR",
            "degree": 3,
            "gamma": 0.5,
            "coef0": 1,
            "cost": "10"
        })));
        assert_eq!(arg(&expr, "degree"), Value::Null);
        assert_eq!(arg(&expr, "gamma"), Value::Null);
        assert_eq!(arg(&expr, "coef0"), Value::Null);
        assert_eq!(arg(&expr, "cost"), json!(10.0));
        assert_eq!(arg(&expr, "nu"), Value::Null);
        assert_eq!(arg(&expr, "oneClass"), Value::Null);
    }

    #[test]
    fn test_svm_poly_carries_kernel_parameters() {
        let expr = trainable(&config(json!({
            "type": "SVM",
            "svmType": "NU_SVC",
            "kernelType": "POLY",
            "degree": "3",
            "gamma": 0.5,
            "coef0": 1,
            "nu": 0.2,
            "cost": 10
        })));
        assert_eq!(arg(&expr, "degree"), json!(3));
        assert_eq!(arg(&expr, "gamma"), json!(0.5));
        assert_eq!(arg(&expr, "coef0"), json!(1.0));
        assert_eq!(arg(&expr, "nu"), json!(0.2));
        assert_eq!(arg(&expr, "cost"), Value::Null);
        assert_eq!(arg(&expr, "kernelType"), json!("POLY"));
    }

    #[test]
    fn test_svm_names_outside_the_gating_table_pass_through() {
        let expr = trainable(&config(json!({
            "type": "SVM",
            "svmType": "EPSILON_SVR_EXPERIMENTAL",
            "kernelType": "PRECOMPUTED",
            "degree": 3,
            "gamma": 0.5,
            "cost": 1
        })));
        assert_eq!(arg(&expr, "svmType"), json!("EPSILON_SVR_EXPERIMENTAL"));
        assert_eq!(arg(&expr, "kernelType"), json!("PRECOMPUTED"));
        assert_eq!(arg(&expr, "degree"), Value::Null);
        assert_eq!(arg(&expr, "gamma"), Value::Null);
        assert_eq!(arg(&expr, "cost"), Value::Null);
        assert_eq!(SvmType::from_name("NU_SVC"), Some(SvmType::NuSvc));
        assert_eq!(KernelType::from_name("rbf"), None);
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result = serde_json::from_value::<ClassifierConfig>(json!({"type": "NEURAL_NET"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_decision_tree_variants() {
        let ensemble = config(json!({"type": "DECISION_TREE", "decisionTree": "[\"1) root\", \"1) root\"]"}));
        match ensemble.build().unwrap() {
            ClassifierModel::PreTrained(expr) => {
                assert_eq!(expr.function(), Some("Classifier.decisionTreeEnsemble"))
            }
            other => panic!("unexpected {:?}", other),
        }

        let single = config(json!({"type": "DECISION_TREE", "decisionTree": "1) root 9999 9999 (0.5)"}));
        match single.build().unwrap() {
            ClassifierModel::PreTrained(expr) => {
                assert_eq!(expr.function(), Some("Classifier.decisionTree"));
                assert_eq!(arg(&expr, "treeString"), json!("1) root 9999 9999 (0.5)"));
            }
            other => panic!("unexpected {:?}", other),
        }

        let quoted = config(json!({"type": "DECISION_TREE", "decisionTree": "\"1) root\""}));
        match quoted.build().unwrap() {
            ClassifierModel::PreTrained(expr) => assert_eq!(arg(&expr, "treeString"), json!("1) root")),
            other => panic!("unexpected {:?}", other),
        }

        let object = config(json!({"type": "DECISION_TREE", "decisionTree": "{\"a\": 1}"}));
        assert!(object.build().unwrap_err().is_configuration());

        let missing = config(json!({"type": "DECISION_TREE"}));
        assert!(missing.build().unwrap_err().is_configuration());
        let empty = config(json!({"type": "DECISION_TREE", "decisionTree": "  "}));
        assert!(empty.build().unwrap_err().is_configuration());
    }

    #[test]
    fn test_capabilities() {
        use ClassifierType::*;
        let regression: Vec<_> = [RandomForest, GradientTreeBoost, Cart, NaiveBayes, Svm, MinimumDistance, DecisionTree]
            .into_iter()
            .filter(ClassifierType::supports_regression)
            .collect();
        assert_eq!(regression, [RandomForest, GradientTreeBoost, Cart]);
        assert!(Svm.supports_probability());
        assert!(NaiveBayes.supports_probability());
        assert!(!MinimumDistance.supports_probability());
        assert!(!DecisionTree.supports_probability());
        assert!(Svm.needs_normalization());
        assert!(!RandomForest.needs_normalization());
    }
}
