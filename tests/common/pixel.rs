//! Evaluates an image expression at a single pixel.
//!
//! Covers the operations the output and normalization graphs are built
//! from. `Image.classify` does not look at its input: it yields the
//! configured class (or regression value) and probability vector.

use std::collections::HashMap;

use serde_json::Value;
use terraclass::Expr;

#[derive(Debug, Clone, PartialEq)]
pub enum Pixel {
    Scalar(f64),
    Array(Vec<f64>),
}

impl Pixel {
    pub fn scalar(&self) -> f64 {
        match self {
            Pixel::Scalar(v) => *v,
            Pixel::Array(values) => panic!("expected a scalar, got {:?}", values),
        }
    }

    fn map(&self, f: impl Fn(f64) -> f64) -> Pixel {
        match self {
            Pixel::Scalar(v) => Pixel::Scalar(f(*v)),
            Pixel::Array(values) => Pixel::Array(values.iter().map(|v| f(*v)).collect()),
        }
    }
}

pub type Bands = Vec<(String, Pixel)>;

#[derive(Debug, Default)]
pub struct PixelContext {
    pub assets: HashMap<String, Vec<(String, f64)>>,
    pub class: f64,
    pub probabilities: Vec<f64>,
}

impl PixelContext {
    pub fn with_asset(mut self, id: &str, bands: &[(&str, f64)]) -> Self {
        self.assets.insert(
            id.to_string(),
            bands.iter().map(|(name, v)| (name.to_string(), *v)).collect(),
        );
        self
    }

    pub fn value(&self, expr: &Expr, band: &str) -> f64 {
        self.evaluate(expr)
            .into_iter()
            .find(|(name, _)| name == band)
            .unwrap_or_else(|| panic!("no band {}", band))
            .1
            .scalar()
    }

    pub fn evaluate(&self, expr: &Expr) -> Bands {
        let function = expr.function().unwrap_or_else(|| panic!("not an image: {:?}", expr));
        let arg = |name: &str| {
            expr.argument(name)
                .unwrap_or_else(|| panic!("{} has no argument {}", function, name))
        };
        let input = || self.evaluate(arg("input"));
        match function {
            "Image.load" => {
                let id = constant(arg("id")).as_str().unwrap().to_string();
                self.assets[&id]
                    .iter()
                    .map(|(name, v)| (name.clone(), Pixel::Scalar(*v)))
                    .collect()
            }
            "Image.constant" => match constant(arg("value")) {
                Value::Number(n) => vec![("constant".to_string(), Pixel::Scalar(n.as_f64().unwrap()))],
                _ => Vec::new(),
            },
            "Image.select" => {
                let bands = input();
                strings(arg("bandSelectors"))
                    .into_iter()
                    .map(|name| bands.iter().find(|(b, _)| *b == name).unwrap().clone())
                    .collect()
            }
            "Image.rename" => input()
                .into_iter()
                .zip(strings(arg("names")))
                .map(|((_, pixel), name)| (name, pixel))
                .collect(),
            "Image.cat" => match arg("images") {
                Expr::Array(images) => images.iter().flat_map(|i| self.evaluate(i)).collect(),
                other => panic!("unexpected images {:?}", other),
            },
            "Image.addBands" => {
                let other = self.evaluate(arg("srcImg"));
                let overwrite = constant(arg("overwrite")).as_bool().unwrap();
                let mut bands: Bands = input()
                    .into_iter()
                    .filter(|(name, _)| !overwrite || other.iter().all(|(o, _)| o != name))
                    .collect();
                bands.extend(other);
                bands
            }
            "Image.clip" | "Image.updateMask" => input(),
            "Element.copyProperties" => self.evaluate(arg("destination")),
            "Image.cast" => {
                let integer = constant(arg("pixelType")).as_str() == Some("uint8");
                input()
                    .into_iter()
                    .map(|(name, p)| (name, if integer { p.map(f64::floor) } else { p }))
                    .collect()
            }
            "Image.add" => self.binary(expr, |a, b| a + b),
            "Image.subtract" => self.binary(expr, |a, b| a - b),
            "Image.multiply" => self.binary(expr, |a, b| a * b),
            "Image.divide" => self.binary(expr, |a, b| a / b),
            "Image.eq" => self.binary(expr, |a, b| if a == b { 1.0 } else { 0.0 }),
            "Image.reduce" => {
                let max = input()
                    .iter()
                    .map(|(_, p)| p.scalar())
                    .fold(f64::NEG_INFINITY, f64::max);
                vec![("max".to_string(), Pixel::Scalar(max))]
            }
            "Image.arrayGet" => {
                let position = constant(arg("position")).as_u64().unwrap() as usize;
                input()
                    .into_iter()
                    .map(|(name, p)| match p {
                        Pixel::Array(values) => (name, Pixel::Scalar(values[position])),
                        other => panic!("arrayGet on {:?}", other),
                    })
                    .collect()
            }
            "Image.classify" => {
                let pixel = match output_mode(arg("classifier")) {
                    "MULTIPROBABILITY" => Pixel::Array(self.probabilities.clone()),
                    _ => Pixel::Scalar(self.class),
                };
                vec![("classification".to_string(), pixel)]
            }
            other => panic!("cannot evaluate {}", other),
        }
    }

    fn binary(&self, expr: &Expr, op: impl Fn(f64, f64) -> f64) -> Bands {
        let lhs = self.evaluate(expr.argument("input").unwrap());
        let rhs = expr.argument("image2").unwrap();
        match rhs.as_constant() {
            Some(value) => {
                let value = value.as_f64().unwrap();
                lhs.into_iter().map(|(name, p)| (name, p.map(|v| op(v, value)))).collect()
            }
            None => {
                let rhs = self.evaluate(rhs);
                lhs.into_iter()
                    .enumerate()
                    .map(|(i, (name, p))| {
                        let other = rhs[if rhs.len() == 1 { 0 } else { i }].1.scalar();
                        (name, p.map(|v| op(v, other)))
                    })
                    .collect()
            }
        }
    }
}

fn constant(expr: &Expr) -> &Value {
    expr.as_constant().unwrap_or_else(|| panic!("expected a constant, got {:?}", expr))
}

fn strings(expr: &Expr) -> Vec<String> {
    match expr {
        Expr::Array(items) => items
            .iter()
            .map(|item| constant(item).as_str().unwrap().to_string())
            .collect(),
        other => panic!("expected strings, got {:?}", other),
    }
}

fn output_mode(classifier: &Expr) -> &str {
    classifier
        .argument("outputMode")
        .and_then(Expr::as_constant)
        .and_then(Value::as_str)
        .unwrap_or("CLASSIFICATION")
}
