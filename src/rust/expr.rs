//! Declarative expression graph handed to the remote computation engine.
//!
//! Nothing in this module performs I/O: every method returns a new node that
//! describes the computation. [`Image`] additionally tracks the ordered band
//! names its expression exposes, so questions like "does this image carry the
//! bands an index needs" are answered client-side.

use std::collections::BTreeMap;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ClassificationError, Result};

/// A node of the computation graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Expr {
    Constant(Value),
    Array(Vec<Expr>),
    Dictionary(BTreeMap<String, Expr>),
    Invocation {
        function: String,
        arguments: BTreeMap<String, Expr>,
    },
}

impl Expr {
    pub fn constant(value: impl Into<Value>) -> Self {
        Expr::Constant(value.into())
    }

    /// An explicitly unset argument; the engine applies its own default
    pub fn null() -> Self {
        Expr::Constant(Value::Null)
    }

    pub fn invoke<'a>(function: &str, arguments: impl IntoIterator<Item = (&'a str, Expr)>) -> Self {
        Expr::Invocation {
            function: function.to_string(),
            arguments: arguments
                .into_iter()
                .map(|(name, value)| (name.to_string(), value))
                .collect(),
        }
    }

    pub fn strings<S: AsRef<str>>(values: &[S]) -> Self {
        Expr::Array(values.iter().map(|v| Expr::constant(v.as_ref())).collect())
    }

    /// Name of the invoked function, if this node is an invocation
    pub fn function(&self) -> Option<&str> {
        match self {
            Expr::Invocation { function, .. } => Some(function),
            _ => None,
        }
    }

    pub fn argument(&self, name: &str) -> Option<&Expr> {
        match self {
            Expr::Invocation { arguments, .. } => arguments.get(name),
            _ => None,
        }
    }

    pub fn as_constant(&self) -> Option<&Value> {
        match self {
            Expr::Constant(value) => Some(value),
            _ => None,
        }
    }

    /// All invocations of `function` reachable from this node, depth first.
    pub fn find_invocations(&self, function: &str) -> Vec<&Expr> {
        let mut found = Vec::new();
        self.collect_invocations(function, &mut found);
        found
    }

    fn collect_invocations<'a>(&'a self, function: &str, found: &mut Vec<&'a Expr>) {
        match self {
            Expr::Constant(_) => {}
            Expr::Array(items) => items.iter().for_each(|e| e.collect_invocations(function, found)),
            Expr::Dictionary(entries) => entries
                .values()
                .for_each(|e| e.collect_invocations(function, found)),
            Expr::Invocation { function: name, arguments } => {
                if name == function {
                    found.push(self);
                }
                arguments
                    .values()
                    .for_each(|e| e.collect_invocations(function, found));
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<i64> for Expr {
    fn from(value: i64) -> Self {
        Expr::constant(value)
    }
}

impl From<&str> for Expr {
    fn from(value: &str) -> Self {
        Expr::constant(value)
    }
}

impl From<String> for Expr {
    fn from(value: String) -> Self {
        Expr::constant(value)
    }
}

impl From<Value> for Expr {
    fn from(value: Value) -> Self {
        Expr::Constant(value)
    }
}

impl From<&Image> for Expr {
    fn from(image: &Image) -> Self {
        image.expr.clone()
    }
}

/// A geometry expression, typically an image footprint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    expr: Expr,
}

impl Geometry {
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn point(x: f64, y: f64) -> Self {
        Self::from_expr(Expr::invoke(
            "GeometryConstructors.Point",
            [("coordinates", Expr::Array(vec![x.into(), y.into()]))],
        ))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// A single feature: a geometry plus properties
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Feature {
    expr: Expr,
}

impl Feature {
    pub fn new(geometry: &Geometry, properties: BTreeMap<String, Expr>) -> Self {
        Self {
            expr: Expr::invoke(
                "Feature",
                [
                    ("geometry", geometry.expr().clone()),
                    ("metadata", Expr::Dictionary(properties)),
                ],
            ),
        }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureCollection {
    expr: Expr,
}

impl FeatureCollection {
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr }
    }

    pub fn from_features(features: Vec<Feature>) -> Self {
        Self::from_expr(Expr::invoke(
            "Collection",
            [(
                "features",
                Expr::Array(features.into_iter().map(|f| f.expr).collect()),
            )],
        ))
    }

    /// Concatenates collections, preserving their order
    pub fn merge(collections: Vec<FeatureCollection>) -> Self {
        Self::from_expr(Expr::invoke(
            "Collection",
            [(
                "features",
                Expr::Array(collections.into_iter().map(|c| c.expr).collect()),
            )],
        ))
        .flatten()
    }

    pub fn flatten(&self) -> Self {
        Self::from_expr(Expr::invoke("Collection.flatten", [("collection", self.expr.clone())]))
    }

    pub fn filter_bounds(&self, geometry: &Geometry) -> Self {
        Self::from_expr(Expr::invoke(
            "Collection.filterBounds",
            [
                ("collection", self.expr.clone()),
                ("geometry", geometry.expr().clone()),
            ],
        ))
    }

    pub fn set(&self, key: &str, value: Expr) -> Self {
        Self::from_expr(Expr::invoke(
            "Element.set",
            [
                ("object", self.expr.clone()),
                ("key", key.into()),
                ("value", value),
            ],
        ))
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// An image expression together with the band names it exposes.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Image {
    expr: Expr,
    bands: Vec<String>,
}

impl Image {
    pub fn new(expr: Expr, bands: Vec<String>) -> Self {
        Self { expr, bands }
    }

    pub fn asset(id: &str, bands: &[&str]) -> Self {
        Self::new(
            Expr::invoke("Image.load", [("id", id.into())]),
            bands.iter().map(|b| b.to_string()).collect(),
        )
    }

    /// A bandless image
    pub fn empty() -> Self {
        Self::new(
            Expr::invoke("Image.constant", [("value", Expr::Array(vec![]))]),
            Vec::new(),
        )
    }

    pub fn constant(value: f64) -> Self {
        Self::new(
            Expr::invoke("Image.constant", [("value", value.into())]),
            vec!["constant".to_string()],
        )
    }

    /// Concatenates the bands of all images; bandless images are dropped.
    pub fn cat(images: impl IntoIterator<Item = Image>) -> Self {
        let images: Vec<Image> = images.into_iter().filter(|i| !i.is_empty()).collect();
        match images.len() {
            0 => Self::empty(),
            1 => images.into_iter().next().unwrap_or_else(Self::empty),
            _ => {
                let bands = images.iter().flat_map(|i| i.bands.clone()).collect();
                Self::new(
                    Expr::invoke(
                        "Image.cat",
                        [("images", Expr::Array(images.into_iter().map(|i| i.expr).collect()))],
                    ),
                    bands,
                )
            }
        }
    }

    /// Pixel longitude and latitude in degrees
    pub fn pixel_lon_lat() -> Self {
        Self::new(
            Expr::invoke("Image.pixelLonLat", []),
            vec!["longitude".to_string(), "latitude".to_string()],
        )
    }

    /// Elevation derivatives of a DEM
    pub fn terrain(elevation: &Image) -> Self {
        Self::new(
            Expr::invoke("Terrain", [("input", elevation.expr.clone())]),
            ["elevation", "slope", "aspect", "hillshade"]
                .iter()
                .map(|b| b.to_string())
                .collect(),
        )
    }

    /// Evaluates `formula` with the given named images in scope
    pub fn expression(formula: &str, bindings: &[(&str, &Image)], name: &str) -> Self {
        let map = bindings
            .iter()
            .map(|(key, image)| (key.to_string(), image.expr.clone()))
            .collect();
        Self::new(
            Expr::invoke(
                "Image.expression",
                [("expression", formula.into()), ("map", Expr::Dictionary(map))],
            ),
            vec!["constant".to_string()],
        )
        .rename([name])
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn band_names(&self) -> &[String] {
        &self.bands
    }

    pub fn has_band(&self, name: &str) -> bool {
        self.bands.iter().any(|b| b == name)
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    fn derive<'a>(
        &self,
        function: &str,
        arguments: impl IntoIterator<Item = (&'a str, Expr)>,
        bands: Vec<String>,
    ) -> Image {
        let mut args: BTreeMap<String, Expr> = arguments
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        args.insert("input".to_string(), self.expr.clone());
        Image::new(
            Expr::Invocation {
                function: function.to_string(),
                arguments: args,
            },
            bands,
        )
    }

    /// Selects bands by name; every name must exist
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Image> {
        let bands = to_strings(names);
        if let Some(missing) = bands.iter().find(|n| !self.has_band(n)) {
            return Err(ClassificationError::config(format!(
                "Image has no band '{}' (available: {:?})",
                missing, self.bands
            )));
        }
        Ok(self.derive("Image.select", [("bandSelectors", Expr::strings(&bands))], bands.clone()))
    }

    /// Selects the requested bands that exist, in requested order
    pub fn select_existing<S: AsRef<str>>(&self, names: &[S]) -> Image {
        let bands: Vec<String> = to_strings(names)
            .into_iter()
            .filter(|n| self.has_band(n))
            .collect();
        if bands.is_empty() {
            return Image::empty();
        }
        self.derive("Image.select", [("bandSelectors", Expr::strings(&bands))], bands.clone())
    }

    /// Selects every band not named in `excluded`
    pub fn select_excluding<S: AsRef<str>>(&self, excluded: &[S]) -> Image {
        let excluded = to_strings(excluded);
        let remaining: Vec<String> = self
            .bands
            .iter()
            .filter(|b| !excluded.contains(b))
            .cloned()
            .collect();
        self.select_existing(&remaining)
    }

    pub fn rename<S: Into<String>>(&self, names: impl IntoIterator<Item = S>) -> Image {
        let bands: Vec<String> = names.into_iter().map(Into::into).collect();
        self.derive("Image.rename", [("names", Expr::strings(&bands))], bands.clone())
    }

    /// Appends the bands of `other`. With `overwrite`, same-named bands of
    /// this image are dropped in favour of the ones from `other`.
    pub fn add_bands(&self, other: &Image, overwrite: bool) -> Image {
        if other.is_empty() {
            return self.clone();
        }
        if self.is_empty() {
            return other.clone();
        }
        let mut bands: Vec<String> = if overwrite {
            self.bands
                .iter()
                .filter(|b| !other.has_band(b))
                .cloned()
                .collect()
        } else {
            self.bands.clone()
        };
        bands.extend(other.bands.iter().cloned());
        self.derive(
            "Image.addBands",
            [
                ("srcImg", other.expr.clone()),
                ("overwrite", Expr::constant(overwrite)),
            ],
            bands,
        )
    }

    fn binary(&self, function: &str, rhs: Expr) -> Image {
        self.derive(function, [("image2", rhs)], self.bands.clone())
    }

    pub fn add(&self, rhs: impl Into<Expr>) -> Image {
        self.binary("Image.add", rhs.into())
    }

    pub fn subtract(&self, rhs: impl Into<Expr>) -> Image {
        self.binary("Image.subtract", rhs.into())
    }

    pub fn multiply(&self, rhs: impl Into<Expr>) -> Image {
        self.binary("Image.multiply", rhs.into())
    }

    pub fn divide(&self, rhs: impl Into<Expr>) -> Image {
        self.binary("Image.divide", rhs.into())
    }

    /// 1 where the pixel equals `value`, else 0
    pub fn equals(&self, value: impl Into<Expr>) -> Image {
        self.binary("Image.eq", value.into())
    }

    pub fn sin(&self) -> Image {
        self.derive("Image.sin", [], self.bands.clone())
    }

    pub fn cos(&self) -> Image {
        self.derive("Image.cos", [], self.bands.clone())
    }

    fn cast(&self, pixel_type: &str) -> Image {
        self.derive("Image.cast", [("pixelType", pixel_type.into())], self.bands.clone())
    }

    pub fn to_float(&self) -> Image {
        self.cast("float")
    }

    pub fn to_uint8(&self) -> Image {
        self.cast("uint8")
    }

    /// Per-pixel maximum across all bands, as a single band named `max`
    pub fn reduce_max(&self) -> Image {
        self.derive(
            "Image.reduce",
            [("reducer", Expr::invoke("Reducer.max", []))],
            vec!["max".to_string()],
        )
    }

    pub fn mask(&self) -> Image {
        self.derive("Image.mask", [], self.bands.clone())
    }

    pub fn update_mask(&self, mask: &Image) -> Image {
        self.derive("Image.updateMask", [("mask", mask.expr.clone())], self.bands.clone())
    }

    /// Replaces masked pixels with 0
    pub fn unmask(&self) -> Image {
        self.derive("Image.unmask", [], self.bands.clone())
    }

    pub fn clip(&self, geometry: &Geometry) -> Image {
        self.derive("Image.clip", [("geometry", geometry.expr().clone())], self.bands.clone())
    }

    pub fn copy_properties(&self, source: &Image) -> Image {
        Image::new(
            Expr::invoke(
                "Element.copyProperties",
                [
                    ("destination", self.expr.clone()),
                    ("source", source.expr.clone()),
                ],
            ),
            self.bands.clone(),
        )
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::from_expr(Expr::invoke("Image.geometry", [("feature", self.expr.clone())]))
    }

    /// Extracts slot `index` of an array-valued pixel as band `name`
    pub fn array_get(&self, index: usize, name: &str) -> Image {
        self.derive(
            "Image.arrayGet",
            [("position", Expr::constant(index as u64))],
            vec!["classification".to_string()],
        )
        .rename([name])
    }

    /// Constrained linear spectral unmixing against `endmembers`, one row per
    /// endmember, one column per input band.
    pub fn unmix(&self, endmembers: &Array2<f64>, sum_to_one: bool, non_negative: bool) -> Image {
        let rows = endmembers
            .rows()
            .into_iter()
            .map(|row| Expr::Array(row.iter().map(|&v| Expr::from(v)).collect()))
            .collect();
        let bands = (0..endmembers.nrows()).map(|i| format!("band_{}", i)).collect();
        self.derive(
            "Image.unmix",
            [
                ("endmembers", Expr::Array(rows)),
                ("sumToOne", Expr::constant(sum_to_one)),
                ("nonNegative", Expr::constant(non_negative)),
            ],
            bands,
        )
    }

    /// Combines every pair of bands `(b1, b2)` (in band order, `b1` first)
    /// with `formula`, naming each result `<b1>_<b2><suffix>`.
    pub fn combine_pairwise(&self, formula: &str, suffix: &str) -> Image {
        let mut bands = Vec::new();
        for (i, first) in self.bands.iter().enumerate() {
            for second in &self.bands[i + 1..] {
                bands.push(format!("{}_{}{}", first, second, suffix));
            }
        }
        self.derive(
            "Image.combinePairwise",
            [("expression", formula.into()), ("suffix", suffix.into())],
            bands,
        )
    }

    /// Applies a trained classifier; the result has a single band
    /// named `classification`.
    pub fn classify(&self, classifier: &Expr) -> Image {
        self.derive(
            "Image.classify",
            [
                ("classifier", classifier.clone()),
                ("outputName", "classification".into()),
            ],
            vec!["classification".to_string()],
        )
    }

    /// Approximate per-band min/max over the image footprint. Evaluates to
    /// a dictionary keyed `<band>_min` / `<band>_max`.
    pub fn reduce_region_min_max(&self, scale: f64, max_pixels: u64) -> Expr {
        Expr::invoke(
            "Image.reduceRegion",
            [
                ("image", self.expr.clone()),
                ("reducer", Expr::invoke("Reducer.minMax", [])),
                ("geometry", self.geometry().expr().clone()),
                ("scale", scale.into()),
                ("bestEffort", Expr::constant(true)),
                ("maxPixels", Expr::constant(max_pixels)),
            ],
        )
    }

    /// Samples the image at every feature of `collection`, keeping `properties`
    pub fn sample_regions(&self, collection: &FeatureCollection, properties: &[&str], scale: f64) -> FeatureCollection {
        FeatureCollection::from_expr(Expr::invoke(
            "Image.sampleRegions",
            [
                ("image", self.expr.clone()),
                ("collection", collection.expr().clone()),
                ("properties", Expr::strings(properties)),
                ("scale", scale.into()),
            ],
        ))
    }
}

fn to_strings<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    names.iter().map(|n| n.as_ref().to_string()).collect()
}
