//! Named spectral indexes.
//!
//! Every index is a pure function of an image. Inputs are surface
//! reflectance scaled by 10000; [`calculate_index`] rescales before
//! evaluating. An index whose required bands are missing yields a bandless
//! image, so callers can concatenate results without checking first.

use lazy_static::lazy_static;
use log::debug;
use ndarray::{arr2, Array2};

use crate::expr::Image;

const REFLECTANCE_SCALE: f64 = 10000.0;

type IndexFn = fn(&Image) -> Image;

const INDEXES: &[(&str, IndexFn)] = &[
    ("ndvi", ndvi),
    ("ndmi", ndmi),
    ("ndwi", ndwi),
    ("mndwi", mndwi),
    ("evi", evi),
    ("evi2", evi2),
    ("savi", savi),
    ("nbr", nbr),
    ("ui", ui),
    ("ndbi", ndbi),
    ("ibi", ibi),
    ("nbi", nbi),
    ("ebbi", ebbi),
    ("bui", bui),
    ("ndfi", ndfi),
];

const NDFI_BANDS: [&str; 6] = ["blue", "green", "red", "nir", "swir1", "swir2"];
const NDFI_FRACTIONS: [&str; 5] = ["gv", "shade", "npv", "soil", "cloud"];

lazy_static! {
    /// Endmember spectra over NDFI_BANDS, one row per entry of NDFI_FRACTIONS
    static ref NDFI_ENDMEMBERS: Array2<f64> = arr2(&[
        [500.0, 900.0, 400.0, 6100.0, 3000.0, 1000.0],
        [0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
        [1400.0, 1700.0, 2200.0, 3000.0, 5500.0, 3000.0],
        [2000.0, 3000.0, 3400.0, 5800.0, 6000.0, 5800.0],
        [9000.0, 9600.0, 8000.0, 7800.0, 7200.0, 6500.0],
    ]);
}

/// Names of every supported index, in a stable order
pub fn supported_indexes() -> Vec<&'static str> {
    INDEXES.iter().map(|(name, _)| *name).collect()
}

pub fn is_supported(name: &str) -> bool {
    INDEXES.iter().any(|(index, _)| *index == name)
}

/// Computes the named index over `image`. Unknown names and images lacking
/// the required bands both yield an empty image.
pub fn calculate_index(image: &Image, name: &str) -> Image {
    match INDEXES.iter().find(|(index, _)| *index == name) {
        Some((_, index)) => index(&image.divide(REFLECTANCE_SCALE)),
        None => Image::empty(),
    }
}

fn has_bands(image: &Image, required: &[&str]) -> bool {
    required.iter().all(|band| image.has_band(band))
}

fn evaluate(image: &Image, required: &[&str], formula: &str, name: &str) -> Image {
    if !has_bands(image, required) {
        debug!("Skipping index '{}': image lacks one of {:?}", name, required);
        return Image::empty();
    }
    let selected: Vec<(&str, Image)> = required
        .iter()
        .filter_map(|band| image.select(&[band]).ok().map(|b| (*band, b)))
        .collect();
    let bindings: Vec<(&str, &Image)> = selected.iter().map(|(band, img)| (*band, img)).collect();
    Image::expression(formula, &bindings, name)
}

fn ndvi(image: &Image) -> Image {
    evaluate(image, &["red", "nir"], "(nir - red) / (nir + red)", "ndvi")
}

fn ndmi(image: &Image) -> Image {
    evaluate(image, &["nir", "swir1"], "(nir - swir1) / (nir + swir1)", "ndmi")
}

fn ndwi(image: &Image) -> Image {
    evaluate(image, &["green", "nir"], "(green - nir) / (green + nir)", "ndwi")
}

fn mndwi(image: &Image) -> Image {
    evaluate(image, &["green", "swir1"], "(green - swir1) / (green + swir1)", "mndwi")
}

fn evi(image: &Image) -> Image {
    evaluate(
        image,
        &["blue", "red", "nir"],
        "2.5 * ((nir - red) / (nir + 6 * red - 7.5 * blue + 1))",
        "evi",
    )
}

fn evi2(image: &Image) -> Image {
    evaluate(
        image,
        &["blue", "red", "nir"],
        "2.5 * (nir - red) / (nir + 2.4 * red + 1)",
        "evi2",
    )
}

fn savi(image: &Image) -> Image {
    evaluate(
        image,
        &["red", "nir"],
        "(nir - red) * (1 + 0.5)/(nir + red + 0.5)",
        "savi",
    )
}

fn nbr(image: &Image) -> Image {
    evaluate(image, &["nir", "swir2"], "(nir - swir2) / (nir + swir2)", "nbr")
}

fn ui(image: &Image) -> Image {
    evaluate(image, &["nir", "swir2"], "(swir2 - nir) / (swir2 + nir)", "ui")
}

fn ndbi(image: &Image) -> Image {
    evaluate(image, &["nir", "swir1"], "(swir1 - nir) / (swir1 + nir)", "ndbi")
}

/// Index-based built-up index, composed from ndbi, savi and mndwi
fn ibi(image: &Image) -> Image {
    let components = Image::cat(vec![ndbi(image), savi(image), mndwi(image)]);
    evaluate(
        &components,
        &["ndbi", "savi", "mndwi"],
        "(ndbi - (savi + mndwi) / 2) / (ndbi + (savi + mndwi) / 2)",
        "ibi",
    )
}

fn nbi(image: &Image) -> Image {
    evaluate(image, &["red", "nir", "swir1"], "red * swir1 / nir", "nbi")
}

fn ebbi(image: &Image) -> Image {
    evaluate(
        image,
        &["nir", "swir1", "swir2", "thermal"],
        "(swir1 - nir) / (10 * sqrt(swir1 + thermal))",
        "ebbi",
    )
}

fn bui(image: &Image) -> Image {
    evaluate(
        image,
        &["red", "swir1", "swir2"],
        "(red - swir1) / (red + swir1) + (swir2 - swir1) / (swir2 + swir1)",
        "bui",
    )
}

/// Normalized difference fraction index. Unmixes the six optical bands into
/// green vegetation, shade, non-photosynthetic vegetation, soil and cloud
/// fractions (summing to one, non-negative), then contrasts shade-normalized
/// green vegetation against npv + soil.
fn ndfi(image: &Image) -> Image {
    if !has_bands(image, &NDFI_BANDS) {
        debug!("Skipping index 'ndfi': image lacks one of {:?}", NDFI_BANDS);
        return Image::empty();
    }
    let unmixed = match image.select(&NDFI_BANDS) {
        Ok(bands) => bands.unmix(&NDFI_ENDMEMBERS, true, true).rename(NDFI_FRACTIONS),
        Err(_) => return Image::empty(),
    };
    Image::expression(
        "((i.gv / (1 - i.shade)) - (i.npv + i.soil)) / ((i.gv / (1 - i.shade)) + i.npv + i.soil)",
        &[("i", &unmixed)],
        "ndfi",
    )
    .to_float()
}
