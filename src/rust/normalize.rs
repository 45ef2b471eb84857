//! Per-band min/max scaling for distance- and margin-based classifiers.

use log::{debug, info, warn};
use serde_json::{Map, Value};

use crate::error::{ClassificationError, Result};
use crate::expr::Image;
use crate::services::Services;

/// Scales every band of `image` into `[0, 1]` using approximate statistics
/// over the image footprint. Costs one engine round trip.
pub async fn normalize(image: &Image, services: &Services, scale: f64) -> Result<Image> {
    let request = image.reduce_region_min_max(scale, services.config().normalize_max_pixels);
    let statistics = services.evaluate(&request).await?;
    let statistics = statistics.as_object().ok_or_else(|| {
        ClassificationError::Engine(format!("Expected min/max dictionary, got {}", statistics))
    })?;
    info!("Normalizing {} bands at scale {}", image.band_names().len(), scale);
    normalize_with_statistics(image, statistics)
}

/// Builds the normalized image from a `<band>_min` / `<band>_max` dictionary.
/// A constant band is divided by its value; a band without statistics is
/// left as it is. Metadata and footprint of `image` are kept.
pub fn normalize_with_statistics(image: &Image, statistics: &Map<String, Value>) -> Result<Image> {
    let stat = |band: &str, suffix: &str| {
        statistics
            .get(&format!("{}_{}", band, suffix))
            .and_then(Value::as_f64)
    };
    let bands = image
        .band_names()
        .iter()
        .map(|name| -> Result<Image> {
            let band = image.select(&[name])?;
            Ok(match (stat(name, "min"), stat(name, "max")) {
                (Some(min), Some(max)) if min == max => {
                    debug!("Band {} is constant ({}), dividing by its value", name, max);
                    band.divide(max)
                }
                (Some(min), Some(max)) => band.subtract(min).divide(max - min),
                _ => {
                    warn!("No statistics for band {}, leaving it unscaled", name);
                    band
                }
            })
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Image::cat(bands)
        .clip(&image.geometry())
        .copy_properties(image))
}
