use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::expr::Image;

const ELEVATION_ASSET: &str = "USGS/SRTMGL1_003";
const SURFACE_WATER_ASSET: &str = "JRC/GSW1_0/GlobalSurfaceWater";

const SURFACE_WATER_BANDS: [&str; 7] = [
    "occurrence",
    "change_abs",
    "change_norm",
    "seasonality",
    "recurrence",
    "transition",
    "max_extent",
];

const WATER_STATISTICS: [&str; 5] = [
    "occurrence",
    "change_abs",
    "change_norm",
    "seasonality",
    "max_extent",
];

/// Transition classes, indexed by their code in the `transition` band
pub const WATER_TRANSITIONS: [&str; 11] = [
    "no_change",
    "permanent",
    "new_permanent",
    "lost_permanent",
    "seasonal",
    "new_seasonal",
    "lost_seasonal",
    "seasonal_to_permanent",
    "permanent_to_seasonal",
    "ephemeral_permanent",
    "ephemeral_seasonal",
];

/// Global layers that can be appended to the feature image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuxiliaryKind {
    Latitude,
    Terrain,
    Water,
}

impl AuxiliaryKind {
    pub fn image(&self) -> Image {
        match self {
            Self::Latitude => latitude(),
            Self::Terrain => terrain(),
            Self::Water => surface_water(),
        }
    }
}

pub(crate) fn auxiliary_image(kinds: &[AuxiliaryKind]) -> Image {
    Image::cat(kinds.iter().map(AuxiliaryKind::image))
}

fn latitude() -> Image {
    Image::pixel_lon_lat().select_existing(&["latitude"]).to_float()
}

fn terrain() -> Image {
    let topography = Image::terrain(&Image::asset(ELEVATION_ASSET, &["elevation"]));
    let aspect_rad = topography.select_existing(&["aspect"]).multiply(PI / 180.0);
    let eastness = aspect_rad.sin().rename(["eastness"]).to_float();
    let northness = aspect_rad.cos().rename(["northness"]).to_float();
    topography
        .select_existing(&["elevation", "slope", "aspect"])
        .add_bands(&eastness, false)
        .add_bands(&northness, false)
}

fn surface_water() -> Image {
    let water = Image::asset(SURFACE_WATER_ASSET, &SURFACE_WATER_BANDS).unmask();
    let transition = water.select_existing(&["transition"]);
    let transitions = Image::cat(
        WATER_TRANSITIONS
            .iter()
            .enumerate()
            .map(|(code, name)| transition.equals(code as i64).rename([format!("water_{}", name)])),
    );
    water
        .select_existing(&WATER_STATISTICS)
        .rename(WATER_STATISTICS.iter().map(|band| format!("water_{}", band)))
        .add_bands(&transitions, false)
}
