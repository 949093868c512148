//! Target resolution: DPI plus logical page size.
//!
//! Page dimensions are expressed in hundredths of an inch relative to the
//! metric conversion constant [`UNITS_PER_INCH`], so a pixel edge is
//! `floor(dpi * dimension / 254.0)`. The default `1025 x 1500` page at
//! 300 DPI yields a `1211x1771` pixel bitmap.

use crate::error::RasterError;
use serde::{Deserialize, Serialize};

/// Divisor turning `dpi * logical_units` into pixels.
pub const UNITS_PER_INCH: f64 = 254.0;

/// Dots-per-inch and logical page dimensions used to size the bitmap.
///
/// Immutable once constructed through [`ResolutionSpec::new`]; the fields are
/// public for pattern-matching and serialisation, and every consumer
/// re-validates through [`ResolutionSpec::validate`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSpec {
    /// Rendering resolution handed to the engine as `-r<dpi>`.
    pub dpi: u32,
    /// Logical page width.
    pub width: f64,
    /// Logical page height.
    pub height: f64,
}

impl Default for ResolutionSpec {
    fn default() -> Self {
        Self {
            dpi: 300,
            width: 1025.0,
            height: 1500.0,
        }
    }
}

impl ResolutionSpec {
    /// Build a validated resolution.
    pub fn new(dpi: u32, width: f64, height: f64) -> Result<Self, RasterError> {
        let resolution = Self { dpi, width, height };
        resolution.validate()?;
        Ok(resolution)
    }

    /// Pixel width: `floor(dpi * width / 254.0)`.
    pub fn pixel_width(&self) -> u64 {
        to_pixels(self.dpi, self.width)
    }

    /// Pixel height: `floor(dpi * height / 254.0)`.
    pub fn pixel_height(&self) -> u64 {
        to_pixels(self.dpi, self.height)
    }

    /// The `WxH` geometry string passed to the engine after `-g`.
    pub fn geometry(&self) -> String {
        format!("{}x{}", self.pixel_width(), self.pixel_height())
    }

    /// Reject anything that would hand the engine an empty or negative page.
    pub fn validate(&self) -> Result<(), RasterError> {
        if self.dpi == 0 {
            return Err(RasterError::InvalidResolution(
                "DPI must be greater than 0".into(),
            ));
        }
        for (name, value) in [("width", self.width), ("height", self.height)] {
            if !value.is_finite() || value <= 0.0 {
                return Err(RasterError::InvalidResolution(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.pixel_width() == 0 || self.pixel_height() == 0 {
            return Err(RasterError::InvalidResolution(format!(
                "{} DPI over {}x{} units rounds down to an empty {} bitmap",
                self.dpi,
                self.width,
                self.height,
                self.geometry()
            )));
        }
        Ok(())
    }
}

fn to_pixels(dpi: u32, dimension: f64) -> u64 {
    let px = (f64::from(dpi) * dimension / UNITS_PER_INCH).floor();
    if px.is_finite() && px > 0.0 {
        px as u64
    } else {
        0
    }
}
