//! Item enrichment
//!
//! Turns a raw `ClassificationResult` plus its frame into a complete `Item`:
//! taxonomy lookup, a concrete subtype for recyclables, a synthetic weight,
//! the encoded still and a timestamp. All randomness comes from the
//! enricher's own RNG, so a seeded enricher replays the same items.

use crate::classifier::ClassificationResult;
use crate::error::{EnrichError, Error, Result};
use crate::frame::Frame;
use crate::taxonomy::{Category, Taxonomy};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Local};
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use smartbin_common::time::{format_item_timestamp, now};
use smartbin_common::Item;
use std::sync::Arc;

/// Specific objects a recyclable detection is reported as
pub const RECYCLABLE_SUBTYPES: [&str; 6] = [
    "Plastic Bottle",
    "Aluminum Can",
    "Glass Jar",
    "Cardboard Box",
    "Paper",
    "Metal Scrap",
];

/// Every class a recyclable item can end up in
pub const MATERIAL_CLASSES: [&str; 5] = ["Plastic", "Glass", "Metal", "Cardboard", "Paper"];

/// Material class for a recyclable subtype, by keyword; unknown names are Plastic
pub fn material_class(subtype: &str) -> &'static str {
    if subtype.contains("Plastic") {
        "Plastic"
    } else if subtype.contains("Glass") {
        "Glass"
    } else if subtype.contains("Metal") || subtype.contains("Aluminum") {
        "Metal"
    } else if subtype.contains("Cardboard") {
        "Cardboard"
    } else if subtype.contains("Paper") {
        "Paper"
    } else {
        "Plastic"
    }
}

/// Uniform range for synthetic weights, in kilograms
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightRange {
    pub min_kg: f64,
    pub max_kg: f64,
}

impl WeightRange {
    pub fn new(min_kg: f64, max_kg: f64) -> Result<Self> {
        if !(min_kg.is_finite() && max_kg.is_finite()) || min_kg < 0.0 || min_kg > max_kg {
            return Err(Error::Config(format!(
                "invalid weight range {}..{} kg",
                min_kg, max_kg
            )));
        }
        Ok(Self { min_kg, max_kg })
    }
}

impl Default for WeightRange {
    fn default() -> Self {
        Self {
            min_kg: 0.1,
            max_kg: 2.0,
        }
    }
}

/// Fixed attributes stamped on every item
#[derive(Debug, Clone)]
pub struct EnrichOptions {
    pub bin_id: String,
    pub weight: WeightRange,
    /// JPEG quality, 1-100
    pub jpeg_quality: u8,
}

impl Default for EnrichOptions {
    fn default() -> Self {
        Self {
            bin_id: "BIN-001".to_string(),
            weight: WeightRange::default(),
            jpeg_quality: 80,
        }
    }
}

/// Builds items from classifications
pub struct Enricher<R = StdRng> {
    taxonomy: Arc<Taxonomy>,
    options: EnrichOptions,
    rng: R,
}

impl Enricher<StdRng> {
    /// Enricher drawing from an entropy-seeded generator
    pub fn new(taxonomy: Arc<Taxonomy>, options: EnrichOptions) -> Self {
        Self::with_rng(taxonomy, options, StdRng::from_entropy())
    }

    /// Reproducible enricher for tests and replays
    pub fn seeded(taxonomy: Arc<Taxonomy>, options: EnrichOptions, seed: u64) -> Self {
        Self::with_rng(taxonomy, options, StdRng::seed_from_u64(seed))
    }
}

impl<R: Rng> Enricher<R> {
    pub fn with_rng(taxonomy: Arc<Taxonomy>, options: EnrichOptions, rng: R) -> Self {
        Self {
            taxonomy,
            options,
            rng,
        }
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    /// Enrich with the current wall-clock time
    pub fn enrich(
        &mut self,
        result: &ClassificationResult,
        frame: &Frame,
    ) -> std::result::Result<Item, EnrichError> {
        self.enrich_at(result, frame, &now())
    }

    /// Enrich with an explicit timestamp
    pub fn enrich_at(
        &mut self,
        result: &ClassificationResult,
        frame: &Frame,
        at: &DateTime<Local>,
    ) -> std::result::Result<Item, EnrichError> {
        let entry = self
            .taxonomy
            .lookup(result.class_id)
            .ok_or(EnrichError::UnknownClass(result.class_id))?;

        let (item_type, class) = match entry.category {
            Category::Recyclable => {
                let subtype = RECYCLABLE_SUBTYPES
                    .choose(&mut self.rng)
                    .copied()
                    .unwrap_or(RECYCLABLE_SUBTYPES[0]);
                (subtype.to_string(), material_class(subtype).to_string())
            }
            Category::Organic => (entry.default_type.clone(), entry.default_class.clone()),
        };
        let recyclable = entry.category.is_recyclable();

        let range = self.options.weight;
        let weight_kg = self.rng.gen_range(range.min_kg..=range.max_kg);

        Ok(Item {
            item_type,
            class,
            bin: self.options.bin_id.clone(),
            weight: format!("{:.2} kg", weight_kg),
            recyclable,
            image: encode_frame(frame, self.options.jpeg_quality)?,
            timestamp: format_item_timestamp(at),
        })
    }
}

/// JPEG-encode a frame and wrap it as base64 text
pub fn encode_frame(frame: &Frame, quality: u8) -> std::result::Result<String, EnrichError> {
    let mut jpeg = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100));
    encoder.encode(
        frame.image.as_raw(),
        frame.width(),
        frame.height(),
        ColorType::Rgb8,
    )?;
    Ok(STANDARD.encode(jpeg))
}
