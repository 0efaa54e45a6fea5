use std::path::Path;

use image::imageops::{self, FilterType};
use image::{DynamicImage, ImageReader, Rgb, RgbImage};
use serde::{Deserialize, Serialize};

use crate::dataloader::{ResolvedSample, Role};
use crate::error::{PrepError, Result};

/// Resampling kernel for the final resize.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ResizeFilter {
    Nearest,
    Triangle,
    /// Bicubic.
    #[default]
    CatmullRom,
    Gaussian,
    Lanczos3,
}

impl From<ResizeFilter> for FilterType {
    fn from(filter: ResizeFilter) -> Self {
        match filter {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Triangle => FilterType::Triangle,
            ResizeFilter::CatmullRom => FilterType::CatmullRom,
            ResizeFilter::Gaussian => FilterType::Gaussian,
            ResizeFilter::Lanczos3 => FilterType::Lanczos3,
        }
    }
}

/// Letterboxes images onto a square canvas and resizes them to a fixed side.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    resolution: u32,
    filter: ResizeFilter,
}

/// The four normalized images of one sample, held until all of them succeed.
#[derive(Debug, Clone)]
pub struct NormalizedSample {
    pub reference: RgbImage,
    pub mask: RgbImage,
    pub distorted: RgbImage,
    pub flawless: RgbImage,
}

impl NormalizedSample {
    pub fn image(&self, role: Role) -> &RgbImage {
        match role {
            Role::Reference => &self.reference,
            Role::Mask => &self.mask,
            Role::Distorted => &self.distorted,
            Role::Flawless => &self.flawless,
        }
    }
}

impl Normalizer {
    pub fn new(resolution: u32, filter: ResizeFilter) -> Result<Self> {
        if resolution == 0 {
            return Err(PrepError::InvalidConfig("resolution must be positive".to_string()));
        }
        Ok(Self { resolution, filter })
    }

    /// Offset at which a `width`x`height` image sits on its square canvas.
    /// Odd slack puts the extra pixel on the bottom/right.
    pub fn padding_offset(width: u32, height: u32) -> (u32, u32) {
        let side = width.max(height);
        ((side - width) / 2, (side - height) / 2)
    }

    /// Paste `image` centered on a `max(w, h)` square canvas filled with `color`.
    pub fn pad_to_square(image: &DynamicImage, color: Rgb<u8>) -> RgbImage {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let side = width.max(height);

        let mut canvas = RgbImage::from_pixel(side, side, color);
        let (x, y) = Self::padding_offset(width, height);
        imageops::replace(&mut canvas, &rgb, i64::from(x), i64::from(y));
        canvas
    }

    /// Letterbox then resize to `resolution x resolution`.
    pub fn normalize(&self, image: &DynamicImage, color: Rgb<u8>) -> RgbImage {
        let canvas = Self::pad_to_square(image, color);
        imageops::resize(&canvas, self.resolution, self.resolution, self.filter.into())
    }

    /// Decode the file at `path` and normalize it with the role's padding color.
    pub fn load(&self, path: &Path, role: Role) -> Result<RgbImage> {
        let image = open_image(path)?;
        if image.width() == 0 || image.height() == 0 {
            return Err(PrepError::InvalidDimension {
                path: path.to_path_buf(),
                width: image.width(),
                height: image.height(),
            });
        }
        Ok(self.normalize(&image, role.padding()))
    }

    pub fn normalize_sample(&self, sample: &ResolvedSample) -> Result<NormalizedSample> {
        Ok(NormalizedSample {
            reference: self.load(&sample.reference, Role::Reference)?,
            mask: self.load(&sample.mask, Role::Mask)?,
            distorted: self.load(&sample.distorted, Role::Distorted)?,
            flawless: self.load(&sample.flawless, Role::Flawless)?,
        })
    }
}

/// Open an image, sniffing the format from its content rather than its extension.
fn open_image(path: &Path) -> Result<DynamicImage> {
    let decode = |source| PrepError::Decode {
        path: path.to_path_buf(),
        source,
    };
    ImageReader::open(path)
        .map_err(|err| decode(image::ImageError::IoError(err)))?
        .with_guessed_format()
        .map_err(|err| decode(image::ImageError::IoError(err)))?
        .decode()
        .map_err(decode)
}
