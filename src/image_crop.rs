//! Ratio based cropping and JPEG re-compression of uploaded card images.
//!
//! Every failure here is per image: callers get `None` and move on to the
//! next attachment.

use image::codecs::jpeg::JpegEncoder;
use log::debug;

/// Extension of every image produced by this module.
pub const OUTPUT_EXTENSION: &str = "jpeg";

/// Crop rectangle expressed as fractions of the image width and height.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRegion {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl CropRegion {
    /// Converts the ratios to pixel bounds `(x1, y1, x2, y2)` clamped into
    /// `[0, width] x [0, height]`.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let scale = |ratio: f64, extent: u32| -> u32 {
            let extent_f = f64::from(extent);
            // NaN casts to 0
            (extent_f * ratio).floor().clamp(0.0, extent_f) as u32
        };
        (
            scale(self.x1, width),
            scale(self.y1, height),
            scale(self.x2, width),
            scale(self.y2, height),
        )
    }
}

/// The named crop policies applied to uploaded card photos.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPolicy {
    /// Card number band of a bank card, kept in color at full quality.
    BankCard,
    /// Bottom text band of an identity card, grayscale at low quality.
    IdCard,
}

impl CropPolicy {
    pub fn region(self) -> CropRegion {
        match self {
            CropPolicy::BankCard => CropRegion {
                x1: 0.05,
                y1: 0.40,
                x2: 0.95,
                y2: 0.75,
            },
            CropPolicy::IdCard => CropRegion {
                x1: 0.29,
                y1: 0.78,
                x2: 0.80,
                y2: 0.90,
            },
        }
    }

    pub fn quality(self) -> u8 {
        match self {
            CropPolicy::BankCard => 100,
            CropPolicy::IdCard => 40,
        }
    }

    pub fn color(self) -> bool {
        match self {
            CropPolicy::BankCard => true,
            CropPolicy::IdCard => false,
        }
    }

    /// Suffix used in output filenames, e.g. `bankcard` in `<phone>_bankcard.jpeg`.
    pub fn label(self) -> &'static str {
        match self {
            CropPolicy::BankCard => "bankcard",
            CropPolicy::IdCard => "idcard",
        }
    }

    pub fn apply(self, image_bytes: &[u8]) -> Option<CroppedImage> {
        crop_by_ratio(image_bytes, self.region(), self.quality(), self.color())
    }
}

/// A cropped and re-encoded image ready to be written out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CroppedImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

/// Decodes `image_bytes`, crops it to `region`, optionally converts it to
/// grayscale and encodes it as JPEG at `quality` (clamped to 1..=100).
///
/// Returns `None` when the image cannot be decoded, the clamped region is
/// empty, or encoding fails.
pub fn crop_by_ratio(
    image_bytes: &[u8],
    region: CropRegion,
    quality: u8,
    color: bool,
) -> Option<CroppedImage> {
    let img = match image::load_from_memory(image_bytes) {
        Ok(img) => img,
        Err(e) => {
            debug!("image decode failed ({} bytes): {}", image_bytes.len(), e);
            return None;
        }
    };

    let (x1, y1, x2, y2) = region.to_pixels(img.width(), img.height());
    if x2 <= x1 || y2 <= y1 {
        debug!(
            "empty crop region {:?} on {}x{} image",
            (x1, y1, x2, y2),
            img.width(),
            img.height()
        );
        return None;
    }

    let cropped = img.crop_imm(x1, y1, x2 - x1, y2 - y1);
    let quality = quality.clamp(1, 100);

    let mut bytes = Vec::new();
    let encoded = {
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality);
        if color {
            encoder.encode_image(&cropped.to_rgb8())
        } else {
            encoder.encode_image(&cropped.to_luma8())
        }
    };
    if let Err(e) = encoded {
        debug!("jpeg encode failed: {}", e);
        return None;
    }

    Some(CroppedImage {
        bytes,
        extension: OUTPUT_EXTENSION,
    })
}

/// Encodes a synthetic RGB test card as JPEG.
#[cfg(test)]
pub(crate) fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, 90)
        .encode_image(&img)
        .expect("encode sample jpeg");
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: CropRegion = CropRegion {
        x1: 0.0,
        y1: 0.0,
        x2: 1.0,
        y2: 1.0,
    };

    fn dimensions(bytes: &[u8]) -> (u32, u32) {
        let img = image::load_from_memory(bytes).expect("decode output");
        (img.width(), img.height())
    }

    #[test]
    fn full_region_keeps_dimensions() {
        let input = sample_jpeg(64, 40);
        let out = crop_by_ratio(&input, FULL, 100, true).expect("crop");
        assert_eq!(out.extension, "jpeg");
        assert_eq!(dimensions(&out.bytes), (64, 40));
    }

    fn expected_size(policy: CropPolicy, width: u32, height: u32) -> (u32, u32) {
        let (x1, y1, x2, y2) = policy.region().to_pixels(width, height);
        (x2 - x1, y2 - y1)
    }

    #[test]
    fn bankcard_policy_crops_band() {
        let out = CropPolicy::BankCard.apply(&sample_jpeg(200, 100)).expect("crop");
        assert_eq!(dimensions(&out.bytes), expected_size(CropPolicy::BankCard, 200, 100));
        assert_eq!(CropPolicy::BankCard.region().to_pixels(200, 100).3, 75);
    }

    #[test]
    fn idcard_policy_is_grayscale() {
        let out = CropPolicy::IdCard.apply(&sample_jpeg(200, 100)).expect("crop");
        let img = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(img.color(), image::ColorType::L8);
        assert_eq!(
            (img.width(), img.height()),
            expected_size(CropPolicy::IdCard, 200, 100)
        );
    }

    #[test]
    fn out_of_range_ratios_are_clamped() {
        let region = CropRegion {
            x1: -0.5,
            y1: -1.0,
            x2: 3.0,
            y2: 1.5,
        };
        assert_eq!(region.to_pixels(50, 30), (0, 0, 50, 30));
        let out = crop_by_ratio(&sample_jpeg(50, 30), region, 80, true).expect("crop");
        assert_eq!(dimensions(&out.bytes), (50, 30));
    }

    #[test]
    fn inverted_region_yields_none() {
        let region = CropRegion {
            x1: 0.9,
            y1: 0.8,
            x2: 0.1,
            y2: 0.2,
        };
        assert!(crop_by_ratio(&sample_jpeg(50, 30), region, 80, false).is_none());
        let nan = CropRegion {
            x1: f64::NAN,
            y1: 0.0,
            x2: f64::NAN,
            y2: 1.0,
        };
        assert!(crop_by_ratio(&sample_jpeg(50, 30), nan, 80, true).is_none());
    }

    #[test]
    fn garbage_input_yields_none() {
        assert!(crop_by_ratio(b"not an image", FULL, 100, true).is_none());
        assert!(crop_by_ratio(&[], FULL, 100, true).is_none());
    }

    fn encode_as(format: image::ImageFormat, width: u32, height: u32) -> Vec<u8> {
        let img = image::load_from_memory(&sample_jpeg(width, height))
            .unwrap()
            .to_rgb8();
        let mut bytes = std::io::Cursor::new(Vec::new());
        img.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn non_jpeg_uploads_are_cropped() {
        for format in [
            image::ImageFormat::Bmp,
            image::ImageFormat::Png,
            image::ImageFormat::Tiff,
        ] {
            let out = CropPolicy::BankCard
                .apply(&encode_as(format, 40, 20))
                .unwrap_or_else(|| panic!("{:?} upload not cropped", format));
            assert_eq!(out.extension, "jpeg");
            assert_eq!(
                dimensions(&out.bytes),
                expected_size(CropPolicy::BankCard, 40, 20)
            );
        }
    }

    #[test]
    fn quality_zero_is_clamped() {
        assert!(crop_by_ratio(&sample_jpeg(16, 16), FULL, 0, true).is_some());
    }
}
