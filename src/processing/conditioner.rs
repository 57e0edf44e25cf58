use crate::models::ConditionParams;
use crate::utils::DocumentError;
use image::imageops;
use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use imageproc::distance_transform::Norm;
use imageproc::filter::median_filter;
use imageproc::morphology::{dilate, open};

/// Block size used by the recombination pass. Independent of the threshold
/// block size: the sigmoid scaling benefits from a tighter local window.
const COMBINE_BLOCK_SIZE: u32 = 20;

/// Guard against division by zero on flat intensity ranges.
const RANGE_EPSILON: f64 = 1e-5;

/// Adaptive-binarization pipeline that conditions a photograph for OCR.
///
/// Three stages: gamma correction, overlapping-block adaptive median
/// thresholding (producing a background/ink mask), and a recombination pass
/// that keeps smooth grayscale ink strength instead of a hard cut. The
/// pipeline is pure; identical input and parameters produce identical
/// output.
pub struct ImageConditioner;

impl ImageConditioner {
    /// Runs the full conditioning pipeline on a color image.
    ///
    /// The mask is computed from the gamma-corrected image, but the
    /// recombination reads intensities from the untouched original.
    pub fn condition(
        image: &RgbImage,
        params: &ConditionParams,
    ) -> Result<GrayImage, DocumentError> {
        let corrected = Self::adjust_gamma(image, params.gamma)?;
        let mask = Self::threshold_mask(&corrected, params.block_size, params.delta)?;
        Ok(Self::recombine(image, &mask))
    }

    /// Gamma correction via a 256-entry lookup table applied per channel.
    pub fn adjust_gamma(image: &RgbImage, gamma: f64) -> Result<RgbImage, DocumentError> {
        if !gamma.is_finite() {
            return Err(DocumentError::InvalidArgumentType(
                "gamma must be a finite number".to_string(),
            ));
        }
        if gamma <= 0.0 {
            return Err(DocumentError::InvalidArgumentValue(
                "gamma must be greater than 0".to_string(),
            ));
        }

        let inv_gamma = 1.0 / gamma;
        let mut table = [0u8; 256];
        for (i, entry) in table.iter_mut().enumerate() {
            *entry = ((i as f64 / 255.0).powf(inv_gamma) * 255.0).round() as u8;
        }

        let mut out = image.clone();
        for pixel in out.pixels_mut() {
            for channel in pixel.0.iter_mut() {
                *channel = table[*channel as usize];
            }
        }
        Ok(out)
    }

    /// Produces the background/ink mask: grayscale, median-blur, invert,
    /// then per-block median thresholding followed by a 3x3 opening.
    ///
    /// Values are strictly {0, 255}: 255 marks background, 0 marks ink.
    pub fn threshold_mask(
        image: &RgbImage,
        block_size: u32,
        delta: f64,
    ) -> Result<GrayImage, DocumentError> {
        if !delta.is_finite() {
            return Err(DocumentError::InvalidArgumentType(
                "delta must be a finite number".to_string(),
            ));
        }
        if block_size == 0 {
            return Err(DocumentError::InvalidArgumentValue(
                "block_size must be greater than 0".to_string(),
            ));
        }
        if delta <= 0.0 {
            return Err(DocumentError::InvalidArgumentValue(
                "delta must be greater than 0".to_string(),
            ));
        }

        let gray = Self::preprocess(&imageops::grayscale(image));
        let mask = Self::block_threshold(&gray, block_size, delta);
        Ok(open(&mask, Norm::LInf, 1))
    }

    /// Noise cancelling: 3x3 median blur, then inversion so ink is bright.
    fn preprocess(gray: &GrayImage) -> GrayImage {
        let mut out = median_filter(gray, 1, 1);
        for pixel in out.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        out
    }

    /// Partitions the image into overlapping blocks and thresholds each
    /// against its own median.
    ///
    /// Block anchors step by `block_size` but each window spans `block_size`
    /// on both sides of the anchor (clipped to the image), so neighboring
    /// windows overlap. Later windows overwrite earlier ones at shared
    /// pixels; the row-major-then-column-major order is part of the
    /// contract and must not be reordered.
    fn block_threshold(image: &GrayImage, block_size: u32, delta: f64) -> GrayImage {
        let (width, height) = image.dimensions();
        let mut out = GrayImage::new(width, height);

        let mut row = 0;
        while row < height {
            let mut col = 0;
            while col < width {
                let (x0, y0, w, h) = Self::block_window(width, height, col, row, block_size);
                let block = imageops::crop_imm(image, x0, y0, w, h).to_image();
                let thresholded = Self::adaptive_median_threshold(&block, delta);
                Self::blit(&mut out, &thresholded, x0, y0);
                col += block_size;
            }
            row += block_size;
        }
        out
    }

    /// Window spanned by the block anchored at `(col, row)`, clipped to the
    /// image bounds. Returns `(x0, y0, width, height)`.
    fn block_window(
        width: u32,
        height: u32,
        col: u32,
        row: u32,
        block_size: u32,
    ) -> (u32, u32, u32, u32) {
        let y0 = row.saturating_sub(block_size);
        let y1 = height.min(row + block_size);
        let x0 = col.saturating_sub(block_size);
        let x1 = width.min(col + block_size);
        (x0, y0, x1 - x0, y1 - y0)
    }

    /// Marks pixels within `delta` of the block median as background (255),
    /// then erodes the remaining foreground by dilating the background
    /// (3x3 kernel, two iterations) to suppress speckle.
    fn adaptive_median_threshold(block: &GrayImage, delta: f64) -> GrayImage {
        let median = Self::median(block);
        let mut out = GrayImage::new(block.width(), block.height());
        for (x, y, pixel) in block.enumerate_pixels() {
            if (pixel.0[0] as f64) - median < delta {
                out.put_pixel(x, y, Luma([255]));
            }
        }

        // 255 - dilate(255 - mask): grow the background into the ink.
        for pixel in out.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        let mut dilated = dilate(&out, Norm::LInf, 2);
        for pixel in dilated.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        dilated
    }

    /// Median intensity of a block; averages the two middle values for an
    /// even pixel count, matching the usual statistical definition.
    fn median(block: &GrayImage) -> f64 {
        let mut values: Vec<u8> = block.pixels().map(|p| p.0[0]).collect();
        if values.is_empty() {
            return 0.0;
        }
        values.sort_unstable();
        let mid = values.len() / 2;
        if values.len() % 2 == 0 {
            (values[mid - 1] as f64 + values[mid] as f64) / 2.0
        } else {
            values[mid] as f64
        }
    }

    /// Recombination pass: background goes pure white, foreground keeps a
    /// sigmoid-blended grayscale ink strength scaled to the local block.
    pub fn recombine(image: &RgbImage, mask: &GrayImage) -> GrayImage {
        let gray = imageops::grayscale(image);
        let (width, height) = gray.dimensions();
        let mut out = GrayImage::new(width, height);

        let mut row = 0;
        while row < height {
            let mut col = 0;
            while col < width {
                let (x0, y0, w, h) =
                    Self::block_window(width, height, col, row, COMBINE_BLOCK_SIZE);
                let block = imageops::crop_imm(&gray, x0, y0, w, h).to_image();
                let mask_block = imageops::crop_imm(mask, x0, y0, w, h).to_image();
                let combined = Self::combine_block(&block, &mask_block);
                Self::blit(&mut out, &combined, x0, y0);
                col += COMBINE_BLOCK_SIZE;
            }
            row += COMBINE_BLOCK_SIZE;
        }
        out
    }

    /// Blends one block: white where the mask marks background, original
    /// pixels when the block holds no foreground at all, otherwise a
    /// logistic ramp over the local intensity range.
    ///
    /// The ramp is centered just above the Otsu bound between ink and local
    /// background, with a transition band of roughly 20% of the range.
    fn combine_block(block: &GrayImage, mask: &GrayImage) -> GrayImage {
        let mut out = block.clone();
        let mut foreground: Vec<u8> = Vec::new();
        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel.0[0] == 255 {
                out.put_pixel(x, y, Luma([255]));
            } else {
                foreground.push(block.get_pixel(x, y).0[0]);
            }
        }
        if foreground.is_empty() {
            return out;
        }

        let lo = foreground.iter().copied().min().unwrap_or(0) as f64;
        let hi = foreground.iter().copied().max().unwrap_or(255);
        let range = hi as f64 - lo;

        // Otsu over the foreground pixels alone; laid out as a 1-pixel-tall
        // strip since only the histogram matters.
        let strip = GrayImage::from_raw(foreground.len() as u32, 1, foreground.clone());
        let level = match strip {
            Some(strip) => otsu_level(&strip),
            None => return out,
        };

        // Smallest intensity the Otsu split still calls background; a
        // degenerate (flat) block falls back to the block maximum.
        let bound_raw = foreground
            .iter()
            .copied()
            .filter(|&v| v > level)
            .min()
            .unwrap_or(hi) as f64;
        let bound = (bound_raw - lo) / (range + RANGE_EPSILON) + 0.05;

        for (x, y, pixel) in mask.enumerate_pixels() {
            if pixel.0[0] == 0 {
                let value =
                    (block.get_pixel(x, y).0[0] as f64 - lo) / (range + RANGE_EPSILON);
                let blended = Self::sigmoid(value, bound, 0.2);
                out.put_pixel(x, y, Luma([(255.0 * blended) as u8]));
            }
        }
        out
    }

    /// Logistic ramp centered at `origin`; `radius` controls the width of
    /// the transition band.
    fn sigmoid(x: f64, origin: f64, radius: f64) -> f64 {
        let k = ((x - origin) * 5.0 / radius).exp();
        k / (k + 1.0)
    }

    /// Writes `source` into `target` with its top-left corner at `(x0, y0)`.
    fn blit(target: &mut GrayImage, source: &GrayImage, x0: u32, y0: u32) {
        for (x, y, pixel) in source.enumerate_pixels() {
            target.put_pixel(x0 + x, y0 + y, *pixel);
        }
    }
}
