//! Probe-then-downsample decoding.

use std::io::Cursor;

use image::error::LimitErrorKind;
use image::imageops::FilterType;
use image::{
    DynamicImage, GrayAlphaImage, GrayImage, ImageError, ImageFormat, ImageReader, Limits, RgbImage, RgbaImage,
};

use crate::error::{CacheError, Result};
use crate::models::Bitmap;

/// Default decode allocation ceiling (128 MiB)
pub const DEFAULT_MAX_ALLOC: u64 = 128 * 1024 * 1024;

/// Target size and allocation ceiling for decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    /// Requested width; the decoded image stays at least this wide
    pub max_width: u32,
    /// Requested height
    pub max_height: u32,
    /// Allocation ceiling, `None` for unlimited
    pub max_alloc: Option<u64>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_width: 512,
            max_height: 512,
            max_alloc: Some(DEFAULT_MAX_ALLOC),
        }
    }
}

/// Read the dimensions from the header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32)> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    Ok(reader.into_dimensions()?)
}

/// Power-of-two downsampling factor for a `width`x`height` source.
///
/// Picks the largest factor that keeps both sides at or above the request,
/// then keeps doubling while the result still has more than twice the
/// requested pixel count. A zero request means "full size".
pub fn sample_size(width: u32, height: u32, req_width: u32, req_height: u32) -> u32 {
    if req_width == 0 || req_height == 0 {
        return 1;
    }
    let mut sample = 1u32;
    if width > req_width || height > req_height {
        let half_width = width / 2;
        let half_height = height / 2;
        while half_width / sample >= req_width && half_height / sample >= req_height {
            sample *= 2;
        }
        let pixels = |s: u32| u64::from(width / s) * u64::from(height / s);
        let budget = 2 * u64::from(req_width) * u64::from(req_height);
        while pixels(sample) > budget && sample < u32::MAX / 2 {
            sample *= 2;
        }
    }
    sample
}

/// Decode `bytes`, downsampled towards the requested size.
///
/// The decode itself runs at the sampled size where the format allows it:
/// JPEG through IDCT scaling, non-interlaced PNG row by row into a box
/// filter. Other formats decode at full size under `max_alloc` and are then
/// resized. Fails with [`CacheError::OutOfMemory`] when the sampled bitmap
/// would not fit under `max_alloc` or a full-size decode hits the limit.
pub fn decode_sampled(bytes: &[u8], options: &DecodeOptions) -> Result<Bitmap> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let (width, height) = reader.into_dimensions()?;
    if width == 0 || height == 0 {
        return Err(CacheError::Decode(format!("empty {width}x{height} image")));
    }

    let sample = sample_size(width, height, options.max_width, options.max_height);
    let (w, h) = ((width / sample).max(1), (height / sample).max(1));
    // 4 bytes per pixel is the common decoded layout
    if let Some(max_alloc) = options.max_alloc
        && u64::from(w) * u64::from(h) * 4 > max_alloc
    {
        return Err(CacheError::OutOfMemory { width: w, height: h });
    }

    let scaled = match format {
        Some(ImageFormat::Jpeg) => decode_jpeg_scaled(bytes, w, h)?,
        Some(ImageFormat::Png) => decode_png_sampled(bytes, sample)?,
        _ => None,
    };
    let image = match scaled {
        Some(image) => image,
        None => decode_full(bytes, options, width, height)?,
    };

    if (image.width(), image.height()) == (w, h) {
        return Ok(Bitmap::new(image));
    }
    tracing::debug!(
        "Downsampling {width}x{height} by {sample} to {w}x{h} (decoded at {}x{})",
        image.width(),
        image.height()
    );
    Ok(Bitmap::new(image.resize_exact(w, h, FilterType::Triangle)))
}

fn decode_full(bytes: &[u8], options: &DecodeOptions, width: u32, height: u32) -> Result<DynamicImage> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let mut limits = Limits::default();
    limits.max_alloc = options.max_alloc;
    reader.limits(limits);

    reader.decode().map_err(|e| match e {
        ImageError::Limits(l) if matches!(l.kind(), LimitErrorKind::InsufficientMemory) => {
            CacheError::OutOfMemory { width, height }
        }
        other => other.into(),
    })
}

fn mismatched(format: &str) -> CacheError {
    CacheError::Decode(format!("{format} pixel buffer does not match its dimensions"))
}

/// JPEG decoded at 1/2, 1/4 or 1/8 scale, the smallest still covering
/// `width`x`height`. `None` for pixel formats without a cheap mapping.
fn decode_jpeg_scaled(bytes: &[u8], width: u32, height: u32) -> Result<Option<DynamicImage>> {
    let to_u16 = |v: u32| u16::try_from(v).unwrap_or(u16::MAX);
    let jpeg_err = |e: jpeg_decoder::Error| CacheError::Decode(e.to_string());

    let mut decoder = jpeg_decoder::Decoder::new(Cursor::new(bytes));
    let (w, h) = decoder.scale(to_u16(width), to_u16(height)).map_err(jpeg_err)?;
    let Some(info) = decoder.info() else {
        return Ok(None);
    };
    let (w, h) = (u32::from(w), u32::from(h));
    let image = match info.pixel_format {
        jpeg_decoder::PixelFormat::L8 => {
            let pixels = decoder.decode().map_err(jpeg_err)?;
            GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8)
        }
        jpeg_decoder::PixelFormat::RGB24 => {
            let pixels = decoder.decode().map_err(jpeg_err)?;
            RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8)
        }
        other => {
            tracing::debug!("No scaled decode for {other:?} JPEG");
            return Ok(None);
        }
    };
    image.map(Some).ok_or_else(|| mismatched("JPEG"))
}

/// Non-interlaced PNG streamed row by row, averaging `sample`x`sample`
/// blocks. `None` for interlaced images.
fn decode_png_sampled(bytes: &[u8], sample: u32) -> Result<Option<DynamicImage>> {
    let png_err = |e: png::DecodingError| CacheError::Decode(e.to_string());

    let mut decoder = png::Decoder::new(Cursor::new(bytes));
    decoder.set_transformations(png::Transformations::EXPAND | png::Transformations::STRIP_16);
    let mut reader = decoder.read_info().map_err(png_err)?;
    if reader.info().interlaced {
        return Ok(None);
    }
    let (width, height) = reader.info().size();
    let (color, _) = reader.output_color_type();

    let mut sampler = BoxSampler::new(width, height, sample, color.samples());
    while let Some(row) = reader.next_row().map_err(png_err)? {
        sampler.push_row(row.data());
    }
    let (w, h) = sampler.output_size();
    let pixels = sampler.finish();
    let image = match color {
        png::ColorType::Grayscale => GrayImage::from_raw(w, h, pixels).map(DynamicImage::ImageLuma8),
        png::ColorType::GrayscaleAlpha => GrayAlphaImage::from_raw(w, h, pixels).map(DynamicImage::ImageLumaA8),
        png::ColorType::Rgb => RgbImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgb8),
        png::ColorType::Rgba => RgbaImage::from_raw(w, h, pixels).map(DynamicImage::ImageRgba8),
        png::ColorType::Indexed => return Ok(None),
    };
    image.map(Some).ok_or_else(|| mismatched("PNG"))
}

/// Box filter over a stream of 8-bit rows.
///
/// Only one band of sums is held at a time; trailing rows and columns that
/// do not fill a whole block are dropped, matching `width / sample`.
struct BoxSampler {
    width: usize,
    height: usize,
    sample: usize,
    channels: usize,
    out_width: usize,
    out_height: usize,
    row: usize,
    sums: Vec<u64>,
    counts: Vec<u64>,
    pixels: Vec<u8>,
}

impl BoxSampler {
    fn new(width: u32, height: u32, sample: u32, channels: usize) -> Self {
        let (width, height) = (width as usize, height as usize);
        let sample = (sample as usize).max(1);
        let out_width = (width / sample).max(1);
        let out_height = (height / sample).max(1);
        Self {
            width,
            height,
            sample,
            channels,
            out_width,
            out_height,
            row: 0,
            sums: vec![0; out_width * channels],
            counts: vec![0; out_width],
            pixels: Vec::with_capacity(out_width * out_height * channels),
        }
    }

    fn output_size(&self) -> (u32, u32) {
        (self.out_width as u32, self.out_height as u32)
    }

    fn push_row(&mut self, data: &[u8]) {
        let y = self.row;
        self.row += 1;
        if y / self.sample >= self.out_height {
            return;
        }

        for (x, pixel) in data.chunks_exact(self.channels).take(self.width).enumerate() {
            let ox = x / self.sample;
            if ox >= self.out_width {
                break;
            }
            self.counts[ox] += 1;
            let base = ox * self.channels;
            for (sum, &value) in self.sums[base..base + self.channels].iter_mut().zip(pixel) {
                *sum += u64::from(value);
            }
        }

        if (y + 1) % self.sample == 0 || y + 1 == self.height {
            for (i, sum) in self.sums.iter_mut().enumerate() {
                let n = self.counts[i / self.channels].max(1);
                self.pixels.push(u8::try_from((*sum + n / 2) / n).unwrap_or(u8::MAX));
                *sum = 0;
            }
            self.counts.fill(0);
        }
    }

    fn finish(self) -> Vec<u8> {
        self.pixels
    }
}

/// Blurred copy used as the secondary variant.
pub fn blur(bitmap: &Bitmap, sigma: f32) -> Bitmap {
    Bitmap::new(bitmap.image().blur(sigma))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EncodeFormat, EncodeOptions};

    fn png(width: u32, height: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            width,
            height,
            image::Rgba([10, 20, 30, 255]),
        ));
        Bitmap::new(image)
            .encode(EncodeOptions {
                format: EncodeFormat::Png,
                quality: 100,
            })
            .unwrap()
    }

    #[test]
    fn test_sample_size() {
        assert_eq!(sample_size(1000, 1000, 100, 100), 8);
        assert_eq!(sample_size(100, 100, 100, 100), 1);
        assert_eq!(sample_size(50, 50, 100, 100), 1);
        assert_eq!(sample_size(1000, 1000, 512, 512), 2);
        assert_eq!(sample_size(4000, 3000, 0, 0), 1);
    }

    #[test]
    fn test_probe_reads_header() {
        assert_eq!(probe_dimensions(&png(40, 30)).unwrap(), (40, 30));
        assert!(probe_dimensions(b"plain text").is_err());
    }

    #[test]
    fn test_decode_downsamples() {
        let options = DecodeOptions {
            max_width: 32,
            max_height: 32,
            ..DecodeOptions::default()
        };
        let bitmap = decode_sampled(&png(256, 256), &options).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (32, 32));
    }

    #[test]
    fn test_decode_keeps_small_images() {
        let bitmap = decode_sampled(&png(20, 10), &DecodeOptions::default()).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (20, 10));
    }

    #[test]
    fn test_allocation_ceiling_is_out_of_memory() {
        let options = DecodeOptions {
            max_alloc: Some(1024),
            ..DecodeOptions::default()
        };
        let err = decode_sampled(&png(64, 64), &options).unwrap_err();
        assert!(matches!(err, CacheError::OutOfMemory { width: 64, height: 64 }));
    }

    #[test]
    fn test_large_png_decodes_under_sampled_budget() {
        // 16 MiB at full size, 1 MiB once sampled by 4
        let options = DecodeOptions {
            max_alloc: Some(4 * 1024 * 1024),
            ..DecodeOptions::default()
        };
        let bitmap = decode_sampled(&png(2048, 2048), &options).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (512, 512));
        assert_eq!(bitmap.image().to_rgba8().get_pixel(100, 100).0, [10, 20, 30, 255]);
    }

    #[test]
    fn test_png_box_filter_averages_blocks() {
        let mut source = RgbaImage::new(4, 2);
        for (x, _, pixel) in source.enumerate_pixels_mut() {
            *pixel = if x < 2 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([200, 100, 50, 255])
            };
        }
        source.put_pixel(0, 0, image::Rgba([100, 100, 100, 255]));
        let bytes = Bitmap::new(DynamicImage::ImageRgba8(source))
            .encode(EncodeOptions {
                format: EncodeFormat::Png,
                quality: 100,
            })
            .unwrap();

        let decoded = decode_png_sampled(&bytes, 2).unwrap().unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (2, 1));
        assert_eq!(decoded.get_pixel(0, 0).0, [25, 25, 25, 255]);
        assert_eq!(decoded.get_pixel(1, 0).0, [200, 100, 50, 255]);
    }

    #[test]
    fn test_large_jpeg_decodes_scaled() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(1024, 1024, image::Rgb([120, 60, 30])));
        let bytes = Bitmap::new(image)
            .encode(EncodeOptions {
                format: EncodeFormat::Jpeg,
                quality: 90,
            })
            .unwrap();

        let scaled = decode_jpeg_scaled(&bytes, 64, 64).unwrap().unwrap();
        assert_eq!((scaled.width(), scaled.height()), (128, 128));

        let options = DecodeOptions {
            max_width: 64,
            max_height: 64,
            max_alloc: Some(1024 * 1024),
        };
        let bitmap = decode_sampled(&bytes, &options).unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (64, 64));
    }

    #[test]
    fn test_garbage_is_decode_error() {
        let err = decode_sampled(b"\x89PNG\r\n\x1a\nbroken", &DecodeOptions::default()).unwrap_err();
        assert!(matches!(err, CacheError::Decode(_) | CacheError::Io(_)));
    }

    #[test]
    fn test_blur_keeps_dimensions() {
        let bitmap = decode_sampled(&png(16, 8), &DecodeOptions::default()).unwrap();
        let blurred = blur(&bitmap, 2.0);
        assert_eq!((blurred.width(), blurred.height()), (16, 8));
        assert!(!blurred.ptr_eq(&bitmap));
    }
}
