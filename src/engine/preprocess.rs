//! Image preprocessing for the classification models

use image::DynamicImage;
use ndarray::Array4;
use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;

/// ImageNet channel means in BGR order, as subtracted by Keras VGG16 preprocessing
pub const VGG16_BGR_MEAN: [f32; 3] = [103.939, 116.779, 123.68];

/// Pixel normalization applied after resizing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Normalization {
    /// RGB scaled to [0, 1]
    Rescale,
    /// BGR with ImageNet mean subtracted, no scaling
    Vgg16,
    /// Raw RGB in [0, 255]
    None,
}

impl Normalization {
    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::Rescale => "rescale",
            Normalization::Vgg16 => "vgg16",
            Normalization::None => "none",
        }
    }
}

/// Memory layout of the input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorLayout {
    /// [batch, height, width, channels], the Keras default
    #[default]
    Nhwc,
    /// [batch, channels, height, width]
    Nchw,
}

/// Turns a decoded image into a model input tensor
#[derive(Debug, Clone)]
pub struct Preprocessor {
    input_size: u32,
    normalization: Normalization,
    layout: TensorLayout,
}

impl Preprocessor {
    pub fn new(input_size: u32, normalization: Normalization, layout: TensorLayout) -> Self {
        Self {
            input_size,
            normalization,
            layout,
        }
    }

    pub fn for_model(config: &ModelConfig) -> Self {
        Self::new(config.input_size, config.preprocessing, config.layout)
    }

    pub fn input_size(&self) -> u32 {
        self.input_size
    }

    /// Resize to the model resolution and normalize into a batch of one
    pub fn preprocess(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.input_size;
        // The models were trained on squashed, not letterboxed, images
        let resized = image
            .resize_exact(size, size, image::imageops::FilterType::CatmullRom)
            .to_rgb8();

        let side = size as usize;
        let mut tensor = match self.layout {
            TensorLayout::Nhwc => Array4::<f32>::zeros((1, side, side, 3)),
            TensorLayout::Nchw => Array4::<f32>::zeros((1, 3, side, side)),
        };

        for (x, y, pixel) in resized.enumerate_pixels() {
            let values = self.normalize([pixel[0], pixel[1], pixel[2]]);
            let (x, y) = (x as usize, y as usize);
            for (c, v) in values.into_iter().enumerate() {
                match self.layout {
                    TensorLayout::Nhwc => tensor[[0, y, x, c]] = v,
                    TensorLayout::Nchw => tensor[[0, c, y, x]] = v,
                }
            }
        }

        tensor
    }

    /// Normalize one RGB pixel into the three channel values the model expects
    fn normalize(&self, rgb: [u8; 3]) -> [f32; 3] {
        let [r, g, b] = rgb.map(|v| v as f32);
        match self.normalization {
            Normalization::Rescale => [r / 255.0, g / 255.0, b / 255.0],
            Normalization::Vgg16 => [
                b - VGG16_BGR_MEAN[0],
                g - VGG16_BGR_MEAN[1],
                r - VGG16_BGR_MEAN[2],
            ],
            Normalization::None => [r, g, b],
        }
    }
}

/// Decode an upload into an RGB image.
///
/// Pixels are kept in stored order unless `apply_orientation` is set, in
/// which case the EXIF orientation tag is applied first.
pub fn decode_image(data: &[u8], apply_orientation: bool) -> Result<DynamicImage> {
    let mut image = image::load_from_memory(data)?;
    if apply_orientation {
        image = orient(image, exif_orientation(data));
    }
    // Alpha and grayscale inputs are flattened to three channels
    Ok(DynamicImage::ImageRgb8(image.to_rgb8()))
}

/// EXIF orientation value, 1 when the tag is absent or unreadable
fn exif_orientation(data: &[u8]) -> u32 {
    use std::io::Cursor;

    match exif::Reader::new().read_from_container(&mut Cursor::new(data)) {
        Ok(exif_data) => exif_data
            .get_field(exif::Tag::Orientation, exif::In::PRIMARY)
            .and_then(|field| field.value.get_uint(0))
            .unwrap_or(1),
        Err(_) => 1,
    }
}

fn orient(image: DynamicImage, orientation: u32) -> DynamicImage {
    // https://exiftool.org/TagNames/EXIF.html (Orientation)
    match orientation {
        2 => image.fliph(),
        3 => image.rotate180(),
        4 => image.flipv(),
        5 => image.rotate90().fliph(),
        6 => image.rotate90(),
        7 => image.rotate270().fliph(),
        8 => image.rotate270(),
        _ => image,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb, Rgba};
    use std::io::Cursor;

    fn solid(width: u32, height: u32, rgb: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(ImageBuffer::from_pixel(width, height, Rgb(rgb)))
    }

    #[test]
    fn test_nhwc_shape_and_rescale() {
        let pre = Preprocessor::new(8, Normalization::Rescale, TensorLayout::Nhwc);
        let tensor = pre.preprocess(&solid(20, 10, [255, 0, 51]));

        assert_eq!(tensor.shape(), &[1, 8, 8, 3]);
        assert!((tensor[[0, 3, 5, 0]] - 1.0).abs() < 1e-6);
        assert!(tensor[[0, 3, 5, 1]].abs() < 1e-6);
        assert!((tensor[[0, 3, 5, 2]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_vgg16_is_bgr_mean_subtracted() {
        let pre = Preprocessor::new(4, Normalization::Vgg16, TensorLayout::Nhwc);
        let tensor = pre.preprocess(&solid(4, 4, [200, 100, 50]));

        // Channel 0 is blue
        assert!((tensor[[0, 0, 0, 0]] - (50.0 - 103.939)).abs() < 1e-3);
        assert!((tensor[[0, 0, 0, 1]] - (100.0 - 116.779)).abs() < 1e-3);
        assert!((tensor[[0, 0, 0, 2]] - (200.0 - 123.68)).abs() < 1e-3);
    }

    #[test]
    fn test_nchw_layout() {
        let pre = Preprocessor::new(6, Normalization::None, TensorLayout::Nchw);
        let tensor = pre.preprocess(&solid(3, 3, [10, 20, 30]));

        assert_eq!(tensor.shape(), &[1, 3, 6, 6]);
        assert!((tensor[[0, 0, 2, 4]] - 10.0).abs() < 1e-6);
        assert!((tensor[[0, 1, 2, 4]] - 20.0).abs() < 1e-6);
        assert!((tensor[[0, 2, 2, 4]] - 30.0).abs() < 1e-6);
    }

    #[test]
    fn test_decode_image_flattens_alpha() {
        let rgba = DynamicImage::ImageRgba8(ImageBuffer::from_pixel(5, 7, Rgba([1, 2, 3, 128])));
        let mut buffer = Cursor::new(Vec::new());
        rgba.write_to(&mut buffer, image::ImageFormat::Png).unwrap();

        let decoded = decode_image(buffer.get_ref(), false).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (5, 7));
        assert!(matches!(decoded, DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn test_decode_image_rejects_garbage() {
        assert!(decode_image(b"definitely not an image", false).is_err());
    }

    /// 4x2 JPEG carrying an APP1 segment with Orientation = 6 (rotate 90 CW)
    fn jpeg_with_orientation_6() -> Vec<u8> {
        let img = solid(4, 2, [120, 60, 30]);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Jpeg).unwrap();
        let jpeg = buffer.into_inner();

        let mut app1 = vec![0xFF, 0xE1, 0x00, 0x22];
        app1.extend_from_slice(b"Exif\0\0");
        // Big-endian TIFF header, first IFD at offset 8
        app1.extend_from_slice(&[b'M', b'M', 0x00, 0x2A, 0x00, 0x00, 0x00, 0x08]);
        // One entry: tag 0x0112 (Orientation), SHORT, count 1, value 6
        app1.extend_from_slice(&[0x00, 0x01]);
        app1.extend_from_slice(&[0x01, 0x12, 0x00, 0x03, 0x00, 0x00, 0x00, 0x01, 0x00, 0x06, 0x00, 0x00]);
        app1.extend_from_slice(&[0x00, 0x00, 0x00, 0x00]);

        // Splice right after SOI
        let mut tagged = jpeg[..2].to_vec();
        tagged.extend_from_slice(&app1);
        tagged.extend_from_slice(&jpeg[2..]);
        tagged
    }

    #[test]
    fn test_exif_orientation_read() {
        let tagged = jpeg_with_orientation_6();
        assert_eq!(exif_orientation(&tagged), 6);

        let mut plain = Cursor::new(Vec::new());
        solid(3, 3, [0, 0, 0]).write_to(&mut plain, image::ImageFormat::Png).unwrap();
        assert_eq!(exif_orientation(plain.get_ref()), 1);
    }

    #[test]
    fn test_decode_keeps_stored_pixels_by_default() {
        let decoded = decode_image(&jpeg_with_orientation_6(), false).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 2));
    }

    #[test]
    fn test_decode_applies_orientation_when_enabled() {
        let decoded = decode_image(&jpeg_with_orientation_6(), true).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (2, 4));
    }

    #[test]
    fn test_normalization_serde_names() {
        let n: Normalization = serde_json::from_str("\"vgg16\"").unwrap();
        assert_eq!(n, Normalization::Vgg16);
        assert_eq!(Normalization::Rescale.as_str(), "rescale");
    }
}
