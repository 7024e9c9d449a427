use crate::error::RenderError;
use lopdf::{Object, Stream, dictionary};

/// Raster data flattened to 8-bit RGB, ready to become an image XObject.
#[derive(Debug, Clone)]
pub(crate) struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgb: Vec<u8>,
}

impl DecodedImage {
    /// Decodes PNG, JPEG or GIF bytes. Transparency is dropped.
    pub fn decode(bytes: &[u8]) -> Result<Self, RenderError> {
        let image = image::load_from_memory(bytes)?;
        let rgb = image.to_rgb8();
        Ok(Self { width: rgb.width(), height: rgb.height(), rgb: rgb.into_raw() })
    }

    pub fn to_xobject(&self) -> Object {
        let dict = dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => self.width as i64,
            "Height" => self.height as i64,
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
        };
        Object::Stream(Stream::new(dict, self.rgb.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    #[test]
    fn decodes_png_to_rgb() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([255, 0, 0]));
        img.put_pixel(1, 0, Rgb([0, 0, 255]));
        let mut png = Vec::new();
        img.write_to(&mut Cursor::new(&mut png), ImageFormat::Png).unwrap();

        let decoded = DecodedImage::decode(&png).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.rgb, vec![255, 0, 0, 0, 0, 255]);
    }

    #[test]
    fn garbage_is_an_image_error() {
        assert!(matches!(DecodedImage::decode(b"not an image"), Err(RenderError::Image(_))));
    }
}
