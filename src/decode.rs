//! Image payloads from the upload endpoint.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbImage;

use crate::error::PostureError;

/// Strips a `data:image/...;base64,` prefix if present.
pub fn payload(image: &str) -> &str {
    let trimmed = image.trim();
    if trimmed.starts_with("data:") {
        if let Some((_, rest)) = trimmed.split_once(',') {
            return rest;
        }
    }
    trimmed
}

/// Decodes a data URL or bare base64 string into an RGB raster.
pub fn decode_image(image: &str) -> Result<RgbImage, PostureError> {
    let body = payload(image);
    if body.is_empty() {
        return Err(PostureError::MissingInput);
    }
    let bytes = STANDARD.decode(body)?;
    let decoded = image::load_from_memory(&bytes)?;
    Ok(decoded.to_rgb8())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::ImageFormat;
    use std::io::Cursor;

    pub(crate) fn png_base64(width: u32, height: u32) -> String {
        let img = RgbImage::from_pixel(width, height, image::Rgb([10, 20, 30]));
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        STANDARD.encode(buf.into_inner())
    }

    #[test]
    fn strips_data_url_prefix() {
        assert_eq!(payload("data:image/jpeg;base64,QUJD"), "QUJD");
        assert_eq!(payload("QUJD"), "QUJD");
    }

    #[test]
    fn decodes_bare_base64() {
        let img = decode_image(&png_base64(4, 3)).unwrap();
        assert_eq!(img.dimensions(), (4, 3));
        assert_eq!(img.get_pixel(0, 0).0, [10, 20, 30]);
    }

    #[test]
    fn decodes_data_url() {
        let url = format!("data:image/png;base64,{}", png_base64(2, 2));
        assert_eq!(decode_image(&url).unwrap().dimensions(), (2, 2));
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(decode_image("!!!not base64"), Err(PostureError::Decode(_))));
        let not_an_image = STANDARD.encode(b"hello");
        assert!(matches!(decode_image(&not_an_image), Err(PostureError::Decode(_))));
    }

    #[test]
    fn empty_data_url_is_missing_input() {
        assert!(matches!(
            decode_image("data:image/png;base64,"),
            Err(PostureError::MissingInput)
        ));
    }
}
