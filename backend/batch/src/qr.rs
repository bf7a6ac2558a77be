//! QR codes pointing at public profile pages.
use std::io::Cursor;

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};

use crate::error::BatchError;

pub const MIN_QR_SIZE: u32 = 256;

/// Renders `url` as a PNG with a quiet zone and error-correction level M.
pub fn qr_png(url: &str) -> Result<Vec<u8>, BatchError> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::M)
        .map_err(|e| BatchError::Qr(e.to_string()))?;

    let image = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(MIN_QR_SIZE, MIN_QR_SIZE)
        .build();

    let mut png = Cursor::new(Vec::new());
    DynamicImage::ImageLuma8(image)
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| BatchError::Qr(e.to_string()))?;

    Ok(png.into_inner())
}
