use anyhow::{Context, Result};
use base64::Engine;
use image::ImageEncoder;
use relay_core::ChallengeRenderer;

/// Renders login payloads as PNG QR codes wrapped in a data URI.
#[derive(Debug, Default, Clone, Copy)]
pub struct QrRenderer;

impl ChallengeRenderer for QrRenderer {
    fn render(&self, payload: &str) -> Result<String> {
        let code = qrcode::QrCode::new(payload.as_bytes()).context("payload does not fit a QR code")?;
        let image = code.render::<image::Luma<u8>>().build();

        let mut bytes = Vec::new();
        image::codecs::png::PngEncoder::new(&mut bytes)
            .write_image(
                image.as_raw(),
                image.width(),
                image.height(),
                image::ColorType::L8.into(),
            )
            .context("PNG encoding failed")?;

        Ok(format!(
            "data:image/png;base64,{}",
            base64::engine::general_purpose::STANDARD.encode(bytes)
        ))
    }
}
