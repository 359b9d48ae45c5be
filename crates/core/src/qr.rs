//! Renders transport QR payloads as displayable images.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use qrcode::QrCode;
use qrcode::render::svg;

use crate::error::{Error, Result};

const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

/// Renders `payload` as an SVG QR code wrapped in a `data:` URL.
pub fn render_data_url(payload: &str) -> Result<String> {
	let svg = QrCode::new(payload.as_bytes())
		.map_err(|e| Error::Internal(format!("QR generation failed: {e}")))?
		.render::<svg::Color<'_>>()
		.min_dimensions(256, 256)
		.dark_color(svg::Color("#000000"))
		.light_color(svg::Color("#FFFFFF"))
		.build();

	Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(svg)))
}
