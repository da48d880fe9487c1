//! Decoder registry: selection, passthrough and identity fallback.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::content::ContentUnit;
use crate::content::filename::replace_extension;
use crate::content::mime::{SKYBRIDGE_HTML, normalize_mime};

use super::{DecodeError, Decoder, DecoderOrigin};

/// Ordered collection of decoders.
pub struct DecoderRegistry {
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: Vec::new(),
        }
    }

    /// Appends a decoder.
    #[tracing::instrument(skip(self, decoder), fields(decoder_name))]
    pub fn register(&mut self, decoder: Box<dyn Decoder>) {
        tracing::Span::current().record("decoder_name", decoder.name());
        debug!(
            name = decoder.name(),
            origin = ?decoder.origin(),
            "Registering decoder"
        );
        self.decoders.push(decoder);
    }

    /// Returns the number of registered decoders.
    #[must_use]
    pub fn decoder_count(&self) -> usize {
        self.decoders.len()
    }

    /// Returns true if no decoders are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    /// Returns decoder names in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.decoders.iter().map(|d| d.name()).collect()
    }

    /// Returns true for MIME types that are never decoded.
    #[must_use]
    pub fn is_passthrough(mime: &str) -> bool {
        let mime = normalize_mime(mime);
        mime.starts_with("image/") || mime == SKYBRIDGE_HTML
    }

    /// Selects the decoder for `mime`.
    ///
    /// A bundled decoder that accepts the type always wins; otherwise the
    /// first accepting decoder in registration order is used.
    #[must_use]
    pub fn select(&self, mime: &str) -> Option<&dyn Decoder> {
        let mime = normalize_mime(mime);
        self.decoders
            .iter()
            .filter(|d| d.accepts(&mime))
            .min_by_key(|d| d.origin())
            .map(AsRef::as_ref)
    }

    /// Decodes `unit`, or returns it unchanged.
    ///
    /// Passthrough types, units with no matching decoder and units the
    /// decoder declines are returned as-is. A decoded unit keeps the
    /// original source URI and gets a filename with the output extension.
    ///
    /// # Errors
    ///
    /// Returns [`DecodeError`] when the selected decoder fails or `cancel`
    /// has fired.
    #[tracing::instrument(skip(self, unit, cancel), fields(mime = %unit.mime_type(), source = %unit.source_uri()))]
    pub async fn decode(
        &self,
        unit: ContentUnit,
        cancel: &CancellationToken,
    ) -> Result<ContentUnit, DecodeError> {
        if Self::is_passthrough(unit.mime_type()) {
            debug!("Passthrough MIME type, skipping decode");
            return Ok(unit);
        }
        let Some(decoder) = self.select(unit.mime_type()) else {
            debug!("No decoder for MIME type, returning original");
            return Ok(unit);
        };
        if cancel.is_cancelled() {
            return Err(DecodeError::cancelled(unit.source_uri()));
        }

        let decoded = decoder
            .decode(unit.payload(), unit.source_uri(), cancel)
            .await?;
        let Some(decoded) = decoded.filter(|d| !d.text.trim().is_empty()) else {
            debug!(decoder = decoder.name(), "Decoder declined, returning original");
            return Ok(unit);
        };

        let filename = replace_extension(&unit.display_name(), decoded.extension());
        let decoded_unit =
            ContentUnit::new(decoded.text, &decoded.mime_type, unit.source_uri())?.with_filename(filename);
        info!(
            decoder = decoder.name(),
            from = %unit.mime_type(),
            to = %decoded_unit.mime_type(),
            bytes = decoded_unit.payload_len(),
            "Decoded content"
        );
        Ok(decoded_unit)
    }
}

impl std::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("decoder_count", &self.decoders.len())
            .field("decoders", &self.names())
            .finish()
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
