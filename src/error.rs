//! Error types for the renderer.
//!
//! Every error in this crate is fatal from the renderer's point of view:
//! a missing buffer, a missing shader parameter or a malformed asset is a
//! configuration bug to fix, not a runtime condition to recover from.
//! [`SceneRenderer::render`](crate::SceneRenderer::render) returns a
//! `Result` so callers (and tests) can observe the failure instead of
//! getting a silently wrong frame.

use thiserror::Error;

/// Errors raised while rendering a frame or preparing resources for one.
#[derive(Debug, Error)]
pub enum RenderError {
    /// A post step or the final blit referenced a named buffer that no
    /// earlier pass produced.
    #[error("can't find '{0}' buffer")]
    MissingBuffer(String),

    /// A generated shader declared a uniform that was never bound before
    /// the draw call.
    #[error("shader parameter '{0}' was declared but never bound")]
    MissingParameter(String),

    /// A geometry was built without any vertex buffers.
    #[error("need at least one vertex buffer")]
    MissingGeometry,

    /// A multi-pass screen filter was applied with an empty input list.
    #[error("filter '{0}' was applied without its source input")]
    MissingFilterInput(&'static str),

    /// An area light is in the scene but the renderer was never given the
    /// LTC lookup tables.
    #[error("scene contains an area light but no LTC tables were loaded")]
    MissingLtcTables,

    /// An LTC asset file had the wrong length for its declared dimensions.
    #[error("LTC table '{name}' has {got} bytes, expected {expected}")]
    BadLtcTable {
        name: &'static str,
        got: usize,
        expected: usize,
    },

    /// Reading an asset from disk failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Decoding an image asset failed.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// Parsing a comma separated float table failed.
    #[error("malformed float table: {0}")]
    ParseFloat(#[from] std::num::ParseFloatError),
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = RenderError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_errors_name_the_filter() {
        let err = RenderError::MissingFilterInput("hex depth of field");
        assert_eq!(
            err.to_string(),
            "filter 'hex depth of field' was applied without its source input"
        );
    }

    #[test]
    fn buffer_errors_name_the_buffer() {
        let err = RenderError::MissingBuffer("bloom-3".into());
        assert_eq!(err.to_string(), "can't find 'bloom-3' buffer");
    }
}
