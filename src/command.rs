//! Engine command-line construction.
//!
//! Turns a [`ResolutionSpec`] into the argument vector Ghostscript expects
//! when rasterising a PDF read from stdin into a monochrome BMP on stdout:
//!
//! ```text
//! -sDEVICE=bmpmono -sOutputFile=%stdout -q -r300 -g1211x1771 -dPDFFitPage -
//! ```
//!
//! The order is fixed. `-q` keeps the banner off stdout, which doubles as
//! the data channel, and the trailing `-` must come last so every switch is
//! applied before the document is read.

use crate::error::RasterError;
use crate::resolution::ResolutionSpec;
use std::fmt;

/// Monochrome bitmap output device.
pub const DEVICE: &str = "bmpmono";

/// Output sink: the engine's own stdout.
pub const OUTPUT_FILE: &str = "%stdout";

/// An ordered, deterministic engine argument list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineInvocation {
    args: Vec<String>,
}

impl EngineInvocation {
    /// The arguments, in order, without the program name.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn into_args(self) -> Vec<String> {
        self.args
    }
}

impl fmt::Display for EngineInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}

/// Build the engine invocation for `resolution`.
///
/// Fails with [`RasterError::InvalidResolution`] rather than emitting a
/// zero or negative geometry.
pub fn build_invocation(resolution: &ResolutionSpec) -> Result<EngineInvocation, RasterError> {
    resolution.validate()?;

    let args = vec![
        format!("-sDEVICE={DEVICE}"),
        format!("-sOutputFile={OUTPUT_FILE}"),
        "-q".to_string(),
        format!("-r{}", resolution.dpi),
        format!("-g{}", resolution.geometry()),
        "-dPDFFitPage".to_string(),
        "-".to_string(),
    ];

    Ok(EngineInvocation { args })
}
