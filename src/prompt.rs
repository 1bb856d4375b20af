//! Prompt text sent with every transformation request.

use std::path::Path;

use crate::error::{Error, Result};

/// Instructions for turning a whiteboard photo into a clean diagram.
pub const SYSTEM_PROMPT: &str = concat!(
    "Transform this whiteboard photograph into a clean, professional diagram.\n",
    "\n",
    "Create a NEW image with:\n",
    "- Clean, solid MATTE WHITE background (not the original whiteboard)\n",
    "- Clear, legible text preserving the original wording exactly\n",
    "- Professional lines, arrows, and shapes with a hand-drawn sketch aesthetic\n",
    "- Subtle colors to distinguish elements and improve clarity\n",
    "\n",
    "Preserve the layout and spatial relationships. Use standard icons where appropriate ",
    "(cylinders for databases, rectangles for systems). Fix incomplete elements. ",
    "Omit board edges, reflections, erasers, and other incidental items from the photo.\n",
    "\n",
    "The result should look like a polished whiteboard diagram ready for a professional ",
    "presentation.",
);

/// Prompt for a run: the base instructions plus optional extra text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    base: String,
    extra: Option<String>,
}

impl Default for Prompt {
    fn default() -> Self {
        Self {
            base: SYSTEM_PROMPT.to_string(),
            extra: None,
        }
    }
}

impl Prompt {
    /// Replace the base instructions.
    pub fn with_base(base: impl Into<String>) -> Result<Self> {
        let base = base.into();
        if base.trim().is_empty() {
            return Err(Error::InvalidInput("prompt is empty".to_string()));
        }
        Ok(Self { base, extra: None })
    }

    /// Read replacement base instructions from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| Error::ImageLoad {
            path: path.to_path_buf(),
            reason: format!("cannot read prompt file: {e}"),
        })?;
        Self::with_base(text.trim_end())
    }

    /// Append extra instructions after the base text. Blank text is ignored.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        let extra = extra.into();
        self.extra = (!extra.trim().is_empty()).then_some(extra);
        self
    }

    /// Full prompt text.
    #[must_use]
    pub fn text(&self) -> String {
        match &self.extra {
            Some(extra) => format!("{}\n\n{}", self.base, extra.trim()),
            None => self.base.clone(),
        }
    }
}
