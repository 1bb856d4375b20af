//! Shared fixtures for unit tests.

use std::cell::RefCell;
use std::io::Cursor;

use image::{ImageFormat, Rgba, RgbaImage};

use crate::error::{Error, ErrorKind, Result};
use crate::inference::Transformer;
use crate::registry::ModelConfig;

/// Encode a solid-color PNG.
pub fn png_bytes(width: u32, height: u32, color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(width, height, Rgba(color));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

/// In-memory transformer returning a fixed image, with scripted failures.
pub struct FakeTransformer {
    output: Vec<u8>,
    failures: Vec<(Option<Vec<u8>>, String, ErrorKind)>,
    calls: RefCell<Vec<String>>,
}

impl FakeTransformer {
    pub fn new() -> Self {
        Self {
            output: png_bytes(6, 3, [200, 30, 30, 255]),
            failures: Vec::new(),
            calls: RefCell::new(Vec::new()),
        }
    }

    /// Fail every call for `model`.
    pub fn fail_model(mut self, model: &str, kind: ErrorKind) -> Self {
        self.failures.push((None, model.to_string(), kind));
        self
    }

    /// Fail calls for `model` when the input image equals `image`.
    pub fn fail_for(mut self, image: Vec<u8>, model: &str, kind: ErrorKind) -> Self {
        self.failures.push((Some(image), model.to_string(), kind));
        self
    }

    /// Model ids of every call, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }
}

impl Transformer for FakeTransformer {
    fn transform(&self, image: &[u8], model: &ModelConfig, _prompt: &str) -> Result<Vec<u8>> {
        self.calls.borrow_mut().push(model.id.clone());

        let failure = self.failures.iter().find(|(img, id, _)| {
            id == &model.id && img.as_ref().is_none_or(|bytes| bytes.as_slice() == image)
        });

        match failure.map(|(_, _, kind)| *kind) {
            None => Ok(self.output.clone()),
            Some(ErrorKind::Authentication) => Err(Error::Authentication("token rejected".into())),
            Some(ErrorKind::Transport) => Err(Error::transport("connection reset")),
            Some(ErrorKind::Timeout) => Err(Error::Timeout {
                model: model.id.clone(),
                waited: std::time::Duration::from_secs(1),
            }),
            Some(_) => Err(Error::Inference {
                model: model.id.clone(),
                message: "model rejected the request".into(),
            }),
        }
    }
}
