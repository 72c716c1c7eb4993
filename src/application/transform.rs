//! Produces the publish-ready notebook: embedded images become static files
//! and the leading metadata cell is removed.

use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::application::images::{ImageError, ImageMaterializer};
use crate::domain::notebook::NotebookDocument;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("notebook is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("cell {cell} output {output}: {source}")]
    Image {
        cell: usize,
        output: usize,
        #[source]
        source: ImageError,
    },
}

/// Result of transforming a notebook, with counts for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedNotebook {
    pub json: String,
    pub images_replaced: usize,
    pub metadata_cell_removed: bool,
}

#[derive(Debug, Clone)]
pub struct NotebookTransformer {
    images: Arc<ImageMaterializer>,
}

impl NotebookTransformer {
    pub fn new(images: Arc<ImageMaterializer>) -> Self {
        Self { images }
    }

    /// Transform raw notebook text. The whole output is built in memory; an
    /// error leaves nothing for the caller to persist.
    pub fn transform(&self, raw: &str) -> Result<TransformedNotebook, TransformError> {
        let mut document = NotebookDocument::parse(raw)?;
        let mut images_replaced = 0;

        for (cell_index, cell) in document.cells.iter_mut().enumerate() {
            let Some(outputs) = cell.outputs.as_mut() else {
                continue;
            };

            for (output_index, output) in outputs.iter_mut().enumerate() {
                let Some((_, payload)) = output.image_payload() else {
                    continue;
                };

                // Notebook image outputs are always PNG here.
                let image = self.images.materialize(&payload, "png").map_err(|source| {
                    TransformError::Image {
                        cell: cell_index,
                        output: output_index,
                        source,
                    }
                })?;
                output.replace_with_image(&image.url);
                images_replaced += 1;
            }
        }

        let metadata_cell_removed = document.strip_metadata_cell();
        let json = document.to_json()?;

        debug!(
            target = "application::transform",
            op = "transform::notebook",
            images_replaced,
            metadata_cell_removed,
            cells = document.cells.len(),
            "Transformed notebook"
        );

        Ok(TransformedNotebook {
            json,
            images_replaced,
            metadata_cell_removed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::images::tests::png_payload;
    use serde_json::{Value, json};
    use tempfile::TempDir;

    fn transformer(dir: &TempDir) -> NotebookTransformer {
        let images = ImageMaterializer::new(dir.path().to_path_buf(), "https://blog.example/m")
            .expect("materializer");
        NotebookTransformer::new(Arc::new(images))
    }

    fn image_output(key: &str, payload: &str) -> Value {
        json!({
            "output_type": "display_data",
            "data": { key: payload, "text/plain": ["<Figure>"] },
            "metadata": {}
        })
    }

    #[test]
    fn replaces_every_image_output() {
        let dir = TempDir::new().expect("temp dir");
        let first = png_payload(2, 2);
        let second = png_payload(3, 3);
        let raw = json!({
            "cells": [
                {
                    "cell_type": "code",
                    "source": ["plot()"],
                    "outputs": [image_output("image/png", &first), image_output("png", &second)]
                },
                {
                    "cell_type": "code",
                    "source": ["plot()"],
                    "outputs": [
                        { "output_type": "stream", "name": "stdout", "text": ["hi\n"] },
                        image_output("image/png", &first)
                    ]
                }
            ],
            "nbformat": 4
        })
        .to_string();

        let transformed = transformer(&dir).transform(&raw).expect("transformed");
        assert_eq!(transformed.images_replaced, 3);
        assert!(!transformed.metadata_cell_removed);
        assert!(!transformed.json.contains(&first));
        assert!(!transformed.json.contains(&second));
        assert_eq!(transformed.json.matches("<img src='").count(), 3);

        let value: Value = serde_json::from_str(&transformed.json).expect("json");
        let replaced = &value["cells"][0]["outputs"][0]["data"];
        assert_eq!(replaced.as_object().expect("data").len(), 1);
        assert_eq!(value["cells"][1]["outputs"][0]["text"][0], "hi\n");
    }

    #[test]
    fn strips_metadata_cell() {
        let dir = TempDir::new().expect("temp dir");
        let raw = json!({
            "cells": [
                { "cell_type": "markdown", "source": [" %META  \n", "title=Post"] },
                { "cell_type": "markdown", "source": ["# Heading"] }
            ]
        })
        .to_string();

        let transformed = transformer(&dir).transform(&raw).expect("transformed");
        assert!(transformed.metadata_cell_removed);

        let value: Value = serde_json::from_str(&transformed.json).expect("json");
        let cells = value["cells"].as_array().expect("cells");
        assert_eq!(cells.len(), 1);
        assert_eq!(cells[0]["source"][0], "# Heading");
    }

    #[test]
    fn documents_without_metadata_keep_cell_count() {
        let dir = TempDir::new().expect("temp dir");
        for raw in [
            json!({ "cells": [] }),
            json!({ "cells": [{ "cell_type": "code", "source": [] }] }),
            json!({ "cells": [{ "cell_type": "markdown", "source": ["%METADATA"] }] }),
        ] {
            let expected = raw["cells"].as_array().expect("cells").len();
            let transformed = transformer(&dir)
                .transform(&raw.to_string())
                .expect("transformed");
            let value: Value = serde_json::from_str(&transformed.json).expect("json");
            assert_eq!(value["cells"].as_array().expect("cells").len(), expected);
        }
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let dir = TempDir::new().expect("temp dir");
        let err = transformer(&dir)
            .transform("{ not json")
            .expect_err("parse error");
        assert!(matches!(err, TransformError::Parse(_)));

        let err = transformer(&dir)
            .transform(r#"{"metadata": {}}"#)
            .expect_err("cells required");
        assert!(matches!(err, TransformError::Parse(_)));
    }

    #[test]
    fn broken_image_aborts_transform() {
        let dir = TempDir::new().expect("temp dir");
        let raw = json!({
            "cells": [{
                "cell_type": "code",
                "source": [],
                "outputs": [image_output("image/png", "bm90IGEgcG5n")]
            }]
        })
        .to_string();

        let err = transformer(&dir).transform(&raw).expect_err("image error");
        assert!(matches!(err, TransformError::Image { cell: 0, output: 0, .. }));
    }
}
