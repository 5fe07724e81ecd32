//! Body renderers.
//!
//! The set of renderers is closed: a [`Response`](crate::Response) picks one
//! [`Renderer`] variant per finalize call and every variant is driven through
//! the same [`Render`] capability.

use crate::errors::RenderError;
use serde_json::Value;
use std::{fs::File, io::Read, path::PathBuf};

/// Payload handed to a renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderData<'a> {
    /// Scalar payload, rendered without merging locals.
    Raw(&'a [u8]),
    /// Structured payload with locals already merged in.
    Structured(&'a Value),
}

/// Capability every renderer variant implements.
pub trait Render {
    /// Content type set on the response unless a handler already chose one.
    fn content_type(&self) -> &str;

    /// Appends the rendered body to `out`.
    fn render(&self, data: RenderData<'_>, out: &mut Vec<u8>) -> Result<(), RenderError>;
}

/// Renderer variants.
///
/// # Examples
/// ```
/// use maestro_web::render::{Render, RenderData, Renderer};
/// use serde_json::json;
///
/// let mut out = Vec::new();
/// let renderer = Renderer::Jsonp { callback: "cb".into() };
///
/// renderer.render(RenderData::Structured(&json!({"a": 1})), &mut out).unwrap();
/// assert_eq!(out, br#"cb({"a":1});"#);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Renderer {
    /// Textual output through the configured view engine. Only raw bodies are
    /// supported; templating languages live outside this crate.
    Template { engine: String },
    Json,
    /// JSON wrapped in a call to `callback`.
    Jsonp { callback: String },
    /// Streams a file verbatim; `None` streams nothing.
    FileStream { path: Option<PathBuf> },
}

impl Render for Renderer {
    fn content_type(&self) -> &str {
        match self {
            Renderer::Template { .. } => "text/html",
            Renderer::Json => "application/json",
            Renderer::Jsonp { .. } => "application/javascript",
            Renderer::FileStream { .. } => "application/octet-stream",
        }
    }

    fn render(&self, data: RenderData<'_>, out: &mut Vec<u8>) -> Result<(), RenderError> {
        match self {
            Renderer::Template { engine } => match data {
                RenderData::Raw(bytes) => out.extend_from_slice(bytes),
                RenderData::Structured(_) => {
                    return Err(RenderError::TemplateUnsupported(engine.clone()))
                }
            },
            Renderer::Json => write_json(data, out)?,
            Renderer::Jsonp { callback } => {
                out.extend_from_slice(callback.as_bytes());
                out.push(b'(');
                write_json(data, out)?;
                out.extend_from_slice(b");");
            }
            Renderer::FileStream { path: Some(path) } => {
                File::open(path)
                    .and_then(|mut file| file.read_to_end(out))
                    .map_err(|source| RenderError::File {
                        path: path.clone(),
                        source,
                    })?;
            }
            Renderer::FileStream { path: None } => {}
        }

        Ok(())
    }
}

// Scalars become JSON strings
fn write_json(data: RenderData<'_>, out: &mut Vec<u8>) -> Result<(), RenderError> {
    match data {
        RenderData::Structured(value) => serde_json::to_writer(out, value)?,
        RenderData::Raw(bytes) => {
            serde_json::to_writer(out, &String::from_utf8_lossy(bytes))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::*;
    use serde_json::json;

    fn run(renderer: &Renderer, data: RenderData<'_>) -> Result<String, RenderError> {
        let mut out = Vec::new();
        renderer.render(data, &mut out)?;
        Ok(str_op(&out).to_string())
    }

    #[test]
    fn variants() {
        let value = json!({"a": 1, "b": [true, null]});
        let template = Renderer::Template { engine: "html".into() };
        let jsonp = Renderer::Jsonp { callback: "handle".into() };

        #[rustfmt::skip]
        let cases = [
            (&template,       RenderData::Raw(b"<p>hi</p>"),     r#"<p>hi</p>"#),
            (&Renderer::Json, RenderData::Structured(&value),   r#"{"a":1,"b":[true,null]}"#),
            (&Renderer::Json, RenderData::Raw(b"Not \"Found\""), r#""Not \"Found\"""#),
            (&jsonp,          RenderData::Structured(&value),   r#"handle({"a":1,"b":[true,null]});"#),
            (&jsonp,          RenderData::Raw(b"OK"),            r#"handle("OK");"#),
        ];

        for (renderer, data, expected) in cases {
            assert_eq!(run(renderer, data).unwrap(), expected);
        }
    }

    #[test]
    fn template_rejects_structured() {
        let template = Renderer::Template { engine: "html".into() };

        assert!(matches!(
            run(&template, RenderData::Structured(&json!({"a": 1}))),
            Err(RenderError::TemplateUnsupported(engine)) if engine == "html"
        ));
    }

    #[test]
    fn file_stream() {
        let path = std::env::temp_dir().join(format!("maestro_render_{}.txt", std::process::id()));
        std::fs::write(&path, b"file body").unwrap();

        let stream = Renderer::FileStream { path: Some(path.clone()) };
        assert_eq!(run(&stream, RenderData::Raw(b"ignored")).unwrap(), "file body");
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(
            run(&stream, RenderData::Raw(b"")),
            Err(RenderError::File { .. })
        ));

        let empty = Renderer::FileStream { path: None };
        assert_eq!(run(&empty, RenderData::Raw(b"ignored")).unwrap(), "");
    }

    #[test]
    fn content_types() {
        assert_eq!(Renderer::Json.content_type(), "application/json");
        assert_eq!(
            Renderer::FileStream { path: None }.content_type(),
            "application/octet-stream"
        );
    }
}
