//! `multipart/form-data` body builder for the upload endpoints.

use std::borrow::Cow;

const CRLF: &str = "\r\n";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PartBody {
    Text(String),
    File {
        file_name: String,
        content_type: String,
        bytes: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub body: PartBody,
}

/// Ordered multipart form. Parts are emitted in insertion order.
#[derive(Clone, Debug)]
pub struct MultipartForm {
    boundary: String,
    parts: Vec<Part>,
}

impl Default for MultipartForm {
    fn default() -> Self {
        Self::new()
    }
}

impl MultipartForm {
    pub fn new() -> Self {
        Self {
            boundary: format!("snapclass-{}", uuid::Uuid::new_v4().simple()),
            parts: Vec::new(),
        }
    }

    pub fn text(&mut self, name: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::Text(value.into()),
        });
        self
    }

    pub fn file(
        &mut self,
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> &mut Self {
        self.parts.push(Part {
            name: name.into(),
            body: PartBody::File {
                file_name: file_name.into(),
                content_type: content_type.into(),
                bytes,
            },
        });
        self
    }

    pub fn parts(&self) -> &[Part] {
        &self.parts
    }

    /// Value of the first text part named `name`.
    pub fn text_value(&self, name: &str) -> Option<&str> {
        self.parts.iter().find_map(|part| match &part.body {
            PartBody::Text(value) if part.name == name => Some(value.as_str()),
            _ => None,
        })
    }

    /// File parts named `name`, in insertion order.
    pub fn files_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Part> + 'a {
        self.parts
            .iter()
            .filter(move |part| part.name == name && matches!(part.body, PartBody::File { .. }))
    }

    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Serialize the form into a request body.
    pub fn to_body(&self) -> Vec<u8> {
        let mut body = Vec::new();
        for part in &self.parts {
            body.extend_from_slice(format!("--{}{CRLF}", self.boundary).as_bytes());
            match &part.body {
                PartBody::Text(value) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"{CRLF}{CRLF}",
                            escape_quoted(&part.name)
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(value.as_bytes());
                }
                PartBody::File {
                    file_name,
                    content_type,
                    bytes,
                } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"{CRLF}\
                             Content-Type: {content_type}{CRLF}{CRLF}",
                            escape_quoted(&part.name),
                            escape_quoted(file_name),
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                }
            }
            body.extend_from_slice(CRLF.as_bytes());
        }
        body.extend_from_slice(format!("--{}--{CRLF}", self.boundary).as_bytes());
        body
    }
}

fn escape_quoted(value: &str) -> Cow<'_, str> {
    if value.contains(['"', '\r', '\n']) {
        Cow::Owned(
            value
                .replace('"', "%22")
                .replace('\r', "%0D")
                .replace('\n', "%0A"),
        )
    } else {
        Cow::Borrowed(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_contains_fields_in_order_and_closing_boundary() {
        let mut form = MultipartForm::new();
        form.text("modelName", "Flowers")
            .file("class_dataset_0", "image_0.png", "image/png", vec![1, 2, 3]);
        let body = form.to_body();
        let text = String::from_utf8_lossy(&body);

        let name_at = text.find("name=\"modelName\"").unwrap();
        let file_at = text
            .find("name=\"class_dataset_0\"; filename=\"image_0.png\"")
            .unwrap();
        assert!(name_at < file_at);
        assert!(text.contains("Content-Type: image/png\r\n\r\n"));
        let boundary = form.content_type().rsplit('=').next().unwrap().to_string();
        assert!(text.ends_with(&format!("--{boundary}--\r\n")));
    }

    #[test]
    fn quotes_in_names_are_escaped() {
        let mut form = MultipartForm::new();
        form.file("file", "a\"b.jpg", "image/jpeg", Vec::new());
        let text = String::from_utf8(form.to_body()).unwrap();
        assert!(text.contains("filename=\"a%22b.jpg\""));
    }

    #[test]
    fn lookup_helpers_find_parts() {
        let mut form = MultipartForm::new();
        form.text("classesCount", "2")
            .file("class_dataset_1", "image_0.jpeg", "image/jpeg", vec![9])
            .file("class_dataset_1", "image_1.jpeg", "image/jpeg", vec![8]);
        assert_eq!(form.text_value("classesCount"), Some("2"));
        assert_eq!(form.files_named("class_dataset_1").count(), 2);
        assert_eq!(form.files_named("class_dataset_0").count(), 0);
    }
}
