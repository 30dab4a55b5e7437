//! Builds the training upload from a validated dataset.
//!
//! Images that fail to re-encode are skipped and reported; one bad file
//! never aborts the whole submission.

use crate::{
    api::MultipartForm,
    dataset::DatasetModel,
    media::{ImageFormat, ImageProcessor},
    notification::Notification,
};

/// An image left out of the upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SkippedImage {
    pub class_index: usize,
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug)]
pub struct EncodedSubmission {
    pub form: MultipartForm,
    pub uploaded: usize,
    pub skipped: Vec<SkippedImage>,
}

impl EncodedSubmission {
    /// One warning per skipped image, in upload order.
    pub fn warnings(&self) -> Vec<Notification> {
        self.skipped
            .iter()
            .map(|skipped| Notification::warning(format!("Skipped {}", skipped.file_name)))
            .collect()
    }
}

/// Encode `dataset` as the multipart body expected by `/classify/train`.
///
/// Callers validate first; this function does not re-check dataset invariants.
pub fn encode_dataset(
    dataset: &DatasetModel,
    processor: &dyn ImageProcessor,
    quality: f32,
) -> EncodedSubmission {
    let mut form = MultipartForm::new();
    form.text("modelName", dataset.name.as_str())
        .text("modelDescription", dataset.description.as_str())
        .text("category", dataset.category.as_str())
        .text("modelArch", dataset.architecture.as_str())
        .text("classesCount", dataset.class_count().to_string());

    let mut uploaded = 0;
    let mut skipped = Vec::new();
    for (class_index, class) in dataset.classes().iter().enumerate() {
        form.text(format!("class_name_{class_index}"), class.name.as_str());
        for (image_index, image) in class.images.iter().enumerate() {
            let format = ImageFormat::for_image(image);
            match processor.reencode(image, format, quality) {
                Ok(bytes) => {
                    form.file(
                        format!("class_dataset_{class_index}"),
                        format!("image_{image_index}.{}", format.extension()),
                        format.mime_type(),
                        bytes,
                    );
                    uploaded += 1;
                }
                Err(err) => {
                    tracing::warn!("Skipping {}: {err}", image.location().display());
                    skipped.push(SkippedImage {
                        class_index,
                        file_name: image.file_name(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
    tracing::info!(uploaded, skipped = skipped.len(), "Encoded training dataset");
    EncodedSubmission {
        form,
        uploaded,
        skipped,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::multipart::PartBody;
    use crate::dataset::{Architecture, ImageRef, ModelCategory};
    use crate::media::ProcessError;

    /// Echoes the file name as bytes, failing for names containing "bad".
    struct EchoProcessor;

    impl ImageProcessor for EchoProcessor {
        fn reencode(
            &self,
            image: &ImageRef,
            _format: ImageFormat,
            quality: f32,
        ) -> Result<Vec<u8>, ProcessError> {
            assert!((quality - 0.9).abs() < f32::EPSILON);
            let name = image.file_name();
            if name.contains("bad") {
                return Err(ProcessError::Decode {
                    path: image.location().to_path_buf(),
                    message: "corrupt".into(),
                });
            }
            Ok(name.into_bytes())
        }
    }

    fn dataset() -> DatasetModel {
        let mut model = DatasetModel::new();
        model.name = "Leaves".into();
        model.description = "Healthy or not".into();
        model.category = ModelCategory::Plants;
        model.architecture = Architecture::MobileNetV2;
        model.rename_class(1, "healthy").unwrap();
        model.rename_class(2, "sick").unwrap();
        model
            .append_images(
                1,
                [
                    ImageRef::new("/cache/a.jpg"),
                    ImageRef::new("/cache/bad.jpg"),
                    ImageRef::new("/cache/c.PNG"),
                ],
            )
            .unwrap();
        model
            .append_images(2, [ImageRef::new("/cache/d.jpeg")])
            .unwrap();
        model
    }

    #[test]
    fn scalar_fields_come_first() {
        let encoded = encode_dataset(&dataset(), &EchoProcessor, 0.9);
        let form = &encoded.form;
        assert_eq!(form.text_value("modelName"), Some("Leaves"));
        assert_eq!(form.text_value("modelDescription"), Some("Healthy or not"));
        assert_eq!(form.text_value("category"), Some("plants"));
        assert_eq!(form.text_value("modelArch"), Some("mobilenet_v2"));
        assert_eq!(form.text_value("classesCount"), Some("2"));
        assert_eq!(form.text_value("class_name_0"), Some("healthy"));
        assert_eq!(form.text_value("class_name_1"), Some("sick"));
        let first_names: Vec<_> = form.parts().iter().take(6).map(|part| part.name.as_str()).collect();
        assert_eq!(
            first_names,
            vec![
                "modelName",
                "modelDescription",
                "category",
                "modelArch",
                "classesCount",
                "class_name_0"
            ]
        );
    }

    #[test]
    fn one_failed_image_is_skipped_with_a_single_warning() {
        let encoded = encode_dataset(&dataset(), &EchoProcessor, 0.9);
        let class0: Vec<_> = encoded.form.files_named("class_dataset_0").collect();
        assert_eq!(class0.len(), 2);
        assert_eq!(encoded.uploaded, 3);
        assert_eq!(encoded.skipped.len(), 1);
        assert_eq!(encoded.skipped[0].file_name, "bad.jpg");
        let warnings = encoded.warnings();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].message, "Skipped bad.jpg");
    }

    #[test]
    fn file_parts_carry_format_and_original_index() {
        let encoded = encode_dataset(&dataset(), &EchoProcessor, 0.9);
        let files: Vec<_> = encoded
            .form
            .files_named("class_dataset_0")
            .map(|part| match &part.body {
                PartBody::File {
                    file_name,
                    content_type,
                    bytes,
                } => (file_name.clone(), content_type.clone(), bytes.clone()),
                PartBody::Text(_) => panic!("expected a file part"),
            })
            .collect();
        assert_eq!(
            files,
            vec![
                ("image_0.jpeg".to_string(), "image/jpeg".to_string(), b"a.jpg".to_vec()),
                ("image_2.png".to_string(), "image/png".to_string(), b"c.PNG".to_vec()),
            ]
        );
    }
}
