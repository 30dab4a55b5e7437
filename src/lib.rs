//! Client core for training and using image classifiers.
/// Typed client for the classification service.
pub mod api;
/// Application directory layout.
pub mod app_dirs;
/// Capture sessions that feed images into dataset classes.
pub mod capture;
/// Model browsing and single-image classification.
pub mod catalog;
/// Client configuration.
pub mod config;
/// In-memory training dataset and its validation rules.
pub mod dataset;
/// Networked camera device.
pub mod device;
pub(crate) mod http_client;
/// Tracing setup.
pub mod logging;
/// Image picking and re-encoding.
pub mod media;
pub mod navigation;
pub mod notification;
/// Login state and account flows.
pub mod session;
/// Multipart encoding of a training dataset.
pub mod submission;
/// Train-new-model controller.
pub mod training;
