//! Keyframe extraction and packaging pipeline.
//!
//! Uploads are staged ([`staging`]), run through an external ffmpeg process
//! ([`tool`], [`ffmpeg`], [`extraction`]), published as the current frame
//! catalog ([`catalog`], [`store`]), and bundled into zip archives on demand
//! ([`archive`]). Nothing here depends on HTTP.

pub mod archive;
pub mod catalog;
pub mod error;
pub mod extraction;
pub mod ffmpeg;
pub mod staging;
pub mod store;
pub mod tool;
