pub mod cancel;
pub mod chat_index;
pub mod config;
pub mod device;
pub mod error;
pub mod exif;
pub mod exif_writer;
pub mod export;
pub mod file_ops;
pub mod media;
pub mod naming;
pub mod patcher;
pub mod remediate;
pub mod video_meta;

pub use cancel::CancelToken;
pub use chat_index::ChatIndex;
pub use config::Settings;
pub use device::{Adb, DeviceBridge};
pub use error::Error;
pub use media::MediaKind;
pub use patcher::{MediaPatcher, MetadataPatcher};
pub use remediate::{FileOutcome, FileResult, Remediator, RunReport};
