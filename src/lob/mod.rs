//! Large object protocol layer
//!
//! - [`LobDescriptor`]: validated table/column/locator plus derived statements
//! - [`LobUpload`] / [`LobDownload`]: begin → continue* → end | cancel
//! - [`TextEncoding`]: stream-side byte encoding of text values

pub mod descriptor;
pub mod download;
pub mod encoding;
mod handle;
pub mod locator;
pub mod state;
pub mod upload;

pub use descriptor::{LobDescriptor, LobKind};
pub use download::{LobDownload, LobReader};
pub use encoding::{TextDecoder, TextEncoding};
pub use locator::{KeyValue, RowLocator};
pub use state::TransferState;
pub use upload::LobUpload;
