//! vbr Media Model
//!
//! Defines the data contracts the composition compiler consumes:
//! - **Media:** probed technical metadata and the extension-based fallback
//! - **Background:** color, image, video, or transparent canvas
//! - **Foreground:** alpha-matted clips in their on-disk encodings
//! - **Layer / Composition:** placements of foregrounds over a background
//!
//! Everything here is plain data. Probing, downloading and process
//! execution live in `vbr-compose-engine`.

pub mod background;
pub mod composition;
pub mod error;
pub mod foreground;
pub mod layer;
pub mod media;

pub use background::*;
pub use composition::*;
pub use error::*;
pub use foreground::*;
pub use layer::*;
pub use media::*;
