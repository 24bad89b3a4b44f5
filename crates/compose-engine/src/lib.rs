//! vbr Compose Engine
//!
//! Turns a [`Composition`](vbr_media_model::Composition) into a single
//! ffmpeg invocation and runs it.
//!
//! # Pipeline Architecture
//!
//! ```text
//! background ──────────────► input 0 ──────────────────────────┐
//!                                                              │
//! layer (z order) ─► inputs 1..n ─► normalize ─► shift ─► crop │
//!                                   ─► scale ─► rotate ─► fade ├─► overlay chain ─► [out]
//!                                                              │
//! enabled audio ─► delay ─► volume ─► (mix) ───────────────────┴─► [audio_out]
//!                                                                        │
//!                                                                        ▼
//!                                                         -t clamp, encoder, output
//! ```
//!
//! The filter graph is built as typed nodes ([`graph`]) and rendered to
//! ffmpeg syntax only when the argument vector is serialized.

pub mod archive;
pub mod audio;
pub mod compiler;
pub mod context;
pub mod download;
pub mod encoder;
pub mod export;
pub mod graph;
pub mod layout;
pub mod probe;
pub mod process;
pub mod recipe;
pub mod sources;

pub use compiler::*;
pub use context::*;
pub use encoder::*;
pub use export::*;
