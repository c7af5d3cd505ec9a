//! Collaborator contracts and bundled implementations
//!
//! - `decoder` / `output` - traits the engine drives (decoder, sampler, renderer)
//! - `frame` - decoded frame types
//! - `handle` - blocking-pool wrapper owning a native collaborator
//! - `synthetic` / `headless` - test-pattern decoder and null outputs

pub mod decoder;
pub mod frame;
pub mod handle;
pub mod headless;
pub mod output;
pub mod synthetic;

pub use decoder::{Decoder, DecoderFactory, DecoderHandle, Probe};
pub use frame::{AudioFrame, Frame, VideoFrame};
pub use output::{Renderer, Sampler, SamplerFactory, SamplerHandle};
