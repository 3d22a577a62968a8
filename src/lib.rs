pub mod builder;
pub mod catalog;
pub mod cli;
pub mod error;
pub mod fingerprint;
pub mod form;
pub mod import;
pub mod ini;
pub mod link;
pub mod model;
pub mod options;
pub mod projector;

pub use error::CodecError;
pub use options::CodecOptions;
