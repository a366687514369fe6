use thiserror::Error;

/// Result type for syncweave operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types raised while transforming or emitting classes.
///
/// Configuration and resolution errors abort the transformation of the one
/// class they occurred in; unrelated classes are unaffected. There is no
/// retry path anywhere: the same bytecode in produces the same decision out.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A class, member or annotation is set up in a way the engine rejects.
    #[error("configuration error in {class}: {message}")]
    Config { class: String, message: String },

    /// A class identity could not be resolved during a hierarchy walk.
    #[error("cannot resolve class {name}")]
    Resolution { name: String },

    /// More synced members than the wire index width supports.
    #[error("{class} hierarchy declares {count} synced members, exceeding the short index range")]
    Capacity { class: String, count: usize },

    /// Malformed input to the instruction model, detected at build time.
    #[error("code generation error: {message}")]
    CodeGen { message: String },

    /// A generated read routine met a token it cannot dispatch.
    #[error("wire format error: {message}")]
    WireFormat { message: String },
}

impl Error {
    pub fn config(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config { class: class.into(), message: message.into() }
    }

    pub fn resolution(name: impl Into<String>) -> Self {
        Self::Resolution { name: name.into() }
    }

    pub fn codegen(message: impl Into<String>) -> Self {
        Self::CodeGen { message: message.into() }
    }

    pub fn wire(message: impl Into<String>) -> Self {
        Self::WireFormat { message: message.into() }
    }
}
