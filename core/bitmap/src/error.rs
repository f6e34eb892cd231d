use thiserror::Error;

#[derive(Error, Debug)]
pub enum BitmapError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Invalid bitmap: {0}")]
    InvalidBitmap(String),
    #[error("Insufficient data for {what}: expected {expected}, got {actual}")]
    InsufficientData {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("Color plate data size mismatch: expected {expected} bytes, got {actual}")]
    ColorPlateSize { expected: usize, actual: usize },
    #[error("Unsupported: {0}")]
    Unsupported(String),
    #[error("Invalid sprite budget {0} (must be a power of two between 32 and 2048)")]
    InvalidSpriteBudget(u32),
    #[error("Sprite budget exceeded: could not fit sprites into {count} sheet(s) of {length}x{length}")]
    SpriteBudgetExceeded { count: usize, length: u32 },
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, BitmapError>;
