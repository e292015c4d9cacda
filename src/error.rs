use thiserror::Error;

/// Everything that can go wrong between a file landing on the server and an
/// edited image landing in the history. None of these are fatal; the session
/// turns them into a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("An error occurred while processing your image: {0}")]
    ReadError(String),

    #[error("Please upload a valid image file (e.g. PNG, JPG, WEBP), got '{0}'")]
    InvalidFileType(String),

    #[error("The model returned no image. Please try a different instruction.")]
    NoImageProduced,

    #[error("Failed to generate image: {0}")]
    GenerationFailed(String),
}

impl From<std::io::Error> for EditError {
    fn from(e: std::io::Error) -> Self {
        EditError::ReadError(e.to_string())
    }
}

impl From<reqwest::Error> for EditError {
    fn from(e: reqwest::Error) -> Self {
        EditError::GenerationFailed(e.to_string())
    }
}
