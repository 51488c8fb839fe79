use thiserror::Error;

/// Error taxonomy of the filesystem service.
///
/// Every variant except [`FsError::Io`] corresponds to a request the service
/// refuses by policy; `Io` carries any other host I/O failure unchanged.
#[derive(Debug, Error)]
pub enum FsError {
    #[error("path is required")]
    PathRequired,

    #[error("invalid path")]
    InvalidPath,

    #[error("path does not exist")]
    PathNotFound,

    #[error("path is a directory")]
    PathIsDirectory,

    #[error("path is not a directory")]
    PathNotDirectory,

    #[error("directory delete requires recursive=true")]
    DirectoryNeedsRecursive,

    #[error("file too large")]
    FileTooLarge,

    #[error("content too large")]
    ContentTooLarge,

    #[error("binary files are not supported")]
    BinaryFile,

    #[error("unsupported file type")]
    UnsupportedFileType,

    #[error("refusing to mutate filesystem root")]
    RefuseFilesystemRoot,

    #[error("file already exists")]
    FileAlreadyExists,

    #[error("no paths provided")]
    NoWorkspacePaths,

    #[error("too many paths provided")]
    TooManyWorkspacePaths,

    #[error("operation canceled")]
    Canceled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
