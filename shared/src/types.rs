/// Identity of a stored file, assigned by the server's metadata store.
pub type FileId = i64;

/// Client-chosen identifier correlating one download across reconnects.
pub type ResumeToken = String;
