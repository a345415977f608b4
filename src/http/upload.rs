//! Connection-private temporary files and the file-upload handle.
//!
//! A [`TempFile`] deletes its backing file exactly once: on [`release`],
//! on drop, or never if it was [`persist`]ed somewhere else.
//!
//! [`release`]: TempFile::release
//! [`persist`]: TempFile::persist

use std::{
    fs::File,
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
};
use tempfile::{Builder, NamedTempFile};

#[derive(Debug)]
pub struct TempFile {
    inner: Option<NamedTempFile>,
    len: u64,
}

impl TempFile {
    /// Creates a fresh file in `dir` (or the system temp directory).
    pub fn create(dir: Option<&Path>) -> io::Result<Self> {
        let mut builder = Builder::new();
        builder.prefix("sluice-").suffix(".upload");

        let file = match dir {
            Some(dir) => builder.tempfile_in(dir)?,
            None => builder.tempfile()?,
        };
        Ok(Self {
            inner: Some(file),
            len: 0,
        })
    }

    #[inline]
    fn released() -> io::Error {
        io::Error::new(io::ErrorKind::NotFound, "temporary file already released")
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let file = self.inner.as_mut().ok_or_else(Self::released)?;
        file.write_all(bytes)?;
        self.len += bytes.len() as u64;
        Ok(())
    }

    /// Bytes written so far.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.inner.as_ref().map(|file| file.path())
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.inner.is_none()
    }

    /// Reads the whole content back.
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        let file = self.inner.as_mut().ok_or_else(Self::released)?;
        file.flush()?;
        file.seek(SeekFrom::Start(0))?;

        let mut content = Vec::with_capacity(self.len as usize);
        file.read_to_end(&mut content)?;
        Ok(content)
    }

    /// Opens an independent read handle positioned at the start.
    pub fn reopen(&self) -> io::Result<File> {
        self.inner.as_ref().ok_or_else(Self::released)?.reopen()
    }

    /// Moves the file to `dest`; it is no longer deleted by this handle.
    ///
    /// On failure the file stays temporary and is deleted with the handle.
    pub fn persist<P: AsRef<Path>>(mut self, dest: P) -> io::Result<()> {
        let mut file = self.inner.take().ok_or_else(Self::released)?;
        file.flush()?;
        file.persist(dest)?;
        Ok(())
    }

    /// Closes and deletes the file. Safe to call any number of times.
    pub fn release(&mut self) {
        if let Some(file) = self.inner.take() {
            let path = file.path().to_path_buf();
            if let Err(err) = file.close() {
                tracing::debug!(path = %path.display(), %err, "failed to remove temporary file");
            }
        }
    }
}

/// A file field of a multipart POST body.
///
/// Owned by the [`Request`](crate::Request) until a handler takes it with
/// [`Request::take_file_upload`](crate::Request::take_file_upload); the
/// backing file is deleted when the last owner drops it or calls
/// [`release`](Self::release).
#[derive(Debug)]
pub struct FileUpload {
    pub(crate) field: String,
    pub(crate) filename: String,
    pub(crate) content_type: Option<String>,
    pub(crate) file: TempFile,
}

impl FileUpload {
    /// Name of the form field.
    #[inline]
    pub fn field(&self) -> &str {
        &self.field
    }

    /// File name as given by the client. Never trust it as a path.
    #[inline]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[inline]
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.file.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.file.is_empty()
    }

    #[inline]
    pub fn path(&self) -> Option<&Path> {
        self.file.path()
    }

    #[inline]
    pub fn is_released(&self) -> bool {
        self.file.is_released()
    }

    #[inline]
    pub fn read_to_vec(&mut self) -> io::Result<Vec<u8>> {
        self.file.read_to_vec()
    }

    #[inline]
    pub fn open(&self) -> io::Result<File> {
        self.file.reopen()
    }

    #[inline]
    pub fn persist<P: AsRef<Path>>(self, dest: P) -> io::Result<()> {
        self.file.persist(dest)
    }

    #[inline]
    pub fn release(&mut self) {
        self.file.release();
    }
}

#[cfg(test)]
mod temp_file_tests {
    use super::*;
    use std::fs;

    #[test]
    fn write_read_release() {
        let mut file = TempFile::create(None).unwrap();
        let path = file.path().unwrap().to_path_buf();

        file.write_all(b"hello ").unwrap();
        file.write_all(b"world").unwrap();
        assert_eq!(file.len(), 11);
        assert_eq!(file.read_to_vec().unwrap(), b"hello world");

        let mut reader = file.reopen().unwrap();
        let mut content = String::new();
        reader.read_to_string(&mut content).unwrap();
        assert_eq!(content, "hello world");

        assert!(path.exists());
        file.release();
        assert!(!path.exists());
        assert!(file.is_released());

        file.release();
        assert!(file.write_all(b"x").is_err());
        assert!(file.read_to_vec().is_err());
    }

    #[test]
    fn drop_deletes() {
        let file = TempFile::create(None).unwrap();
        let path = file.path().unwrap().to_path_buf();

        assert!(path.exists());
        drop(file);
        assert!(!path.exists());
    }

    #[test]
    fn unique_names() {
        let a = TempFile::create(None).unwrap();
        let b = TempFile::create(None).unwrap();
        assert_ne!(a.path(), b.path());

        let name = a.path().unwrap().file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("sluice-") && name.ends_with(".upload"), "{name}");
    }

    #[test]
    fn created_in_configured_dir() {
        let dir = std::env::temp_dir().join(format!("sluice-dir-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let file = TempFile::create(Some(&dir)).unwrap();
        let path = file.path().unwrap().to_path_buf();
        assert_eq!(path.parent(), Some(dir.as_path()));

        drop(file);
        assert!(!path.exists());
        fs::remove_dir(&dir).unwrap();
    }

    #[test]
    fn failed_persist_still_deletes() {
        let file = TempFile::create(None).unwrap();
        let path = file.path().unwrap().to_path_buf();

        let dest = std::env::temp_dir().join("sluice-missing-dir").join("nested").join("file");
        assert!(file.persist(&dest).is_err());
        assert!(!path.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn persist_keeps_file() {
        let mut file = TempFile::create(None).unwrap();
        file.write_all(b"kept").unwrap();

        let dest = std::env::temp_dir().join(format!("sluice-persist-{}", std::process::id()));
        file.persist(&dest).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"kept");
        fs::remove_file(&dest).unwrap();
    }

    #[test]
    fn upload_handle() {
        let mut file = TempFile::create(None).unwrap();
        file.write_all(b"PNG").unwrap();

        let mut upload = FileUpload {
            field: "avatar".into(),
            filename: "me.png".into(),
            content_type: Some("image/png".into()),
            file,
        };
        let path = upload.path().unwrap().to_path_buf();

        assert_eq!(upload.field(), "avatar");
        assert_eq!(upload.filename(), "me.png");
        assert_eq!(upload.content_type(), Some("image/png"));
        assert_eq!(upload.len(), 3);
        assert_eq!(upload.read_to_vec().unwrap(), b"PNG");

        upload.release();
        assert!(upload.is_released());
        assert!(!path.exists());
    }
}
