/// A private working directory for temporary files, removed when closed or dropped.
#[derive(Debug)]
pub struct ScratchDir {
    dir: tempfile::TempDir,
}
impl ScratchDir {
    pub fn new() -> std::io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("paintdoc-").tempdir()?;
        log::debug!("created scratch dir {}", dir.path().display());
        Ok(Self { dir })
    }
    #[must_use]
    pub fn path(&self) -> &std::path::Path {
        self.dir.path()
    }
    /// Remove the directory and everything in it, reporting failure to the log.
    pub fn close(self) {
        let path = self.dir.path().to_owned();
        match self.dir.close() {
            Ok(()) => log::debug!("removed scratch dir {}", path.display()),
            Err(e) => log::warn!("failed to remove scratch dir {}: {e}", path.display()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::ScratchDir;
    #[test]
    fn close_removes() {
        let scratch = ScratchDir::new().unwrap();
        let path = scratch.path().to_owned();
        std::fs::write(path.join("file"), b"data").unwrap();
        scratch.close();
        assert!(!path.exists());
    }
}
