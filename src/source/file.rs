//! Replay of a recorded IQ capture from disk.

use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;

use super::ChunkSource;
use crate::demod::SampleChunk;

pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

impl ChunkSource for FileSource {
    fn label(&self) -> String {
        format!("file {}", self.path.display())
    }

    fn run(self: Box<Self>, buff_len: usize, tx: Sender<SampleChunk>) -> Result<()> {
        let file = File::open(&self.path)
            .with_context(|| format!("failed to open IQ file {}", self.path.display()))?;
        super::pump(file, buff_len, &tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;
    use std::io::Write;

    #[test]
    fn test_replays_file_contents() {
        let path = std::env::temp_dir().join("modes-capture-file-source-test.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(&[127u8, 127, 227, 127]).unwrap();
        drop(f);

        let (tx, rx) = bounded(1);
        let source = Box::new(FileSource::new(path.clone()));
        let handle = std::thread::spawn(move || source.run(1024, tx));

        let chunk = rx.recv().unwrap();
        assert_eq!(chunk.iq(), &[127, 127, 227, 127]);
        assert!(rx.recv().is_err());
        handle.join().unwrap().unwrap();

        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let (tx, _rx) = bounded(1);
        let source = Box::new(FileSource::new(PathBuf::from(
            "/nonexistent/modes-capture.bin",
        )));
        assert!(source.run(1024, tx).is_err());
    }
}
