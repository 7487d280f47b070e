//! Loading raw PCM audio in gateway-sized chunks.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Splits everything `reader` yields into `chunk_size`-byte chunks; the
/// final chunk keeps its true (shorter) length.
pub fn load_pcm_chunks<R: Read>(mut reader: R, chunk_size: usize) -> io::Result<Vec<Vec<u8>>> {
    if chunk_size == 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "chunk size must be non-zero",
        ));
    }
    let mut data = Vec::new();
    reader.read_to_end(&mut data)?;
    Ok(data.chunks(chunk_size).map(<[u8]>::to_vec).collect())
}

/// Reads a PCM file in `chunk_size`-byte chunks.
pub fn load_pcm_file(path: impl AsRef<Path>, chunk_size: usize) -> io::Result<Vec<Vec<u8>>> {
    load_pcm_chunks(File::open(path)?, chunk_size)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn chunks_evenly_divisible_input() {
        let chunks = load_pcm_chunks(Cursor::new(vec![0u8; 960]), 320).unwrap();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|chunk| chunk.len() == 320));
    }

    #[test]
    fn trailing_chunk_keeps_true_length() {
        let chunks = load_pcm_chunks(Cursor::new(vec![0u8; 700]), 320).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[2].len(), 60);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks = load_pcm_chunks(Cursor::new(Vec::new()), 320).unwrap();
        assert!(chunks.is_empty());
    }

    #[test]
    fn zero_chunk_size_is_rejected() {
        let err = load_pcm_chunks(Cursor::new(vec![0u8; 16]), 0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.pcm");
        std::fs::write(&path, vec![7u8; 500]).unwrap();
        let chunks = load_pcm_file(&path, 320).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len(), 180);
    }
}
