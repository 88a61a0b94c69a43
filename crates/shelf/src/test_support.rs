use std::fs;
use std::io::Write;
use std::path::Path;

const HEADER_LEN: u64 = 44;
/// 8 kHz mono 16-bit PCM, i.e. 128 kbps.
const BYTES_PER_SEC: u64 = 16_000;

/// Writes a silent PCM WAV file of exactly `total_bytes` bytes. Large files
/// are sparse.
pub fn write_sized_wav(path: &Path, total_bytes: u64) {
    let data_len = (total_bytes - HEADER_LEN) as u32;
    let mut header = Vec::with_capacity(HEADER_LEN as usize);
    header.extend_from_slice(b"RIFF");
    header.extend_from_slice(&(36 + data_len).to_le_bytes());
    header.extend_from_slice(b"WAVEfmt ");
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&1u16.to_le_bytes());
    header.extend_from_slice(&8_000u32.to_le_bytes());
    header.extend_from_slice(&(BYTES_PER_SEC as u32).to_le_bytes());
    header.extend_from_slice(&2u16.to_le_bytes());
    header.extend_from_slice(&16u16.to_le_bytes());
    header.extend_from_slice(b"data");
    header.extend_from_slice(&data_len.to_le_bytes());

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    let mut file = fs::File::create(path).unwrap();
    file.write_all(&header).unwrap();
    file.set_len(total_bytes).unwrap();
}

pub fn write_wav(path: &Path, seconds: u64) {
    write_sized_wav(path, HEADER_LEN + seconds * BYTES_PER_SEC);
}
