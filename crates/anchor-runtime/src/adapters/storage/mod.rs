//! Storage backends for the queue and the transaction ledger.

#[cfg(feature = "rocksdb")]
pub mod rocksdb_adapter;

#[cfg(feature = "rocksdb")]
pub use rocksdb_adapter::{RocksDbConfig, RocksDbStore};

/// Free space on the volume holding `path`, as a percentage of its size.
#[cfg(feature = "rocksdb")]
pub fn available_disk_space_percent(path: &std::path::Path) -> std::io::Result<u8> {
    let available = fs2::available_space(path)?;
    let total = fs2::total_space(path)?;
    if total == 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::Other,
            "Unable to determine disk space",
        ));
    }
    Ok(((available as f64 / total as f64) * 100.0) as u8)
}
