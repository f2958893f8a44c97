//! In-memory redb backend whose writes can be switched to fail (tests only).

use redb::backends::InMemoryBackend;
use redb::StorageBackend;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub(crate) struct FailingBackend {
    inner: InMemoryBackend,
    fail: Arc<AtomicBool>,
}

impl FailingBackend {
    /// Backend plus the switch that makes its writes fail
    pub(crate) fn new() -> (Self, Arc<AtomicBool>) {
        let fail = Arc::new(AtomicBool::new(false));
        let backend = Self {
            inner: InMemoryBackend::new(),
            fail: fail.clone(),
        };
        (backend, fail)
    }

    fn check(&self) -> Result<(), io::Error> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        Ok(())
    }
}

impl StorageBackend for FailingBackend {
    fn len(&self) -> Result<u64, io::Error> {
        StorageBackend::len(&self.inner)
    }

    fn read(&self, offset: u64, len: usize) -> Result<Vec<u8>, io::Error> {
        StorageBackend::read(&self.inner, offset, len)
    }

    fn set_len(&self, len: u64) -> Result<(), io::Error> {
        self.check()?;
        StorageBackend::set_len(&self.inner, len)
    }

    fn sync_data(&self, eventual: bool) -> Result<(), io::Error> {
        self.check()?;
        StorageBackend::sync_data(&self.inner, eventual)
    }

    fn write(&self, offset: u64, data: &[u8]) -> Result<(), io::Error> {
        self.check()?;
        StorageBackend::write(&self.inner, offset, data)
    }
}
