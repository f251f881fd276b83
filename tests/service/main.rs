//! Service tests: the embedded, remote and redundant backends.

mod remote;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use dakv::network::Server;
use dakv::service::{DbStorageService, ServiceResult, StorageService};
use dakv::{CancellationToken, Config, StorageError};
use parking_lot::Mutex;
use tempfile::TempDir;

/// In-memory backend that can be switched off
pub struct MemoryBackend {
    name: &'static str,
    records: Mutex<HashMap<Vec<u8>, (Vec<u8>, u64)>>,
    down: AtomicBool,
}

impl MemoryBackend {
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            records: Mutex::new(HashMap::new()),
            down: AtomicBool::new(false),
        })
    }

    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    /// Stored (value, timeout) for a key, bypassing the down switch
    pub fn stored(&self, key: &[u8]) -> Option<(Vec<u8>, u64)> {
        self.records.lock().get(key).cloned()
    }

    fn check_up(&self) -> ServiceResult<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StorageError::BackendUnavailable(format!("{} is down", self.name)));
        }
        Ok(())
    }
}

impl StorageService for MemoryBackend {
    fn read(&self, key: &[u8]) -> ServiceResult<Vec<u8>> {
        self.check_up()?;
        if key.is_empty() {
            return Err(StorageError::InvalidArgument("empty key".to_string()));
        }
        self.stored(key)
            .map(|(value, _)| value)
            .ok_or(StorageError::NotFound)
    }

    fn write(&self, key: &[u8], value: &[u8], timeout_secs: u64) -> ServiceResult<()> {
        self.check_up()?;
        if key.is_empty() {
            return Err(StorageError::InvalidArgument("empty key".to_string()));
        }
        self.records
            .lock()
            .insert(key.to_vec(), (value.to_vec(), timeout_secs));
        Ok(())
    }

    fn sync(&self) -> ServiceResult<()> {
        self.check_up()
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Memory({})", self.name)
    }
}

/// Store config for tests: ephemeral port, short idle timeout
pub fn test_config(dir: &TempDir) -> Config {
    Config::builder()
        .data_dir(dir.path())
        .listen_addr("127.0.0.1:0")
        .read_timeout_ms(300)
        .write_timeout_ms(1000)
        .build()
}

/// A `dakv-server` over a fresh directory, running on a background thread
pub struct TestServer {
    pub addr: String,
    pub store: Arc<DbStorageService>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
    _temp: TempDir,
}

impl TestServer {
    pub fn start() -> Self {
        Self::start_with(|config| config)
    }

    pub fn start_with(tune: impl FnOnce(Config) -> Config) -> Self {
        let temp = TempDir::new().unwrap();
        let config = tune(test_config(&temp));
        let token = CancellationToken::new();

        let store = Arc::new(DbStorageService::open(config.clone(), token.clone()).unwrap());
        let server = Server::bind(
            config,
            Arc::clone(&store) as Arc<dyn StorageService>,
            token.clone(),
        )
        .unwrap();
        let addr = server.local_addr().to_string();

        let handle = thread::spawn(move || server.run().unwrap());

        Self {
            addr,
            store,
            token,
            handle: Some(handle),
            _temp: temp,
        }
    }

    /// Cancel and wait for the accept loop and every connection to finish
    pub fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.stop();
    }
}
