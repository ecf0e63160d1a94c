use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use log::warn;

use crate::common::{MinnowError, PageId, Result, PAGE_SIZE};

use super::DiskManager;

/// Represents a disk I/O request
pub struct DiskRequest {
    /// Whether this is a write (true) or read (false) request
    pub is_write: bool,
    /// The page ID to read/write
    pub page_id: PageId,
    /// Pointer to the data buffer (must be PAGE_SIZE bytes)
    /// For reads: data will be written here
    /// For writes: data will be read from here
    pub data: *mut u8,
    /// One-shot completion signal, fired with the I/O outcome
    pub callback: Option<std::sync::mpsc::Sender<bool>>,
}

// Safety: requests are consumed by the single scheduler worker thread and
// the caller must keep the data pointer valid until the callback fires
unsafe impl Send for DiskRequest {}

impl DiskRequest {
    /// Creates a new read request
    pub fn read(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: false,
            page_id,
            data,
            callback: None,
        }
    }

    /// Creates a new write request
    pub fn write(page_id: PageId, data: *mut u8) -> Self {
        Self {
            is_write: true,
            page_id,
            data,
            callback: None,
        }
    }

    /// Sets the completion callback for this request
    pub fn with_callback(mut self, callback: std::sync::mpsc::Sender<bool>) -> Self {
        self.callback = Some(callback);
        self
    }
}

/// DiskScheduler manages a background worker thread that processes disk I/O
/// requests in FIFO order. Shutdown is signalled by enqueuing a sentinel
/// (`None`); every request scheduled before it is served first, then the
/// worker exits and the destructor joins it.
pub struct DiskScheduler {
    /// The disk manager for actual I/O operations
    disk_manager: Arc<DiskManager>,
    /// Channel sender for queuing requests; None is the shutdown sentinel
    request_sender: Sender<Option<DiskRequest>>,
    /// Handle to the background worker thread
    worker_handle: Option<JoinHandle<()>>,
}

impl DiskScheduler {
    /// Creates a new DiskScheduler with the given DiskManager.
    /// Spawns a background worker thread to process requests.
    pub fn new(disk_manager: Arc<DiskManager>) -> Self {
        let (sender, receiver) = bounded::<Option<DiskRequest>>(128);

        let dm_clone = Arc::clone(&disk_manager);
        let worker_handle = thread::spawn(move || {
            Self::run_worker(dm_clone, receiver);
        });

        Self {
            disk_manager,
            request_sender: sender,
            worker_handle: Some(worker_handle),
        }
    }

    /// Schedules a disk request for processing by the background worker.
    pub fn schedule(&self, request: DiskRequest) -> Result<()> {
        self.request_sender
            .send(Some(request))
            .map_err(|e| MinnowError::DiskScheduler(format!("Failed to schedule request: {}", e)))
    }

    /// Schedules a read request and waits for completion.
    pub fn schedule_read_sync(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        let request = DiskRequest::read(page_id, data.as_mut_ptr()).with_callback(tx);

        self.schedule(request)?;

        let success = rx.recv().map_err(|e| {
            MinnowError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?;
        if !success {
            return Err(MinnowError::DiskScheduler(format!(
                "Read of {} failed",
                page_id
            )));
        }

        Ok(())
    }

    /// Schedules a write request and waits for completion.
    pub fn schedule_write_sync(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE);

        let (tx, rx) = std::sync::mpsc::channel();
        // The worker only reads from the buffer for writes, so handing the
        // const pointer over as *mut is fine
        let request = DiskRequest::write(page_id, data.as_ptr() as *mut u8).with_callback(tx);

        self.schedule(request)?;

        let success = rx.recv().map_err(|e| {
            MinnowError::DiskScheduler(format!("Failed to receive completion: {}", e))
        })?;
        if !success {
            return Err(MinnowError::DiskScheduler(format!(
                "Write of {} failed",
                page_id
            )));
        }

        Ok(())
    }

    /// The background worker loop. Requests are served strictly in enqueue
    /// order; the sentinel (or a disconnected channel) ends the loop.
    fn run_worker(disk_manager: Arc<DiskManager>, receiver: Receiver<Option<DiskRequest>>) {
        loop {
            match receiver.recv() {
                Ok(Some(request)) => Self::process_request(&disk_manager, request),
                Ok(None) | Err(_) => break,
            }
        }
    }

    /// Processes a single disk request and fires its completion signal.
    fn process_request(disk_manager: &DiskManager, request: DiskRequest) {
        let result = if request.is_write {
            // Safety: caller keeps the buffer valid for PAGE_SIZE bytes
            // until the callback fires
            let data = unsafe { std::slice::from_raw_parts(request.data, PAGE_SIZE) };
            disk_manager.write_page(request.page_id, data)
        } else {
            // Safety: as above
            let data = unsafe { std::slice::from_raw_parts_mut(request.data, PAGE_SIZE) };
            disk_manager.read_page(request.page_id, data)
        };

        if let Err(e) = &result {
            warn!(
                "disk worker: {} of {} failed: {}",
                if request.is_write { "write" } else { "read" },
                request.page_id,
                e
            );
        }

        if let Some(callback) = request.callback {
            let _ = callback.send(result.is_ok());
        }
    }

    /// Returns a reference to the underlying DiskManager.
    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        &self.disk_manager
    }
}

impl Drop for DiskScheduler {
    fn drop(&mut self) {
        // Enqueue the sentinel; everything before it drains first
        let _ = self.request_sender.send(None);

        if let Some(handle) = self.worker_handle.take() {
            let _ = handle.join();
        }
    }
}
