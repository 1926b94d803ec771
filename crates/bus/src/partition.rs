use parking_lot::RwLock;
use tokio::sync::broadcast;

use agentmesh_domain::EventRecord;

/// One ordered, append-only log within a topic. `offset` is the index of
/// a record within this partition's log — stable for the partition's
/// lifetime, never reused.
pub struct Partition {
    log: RwLock<Vec<EventRecord>>,
    live: broadcast::Sender<EventRecord>,
}

impl Default for Partition {
    fn default() -> Self {
        let (live, _) = broadcast::channel(1024);
        Self {
            log: RwLock::new(Vec::new()),
            live,
        }
    }
}

impl Partition {
    /// Append `record`, returning its offset.
    pub fn append(&self, record: EventRecord) -> u64 {
        let mut log = self.log.write();
        let offset = log.len() as u64;
        log.push(record.clone());
        // No receivers is not an error: live tailing is best-effort.
        let _ = self.live.send(record);
        offset
    }

    pub fn get(&self, offset: u64) -> Option<EventRecord> {
        self.log.read().get(offset as usize).cloned()
    }

    pub fn len(&self) -> u64 {
        self.log.read().len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EventRecord> {
        self.live.subscribe()
    }
}
