/// Bounded audit history, newest first.
///
/// The whole list lives in one slot as a JSON array. Loads never fail: a missing, corrupt
/// or unreadable slot is an empty history. Appends never fail either; an append that
/// cannot be persisted is logged and dropped. An append whose read failed is dropped too,
/// so entries that could not be read are never overwritten.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use audit_common::error::CommonError;
use audit_common::slot::KvSlot;

use crate::model::{AuditResponse, HistoryItem, ScanMode};

pub const HISTORY_SLOT_NAME: &str = "sharingan_history";
pub const HISTORY_LIMIT: usize = 5;

static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

pub struct HistoryStore {
    slot: KvSlot,
    // Serializes read-modify-write cycles on the slot.
    io: Mutex<()>,
}

impl HistoryStore {
    pub fn new(slot: KvSlot) -> Self {
        Self {
            slot,
            io: Mutex::new(()),
        }
    }

    pub async fn load(&self) -> Vec<HistoryItem> {
        let _guard = self.io.lock().await;
        self.read_unlocked().await.unwrap_or_else(|e| {
            warn!(error = %e, slot = %self.slot.describe(), "history read failed, treating as empty");
            Vec::new()
        })
    }

    /// Prepend `item`, keep the newest `HISTORY_LIMIT`, and persist.
    pub async fn append(&self, item: HistoryItem) {
        let _guard = self.io.lock().await;
        let mut items = match self.read_unlocked().await {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    error = %e,
                    slot = %self.slot.describe(),
                    company = %item.company,
                    "history read failed, audit not persisted"
                );
                return;
            }
        };
        items.insert(0, item);
        // Appends from overlapping scans may land out of order.
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        items.truncate(HISTORY_LIMIT);

        let raw = match serde_json::to_string(&items) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "history serialization failed, not persisted");
                return;
            }
        };
        match self.slot.write(&raw).await {
            Ok(()) => debug!(slot = %self.slot.describe(), entries = items.len(), "history persisted"),
            Err(e) => warn!(error = %e, slot = %self.slot.describe(), "history write failed"),
        }
    }

    /// Missing and corrupt data both read as empty; only a failed read is an error.
    async fn read_unlocked(&self) -> Result<Vec<HistoryItem>, CommonError> {
        let Some(raw) = self.slot.read().await? else {
            return Ok(Vec::new());
        };
        match serde_json::from_str::<Vec<HistoryItem>>(&raw) {
            Ok(mut items) => {
                items.truncate(HISTORY_LIMIT);
                Ok(items)
            }
            Err(e) => {
                warn!(error = %e, slot = %self.slot.describe(), "history is corrupt, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Hold the slot lock, stalling every load and append until the guard drops.
    #[cfg(test)]
    pub(crate) async fn hold_io(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.io.lock().await
    }
}

impl HistoryItem {
    pub fn new(company: &str, mode: ScanMode, data: Arc<AuditResponse>) -> Self {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_else(|_| Duration::from_secs(0));
        Self {
            id: new_history_id(now),
            timestamp: now.as_millis() as i64,
            company: company.to_string(),
            mode,
            data,
        }
    }
}

fn new_history_id(now: Duration) -> String {
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();

    let mut h = Sha256::new();
    h.update(now.as_nanos().to_le_bytes());
    h.update(pid.to_le_bytes());
    h.update(counter.to_le_bytes());
    let digest = h.finalize();
    hex_lower(&digest[..16])
}

fn hex_lower(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AuditScores, GroundingCitation};

    fn response(report: &str) -> Arc<AuditResponse> {
        Arc::new(AuditResponse {
            markdown_report: report.to_string(),
            scores: AuditScores {
                aesthetics: 70,
                storytelling: 60,
                authority: 50,
                ux: 40,
                uniqueness: 30,
            },
            vision_prompts: vec!["gold leaf on black".to_string()],
            versus_report: None,
            citations: vec![GroundingCitation {
                uri: Some("https://example.com".to_string()),
                title: Some("Example".to_string()),
            }],
        })
    }

    fn item(company: &str) -> HistoryItem {
        HistoryItem::new(company, ScanMode::Standard, response(company))
    }

    #[test]
    fn test_ids_are_unique_hex() {
        let a = item("Acme");
        let b = item("Acme");
        assert_ne!(a.id, b.id);
        assert_eq!(a.id.len(), 32);
        assert!(a.id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(a.timestamp > 0);
    }

    #[tokio::test]
    async fn test_empty_slot_loads_empty() {
        let store = HistoryStore::new(KvSlot::memory());
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_round_trip_zero_to_five_items() {
        for n in 0..=HISTORY_LIMIT {
            let slot = KvSlot::memory();
            let items: Vec<HistoryItem> = (0..n).map(|i| item(&format!("Brand {i}"))).collect();
            slot.write(&serde_json::to_string(&items).unwrap())
                .await
                .unwrap();

            let loaded = HistoryStore::new(slot).load().await;
            assert_eq!(loaded, items, "round trip of {n} items");
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let store = HistoryStore::new(KvSlot::memory());
        store.append(item("Acme")).await;
        store.append(item("Globex")).await;
        let first = store.load().await;
        let second = store.load().await;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[tokio::test]
    async fn test_sixth_append_evicts_oldest() {
        let store = HistoryStore::new(KvSlot::memory());
        let appended: Vec<HistoryItem> = (1..=6).map(|i| item(&format!("Brand {i}"))).collect();
        for it in &appended {
            store.append(it.clone()).await;
        }

        let stored = store.load().await;
        assert_eq!(stored.len(), HISTORY_LIMIT);
        let companies: Vec<&str> = stored.iter().map(|i| i.company.as_str()).collect();
        assert_eq!(
            companies,
            vec!["Brand 6", "Brand 5", "Brand 4", "Brand 3", "Brand 2"]
        );
        assert!(stored.iter().all(|i| i.id != appended[0].id));
    }

    #[tokio::test]
    async fn test_same_company_is_not_deduplicated() {
        let store = HistoryStore::new(KvSlot::memory());
        store.append(item("Acme")).await;
        store.append(item("Acme")).await;
        assert_eq!(store.load().await.len(), 2);
    }

    #[tokio::test]
    async fn test_corrupt_slot_is_empty_and_recoverable() {
        for raw in ["not json", "{\"id\": 1}", "[{\"id\": \"x\"}]", "[1, 2, 3]"] {
            let slot = KvSlot::memory();
            slot.write(raw).await.unwrap();
            let store = HistoryStore::new(slot.clone());
            assert!(store.load().await.is_empty(), "{raw:?} should load as empty");

            store.append(item("Acme")).await;
            let loaded = store.load().await;
            assert_eq!(loaded.len(), 1);
            assert_eq!(loaded[0].company, "Acme");
        }
    }

    #[tokio::test]
    async fn test_overlong_slot_is_truncated_on_load() {
        let slot = KvSlot::memory();
        let items: Vec<HistoryItem> = (0..8).map(|i| item(&format!("Brand {i}"))).collect();
        slot.write(&serde_json::to_string(&items).unwrap())
            .await
            .unwrap();
        let loaded = HistoryStore::new(slot).load().await;
        assert_eq!(loaded, items[..HISTORY_LIMIT].to_vec());
    }

    #[tokio::test]
    async fn test_file_slot_persists_across_stores() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let first = HistoryStore::new(KvSlot::file(&path));
        let original = item("Acme");
        first.append(original.clone()).await;

        let second = HistoryStore::new(KvSlot::file(&path));
        assert_eq!(second.load().await, vec![original]);
    }

    #[tokio::test]
    async fn test_unreachable_slot_does_not_fail() {
        let redis = audit_common::redis::RedisStore::open("redis://127.0.0.1:1/").unwrap();
        let store = HistoryStore::new(KvSlot::redis(redis, HISTORY_SLOT_NAME));
        store.append(item("Acme")).await;
        assert!(store.load().await.is_empty());
    }

    #[tokio::test]
    async fn test_failed_read_does_not_overwrite_stored_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        // A directory cannot be read as a file, but a write next to it would succeed.
        std::fs::create_dir(&path).unwrap();

        let store = HistoryStore::new(KvSlot::file(&path));
        assert!(store.load().await.is_empty());
        store.append(item("Acme")).await;

        assert!(path.is_dir());
        assert!(!dir.path().join("history.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_non_utf8_file_is_corrupt_and_recoverable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, [0xff, 0xfe, 0x00]).unwrap();

        let store = HistoryStore::new(KvSlot::file(&path));
        assert!(store.load().await.is_empty());
        store.append(item("Acme")).await;
        assert_eq!(store.load().await.len(), 1);
    }

    #[tokio::test]
    async fn test_late_append_keeps_newest_first() {
        let store = HistoryStore::new(KvSlot::memory());
        let mut older = item("Older");
        older.timestamp -= 1_000;
        store.append(item("Newer")).await;
        store.append(older).await;

        let companies: Vec<String> = store.load().await.into_iter().map(|i| i.company).collect();
        assert_eq!(companies, vec!["Newer", "Older"]);
    }
}
