use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use chrono::{Datelike, Local, NaiveDate};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::emoji::{self, CustomEmoji, EmojiFetcher, FetchError};

const FILE_SUFFIX: &str = ".custom-emoji.json";
const UNIX_EPOCH_DAYS_FROM_CE: i64 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DayIndex(pub i64);

impl DayIndex {
    pub fn from_date(date: NaiveDate) -> Self {
        DayIndex(i64::from(date.num_days_from_ce()) - UNIX_EPOCH_DAYS_FROM_CE)
    }
}

pub trait Clock: Send + Sync {
    fn today(&self) -> DayIndex;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> DayIndex {
        DayIndex::from_date(Local::now().date_naive())
    }
}

#[derive(Debug)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(day: DayIndex) -> Self {
        Self(AtomicI64::new(day.0))
    }

    pub fn set(&self, day: DayIndex) {
        self.0.store(day.0, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> DayIndex {
        DayIndex(self.0.load(Ordering::SeqCst))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    pub emojis: Vec<CustomEmoji>,
    pub fetched_day: DayIndex,
}

impl CacheEntry {
    pub fn is_stale(&self, today: DayIndex) -> bool {
        self.fetched_day < today
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistError {
    #[error("refusing to cache listing for host {0:?}")]
    InvalidHost(String),
    #[error("emoji cache io: {0}")]
    Io(#[from] io::Error),
    #[error("emoji cache encode: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum RefreshError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Persist(#[from] PersistError),
}

#[derive(Clone, Default)]
pub struct Options {
    pub dir: Option<PathBuf>,
    pub clock: Option<Arc<dyn Clock>>,
}

pub struct EmojiCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    store: Option<DiskStore>,
    clock: Arc<dyn Clock>,
}

impl EmojiCache {
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
            clock,
        }
    }

    pub fn open(options: Options) -> Result<Self, PersistError> {
        let clock = options.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let Some(dir) = options.dir else {
            return Ok(Self::in_memory(clock));
        };

        let store = DiskStore::new(dir)?;
        let entries = store.load_all()?;
        tracing::debug!(
            dir = %store.dir.display(),
            hosts = entries.len(),
            "emoji cache loaded"
        );

        Ok(Self {
            entries: RwLock::new(entries),
            store: Some(store),
            clock,
        })
    }

    pub fn today(&self) -> DayIndex {
        self.clock.today()
    }

    pub fn dir(&self) -> Option<&Path> {
        self.store.as_ref().map(|store| store.dir.as_path())
    }

    pub fn get(&self, host: &str) -> Option<Vec<CustomEmoji>> {
        let today = self.today();
        self.entries
            .read()
            .get(host)
            .filter(|entry| !entry.is_stale(today))
            .map(|entry| entry.emojis.clone())
    }

    pub fn lookup(&self, host: &str, shortcode: &str) -> Option<CustomEmoji> {
        let today = self.today();
        let entries = self.entries.read();
        let entry = entries.get(host).filter(|entry| !entry.is_stale(today))?;
        emoji::find(&entry.emojis, shortcode).cloned()
    }

    pub fn entry(&self, host: &str) -> Option<CacheEntry> {
        self.entries.read().get(host).cloned()
    }

    pub fn is_fresh(&self, host: &str) -> bool {
        let today = self.today();
        self.entries
            .read()
            .get(host)
            .is_some_and(|entry| !entry.is_stale(today))
    }

    pub fn hosts(&self) -> Vec<String> {
        let mut hosts: Vec<String> = self.entries.read().keys().cloned().collect();
        hosts.sort();
        hosts
    }

    /// Replaces the listing for `host` as fetched today. The in-memory entry
    /// is replaced even when writing the file fails; an invalid host touches nothing.
    pub fn insert(&self, host: &str, emojis: Vec<CustomEmoji>) -> Result<(), PersistError> {
        if !emoji::is_valid_host(host) {
            return Err(PersistError::InvalidHost(host.to_string()));
        }
        let entry = CacheEntry {
            emojis,
            fetched_day: self.today(),
        };
        let persisted = match &self.store {
            Some(store) => store.save(host, &entry),
            None => Ok(()),
        };
        self.entries.write().insert(host.to_string(), entry);
        persisted
    }

    pub fn refresh(
        &self,
        host: &str,
        fetcher: &dyn EmojiFetcher,
    ) -> Result<Vec<CustomEmoji>, RefreshError> {
        let emojis = fetcher.fetch(host)?;
        self.insert(host, emojis.clone())?;
        Ok(emojis)
    }
}

struct DiskStore {
    dir: PathBuf,
}

impl DiskStore {
    fn new(dir: PathBuf) -> Result<Self, PersistError> {
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    fn load_all(&self) -> Result<HashMap<String, CacheEntry>, PersistError> {
        let mut candidates: HashMap<String, Vec<(DayIndex, PathBuf)>> = HashMap::new();
        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            let Some((host, day)) = name.to_str().and_then(parse_file_name) else {
                continue;
            };
            candidates
                .entry(host)
                .or_default()
                .push((day, dir_entry.path()));
        }

        let mut entries = HashMap::new();
        for (host, mut files) in candidates {
            files.sort_by(|a, b| b.0.cmp(&a.0));
            for (day, path) in files {
                if entries.contains_key(&host) {
                    remove_quietly(&path);
                    continue;
                }
                match read_listing(&path) {
                    Ok(emojis) => {
                        entries.insert(
                            host.clone(),
                            CacheEntry {
                                emojis,
                                fetched_day: day,
                            },
                        );
                    }
                    Err(err) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %err,
                            "deleting unreadable emoji cache file"
                        );
                        remove_quietly(&path);
                    }
                }
            }
        }
        Ok(entries)
    }

    fn save(&self, host: &str, entry: &CacheEntry) -> Result<(), PersistError> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer(&mut tmp, &entry.emojis)?;
        tmp.flush()?;
        let path = self.dir.join(file_name(host, entry.fetched_day));
        tmp.persist(&path).map_err(|err| err.error)?;

        for dir_entry in fs::read_dir(&self.dir)? {
            let dir_entry = dir_entry?;
            let name = dir_entry.file_name();
            if let Some((other_host, day)) = name.to_str().and_then(parse_file_name) {
                if other_host == host && day != entry.fetched_day {
                    remove_quietly(&dir_entry.path());
                }
            }
        }
        Ok(())
    }
}

fn read_listing(path: &Path) -> Result<Vec<CustomEmoji>, PersistError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

fn remove_quietly(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        tracing::debug!(path = %path.display(), error = %err, "remove emoji cache file");
    }
}

pub fn file_name(host: &str, day: DayIndex) -> String {
    format!("{}-{host}{FILE_SUFFIX}", day.0)
}

pub fn parse_file_name(name: &str) -> Option<(String, DayIndex)> {
    let stem = name.strip_suffix(FILE_SUFFIX)?;
    let (day, host) = stem.split_once('-')?;
    let day = day.parse::<i64>().ok()?;
    if !emoji::is_valid_host(host) {
        return None;
    }
    Some((host.to_string(), DayIndex(day)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    const YESTERDAY: DayIndex = DayIndex(19_999);
    const TODAY: DayIndex = DayIndex(20_000);
    const TOMORROW: DayIndex = DayIndex(20_001);

    struct StaticFetcher {
        result: Option<Vec<CustomEmoji>>,
        calls: AtomicUsize,
    }

    impl StaticFetcher {
        fn ok(emojis: Vec<CustomEmoji>) -> Self {
            Self {
                result: Some(emojis),
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                result: None,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl EmojiFetcher for StaticFetcher {
        fn fetch(&self, host: &str) -> Result<Vec<CustomEmoji>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| FetchError::InvalidHost(host.to_string()))
        }
    }

    fn blobcat() -> CustomEmoji {
        CustomEmoji::new("blobcat", "https://x/blobcat.png")
    }

    fn open(dir: &Path, clock: Arc<FixedClock>) -> EmojiCache {
        EmojiCache::open(Options {
            dir: Some(dir.to_path_buf()),
            clock: Some(clock as Arc<dyn Clock>),
        })
        .unwrap()
    }

    #[test]
    fn day_index_counts_from_unix_epoch() {
        let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
        assert_eq!(DayIndex::from_date(epoch), DayIndex(0));
        let later = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(DayIndex::from_date(later), DayIndex(19_723));
    }

    #[test]
    fn file_names_round_trip_hosts_with_dashes() {
        let name = file_name("social.example-host.org", TODAY);
        assert_eq!(name, "20000-social.example-host.org.custom-emoji.json");
        assert_eq!(
            parse_file_name(&name),
            Some(("social.example-host.org".to_string(), TODAY))
        );
        assert_eq!(parse_file_name("notes.txt"), None);
        assert_eq!(parse_file_name("x-host.custom-emoji.json"), None);
    }

    #[test]
    fn stale_entries_read_as_missing() {
        let entry = CacheEntry {
            emojis: vec![],
            fetched_day: YESTERDAY,
        };
        assert!(entry.is_stale(TODAY));
        assert!(!entry.is_stale(YESTERDAY));
    }

    #[test]
    fn refresh_persists_and_reloads() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(TODAY));
        let cache = open(dir.path(), clock.clone());
        assert!(cache.get("chaos.social").is_none());

        let fetcher = StaticFetcher::ok(vec![blobcat()]);
        cache.refresh("chaos.social", &fetcher).unwrap();
        assert_eq!(cache.get("chaos.social").unwrap(), vec![blobcat()]);
        assert!(dir.path().join(file_name("chaos.social", TODAY)).exists());

        let reopened = open(dir.path(), clock);
        assert_eq!(reopened.lookup("chaos.social", "blobcat"), Some(blobcat()));
        assert_eq!(reopened.hosts(), vec!["chaos.social".to_string()]);
    }

    #[test]
    fn yesterdays_file_is_not_used_today() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(YESTERDAY));
        let cache = open(dir.path(), clock.clone());
        cache
            .refresh("chaos.social", &StaticFetcher::ok(vec![blobcat()]))
            .unwrap();

        clock.set(TODAY);
        let reopened = open(dir.path(), clock);
        assert!(reopened.get("chaos.social").is_none());
        assert!(reopened.lookup("chaos.social", "blobcat").is_none());
        assert_eq!(
            reopened.entry("chaos.social").unwrap().fetched_day,
            YESTERDAY
        );
    }

    #[test]
    fn day_rollover_applies_mid_session() {
        let clock = Arc::new(FixedClock::new(TODAY));
        let cache = EmojiCache::in_memory(clock.clone());
        cache.insert("chaos.social", vec![blobcat()]).unwrap();
        assert!(cache.is_fresh("chaos.social"));
        clock.set(TOMORROW);
        assert!(!cache.is_fresh("chaos.social"));
    }

    #[test]
    fn newer_listing_replaces_older_file() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(YESTERDAY));
        let cache = open(dir.path(), clock.clone());
        cache.insert("chaos.social", vec![]).unwrap();
        clock.set(TODAY);
        cache.insert("chaos.social", vec![blobcat()]).unwrap();

        assert!(!dir
            .path()
            .join(file_name("chaos.social", YESTERDAY))
            .exists());
        assert!(dir.path().join(file_name("chaos.social", TODAY)).exists());
    }

    #[test]
    fn cold_start_keeps_only_the_newest_file_per_host() {
        let dir = tempdir().unwrap();
        let old = dir.path().join(file_name("chaos.social", DayIndex(10)));
        let new = dir.path().join(file_name("chaos.social", DayIndex(11)));
        fs::write(&old, "[]").unwrap();
        fs::write(
            &new,
            r#"[{"shortcode":"blobcat","static_url":"https://x/blobcat.png","visible_in_picker":true}]"#,
        )
        .unwrap();

        let cache = open(dir.path(), Arc::new(FixedClock::new(DayIndex(11))));
        assert_eq!(cache.get("chaos.social").unwrap().len(), 1);
        assert!(!old.exists());
        assert!(new.exists());
    }

    #[test]
    fn corrupt_file_is_deleted_on_cold_start() {
        let dir = tempdir().unwrap();
        let corrupt = dir.path().join(file_name("broken.example", TODAY));
        fs::write(&corrupt, "{not json").unwrap();
        let unrelated = dir.path().join("readme.txt");
        fs::write(&unrelated, "keep me").unwrap();

        let cache = open(dir.path(), Arc::new(FixedClock::new(TODAY)));
        assert!(cache.get("broken.example").is_none());
        assert!(!corrupt.exists());
        assert!(unrelated.exists());
    }

    #[test]
    fn failed_refresh_leaves_entry_and_disk_untouched() {
        let dir = tempdir().unwrap();
        let clock = Arc::new(FixedClock::new(TODAY));
        let cache = open(dir.path(), clock);
        cache.insert("chaos.social", vec![blobcat()]).unwrap();

        let fetcher = StaticFetcher::failing();
        let err = cache.refresh("chaos.social", &fetcher).unwrap_err();
        assert!(matches!(err, RefreshError::Fetch(_)));
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("chaos.social").unwrap(), vec![blobcat()]);

        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn hosts_that_escape_the_cache_dir_are_rejected() {
        let dir = tempdir().unwrap();
        let cache = open(dir.path(), Arc::new(FixedClock::new(TODAY)));
        for host in ["../escape", "a/b", ""] {
            let err = cache.insert(host, vec![blobcat()]).unwrap_err();
            assert!(matches!(err, PersistError::InvalidHost(_)));
            assert!(cache.entry(host).is_none());
        }
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
        assert!(cache.hosts().is_empty());
        assert_eq!(parse_file_name("20000-..%2fx.custom-emoji.json"), None);
    }

    #[test]
    fn in_memory_cache_has_no_dir() {
        let cache = EmojiCache::open(Options::default()).unwrap();
        assert!(cache.dir().is_none());
        cache.insert("a.example", vec![blobcat()]).unwrap();
        assert!(cache.get("a.example").is_some());
    }
}
