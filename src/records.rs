use chrono::{DateTime, Local};
use itertools::Itertools;
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordEntry {
    pub tester: String,
    pub wpm: f64,
    /// `None` for testers registered without a score yet.
    pub achieved_at: Option<DateTime<Local>>,
}

#[derive(Debug, Clone, Copy)]
struct Best {
    wpm: f64,
    achieved_at: Option<DateTime<Local>>,
}

/// Best WPM per tester for the lifetime of the process.
///
/// Shared between sessions as `Arc<RecordStore>`. `update` does its
/// compare-and-set under a single write lock.
#[derive(Debug, Default)]
pub struct RecordStore {
    best: RwLock<HashMap<String, Best>>,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Best WPM for `tester`, 0.0 if never seen.
    pub fn get(&self, tester: &str) -> f64 {
        self.best
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(tester)
            .map_or(0.0, |b| b.wpm)
    }

    /// Store `wpm` if it beats the current best. Returns whether it did.
    pub fn update(&self, tester: &str, wpm: f64) -> bool {
        let mut best = self.best.write().unwrap_or_else(PoisonError::into_inner);
        let current = best.get(tester).map_or(0.0, |b| b.wpm);
        if wpm <= current {
            return false;
        }
        best.insert(
            tester.to_string(),
            Best {
                wpm,
                achieved_at: Some(Local::now()),
            },
        );
        info!(tester, wpm, previous = current, "new personal best");
        true
    }

    /// Make `tester` visible in listings with a 0.0 best. No-op if known.
    pub fn register(&self, tester: &str) {
        self.best
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(tester.to_string())
            .or_insert(Best {
                wpm: 0.0,
                achieved_at: None,
            });
    }

    pub fn all(&self) -> BTreeMap<String, f64> {
        self.best
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(tester, b)| (tester.clone(), b.wpm))
            .collect()
    }

    /// Entries ordered best first, ties by tester name.
    pub fn entries(&self) -> Vec<RecordEntry> {
        self.best
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(tester, b)| RecordEntry {
                tester: tester.clone(),
                wpm: b.wpm,
                achieved_at: b.achieved_at,
            })
            .sorted_by(|a, b| {
                b.wpm
                    .partial_cmp(&a.wpm)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.tester.cmp(&b.tester))
            })
            .collect()
    }

    pub fn clear(&self) {
        self.best
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
