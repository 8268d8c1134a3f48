//! Derived views over cached collections.
//!
//! A view is a pure function of a cached collection plus filter and sort
//! state. Deriving never mutates the cache; [`ViewState`] memoizes the
//! result so repeated reads with unchanged inputs reuse the same rows.

use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use crate::models::Entity;
use crate::store::EntityCache;
use crate::utils::{contains_ignore_case, lock};

/// Record-level hooks the view pipeline filters and sorts on.
///
/// Entities implement the hooks that apply to them; the defaults make a
/// record opt out of a filter dimension entirely, which means it fails
/// any active filter on that dimension.
pub trait Viewable {
    /// Fields the free-text query is matched against.
    fn search_haystack(&self) -> Vec<&str>;

    /// Status value used by status filters.
    fn status_key(&self) -> &'static str;

    /// Position in the fixed status ordering; unranked kinds all tie.
    fn status_rank(&self) -> u8 {
        u8::MAX
    }

    fn category_key(&self) -> Option<&str> {
        None
    }

    fn priority_key(&self) -> Option<&'static str> {
        None
    }

    fn progress(&self) -> Option<u8> {
        None
    }

    /// Employee ids associated with the record.
    fn team(&self) -> &[i64] {
        &[]
    }

    /// Ascending comparison on the given sort key. Must leave records
    /// with equal keys unordered so the stable sort keeps their input
    /// order.
    fn cmp_by(&self, other: &Self, key: SortKey) -> Ordering;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortKey {
    #[default]
    Name,
    BusinessId,
    Progress,
    StartDate,
    EndDate,
    Created,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    pub fn new(key: SortKey, direction: SortDirection) -> Self {
        Self { key, direction }
    }
}

/// Active filters. Dimensions combine with AND; the selections within a
/// set dimension combine with OR.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct FilterState {
    /// Case-insensitive free-text query.
    pub query: String,
    pub categories: BTreeSet<String>,
    pub statuses: BTreeSet<String>,
    pub priorities: BTreeSet<String>,
    /// Inclusive progress range.
    pub progress: Option<(u8, u8)>,
    /// Employee ids; a record matches when any of its team is selected.
    pub team: BTreeSet<i64>,
}

impl FilterState {
    pub fn is_empty(&self) -> bool {
        self.query.is_empty()
            && self.categories.is_empty()
            && self.statuses.is_empty()
            && self.priorities.is_empty()
            && self.progress.is_none()
            && self.team.is_empty()
    }

    pub fn matches<T: Viewable>(&self, record: &T) -> bool {
        if !self.query.is_empty() {
            let needle = self.query.to_lowercase();
            let hit = record
                .search_haystack()
                .iter()
                .any(|field| contains_ignore_case(field, &needle));
            if !hit {
                return false;
            }
        }

        if !self.statuses.is_empty() && !self.statuses.contains(record.status_key()) {
            return false;
        }

        if !self.categories.is_empty() {
            match record.category_key() {
                Some(category) if self.categories.contains(category) => {}
                _ => return false,
            }
        }

        if !self.priorities.is_empty() {
            match record.priority_key() {
                Some(priority) if self.priorities.contains(priority) => {}
                _ => return false,
            }
        }

        if let Some((min, max)) = self.progress {
            match record.progress() {
                Some(value) if value >= min && value <= max => {}
                _ => return false,
            }
        }

        if !self.team.is_empty() {
            let hit = record.team().iter().any(|id| self.team.contains(id));
            if !hit {
                return false;
            }
        }

        true
    }
}

/// Filter and sort a snapshot into display order.
///
/// Pinned records always lead, then the fixed status ranking, then the
/// requested key. The sort is stable, so records that tie on every
/// stage keep the order they arrived in.
pub fn derive<T: Entity + Viewable>(
    records: &[T],
    filter: &FilterState,
    sort: SortState,
) -> Vec<T> {
    let mut rows: Vec<T> = records
        .iter()
        .filter(|record| filter.matches(*record))
        .cloned()
        .collect();

    rows.sort_by(|a, b| {
        b.pinned()
            .cmp(&a.pinned())
            .then_with(|| a.status_rank().cmp(&b.status_rank()))
            .then_with(|| {
                let ordering = a.cmp_by(b, sort.key);
                match sort.direction {
                    SortDirection::Ascending => ordering,
                    SortDirection::Descending => ordering.reverse(),
                }
            })
    });
    rows
}

struct Memo<T> {
    key: u64,
    rows: Arc<Vec<T>>,
}

/// Filter and sort state for one collection, with the derived rows
/// memoized against the cache revision.
pub struct ViewState<T> {
    pub filter: FilterState,
    pub sort: SortState,
    memo: Mutex<Option<Memo<T>>>,
}

impl<T: Entity + Viewable> ViewState<T> {
    pub fn new() -> Self {
        Self {
            filter: FilterState::default(),
            sort: SortState::default(),
            memo: Mutex::new(None),
        }
    }

    /// Rows for the current filter and sort. Recomputes only when the
    /// cache revision or the view inputs changed since the last call.
    pub fn derived(&self, cache: &EntityCache<T>) -> Arc<Vec<T>> {
        let (records, revision) = cache.snapshot_with_revision();
        let key = self.memo_key(revision);

        let mut memo = lock(&self.memo);
        if let Some(ref entry) = *memo {
            if entry.key == key {
                return Arc::clone(&entry.rows);
            }
        }

        let rows = Arc::new(derive(&records, &self.filter, self.sort));
        *memo = Some(Memo {
            key,
            rows: Arc::clone(&rows),
        });
        rows
    }

    pub fn set_filter(&mut self, filter: FilterState) {
        self.filter = filter;
    }

    pub fn set_sort(&mut self, sort: SortState) {
        self.sort = sort;
    }

    fn memo_key(&self, revision: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        revision.hash(&mut hasher);
        self.filter.hash(&mut hasher);
        self.sort.hash(&mut hasher);
        hasher.finish()
    }
}

impl<T: Entity + Viewable> Default for ViewState<T> {
    fn default() -> Self {
        Self::new()
    }
}
