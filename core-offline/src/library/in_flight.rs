//! Ephemeral set of downloads in progress.
//!
//! An id enters through [`InFlightSet::try_begin`] and leaves when the
//! returned guard drops, whatever way the download ends.

use crate::models::TrackId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub(crate) struct InFlightSet {
    entries: Mutex<Vec<(TrackId, CancellationToken)>>,
}

impl InFlightSet {
    /// Mark `id` as downloading. `None` if it already is.
    pub fn try_begin(&self, id: &TrackId) -> Option<InFlightGuard<'_>> {
        let mut entries = self.entries.lock();
        if entries.iter().any(|(existing, _)| existing == id) {
            return None;
        }

        let token = CancellationToken::new();
        entries.push((id.clone(), token.clone()));
        Some(InFlightGuard {
            set: self,
            id: id.clone(),
            token,
        })
    }

    pub fn contains(&self, id: &TrackId) -> bool {
        self.entries.lock().iter().any(|(existing, _)| existing == id)
    }

    /// Ids in the order their downloads started.
    pub fn ids(&self) -> Vec<TrackId> {
        self.entries.lock().iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn cancel(&self, id: &TrackId) -> bool {
        match self.entries.lock().iter().find(|(existing, _)| existing == id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) -> usize {
        let entries = self.entries.lock();
        for (_, token) in entries.iter() {
            token.cancel();
        }
        entries.len()
    }

    fn finish(&self, id: &TrackId) {
        self.entries.lock().retain(|(existing, _)| existing != id);
    }
}

pub(crate) struct InFlightGuard<'a> {
    set: &'a InFlightSet,
    id: TrackId,
    token: CancellationToken,
}

impl InFlightGuard<'_> {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.set.finish(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_clears_on_drop() {
        let set = InFlightSet::default();
        let id = TrackId::from(62808u64);

        {
            let _guard = set.try_begin(&id).unwrap();
            assert!(set.contains(&id));
            assert!(set.try_begin(&id).is_none());
        }

        assert!(!set.contains(&id));
        assert!(set.try_begin(&id).is_some());
    }

    #[test]
    fn test_cancel_signals_token() {
        let set = InFlightSet::default();
        let a = TrackId::from("a");
        let b = TrackId::from("b");
        let guard_a = set.try_begin(&a).unwrap();
        let guard_b = set.try_begin(&b).unwrap();

        assert_eq!(set.ids(), vec![a.clone(), b.clone()]);

        assert!(set.cancel(&a));
        assert!(guard_a.token().is_cancelled());
        assert!(!guard_b.token().is_cancelled());
        assert!(!set.cancel(&TrackId::from("missing")));

        assert_eq!(set.cancel_all(), 2);
        assert!(guard_b.token().is_cancelled());
    }
}
