use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use obun_core::Fingerprint;

/// The fragments the listener should observe, with the content each was
/// last known to have (`None` = missing).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchSet {
    pub generation: u64,
    pub baseline: BTreeMap<PathBuf, Option<Fingerprint>>,
}

/// One watched fragment no longer matches its baseline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub path: PathBuf,
    /// Generation of the [`WatchSet`] this change was measured against.
    pub generation: u64,
}

/// Fingerprint of a file's current content, `None` if it cannot be read.
pub fn fingerprint_file(path: &Path) -> Option<Fingerprint> {
    match std::fs::read(path) {
        Ok(bytes) => Some(Fingerprint::of(&bytes)),
        Err(e) => {
            tracing::trace!("Cannot fingerprint {}: {e}", path.display());
            None
        }
    }
}

/// Paths whose current fingerprint differs from the baseline, paired with
/// the new fingerprint. Sorted by path.
pub fn detect_changes(
    baseline: &BTreeMap<PathBuf, Option<Fingerprint>>,
) -> Vec<(PathBuf, Option<Fingerprint>)> {
    baseline
        .iter()
        .filter_map(|(path, before)| {
            let now = fingerprint_file(path);
            (now != *before).then(|| (path.clone(), now))
        })
        .collect()
}

/// Spawn the change listener.
///
/// It polls the current [`WatchSet`] every `poll_interval` and sends one
/// [`ChangeEvent`] per detected change. It never builds or touches
/// processes. It stops when either channel closes.
pub fn spawn_listener(
    mut sets: watch::Receiver<WatchSet>,
    changes: mpsc::UnboundedSender<ChangeEvent>,
    poll_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut current = sets.borrow_and_update().clone();
        let mut ticker = tokio::time::interval(poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = sets.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    current = sets.borrow_and_update().clone();
                    tracing::debug!(
                        generation = current.generation,
                        files = current.baseline.len(),
                        "Watch set replaced"
                    );
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let baseline = current.baseline.clone();
            let detected = tokio::task::spawn_blocking(move || detect_changes(&baseline))
                .await
                .unwrap_or_default();

            for (path, now) in detected {
                tracing::debug!(path = %path.display(), "Fragment changed");
                current.baseline.insert(path.clone(), now);
                let event = ChangeEvent {
                    path,
                    generation: current.generation,
                };
                if changes.send(event).is_err() {
                    return;
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_detect_changes() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        let same = root.join("same.obun");
        let edited = root.join("edited.obun");
        let deleted = root.join("deleted.obun");
        let created = root.join("created.obun");

        std::fs::write(&same, "same").unwrap();
        std::fs::write(&edited, "before").unwrap();
        std::fs::write(&deleted, "bye").unwrap();

        let baseline: BTreeMap<_, _> = [&same, &edited, &deleted, &created]
            .into_iter()
            .map(|p| (p.clone(), fingerprint_file(p)))
            .collect();
        assert!(detect_changes(&baseline).is_empty());

        std::fs::write(&edited, "after").unwrap();
        std::fs::remove_file(&deleted).unwrap();
        std::fs::write(&created, "hello").unwrap();
        // rewriting identical bytes is not a change
        std::fs::write(&same, "same").unwrap();

        let changed: Vec<_> = detect_changes(&baseline)
            .into_iter()
            .map(|(p, _)| p)
            .collect();
        let mut expected = vec![created, deleted, edited];
        expected.sort();
        assert_eq!(changed, expected);
    }

    #[tokio::test]
    async fn test_listener_reports_only_watched_files() {
        let tmp = TempDir::new().unwrap();
        let watched = tmp.path().join("watched.obun");
        let other = tmp.path().join("other.obun");
        std::fs::write(&watched, "a").unwrap();
        std::fs::write(&other, "a").unwrap();

        let (set_tx, set_rx) = watch::channel(WatchSet {
            generation: 1,
            baseline: [(watched.clone(), fingerprint_file(&watched))]
                .into_iter()
                .collect(),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = spawn_listener(set_rx, tx, Duration::from_millis(20));

        std::fs::write(&other, "b").unwrap();
        std::fs::write(&watched, "b").unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, ChangeEvent { path: watched, generation: 1 });

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(rx.try_recv().is_err());

        drop(set_tx);
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
