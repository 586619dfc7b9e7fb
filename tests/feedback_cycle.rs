//! End-to-end tests for feedback cycles through the public API

#[cfg(unix)]
mod feedback_tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use hdd_feedback_agent::{
        ActivityClassification, ActivityCoordinator, ActivityEvent, ActivityPolicy,
        AudioBackend, IndicatorDriver, IndicatorState, Level, NotifyOutcome, OutputLine,
        PlaybackOutcome, PlaybackSlot, PulsePolicy, SoundSet,
    };
    use hdd_feedback_agent::indicator::LineError;
    use hdd_feedback_agent::playback::PlaybackPolicy;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::process::{Child, Command};

    #[derive(Clone, Default)]
    struct SharedLine {
        levels: Arc<Mutex<Vec<Level>>>,
    }

    impl SharedLine {
        fn current(&self) -> Option<Level> {
            self.levels.lock().unwrap().last().copied()
        }
    }

    impl OutputLine for SharedLine {
        fn write(&mut self, level: Level) -> Result<(), LineError> {
            self.levels.lock().unwrap().push(level);
            Ok(())
        }
    }

    /// Records the clip and the light state each time a player starts.
    struct ObservingBackend {
        indicator: Arc<IndicatorDriver>,
        seconds: &'static str,
        started: Mutex<Vec<(PathBuf, IndicatorState)>>,
    }

    #[async_trait]
    impl AudioBackend for ObservingBackend {
        fn spawn(&self, path: &Path) -> std::io::Result<Child> {
            self.started
                .lock()
                .unwrap()
                .push((path.to_path_buf(), self.indicator.state()));
            Command::new("sleep")
                .arg(self.seconds)
                .kill_on_drop(true)
                .spawn()
        }
    }

    struct Setup {
        coordinator: Arc<ActivityCoordinator>,
        indicator: Arc<IndicatorDriver>,
        backend: Arc<ObservingBackend>,
        line: SharedLine,
        _dir: tempfile::TempDir,
    }

    fn setup(seconds: &'static str) -> Setup {
        let dir = tempfile::tempdir().unwrap();
        let short = dir.path().join("seek.wav");
        let long = dir.path().join("grind.wav");
        std::fs::write(&short, b"RIFF").unwrap();
        std::fs::write(&long, b"RIFF").unwrap();

        let line = SharedLine::default();
        let indicator = Arc::new(IndicatorDriver::new(
            Box::new(line.clone()),
            PulsePolicy::default(),
        ));
        let backend = Arc::new(ObservingBackend {
            indicator: Arc::clone(&indicator),
            seconds,
            started: Mutex::new(Vec::new()),
        });
        let playback = Arc::new(PlaybackSlot::new(
            backend.clone(),
            PlaybackPolicy::default(),
        ));
        let coordinator = Arc::new(ActivityCoordinator::new(
            ActivityPolicy::default(),
            Arc::clone(&indicator),
            playback,
            SoundSet::new(short, long),
        ));

        Setup {
            coordinator,
            indicator,
            backend,
            line,
            _dir: dir,
        }
    }

    fn event(base: DateTime<Utc>, offset_ms: i64) -> ActivityEvent {
        ActivityEvent::at(base + ChronoDuration::milliseconds(offset_ms))
    }

    #[tokio::test]
    async fn test_burst_runs_light_around_long_clip() {
        let s = setup("0.05");
        let base = Utc::now();

        let mut classifications = Vec::new();
        for offset in [0, 700, 1_400] {
            assert_eq!(s.indicator.state(), IndicatorState::Idle);
            let report = s.coordinator.handle(event(base, offset)).await.unwrap();
            assert_eq!(s.indicator.state(), IndicatorState::Idle);
            assert_eq!(s.line.current(), Some(Level::Low));
            assert!(matches!(report.outcome, Some(PlaybackOutcome::Completed(_))));
            classifications.push(report.classification);
        }

        assert_eq!(
            classifications,
            vec![
                ActivityClassification::Short,
                ActivityClassification::Short,
                ActivityClassification::Sustained,
            ]
        );

        let started = s.backend.started.lock().unwrap().clone();
        assert_eq!(started.len(), 3);
        // Light was already on when each clip started
        assert!(started
            .iter()
            .all(|(_, state)| *state == IndicatorState::Pulsing));
        assert!(started[0].0.ends_with("seek.wav"));
        assert!(started[2].0.ends_with("grind.wav"));
    }

    #[tokio::test]
    async fn test_overlapping_notifications_are_dropped() {
        let s = setup("5");
        let base = Utc::now();

        let NotifyOutcome::Started(cycle) = s.coordinator.notify(event(base, 0)) else {
            panic!("first notification should start a cycle");
        };
        for _ in 0..200 {
            if !s.backend.started.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        for offset in [10, 20, 30] {
            assert!(matches!(
                s.coordinator.notify(event(base, offset)),
                NotifyOutcome::Dropped
            ));
        }
        assert_eq!(s.backend.started.lock().unwrap().len(), 1);

        s.coordinator.shutdown().await;
        let report = cycle.await.unwrap();
        assert_eq!(report.outcome, Some(PlaybackOutcome::Cancelled));
        assert_eq!(s.line.current(), Some(Level::Low));
        assert_eq!(s.indicator.state(), IndicatorState::Idle);
    }

    #[tokio::test]
    async fn test_shutdown_when_idle_is_clean() {
        let s = setup("0.05");
        s.coordinator.shutdown().await;
        s.coordinator.shutdown().await;

        assert_eq!(s.line.current(), Some(Level::Low));
        assert!(s.coordinator.handle(ActivityEvent::now()).await.is_none());
        assert!(s.backend.started.lock().unwrap().is_empty());
    }
}
