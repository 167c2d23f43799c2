use std::{collections::HashSet, fmt, sync::Arc, time::Duration};

use anyhow::Result;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::{
    utils::clock::Clock,
    window_api::{InputSource, Key, WindowId},
};

/// Keys that have to be held together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chord {
    keys: Vec<Key>,
}

impl Chord {
    pub fn new(keys: impl Into<Vec<Key>>) -> Self {
        Self { keys: keys.into() }
    }

    pub fn keys(&self) -> &[Key] {
        &self.keys
    }

    pub fn is_held(&self, pressed: &HashSet<Key>) -> bool {
        self.keys.iter().all(|key| pressed.contains(key))
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names = self
            .keys
            .iter()
            .map(|key| match key {
                Key::Control => "Ctrl".to_string(),
                Key::Shift => "Shift".to_string(),
                Key::Alt => "Alt".to_string(),
                Key::Letter(c) => c.to_ascii_uppercase().to_string(),
            })
            .collect::<Vec<_>>();
        write!(f, "{}", names.join("+"))
    }
}

/// Turns a polled "is held" signal into single events. Fires on the poll the chord becomes
/// held and re-arms only after the chord was seen released for `release_polls` polls in a row.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    armed: bool,
    released_polls: u32,
    release_polls: u32,
}

impl EdgeDetector {
    pub fn new(release_polls: u32) -> Self {
        Self {
            armed: true,
            released_polls: 0,
            release_polls: release_polls.max(1),
        }
    }

    pub fn update(&mut self, held: bool) -> bool {
        if held {
            self.released_polls = 0;
            let fired = self.armed;
            self.armed = false;
            return fired;
        }

        if !self.armed {
            self.released_polls += 1;
            if self.released_polls >= self.release_polls {
                self.armed = true;
            }
        }
        false
    }
}

/// Result of one poll of the input source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InputSample {
    pub lock_toggle: bool,
    pub mini_toggle: bool,
    pub foreground: Option<WindowId>,
}

struct WatchedChord {
    chord: Chord,
    detector: EdgeDetector,
}

pub struct InputWatcher {
    next: mpsc::Sender<InputSample>,
    source: Box<dyn InputSource>,
    shutdown: CancellationToken,
    lock: WatchedChord,
    mini: WatchedChord,
    /// Every key either chord uses.
    keys: Vec<Key>,
    poll_interval: Duration,
    clock: Arc<dyn Clock>,
}

impl InputWatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        next: mpsc::Sender<InputSample>,
        source: Box<dyn InputSource>,
        shutdown: CancellationToken,
        lock_chord: Chord,
        mini_chord: Chord,
        release_polls: u32,
        poll_interval: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut keys = lock_chord.keys().to_vec();
        for key in mini_chord.keys() {
            if !keys.contains(key) {
                keys.push(*key);
            }
        }
        Self {
            next,
            source,
            shutdown,
            lock: WatchedChord {
                chord: lock_chord,
                detector: EdgeDetector::new(release_polls),
            },
            mini: WatchedChord {
                chord: mini_chord,
                detector: EdgeDetector::new(release_polls),
            },
            keys,
            poll_interval,
            clock,
        }
    }

    /// Samples both chords and the focused window once.
    pub fn poll(&mut self) -> InputSample {
        let pressed = self
            .source
            .pressed_keys(&self.keys)
            .inspect_err(|e| debug!("Failed to query the keyboard, treating it as released {e:?}"))
            .unwrap_or_default();
        let lock_held = self.lock.chord.is_held(&pressed);
        let mini_held = self.mini.chord.is_held(&pressed);

        let foreground = self
            .source
            .foreground_window()
            .inspect_err(|e| debug!("Failed to query the foreground window {e:?}"))
            .unwrap_or(None);

        InputSample {
            lock_toggle: self.lock.detector.update(lock_held),
            mini_toggle: self.mini.detector.update(mini_held),
            foreground,
        }
    }

    /// Polls the input source until shutdown, forwarding every sample.
    pub async fn run(mut self) -> Result<()> {
        let mut poll_point = self.clock.instant();
        loop {
            poll_point += self.poll_interval;

            let sample = self.poll();
            if sample.lock_toggle || sample.mini_toggle {
                info!("Chord pressed {:?}", sample);
            }
            self.next
                .send(sample)
                .await
                .inspect_err(|e| error!("Unexpected error during sending {e:?}"))?;

            tokio::select! {
                // Dropping the sender on return ends the controller loop as well.
                _ = self.shutdown.cancelled() => {
                    return Ok(())
                }
                _ = self.clock.sleep_until(poll_point) => ()
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        collections::HashSet,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::{anyhow, Result};
    use chrono::{TimeZone, Utc};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    use crate::{
        overlay::config::OverlayConfig,
        utils::clock::TestClock,
        window_api::{InputSource, Key, MockInputSource, WindowId},
    };

    use super::{Chord, EdgeDetector, InputSample, InputWatcher};

    /// Keyboard whose held keys the test changes between polls.
    #[derive(Clone, Default)]
    pub(crate) struct FakeKeyboard {
        held: Arc<Mutex<HashSet<Key>>>,
    }

    impl FakeKeyboard {
        pub(crate) fn hold(&self, keys: &[Key]) {
            *self.held.lock().unwrap() = keys.iter().copied().collect();
        }

        pub(crate) fn release(&self) {
            self.held.lock().unwrap().clear();
        }
    }

    impl InputSource for FakeKeyboard {
        fn pressed_keys(&mut self, keys: &[Key]) -> Result<HashSet<Key>> {
            let held = self.held.lock().unwrap();
            Ok(keys.iter().filter(|key| held.contains(key)).copied().collect())
        }

        fn foreground_window(&mut self) -> Result<Option<WindowId>> {
            Ok(Some(WindowId(1)))
        }
    }

    pub(crate) const LOCK: [Key; 3] = [Key::Control, Key::Shift, Key::Letter('L')];
    const MINI: [Key; 3] = [Key::Control, Key::Shift, Key::Letter('K')];

    fn watcher(source: Box<dyn InputSource>, release_polls: u32) -> InputWatcher {
        let config = OverlayConfig::default();
        let (sender, _) = mpsc::channel(1);
        InputWatcher::new(
            sender,
            source,
            CancellationToken::new(),
            config.lock_chord,
            config.mini_chord,
            release_polls,
            config.poll_interval,
            Arc::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap(),
            )),
        )
    }

    fn lock_toggles(watcher: &mut InputWatcher, polls: usize) -> Vec<bool> {
        (0..polls).map(|_| watcher.poll().lock_toggle).collect()
    }

    #[test]
    fn test_edge_detector_debounce() {
        let mut detector = EdgeDetector::new(2);

        assert!(detector.update(true));
        assert!(!detector.update(true));
        // A single released poll is a bounce.
        assert!(!detector.update(false));
        assert!(!detector.update(true));
        assert!(!detector.update(false));
        assert!(!detector.update(false));
        assert!(detector.update(true));
    }

    #[test]
    fn test_held_chord_fires_once() {
        let keyboard = FakeKeyboard::default();
        let mut watcher = watcher(Box::new(keyboard.clone()), 2);

        keyboard.hold(&LOCK);
        assert_eq!(lock_toggles(&mut watcher, 3), [true, false, false]);

        keyboard.release();
        assert_eq!(lock_toggles(&mut watcher, 3), [false, false, false]);

        keyboard.hold(&LOCK);
        assert_eq!(lock_toggles(&mut watcher, 2), [true, false]);
    }

    #[test]
    fn test_partial_chord_does_not_fire() {
        let keyboard = FakeKeyboard::default();
        let mut watcher = watcher(Box::new(keyboard.clone()), 2);

        keyboard.hold(&[Key::Control, Key::Letter('L')]);
        assert_eq!(lock_toggles(&mut watcher, 2), [false, false]);

        keyboard.hold(&LOCK);
        assert_eq!(lock_toggles(&mut watcher, 1), [true]);
    }

    #[test]
    fn test_chords_are_independent() {
        let keyboard = FakeKeyboard::default();
        let mut watcher = watcher(Box::new(keyboard.clone()), 1);

        keyboard.hold(&MINI);
        let sample = watcher.poll();
        assert_eq!(
            sample,
            InputSample {
                lock_toggle: false,
                mini_toggle: true,
                foreground: Some(WindowId(1)),
            }
        );

        keyboard.hold(&LOCK);
        let sample = watcher.poll();
        assert!(sample.lock_toggle);
        assert!(!sample.mini_toggle);
    }

    #[test]
    fn test_query_errors_count_as_released() {
        let mut source = MockInputSource::new();
        source
            .expect_pressed_keys()
            .returning(|_| Err(anyhow!("keyboard unavailable")));
        source
            .expect_foreground_window()
            .returning(|| Err(anyhow!("no focus information")));
        let mut watcher = watcher(Box::new(source), 2);

        assert_eq!(watcher.poll(), InputSample::default());
    }

    #[test]
    fn test_keyboard_is_read_once_per_poll() {
        let mut source = MockInputSource::new();
        source
            .expect_pressed_keys()
            .withf(|keys| {
                keys.len() == 4
                    && [Key::Control, Key::Shift, Key::Letter('L'), Key::Letter('K')]
                        .iter()
                        .all(|key| keys.contains(key))
            })
            .times(2)
            .returning(|_| Ok(LOCK.into_iter().collect()));
        source.expect_foreground_window().returning(|| Ok(None));
        let mut watcher = watcher(Box::new(source), 2);

        let sample = watcher.poll();
        assert!(sample.lock_toggle);
        assert!(!sample.mini_toggle);
        assert!(!watcher.poll().lock_toggle);
    }

    #[test]
    fn test_chord_display() {
        assert_eq!(OverlayConfig::default().lock_chord.to_string(), "Ctrl+Shift+L");
        assert_eq!(Chord::new([Key::Alt, Key::Letter('k')]).to_string(), "Alt+K");
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_forwards_samples_until_shutdown() -> Result<()> {
        let keyboard = FakeKeyboard::default();
        let (sender, mut receiver) = mpsc::channel(16);
        let shutdown = CancellationToken::new();
        let config = OverlayConfig::default();
        let watcher = InputWatcher::new(
            sender,
            Box::new(keyboard.clone()),
            shutdown.clone(),
            config.lock_chord,
            config.mini_chord,
            config.release_polls,
            Duration::from_millis(50),
            Arc::new(TestClock::starting_at(
                Utc.with_ymd_and_hms(2025, 3, 15, 9, 0, 0).unwrap(),
            )),
        );
        keyboard.hold(&LOCK);
        let handle = tokio::spawn(watcher.run());

        let first = receiver.recv().await.expect("First sample should arrive");
        let second = receiver.recv().await.expect("Second sample should arrive");
        assert!(first.lock_toggle);
        assert!(!second.lock_toggle);

        shutdown.cancel();
        handle.await??;
        while receiver.recv().await.is_some() {}
        Ok(())
    }
}
