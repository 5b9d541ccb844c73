// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// What the bridge says happened to a button component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ButtonAction {
    /// 3
    Press,
    /// 4
    Release,
    /// 5 - keypads only, sent while the button stays down
    Hold,
    /// 6 - keypads only
    MultiTap,
    /// 32 - keypads only, release after a hold
    HoldRelease,
}

impl ButtonAction {
    /// Decode a bridge action code. Unknown codes return `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "3" => Some(Self::Press),
            "4" => Some(Self::Release),
            "5" => Some(Self::Hold),
            "6" => Some(Self::MultiTap),
            "32" => Some(Self::HoldRelease),
            _ => None,
        }
    }
}

/// Host-visible programmable switch event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ButtonEvent {
    SinglePress,
    DoublePress,
    LongPress,
}

impl ButtonEvent {
    /// Characteristic value of the event (0 single, 1 double, 2 long).
    pub fn value(&self) -> u8 {
        match self {
            Self::SinglePress => 0,
            Self::DoublePress => 1,
            Self::LongPress => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SinglePress => "SINGLE_PRESS",
            Self::DoublePress => "DOUBLE_PRESS",
            Self::LongPress => "LONG_PRESS",
        }
    }
}

impl fmt::Display for ButtonEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Press tracking for one button component.
#[derive(Debug, Clone, Default)]
pub struct ButtonState {
    pressed_at: Option<Instant>,
    hold_reported: bool,
}

impl ButtonState {
    /// Feed one action and return the event it completes, if any.
    ///
    /// Picos only send press and release, so a long press is derived from
    /// how long the button was down. An explicit hold wins over the timer
    /// and swallows the release that follows it.
    pub fn apply(
        &mut self,
        action: ButtonAction,
        now: Instant,
        long_press: Duration,
    ) -> Option<ButtonEvent> {
        match action {
            ButtonAction::Press => {
                self.pressed_at = Some(now);
                self.hold_reported = false;
                None
            }
            ButtonAction::Release => {
                let pressed_at = self.pressed_at.take();
                if std::mem::take(&mut self.hold_reported) {
                    return None;
                }
                match pressed_at {
                    Some(at) if now.saturating_duration_since(at) >= long_press => {
                        Some(ButtonEvent::LongPress)
                    }
                    _ => Some(ButtonEvent::SinglePress),
                }
            }
            ButtonAction::Hold => {
                if self.hold_reported {
                    None
                } else {
                    self.hold_reported = true;
                    Some(ButtonEvent::LongPress)
                }
            }
            ButtonAction::HoldRelease => {
                self.pressed_at = None;
                self.hold_reported = false;
                None
            }
            ButtonAction::MultiTap => {
                self.pressed_at = None;
                self.hold_reported = false;
                Some(ButtonEvent::DoublePress)
            }
        }
    }

    /// Whether a press has been seen without its release.
    pub fn is_pressed(&self) -> bool {
        self.pressed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LONG: Duration = Duration::from_millis(600);

    #[test]
    fn test_action_codes() {
        assert_eq!(ButtonAction::from_code("3"), Some(ButtonAction::Press));
        assert_eq!(ButtonAction::from_code("4"), Some(ButtonAction::Release));
        assert_eq!(ButtonAction::from_code("5"), Some(ButtonAction::Hold));
        assert_eq!(ButtonAction::from_code("6"), Some(ButtonAction::MultiTap));
        assert_eq!(ButtonAction::from_code("32"), Some(ButtonAction::HoldRelease));
        assert_eq!(ButtonAction::from_code("9"), None);
        assert_eq!(ButtonAction::from_code(""), None);
    }

    #[test]
    fn test_short_press() {
        let t0 = Instant::now();
        let mut state = ButtonState::default();
        assert_eq!(state.apply(ButtonAction::Press, t0, LONG), None);
        assert!(state.is_pressed());
        assert_eq!(
            state.apply(ButtonAction::Release, t0 + Duration::from_millis(120), LONG),
            Some(ButtonEvent::SinglePress)
        );
        assert!(!state.is_pressed());
    }

    #[test]
    fn test_long_press_by_duration() {
        let t0 = Instant::now();
        let mut state = ButtonState::default();
        state.apply(ButtonAction::Press, t0, LONG);
        assert_eq!(
            state.apply(ButtonAction::Release, t0 + LONG, LONG),
            Some(ButtonEvent::LongPress)
        );
    }

    #[test]
    fn test_release_without_press() {
        let mut state = ButtonState::default();
        assert_eq!(
            state.apply(ButtonAction::Release, Instant::now(), LONG),
            Some(ButtonEvent::SinglePress)
        );
    }

    #[test]
    fn test_hold_reports_once_and_swallows_release() {
        let t0 = Instant::now();
        let mut state = ButtonState::default();
        state.apply(ButtonAction::Press, t0, LONG);
        assert_eq!(state.apply(ButtonAction::Hold, t0, LONG), Some(ButtonEvent::LongPress));
        assert_eq!(state.apply(ButtonAction::Hold, t0, LONG), None);
        assert_eq!(state.apply(ButtonAction::Release, t0, LONG), None);
        // Next press starts clean
        state.apply(ButtonAction::Press, t0, LONG);
        assert_eq!(
            state.apply(ButtonAction::Release, t0, LONG),
            Some(ButtonEvent::SinglePress)
        );
    }

    #[test]
    fn test_multi_tap_is_double_press() {
        let mut state = ButtonState::default();
        assert_eq!(
            state.apply(ButtonAction::MultiTap, Instant::now(), LONG),
            Some(ButtonEvent::DoublePress)
        );
    }

    #[test]
    fn test_event_values() {
        assert_eq!(ButtonEvent::SinglePress.value(), 0);
        assert_eq!(ButtonEvent::DoublePress.value(), 1);
        assert_eq!(ButtonEvent::LongPress.value(), 2);
        assert_eq!(ButtonEvent::LongPress.to_string(), "LONG_PRESS");
        assert_eq!(
            serde_json::to_string(&ButtonEvent::SinglePress).unwrap(),
            "\"SINGLE_PRESS\""
        );
    }
}
