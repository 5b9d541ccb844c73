// MIT License - Copyright (c) 2026 Peter Wright
// Lutron integration bridge

use serde::{Deserialize, Serialize};

use crate::accessory::ButtonService;
use crate::config::AccessoryKind;

/// Button layout of a Pico remote.
///
/// Component numbers are the ones the bridge reports in `~DEVICE` lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PicoLayout {
    /// PJ2-2B: On, Off
    TwoButton,
    /// PJ2-3B: On, Favorite, Off
    ThreeButton,
    /// PJ2-3BRL: On, Favorite, Off, Raise, Lower
    #[default]
    ThreeButtonRaiseLower,
    /// PJ2-4B scene remote: four numbered buttons
    FourButtonScene,
}

impl PicoLayout {
    /// `(component, label)` pairs, top to bottom.
    pub fn buttons(&self) -> &'static [(u32, &'static str)] {
        match self {
            PicoLayout::TwoButton => &[(2, "On"), (4, "Off")],
            PicoLayout::ThreeButton => &[(2, "On"), (3, "Favorite"), (4, "Off")],
            PicoLayout::ThreeButtonRaiseLower => &[
                (2, "On"),
                (3, "Favorite"),
                (4, "Off"),
                (5, "Raise"),
                (6, "Lower"),
            ],
            PicoLayout::FourButtonScene => &[
                (8, "Button 1"),
                (9, "Button 2"),
                (10, "Button 3"),
                (11, "Button 4"),
            ],
        }
    }
}

/// Build the button services an accessory of this kind exposes.
///
/// Deterministic in the kind alone, so a cached accessory can be compared
/// against (and repaired to) what its configuration implies.
pub fn services_for(kind: &AccessoryKind) -> Vec<ButtonService> {
    let buttons: Vec<(u32, String)> = match kind {
        AccessoryKind::PicoRemote { layout } => layout
            .buttons()
            .iter()
            .map(|(component, label)| (*component, label.to_string()))
            .collect(),
        AccessoryKind::Keypad { components } => {
            let mut seen = Vec::with_capacity(components.len());
            for component in components {
                if !seen.contains(component) {
                    seen.push(*component);
                }
            }
            seen.into_iter()
                .map(|component| (component, format!("Button {}", component)))
                .collect()
        }
    };

    buttons
        .into_iter()
        .enumerate()
        .map(|(i, (component, label))| ButtonService {
            subtype: component.to_string(),
            label,
            index: (i + 1) as u32,
        })
        .collect()
}
