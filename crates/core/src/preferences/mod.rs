use crate::{Argb, ColorState, PreferenceDelta};

/// Outcome of folding a [`PreferenceDelta`] into the color state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutedChange {
    /// Composed colors to fan out, in the order they were produced.
    pub publications: Vec<Argb>,
    /// Dynamic color was switched off by this delta.
    pub dynamic_disabled: bool,
}

/// Applies the color-related fields of `delta`.
///
/// Switching dynamic color off, or changing the default color while it is
/// off, makes the default current. An opacity change always re-publishes
/// the current hue with the new alpha.
pub fn apply_delta(colors: &mut ColorState, delta: &PreferenceDelta) -> RoutedChange {
    let mut change = RoutedChange::default();

    if let Some(enabled) = delta.dynamic_color {
        colors.set_dynamic_color_enabled(enabled);
        if !enabled {
            change.dynamic_disabled = true;
            let default_color = colors.default_color();
            change.publications.push(colors.set_current(default_color));
        }
    }

    if let Some(color) = delta.color {
        colors.set_default_color(color);
        if !colors.dynamic_color_enabled() {
            change.publications.push(colors.set_current(color));
        }
    }

    if let Some(percent) = delta.opacity_percent {
        colors.set_opacity_percent(percent);
        change.publications.push(colors.composed());
    }

    change
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::VisualizerPreferences;

    fn state(dynamic: bool) -> ColorState {
        ColorState::from_preferences(&VisualizerPreferences {
            dynamic_color: dynamic,
            color: Argb::from_rgb(0x10, 0x20, 0x30),
            ..Default::default()
        })
    }

    #[test]
    fn disabling_dynamic_color_publishes_default() {
        let mut colors = state(true);
        colors.set_current(Argb::from_rgb(0xE0, 0x20, 0x20));

        let change = apply_delta(&mut colors, &PreferenceDelta::new().with_dynamic_color(false));

        assert!(change.dynamic_disabled);
        assert_eq!(change.publications, vec![Argb(0x8010_2030)]);
        assert_eq!(colors.current_color(), Argb::from_rgb(0x10, 0x20, 0x30));
    }

    #[test]
    fn enabling_dynamic_color_keeps_current() {
        let mut colors = state(false);
        let change = apply_delta(&mut colors, &PreferenceDelta::new().with_dynamic_color(true));

        assert!(change.publications.is_empty());
        assert!(!change.dynamic_disabled);
        assert!(colors.dynamic_color_enabled());
    }

    #[test]
    fn default_color_only_shows_when_dynamic_is_off() {
        let new_default = Argb::from_rgb(0x00, 0x00, 0xFF);

        let mut dynamic = state(true);
        let change = apply_delta(&mut dynamic, &PreferenceDelta::new().with_color(new_default));
        assert!(change.publications.is_empty());
        assert_eq!(dynamic.default_color(), new_default);

        let mut fixed = state(false);
        let change = apply_delta(&mut fixed, &PreferenceDelta::new().with_color(new_default));
        assert_eq!(change.publications, vec![new_default.with_alpha(128)]);
    }

    #[test]
    fn opacity_always_republishes_current_hue() {
        let mut colors = state(true);
        let extracted = Argb::from_rgb(0xE0, 0x20, 0x20);
        colors.set_current(extracted);

        let change = apply_delta(&mut colors, &PreferenceDelta::new().with_opacity_percent(100));

        assert_eq!(change.publications, vec![extracted.with_alpha(255)]);
        assert_eq!(colors.current_color(), extracted);
    }

    #[test]
    fn combined_delta_publishes_each_step() {
        let mut colors = state(true);
        let blue = Argb::from_rgb(0, 0, 0xFF);
        let delta = PreferenceDelta::new()
            .with_dynamic_color(false)
            .with_color(blue)
            .with_opacity_percent(0);

        let change = apply_delta(&mut colors, &delta);

        assert_eq!(
            change.publications,
            vec![
                Argb::from_rgb(0x10, 0x20, 0x30).with_alpha(128),
                blue.with_alpha(128),
                blue.with_alpha(0),
            ]
        );
    }

    #[test]
    fn extras_alone_change_nothing() {
        let mut colors = state(true);
        let before = colors.clone();
        let change = apply_delta(&mut colors, &PreferenceDelta::new().with_extra("bars", 24));
        assert_eq!(change, RoutedChange::default());
        assert_eq!(colors, before);
    }
}
