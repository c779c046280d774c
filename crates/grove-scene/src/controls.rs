// SPDX-License-Identifier: CEPL-1.0

/// Scene-level UI controls, drawn by whatever overlay implements
/// [`ControlSink`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Control {
    SliderF32 { value: f32, min: f32, max: f32 },
    Button { pressed: bool },
}

impl Control {
    /// Reversed bounds are swapped.
    pub fn slider(min: f32, max: f32, value: f32) -> Self {
        let (min, max) = (min.min(max), min.max(max));
        Control::SliderF32 {
            value: value.max(min).min(max),
            min,
            max,
        }
    }

    pub fn button() -> Self {
        Control::Button { pressed: false }
    }

    /// Returns and clears the pressed state of a button.
    pub fn take_pressed(&mut self) -> bool {
        match self {
            Control::Button { pressed } => std::mem::take(pressed),
            Control::SliderF32 { .. } => false,
        }
    }
}

/// Immediate-mode widget backend.
pub trait ControlSink {
    /// Shows a slider; may modify `value`. Returns true on change.
    fn slider_f32(&mut self, label: &str, value: &mut f32, min: f32, max: f32) -> bool;
    /// Shows a button; returns true if it was clicked this frame.
    fn button(&mut self, label: &str) -> bool;
}

pub fn draw_control(sink: &mut dyn ControlSink, label: &str, control: &mut Control) -> bool {
    match control {
        Control::SliderF32 { value, min, max } => {
            let changed = sink.slider_f32(label, value, *min, *max);
            *value = value.max(*min).min(*max);
            changed
        }
        Control::Button { pressed } => {
            let clicked = sink.button(label);
            *pressed |= clicked;
            clicked
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted {
        nudge: f32,
        click: bool,
        seen: Vec<String>,
    }

    impl ControlSink for Scripted {
        fn slider_f32(&mut self, label: &str, value: &mut f32, _min: f32, _max: f32) -> bool {
            self.seen.push(label.to_owned());
            *value += self.nudge;
            self.nudge != 0.0
        }

        fn button(&mut self, label: &str) -> bool {
            self.seen.push(label.to_owned());
            self.click
        }
    }

    #[test]
    fn slider_changes_are_clamped() {
        let mut sink = Scripted {
            nudge: 5.0,
            click: false,
            seen: vec![],
        };
        let mut c = Control::slider(0.0, 1.0, 0.5);
        assert!(draw_control(&mut sink, "s", &mut c));
        assert_eq!(c, Control::SliderF32 { value: 1.0, min: 0.0, max: 1.0 });
    }

    #[test]
    fn reversed_slider_bounds_are_swapped() {
        assert_eq!(
            Control::slider(2.0, -1.0, 5.0),
            Control::SliderF32 { value: 2.0, min: -1.0, max: 2.0 }
        );
        assert_eq!(
            Control::slider(1.0, 0.0, 0.25),
            Control::SliderF32 { value: 0.25, min: 0.0, max: 1.0 }
        );
    }

    #[test]
    fn button_press_latches_until_taken() {
        let mut sink = Scripted {
            nudge: 0.0,
            click: true,
            seen: vec![],
        };
        let mut c = Control::button();
        draw_control(&mut sink, "b", &mut c);
        sink.click = false;
        draw_control(&mut sink, "b", &mut c);
        assert!(c.take_pressed());
        assert!(!c.take_pressed());
        assert_eq!(sink.seen, ["b", "b"]);
    }
}
