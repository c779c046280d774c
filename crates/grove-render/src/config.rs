// SPDX-License-Identifier: CEPL-1.0
use serde::Deserialize;

/// Presentation strategy, mirroring the four core Vulkan present modes.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PresentMode {
    #[default]
    Fifo,
    FifoRelaxed,
    Mailbox,
    Immediate,
}

impl PresentMode {
    pub const ALL: [PresentMode; 4] = [
        PresentMode::Fifo,
        PresentMode::FifoRelaxed,
        PresentMode::Mailbox,
        PresentMode::Immediate,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PresentMode::Fifo => "fifo",
            PresentMode::FifoRelaxed => "fifo_relaxed",
            PresentMode::Mailbox => "mailbox",
            PresentMode::Immediate => "immediate",
        }
    }

    /// Cycles through `ALL`, used by the overlay picker.
    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.label() == s)
    }
}

/// Requested multisample count; the backend clamps to what the device offers.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum Msaa {
    X1,
    X2,
    #[default]
    X4,
    X8,
}

impl Msaa {
    pub const ALL: [Msaa; 4] = [Msaa::X1, Msaa::X2, Msaa::X4, Msaa::X8];

    pub fn samples(self) -> u32 {
        match self {
            Msaa::X1 => 1,
            Msaa::X2 => 2,
            Msaa::X4 => 4,
            Msaa::X8 => 8,
        }
    }

    pub fn from_samples(n: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.samples() == n)
    }

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }

    /// Like [`Msaa::next`], but wraps to x1 past `max`.
    pub fn next_up_to(self, max: Msaa) -> Self {
        let next = self.next();
        if next.samples() > max.samples() {
            Msaa::X1
        } else {
            next
        }
    }
}

pub const MAX_FRAMES_IN_FLIGHT: usize = 4;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct RenderConfig {
    #[serde(default = "default_frames_in_flight")]
    pub frames_in_flight: usize,
    #[serde(default)]
    pub present_mode: PresentMode,
    #[serde(default)]
    pub msaa: Msaa,
    #[serde(default = "default_clear")]
    pub clear_color: [f32; 4],
    /// `None` waits on frame fences forever.
    #[serde(default)]
    pub fence_timeout_ms: Option<u64>,
    #[serde(default = "default_true")]
    pub pipeline_cache: bool,
    #[serde(default = "default_validation")]
    pub validation: bool,
}

impl RenderConfig {
    /// Frames in flight clamped to 1..=4.
    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.clamp(1, MAX_FRAMES_IN_FLIGHT)
    }

    pub fn fence_timeout_ns(&self) -> u64 {
        match self.fence_timeout_ms {
            Some(ms) => ms.saturating_mul(1_000_000),
            None => u64::MAX,
        }
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        RenderConfig {
            frames_in_flight: default_frames_in_flight(),
            present_mode: PresentMode::Fifo,
            msaa: Msaa::X4,
            clear_color: default_clear(),
            fence_timeout_ms: None,
            pipeline_cache: true,
            validation: default_validation(),
        }
    }
}

fn default_frames_in_flight() -> usize {
    3
}
fn default_clear() -> [f32; 4] {
    [0.02, 0.02, 0.04, 1.0]
}
fn default_true() -> bool {
    true
}
fn default_validation() -> bool {
    cfg!(debug_assertions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_uses_defaults() {
        let cfg: RenderConfig = toml::from_str("").unwrap();
        assert_eq!(cfg, RenderConfig::default());
        assert_eq!(cfg.frames_in_flight(), 3);
        assert_eq!(cfg.fence_timeout_ns(), u64::MAX);
    }

    #[test]
    fn parses_modes_and_clamps_frames() {
        let cfg: RenderConfig = toml::from_str(
            r#"
            frames_in_flight = 9
            present_mode = "mailbox"
            msaa = "x8"
            fence_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(cfg.present_mode, PresentMode::Mailbox);
        assert_eq!(cfg.msaa, Msaa::X8);
        assert_eq!(cfg.frames_in_flight(), MAX_FRAMES_IN_FLIGHT);
        assert_eq!(cfg.fence_timeout_ns(), 250_000_000);

        let zero: RenderConfig = toml::from_str("frames_in_flight = 0").unwrap();
        assert_eq!(zero.frames_in_flight(), 1);
    }

    #[test]
    fn unknown_present_mode_is_rejected() {
        assert!(toml::from_str::<RenderConfig>(r#"present_mode = "tearing""#).is_err());
    }

    #[test]
    fn pickers_cycle() {
        assert_eq!(PresentMode::Immediate.next(), PresentMode::Fifo);
        assert_eq!(Msaa::X8.next(), Msaa::X1);
        assert_eq!(PresentMode::parse("fifo_relaxed"), Some(PresentMode::FifoRelaxed));
        assert_eq!(Msaa::from_samples(2), Some(Msaa::X2));
        assert_eq!(Msaa::from_samples(3), None);
    }

    #[test]
    fn capped_msaa_cycle_visits_every_supported_count() {
        let mut m = Msaa::X4;
        let mut seen = Vec::new();
        for _ in 0..4 {
            m = m.next_up_to(Msaa::X4);
            seen.push(m);
        }
        assert_eq!(seen, [Msaa::X1, Msaa::X2, Msaa::X4, Msaa::X1]);
        assert_eq!(Msaa::X1.next_up_to(Msaa::X1), Msaa::X1);
        assert_eq!(Msaa::X4.next_up_to(Msaa::X8), Msaa::X8);
    }
}
