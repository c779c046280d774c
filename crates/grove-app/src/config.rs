// SPDX-License-Identifier: CEPL-1.0
use grove_render::RenderConfig;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct WindowCfg {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: default_title(),
            width: default_width(),
            height: default_height(),
        }
    }
}

fn default_title() -> String {
    "grove".into()
}
fn default_width() -> u32 {
    1280
}
fn default_height() -> u32 {
    720
}

/// Optional texture files for the demo objects; generated checkers otherwise.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SceneCfg {
    #[serde(default)]
    pub plane_texture: Option<PathBuf>,
    #[serde(default)]
    pub cube_texture: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct AppCfg {
    #[serde(default)]
    pub window: WindowCfg,
    #[serde(default)]
    pub render: RenderConfig,
    #[serde(default)]
    pub scene: SceneCfg,
}

pub fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => match toml::from_str::<AppCfg>(&s) {
            Ok(cfg) => {
                info!("config: {:?}", path);
                cfg
            }
            Err(e) => {
                warn!("config {:?} is malformed, using defaults: {e}", path);
                AppCfg::default()
            }
        },
        Err(_) => AppCfg::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_render::{Msaa, PresentMode};

    #[test]
    fn partial_file_keeps_defaults() {
        let cfg: AppCfg = toml::from_str(
            r#"
            [window]
            width = 800

            [render]
            present_mode = "mailbox"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 800);
        assert_eq!(cfg.window.height, 720);
        assert_eq!(cfg.render.present_mode, PresentMode::Mailbox);
        assert_eq!(cfg.render.msaa, Msaa::X4);
        assert_eq!(cfg.scene, SceneCfg::default());
    }

    #[test]
    fn missing_file_falls_back() {
        let cfg = load_cfg(Path::new("definitely/not/here.toml"));
        assert_eq!(cfg, AppCfg::default());
    }
}
