use std::time::Duration;

use glsurface::{DisplaySettings, PolygonOffset, Rgba};
use surfconfig::{Color, DisplaySection, SurfaceConfig, WindowSize};

use crate::cli::Cli;

/// Everything a probe run needs, with command-line flags applied over the file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbePlan {
    pub settings: DisplaySettings,
    pub color_bits: u8,
    pub depth_bits: u8,
    pub size: WindowSize,
    pub background: Rgba,
    pub read_depth: bool,
    pub exit_after: Option<Duration>,
}

pub fn plan(cli: &Cli, config: &SurfaceConfig) -> ProbePlan {
    let mut settings = display_settings(&config.display);
    if cli.single_buffer {
        settings.double_buffer = false;
    }

    ProbePlan {
        settings,
        color_bits: config.format.color_bits,
        depth_bits: config.format.depth_bits,
        size: cli.size.unwrap_or(config.window.size),
        background: background(cli.background.or(config.window.background)),
        read_depth: cli.read_depth,
        exit_after: cli.exit_after_ms.map(Duration::from_millis),
    }
}

pub fn display_settings(section: &DisplaySection) -> DisplaySettings {
    DisplaySettings {
        double_buffer: section.double_buffer,
        dither: section.dither,
        back_dither: section.back_dither,
        polygon_offset: PolygonOffset {
            factor: section.polygon_offset.factor,
            units: section.polygon_offset.units,
        },
    }
}

pub fn background(color: Option<Color>) -> Rgba {
    match color {
        Some(color) => Rgba::opaque(color.r, color.g, color.b),
        None => Rgba::DEFAULT_BACKGROUND,
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    const CONFIG: &str = r##"
version = 1
[display]
dither = false
polygon_offset = { factor = 0.5, units = 2.0 }
[format]
color_bits = 16
depth_bits = 24
[window]
size = "640x480"
background = "#0000ff"
"##;

    #[test]
    fn file_values_flow_into_plan() {
        let cli = Cli::try_parse_from(["surfprobe"]).unwrap();
        let config = SurfaceConfig::from_toml_str(CONFIG).unwrap();

        let plan = plan(&cli, &config);

        assert!(plan.settings.double_buffer);
        assert!(!plan.settings.dither);
        assert_eq!(plan.settings.polygon_offset.units, 2.0);
        assert_eq!((plan.color_bits, plan.depth_bits), (16, 24));
        assert_eq!(plan.size.width, 640);
        assert_eq!(plan.background, Rgba::opaque(0.0, 0.0, 1.0));
        assert_eq!(plan.exit_after, None);
    }

    #[test]
    fn flags_override_file() {
        let cli = Cli::try_parse_from([
            "surfprobe",
            "--single-buffer",
            "--size",
            "100x50",
            "--background",
            "#ffffff",
            "--exit-after-ms",
            "1500",
        ])
        .unwrap();
        let config = SurfaceConfig::from_toml_str(CONFIG).unwrap();

        let plan = plan(&cli, &config);

        assert!(!plan.settings.double_buffer);
        assert_eq!(
            (plan.size.width, plan.size.height),
            (100, 50)
        );
        assert_eq!(plan.background, Rgba::opaque(1.0, 1.0, 1.0));
        assert_eq!(plan.exit_after, Some(Duration::from_millis(1500)));
    }

    #[test]
    fn missing_background_is_opaque_black() {
        assert_eq!(background(None), Rgba::new(0.0, 0.0, 0.0, 1.0));
    }
}
