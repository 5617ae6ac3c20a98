use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to read configuration {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SurfaceConfig {
    pub version: u32,
    #[serde(default)]
    pub display: DisplaySection,
    #[serde(default)]
    pub format: FormatSection,
    #[serde(default)]
    pub window: WindowSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DisplaySection {
    #[serde(default = "default_true")]
    pub double_buffer: bool,
    #[serde(default = "default_true")]
    pub dither: bool,
    #[serde(default = "default_true")]
    pub back_dither: bool,
    #[serde(default)]
    pub polygon_offset: PolygonOffsetSection,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PolygonOffsetSection {
    #[serde(default = "default_offset")]
    pub factor: f32,
    #[serde(default = "default_offset")]
    pub units: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct FormatSection {
    #[serde(default = "default_color_bits")]
    pub color_bits: u8,
    #[serde(default = "default_depth_bits")]
    pub depth_bits: u8,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowSection {
    #[serde(default = "default_size", deserialize_with = "deserialize_size")]
    pub size: WindowSize,
    #[serde(default, deserialize_with = "deserialize_color_opt")]
    pub background: Option<Color>,
}

/// Window size in physical pixels, written `WIDTHxHEIGHT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// RGB colour with components in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

fn default_true() -> bool {
    true
}

fn default_offset() -> f32 {
    1.0
}

fn default_color_bits() -> u8 {
    24
}

fn default_depth_bits() -> u8 {
    16
}

fn default_size() -> WindowSize {
    WindowSize {
        width: 800,
        height: 600,
    }
}

impl Default for DisplaySection {
    fn default() -> Self {
        Self {
            double_buffer: true,
            dither: true,
            back_dither: true,
            polygon_offset: PolygonOffsetSection::default(),
        }
    }
}

impl Default for PolygonOffsetSection {
    fn default() -> Self {
        Self {
            factor: default_offset(),
            units: default_offset(),
        }
    }
}

impl Default for FormatSection {
    fn default() -> Self {
        Self {
            color_bits: default_color_bits(),
            depth_bits: default_depth_bits(),
        }
    }
}

impl Default for WindowSection {
    fn default() -> Self {
        Self {
            size: default_size(),
            background: None,
        }
    }
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            display: DisplaySection::default(),
            format: FormatSection::default(),
            window: WindowSection::default(),
        }
    }
}

impl fmt::Display for WindowSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for WindowSize {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let (width, height) = normalized
            .split_once('x')
            .ok_or_else(|| format!("invalid size '{raw}'; expected WIDTHxHEIGHT"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|err| format!("invalid size '{raw}': {err}"))
        };
        Ok(Self {
            width: parse(width)?,
            height: parse(height)?,
        })
    }
}

impl Color {
    pub fn components(&self) -> [f32; 3] {
        [self.r, self.g, self.b]
    }
}

impl FromStr for Color {
    type Err = String;

    /// Parses `#rrggbb` (the `#` is optional).
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let hex = raw.trim();
        let hex = hex.strip_prefix('#').unwrap_or(hex);
        if hex.len() != 6 || !hex.chars().all(|ch| ch.is_ascii_hexdigit()) {
            return Err(format!("invalid colour '{raw}'; expected #rrggbb"));
        }
        let channel = |at: usize| {
            u8::from_str_radix(&hex[at..at + 2], 16)
                .map(|value| f32::from(value) / 255.0)
                .map_err(|err| format!("invalid colour '{raw}': {err}"))
        };
        Ok(Self {
            r: channel(0)?,
            g: channel(2)?,
            b: channel(4)?,
        })
    }
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<WindowSize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    raw.parse().map_err(de::Error::custom)
}

fn deserialize_color_opt<'de, D>(deserializer: D) -> Result<Option<Color>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Helper {
        Hex(String),
        Rgb([f32; 3]),
    }

    let helper: Option<Helper> = Option::deserialize(deserializer)?;
    let color: Option<Color> = match helper {
        None => None,
        Some(Helper::Hex(raw)) => Some(raw.parse().map_err(de::Error::custom)?),
        Some(Helper::Rgb([r, g, b])) => Some(Color { r, g, b }),
    };
    Ok(color)
}

impl SurfaceConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: SurfaceConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let input = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&input)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        for (name, bits) in [
            ("format.color_bits", self.format.color_bits),
            ("format.depth_bits", self.format.depth_bits),
        ] {
            if !(1..=32).contains(&bits) {
                return Err(ConfigError::Invalid(format!(
                    "{name} must be between 1 and 32, got {bits}"
                )));
            }
        }

        let offset = self.display.polygon_offset;
        if !offset.factor.is_finite() || !offset.units.is_finite() {
            return Err(ConfigError::Invalid(
                "display.polygon_offset factor and units must be finite".into(),
            ));
        }

        let size = self.window.size;
        if size.width == 0 || size.height == 0 {
            return Err(ConfigError::Invalid(format!(
                "window.size must be non-zero, got {size}"
            )));
        }

        if let Some(color) = self.window.background {
            if color
                .components()
                .iter()
                .any(|c| !(0.0..=1.0).contains(c))
            {
                return Err(ConfigError::Invalid(format!(
                    "window.background components must be within 0..=1, got {:?}",
                    color.components()
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
version = 1

[display]
double_buffer = false
dither = true
back_dither = false
polygon_offset = { factor = 2.0, units = 4 }

[format]
color_bits = 32
depth_bits = 24

[window]
size = "1024x768"
background = "#ff8000"
"##;

    #[test]
    fn parses_sample_config() {
        let config = SurfaceConfig::from_toml_str(SAMPLE).expect("parse config");
        assert!(!config.display.double_buffer);
        assert!(!config.display.back_dither);
        assert_eq!(config.display.polygon_offset.units, 4.0);
        assert_eq!(config.format.depth_bits, 24);
        assert_eq!(
            config.window.size,
            WindowSize {
                width: 1024,
                height: 768
            }
        );
        let background = config.window.background.unwrap();
        assert_eq!(background.r, 1.0);
        assert!((background.g - 128.0 / 255.0).abs() < f32::EPSILON);
        assert_eq!(background.b, 0.0);
    }

    #[test]
    fn missing_sections_take_defaults() {
        let config = SurfaceConfig::from_toml_str("version = 1").unwrap();
        assert_eq!(config, SurfaceConfig::default());
    }

    #[test]
    fn accepts_rgb_array_background() {
        let config = SurfaceConfig::from_toml_str(
            r#"
version = 1
[window]
background = [0.25, 0.5, 1]
"#,
        )
        .unwrap();
        assert_eq!(
            config.window.background,
            Some(Color {
                r: 0.25,
                g: 0.5,
                b: 1.0
            })
        );
    }

    #[test]
    fn rejects_unknown_version() {
        let err = SurfaceConfig::from_toml_str("version = 2").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_zero_size() {
        let err = SurfaceConfig::from_toml_str(
            r#"
version = 1
[window]
size = "0x600"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)), "{err}");
    }

    #[test]
    fn rejects_out_of_range_bits() {
        let err = SurfaceConfig::from_toml_str(
            r#"
version = 1
[format]
depth_bits = 0
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("depth_bits"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_background() {
        let err = SurfaceConfig::from_toml_str(
            r#"
version = 1
[window]
background = [2.0, 0.0, 0.0]
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn malformed_size_is_a_parse_error() {
        let err = SurfaceConfig::from_toml_str(
            r#"
version = 1
[window]
size = "wide"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn size_and_colour_parsers() {
        assert_eq!(
            " 640X480 ".parse::<WindowSize>().unwrap(),
            WindowSize {
                width: 640,
                height: 480
            }
        );
        assert!("640".parse::<WindowSize>().is_err());
        assert_eq!(
            "00ff00".parse::<Color>().unwrap(),
            Color {
                r: 0.0,
                g: 1.0,
                b: 0.0
            }
        );
        assert!("#12345".parse::<Color>().is_err());
        assert!("#gggggg".parse::<Color>().is_err());
    }
}
