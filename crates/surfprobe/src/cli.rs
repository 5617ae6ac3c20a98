use std::path::PathBuf;

use clap::Parser;
use surfconfig::{Color, WindowSize};

#[derive(Parser, Debug)]
#[command(
    name = "surfprobe",
    author,
    version,
    about = "Attach an OpenGL surface to a window and report what the driver granted"
)]
pub struct Cli {
    /// Surface configuration file; defaults to `surface.toml` in the config directory.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<WindowSize>,

    /// Background colour of the surface window as `#rrggbb`.
    #[arg(long, value_name = "#RRGGBB", value_parser = parse_background)]
    pub background: Option<Color>,

    /// Ask for a single-buffered pixel format.
    #[arg(long)]
    pub single_buffer: bool,

    /// Run against the in-memory backend instead of opening a window.
    #[arg(long)]
    pub headless: bool,

    /// Read back the whole depth buffer once the surface is up and report its range.
    #[arg(long)]
    pub read_depth: bool,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Close the window after this many milliseconds.
    #[arg(long, value_name = "MILLISECONDS")]
    pub exit_after_ms: Option<u64>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<WindowSize, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("size must not be empty".to_string());
    }

    let size: WindowSize = trimmed.parse()?;
    if size.width == 0 || size.height == 0 {
        return Err(format!("size {size} must be non-zero in both dimensions"));
    }
    Ok(size)
}

pub fn parse_background(value: &str) -> Result<Color, String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("background colour must not be empty".to_string());
    }
    trimmed.parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_size() {
        assert_eq!(
            parse_size("1280x720").unwrap(),
            WindowSize {
                width: 1280,
                height: 720
            }
        );
        assert!(parse_size("").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("1280").is_err());
    }

    #[test]
    fn parses_background() {
        let color = parse_background("#ff0000").unwrap();
        assert_eq!(color.components(), [1.0, 0.0, 0.0]);
        assert!(parse_background(" ").is_err());
        assert!(parse_background("red").is_err());
    }

    #[test]
    fn parses_full_command_line() {
        let cli = Cli::try_parse_from([
            "surfprobe",
            "--size",
            "320x200",
            "--background",
            "#000080",
            "--single-buffer",
            "--headless",
            "--read-depth",
            "--json",
            "--exit-after-ms",
            "250",
        ])
        .unwrap();
        assert_eq!(cli.size.map(|s| s.width), Some(320));
        assert!(cli.single_buffer && cli.headless && cli.read_depth && cli.json);
        assert_eq!(cli.exit_after_ms, Some(250));
        assert!(cli.config.is_none());
    }
}
