use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Parser;
use encode_session::SessionConfig;

/**
    Encodes raw 4:2:0 YUV frames through a streaming encode session.
*/
#[derive(Parser, Debug)]
#[command(name = "enc265")]
pub struct Args {
    /// Raw planar YUV 4:2:0 input file.
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Frame width in luma samples.
    #[arg(long, default_value_t = 352)]
    pub width: u32,

    /// Frame height in luma samples.
    #[arg(long, default_value_t = 288)]
    pub height: u32,

    /// Output file receiving the packets back to back.
    #[arg(short, long, default_value = "out.bin")]
    pub output: PathBuf,

    /// Number of input frames to skip.
    #[arg(long, default_value_t = 0)]
    pub first_frame: u64,

    /// Stop after this many frames.
    #[arg(long)]
    pub frames: Option<u64>,

    /// Look-ahead depth in frames.
    #[arg(long, default_value_t = 2)]
    pub lookahead: usize,

    /// Maximum distance between keyframes, 0 disables forced keyframes.
    #[arg(long, default_value_t = 25)]
    pub keyframe_interval: u64,

    /// Base quantizer (0-51).
    #[arg(long, default_value_t = 27)]
    pub qp: u8,

    /// Do not emit a sequence header before the first picture.
    #[arg(long)]
    pub no_sequence_headers: bool,

    /// Engine parameter as key=value, may be repeated.
    #[arg(long = "param", value_name = "KEY=VALUE")]
    pub params: Vec<String>,

    /// Print the effective parameters and exit.
    #[arg(long)]
    pub show_params: bool,

    /// Print every statistics section as JSON instead of the tb-split table.
    #[arg(long)]
    pub stats_json: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn log_level(&self) -> log::LevelFilter {
        match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }

    pub fn to_config(&self) -> Result<SessionConfig> {
        if self.qp > 51 {
            bail!("qp {} out of range 0-51", self.qp);
        }
        let mut config = SessionConfig::new(self.width, self.height)
            .with_lookahead(self.lookahead)
            .with_keyframe_interval(self.keyframe_interval)
            .with_qp(self.qp)
            .with_sequence_headers(!self.no_sequence_headers);
        for param in &self.params {
            let Some((key, value)) = param.split_once('=') else {
                bail!("parameter '{}' is not of the form key=value", param);
            };
            let key = key.trim();
            if key.is_empty() {
                bail!("parameter '{}' has an empty name", param);
            }
            config = config.with_param(key, value.trim());
        }
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::parse_from(std::iter::once("enc265").chain(args.iter().copied()))
    }

    #[test]
    fn test_defaults() -> Result<()> {
        let args = parse(&["-i", "in.yuv"]);
        assert_eq!(args.log_level(), log::LevelFilter::Warn);
        let config = args.to_config()?;
        assert_eq!(config.lookahead_depth, 2);
        assert_eq!((config.engine.width, config.engine.height), (352, 288));
        assert!(config.engine.sequence_headers);
        Ok(())
    }

    #[test]
    fn test_params_and_flags() -> Result<()> {
        let args = parse(&[
            "--width", "64", "--height", "32", "--lookahead", "0", "--no-sequence-headers",
            "--param", "scenecut=off", "--param", " psy-rd = 1.0", "-vv",
        ]);
        assert_eq!(args.log_level(), log::LevelFilter::Debug);
        let config = args.to_config()?;
        assert_eq!(config.lookahead_depth, 0);
        assert!(!config.engine.sequence_headers);
        assert_eq!(config.engine.params.get("scenecut").map(String::as_str), Some("off"));
        assert_eq!(config.engine.params.get("psy-rd").map(String::as_str), Some("1.0"));
        Ok(())
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse(&["--param", "novalue"]).to_config().is_err());
        assert!(parse(&["--param", "=1"]).to_config().is_err());
        assert!(parse(&["--qp", "60"]).to_config().is_err());
        assert!(parse(&["--width", "33"]).to_config().is_err());
        assert!(parse(&["--width", "4294967294", "--height", "4294967294"]).to_config().is_err());
    }
}
