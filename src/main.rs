use anyhow::{Context, Result};
use clap::Parser;
use encode_session::{
    diagnostics::TB_SPLIT, EncodeSession, FileSink, FrameSource, Report, RunSummary, YuvSource,
};
use serde::Serialize;

mod args;

use args::Args;

fn init_logging(level: log::LevelFilter) {
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .filter_module("encode_session", level)
        .filter_module("enc265", level)
        .init();
}

#[derive(Serialize)]
struct Stats<'a> {
    summary: &'a RunSummary,
    report: &'a Report,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_level());

    let config = args.to_config()?;
    if args.show_params {
        println!("{}", config.to_json());
        return Ok(());
    }
    let Some(input) = args.input.as_ref() else {
        anyhow::bail!("no input file given (use --input)");
    };

    let mut source = YuvSource::open(input, config.engine.width, config.engine.height)?;
    if args.first_frame > 0 {
        let skipped = source.skip(args.first_frame)?;
        if skipped < args.first_frame {
            log::warn!(
                "input has only {} frames, nothing left after skipping {}",
                skipped,
                args.first_frame
            );
        }
    }
    let mut sink = FileSink::create(&args.output)?;
    let mut session = EncodeSession::new(config).context("failed to create encode session")?;

    let summary = encode_session::run(&mut session, &mut source, &mut sink, args.frames)
        .with_context(|| format!("failed to encode {}", input.display()))?;

    if args.stats_json {
        let report = session.report(None);
        let stats = Stats {
            summary: &summary,
            report: &report,
        };
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        print!("{}", session.report(Some(TB_SPLIT)));
        println!(
            "{} frames, {} packets, {} bytes written to {}",
            summary.frames_pushed,
            summary.packets_written,
            summary.bytes_written,
            args.output.display()
        );
    }
    Ok(())
}
