//! Build a composition from a manifest, then print, export or stream it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use vbr_common::config::MediaConfig;
use vbr_compose_engine::{
    export_composition, Compiler, EncoderProfile, ExportJob, ExportStage, Exporter,
    MediaContext, ProgressCallback, StreamFormat,
};

use crate::manifest::Manifest;

pub struct ComposeArgs {
    pub manifest: PathBuf,
    pub output: PathBuf,
    pub encoder: String,
    pub dry_run: bool,
    pub stream: Option<String>,
    pub verbose: bool,
}

pub async fn run(media: MediaConfig, args: ComposeArgs) -> anyhow::Result<()> {
    let encoder: EncoderProfile = args.encoder.parse()?;
    let stream = args
        .stream
        .as_deref()
        .map(str::parse::<StreamFormat>)
        .transpose()?;

    let manifest = Manifest::load(&args.manifest)?;
    let base = args.manifest.parent().unwrap_or(Path::new(""));

    let ctx = Arc::new(MediaContext::new(media)?);
    let composition = manifest.build(&ctx, base)?;
    tracing::info!(
        manifest = %args.manifest.display(),
        layers = composition.layers().len(),
        "Composition loaded"
    );

    if args.dry_run {
        let prepared = ctx.prepare(&composition)?;
        println!("{}", Compiler::for_context(&ctx).dry_run(&prepared)?);
        return Ok(());
    }

    if let Some(format) = stream {
        return stream_to_stdout(&ctx, &composition, &encoder, format);
    }

    eprintln!("Exporting to: {}", args.output.display());
    eprintln!("  Encoder: {}", encoder.name());

    let progress: ProgressCallback = Box::new(|stage: ExportStage| {
        eprintln!("  Stage: {}", stage.as_str());
    });
    let job = ExportJob {
        composition,
        encoder,
        output_path: args.output,
        verbose: args.verbose,
    };

    let written = export_composition(Arc::clone(&ctx), job, Some(progress)).await?;
    eprintln!("Export complete: {}", written.display());
    Ok(())
}

fn stream_to_stdout(
    ctx: &MediaContext,
    composition: &vbr_media_model::Composition,
    encoder: &EncoderProfile,
    format: StreamFormat,
) -> anyhow::Result<()> {
    let prepared = ctx.prepare(composition)?;
    let command = Compiler::for_context(ctx).compile_for_stream(&prepared, encoder, format)?;
    let mut output = Exporter::for_context(ctx).spawn_stream(&command)?;

    let stdout = std::io::stdout();
    let mut sink = stdout.lock();
    let bytes = std::io::copy(&mut output, &mut sink)?;
    output.finish()?;
    tracing::info!(bytes, "Stream finished");
    Ok(())
}
