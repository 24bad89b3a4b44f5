//! Check external binaries and decoder support.

use vbr_common::config::MediaConfig;
use vbr_compose_engine::MediaContext;

pub fn run(media: MediaConfig) -> anyhow::Result<()> {
    println!("vbr System Check");
    println!("{}", "=".repeat(50));

    let ctx = match MediaContext::new(media) {
        Ok(ctx) => ctx,
        Err(e) => {
            println!("[FAIL] {e}");
            println!();
            println!("Install FFmpeg or set VBR_FFMPEG / VBR_FFPROBE to its location.");
            return Err(e.into());
        }
    };

    println!("[OK] ffmpeg: {}", ctx.ffmpeg().display());
    println!("     {}", ctx.ffmpeg_version());
    println!("[OK] ffprobe: {}", ctx.ffprobe().display());

    if ctx.supports_vp9_alpha_decoder() {
        println!("[OK] libvpx-vp9 decoder: available (WebM alpha preserved)");
    } else {
        println!("[WARN] libvpx-vp9 decoder: missing (WebM layers may lose transparency)");
    }

    println!("     Temp arena: {}", ctx.temp_dir().display());
    println!();
    println!("vbr is ready.");

    ctx.cleanup()?;
    Ok(())
}
