//! Print probed metadata for one source.

use vbr_common::config::MediaConfig;
use vbr_compose_engine::MediaContext;

pub fn run(media: MediaConfig, source: String) -> anyhow::Result<()> {
    let ctx = MediaContext::new(media)?;
    let info = ctx.probe(&source);
    if !info.probed {
        eprintln!("warning: ffprobe could not read {source}; showing a guess from its name");
    }
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}
