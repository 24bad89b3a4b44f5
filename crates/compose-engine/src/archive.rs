//! Unpacking zipped mask bundles (`color.mp4` + `alpha.mp4` [+ `audio.m4a`]).

use std::fs::File;
use std::path::{Path, PathBuf};

use vbr_common::error::{VbrError, VbrResult};
use vbr_media_model::Foreground;

use crate::context::MediaContext;

pub const COLOR_MEMBER: &str = "color.mp4";
pub const MASK_MEMBER: &str = "alpha.mp4";
pub const AUDIO_MEMBER: &str = "audio.m4a";

/// Prefix of extraction directories inside the arena.
pub const BUNDLE_PREFIX: &str = "pro_bundle_";

/// Files found in an extracted bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleMembers {
    pub color: PathBuf,
    pub mask: PathBuf,
    pub audio: Option<PathBuf>,
}

/// Extract `archive` into `dest` and locate the bundle members.
///
/// A missing color or mask clip is a configuration error naming it.
pub fn extract_bundle(archive: &Path, dest: &Path) -> VbrResult<BundleMembers> {
    let file = File::open(archive).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => VbrError::FileNotFound {
            path: archive.to_path_buf(),
        },
        _ => VbrError::acquisition(format!("Failed to open {}: {e}", archive.display())),
    })?;
    let mut zip = zip::ZipArchive::new(file)
        .map_err(|e| VbrError::config(format!("Failed to open zip: {e}")))?;
    zip.extract(dest)
        .map_err(|e| VbrError::acquisition(format!("Failed to extract zip: {e}")))?;

    let member = |name: &str| {
        let path = dest.join(name);
        path.is_file().then_some(path)
    };
    let color = member(COLOR_MEMBER)
        .ok_or_else(|| VbrError::config(format!("{COLOR_MEMBER} not found in bundle")))?;
    let mask = member(MASK_MEMBER)
        .ok_or_else(|| VbrError::config(format!("{MASK_MEMBER} not found in bundle")))?;

    Ok(BundleMembers {
        color,
        mask,
        audio: member(AUDIO_MEMBER),
    })
}

impl MediaContext {
    /// Turn an archive foreground into a mask-bundle foreground.
    ///
    /// Other formats are returned unchanged. The archive's source trim
    /// carries over to the unpacked foreground.
    pub fn unpack_archive(&self, fg: &Foreground) -> VbrResult<Foreground> {
        if !fg.is_archive() {
            return Ok(fg.clone());
        }

        let archive = Path::new(fg.primary_path());
        let dest = self.scratch_dir(BUNDLE_PREFIX)?;
        let members = extract_bundle(archive, &dest)?;
        tracing::info!(
            archive = %archive.display(),
            dest = %dest.display(),
            audio = members.audio.is_some(),
            "Extracted mask bundle"
        );

        let color = members.color.display().to_string();
        let info = self.prober().probe(&color);
        Ok(Foreground::video_and_mask(
            color,
            members.mask.display().to_string(),
            members.audio.map(|p| p.display().to_string()),
            info,
        )
        .with_trim(fg.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, members: &[&str]) {
        let file = File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        for name in members {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(b"not really video").unwrap();
        }
        zip.finish().unwrap();
    }

    #[test]
    fn test_extracts_all_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[COLOR_MEMBER, MASK_MEMBER, AUDIO_MEMBER, "manifest.json"]);

        let dest = dir.path().join("out");
        let members = extract_bundle(&archive, &dest).unwrap();
        assert_eq!(members.color, dest.join(COLOR_MEMBER));
        assert_eq!(members.mask, dest.join(MASK_MEMBER));
        assert_eq!(members.audio, Some(dest.join(AUDIO_MEMBER)));
    }

    #[test]
    fn test_audio_is_optional() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[COLOR_MEMBER, MASK_MEMBER]);

        let members = extract_bundle(&archive, &dir.path().join("out")).unwrap();
        assert!(members.audio.is_none());
    }

    #[test]
    fn test_missing_mask_names_member() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        write_zip(&archive, &[COLOR_MEMBER]);

        let err = extract_bundle(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.is_config());
        assert!(err.to_string().contains(MASK_MEMBER));
    }

    #[test]
    fn test_missing_archive_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("gone.zip");

        let err = extract_bundle(&archive, &dir.path().join("out")).unwrap_err();
        assert!(matches!(err, VbrError::FileNotFound { ref path } if *path == archive));
        assert!(err.to_string().contains("gone.zip"));
    }

    #[test]
    fn test_not_a_zip_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bundle.zip");
        std::fs::write(&archive, b"plain text").unwrap();

        let err = extract_bundle(&archive, &dir.path().join("out")).unwrap_err();
        assert!(err.is_config());
    }

    #[test]
    fn test_non_archive_passes_through() {
        let root = tempfile::tempdir().unwrap();
        let config = vbr_common::config::MediaConfig {
            tmp_root: Some(root.path().to_path_buf()),
            ..Default::default()
        };
        let ctx = MediaContext::unverified(config, false).unwrap();
        let fg = Foreground::webm_vp9(
            "fg.webm",
            vbr_media_model::MediaInfo::fallback("fg.webm"),
        );
        assert_eq!(ctx.unpack_archive(&fg).unwrap(), fg);
    }
}
