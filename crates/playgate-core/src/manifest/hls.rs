//! HLS master playlist parsing
//!
//! Only the multivariant view matters here: each non-I-frame variant becomes
//! one `QualityLevel`, ordered by bitrate so indices are stable for the
//! lifetime of a source.

use super::MasterManifest;
use crate::{error::Error, types::QualityLevel, Result};
use m3u8_rs::{MasterPlaylist, Playlist};
use tracing::debug;
use url::Url;

/// HLS playlist parser
#[derive(Debug, Clone, Copy, Default)]
pub struct HlsParser;

impl HlsParser {
    pub fn new() -> Self {
        Self
    }

    /// Parse a playlist body fetched from `base_url`
    pub fn parse(&self, content: &[u8], base_url: &Url) -> Result<MasterManifest> {
        match m3u8_rs::parse_playlist_res(content) {
            Ok(Playlist::MasterPlaylist(master)) => Ok(MasterManifest {
                levels: self.extract_levels(&master),
                base_url: base_url.clone(),
                is_multivariant: true,
            }),
            // A bare media playlist carries a single, unnamed quality
            Ok(Playlist::MediaPlaylist(media)) => {
                debug!(segments = media.segments.len(), "Media playlist without variants");
                Ok(MasterManifest {
                    levels: Vec::new(),
                    base_url: base_url.clone(),
                    is_multivariant: false,
                })
            }
            Err(e) => Err(Error::ManifestParse(format!("Failed to parse HLS playlist: {:?}", e))),
        }
    }

    /// Extract quality levels from a master playlist
    fn extract_levels(&self, master: &MasterPlaylist) -> Vec<QualityLevel> {
        let mut variants: Vec<_> = master
            .variants
            .iter()
            .filter(|v| !v.is_i_frame)
            .map(|v| {
                let (width, height) = v
                    .resolution
                    .map(|r| (r.width as u32, r.height as u32))
                    .unwrap_or((0, 0));
                (width, height, v.bandwidth)
            })
            .collect();

        variants.sort_by_key(|&(_, height, bitrate)| (bitrate, height));
        variants.dedup();

        variants
            .into_iter()
            .enumerate()
            .map(|(index, (width, height, bitrate))| QualityLevel {
                index,
                width,
                height,
                bitrate,
            })
            .collect()
    }
}
