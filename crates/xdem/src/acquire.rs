//! Guarantees that a source tile is present in the local cache.
//!
//! ## Concurrency
//!
//! The "recycle if present and large enough" check is not transactional.
//! Two acquirers racing on the same tile may both download it; the second
//! write replaces the first with identical content. Files are written under a
//! temporary name and renamed into place, so a partial file is never recycled.

use crate::coords::{parse_hem_filename, TileOrigin};
use crate::fetch::{FetchOutcome, Fetcher};
use crate::sources::{ned_url, DemSource, ViewArchive};
use crate::Result;
use std::fs;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use zip::ZipArchive;

/// Download statistics for an acquirer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DownloadStats {
    /// Number of successful downloads this session.
    pub downloads: usize,
    /// Total bytes downloaded this session.
    pub bytes_downloaded: u64,
    /// Number of files written into the cache.
    pub files_written: usize,
}

/// Downloads and unpacks elevation tiles into a deterministic cache layout.
#[derive(Debug)]
pub struct SourceAcquirer {
    cache_dir: PathBuf,
    fetcher: Fetcher,
    downloads: AtomicUsize,
    bytes_downloaded: AtomicU64,
    files_written: AtomicUsize,
}

impl SourceAcquirer {
    /// Create an acquirer rooted at `cache_dir`.
    pub fn new<P: AsRef<Path>>(cache_dir: P, fetcher: Fetcher) -> Self {
        Self {
            cache_dir: cache_dir.as_ref().to_path_buf(),
            fetcher,
            downloads: AtomicUsize::new(0),
            bytes_downloaded: AtomicU64::new(0),
            files_written: AtomicUsize::new(0),
        }
    }

    /// Root of the cache.
    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Cache location of a tile.
    pub fn cache_path(&self, source: DemSource, tile: TileOrigin) -> PathBuf {
        source.cache_path(&self.cache_dir, tile)
    }

    /// Download statistics for this session.
    pub fn download_stats(&self) -> DownloadStats {
        DownloadStats {
            downloads: self.downloads.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            files_written: self.files_written.load(Ordering::Relaxed),
        }
    }

    /// Make sure the tile of `source` at `tile` is cached locally.
    ///
    /// Returns `false` when the data could not be obtained for any reason;
    /// callers treat this as "no elevation data here".
    pub fn ensure_local(&self, source: DemSource, tile: TileOrigin) -> bool {
        let result = match source {
            DemSource::View => self.ensure_view(tile),
            DemSource::Srtm | DemSource::Alos => Ok(self.ensure_manual(source, tile)),
            DemSource::Ned1 | DemSource::Ned13 => self.ensure_single_file(source, tile),
        };
        match result {
            Ok(available) => available,
            Err(e) => {
                tracing::warn!("Could not store {} tile {}: {}", source, tile, e);
                false
            }
        }
    }

    fn ensure_view(&self, tile: TileOrigin) -> Result<bool> {
        let archive = ViewArchive::for_tile(tile);
        let target = self.cache_path(DemSource::View, tile);
        if let Ok(meta) = fs::metadata(&target) {
            if meta.len() >= archive.min_tile_bytes() {
                tracing::debug!("Recycling {}", target.display());
                return Ok(true);
            }
        }

        tracing::info!(
            "Downloading {} from Viewfinderpanoramas (J. de Ferranti)",
            target.display()
        );
        let bytes = match self.download(&archive.url(), DemSource::View) {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        self.unpack_view_archive(&bytes)?;
        Ok(target.exists())
    }

    /// Extract every tile of a Viewfinderpanoramas archive into the cache.
    ///
    /// A cached file larger than the archive entry is kept: it comes from a
    /// higher resolution archive and must not be replaced by a 3" tile.
    fn unpack_view_archive(&self, bytes: &[u8]) -> Result<usize> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))?;
        let mut extracted = 0;
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            let name = entry.name().to_string();
            let basename = name.rsplit('/').next().unwrap_or(&name);
            let tile = match parse_hem_filename(basename) {
                Some(tile) => tile,
                None => {
                    tracing::debug!("Archive contains the unknown file name {} which is skipped", name);
                    continue;
                }
            };
            let out_path = self.cache_path(DemSource::View, tile);
            if let Ok(meta) = fs::metadata(&out_path) {
                if meta.len() > entry.size() {
                    tracing::debug!("Keeping higher resolution {}", out_path.display());
                    continue;
                }
            }
            let mut data = Vec::with_capacity(entry.size() as usize);
            entry.read_to_end(&mut data)?;
            self.write_cache_file(&out_path, &data)?;
            tracing::debug!("Extracting {}", out_path.display());
            extracted += 1;
        }
        Ok(extracted)
    }

    fn ensure_manual(&self, source: DemSource, tile: TileOrigin) -> bool {
        let target = self.cache_path(source, tile);
        if target.exists() {
            tracing::debug!("Recycling {}", target.display());
            return true;
        }
        tracing::warn!(
            "{} has no direct downloads anymore, place {} manually",
            source,
            target.display()
        );
        false
    }

    fn ensure_single_file(&self, source: DemSource, tile: TileOrigin) -> Result<bool> {
        let target = self.cache_path(source, tile);
        if target.exists() {
            tracing::debug!("Recycling {}", target.display());
            return Ok(true);
        }
        let url = match ned_url(source, tile) {
            Some(url) => url,
            None => return Ok(false),
        };
        tracing::info!("Downloading {} from USGS", target.display());
        match self.download(&url, source) {
            Some(bytes) => {
                self.write_cache_file(&target, &bytes)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn download(&self, url: &str, source: DemSource) -> Option<Vec<u8>> {
        match self.fetcher.fetch(url, source.short_name()) {
            FetchOutcome::Success(bytes) => {
                self.downloads.fetch_add(1, Ordering::Relaxed);
                self.bytes_downloaded.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Some(bytes)
            }
            FetchOutcome::Absent => {
                tracing::info!("{} has no data at {}", source, url);
                None
            }
            FetchOutcome::Failed => None,
        }
    }

    fn write_cache_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        // Readers only ever see a missing or a complete file.
        let partial = partial_path(path);
        if let Err(e) = fs::write(&partial, data).and_then(|_| fs::rename(&partial, path)) {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        self.files_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

/// Sibling of `path` unique to this process and write.
fn partial_path(path: &Path) -> PathBuf {
    static NEXT: AtomicUsize = AtomicUsize::new(0);
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(
        ".{}-{}.part",
        std::process::id(),
        NEXT.fetch_add(1, Ordering::Relaxed)
    ));
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::tests::{RecordingSleeper, ScriptedTransport};
    use crate::sources::HGT_3_ARCSEC_BYTES;
    use std::io::Write;
    use std::sync::Arc;
    use zip::write::SimpleFileOptions;

    fn acquirer(
        dir: &Path,
        script: Vec<std::result::Result<crate::fetch::HttpResponse, String>>,
    ) -> (SourceAcquirer, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new(script));
        let fetcher = Fetcher::new(transport.clone(), Arc::new(RecordingSleeper::default()));
        (SourceAcquirer::new(dir, fetcher), transport)
    }

    fn zip_with(entries: &[(&str, usize)]) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, size) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(&vec![0u8; *size]).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    #[test]
    fn test_view_downloads_and_unpacks_archive() {
        let dir = tempfile::tempdir().unwrap();
        let size = HGT_3_ARCSEC_BYTES as usize;
        let archive = zip_with(&[
            ("C29/N10W010.hgt", size),
            ("C29/N11W009.hgt", size),
            ("C29/readme.txt", 10),
        ]);
        let (acq, transport) = acquirer(dir.path(), vec![ScriptedTransport::ok(archive)]);

        assert!(acq.ensure_local(DemSource::View, TileOrigin::new(10, -10)));
        assert_eq!(
            transport.requests.lock().unwrap()[0],
            "http://viewfinderpanoramas.org/dem3/C29.zip"
        );
        assert!(acq.cache_path(DemSource::View, TileOrigin::new(11, -9)).exists());
        let stats = acq.download_stats();
        assert_eq!(stats.downloads, 1);
        assert_eq!(stats.files_written, 2);

        // Second call recycles without touching the network.
        assert!(acq.ensure_local(DemSource::View, TileOrigin::new(11, -9)));
        assert_eq!(transport.request_count(), 1);
    }

    #[test]
    fn test_view_keeps_higher_resolution_file() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, _) = acquirer(
            dir.path(),
            vec![ScriptedTransport::ok(zip_with(&[
                ("N10W010.hgt", 100),
                ("N11W010.hgt", 100),
            ]))],
        );
        let precise = acq.cache_path(DemSource::View, TileOrigin::new(11, -10));
        fs::create_dir_all(precise.parent().unwrap()).unwrap();
        fs::write(&precise, vec![1u8; 500]).unwrap();

        assert!(acq.ensure_local(DemSource::View, TileOrigin::new(10, -10)));
        assert_eq!(fs::metadata(&precise).unwrap().len(), 500);
        assert_eq!(
            fs::metadata(acq.cache_path(DemSource::View, TileOrigin::new(10, -10)))
                .unwrap()
                .len(),
            100
        );
    }

    #[test]
    fn test_view_redownloads_undersized_one_arcsec_tile() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, transport) = acquirer(dir.path(), vec![ScriptedTransport::status(404)]);
        // Alps tile exists but only at 3" size: not sufficient.
        let path = acq.cache_path(DemSource::View, TileOrigin::new(45, 7));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, vec![0u8; 16]).unwrap();

        assert!(!acq.ensure_local(DemSource::View, TileOrigin::new(45, 7)));
        assert_eq!(
            transport.requests.lock().unwrap()[0],
            "http://viewfinderpanoramas.org/dem1/L32.zip"
        );
    }

    #[test]
    fn test_corrupt_archive_reports_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, _) = acquirer(dir.path(), vec![ScriptedTransport::ok(b"not a zip".to_vec())]);
        assert!(!acq.ensure_local(DemSource::View, TileOrigin::new(10, -10)));
    }

    #[test]
    fn test_srtm_only_recycles() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, transport) = acquirer(dir.path(), vec![]);
        let tile = TileOrigin::new(45, 7);
        assert!(!acq.ensure_local(DemSource::Srtm, tile));

        let path = acq.cache_path(DemSource::Srtm, tile);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, [0u8; 8]).unwrap();
        assert!(acq.ensure_local(DemSource::Srtm, tile));
        assert_eq!(transport.request_count(), 0);
    }

    #[test]
    fn test_ned_download() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, transport) = acquirer(dir.path(), vec![ScriptedTransport::ok(vec![7u8; 32])]);
        let tile = TileOrigin::new(47, -123);

        assert!(acq.ensure_local(DemSource::Ned1, tile));
        assert!(transport.requests.lock().unwrap()[0].ends_with("/1/TIFF/current/n48w123/USGS_1_n48w123.tif"));
        assert_eq!(fs::read(acq.cache_path(DemSource::Ned1, tile)).unwrap(), vec![7u8; 32]);
    }

    #[test]
    fn test_ned_absent() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, _) = acquirer(dir.path(), vec![ScriptedTransport::status(404)]);
        let tile = TileOrigin::new(10, 10);
        assert!(!acq.ensure_local(DemSource::Ned13, tile));
        assert!(!acq.cache_path(DemSource::Ned13, tile).exists());
    }

    #[test]
    fn test_cache_writes_leave_no_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        let (acq, _) = acquirer(dir.path(), vec![]);
        let path = acq.cache_path(DemSource::View, TileOrigin::new(45, 7));
        let data = vec![7u8; 4096];

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| acq.write_cache_file(&path, &data).unwrap());
            }
        });

        assert_eq!(fs::read(&path).unwrap(), data);
        let entries: Vec<_> = fs::read_dir(path.parent().unwrap()).unwrap().collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(acq.download_stats().files_written, 4);
    }

    #[test]
    fn test_partial_paths_are_unique_siblings() {
        let path = Path::new("/cache/SRTM/+40+000/N45E007.hgt");
        let a = partial_path(path);
        let b = partial_path(path);
        assert_ne!(a, b);
        assert_eq!(a.parent(), path.parent());
        assert!(a.to_string_lossy().ends_with(".part"));
    }
}
